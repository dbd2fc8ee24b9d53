pub mod driver;
#[cfg(feature = "modbus")]
pub mod modbus;
pub mod resilient;
pub mod snapshot;

pub use driver::{InverterDriver, MockInverter, SimulatedInverter};
#[cfg(feature = "modbus")]
pub use modbus::ModbusInverter;
pub use resilient::{FacadeState, OutageStatus, ResilientInverter};
pub use snapshot::{PreControlSnapshot, SnapshotCapable, SnapshotStore};
