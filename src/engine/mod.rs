pub mod decision;
pub mod math;

pub use decision::evaluate;
pub use math::BatteryMath;
