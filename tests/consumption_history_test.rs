//! `load_history_csv` (C3/C11 supplement) against real files on disk,
//! since the in-module unit tests only exercise the in-memory provider.

use battery_optimization_controller::forecast::consumption::load_history_csv;

fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("boc-test-{name}-{}.csv", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn loads_well_formed_history_lines() {
    let path = write_temp(
        "good",
        "2026-07-19T10:00:00Z,1200.5\n2026-07-20T11:00:00Z,900.0\n",
    );
    let observations = load_history_csv(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(observations.len(), 2);
    assert!((observations[0].consumption_wh - 1200.5).abs() < 1e-9);
}

#[test]
fn skips_malformed_lines_without_failing_the_whole_load() {
    let path = write_temp(
        "mixed",
        "not,a,valid,line\n2026-07-19T10:00:00Z,1200.5\ngarbage\n2026-07-20T11:00:00Z,not-a-number\n",
    );
    let observations = load_history_csv(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(observations.len(), 1);
    assert!((observations[0].consumption_wh - 1200.5).abs() < 1e-9);
}

#[test]
fn missing_file_is_an_error() {
    let path = std::env::temp_dir().join("boc-test-does-not-exist.csv");
    assert!(load_history_csv(&path).is_err());
}
