//! Helpers shared by unit tests.
use std::path::PathBuf;

use crate::ProjectConfig;

/// Directory holding test datafiles. Overridable with `DATAFILES_DIR`.
pub fn datafiles_dir() -> PathBuf {
    std::env::var_os("DATAFILES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test-data/datafiles"))
}

/// Read raw datafile by file name.
pub fn read_datafile_json(name: &str) -> Vec<u8> {
    let path = datafiles_dir().join(name);
    std::fs::read(&path).unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()))
}

/// Read and compile datafile by file name.
pub fn read_datafile(name: &str) -> ProjectConfig {
    ProjectConfig::from_json(&read_datafile_json(name)).expect("test datafile should compile")
}
