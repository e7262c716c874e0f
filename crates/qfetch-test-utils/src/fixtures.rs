//! Fixture directories for server tests.

use std::path::Path;

use tempfile::TempDir;

/// Create a temporary directory holding `files` (name, contents) and empty
/// subdirectories `dirs`. Names may contain `/` to nest.
///
/// Panics on I/O failure; only meant for tests.
pub fn fixture_dir(files: &[(&str, &[u8])], dirs: &[&str]) -> TempDir {
    let tmp = tempfile::tempdir().expect("create temp dir");

    for dir in dirs {
        std::fs::create_dir_all(tmp.path().join(dir)).expect("create fixture dir");
    }
    for (name, contents) in files {
        let path = tmp.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture parent");
        }
        std::fs::write(&path, contents).expect("write fixture file");
    }

    tmp
}

/// Sorted copy of a listing, for order-independent comparison.
pub fn sorted(names: &[String]) -> Vec<String> {
    let mut names = names.to_vec();
    names.sort();
    names
}

/// Read a fixture file back.
pub fn read_fixture(dir: &Path, name: &str) -> Vec<u8> {
    std::fs::read(dir.join(name)).expect("read fixture file")
}
