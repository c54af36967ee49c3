//! # Trace Layout Tests

use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use rvconform_core::trace::TraceLayout;

#[test]
fn paths_derive_from_case_name() {
    let layout = TraceLayout::new("work/riscv-tests/trace");
    assert_eq!(
        layout.dump_path("rv64ui-p-add"),
        PathBuf::from("work/riscv-tests/trace/rv64ui-p-add")
    );
    assert_eq!(
        layout.index_path("rv64ui-p-add"),
        PathBuf::from("work/riscv-tests/trace/rv64ui-p-add.tidx")
    );
}

#[test]
fn reset_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let layout = TraceLayout::new(dir.path().join("a/b/trace"));
    layout.reset().unwrap();
    assert!(layout.dir().is_dir());
}

#[test]
fn reset_removes_files_and_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let layout = TraceLayout::new(dir.path().join("trace"));
    fs::create_dir_all(layout.dir().join("old/deeper")).unwrap();
    fs::write(layout.index_path("stale"), b"stale").unwrap();
    fs::write(layout.dir().join("old/deeper/x"), b"x").unwrap();

    layout.reset().unwrap();

    assert!(layout.dir().is_dir());
    assert_eq!(fs::read_dir(layout.dir()).unwrap().count(), 0);
}

#[test]
fn reset_fails_when_path_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace");
    fs::write(&path, b"not a dir").unwrap();
    assert!(TraceLayout::new(&path).reset().is_err());
}
