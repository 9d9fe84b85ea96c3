#![allow(dead_code)]

use std::ffi::c_char;
use std::path::{Path, PathBuf};
use std::process::Command;

use hot_module_host::abi::{Color, PrimitiveTable, Rectangle, KEY_NULL, PRIMITIVE_TABLE_VERSION};

pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

/// Builds `tests/module_for_testing` and returns the path of the cdylib.
pub fn build_test_module(features: &[&str]) -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/module_for_testing/Cargo.toml");
    let flavor = if features.is_empty() {
        "full".to_string()
    } else {
        features.join("-")
    };
    let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR"))
        .join("module_for_testing")
        .join(flavor);

    let mut cmd = Command::new(env!("CARGO"));
    cmd.arg("build")
        .arg("--manifest-path")
        .arg(&manifest)
        .arg("--target-dir")
        .arg(&target_dir);
    if !features.is_empty() {
        cmd.arg("--features").arg(features.join(","));
    }
    let output = cmd.output().expect("cargo build failed to start");
    assert!(
        output.status.success(),
        "building module_for_testing failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lib = hot_module_host::canonical_library_path(target_dir.join("debug"), "module_for_testing");
    assert!(lib.exists(), "{lib:?} was not built");
    lib
}

/// Files in `dir`, sorted by name.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

extern "C" fn noop() {}
extern "C" fn never() -> bool {
    false
}
extern "C" fn surface_init(_width: i32, _height: i32, _title: *const c_char) {}
extern "C" fn clear(_color: Color) {}
extern "C" fn no_key() -> i32 {
    KEY_NULL
}
extern "C" fn no_click(_bounds: Rectangle, _label: *const c_char) -> bool {
    false
}
extern "C" fn style_set(_control: i32, _property: i32, _value: i32) {}

/// A complete table whose primitives do nothing.
pub fn inert_primitives() -> PrimitiveTable {
    PrimitiveTable {
        version: PRIMITIVE_TABLE_VERSION,
        surface_init: Some(surface_init),
        surface_close: Some(noop),
        surface_should_close: Some(never),
        frame_begin: Some(noop),
        frame_end: Some(noop),
        clear: Some(clear),
        key_pressed: Some(no_key),
        widget_button: Some(no_click),
        style_set: Some(style_set),
    }
}
