use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_fs::prelude::*;
use insta::assert_snapshot;
use serde_json::json;
use test_log::test;

use crate::backend::HookArgs;

use super::*;

fn descriptor(s: &str) -> BackendDescriptor {
    BackendDescriptor::from_str(s).unwrap()
}

fn counting_finder(calls: &'static AtomicUsize) -> ModuleFinder {
    ModuleFinder::new().with_builtin("backend", move || {
        calls.fetch_add(1, Ordering::SeqCst);
        BackendObject::new().with_attribute(
            "api",
            BackendObject::new()
                .with_hook("build_wheel", |_| Ok(json!("pkg-1.0-py3-none-any.whl")))
                .with_attribute("v1", BackendObject::new()),
        )
    })
}

#[test]
fn repeated_resolution_is_identical() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let finder = counting_finder(&CALLS);

    let first = finder.resolve(&descriptor("backend:api")).unwrap();
    let second = finder.resolve(&descriptor("backend:api")).unwrap();
    assert!(first.same_object(&second));

    let parent = finder.resolve(&descriptor("backend")).unwrap();
    assert!(!parent.same_object(&first));

    // The module was constructed once, on first import.
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn first_missing_attribute() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let finder = counting_finder(&CALLS);

    let err = finder
        .resolve(&descriptor("backend:api.v2.extra"))
        .unwrap_err();
    let ResolutionError::MissingAttribute { attribute, parent } = &err else {
        panic!("expected a missing attribute, got {err:?}");
    };
    assert_eq!(attribute, "v2");
    assert_eq!(parent, "backend.api");
    assert_snapshot!(err, @"`backend.api` has no attribute `v2`");

    let err = finder.resolve(&descriptor("backend:missing")).unwrap_err();
    assert_snapshot!(err, @"`backend` has no attribute `missing`");
}

#[test]
fn module_not_found() {
    let finder = ModuleFinder::new();
    let err = finder.resolve(&descriptor("nowhere.build")).unwrap_err();
    assert!(matches!(err, ResolutionError::ModuleNotFound(ref module) if module == "nowhere.build"));
    assert_snapshot!(err, @"Backend module `nowhere.build` was not found");
}

#[test]
fn search_paths_shadow_in_order() {
    let first = assert_fs::TempDir::new().unwrap();
    let second = assert_fs::TempDir::new().unwrap();
    first
        .child("backend.toml")
        .write_str("[hooks]\nbuild_wheel = [\"first\"]\n")
        .unwrap();
    second
        .child("backend.toml")
        .write_str("[hooks]\nbuild_sdist = [\"second\"]\n")
        .unwrap();

    let finder = ModuleFinder::new()
        .with_search_paths([second.to_path_buf()])
        .with_backend_paths([first.to_path_buf()])
        .with_builtin("backend", BackendObject::new);
    assert_eq!(
        finder.search_paths(),
        [first.to_path_buf(), second.to_path_buf()]
    );

    let backend = finder.resolve(&descriptor("backend")).unwrap();
    assert!(backend.has_hook("build_wheel"));
    assert!(!backend.has_hook("build_sdist"));
}

#[test]
fn search_paths_shadow_builtins() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("backend.toml")
        .write_str("[hooks]\nbuild_wheel = [\"true\"]\n")
        .unwrap();

    let finder = ModuleFinder::new()
        .with_builtin("backend", || {
            BackendObject::new().with_hook("get_requires_for_build_wheel", |_| Ok(json!([])))
        })
        .with_search_paths([dir.to_path_buf()]);
    let backend = finder.resolve(&descriptor("backend")).unwrap();
    assert!(backend.has_hook("build_wheel"));
    assert!(!backend.has_hook("get_requires_for_build_wheel"));
}

#[test]
fn dotted_modules() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("tools/backend.toml")
        .write_str("[hooks]\nbuild_wheel = [\"module\"]\n")
        .unwrap();
    dir.child("tools/backend/__init__.toml")
        .write_str("[hooks]\nget_requires_for_build_wheel = [\"package\"]\n")
        .unwrap();
    dir.child("tools/other.toml")
        .write_str("[attributes.api.hooks]\nbuild_wheel = [\"true\"]\n")
        .unwrap();

    let finder = ModuleFinder::new().with_search_paths([dir.to_path_buf()]);

    // The package wins over the module file of the same name.
    let backend = finder.resolve(&descriptor("tools.backend")).unwrap();
    assert!(backend.has_hook("get_requires_for_build_wheel"));
    assert!(!backend.has_hook("build_wheel"));

    let api = finder.resolve(&descriptor("tools.other:api")).unwrap();
    assert!(api.has_hook("build_wheel"));
}

#[test]
fn invalid_manifest() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("backend.toml").write_str("[hooks\n").unwrap();

    let finder = ModuleFinder::new().with_search_paths([dir.to_path_buf()]);
    let err = finder.resolve(&descriptor("backend")).unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidModule { ref module, .. } if module == "backend"));
}

#[test]
fn builtin_hooks_are_callable() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let finder = counting_finder(&CALLS);
    let backend = finder.resolve(&descriptor("backend:api")).unwrap();
    let value = backend
        .call_hook("build_wheel", &HookArgs::default())
        .unwrap()
        .unwrap();
    assert_eq!(value, json!("pkg-1.0-py3-none-any.whl"));
}
