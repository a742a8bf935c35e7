use std::str::FromStr;
use std::sync::{Arc, Mutex};

use insta::assert_snapshot;
use serde_json::json;

use crate::backend::{BackendObject, HookFailure};
use crate::descriptor::BackendDescriptor;

use super::*;

fn handle(object: BackendObject) -> BackendHandle {
    BackendHandle::new(
        BackendDescriptor::from_str("backend:api").unwrap(),
        Arc::new(object),
    )
}

fn work_dir() -> (tempfile::TempDir, WorkDirectory) {
    let temp_dir = tempfile::tempdir().unwrap();
    let work_dir = WorkDirectory::open(temp_dir.path()).unwrap();
    (temp_dir, work_dir)
}

fn write_dist_info(args: &HookArgs) -> Result<Value, HookFailure> {
    let output = args.output_directory.as_ref().unwrap();
    fs_err::create_dir(output.join("pkg-1.0.dist-info")).unwrap();
    fs_err::write(
        output.join("pkg-1.0.dist-info").join("METADATA"),
        "Name: pkg\n",
    )
    .unwrap();
    Ok(json!("pkg-1.0.dist-info"))
}

fn write_wheel(args: &HookArgs) -> Result<Value, HookFailure> {
    let output = args.output_directory.as_ref().unwrap();
    fs_err::write(output.join("pkg-1.0-py3-none-any.whl"), "wheel").unwrap();
    Ok(json!("pkg-1.0-py3-none-any.whl"))
}

#[test]
fn requirements_without_hook() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(BackendObject::new());

    let outcome = execute(Goal::QueryExtraRequirements, &backend, &work_dir).unwrap();
    assert_eq!(outcome, StepOutcome::Requirements(Vec::new()));
    assert_eq!(outcome.exit_status(), BridgeExit::Success);
    assert_eq!(
        fs_err::read_to_string(work_dir.extra_requirements_path()).unwrap(),
        "[]"
    );
}

#[test]
fn requirements_are_idempotent() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(
        BackendObject::new().with_hook("get_requires_for_build_wheel", |_| {
            Ok(json!(["wheel", "cython>=3"]))
        }),
    );

    let first = execute(Goal::QueryExtraRequirements, &backend, &work_dir).unwrap();
    let first_contents = fs_err::read_to_string(work_dir.extra_requirements_path()).unwrap();

    // The second run replaces the file in the same work directory.
    let second = execute(Goal::QueryExtraRequirements, &backend, &work_dir).unwrap();
    let second_contents = fs_err::read_to_string(work_dir.extra_requirements_path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        second,
        StepOutcome::Requirements(vec!["wheel".to_string(), "cython>=3".to_string()])
    );
    assert_eq!(first_contents, second_contents);
    assert_snapshot!(second_contents, @r#"["wheel","cython>=3"]"#);
}

#[test]
fn requirements_hook_failure() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(
        BackendObject::new().with_hook("get_requires_for_build_wheel", |_| {
            Err(HookFailure::new("No module named 'setuptools'"))
        }),
    );

    let err = execute(Goal::QueryExtraRequirements, &backend, &work_dir).unwrap_err();
    assert!(matches!(err, Error::Backend { .. }));
    assert_eq!(err.exit_status(), BridgeExit::Failure);
    assert!(!work_dir.extra_requirements_path().exists());
}

#[test]
fn requirements_must_be_strings() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(
        BackendObject::new().with_hook("get_requires_for_build_wheel", |_| Ok(json!(["wheel", 3]))),
    );
    let err = execute(Goal::QueryExtraRequirements, &backend, &work_dir).unwrap_err();
    assert_snapshot!(err, @"Build backend hook `get_requires_for_build_wheel` returned an invalid result: expected a requirement string, got `3`");

    let backend = handle(
        BackendObject::new().with_hook("get_requires_for_build_wheel", |_| Ok(json!("wheel"))),
    );
    let err = execute(Goal::QueryExtraRequirements, &backend, &work_dir).unwrap_err();
    assert!(matches!(err, Error::InvalidHookResult { .. }));
    assert!(!work_dir.extra_requirements_path().exists());
}

#[test]
fn metadata_hook_absent() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(BackendObject::new().with_hook("build_wheel", write_wheel));

    let outcome = execute(Goal::PrepareMetadata, &backend, &work_dir).unwrap();
    assert_eq!(outcome, StepOutcome::HookUnsupported);
    assert_eq!(outcome.exit_status(), BridgeExit::HookUnsupported);

    // Nothing is written, not even the output directory.
    assert!(!work_dir.metadata_dir().exists());
    assert!(!work_dir.metadata_result_path().exists());
}

#[test]
fn metadata_result() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(
        BackendObject::new().with_hook("prepare_metadata_for_build_wheel", write_dist_info),
    );

    let outcome = execute(Goal::PrepareMetadata, &backend, &work_dir).unwrap();
    let dist_info = work_dir.metadata_dir().join("pkg-1.0.dist-info");
    assert_eq!(outcome, StepOutcome::Metadata(dist_info.clone()));
    assert!(dist_info.is_absolute());
    assert_eq!(work_dir.read_metadata_result().unwrap(), Some(dist_info));
}

#[test]
fn metadata_result_must_exist() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(
        BackendObject::new()
            .with_hook("prepare_metadata_for_build_wheel", |_| Ok(json!("ghost.dist-info"))),
    );

    let err = execute(Goal::PrepareMetadata, &backend, &work_dir).unwrap_err();
    assert!(matches!(err, Error::InvalidHookResult { .. }));
    assert!(!work_dir.metadata_result_path().exists());
}

#[test]
fn wheel_hook_is_mandatory() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(BackendObject::new());

    let err = execute(Goal::BuildArtifact, &backend, &work_dir).unwrap_err();
    assert_snapshot!(err, @"Build backend `backend:api` doesn't define the mandatory hook `build_wheel`");
    assert_eq!(err.exit_status(), BridgeExit::BackendUnavailable);
    assert!(!work_dir.wheel_dir().exists());
}

/// A backend that records the arguments `build_wheel` receives.
fn recording_backend() -> (BackendHandle, Arc<Mutex<Vec<HookArgs>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let backend = handle(
        BackendObject::new()
            .with_hook("prepare_metadata_for_build_wheel", write_dist_info)
            .with_hook("build_wheel", move |args| {
                recorded.lock().unwrap().push(args.clone());
                write_wheel(args)
            }),
    );
    (backend, calls)
}

#[test]
fn wheel_without_metadata() {
    let (_temp_dir, work_dir) = work_dir();
    let (backend, calls) = recording_backend();

    let outcome = execute(Goal::BuildArtifact, &backend, &work_dir).unwrap();
    let wheel = work_dir.wheel_dir().join("pkg-1.0-py3-none-any.whl");
    assert_eq!(outcome, StepOutcome::Wheel(wheel.clone()));
    assert_eq!(work_dir.read_wheel_result().unwrap(), Some(wheel));

    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        [HookArgs {
            output_directory: Some(work_dir.wheel_dir()),
            metadata_directory: None,
        }]
    );
}

#[test]
fn wheel_after_metadata() {
    let (_temp_dir, work_dir) = work_dir();
    let (backend, calls) = recording_backend();

    execute(Goal::PrepareMetadata, &backend, &work_dir).unwrap();
    execute(Goal::BuildArtifact, &backend, &work_dir).unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(
        calls[0].metadata_directory,
        Some(work_dir.metadata_dir().join("pkg-1.0.dist-info"))
    );
}

#[test]
fn wheel_ignores_stale_metadata_result() {
    let (_temp_dir, work_dir) = work_dir();
    let (backend, calls) = recording_backend();

    // The result file names a directory that's gone.
    work_dir
        .write_metadata_result(&work_dir.metadata_dir().join("pkg-1.0.dist-info"))
        .unwrap();
    execute(Goal::BuildArtifact, &backend, &work_dir).unwrap();

    assert_eq!(calls.lock().unwrap()[0].metadata_directory, None);
}

#[test]
fn wheel_name_must_stay_in_output_directory() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(BackendObject::new().with_hook("build_wheel", |args| {
        write_wheel(args)?;
        Ok(json!("../wheel/pkg-1.0-py3-none-any.whl"))
    }));

    let err = execute(Goal::BuildArtifact, &backend, &work_dir).unwrap_err();
    assert_snapshot!(err, @"Build backend hook `build_wheel` returned an invalid result: expected a file name, got the path `../wheel/pkg-1.0-py3-none-any.whl`");
    assert!(!work_dir.wheel_result_path().exists());
}

#[test]
fn wheel_hook_panic() {
    let (_temp_dir, work_dir) = work_dir();
    let backend = handle(BackendObject::new().with_hook("build_wheel", |_| {
        panic!("compiler not found");
    }));

    let err = execute(Goal::BuildArtifact, &backend, &work_dir).unwrap_err();
    let Error::Backend { hook, err } = &err else {
        panic!("expected a backend error, got {err:?}");
    };
    assert_eq!(*hook, "build_wheel");
    assert_snapshot!(err, @"Hook `build_wheel` panicked: compiler not found");
    assert!(!work_dir.wheel_result_path().exists());
}
