use std::os::unix::fs::PermissionsExt;

use assert_fs::prelude::*;
use indoc::indoc;
use insta::assert_snapshot;

use super::*;

struct Fixture {
    temp_dir: assert_fs::TempDir,
    bridge: PathBuf,
}

/// A stand-in for the bridge: a shell script that receives the work directory, backend, and goal.
fn fake_bridge(body: &str) -> Fixture {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    temp_dir.child("source").create_dir_all().unwrap();
    let bridge = temp_dir.child("bridge.sh");
    bridge.write_str(&format!("#!/bin/sh\n{body}")).unwrap();
    fs_err::set_permissions(bridge.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
    Fixture {
        bridge: bridge.to_path_buf(),
        temp_dir,
    }
}

fn setup(fixture: &Fixture, request: &BuildSystemRequest) -> SourceBuild {
    SourceBuild::setup(
        &fixture.bridge,
        &fixture.temp_dir.child("source"),
        request,
        "pkg-1.0",
    )
    .unwrap()
}

#[test_log::test(tokio::test)]
async fn extra_requirements() {
    let fixture = fake_bridge(indoc! {r#"
        test "$3" = GetRequiresForBuildWheel || exit 1
        printf '["wheel", "%s"]' "$KILN_SITE_PATH" > "$1/extra_requirements.json"
    "#});
    let build = setup(&fixture, &BuildSystemRequest::default())
        .with_site_path([PathBuf::from("/env/site")])
        .unwrap();

    let requirements = build.extra_requirements().await.unwrap();
    assert_eq!(requirements, ["wheel", "/env/site"]);
}

#[test_log::test(tokio::test)]
async fn request_and_working_directory() {
    let fixture = fake_bridge(indoc! {r#"
        test "$2" = "backend:api" || exit 1
        pwd -P > "$1/wheel_result"
    "#});
    let request = BuildSystemRequest {
        build_backend: Some("backend:api".to_string()),
        backend_path: vec![PathBuf::from("in-tree")],
    };
    let build = setup(&fixture, &request);
    assert_eq!(build.work_dir().read_request().unwrap(), Some(request));

    let cwd = build.wheel().await.unwrap();
    assert_eq!(
        cwd,
        fs_err::canonicalize(fixture.temp_dir.child("source")).unwrap()
    );
}

#[test_log::test(tokio::test)]
async fn default_backend() {
    let fixture = fake_bridge("exit 0\n");
    let build = setup(&fixture, &BuildSystemRequest::default());
    let request = build.work_dir().read_request().unwrap().unwrap();
    assert_eq!(
        request.build_backend.as_deref(),
        Some("setuptools.build_meta:__legacy__")
    );
}

#[test_log::test(tokio::test)]
async fn metadata_unsupported() {
    let fixture = fake_bridge("exit 50\n");
    let build = setup(&fixture, &BuildSystemRequest::default());
    assert_eq!(build.metadata().await.unwrap(), None);
}

#[test_log::test(tokio::test)]
async fn metadata_result() {
    let fixture = fake_bridge(indoc! {r#"
        mkdir -p "$1/metadata/pkg-1.0.dist-info"
        printf '%s' "$1/metadata/pkg-1.0.dist-info" > "$1/metadata_result"
    "#});
    let build = setup(&fixture, &BuildSystemRequest::default());
    let dist_info = build.metadata().await.unwrap().unwrap();
    assert_eq!(
        dist_info,
        build.work_dir().metadata_dir().join("pkg-1.0.dist-info")
    );
}

#[test_log::test(tokio::test)]
async fn invalid_backend_path() {
    let fixture = fake_bridge("echo 'error: Invalid backend search path' >&2\nexit 51\n");
    let build = setup(&fixture, &BuildSystemRequest::default());
    let err = build.wheel().await.unwrap_err();
    assert_snapshot!(err, @r"
    Invalid backend search path for `pkg-1.0`:
    error: Invalid backend search path
    ");
}

#[test_log::test(tokio::test)]
async fn backend_unavailable() {
    let fixture = fake_bridge("exit 52\n");
    let build = setup(&fixture, &BuildSystemRequest::default());
    let err = build.extra_requirements().await.unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable { .. }));
}

#[test_log::test(tokio::test)]
async fn backend_failure() {
    let fixture = fake_bridge(indoc! {"
        echo 'running build_ext'
        echo 'error: command gcc failed' >&2
        exit 1
    "});
    let build = setup(&fixture, &BuildSystemRequest::default());
    let err = build.wheel().await.unwrap_err();
    assert_snapshot!(err, @r"
    Build backend failed to run `build_wheel` for `pkg-1.0` (exit status: 1):
    --- stdout:
    running build_ext
    --- stderr:
    error: command gcc failed
    ---
    ");
}

#[test_log::test(tokio::test)]
async fn unsupported_mandatory_hook() {
    // Exit 50 is only meaningful for the metadata step.
    let fixture = fake_bridge("exit 50\n");
    let build = setup(&fixture, &BuildSystemRequest::default());
    let err = build.wheel().await.unwrap_err();
    assert!(matches!(err, Error::BuildBackend { .. }));
}

#[test_log::test(tokio::test)]
async fn missing_result() {
    let fixture = fake_bridge("exit 0\n");
    let build = setup(&fixture, &BuildSystemRequest::default());
    let err = build.wheel().await.unwrap_err();
    assert_snapshot!(err, @"`build_wheel` succeeded for `pkg-1.0`, but `wheel_result` is missing");
}

/// A variable from our environment that a shell passes through untouched, if there is one.
fn inherited_variable() -> Option<(String, String)> {
    const SHELL_MANAGED: &[&str] = &[
        "PATH", "PWD", "OLDPWD", "SHLVL", "IFS", "HOME", "OPTIND", "LINENO", "PPID", "SHELLOPTS",
        "BASHOPTS", "_",
    ];
    std::env::vars_os().find_map(|(key, value)| {
        let key = key.into_string().ok()?;
        let value = value.into_string().ok()?;
        let identifier = key.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        (identifier
            && !SHELL_MANAGED.contains(&key.as_str())
            && !key.starts_with("PS")
            && !value.is_empty()
            && !value.contains(['\n', '\r'])
            && value.trim() == value)
            .then_some((key, value))
    })
}

#[test_log::test(tokio::test)]
async fn inherited_environment() {
    let Some((key, value)) = inherited_variable() else {
        return;
    };
    let fixture = fake_bridge(&format!("printf '%s' \"${{{key}-unset}}\" > \"$1/wheel_result\"\n"));
    let build = setup(&fixture, &BuildSystemRequest::default());

    assert_eq!(build.wheel().await.unwrap(), PathBuf::from(value));
}

#[test_log::test(tokio::test)]
async fn clean_environment() {
    let key = inherited_variable().map_or_else(|| "KILN_SITE_PATH".to_string(), |(key, _)| key);
    let fixture = fake_bridge(&format!(
        "printf '%s %s' \"${{{key}-unset}}\" \"$KILN_TEST_MARKER\" > \"$1/wheel_result\"\n"
    ));
    let build = setup(&fixture, &BuildSystemRequest::default())
        .with_clean_env()
        .with_env("KILN_TEST_MARKER", "kept");

    assert_eq!(build.wheel().await.unwrap(), PathBuf::from("unset kept"));
}

#[test_log::test(tokio::test)]
async fn path_prepend() {
    let fixture = fake_bridge(indoc! {r#"
        printf '%s' "$PATH" > "$1/wheel_result"
    "#});
    let scripts = fixture.temp_dir.child("env/bin").to_path_buf();
    let build = setup(&fixture, &BuildSystemRequest::default())
        .with_path_prepend([scripts.clone()])
        .unwrap();

    let path = build.wheel().await.unwrap().into_os_string();
    let expected = std::env::join_paths(
        std::iter::once(scripts).chain(
            std::env::var_os("PATH")
                .iter()
                .flat_map(std::env::split_paths),
        ),
    )
    .unwrap();
    assert_eq!(path, expected);
}

#[test_log::test(tokio::test)]
async fn path_prepend_clean_environment() {
    let fixture = fake_bridge(indoc! {r#"
        printf '%s' "$PATH" > "$1/wheel_result"
    "#});
    let build = setup(&fixture, &BuildSystemRequest::default())
        .with_clean_env()
        .with_env("PATH", "/usr/bin:/bin")
        .with_path_prepend([PathBuf::from("/env/bin")])
        .unwrap();
    assert_eq!(
        build.wheel().await.unwrap(),
        PathBuf::from("/env/bin:/usr/bin:/bin")
    );

    let build = setup(&fixture, &BuildSystemRequest::default())
        .with_clean_env()
        .with_path_prepend([PathBuf::from("/env/bin")])
        .unwrap();
    assert_eq!(build.wheel().await.unwrap(), PathBuf::from("/env/bin"));
}

#[test]
fn path_prepend_rejects_separator() {
    let fixture = fake_bridge("exit 0\n");
    let result = setup(&fixture, &BuildSystemRequest::default())
        .with_path_prepend([PathBuf::from("/env/bin:/other")]);
    assert!(result.is_err());
}
