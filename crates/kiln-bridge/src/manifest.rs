//! Backend modules described by TOML manifests on the module search path.
//!
//! A manifest declares hooks as commands and nested objects as attribute tables:
//!
//! ```toml
//! [hooks]
//! build_wheel = ["./build.sh", "--release"]
//!
//! [attributes.legacy.hooks]
//! build_wheel = ["python3", "legacy_build.py"]
//! ```
//!
//! A hook command receives the output directory as an extra positional argument, followed by
//! `--metadata-directory <dir>` when one is passed, and `KILN_HOOK` names the hook being run. The
//! last non-empty line the command prints is the hook's return value; earlier lines are forwarded
//! to our stdout.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use kiln_fs::Simplified;
use kiln_static::EnvVars;

use crate::backend::{BackendObject, HookArgs, HookFailure};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error("Hook `{0}` has an empty command")]
    EmptyCommand(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectTable {
    #[serde(default)]
    hooks: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    attributes: BTreeMap<String, ObjectTable>,
}

/// Load the manifest at `path` into a backend object.
pub(crate) fn load(path: &Path) -> Result<BackendObject, ManifestError> {
    let contents = fs_err::read_to_string(path)?;
    let table: ObjectTable = toml::from_str(&contents)?;
    let base = path.parent().unwrap_or(Path::new("."));
    build(table, base)
}

fn build(table: ObjectTable, base: &Path) -> Result<BackendObject, ManifestError> {
    let mut object = BackendObject::new();
    for (name, argv) in table.hooks {
        let mut argv = argv.into_iter();
        let Some(program) = argv.next() else {
            return Err(ManifestError::EmptyCommand(name));
        };
        let command = HookCommand {
            hook: name.clone(),
            program: resolve_program(&program, base),
            args: argv.collect(),
        };
        object.insert_hook(name, Arc::new(move |args: &HookArgs| command.run(args)));
    }
    for (name, child) in table.attributes {
        object.insert_attribute(name, build(child, base)?);
    }
    Ok(object)
}

/// Programs given as a path are relative to the manifest. Bare names are looked up on `PATH`.
fn resolve_program(program: &str, base: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.components().count() > 1 {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

#[derive(Debug)]
struct HookCommand {
    hook: String,
    program: PathBuf,
    args: Vec<String>,
}

impl HookCommand {
    fn run(&self, args: &HookArgs) -> Result<Value, HookFailure> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(output_directory) = &args.output_directory {
            command.arg(output_directory);
        }
        if let Some(metadata_directory) = &args.metadata_directory {
            command.arg("--metadata-directory").arg(metadata_directory);
        }
        command
            .env(EnvVars::KILN_HOOK, &self.hook)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        debug!(
            "Running hook `{}`: `{}`",
            self.hook,
            self.program.user_display()
        );
        let output = command.output().map_err(|err| {
            HookFailure::new(format!(
                "Failed to run `{}` for hook `{}`: {err}",
                self.program.user_display(),
                self.hook
            ))
        })?;

        if !output.status.success() {
            return Err(HookFailure::new(format!(
                "Hook `{}` exited with {}",
                self.hook, output.status
            ))
            .with_output(&output.stdout, &[]));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (forwarded, result) = split_result(&stdout);
        if !forwarded.is_empty() {
            let mut writer = io::stdout().lock();
            writer
                .write_all(forwarded.as_bytes())
                .and_then(|()| writer.flush())
                .map_err(|err| HookFailure::new(format!("Failed to forward hook output: {err}")))?;
        }
        parse_result(result).map_err(|err| {
            HookFailure::new(format!(
                "Hook `{}` printed an invalid JSON result: {err}",
                self.hook
            ))
            .with_output(&output.stdout, &[])
        })
    }
}

/// Split captured stdout into the lines to forward and the result line.
fn split_result(stdout: &str) -> (&str, Option<&str>) {
    let trimmed = stdout.trim_end();
    if trimmed.is_empty() {
        return ("", None);
    }
    match trimmed.rfind('\n') {
        Some(index) => (&stdout[..=index], Some(trimmed[index + 1..].trim())),
        None => ("", Some(trimmed.trim())),
    }
}

fn parse_result(line: Option<&str>) -> Result<Value, serde_json::Error> {
    match line {
        None => Ok(Value::Null),
        Some(line) if line.starts_with(['[', '{', '"']) => serde_json::from_str(line),
        Some(line) => Ok(Value::String(line.to_string())),
    }
}
