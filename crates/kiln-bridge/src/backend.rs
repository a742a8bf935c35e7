use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::BackendDescriptor;

/// A hook implementation. The returned value is interpreted by the step executor.
pub type HookFn = Arc<dyn Fn(&HookArgs) -> Result<Value, HookFailure> + Send + Sync>;

/// The arguments passed to a hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookArgs {
    /// The directory the hook writes its artifact into (`metadata/` or `wheel/`).
    pub output_directory: Option<PathBuf>,
    /// The `.dist-info` directory from a previous metadata step, for `build_wheel` only.
    pub metadata_directory: Option<PathBuf>,
}

/// A hook that ran and failed.
///
/// Carries whatever the backend printed, so the user sees the backend's own diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct HookFailure {
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl HookFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn with_output(mut self, stdout: &[u8], stderr: &[u8]) -> Self {
        self.stdout = String::from_utf8_lossy(stdout).trim().to_string();
        self.stderr = String::from_utf8_lossy(stderr).trim().to_string();
        self
    }
}

impl Display for HookFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.stdout.is_empty() && self.stderr.is_empty() {
            return f.write_str(&self.message);
        }
        write!(
            f,
            "{}:\n--- stdout:\n{}\n--- stderr:\n{}\n---",
            self.message, self.stdout, self.stderr
        )
    }
}

/// A backend object: named hooks plus named child objects reachable through an attribute chain.
#[derive(Default)]
pub struct BackendObject {
    hooks: BTreeMap<String, HookFn>,
    attributes: BTreeMap<String, Arc<BackendObject>>,
}

impl BackendObject {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_hook(
        mut self,
        name: impl Into<String>,
        hook: impl Fn(&HookArgs) -> Result<Value, HookFailure> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, object: Self) -> Self {
        self.attributes.insert(name.into(), Arc::new(object));
        self
    }

    pub(crate) fn insert_hook(&mut self, name: String, hook: HookFn) {
        self.hooks.insert(name, hook);
    }

    pub(crate) fn insert_attribute(&mut self, name: String, object: Self) {
        self.attributes.insert(name, Arc::new(object));
    }

    pub fn attribute(&self, name: &str) -> Option<&Arc<Self>> {
        self.attributes.get(name)
    }

    pub fn hook(&self, name: &str) -> Option<&HookFn> {
        self.hooks.get(name)
    }
}

impl Debug for BackendObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendObject")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// A resolved backend: the object at the end of the descriptor's attribute chain.
#[derive(Debug, Clone)]
pub struct BackendHandle {
    descriptor: BackendDescriptor,
    object: Arc<BackendObject>,
}

impl BackendHandle {
    pub(crate) fn new(descriptor: BackendDescriptor, object: Arc<BackendObject>) -> Self {
        Self { descriptor, object }
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.object.hook(name).is_some()
    }

    /// Call a hook, returning `None` if the backend doesn't define it.
    ///
    /// A panic inside the hook is reported as a [`HookFailure`].
    pub fn call_hook(&self, name: &str, args: &HookArgs) -> Option<Result<Value, HookFailure>> {
        let hook = self.object.hook(name)?;
        let result = catch_unwind(AssertUnwindSafe(|| hook(args))).unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|reason| (*reason).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(HookFailure::new(format!("Hook `{name}` panicked: {reason}")))
        });
        Some(result)
    }

    /// Whether both handles refer to the same backend object.
    pub fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}
