/// Declares all environment variable used throughout `kiln` and its crates.
pub struct EnvVars;

impl EnvVars {
    /// A platform path list (`:`-separated on Unix, `;`-separated on Windows) of directories
    /// holding the build environment's manifest modules.
    ///
    /// Searched after the project's own `backend-path` entries and before the built-in modules.
    /// Unlike `backend-path`, these directories are not subject to the project-root containment
    /// check: they belong to the isolated build environment, not to the source tree.
    pub const KILN_SITE_PATH: &'static str = "KILN_SITE_PATH";

    /// Equivalent to the `--python` argument of `kiln-compile`. The interpreter that compiles
    /// source files to bytecode.
    pub const KILN_PYTHON: &'static str = "KILN_PYTHON";

    /// Equivalent to the `--workers` argument of `kiln-compile`. Defaults to the number of
    /// available CPUs.
    pub const KILN_COMPILE_WORKERS: &'static str = "KILN_COMPILE_WORKERS";

    /// Set by the bridge for command hooks of manifest modules: the name of the hook being
    /// invoked, e.g. `build_wheel`.
    pub const KILN_HOOK: &'static str = "KILN_HOOK";

    /// Used to set the log level, e.g. `RUST_LOG=kiln_bridge=debug`.
    pub const RUST_LOG: &'static str = "RUST_LOG";

    /// Set on bytecode compiler subprocesses so their stdout is not block buffered.
    pub const PYTHONUNBUFFERED: &'static str = "PYTHONUNBUFFERED";

    /// The executable search path. The build environment's scripts directory is prepended to it
    /// for backends that call their own tools.
    pub const PATH: &'static str = "PATH";
}
