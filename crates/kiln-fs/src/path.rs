use std::io;
use std::path::{Component, Path, PathBuf};

pub trait Simplified {
    /// Simplify a [`Path`].
    ///
    /// On Windows, this will strip the `\\?\` prefix from paths. On other platforms, it's a no-op.
    fn simplified(&self) -> &Path;

    /// Render a [`Path`] for user-facing display.
    ///
    /// On Windows, this will strip the `\\?\` prefix from paths. On other platforms, it's
    /// equivalent to [`std::path::Display`].
    fn simplified_display(&self) -> std::path::Display<'_>;

    /// Render a [`Path`] for user-facing display, relative to the current working directory
    /// where possible.
    fn user_display(&self) -> std::path::Display<'_>;
}

impl<T: AsRef<Path>> Simplified for T {
    fn simplified(&self) -> &Path {
        dunce::simplified(self.as_ref())
    }

    fn simplified_display(&self) -> std::path::Display<'_> {
        dunce::simplified(self.as_ref()).display()
    }

    fn user_display(&self) -> std::path::Display<'_> {
        let path = dunce::simplified(self.as_ref());
        let Ok(cwd) = std::env::current_dir() else {
            return path.display();
        };
        path.strip_prefix(cwd)
            .ok()
            .filter(|relative| !relative.as_os_str().is_empty())
            .unwrap_or(path)
            .display()
    }
}

/// Normalize a path, removing things like `.` and `..`.
///
/// This is purely lexical: symlinks are not consulted, so `a/link/..` becomes `a` even if `link`
/// points elsewhere. Use [`resolve_path`] when the result must match what the filesystem sees.
///
/// Source: <https://github.com/rust-lang/cargo/blob/b48c41aedbd69ee3990d62a0e2006edbb506a480/crates/cargo-util/src/paths.rs#L76C1-L109C2>
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut components = path.as_ref().components().peekable();
    let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().copied() {
        components.next();
        PathBuf::from(c.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => unreachable!(),
            Component::RootDir => {
                ret.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => match ret.components().next_back() {
                Some(Component::Normal(_)) => {
                    ret.pop();
                }
                // `/..` is `/`.
                Some(Component::RootDir | Component::Prefix(..)) => {}
                // A relative path keeps its leading `..`.
                Some(Component::ParentDir | Component::CurDir) | None => {
                    ret.push(component.as_os_str());
                }
            },
            Component::Normal(c) => {
                ret.push(c);
            }
        }
    }
    ret
}

/// Resolve a path to its canonical, absolute form, following symlinks.
///
/// Relative paths are interpreted against the current working directory. Unlike
/// [`fs_err::canonicalize`], the path doesn't need to exist: the deepest existing ancestor is
/// canonicalized and the remaining components are appended and normalized lexically (a missing
/// component can't be a symlink).
pub fn resolve_path(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path.as_ref())?;

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        match fs_err::canonicalize(existing) {
            Ok(canonical) => {
                let mut resolved = dunce::simplified(&canonical).to_path_buf();
                resolved.extend(missing.iter().rev());
                return Ok(normalize_path(resolved));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // The last component may be `..`, which has no file name but still has to be
                // applied to the tail.
                let (Some(parent), Some(last)) =
                    (existing.parent(), existing.components().next_back())
                else {
                    return Err(err);
                };
                missing.push(last.as_os_str().to_os_string());
                existing = parent;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Returns `true` if `path` is `root` or lies below it.
///
/// Both paths are compared component-wise, so `/project-other` is not inside `/project`. Callers
/// are expected to pass paths resolved with [`resolve_path`].
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
