use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

pub use crate::path::*;

mod path;

/// Return a [`NamedTempFile`] in the specified directory.
///
/// Sets the permissions of the temporary file to `0o666`, to match the non-temporary file default.
/// ([`NamedTempFile`] defaults to `0o600`.)
#[cfg(unix)]
pub fn tempfile_in(path: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(std::fs::Permissions::from_mode(0o666))
        .tempfile_in(path)
}

/// Return a [`NamedTempFile`] in the specified directory.
#[cfg(not(unix))]
pub fn tempfile_in(path: &Path) -> io::Result<NamedTempFile> {
    tempfile::Builder::new().tempfile_in(path)
}

/// Write `data` to `path` atomically using a temporary file and atomic rename.
///
/// Readers see either no file or the complete contents, never a partial write.
pub fn write_atomic_sync(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> io::Result<()> {
    let path = path.as_ref();
    let Some(parent) = path.parent() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Write path has no parent: {}", path.user_display()),
        ));
    };
    let temp_file = tempfile_in(parent)?;
    fs_err::write(&temp_file, &data)?;
    temp_file.persist(path).map_err(|err| {
        io::Error::other(format!(
            "Failed to persist temporary file to {}: {}",
            path.user_display(),
            err.error
        ))
    })?;
    Ok(())
}
