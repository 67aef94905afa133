use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from leaving a half-written config behind.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Write `data` to `path` only when the current content differs byte-for-byte.
/// Returns whether anything changed — this bool is what feeds change links
/// (config changed → owning service must restart).
pub fn write_if_different(path: &Path, data: &[u8], mode: Option<u32>) -> Result<bool> {
    let current = match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    if current.as_deref() == Some(data) {
        set_mode(path, mode)?;
        return Ok(false);
    }
    atomic_write(path, data)?;
    set_mode(path, mode)?;
    Ok(true)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jenkins.service.d/override.conf");
        atomic_write(&path, b"[Service]\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[Service]\n");
    }

    #[test]
    fn write_if_different_reports_change_only_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("override.conf");

        assert!(write_if_different(&path, b"PORT=8000\n", None).unwrap());
        assert!(!write_if_different(&path, b"PORT=8000\n", None).unwrap());
        assert!(write_if_different(&path, b"PORT=9000\n", None).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn write_if_different_applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keyring.asc");
        write_if_different(&path, b"key", Some(0o644)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
