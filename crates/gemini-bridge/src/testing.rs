//! Fake CLI executables for tests.

use std::path::PathBuf;

use tempfile::TempDir;

/// Write an executable `/bin/sh` script named `gemini` into `dir`.
#[cfg(unix)]
pub(crate) fn fake_cli(dir: &TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("gemini");
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
