//! Ownership and mode normalization for the certificate tree.

use super::CertError;
use crate::config::Ownership;
use std::fs::{self, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const DIR_MODE: u32 = 0o750;
pub const FILE_MODE: u32 = 0o640;

/// What [`normalize_permissions`] touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionReport {
    pub dirs: usize,
    pub files: usize,
    /// `false` when ownership could not be changed for lack of privilege.
    pub owner_applied: bool,
}

/// Sets every directory under `root` (inclusive) to `0o750`, every file to `0o640`,
/// and chowns everything to `owner`.
///
/// Symlinks are left alone. A chown refused with `EPERM` disables further chown
/// attempts and is logged once; any other failure aborts.
pub fn normalize_permissions(root: &Path, owner: Ownership) -> Result<PermissionReport, CertError> {
    let mut report = PermissionReport {
        owner_applied: true,
        ..Default::default()
    };

    for entry in WalkDir::new(root) {
        let entry = entry?;
        let file_type = entry.file_type();
        let mode = if file_type.is_dir() {
            report.dirs += 1;
            DIR_MODE
        } else if file_type.is_file() {
            report.files += 1;
            FILE_MODE
        } else {
            continue;
        };

        let path = entry.path();
        fs::set_permissions(path, Permissions::from_mode(mode)).map_err(CertError::io(path))?;

        if report.owner_applied {
            match std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    warn!(
                        uid = owner.uid,
                        gid = owner.gid,
                        "Not permitted to change ownership; leaving owner unchanged"
                    );
                    report.owner_applied = false;
                }
                Err(e) => return Err(CertError::io(path)(e)),
            }
        }
    }

    debug!(dirs = report.dirs, files = report.files, "Normalized certificate permissions");
    Ok(report)
}
