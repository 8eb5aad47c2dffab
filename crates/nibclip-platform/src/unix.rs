//! Unix permission handling

use std::fs::{self, Metadata, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Bits carried over from source to destination (permissions plus setuid/setgid/sticky)
pub const MODE_MASK: u32 = 0o7777;

pub(crate) fn mode_bits(metadata: &Metadata) -> u32 {
    metadata.permissions().mode() & MODE_MASK
}

pub(crate) fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    tracing::trace!("chmod {:o} {:?}", mode & MODE_MASK, path);
    fs::set_permissions(path, Permissions::from_mode(mode & MODE_MASK))
}
