//! Permission handling for targets without Unix mode bits
//!
//! Only the read-only flag exists here, so it is mapped to and from a
//! synthesized mode: 0o444 when read-only, 0o666 otherwise.

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

/// Bits that carry meaning on this platform (the write bits)
pub const MODE_MASK: u32 = 0o666;

const READ_ONLY_MODE: u32 = 0o444;
const READ_WRITE_MODE: u32 = 0o666;
const WRITE_BITS: u32 = 0o222;

pub(crate) fn mode_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        READ_ONLY_MODE
    } else {
        READ_WRITE_MODE
    }
}

#[allow(clippy::permissions_set_readonly_false)]
pub(crate) fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & WRITE_BITS == 0);
    fs::set_permissions(path, permissions)
}
