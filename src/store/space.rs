//! Free-space preflight run before any backup or scratch file is created.

use std::path::Path;

use tracing::warn;

use crate::{report::Report, Error, Result};

/// Bytes a mutation needs: one backup copy plus one rewritten copy of the
/// current file, never less than `floor`.
pub fn required_bytes(current_len: u64, floor: u64) -> u64 {
    current_len.saturating_mul(2).max(floor)
}

/// Fails with `InsufficientDiskSpace` when the filesystem holding `target`
/// has less than [`required_bytes`] available. When the platform cannot
/// report free space the check passes and a warning is added to `report`.
pub fn ensure_capacity(target: &Path, current_len: u64, floor: u64, report: &mut Report) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let required = required_bytes(current_len, floor);

    match fs2::available_space(dir) {
        Ok(available) if available < required => Err(Error::InsufficientDiskSpace {
            path: target.display().to_string(),
            available,
            required,
        }
        .into()),
        Ok(_) => Ok(()),
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "free space unknown; proceeding");
            report.warn(format!(
                "could not determine free space for {}: {err}",
                dir.display()
            ));
            Ok(())
        }
    }
}
