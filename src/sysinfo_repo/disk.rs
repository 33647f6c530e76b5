// Root filesystem selection for the host snapshot.

use crate::models::DiskStats;
use std::path::Path;

/// Usage of the `/` mount; when no root mount is listed, the largest filesystem stands in.
pub(super) fn root_disk_stats(mounts: &[(&Path, u64, u64)]) -> DiskStats {
    let chosen = mounts
        .iter()
        .find(|(mount, _, _)| *mount == Path::new("/"))
        .or_else(|| mounts.iter().max_by_key(|(_, total, _)| *total));
    match chosen {
        Some(&(_, total, available)) => {
            let used = total.saturating_sub(available);
            DiskStats {
                total,
                used,
                percent: crate::metrics::percent_of(used, total),
                free: available,
            }
        }
        None => DiskStats::default(),
    }
}
