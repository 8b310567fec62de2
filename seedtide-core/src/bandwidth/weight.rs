//! Swarm-derived claimant weight.

use crate::torrent::tracker::Swarm;

/// Weight of a swarm in the upload budget split.
///
/// Zero when either side of the swarm is empty. Otherwise
/// `ratio * 100 * seeders * ratio * (leechers / seeders)` with
/// `ratio = leechers / (seeders + leechers)`, which grows faster than
/// linearly with leecher pressure.
pub fn calculate_weight(swarm: Swarm) -> f64 {
    if swarm.seeders == 0 || swarm.leechers == 0 {
        return 0.0;
    }

    let seeders = f64::from(swarm.seeders);
    let leechers = f64::from(swarm.leechers);
    let leechers_ratio = leechers / (seeders + leechers);

    leechers_ratio * 100.0 * seeders * leechers_ratio * (leechers / seeders)
}
