// Write-direction decision for a networked entity.

use super::peer::PeerRef;

/// Whether the local peer drives an entity or mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Sample local input, simulate, publish the result.
    Authority,
    /// Ignore local input and smooth toward the replicated value.
    Proxy,
}

/// Pure authority check.
///
/// Before the match starts (or with no session at all) every entity is driven
/// locally so the game stays playable offline.
pub fn resolve_sync_mode(local: PeerRef, holder: PeerRef, match_started: bool) -> SyncMode {
    if !match_started || holder == local {
        SyncMode::Authority
    } else {
        SyncMode::Proxy
    }
}
