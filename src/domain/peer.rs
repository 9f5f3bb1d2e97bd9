// Network identities handed out by the session runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque participant identifier assigned by the relay when a peer joins.
///
/// The raw value `0` is reserved for "unassigned"; relays start counting at 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerRef(u32);

impl PeerRef {
    pub const NONE: PeerRef = PeerRef(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "peer:none")
        } else {
            write!(f, "peer:{}", self.0)
        }
    }
}

/// Identifier of a networked object.
///
/// Ids are allocated by the spawning peer, so the owner is part of the key and
/// no two peers can mint the same id. Ordering is by sequence first so that the
/// earliest spawn wins when peers need to agree on one of several duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub seq: u32,
    pub owner: PeerRef,
}

impl ObjectId {
    pub const fn new(owner: PeerRef, seq: u32) -> Self {
        Self { seq, owner }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}:{}", self.owner.raw(), self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_peer_is_none() {
        assert!(PeerRef::default().is_none());
        assert_eq!(PeerRef::default(), PeerRef::NONE);
        assert!(PeerRef::new(3).is_some());
    }

    #[test]
    fn object_ids_order_by_sequence_before_owner() {
        let early = ObjectId::new(PeerRef::new(9), 1);
        let late = ObjectId::new(PeerRef::new(1), 2);
        assert!(early < late);
    }
}
