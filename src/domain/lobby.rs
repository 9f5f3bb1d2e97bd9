// Replicated lobby record: who plays which role and whether the match began.

use super::peer::PeerRef;
use super::role::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyState {
    pub god_peer: PeerRef,
    pub human_peer: PeerRef,
    pub started: bool,
}

/// Result of applying a role request on the authority holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    /// The peer now holds the requested role; `released` is the role it gave up.
    Assigned { released: Role },
    /// The peer already held the requested role.
    Unchanged,
    /// Another peer holds the slot.
    Taken { holder: PeerRef },
    /// Roles are frozen once the match has started.
    Locked,
    /// The none peer cannot hold a role.
    InvalidPeer,
}

impl RoleChange {
    pub fn changed(self) -> bool {
        matches!(self, RoleChange::Assigned { .. })
    }
}

impl LobbyState {
    pub fn both_selected(&self) -> bool {
        self.god_peer.is_some() && self.human_peer.is_some()
    }

    pub fn role_of(&self, peer: PeerRef) -> Role {
        if peer.is_none() {
            Role::None
        } else if self.god_peer == peer {
            Role::God
        } else if self.human_peer == peer {
            Role::Human
        } else {
            Role::None
        }
    }

    pub fn holder_of(&self, role: Role) -> PeerRef {
        match role {
            Role::God => self.god_peer,
            Role::Human => self.human_peer,
            Role::None => PeerRef::NONE,
        }
    }

    /// Moves `peer` into the requested slot, clearing the other slot if it held it.
    ///
    /// A slot held by a different peer is never overwritten, so two racing claims
    /// for the same role resolve to whichever request reached the authority first.
    pub fn select_role(&mut self, peer: PeerRef, want_god: bool) -> RoleChange {
        if peer.is_none() {
            return RoleChange::InvalidPeer;
        }
        if self.started {
            return RoleChange::Locked;
        }

        let (wanted, other) = if want_god {
            (&mut self.god_peer, &mut self.human_peer)
        } else {
            (&mut self.human_peer, &mut self.god_peer)
        };

        if *wanted == peer {
            return RoleChange::Unchanged;
        }
        if wanted.is_some() {
            return RoleChange::Taken { holder: *wanted };
        }

        let released = if *other == peer {
            *other = PeerRef::NONE;
            if want_god { Role::Human } else { Role::God }
        } else {
            Role::None
        };
        *wanted = peer;
        RoleChange::Assigned { released }
    }

    /// Flips `started` once both roles are filled. Returns true when the match is running.
    pub fn start_game(&mut self) -> bool {
        if self.both_selected() {
            self.started = true;
        }
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: PeerRef = PeerRef::new(1);
    const P2: PeerRef = PeerRef::new(2);
    const P3: PeerRef = PeerRef::new(3);

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Select(PeerRef, bool),
        Start,
    }

    fn all_ops() -> Vec<Op> {
        let mut ops = vec![Op::Start];
        for peer in [P1, P2, P3] {
            ops.push(Op::Select(peer, true));
            ops.push(Op::Select(peer, false));
        }
        ops
    }

    fn check_invariants(state: &LobbyState, was_started: bool) {
        if state.god_peer.is_some() && state.human_peer.is_some() {
            assert_ne!(state.god_peer, state.human_peer, "{state:?}");
        }
        assert_eq!(
            state.both_selected(),
            state.god_peer.is_some() && state.human_peer.is_some()
        );
        if was_started {
            assert!(state.started, "started must never reset");
        }
        if state.started {
            assert!(state.both_selected());
        }
    }

    #[test]
    fn every_short_operation_sequence_keeps_lobby_invariants() {
        let ops = all_ops();
        // Breadth-first over every sequence up to length 4.
        let mut frontier = vec![LobbyState::default()];
        for _ in 0..4 {
            let mut next = Vec::with_capacity(frontier.len() * ops.len());
            for state in &frontier {
                for op in &ops {
                    let mut state = *state;
                    let was_started = state.started;
                    match *op {
                        Op::Select(peer, want_god) => {
                            state.select_role(peer, want_god);
                        }
                        Op::Start => {
                            state.start_game();
                        }
                    }
                    check_invariants(&state, was_started);
                    next.push(state);
                }
            }
            frontier = next;
        }
    }

    #[test]
    fn when_peer_switches_role_then_prior_slot_is_cleared() {
        let mut lobby = LobbyState::default();
        lobby.select_role(P1, true);
        let change = lobby.select_role(P1, false);

        assert_eq!(change, RoleChange::Assigned { released: Role::God });
        assert!(lobby.god_peer.is_none());
        assert_eq!(lobby.human_peer, P1);
    }

    #[test]
    fn when_role_is_reselected_then_nothing_changes() {
        let mut lobby = LobbyState::default();
        lobby.select_role(P1, true);
        let before = lobby;

        assert_eq!(lobby.select_role(P1, true), RoleChange::Unchanged);
        assert_eq!(lobby, before);
    }

    #[test]
    fn when_slot_is_held_by_other_peer_then_claim_is_rejected() {
        let mut lobby = LobbyState::default();
        lobby.select_role(P1, true);

        assert_eq!(lobby.select_role(P2, true), RoleChange::Taken { holder: P1 });
        assert_eq!(lobby.god_peer, P1);
        assert!(lobby.human_peer.is_none());
    }

    #[test]
    fn when_roles_are_incomplete_then_start_is_ignored() {
        let mut lobby = LobbyState::default();
        assert!(!lobby.start_game());
        lobby.select_role(P1, true);
        assert!(!lobby.start_game());
        assert!(!lobby.started);
    }

    #[test]
    fn when_both_roles_are_filled_then_start_is_idempotent() {
        let mut lobby = LobbyState::default();
        lobby.select_role(P1, true);
        lobby.select_role(P2, false);

        assert!(lobby.start_game());
        assert!(lobby.start_game());
        assert!(lobby.started);
    }

    #[test]
    fn when_match_started_then_roles_are_locked() {
        let mut lobby = LobbyState::default();
        lobby.select_role(P1, true);
        lobby.select_role(P2, false);
        lobby.start_game();

        assert_eq!(lobby.select_role(P1, false), RoleChange::Locked);
        assert_eq!(lobby.role_of(P1), Role::God);
    }

    #[test]
    fn none_peer_cannot_take_a_role() {
        let mut lobby = LobbyState::default();
        assert_eq!(lobby.select_role(PeerRef::NONE, true), RoleChange::InvalidPeer);
        assert_eq!(lobby.role_of(PeerRef::NONE), Role::None);
    }
}
