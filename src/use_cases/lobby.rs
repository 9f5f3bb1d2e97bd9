// Lobby record lookup, creation and remote mutation requests.

use crate::domain::{LobbyState, ObjectId, PeerRef, RoleChange, SessionError};
use crate::use_cases::session::PeerSession;
use crate::use_cases::types::{LobbyCall, ObjectState};
use tracing::{debug, info};

/// The lobby every peer agrees on: the one with the smallest object id.
pub fn find_lobby(session: &PeerSession) -> Option<(ObjectId, LobbyState)> {
    session
        .objects()
        .filter_map(|record| record.state.as_lobby().map(|lobby| (record.object, *lobby)))
        .min_by_key(|(object, _)| *object)
}

/// Returns the lobby id, spawning a fresh record when the replica has none.
pub fn ensure_lobby(session: &mut PeerSession) -> Result<ObjectId, SessionError> {
    if let Some((object, _)) = find_lobby(session) {
        return Ok(object);
    }

    let object = session.spawn(ObjectState::Lobby(LobbyState::default()))?;
    info!(peer = %session.local_peer(), %object, "lobby created");
    Ok(object)
}

/// Despawns lobbies the local peer authored that lost to a smaller id.
pub fn prune_duplicate_lobbies(session: &mut PeerSession) -> Vec<ObjectId> {
    let Some((winner, _)) = find_lobby(session) else {
        return Vec::new();
    };

    let local = session.local_peer();
    let losers: Vec<ObjectId> = session
        .objects()
        .filter(|record| {
            record.object != winner && record.authority == local && record.state.as_lobby().is_some()
        })
        .map(|record| record.object)
        .collect();

    let mut pruned = Vec::with_capacity(losers.len());
    for object in losers {
        match session.despawn(object) {
            Ok(()) => {
                info!(peer = %local, %object, %winner, "duplicate lobby removed");
                pruned.push(object);
            }
            Err(err) => debug!(peer = %local, %object, error = %err, "duplicate lobby not removed"),
        }
    }
    pruned
}

/// Asks the lobby authority to move the local peer into a role slot.
pub fn request_role(session: &mut PeerSession, want_god: bool) -> Result<(), SessionError> {
    let (lobby, _) = find_lobby(session).ok_or(SessionError::LobbyMissing)?;
    let peer = session.local_peer();
    session.rpc(lobby, LobbyCall::SelectRole { peer, want_god })
}

pub fn request_start(session: &mut PeerSession) -> Result<(), SessionError> {
    let (lobby, _) = find_lobby(session).ok_or(SessionError::LobbyMissing)?;
    session.rpc(lobby, LobbyCall::StartGame)
}

/// Applies a remote call on the authority holder. Returns true when state changed.
pub fn apply_lobby_call(
    state: &mut LobbyState,
    object: ObjectId,
    from: PeerRef,
    call: LobbyCall,
) -> bool {
    match call {
        LobbyCall::SelectRole { peer, want_god } => {
            let change = state.select_role(peer, want_god);
            match change {
                RoleChange::Assigned { released } => {
                    info!(%object, %peer, caller = %from, want_god, ?released, "role assigned");
                }
                RoleChange::Unchanged => {}
                RoleChange::Taken { holder } => {
                    info!(%object, %peer, %holder, want_god, "role request rejected: slot taken");
                }
                RoleChange::Locked => {
                    info!(%object, %peer, "role request rejected: match started");
                }
                RoleChange::InvalidPeer => {
                    info!(%object, caller = %from, "role request rejected: no peer");
                }
            }
            change.changed()
        }
        LobbyCall::StartGame => {
            if state.started {
                return false;
            }
            if state.start_game() {
                info!(%object, caller = %from, god = %state.god_peer, human = %state.human_peer, "match started");
                true
            } else {
                debug!(%object, caller = %from, "start ignored: roles incomplete");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::types::{Delivery, JoinAccepted, ObjectRecord, PeerLink, PeerMessage};
    use tokio::sync::mpsc;

    const P1: PeerRef = PeerRef::new(1);
    const P2: PeerRef = PeerRef::new(2);

    fn session(
        local: PeerRef,
        objects: Vec<ObjectRecord>,
    ) -> (PeerSession, mpsc::Receiver<PeerMessage>, mpsc::Sender<Delivery>) {
        let (outbound, from_peer) = mpsc::channel(16);
        let (to_peer, inbound) = mpsc::channel(16);
        let link = PeerLink {
            welcome: JoinAccepted {
                peer: local,
                max_peers: 2,
                peers: vec![local],
                objects,
                player_objects: Vec::new(),
            },
            outbound,
            inbound,
        };
        (PeerSession::from_link("room", link), from_peer, to_peer)
    }

    fn lobby_record(object: ObjectId) -> ObjectRecord {
        ObjectRecord {
            object,
            authority: object.owner,
            state: ObjectState::Lobby(LobbyState::default()),
        }
    }

    #[test]
    fn when_no_lobby_exists_then_one_is_spawned_once() {
        let (mut session, _rx, _tx) = session(P1, Vec::new());
        let first = ensure_lobby(&mut session).expect("lobby");
        let second = ensure_lobby(&mut session).expect("lobby");
        assert_eq!(first, second);
        assert!(session.has_state_authority(first));
    }

    #[test]
    fn when_lobby_exists_in_snapshot_then_it_is_reused() {
        let existing = ObjectId::new(P2, 1);
        let (mut session, _rx, _tx) = session(P1, vec![lobby_record(existing)]);
        assert_eq!(ensure_lobby(&mut session), Ok(existing));
        assert!(!session.has_state_authority(existing));
    }

    #[test]
    fn when_duplicate_lobbies_exist_then_larger_local_one_is_despawned() {
        let (mut session, mut rx, tx) = session(P2, Vec::new());
        let mine = ensure_lobby(&mut session).expect("lobby");
        let _ = rx.try_recv();

        let theirs = ObjectId::new(P1, 1);
        tx.try_send(Delivery::Spawned {
            object: theirs,
            authority: P1,
            state: ObjectState::Lobby(LobbyState::default()),
        })
        .expect("deliver");
        session.poll();

        assert_eq!(prune_duplicate_lobbies(&mut session), vec![mine]);
        assert_eq!(find_lobby(&session).map(|(id, _)| id), Some(theirs));
        assert_eq!(rx.try_recv(), Ok(PeerMessage::Despawn { object: mine }));
    }

    #[test]
    fn when_lobby_missing_then_requests_fail_softly() {
        let (mut session, _rx, _tx) = session(P1, Vec::new());
        assert_eq!(request_role(&mut session, true), Err(SessionError::LobbyMissing));
        assert_eq!(request_start(&mut session), Err(SessionError::LobbyMissing));
    }

    #[test]
    fn when_role_requested_then_rpc_names_local_peer() {
        let lobby = ObjectId::new(P1, 1);
        let (mut session, mut rx, _tx) = session(P2, vec![lobby_record(lobby)]);
        request_role(&mut session, false).expect("request");
        assert_eq!(
            rx.try_recv(),
            Ok(PeerMessage::Rpc {
                object: lobby,
                call: LobbyCall::SelectRole {
                    peer: P2,
                    want_god: false
                }
            })
        );
    }

    #[test]
    fn when_start_called_twice_then_only_first_reports_change() {
        let object = ObjectId::new(P1, 1);
        let mut state = LobbyState {
            god_peer: P1,
            human_peer: P2,
            started: false,
        };
        assert!(apply_lobby_call(&mut state, object, P1, LobbyCall::StartGame));
        assert!(!apply_lobby_call(&mut state, object, P2, LobbyCall::StartGame));
        assert!(state.started);
    }
}
