// Local role-selection controls layered over the replicated lobby.

use crate::domain::{LobbyState, ObjectId, PeerRef, Role};
use crate::use_cases::lobby;
use crate::use_cases::session::PeerSession;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Which controls are clickable right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleButtons {
    pub god: bool,
    pub human: bool,
    pub ready: bool,
}

/// Tracks the local pending choice so a button disables on click, before the
/// authority's answer has replicated back.
///
/// The pending choice only covers that round-trip: once the lobby it was
/// made against changes (or is replaced), the replicated role wins.
#[derive(Debug)]
pub struct RoleSelectMenu {
    my_choice: Role,
    claimed_against: Option<(ObjectId, LobbyState)>,
    ready_sent: bool,
    signals: broadcast::Sender<Role>,
}

impl Default for RoleSelectMenu {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleSelectMenu {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            my_choice: Role::None,
            claimed_against: None,
            ready_sent: false,
            signals,
        }
    }

    /// Role chosen locally, as integer-coded for UI listeners via `Role::code`.
    pub fn subscribe(&self) -> broadcast::Receiver<Role> {
        self.signals.subscribe()
    }

    pub fn pending_choice(&self) -> Role {
        self.my_choice
    }

    /// Drops a pending choice the authority has already answered. A claim the
    /// authority refused never shows up in the lobby, so any newer lobby state
    /// settles the choice back to the replicated role.
    pub fn observe(&mut self, local: PeerRef, lobby: Option<(ObjectId, LobbyState)>) {
        let Some(claimed) = self.claimed_against else {
            return;
        };
        match lobby {
            Some(current) if current == claimed => {}
            Some((_, state)) => {
                self.my_choice = state.role_of(local);
                self.claimed_against = None;
            }
            None => {
                self.my_choice = Role::None;
                self.claimed_against = None;
            }
        }
    }

    pub fn buttons(&self, lobby: Option<&LobbyState>) -> RoleButtons {
        let Some(lobby) = lobby else {
            return RoleButtons::default();
        };
        RoleButtons {
            god: lobby.god_peer.is_none() && self.my_choice != Role::God,
            human: lobby.human_peer.is_none() && self.my_choice != Role::Human,
            ready: lobby.both_selected() && !self.ready_sent,
        }
    }

    pub fn click_god(&mut self, session: &mut PeerSession) -> bool {
        self.click_role(session, Role::God)
    }

    pub fn click_human(&mut self, session: &mut PeerSession) -> bool {
        self.click_role(session, Role::Human)
    }

    /// Sends `StartGame` once both roles are filled. Later clicks are ignored.
    pub fn click_ready(&mut self, session: &mut PeerSession) -> bool {
        let found = lobby::find_lobby(session);
        self.observe(session.local_peer(), found);
        let state = found.map(|(_, state)| state);
        if !self.buttons(state.as_ref()).ready {
            debug!(peer = %session.local_peer(), "ready ignored");
            return false;
        }
        if let Err(err) = lobby::request_start(session) {
            warn!(peer = %session.local_peer(), error = %err, "ready click ignored");
            return false;
        }
        self.ready_sent = true;
        true
    }

    fn click_role(&mut self, session: &mut PeerSession, role: Role) -> bool {
        let found = lobby::find_lobby(session);
        self.observe(session.local_peer(), found);
        let Some((lobby_id, state)) = found else {
            warn!(peer = %session.local_peer(), ?role, "lobby missing; role click ignored");
            return false;
        };

        let buttons = self.buttons(Some(&state));
        let enabled = match role {
            Role::God => buttons.god,
            Role::Human => buttons.human,
            Role::None => false,
        };
        if !enabled {
            debug!(peer = %session.local_peer(), ?role, "role button disabled");
            return false;
        }

        if let Err(err) = lobby::request_role(session, role == Role::God) {
            warn!(peer = %session.local_peer(), ?role, error = %err, "role click ignored");
            return false;
        }
        self.my_choice = role;
        self.claimed_against = Some((lobby_id, state));
        let _ = self.signals.send(role);
        true
    }
}
