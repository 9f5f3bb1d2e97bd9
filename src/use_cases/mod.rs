// Use cases layer: session runtime, peer replica and match workflows.

pub mod cursor;
pub mod game;
pub mod launcher;
pub mod lobby;
pub mod ports;
pub mod relay;
pub mod role_select;
pub mod session;
pub mod sync;
pub mod types;

pub use game::{GameSettings, LocalInput, PeerCommand, PeerGame, RenderFrame, peer_task};
pub use launcher::{EntitySpawner, EntityTemplate, LaunchedSession, LauncherSignal, SessionLauncher};
pub use ports::SessionConnector;
pub use relay::{RelaySettings, SessionHub};
pub use session::PeerSession;
pub use types::{
    AvatarState, Delivery, JoinAccepted, LobbyCall, NpcState, ObjectRecord, ObjectState,
    PeerLink, PeerMessage, SessionEvent, SessionInfo,
};
