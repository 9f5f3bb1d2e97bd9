// Domain layer: peer identities, lobby rules and movement math.

pub mod authority;
pub mod camera;
pub mod errors;
pub mod lobby;
pub mod math;
pub mod motion;
pub mod npc;
pub mod peer;
pub mod role;
pub mod session_name;
pub mod tuning;

pub use authority::{SyncMode, resolve_sync_mode};
pub use errors::SessionError;
pub use lobby::{LobbyState, RoleChange};
pub use math::{Vec2, Vec3};
pub use peer::{ObjectId, PeerRef};
pub use role::Role;
pub use session_name::{MIN_SESSION_NAME_LEN, validate_session_name};
