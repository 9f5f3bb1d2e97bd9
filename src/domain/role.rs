// Closed set of roles a peer can hold in a match.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    None,
    God,
    Human,
}

impl Role {
    /// Integer code exposed to UI listeners (0 = none, 1 = God, 2 = Human).
    pub const fn code(self) -> u8 {
        match self {
            Role::None => 0,
            Role::God => 1,
            Role::Human => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Role::None),
            1 => Some(Role::God),
            2 => Some(Role::Human),
            _ => None,
        }
    }
}
