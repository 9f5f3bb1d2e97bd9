// Interface adapters: wire protocol, WebSocket relay endpoint and peer connector.

pub mod http;
pub mod net;
pub mod protocol;
pub mod state;
pub mod utils;
