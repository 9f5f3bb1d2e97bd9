// Network adapters split by relay-side sockets, internal HTTP routes and the
// peer-side connector.

pub mod client;
pub mod connector;
pub mod internal;

pub use client::ws_handler;
pub use connector::WsConnector;
pub use internal::session_info_handler;
