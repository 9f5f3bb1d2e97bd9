use std::env;

// Runtime/relay constants (not gameplay tuning, see `domain::tuning`).

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn http_port() -> u16 {
    env_or("RELAY_PORT", 3001)
}

pub fn max_peers() -> usize {
    env_or("RELAY_MAX_PEERS", 2usize).max(1)
}

pub fn delivery_channel_capacity() -> usize {
    env_or("RELAY_DELIVERY_CAPACITY", 1024usize).max(1)
}

pub fn command_channel_capacity() -> usize {
    env_or("RELAY_COMMAND_CAPACITY", 1024usize).max(1)
}
