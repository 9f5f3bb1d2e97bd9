use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};

/// Connection id for log correlation: a random per-process base plus a counter.
pub fn conn_id() -> u64 {
    static NEXT: OnceLock<AtomicU64> = OnceLock::new();
    let next = NEXT.get_or_init(|| AtomicU64::new(u64::from(rand::random::<u32>()) << 16));
    next.fetch_add(1, Ordering::Relaxed)
}
