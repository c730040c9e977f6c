//! Wall-clock access, isolated so the rest of the crate never calls
//! `SystemTime::now()` directly and the expiry semantics stay easy to reason
//! about at the call sites that matter (request parsing, keyspace reads).

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, as an `i64` so it composes with
/// `KeyEntry::expiry_deadline_ms` without casts at every call site.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}
