// ── Cache store ──
//
// Freshness-windowed, copy-on-write storage for record collections keyed
// by tenant + user.

mod cache;

pub use cache::{CacheStore, Identified};
