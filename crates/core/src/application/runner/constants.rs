// Runner tuning values. No magic numbers inline; everything lives here.

/// How long the runner sleeps when no job is due.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Due jobs fetched per runner iteration.
pub const DEFAULT_CLAIM_BATCH_SIZE: i64 = 8;

/// Minimum spacing between consecutive ESP create calls in one pass.
pub const DEFAULT_MIN_CALL_INTERVAL_MS: u64 = 1_500;

/// An IN_PROGRESS row untouched for this long is treated as an orphaned
/// claim and released back to PENDING.
pub const STALE_CLAIM_WINDOW_MS: i64 = 5 * 60 * 1_000;
