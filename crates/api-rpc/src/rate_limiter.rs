//! Admission Limiter (Token Bucket)
//!
//! Caps the rate of mutating RPC calls. Lock-free: the whole bucket state
//! lives in one atomic word updated by CAS.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Token bucket over a single packed atomic.
///
/// Upper 32 bits: whole tokens currently in the bucket.
/// Lower 32 bits: milliseconds since `created`, truncated to u32, at the
/// last refill. The wrapping delta stays exact across a wrap (~49 days).
pub struct RateLimiter {
    packed: AtomicU64,
    created: Instant,
    max_tokens: u32,
    refill_per_sec: u32,
}

impl RateLimiter {
    /// `max_tokens` is the burst ceiling, `refill_per_sec` the sustained
    /// rate. `RateLimiter::new(200, 100)` allows bursts of 200 and 100
    /// requests per second after that.
    pub fn new(max_tokens: u32, refill_per_sec: u32) -> Self {
        Self {
            packed: AtomicU64::new((max_tokens as u64) << 32),
            created: Instant::now(),
            max_tokens,
            refill_per_sec,
        }
    }

    /// Take one token. Returns false when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        loop {
            let packed = self.packed.load(Ordering::Acquire);
            let tokens = (packed >> 32) as u32;
            let last_refill_ms = (packed & 0xFFFF_FFFF) as u32;

            let elapsed_ms = self.created.elapsed().as_millis() as u32;
            let delta_ms = elapsed_ms.wrapping_sub(last_refill_ms);
            let refilled = (delta_ms as u64 * self.refill_per_sec as u64) / 1000;
            let available =
                ((tokens as u64 + refilled).min(self.max_tokens as u64)) as u32;

            if available == 0 {
                // available == 0 implies refilled == 0: nothing to record.
                return false;
            }

            // Advance the refill mark only when whole tokens were credited; a
            // zero-credit write would forfeit the partial window.
            let refill_mark = if refilled > 0 {
                elapsed_ms
            } else {
                last_refill_ms
            };
            let new_packed = (((available - 1) as u64) << 32) | (refill_mark as u64);
            match self.packed.compare_exchange(
                packed,
                new_packed,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}
