//! Reconnect backoff scheduling.
//!
//! Exponential delay from the attempt count, capped, with optional jitter to
//! avoid synchronized reconnect storms across channels.

use std::time::Duration;

/// Computes reconnect delays: `min(base * 2^(attempt-1), cap)` plus jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self {
            base,
            cap,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Deterministic delay for a 1-based attempt number, before jitter.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let exp = attempt.saturating_sub(1).min(32);
        let delay_ms = base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay_ms.min(self.cap.as_millis() as u64))
    }

    /// Delay with jitter applied. Jitter only ever adds, so the sequence
    /// stays bounded below by the deterministic curve, and the result is
    /// clamped so the cap bounds it above as well.
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay(attempt);
        let jitter_ms = (raw.as_millis() as f64 * self.jitter) as u64;
        if jitter_ms == 0 {
            return raw;
        }
        (raw + Duration::from_millis(rand::random::<u64>() % jitter_ms)).min(self.cap)
    }
}
