//! Re-fork retry delays: exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before re-fork attempt number `attempt` (1-based).
///
/// Doubles from `base` per attempt, capped at `max`, plus up to 10% jitter so
/// a crash-looping cluster does not retry in lockstep.
pub fn refork_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let max_ms = max.as_millis().min(u64::MAX as u128) as u64;
    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped.saturating_add(jitter))
}
