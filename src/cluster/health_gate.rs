//! Restart admission control.
//!
//! A restart is admitted only if, counting the worker about to restart as
//! already gone, the fraction of workers outside the closing set stays
//! strictly above the configured floor:
//!
//! ```text
//! (live - closing) / desired > floor / 100
//! ```
//!
//! The comparison is done in integer arithmetic
//! (`(live - closing) * 100 > floor * desired`) so floors such as 50% are
//! exact. The caller recomputes against the current live count on every
//! request; there is no batch snapshot.

/// Decide whether one more concurrent restart may be admitted.
///
/// `desired == 0` never admits. `closing > live` is impossible under the
/// cluster invariants and is rejected.
pub fn admit(live: usize, closing: usize, desired: usize, floor_percent: u32) -> bool {
    if desired == 0 {
        return false;
    }
    let Some(available) = live.checked_sub(closing) else {
        return false;
    };
    (available as u128) * 100 > (floor_percent as u128) * (desired as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_desired_always_rejects() {
        assert!(!admit(0, 0, 0, 0));
        assert!(!admit(10, 0, 0, 50));
    }

    #[test]
    fn floor_is_strict() {
        // 5 of 10 available is exactly 50%, which is not above the floor.
        assert!(!admit(10, 5, 10, 50));
        assert!(admit(10, 4, 10, 50));
    }

    #[test]
    fn matches_fractional_definition() {
        for desired in 1..=12usize {
            for live in 0..=desired + 2 {
                for closing in 0..=live {
                    for floor in [0u32, 1, 33, 50, 66, 75, 99, 100] {
                        let expected =
                            (live - closing) as f64 / desired as f64 > floor as f64 / 100.0;
                        assert_eq!(
                            admit(live, closing, desired, floor),
                            expected,
                            "live={} closing={} desired={} floor={}",
                            live,
                            closing,
                            desired,
                            floor
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn floor_of_one_hundred_never_admits_at_full_strength() {
        assert!(!admit(4, 0, 4, 100));
    }

    #[test]
    fn single_worker_cluster_can_restart() {
        assert!(admit(1, 0, 1, 50));
        assert!(!admit(1, 1, 1, 50));
    }

    #[test]
    fn inconsistent_counts_reject() {
        assert!(!admit(2, 3, 4, 0));
    }
}
