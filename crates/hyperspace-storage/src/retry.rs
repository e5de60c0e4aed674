//! Transient store-conflict retry, per `spec.md` §7: "Transient store
//! errors (store-deadlock): retried internally with randomised backoff up
//! to a bounded number of attempts. Not visible to the caller unless
//! retries are exhausted."

use std::thread;
use std::time::Duration;

use hyperspace_core::{HyperspaceError, HyperspaceResult};
use rand::Rng;

/// Maximum number of attempts before a conflict is surfaced to the caller.
pub const MAX_ATTEMPTS: u32 = 8;

/// Base backoff unit; the `n`th retry sleeps a random duration in
/// `[0, BASE_BACKOFF * 2^n)`.
const BASE_BACKOFF: Duration = Duration::from_millis(2);

/// Run `f`, retrying with randomised exponential backoff while it
/// returns [`HyperspaceError::StoreDeadlock`], up to [`MAX_ATTEMPTS`].
///
/// Worker threads call their whole unit-of-work (typically: open a
/// transaction, read, validate, write, commit) through this helper so a
/// losing transaction in a write-write race is invisible to the client.
///
/// # Errors
///
/// Returns the last error if `f` still fails after `MAX_ATTEMPTS`, or
/// immediately propagates any non-`StoreDeadlock` error from `f`.
pub fn with_retry<T>(mut f: impl FnMut() -> HyperspaceResult<T>) -> HyperspaceResult<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(HyperspaceError::StoreDeadlock) if attempt + 1 < MAX_ATTEMPTS => {
                let max_millis = BASE_BACKOFF.as_millis() as u64 * (1 << attempt.min(10));
                let jitter = rand::thread_rng().gen_range(0..=max_millis.max(1));
                thread::sleep(Duration::from_millis(jitter));
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_until_success() {
        let attempts = Cell::new(0);
        let result = with_retry(|| {
            let count = attempts.get() + 1;
            attempts.set(count);
            if count < 3 {
                Err(HyperspaceError::StoreDeadlock)
            } else {
                Ok(count)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let result: HyperspaceResult<()> = with_retry(|| Err(HyperspaceError::StoreDeadlock));
        assert!(matches!(result, Err(HyperspaceError::StoreDeadlock)));
    }

    #[test]
    fn non_deadlock_errors_are_not_retried() {
        let attempts = Cell::new(0);
        let result: HyperspaceResult<()> = with_retry(|| {
            attempts.set(attempts.get() + 1);
            Err(HyperspaceError::FileNotFound("/x".to_owned()))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }
}
