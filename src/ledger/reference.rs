//! Reference number generation
//!
//! The reference is the customer-facing tracking id of a transfer and
//! doubles as its idempotency key, so it must be unique in the store.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of the random suffix. 10 alphanumerics give well over 10^17
/// combinations per day; collisions are handled by a store check anyway.
const SUFFIX_LEN: usize = 10;

/// Produce one candidate reference, e.g. `RM-20260830-K7Q2ZB81XC`.
pub fn candidate() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("RM-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_shape() {
        let reference = candidate();
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "RM");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_candidates_differ() {
        assert_ne!(candidate(), candidate());
    }
}
