//! Pure threshold-crossing classification.
//!
//! The callback controller never inspects a raw rate on its own; every
//! decision goes through `classify`, comparing the previously observed rate
//! and the protocol's new rate against the configured threshold.

/// Direction of a threshold crossing between two rate observations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Crossing {
    /// Both observations sit on the same side of the threshold.
    None,
    /// The rate moved from below the threshold to at-or-above it.
    Up,
    /// The rate moved from at-or-above the threshold to below it.
    Down,
}

/// Classify a rate change against `threshold`.
///
/// A rate exactly equal to the threshold qualifies (inclusive comparison).
/// Total over its domain: no side effects, no failure modes. Freshly created
/// and deleted flows are expressed by the caller as `previous_rate = 0` and
/// `new_rate = 0` respectively.
pub fn classify(previous_rate: i128, new_rate: i128, threshold: i128) -> Crossing {
    if previous_rate < threshold && new_rate >= threshold {
        Crossing::Up
    } else if previous_rate >= threshold && new_rate < threshold {
        Crossing::Down
    } else {
        Crossing::None
    }
}
