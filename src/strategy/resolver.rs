//! Outcome resolution: what a detected table outcome means for our wager.

use crate::types::{DetectedOutcome, RoundResult, Side};

/// Score a detected outcome against the side we backed.
///
/// Returns `None` while the outcome is still unknown. Baseline scoring of a
/// session's first round is the controller's business, not this function's.
pub fn resolve(detected: DetectedOutcome, targeted: Side) -> Option<RoundResult> {
    match detected {
        DetectedOutcome::Unknown => None,
        DetectedOutcome::Tie => Some(RoundResult::Push),
        DetectedOutcome::GenericWin => Some(RoundResult::Win),
        DetectedOutcome::BankerWin | DetectedOutcome::PlayerWin => {
            if detected.winning_side() == Some(targeted) {
                Some(RoundResult::Win)
            } else {
                Some(RoundResult::Loss)
            }
        }
    }
}
