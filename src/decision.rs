//! Pending decision model
//!
//! At most one decision is outstanding at any time. Each variant names the
//! kind of input the session is blocked on and carries the payload that
//! decision needs, so a handler can never read a field that belongs to a
//! different decision kind. Player-index references shared by several
//! decisions (chooser, answerer, staker, appellant) live on the game state
//! itself, where seat-removal re-normalization can fix them all in one pass.

use serde::{Deserialize, Serialize};

/// The kind of input the session is currently awaiting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Decision {
    /// Nothing is awaited
    #[default]
    None,
    /// Showman picks who starts the round
    StarterChoosing,
    /// Chooser picks the next question
    QuestionChoosing,
    /// Button window is open
    Pressing,
    /// An answer is awaited
    Answering {
        /// Final round: every living player answers independently
        final_round: bool,
    },
    /// Showman validates the recorded answer
    AnswerValidating,
    /// Chooser hands a secret question to a player
    CatGiving,
    /// Answerer picks the secret question cost
    CatCostSetting {
        /// Lowest selectable cost
        minimum: i32,
        /// Highest selectable cost
        maximum: i32,
        /// Cost granularity
        step: i32,
    },
    /// Current staker makes an auction stake
    AuctionStakeMaking {
        /// Allowed stake variants by wire code (nominal, sum, pass, all-in)
        variants: [bool; 4],
    },
    /// Showman resolves an equal-sum tie by picking the next staker
    NextPersonStakeMaking,
    /// Every living player commits a final-round stake
    FinalStakeMaking,
    /// Current deleter removes a final theme
    FinalThemeDeleting,
    /// Showman resolves an equal-sum tie by picking the next deleter
    NextPersonFinalThemeDeleting,
    /// Other players vote on a disputed ruling
    AppellationDecision {
        /// `true` when the appellant claims their wrong-marked answer was right
        for_right_answer: bool,
    },
    /// End-of-game reports are being collected
    Reporting,
    /// A deferred buzz resolution is pending
    Wait,
}

impl Decision {
    /// Whether no decision is pending
    pub fn is_none(self) -> bool {
        matches!(self, Decision::None)
    }

    /// Whether an answer (normal or final) is awaited
    pub fn is_answering(self) -> bool {
        matches!(self, Decision::Answering { .. })
    }
}

/// Why the scheduler's current wait was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StopReason {
    /// Not stopped
    #[default]
    None,
    /// The awaited decision arrived
    Decision,
    /// The game was paused
    Pause,
    /// An appellation preempted the flow
    Appellation,
    /// The host or showman stepped the turn pointer
    Move,
    /// A deferred buzz resolution superseded the wait
    Wait,
}

/// One recorded answer outcome of the current question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    /// Player seat index at the time of recording
    pub player_index: usize,
    /// Whether the answer was ruled right
    pub is_right: bool,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_is_none() {
        assert!(Decision::default().is_none());
        assert_eq!(StopReason::default(), StopReason::None);
    }

    #[test]
    fn answering_matches_both_round_kinds() {
        assert!(Decision::Answering { final_round: true }.is_answering());
        assert!(Decision::Answering { final_round: false }.is_answering());
        assert!(!Decision::Pressing.is_answering());
    }
}
