//! Game session settings
//!
//! Settings are fixed at session creation and validated up front with
//! `garde`, the way slide configurations are validated before a game is
//! allowed to start. Timings are stored as durations and transmitted to
//! clients in the units each wire message expects.

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

type ValidationResult = garde::Result;

/// Validates that a duration falls within the given bounds in seconds
fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&val.as_secs()) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_SECONDS},{MAX_SECONDS}]",
        )))
    }
}

fn validate_thinking(val: &Duration) -> ValidationResult {
    validate_duration::<1, 120>("time_for_thinking_on_question", val)
}

fn validate_choosing(val: &Duration) -> ValidationResult {
    validate_duration::<5, 120>("time_for_choosing_question", val)
}

fn validate_printing_answer(val: &Duration) -> ValidationResult {
    validate_duration::<5, 120>("time_for_printing_answer", val)
}

fn validate_stake_making(val: &Duration) -> ValidationResult {
    validate_duration::<5, 120>("time_for_making_stake", val)
}

fn validate_final_thinking(val: &Duration) -> ValidationResult {
    validate_duration::<5, 240>("time_for_final_thinking", val)
}

fn validate_showman_decision(val: &Duration) -> ValidationResult {
    validate_duration::<5, 300>("time_for_showman_decisions", val)
}

fn validate_media_delay(val: &Duration) -> ValidationResult {
    validate_duration::<0, 120>("time_for_media_delay", val)
}

fn validate_blocking_button(val: &Duration) -> ValidationResult {
    validate_duration::<1, 10>("time_for_blocking_button", val)
}

/// Timings of one game session
///
/// Every wait the scheduler arms is derived from one of these values.
#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct TimeSettings {
    /// How long the chooser has to pick a question
    #[garde(custom(|v, _| validate_choosing(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_for_choosing_question: Duration,
    /// How long the button window stays open
    #[garde(custom(|v, _| validate_thinking(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_for_thinking_on_question: Duration,
    /// How long the answerer has to submit an answer
    #[garde(custom(|v, _| validate_printing_answer(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_for_printing_answer: Duration,
    /// How long a staker has to make a stake
    #[garde(custom(|v, _| validate_stake_making(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_for_making_stake: Duration,
    /// How long final-round thinking lasts
    #[garde(custom(|v, _| validate_final_thinking(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_for_final_thinking: Duration,
    /// How long the showman has for any of their decisions
    #[garde(custom(|v, _| validate_showman_decision(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_for_showman_decisions: Duration,
    /// Extra wait granted after media playback
    #[garde(custom(|v, _| validate_media_delay(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_for_media_delay: Duration,
    /// Button re-press blocking window after a premature press
    #[garde(custom(|v, _| validate_blocking_button(v)))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_for_blocking_button: Duration,
}

impl Default for TimeSettings {
    fn default() -> Self {
        Self {
            time_for_choosing_question: Duration::from_secs(30),
            time_for_thinking_on_question: Duration::from_secs(5),
            time_for_printing_answer: Duration::from_secs(25),
            time_for_making_stake: Duration::from_secs(30),
            time_for_final_thinking: Duration::from_secs(45),
            time_for_showman_decisions: Duration::from_secs(30),
            time_for_media_delay: Duration::from_secs(0),
            time_for_blocking_button: Duration::from_secs(3),
        }
    }
}

/// Global configuration of one game session
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GameSettings {
    /// Displayed name of the network game
    #[garde(length(max = 100))]
    pub network_game_name: String,
    /// Join password; `None` disables the check
    #[garde(inner(length(max = 100)))]
    pub network_game_password: Option<String>,
    /// Whether the game starts and advances itself without a human host
    #[garde(skip)]
    pub is_automatic: bool,
    /// Whether the session auto-advances when the host drops mid-pause
    #[garde(skip)]
    pub managed: bool,
    /// Oral mode: the showman may substitute for players in adjacent flows
    #[garde(skip)]
    pub oral: bool,
    /// Whether pressing before the question is fully read is allowed
    #[garde(skip)]
    pub false_start: bool,
    /// Whether buzz resolution is deferred by accumulated ping penalties
    #[garde(skip)]
    pub use_ping_penalty: bool,
    /// Question text streaming speed, characters per second
    #[garde(range(min = 1, max = 100))]
    pub reading_speed: u32,
    /// Session timings
    #[garde(dive)]
    pub time: TimeSettings,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            network_game_name: String::new(),
            network_game_password: None,
            is_automatic: false,
            managed: false,
            oral: false,
            false_start: true,
            use_ping_penalty: false,
            reading_speed: 20,
            time: TimeSettings::default(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        assert!(GameSettings::default().validate().is_ok());
    }

    #[test]
    fn blocking_button_out_of_bounds() {
        let mut settings = GameSettings::default();
        settings.time.time_for_blocking_button = Duration::from_secs(60);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn reading_speed_out_of_bounds() {
        let settings = GameSettings {
            reading_speed: 0,
            ..GameSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_round_trip_through_serde() {
        let settings = GameSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: GameSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.time.time_for_thinking_on_question,
            settings.time.time_for_thinking_on_question
        );
        assert_eq!(back.reading_speed, settings.reading_speed);
    }
}
