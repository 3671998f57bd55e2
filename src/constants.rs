//! Configuration constants for the game session engine
//!
//! This module contains the limits and fixed values used throughout the
//! session engine: roster bounds, wire protocol characters, timer layout
//! and auction arithmetic.

/// Roster configuration constants
pub mod roster {
    /// Name carried by a vacant seat; exempt from the name-uniqueness rule
    pub const FREE_PLACE: &str = " ";
    /// Maximum number of player seats in a single game
    pub const MAX_PLAYERS: usize = 12;
    /// Minimum number of player seats a game must keep
    pub const MIN_PLAYERS: usize = 2;
    /// Maximum length of a participant name in characters
    pub const MAX_NAME_LENGTH: usize = 30;
    /// Maximum size of an inline avatar payload in bytes
    pub const MAX_AVATAR_SIZE: usize = 1024 * 1024;
}

/// Wire protocol constants
pub mod wire {
    /// Separator between tokens of a single message
    pub const ARG_SEPARATOR: char = '\n';
}

/// Timer layout constants
pub mod timers {
    /// Number of independent display timers (round, thinking, pre-game)
    pub const TIMERS_COUNT: usize = 3;
    /// Countdown before an automatic game starts, in deciseconds
    pub const AUTOMATIC_GAME_START_DURATION: i64 = 600;
}

/// Auction (stake question) arithmetic constants
pub mod stakes {
    /// Stakes must be multiples of this step
    pub const STAKE_STEP: i32 = 100;
}

/// Button (buzz-in) handling constants
pub mod button {
    /// Upper bound on the accumulated ping penalty, in deciseconds
    pub const MAX_PING_PENALTY: u32 = 2;
}
