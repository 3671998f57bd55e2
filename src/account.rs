//! Participant accounts and roster management
//!
//! This module holds the data model for everyone attached to a game session:
//! the showman, the players and the viewers. Seats for the main roles are
//! never removed implicitly; a vacated seat is reset to the free-place
//! sentinel instead so that index-based references stay meaningful.
//! The roster also enforces the name-uniqueness invariant: while connected,
//! a name is unique across all three groups (free seats are exempt).

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use web_time::SystemTime;

use crate::{constants, session::Tunnel};

/// The role a participant occupies in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The showman reading questions and validating answers
    Showman,
    /// A seated player
    Player,
    /// A spectator with no seat
    Viewer,
}

impl Display for Role {
    /// Formats the role using its lowercase wire token
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Showman => "showman",
            Role::Player => "player",
            Role::Viewer => "viewer",
        })
    }
}

impl FromStr for Role {
    type Err = ();

    /// Parses a role from its lowercase wire token
    ///
    /// # Errors
    ///
    /// Returns `Err(())` for any unknown token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "showman" => Ok(Role::Showman),
            "player" => Ok(Role::Player),
            "viewer" => Ok(Role::Viewer),
            _ => Err(()),
        }
    }
}

/// Common identity shared by every participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Display name; the free-place sentinel when the seat is vacant
    pub name: String,
    /// Used for grammatical agreement in replics
    pub is_male: bool,
    /// Whether this account is a human (false for computer participants)
    pub is_human: bool,
    /// Whether the account currently has a live connection
    pub is_connected: bool,
    /// Avatar location: a URI or an inline reference, empty when unset
    pub picture: String,
}

impl Account {
    /// Creates a vacant human seat carrying the free-place sentinel
    pub fn free_place() -> Self {
        Self {
            name: constants::roster::FREE_PLACE.to_owned(),
            is_male: false,
            is_human: true,
            is_connected: false,
            picture: String::new(),
        }
    }

    /// Whether the seat is vacant
    pub fn is_free(&self) -> bool {
        self.name == constants::roster::FREE_PLACE
    }
}

/// A main-role participant (showman or player) with a pre-game readiness flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Underlying identity
    pub account: Account,
    /// Pre-game readiness; reset whenever the seat changes hands
    pub ready: bool,
}

impl Person {
    /// Creates a vacant main-role seat
    pub fn free_place() -> Self {
        Self {
            account: Account::free_place(),
            ready: false,
        }
    }

    /// The participant's name
    pub fn name(&self) -> &str {
        &self.account.name
    }
}

/// A seated player with all per-question transient state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Main-role identity and readiness
    pub person: Person,
    /// Current score; may go negative
    pub sum: i32,
    /// Per-round eligibility marker, reused by several decision flows
    pub flag: bool,
    /// Whether the player may press the button for the current question
    pub can_press: bool,
    /// Whether the player is still alive in the final round
    pub in_game: bool,
    /// Whether the player participates in the current auction
    pub stake_making: bool,
    /// The answer text recorded for the current question
    pub answer: String,
    /// Showman ruled the answer right
    pub answer_is_right: bool,
    /// Showman ruled the answer wrong (or the answer is a known-wrong bot draw)
    pub answer_is_wrong: bool,
    /// Stake committed in the final round; -1 while unset
    pub final_stake: i32,
    /// Accumulated button penalty in deciseconds, capped
    pub ping_penalty: u32,
    /// Last premature button press; gates re-pressing for the blocking window
    pub last_bad_try_time: Option<SystemTime>,
}

impl Player {
    /// Creates a vacant player seat
    pub fn free_place() -> Self {
        Self {
            person: Person::free_place(),
            sum: 0,
            flag: false,
            can_press: false,
            in_game: true,
            stake_making: false,
            answer: String::new(),
            answer_is_right: false,
            answer_is_wrong: false,
            final_stake: -1,
            ping_penalty: 0,
            last_bad_try_time: None,
        }
    }

    /// Wraps an existing identity in a fresh player seat
    pub fn from_account(account: Account) -> Self {
        Self {
            person: Person {
                account,
                ready: false,
            },
            ..Self::free_place()
        }
    }

    /// The player's name
    pub fn name(&self) -> &str {
        &self.person.account.name
    }

    /// The player's underlying account
    pub fn account(&self) -> &Account {
        &self.person.account
    }

    /// Clears the per-question transient state
    pub fn reset_for_question(&mut self) {
        self.flag = false;
        self.can_press = false;
        self.answer.clear();
        self.answer_is_right = false;
        self.answer_is_wrong = false;
    }
}

/// Where a named participant sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    /// The showman chair
    Showman,
    /// Player seat by index
    Player(usize),
    /// Viewer slot by index
    Viewer(usize),
}

/// The full set of participants of one session
///
/// Mutated only by the owning [`Game`](crate::game::Game); all roster
/// mutation funnels through the session to preserve the single-writer
/// discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    /// The showman chair
    pub showman: Person,
    /// Player seats, index-addressed by the wire protocol
    pub players: Vec<Player>,
    /// Spectators; removed outright on departure rather than freed
    pub viewers: Vec<Account>,
}

impl Roster {
    /// Creates a roster with the given number of vacant player seats
    pub fn new(player_count: usize) -> Self {
        Self {
            showman: Person::free_place(),
            players: (0..player_count).map(|_| Player::free_place()).collect(),
            viewers: Vec::new(),
        }
    }

    /// Whether a non-free participant with this name is present anywhere
    pub fn contains_name(&self, name: &str) -> bool {
        self.find_seat(name).is_some()
    }

    /// Finds the seat of a named participant, skipping free places
    pub fn find_seat(&self, name: &str) -> Option<Seat> {
        if name == constants::roster::FREE_PLACE {
            return None;
        }
        if self.showman.name() == name {
            return Some(Seat::Showman);
        }
        if let Some(i) = self.players.iter().position(|p| p.name() == name) {
            return Some(Seat::Player(i));
        }
        self.viewers
            .iter()
            .position(|v| v.name == name)
            .map(Seat::Viewer)
    }

    /// Returns the account occupying a seat
    pub fn account_at(&self, seat: Seat) -> &Account {
        match seat {
            Seat::Showman => &self.showman.account,
            Seat::Player(i) => self.players[i].account(),
            Seat::Viewer(i) => &self.viewers[i],
        }
    }

    /// Returns the account of a named participant
    pub fn find_account(&self, name: &str) -> Option<&Account> {
        self.find_seat(name).map(|seat| self.account_at(seat))
    }

    /// The index of a connected player with this name
    pub fn player_index(&self, name: &str) -> Option<usize> {
        match self.find_seat(name)? {
            Seat::Player(i) => Some(i),
            _ => None,
        }
    }

    /// Iterates over the main persons: the showman first, then every player
    pub fn main_persons(&self) -> impl Iterator<Item = &Person> {
        std::iter::once(&self.showman).chain(self.players.iter().map(|p| &p.person))
    }

    /// Names of every non-free participant, in roster order
    pub fn person_names(&self) -> Vec<String> {
        std::iter::once(self.showman.name())
            .chain(self.players.iter().map(Player::name))
            .chain(self.viewers.iter().map(|v| v.name.as_str()))
            .filter(|n| *n != constants::roster::FREE_PLACE)
            .map(str::to_owned)
            .collect()
    }

    /// Sends a raw protocol line to one named participant
    pub fn send_to<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &self,
        name: &str,
        text: &str,
        tunnel_finder: F,
    ) {
        if let Some(tunnel) = tunnel_finder(name) {
            tunnel.send(text);
        }
    }

    /// Broadcasts a raw protocol line to every connected participant
    pub fn announce<T: Tunnel, F: Fn(&str) -> Option<T>>(&self, text: &str, tunnel_finder: F) {
        for name in self.person_names() {
            if let Some(tunnel) = tunnel_finder(&name) {
                tunnel.send(text);
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn free_place_is_not_findable() {
        let roster = Roster::new(3);
        assert!(!roster.contains_name(constants::roster::FREE_PLACE));
        assert_eq!(roster.find_seat(constants::roster::FREE_PLACE), None);
    }

    #[test]
    fn find_seat_covers_all_groups() {
        let mut roster = Roster::new(2);
        roster.showman.account.name = "Host".to_owned();
        roster.players[1].person.account.name = "Alice".to_owned();
        roster.viewers.push(Account {
            name: "Bob".to_owned(),
            is_male: true,
            is_human: true,
            is_connected: true,
            picture: String::new(),
        });

        assert_eq!(roster.find_seat("Host"), Some(Seat::Showman));
        assert_eq!(roster.find_seat("Alice"), Some(Seat::Player(1)));
        assert_eq!(roster.find_seat("Bob"), Some(Seat::Viewer(0)));
        assert_eq!(roster.find_seat("Nobody"), None);
    }

    #[test]
    fn role_round_trips_through_wire_token() {
        for role in [Role::Showman, Role::Player, Role::Viewer] {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
        assert!("SHOWMAN".parse::<Role>().is_err());
    }

    #[test]
    fn reset_for_question_keeps_score() {
        let mut player = Player::free_place();
        player.sum = 500;
        player.flag = true;
        player.answer = "something".to_owned();
        player.reset_for_question();
        assert_eq!(player.sum, 500);
        assert!(!player.flag);
        assert!(player.answer.is_empty());
    }
}
