//! Computer participant identities
//!
//! When a seat is switched to a computer participant, the session draws an
//! identity from a pre-generated pool. Pools are built from random
//! pet-style or Roman-style names so that bot names are pronounceable and
//! never collide with the free-place sentinel.

use heck::ToTitleCase;
use serde::{Deserialize, Serialize};

use crate::account::Account;

/// Style of generated bot names
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub enum BotNameStyle {
    /// Roman-style names (praenomen + nomen, optionally + cognomen)
    Roman(usize),
    /// Pet-style names (adjective + animal combinations)
    Petname(usize),
}

impl Default for BotNameStyle {
    /// Default bot name style is Petname with 2 words
    fn default() -> Self {
        Self::Petname(2)
    }
}

impl BotNameStyle {
    /// Generates one random name according to this style
    pub fn get_name(&self) -> String {
        match self {
            Self::Roman(count) => romanname::romanname(romanname::NameConfig {
                praenomen: *count > 2,
            }),
            Self::Petname(count) => loop {
                if let Some(name) = petname::petname(*count as u8, " ") {
                    break name;
                }
            },
        }
        .to_title_case()
    }
}

/// Pre-generated computer participant identities
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotPool {
    /// Identities available for player seats
    pub players: Vec<Account>,
    /// Identities available for the showman chair
    pub showmans: Vec<Account>,
}

impl BotPool {
    /// Generates a pool with the given number of distinct player identities
    /// and one showman identity
    pub fn generate(player_count: usize, style: BotNameStyle) -> Self {
        let mut names: Vec<String> = Vec::new();
        while names.len() < player_count + 1 {
            let name = style.get_name();
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let account = |name: String| Account {
            name,
            is_male: fastrand::bool(),
            is_human: false,
            is_connected: true,
            picture: String::new(),
        };

        let showman = names.pop().map(account);
        Self {
            players: names.into_iter().map(account).collect(),
            showmans: showman.into_iter().collect(),
        }
    }

    /// Names of the available player identities
    pub fn player_names(&self) -> Vec<String> {
        self.players.iter().map(|a| a.name.clone()).collect()
    }

    /// A player identity by name
    pub fn player_by_name(&self, name: &str) -> Option<&Account> {
        self.players.iter().find(|a| a.name == name)
    }

    /// A showman identity by name
    pub fn showman_by_name(&self, name: &str) -> Option<&Account> {
        self.showmans.iter().find(|a| a.name == name)
    }

    /// A random player identity whose name is not in `used`
    pub fn random_unused_player(&self, used: &[String]) -> Option<&Account> {
        let available: Vec<&Account> = self
            .players
            .iter()
            .filter(|a| !used.contains(&a.name))
            .collect();
        if available.is_empty() {
            None
        } else {
            Some(available[fastrand::usize(..available.len())])
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn generated_pool_has_distinct_names() {
        let pool = BotPool::generate(6, BotNameStyle::default());
        assert_eq!(pool.players.len(), 6);
        assert_eq!(pool.showmans.len(), 1);

        let mut names = pool.player_names();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn random_unused_player_skips_used_names() {
        let pool = BotPool::generate(3, BotNameStyle::Petname(2));
        let used = vec![pool.players[0].name.clone(), pool.players[1].name.clone()];
        let picked = pool.random_unused_player(&used).unwrap();
        assert_eq!(picked.name, pool.players[2].name);
    }

    #[test]
    fn exhausted_pool_yields_none() {
        let pool = BotPool::generate(2, BotNameStyle::Petname(2));
        let used = pool.player_names();
        assert!(pool.random_unused_player(&used).is_none());
    }

    #[test]
    fn roman_names_are_title_cased() {
        let name = BotNameStyle::Roman(3).get_name();
        assert!(!name.is_empty());
        assert!(name.chars().next().unwrap().is_uppercase());
    }
}
