//! Question engine
//!
//! The session drives its question flow through the [`QuestionEngine`]
//! trait: traversal position within the loaded package, which questions
//! remain, and the legality of forward/backward moves. [`PackageEngine`] is
//! the standard implementation over an in-memory [`Package`] tree
//! (rounds → themes → questions). Package parsing from any on-disk format
//! belongs to the hosting application, not to this crate.

use serde::{Deserialize, Serialize};

/// How a question is played once selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QuestionKind {
    /// Regular question: button race among all eligible players
    #[default]
    Simple,
    /// Secret question: the chooser hands it to a player of their choice
    Secret,
    /// Stake question: an auction decides the answerer and the price
    Stake,
}

/// Selectable cost bounds of a secret question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRange {
    /// Lowest selectable cost
    pub minimum: i32,
    /// Highest selectable cost
    pub maximum: i32,
    /// Cost granularity
    pub step: i32,
}

/// One question of a theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Nominal price
    pub price: i32,
    /// Question text
    pub text: String,
    /// Canonical right answers; the first one is used for reveals
    pub right: Vec<String>,
    /// Known wrong answers, fed to the bot wrong-answer pool
    pub wrong: Vec<String>,
    /// Play mode
    pub kind: QuestionKind,
    /// Secret questions may let the receiver pick the cost
    pub cost_range: Option<CostRange>,
}

/// One theme of a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    /// Theme name
    pub name: String,
    /// Questions in table order
    pub questions: Vec<Question>,
}

/// Round flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RoundKind {
    /// Table round: chooser picks, players race
    #[default]
    Standard,
    /// Final round: themes are deleted down to one, everyone stakes blind
    Final,
}

/// One round of a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// Round name
    pub name: String,
    /// Round flavor
    pub kind: RoundKind,
    /// Themes in table order
    pub themes: Vec<Theme>,
}

/// A loaded question package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Package name
    pub name: String,
    /// Rounds in play order
    pub rounds: Vec<Round>,
}

/// What the engine reports after a forward move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new round was entered
    Round {
        /// Index of the entered round
        index: usize,
    },
    /// The current round still has active questions to choose from
    ChooseQuestion,
    /// The package is exhausted
    End,
}

/// Traversal contract consumed by the session
///
/// The session never inspects package internals beyond this trait plus the
/// read-only accessors of the current round; everything else (selection
/// bookkeeping, played markers) is the engine's business.
pub trait QuestionEngine {
    /// Index of the current round
    fn round_index(&self) -> usize;
    /// Theme index of the current selection
    fn theme_index(&self) -> usize;
    /// Question index of the current selection
    fn question_index(&self) -> usize;

    /// Whether the previous question of this round can be restored
    fn can_move_back(&self) -> bool;
    /// Whether an earlier round exists
    fn can_move_back_round(&self) -> bool;
    /// Whether a later round exists
    fn can_move_next_round(&self) -> bool;

    /// Advances: enters the first/next round or reports remaining questions
    fn move_next(&mut self) -> EngineEvent;
    /// Restores the most recently played question of this round
    fn move_back(&mut self) -> Option<(usize, usize)>;
    /// Jumps to the next round
    fn move_next_round(&mut self) -> bool;
    /// Jumps to the previous round
    fn move_back_round(&mut self) -> bool;

    /// Selects an active question; `None` when the coordinates are not playable
    fn select_question(&mut self, theme: usize, question: usize) -> Option<&Question>;
    /// Selects the first active question of a theme; `None` when the theme
    /// is exhausted
    fn select_theme(&mut self, theme: usize) -> Option<&Question>;
    /// Selects the first active question, scanning the table in order
    fn select_first_active(&mut self) -> Option<(usize, usize)>;
    /// Marks the current selection as played
    fn finish_question(&mut self);
    /// Marks the current selection as played without playing it out
    fn skip_question(&mut self);

    /// The currently selected question
    fn current_question(&self) -> Option<&Question>;
    /// The current round
    fn current_round(&self) -> Option<&Round>;
    /// Theme names of the current round
    fn theme_names(&self) -> Vec<String>;
    /// Remaining prices per theme; `None` marks a played cell
    fn table(&self) -> Vec<Vec<Option<i32>>>;
    /// Number of active questions left in the current round
    fn remaining_question_count(&self) -> usize;
    /// Marks a whole theme as played (final-round deletion)
    fn delete_theme(&mut self, index: usize);
    /// Indices of themes that still have active questions
    fn active_theme_indices(&self) -> Vec<usize>;
}

/// Standard [`QuestionEngine`] over an in-memory [`Package`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEngine {
    package: Package,
    round_index: usize,
    started: bool,
    /// Played markers of the current round
    played: Vec<Vec<bool>>,
    /// Play order within the current round, for backward moves
    history: Vec<(usize, usize)>,
    selection: Option<(usize, usize)>,
}

impl PackageEngine {
    /// Creates an engine positioned before the first round
    pub fn new(package: Package) -> Self {
        Self {
            package,
            round_index: 0,
            started: false,
            played: Vec::new(),
            history: Vec::new(),
            selection: None,
        }
    }

    /// The loaded package
    pub fn package(&self) -> &Package {
        &self.package
    }

    fn enter_round(&mut self, index: usize) {
        self.round_index = index;
        self.selection = None;
        self.history.clear();
        self.played = self.package.rounds[index]
            .themes
            .iter()
            .map(|theme| vec![false; theme.questions.len()])
            .collect();
    }

    fn is_active(&self, theme: usize, question: usize) -> bool {
        self.played
            .get(theme)
            .and_then(|row| row.get(question))
            .is_some_and(|played| !played)
    }
}

impl QuestionEngine for PackageEngine {
    fn round_index(&self) -> usize {
        self.round_index
    }

    fn theme_index(&self) -> usize {
        self.selection.map_or(0, |(theme, _)| theme)
    }

    fn question_index(&self) -> usize {
        self.selection.map_or(0, |(_, question)| question)
    }

    fn can_move_back(&self) -> bool {
        !self.history.is_empty()
    }

    fn can_move_back_round(&self) -> bool {
        self.started && self.round_index > 0
    }

    fn can_move_next_round(&self) -> bool {
        self.started && self.round_index + 1 < self.package.rounds.len()
    }

    fn move_next(&mut self) -> EngineEvent {
        if !self.started {
            if self.package.rounds.is_empty() {
                return EngineEvent::End;
            }
            self.started = true;
            self.enter_round(0);
            return EngineEvent::Round { index: 0 };
        }

        if self.remaining_question_count() > 0 {
            return EngineEvent::ChooseQuestion;
        }

        if self.round_index + 1 < self.package.rounds.len() {
            let next = self.round_index + 1;
            self.enter_round(next);
            EngineEvent::Round { index: next }
        } else {
            EngineEvent::End
        }
    }

    fn move_back(&mut self) -> Option<(usize, usize)> {
        let (theme, question) = self.history.pop()?;
        self.played[theme][question] = false;
        self.selection = None;
        Some((theme, question))
    }

    fn move_next_round(&mut self) -> bool {
        if self.can_move_next_round() {
            let next = self.round_index + 1;
            self.enter_round(next);
            true
        } else {
            false
        }
    }

    fn move_back_round(&mut self) -> bool {
        if self.can_move_back_round() {
            let previous = self.round_index - 1;
            self.enter_round(previous);
            true
        } else {
            false
        }
    }

    fn select_question(&mut self, theme: usize, question: usize) -> Option<&Question> {
        if !self.is_active(theme, question) {
            return None;
        }
        self.selection = Some((theme, question));
        self.package
            .rounds
            .get(self.round_index)
            .and_then(|round| round.themes.get(theme))
            .and_then(|t| t.questions.get(question))
    }

    fn select_theme(&mut self, theme: usize) -> Option<&Question> {
        let question = self
            .played
            .get(theme)?
            .iter()
            .position(|played| !*played)?;
        self.select_question(theme, question)
    }

    fn select_first_active(&mut self) -> Option<(usize, usize)> {
        let rows = self.played.len();
        for theme in 0..rows {
            for question in 0..self.played[theme].len() {
                if !self.played[theme][question] {
                    self.selection = Some((theme, question));
                    return Some((theme, question));
                }
            }
        }
        None
    }

    fn finish_question(&mut self) {
        if let Some((theme, question)) = self.selection.take() {
            self.played[theme][question] = true;
            self.history.push((theme, question));
        }
    }

    fn skip_question(&mut self) {
        self.finish_question();
    }

    fn current_question(&self) -> Option<&Question> {
        let (theme, question) = self.selection?;
        self.package
            .rounds
            .get(self.round_index)
            .and_then(|round| round.themes.get(theme))
            .and_then(|t| t.questions.get(question))
    }

    fn current_round(&self) -> Option<&Round> {
        if self.started {
            self.package.rounds.get(self.round_index)
        } else {
            None
        }
    }

    fn theme_names(&self) -> Vec<String> {
        self.current_round()
            .map(|round| round.themes.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default()
    }

    fn table(&self) -> Vec<Vec<Option<i32>>> {
        let Some(round) = self.current_round() else {
            return Vec::new();
        };
        round
            .themes
            .iter()
            .enumerate()
            .map(|(theme_index, theme)| {
                theme
                    .questions
                    .iter()
                    .enumerate()
                    .map(|(question_index, question)| {
                        if self.is_active(theme_index, question_index) {
                            Some(question.price)
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .collect()
    }

    fn remaining_question_count(&self) -> usize {
        self.played
            .iter()
            .map(|row| row.iter().filter(|played| !**played).count())
            .sum()
    }

    fn delete_theme(&mut self, index: usize) {
        if let Some(row) = self.played.get_mut(index) {
            for cell in row {
                *cell = true;
            }
        }
    }

    fn active_theme_indices(&self) -> Vec<usize> {
        self.played
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|played| !*played))
            .map(|(index, _)| index)
            .collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn simple_question(price: i32) -> Question {
        Question {
            price,
            text: format!("Question for {price}"),
            right: vec!["Right".to_owned()],
            wrong: vec!["Wrong".to_owned()],
            kind: QuestionKind::Simple,
            cost_range: None,
        }
    }

    fn test_package() -> Package {
        Package {
            name: "Test".to_owned(),
            rounds: vec![
                Round {
                    name: "Round 1".to_owned(),
                    kind: RoundKind::Standard,
                    themes: vec![
                        Theme {
                            name: "History".to_owned(),
                            questions: vec![simple_question(100), simple_question(200)],
                        },
                        Theme {
                            name: "Science".to_owned(),
                            questions: vec![simple_question(100)],
                        },
                    ],
                },
                Round {
                    name: "Final".to_owned(),
                    kind: RoundKind::Final,
                    themes: vec![
                        Theme {
                            name: "Art".to_owned(),
                            questions: vec![simple_question(0)],
                        },
                        Theme {
                            name: "Cinema".to_owned(),
                            questions: vec![simple_question(0)],
                        },
                    ],
                },
            ],
        }
    }

    #[test]
    fn move_next_enters_rounds_in_order() {
        let mut engine = PackageEngine::new(test_package());
        assert_eq!(engine.move_next(), EngineEvent::Round { index: 0 });
        assert_eq!(engine.move_next(), EngineEvent::ChooseQuestion);
        assert_eq!(engine.remaining_question_count(), 3);
    }

    #[test]
    fn playing_out_a_round_advances_to_the_next() {
        let mut engine = PackageEngine::new(test_package());
        engine.move_next();
        while engine.select_first_active().is_some() {
            engine.finish_question();
        }
        assert_eq!(engine.move_next(), EngineEvent::Round { index: 1 });
        assert_eq!(engine.move_next(), EngineEvent::ChooseQuestion);
    }

    #[test]
    fn select_question_rejects_played_cells() {
        let mut engine = PackageEngine::new(test_package());
        engine.move_next();
        assert!(engine.select_question(0, 0).is_some());
        engine.finish_question();
        assert!(engine.select_question(0, 0).is_none());
        assert!(engine.select_question(5, 0).is_none());
    }

    #[test]
    fn move_back_restores_last_played_question() {
        let mut engine = PackageEngine::new(test_package());
        engine.move_next();
        engine.select_question(0, 1);
        engine.finish_question();
        assert!(engine.can_move_back());
        assert_eq!(engine.move_back(), Some((0, 1)));
        assert!(engine.select_question(0, 1).is_some());
        assert!(!engine.can_move_back());
    }

    #[test]
    fn round_jumps_respect_bounds() {
        let mut engine = PackageEngine::new(test_package());
        engine.move_next();
        assert!(!engine.can_move_back_round());
        assert!(engine.can_move_next_round());
        assert!(engine.move_next_round());
        assert!(!engine.can_move_next_round());
        assert!(engine.move_back_round());
        assert_eq!(engine.round_index(), 0);
    }

    #[test]
    fn select_theme_picks_its_first_active_question() {
        let mut engine = PackageEngine::new(test_package());
        engine.move_next();
        engine.select_question(0, 0);
        engine.finish_question();

        assert!(engine.select_theme(0).is_some());
        assert_eq!(engine.question_index(), 1);

        engine.finish_question();
        assert!(engine.select_theme(0).is_none());
    }

    #[test]
    fn theme_deletion_empties_the_theme() {
        let mut engine = PackageEngine::new(test_package());
        engine.move_next();
        engine.move_next_round();
        assert_eq!(engine.active_theme_indices(), vec![0, 1]);
        engine.delete_theme(0);
        assert_eq!(engine.active_theme_indices(), vec![1]);
    }

    #[test]
    fn table_marks_played_cells() {
        let mut engine = PackageEngine::new(test_package());
        engine.move_next();
        engine.select_question(0, 0);
        engine.finish_question();
        assert_eq!(
            engine.table(),
            vec![vec![None, Some(200)], vec![Some(100)]]
        );
    }

    #[test]
    fn empty_package_ends_immediately() {
        let mut engine = PackageEngine::new(Package::default());
        assert_eq!(engine.move_next(), EngineEvent::End);
    }
}
