//! Core game session logic
//!
//! This module contains the session actor: the single object that receives
//! protocol messages from every participant, validates them against the
//! currently pending decision, mutates the shared game state, drives the
//! question engine and broadcasts the resulting deltas. The host harness
//! owns the exclusive scope: every entry point here ([`Game::join`],
//! [`Game::receive_message`], [`Game::receive_alarm`]) must be called from
//! one serialized context (an actor mailbox or a mutex), which is the only
//! concurrency-correctness mechanism the session relies on.
//!
//! Nothing in this module propagates an error past the dispatch boundary:
//! protocol violations are ignored, domain refusals are answered to the
//! offending sender only, and internal inconsistencies are reported through
//! `tracing` while the session keeps running.

use std::{collections::HashSet, fmt::Debug, time::Duration};

use garde::Validate;
use itertools::Itertools;
use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::SystemTime;

use crate::{
    account::{Account, Person, Player, Role, Roster, Seat},
    constants,
    decision::{AnswerResult, Decision, StopReason},
    engine::{EngineEvent, QuestionEngine, QuestionKind, RoundKind},
    lexicon::{Lexicon, Phrase},
    names::BotPool,
    protocol::{
        self, AccountSummary, ClientCommand, ConfigCommand, FrameError, ServerMessage, StakeKind,
    },
    scheduler::{AlarmMessage, Step, TurnScheduler},
    session::{ClientGateway, Tunnel},
    settings::GameSettings,
    timers::{DisplayTimers, TimerSlot},
};

/// Coarse phase of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GameStage {
    /// Lobby: seats are being filled
    #[default]
    Before,
    /// The game was started but no round has begun yet
    Begin,
    /// A table round is in progress
    Round,
    /// The final round is in progress
    Final,
    /// The game is over; reports are being collected
    After,
}

impl GameStage {
    /// Wire name of the stage
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Before => "Before",
            Self::Begin => "Begin",
            Self::Round => "Round",
            Self::Final => "Final",
            Self::After => "After",
        }
    }
}

/// Why a join request was rejected
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinError {
    /// The configured password did not match
    #[error("wrong password")]
    WrongPassword,
    /// A connected participant already carries this name
    #[error("name is already in game")]
    NameTaken,
    /// The name failed moderation or length checks
    #[error("name is not allowed")]
    InappropriateName,
    /// No seat matches the requested role
    #[error("no free place")]
    NoFreePlace,
    /// The requested seat exists but is taken
    #[error("place is occupied")]
    PlaceOccupied,
    /// The sender was banned from this session
    #[error("banned from this game")]
    Banned,
}

/// The mutable aggregate owned by the session
///
/// Player-index references use `-1` as the "none" sentinel so that seat
/// removal can re-normalize every reference in one pass
/// (see [`Game::drop_player_index`]).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GameState {
    /// Coarse phase
    pub stage: GameStage,
    /// The single pending decision
    pub decision: Decision,
    /// Whether the scheduler is parked awaiting that decision
    pub is_waiting: bool,
    /// Oral mode is active for this session
    pub is_oral: bool,
    /// The showman may currently substitute for the deciding player
    pub is_oral_now: bool,
    /// Player privileged to pick the next question; -1 = none
    pub chooser_index: i32,
    /// Player entitled to answer; -1 = none
    pub answerer_index: i32,
    /// Player currently staking; -1 = none
    pub staker_index: i32,
    /// Player whose ruling is being appealed; -1 = none
    pub appelaer_index: i32,
    /// Auction turn order permutation; -1 entries are unresolved
    pub order: Vec<i32>,
    /// Position within [`Self::order`]; -1 before the auction starts
    pub order_index: i32,
    /// Recorded answer outcomes of the current question
    pub question_history: Vec<AnswerResult>,
    /// Whether the game is paused
    pub pause: bool,
    /// Wall clock at pause entry
    pub pause_start_time: Option<SystemTime>,
    /// Last requested turn step direction
    pub move_direction: i32,
    /// One-shot gate for starting an appellation
    pub allow_appellation: bool,
    /// Who started the pending appellation
    pub appellation_source: String,
    /// `true` when the appellant claims their wrong mark was wrong
    pub appellation_for_right_answer: bool,
    /// Votes received in the pending appellation
    pub appellation_votes_received: usize,
    /// "The answer was right" votes received
    pub appellation_right_votes: usize,
    /// A question is being played (buttons may matter)
    pub is_question_playing: bool,
    /// The thinking countdown is running
    pub is_thinking: bool,
    /// Thinking was running when the pause started
    pub is_thinking_paused: bool,
    /// Media is being played back
    pub is_playing_media: bool,
    /// Media was playing when the pause started
    pub is_playing_media_paused: bool,
    /// Participants still expected to acknowledge the current media element
    pub have_viewed_atom: i32,
    /// Reports still outstanding at game end
    pub reports_count: i32,
    /// Reports that carried a comment
    pub accepted_reports: usize,
    /// Collected report comments
    pub report_comments: Vec<String>,
    /// Wrong answers already drawn for bots within this question
    pub used_wrong_versions: Vec<String>,
    /// Reward for a right answer to the current question
    pub cur_price_right: i32,
    /// Deduction for a wrong answer to the current question
    pub cur_price_wrong: i32,
    /// Highest auction stake so far; -1 before any stake
    pub stake: i32,
    /// Stake recorded by the last `STAKE` message
    pub stake_kind: Option<StakeKind>,
    /// Sum accompanying a raised stake
    pub stake_sum: i32,
    /// Final-round stakes still outstanding
    pub num_of_stakers: i32,
    /// A buzz resolution is deferred by a ping penalty
    pub is_deferring_answer: bool,
    /// Penalty of the deferred buzz, in deciseconds
    pub penalty: u32,
    /// When the deferred buzz was received
    pub penalty_start_time: Option<SystemTime>,
    /// Whether `MARK` is currently accepted
    pub can_mark_question: bool,
    /// Marked (round, theme, question) coordinates for the report
    pub marked_questions: Vec<(usize, usize, usize)>,
    /// Theme picked for deletion; -1 = none
    pub theme_index_to_delete: i32,
    /// Final-round deleter rotation (player indices, -1 = showman decides)
    pub final_deleters: Vec<i32>,
    /// Cursor into [`Self::final_deleters`]
    pub deleter_cursor: usize,
    /// Player currently deleting a theme; -1 = none
    pub current_deleter: i32,
    /// Final answers expected before the round-level flow proceeds
    pub final_answers_expected: usize,
    /// Final answers received so far
    pub final_answers_received: usize,
    /// Cursor of the final answer validation walk; -1 before it starts
    pub announce_index: i32,
    /// The showman explicitly validated the current answer
    pub showman_decision: bool,
    /// Forward movement is blocked (e.g. mid-presentation)
    pub move_next_blocked: bool,
    /// The current staker was already prompted for a stake
    pub stake_prompted: bool,
    /// The showman was already prompted for the next staker
    pub next_staker_prompted: bool,
    /// The showman was already prompted for the next deleter
    pub next_deleter_prompted: bool,
    /// The current deleter was already prompted for a theme
    pub delete_prompted: bool,
    /// How much of the round table has been synced to clients (0..=2)
    pub tablo_inform_stage: u8,
    /// Step to restore after an appellation finishes
    pub resume_after_appellation: Option<Step>,
}

impl GameState {
    fn new() -> Self {
        Self {
            chooser_index: -1,
            answerer_index: -1,
            staker_index: -1,
            appelaer_index: -1,
            order_index: -1,
            stake: -1,
            theme_index_to_delete: -1,
            current_deleter: -1,
            announce_index: -1,
            ..Self::default()
        }
    }
}

/// The game session actor
#[derive(Serialize, Deserialize)]
pub struct Game<E: QuestionEngine> {
    engine: E,
    /// Session settings, fixed at creation
    pub settings: GameSettings,
    /// All participants
    pub roster: Roster,
    /// The mutable aggregate
    pub state: GameState,
    scheduler: TurnScheduler,
    timers: DisplayTimers,
    lexicon: Lexicon,
    bots: BotPool,
    /// Participant empowered to issue host-only commands
    pub host_name: Option<String>,
    banned: HashSet<String>,
}

impl<E: QuestionEngine> Debug for Game<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("stage", &self.state.stage)
            .field("decision", &self.state.decision)
            .finish_non_exhaustive()
    }
}

// Construction and small accessors
impl<E: QuestionEngine> Game<E> {
    /// Creates a session over a loaded engine
    ///
    /// # Errors
    ///
    /// Returns the validation report when the settings are out of bounds.
    pub fn new(
        engine: E,
        settings: GameSettings,
        player_count: usize,
        lexicon: Lexicon,
        bots: BotPool,
    ) -> Result<Self, garde::Report> {
        settings.validate()?;
        let player_count = player_count.clamp(
            constants::roster::MIN_PLAYERS,
            constants::roster::MAX_PLAYERS,
        );
        Ok(Self {
            engine,
            settings,
            roster: Roster::new(player_count),
            state: GameState::new(),
            scheduler: TurnScheduler::default(),
            timers: DisplayTimers::default(),
            lexicon,
            bots,
            host_name: None,
            banned: HashSet::new(),
        })
    }

    /// The engine driving the question traversal
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Whether the scheduler currently has a step planned
    pub fn is_running(&self) -> bool {
        !self.scheduler.is_idle()
    }

    fn now() -> SystemTime {
        SystemTime::now()
    }

    fn showman_name(&self) -> String {
        self.roster.showman.name().to_owned()
    }

    fn is_host(&self, sender: &str) -> bool {
        self.host_name.as_deref() == Some(sender)
    }

    fn chooser_name(&self) -> Option<String> {
        usize::try_from(self.state.chooser_index)
            .ok()
            .and_then(|i| self.roster.players.get(i))
            .map(|p| p.name().to_owned())
    }

    fn answerer(&self) -> Option<&Player> {
        usize::try_from(self.state.answerer_index)
            .ok()
            .and_then(|i| self.roster.players.get(i))
    }

    fn staker_name(&self) -> Option<String> {
        usize::try_from(self.state.staker_index)
            .ok()
            .and_then(|i| self.roster.players.get(i))
            .map(|p| p.name().to_owned())
    }
}

// Outbound helpers
impl<E: QuestionEngine> Game<E> {
    fn send<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &self,
        message: &ServerMessage,
        name: &str,
        tunnel_finder: &F,
    ) {
        self.roster.send_to(name, &message.encode(), tunnel_finder);
    }

    fn broadcast<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &self,
        message: &ServerMessage,
        tunnel_finder: &F,
    ) {
        self.roster.announce(&message.encode(), tunnel_finder);
    }

    /// Out-of-band notice shown to everyone
    fn special_replic<T: Tunnel, F: Fn(&str) -> Option<T>>(&self, text: &str, tunnel_finder: &F) {
        self.broadcast(
            &ServerMessage::Replic {
                code: protocol::REPLIC_SPECIAL.to_owned(),
                text: text.to_owned(),
            },
            tunnel_finder,
        );
    }

    /// Refusal notice: printed to the offender, logged for everyone
    fn system_notice<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &self,
        target: &str,
        text: &str,
        tunnel_finder: &F,
    ) {
        self.send(
            &ServerMessage::Print {
                text: text.to_owned(),
            },
            target,
            tunnel_finder,
        );
        self.broadcast(
            &ServerMessage::Replic {
                code: protocol::REPLIC_SYSTEM.to_owned(),
                text: text.to_owned(),
            },
            tunnel_finder,
        );
    }

    fn inform_sums<T: Tunnel, F: Fn(&str) -> Option<T>>(&self, tunnel_finder: &F) {
        self.broadcast(
            &ServerMessage::Sums {
                values: self.roster.players.iter().map(|p| p.sum).collect(),
            },
            tunnel_finder,
        );
    }

    fn inform_stage<T: Tunnel, F: Fn(&str) -> Option<T>>(&self, tunnel_finder: &F) {
        self.broadcast(
            &ServerMessage::Stage {
                name: self.state.stage.wire_name().to_owned(),
            },
            tunnel_finder,
        );
    }

    fn account_summary(account: &Account, ready: bool) -> AccountSummary {
        AccountSummary {
            name: account.name.clone(),
            is_male: account.is_male,
            is_connected: account.is_connected,
            is_human: account.is_human,
            ready,
        }
    }

    /// Sends the full roster and settings snapshot to one participant
    /// (or to everyone when `person` is `None`)
    fn inform<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &self,
        person: Option<&str>,
        tunnel_finder: &F,
    ) {
        let mut accounts = vec![Self::account_summary(
            &self.roster.showman.account,
            self.roster.showman.ready,
        )];
        for player in &self.roster.players {
            accounts.push(Self::account_summary(player.account(), player.person.ready));
        }
        for viewer in &self.roster.viewers {
            if !viewer.is_connected {
                tracing::warn!(name = %viewer.name, "viewer present but not connected");
                continue;
            }
            accounts.push(Self::account_summary(viewer, false));
        }

        let messages = [
            ServerMessage::ComputerAccounts {
                names: self.bots.player_names(),
            },
            ServerMessage::Info2 {
                players_count: self.roster.players.len(),
                accounts,
            },
            ServerMessage::ReadingSpeed {
                value: self.settings.reading_speed,
            },
            ServerMessage::FalseStart {
                enabled: self.settings.false_start,
            },
            ServerMessage::ButtonBlockingTime {
                seconds: self.settings.time.time_for_blocking_button.as_secs(),
            },
            ServerMessage::Timer {
                slot: 1,
                args: vec![
                    "MAXTIME".to_owned(),
                    (self.settings.time.time_for_thinking_on_question.as_secs() * 10).to_string(),
                ],
            },
            ServerMessage::Hostname {
                name: self.host_name.clone().unwrap_or_default(),
                by_game: false,
            },
        ];

        for message in &messages {
            match person {
                Some(name) => self.send(message, name, tunnel_finder),
                None => self.broadcast(message, tunnel_finder),
            }
        }

        if let Some(name) = person {
            let showman = &self.roster.showman.account;
            if !showman.picture.is_empty() {
                self.send(
                    &ServerMessage::Picture {
                        name: showman.name.clone(),
                        path: showman.picture.clone(),
                    },
                    name,
                    tunnel_finder,
                );
            }
            for player in &self.roster.players {
                if !player.account().picture.is_empty() {
                    self.send(
                        &ServerMessage::Picture {
                            name: player.name().to_owned(),
                            path: player.account().picture.clone(),
                        },
                        name,
                        tunnel_finder,
                    );
                }
            }
        }
    }
}

// Waiting and scheduling plumbing
impl<E: QuestionEngine> Game<E> {
    /// Arms a decision wait: the resume step fires either when the decision
    /// is resolved (immediately) or when the timeout elapses (default path)
    fn begin_waiting<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        decision: Decision,
        resume: Step,
        timeout: Duration,
        schedule_alarm: &mut S,
    ) {
        self.state.decision = decision;
        self.state.is_waiting = true;
        self.scheduler.set_stop_reason(StopReason::None);
        self.scheduler
            .plan(resume, timeout, Self::now(), schedule_alarm);
    }

    /// Hands control back to the scheduler after a decision arrived
    ///
    /// This is the single unblocking point: handlers must check
    /// `is_waiting`/`decision` before calling it, which prevents double
    /// resolution of one wait.
    fn resolve_decision<S: FnMut(AlarmMessage, Duration)>(&mut self, schedule_alarm: &mut S) {
        self.state.is_waiting = false;
        self.scheduler.set_stop_reason(StopReason::Decision);
        self.scheduler
            .execute_immediate(Self::now(), schedule_alarm);
    }

    /// Abandons the current wait without executing its resume step
    fn stop_waiting(&mut self) {
        self.state.is_waiting = false;
        self.state.decision = Decision::None;
    }

    fn plan<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        step: Step,
        delay: Duration,
        schedule_alarm: &mut S,
    ) {
        self.scheduler.plan(step, delay, Self::now(), schedule_alarm);
    }
}

// Joining and the dispatch entry points
impl<E: QuestionEngine> Game<E> {
    /// Starts serving the session: informs the already-seated participants
    /// and, for automatic games, arms the auto-start countdown
    pub fn run<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        self.inform(None, tunnel_finder);

        if self.settings.is_automatic {
            let now = Self::now();
            self.timers.restart(TimerSlot::PreGame, now);
            let deciseconds = constants::timers::AUTOMATIC_GAME_START_DURATION;
            self.broadcast(
                &ServerMessage::Timer {
                    slot: TimerSlot::PreGame.index(),
                    args: vec!["GO".to_owned(), deciseconds.to_string(), "-2".to_owned()],
                },
                tunnel_finder,
            );
            let delay = Duration::from_millis(u64::try_from(deciseconds).unwrap_or(0) * 100);
            self.plan(Step::AutoStart, delay, schedule_alarm);
        }
    }

    /// Admits a participant through the in-process path
    ///
    /// This is the same seat-resolution algorithm the network `CONNECT`
    /// message uses; the two paths behave identically for the same inputs.
    ///
    /// # Errors
    ///
    /// Returns a [`JoinError`] describing the refusal.
    pub fn join<T, F>(
        &mut self,
        name: &str,
        is_male: bool,
        role: Role,
        password: Option<&str>,
        tunnel_finder: &F,
    ) -> Result<usize, JoinError>
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
    {
        self.admit(name, is_male, role, password, tunnel_finder)
    }

    /// Processes one inbound protocol message
    pub fn receive_message<T, F, S, G>(
        &mut self,
        sender: &str,
        text: &str,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
        gateway: &mut G,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
        G: ClientGateway,
    {
        let command = match ClientCommand::parse(text) {
            Ok(command) => command,
            Err(FrameError::Malformed(protocol::tokens::CONNECT)) => {
                let reason = self.lexicon.localize(Phrase::WrongConnectionParameters);
                self.send(&ServerMessage::Refuse { reason }, sender, tunnel_finder);
                return;
            }
            Err(error) => {
                tracing::debug!(%sender, %error, "dropping unusable frame");
                return;
            }
        };

        match command {
            ClientCommand::GameInfo => self.on_game_info(sender, tunnel_finder),
            ClientCommand::Connect {
                role,
                name,
                is_male,
                password,
            } => {
                if let Err(error) =
                    self.admit(&name, is_male, role, password.as_deref(), tunnel_finder)
                {
                    let reason = self.refusal_text(error, &name);
                    self.send(&ServerMessage::Refuse { reason }, sender, tunnel_finder);
                }
            }
            ClientCommand::Disconnect { name, with_error } => {
                self.on_disconnect(&name, with_error, schedule_alarm, tunnel_finder);
            }
            ClientCommand::Info => self.on_info(sender, tunnel_finder),
            ClientCommand::Config(config) => {
                self.on_config(sender, &config, schedule_alarm, tunnel_finder, gateway);
            }
            ClientCommand::First { player_index } => {
                self.on_first(sender, player_index, schedule_alarm);
            }
            ClientCommand::Pause { enabled } => {
                if self.is_host(sender) || sender == self.showman_name() {
                    self.on_pause_core(enabled, schedule_alarm, tunnel_finder);
                }
            }
            ClientCommand::Start => {
                if self.is_host(sender) && self.state.stage == GameStage::Before {
                    self.start_game(schedule_alarm, tunnel_finder);
                }
            }
            ClientCommand::Ready { ready } => {
                self.on_ready(sender, ready, schedule_alarm, tunnel_finder);
            }
            ClientCommand::Picture { path, data } => {
                self.on_picture(sender, &path, data.as_deref(), tunnel_finder);
            }
            ClientCommand::Choice {
                theme_index,
                question_index,
            } => self.on_choice(sender, theme_index, question_index, schedule_alarm, tunnel_finder),
            ClientCommand::Press => self.on_press(sender, schedule_alarm, tunnel_finder),
            ClientCommand::Pass => self.on_pass(sender, schedule_alarm, tunnel_finder),
            ClientCommand::Answer { text, bot_marker } => {
                self.on_answer(sender, &text, bot_marker, schedule_alarm, tunnel_finder);
            }
            ClientCommand::Atom => self.on_atom(schedule_alarm),
            ClientCommand::Report { comment } => {
                self.on_report(comment.as_deref(), schedule_alarm);
            }
            ClientCommand::IsRight { right } => {
                self.on_is_right(sender, right, schedule_alarm, tunnel_finder);
            }
            ClientCommand::Next { player_index } => {
                self.on_next(sender, player_index, schedule_alarm);
            }
            ClientCommand::Cat { player_index } => {
                self.on_cat(sender, player_index, schedule_alarm, tunnel_finder);
            }
            ClientCommand::CatCost { sum } => {
                self.on_cat_cost(sender, sum, schedule_alarm);
            }
            ClientCommand::Stake { kind, sum } => {
                self.on_stake(sender, kind, sum, schedule_alarm, tunnel_finder);
            }
            ClientCommand::NextDelete { player_index } => {
                self.on_next_delete(sender, player_index, schedule_alarm);
            }
            ClientCommand::Delete { theme_index } => {
                self.on_delete(sender, theme_index, schedule_alarm, tunnel_finder);
            }
            ClientCommand::FinalStake { sum } => {
                self.on_final_stake(sender, sum, schedule_alarm, tunnel_finder);
            }
            ClientCommand::Apellate { for_right_answer } => {
                self.on_apellate(sender, for_right_answer, schedule_alarm);
            }
            ClientCommand::Change { player_number, sum } => {
                self.on_change(sender, player_number, sum, tunnel_finder);
            }
            ClientCommand::Move { direction } => {
                self.on_move(sender, direction, schedule_alarm, tunnel_finder);
            }
            ClientCommand::Kick { name } => {
                self.on_kick_or_ban(sender, &name, false, tunnel_finder, gateway);
            }
            ClientCommand::Ban { name } => {
                self.on_kick_or_ban(sender, &name, true, tunnel_finder, gateway);
            }
            ClientCommand::Mark => self.on_mark(),
        }
    }

    /// Reports a transmission failure of a partially streamed message
    ///
    /// Long question texts are streamed to clients in fragments; when the
    /// transport fails to serialize one, the hosting application hands the
    /// frame back here. The session cannot recover the send, so it captures
    /// a reproducible dump (base64-encoded to survive log pipelines) and
    /// keeps running.
    pub fn report_serialization_error(&self, sender: &str, receiver: &str, text: &str) {
        use base64::Engine as _;

        let encoder = base64::engine::general_purpose::STANDARD;
        tracing::warn!(
            sender = %encoder.encode(sender),
            receiver = %encoder.encode(receiver),
            text = %encoder.encode(text),
            text_length = text.len(),
            reading_speed = self.settings.reading_speed,
            "failed to serialize a partial message"
        );
    }

    /// Processes a fired alarm; stale alarms are ignored by the scheduler
    pub fn receive_alarm<T, F, S>(
        &mut self,
        alarm: &AlarmMessage,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if let Some(step) = self.scheduler.claim(alarm) {
            self.execute_step(step, schedule_alarm, tunnel_finder);
        }
    }

    fn refusal_text(&self, error: JoinError, name: &str) -> String {
        match error {
            JoinError::WrongPassword => self.lexicon.localize(Phrase::WrongPassword),
            JoinError::NameTaken => self
                .lexicon
                .localize1(Phrase::PersonWithSuchNameIsAlreadyInGame, name),
            JoinError::InappropriateName => self.lexicon.localize(Phrase::InappropriateName),
            JoinError::NoFreePlace => self.lexicon.localize(Phrase::NoFreePlaceForName),
            JoinError::PlaceOccupied => self.lexicon.localize(Phrase::PlaceIsOccupied),
            JoinError::Banned => self.lexicon.localize(Phrase::YouAreBanned),
        }
    }
}

// Seat resolution
impl<E: QuestionEngine> Game<E> {
    /// Claim check for one candidate seat
    ///
    /// `Ok(true)`: claimed. `Ok(false)`: keep scanning. `Err`: the exact
    /// seat exists but is taken.
    fn try_claim(
        account: &mut Account,
        name: &str,
        is_male: bool,
    ) -> Result<bool, JoinError> {
        if account.is_connected {
            if account.name == name {
                return Err(JoinError::PlaceOccupied);
            }
            return Ok(false);
        }

        if account.name == name || account.is_free() {
            account.name = name.to_owned();
            account.is_male = is_male;
            account.picture.clear();
            account.is_connected = true;
            return Ok(true);
        }

        Ok(false)
    }

    fn admit<T, F>(
        &mut self,
        name: &str,
        is_male: bool,
        role: Role,
        password: Option<&str>,
        tunnel_finder: &F,
    ) -> Result<usize, JoinError>
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
    {
        if let Some(expected) = &self.settings.network_game_password {
            if password != Some(expected.as_str()) {
                return Err(JoinError::WrongPassword);
            }
        }

        if self.banned.contains(name) {
            return Err(JoinError::Banned);
        }

        let name = rustrict::trim_whitespace(name);
        if name.is_empty()
            || name.len() > constants::roster::MAX_NAME_LENGTH
            || name == constants::roster::FREE_PLACE
            || name.is_inappropriate()
        {
            return Err(JoinError::InappropriateName);
        }

        if self.roster.contains_name(name) {
            return Err(JoinError::NameTaken);
        }

        let index = match role {
            Role::Showman => {
                if Self::try_claim(&mut self.roster.showman.account, name, is_male)? {
                    0
                } else {
                    return Err(JoinError::NoFreePlace);
                }
            }
            Role::Player => {
                let mut found = None;
                for i in 0..self.roster.players.len() {
                    if Self::try_claim(
                        &mut self.roster.players[i].person.account,
                        name,
                        is_male,
                    )? {
                        found = Some(i);
                        break;
                    }
                }
                found.ok_or(JoinError::NoFreePlace)?
            }
            Role::Viewer => {
                let mut found = None;
                for i in 0..self.roster.viewers.len() {
                    if Self::try_claim(&mut self.roster.viewers[i], name, is_male)? {
                        found = Some(i);
                        break;
                    }
                }
                match found {
                    Some(i) => i,
                    None => {
                        self.roster.viewers.push(Account {
                            name: name.to_owned(),
                            is_male,
                            is_human: true,
                            is_connected: true,
                            picture: String::new(),
                        });
                        self.roster.viewers.len() - 1
                    }
                }
            }
        };

        let phrase = if is_male {
            Phrase::ConnectedMale
        } else {
            Phrase::ConnectedFemale
        };
        let replic = self.lexicon.localize1(phrase, name);
        self.special_replic(&replic, tunnel_finder);

        self.send(&ServerMessage::Accepted, name, tunnel_finder);
        self.broadcast(
            &ServerMessage::Connected {
                role,
                index,
                name: name.to_owned(),
                is_male,
            },
            tunnel_finder,
        );

        if self.host_name.is_none() && !self.settings.is_automatic {
            self.update_host_name(Some(name.to_owned()), tunnel_finder);
        }

        Ok(index)
    }

    fn update_host_name<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &mut self,
        new_host: Option<String>,
        tunnel_finder: &F,
    ) {
        self.host_name = new_host;
        self.broadcast(
            &ServerMessage::Hostname {
                name: self.host_name.clone().unwrap_or_default(),
                by_game: true,
            },
            tunnel_finder,
        );
    }

    /// Picks a replacement host: showman first, then a random human player,
    /// then a random human viewer
    fn select_new_host<T: Tunnel, F: Fn(&str) -> Option<T>>(&mut self, tunnel_finder: &F) {
        let can_host = |account: &Account| account.is_human && account.is_connected;

        let new_host = if can_host(&self.roster.showman.account) {
            Some(self.showman_name())
        } else {
            let players = self
                .roster
                .players
                .iter()
                .filter(|p| can_host(p.account()))
                .collect_vec();
            if players.is_empty() {
                let viewers = self
                    .roster
                    .viewers
                    .iter()
                    .filter(|v| can_host(v))
                    .collect_vec();
                if viewers.is_empty() {
                    None
                } else {
                    Some(viewers[fastrand::usize(..viewers.len())].name.clone())
                }
            } else {
                Some(players[fastrand::usize(..players.len())].name().to_owned())
            }
        };

        self.update_host_name(new_host, tunnel_finder);
    }
}

// Roster-affecting handlers
impl<E: QuestionEngine> Game<E> {
    fn on_game_info<T: Tunnel, F: Fn(&str) -> Option<T>>(&self, sender: &str, tunnel_finder: &F) {
        let mut entries = vec![(
            self.showman_name(),
            self.roster.showman.account.is_connected,
        )];
        for player in &self.roster.players {
            entries.push((player.name().to_owned(), player.account().is_connected));
        }
        for viewer in &self.roster.viewers {
            entries.push((viewer.name.clone(), viewer.is_connected));
        }

        self.send(
            &ServerMessage::GameInfoSnapshot {
                game_name: self.settings.network_game_name.clone(),
                host_name: self.host_name.clone().unwrap_or_default(),
                players_count: self.roster.players.len(),
                entries,
            },
            sender,
            tunnel_finder,
        );
    }

    fn on_info<T: Tunnel, F: Fn(&str) -> Option<T>>(&self, sender: &str, tunnel_finder: &F) {
        self.inform(Some(sender), tunnel_finder);

        for person in self.roster.main_persons() {
            if person.ready {
                self.send(
                    &ServerMessage::Ready {
                        name: person.name().to_owned(),
                        ready: true,
                    },
                    sender,
                    tunnel_finder,
                );
            }
        }

        self.send(
            &ServerMessage::Stage {
                name: self.state.stage.wire_name().to_owned(),
            },
            sender,
            tunnel_finder,
        );
        self.send(
            &ServerMessage::Sums {
                values: self.roster.players.iter().map(|p| p.sum).collect(),
            },
            sender,
            tunnel_finder,
        );

        if matches!(self.state.stage, GameStage::Round | GameStage::Final) {
            if self.state.tablo_inform_stage > 0 {
                self.send(
                    &ServerMessage::RoundThemes {
                        names: self.engine.theme_names(),
                    },
                    sender,
                    tunnel_finder,
                );
                if self.state.tablo_inform_stage > 1 {
                    self.send(
                        &ServerMessage::Tablo {
                            themes: self.engine.table(),
                        },
                        sender,
                        tunnel_finder,
                    );
                }
            }
        } else if self.state.stage == GameStage::Before && self.settings.is_automatic {
            let elapsed = self
                .timers
                .elapsed_deciseconds(TimerSlot::PreGame, Self::now());
            let left = constants::timers::AUTOMATIC_GAME_START_DURATION - elapsed;
            if left > 0 {
                self.send(
                    &ServerMessage::Timer {
                        slot: TimerSlot::PreGame.index(),
                        args: vec!["GO".to_owned(), left.to_string(), "-2".to_owned()],
                    },
                    sender,
                    tunnel_finder,
                );
            }
        }
    }

    fn on_disconnect<T, F, S>(
        &mut self,
        name: &str,
        with_error: bool,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(seat) = self.roster.find_seat(name) else {
            return;
        };

        let is_male = self.roster.account_at(seat).is_male;
        let phrase = if is_male {
            Phrase::DisconnectedMale
        } else {
            Phrase::DisconnectedFemale
        };
        let replic = self.lexicon.localize1(phrase, name);
        self.special_replic(&replic, tunnel_finder);
        self.broadcast(
            &ServerMessage::Disconnected {
                name: name.to_owned(),
            },
            tunnel_finder,
        );

        let is_before = self.state.stage == GameStage::Before;
        match seat {
            Seat::Viewer(i) => {
                self.roster.viewers.remove(i);
            }
            Seat::Showman => {
                let showman = &mut self.roster.showman;
                showman.account.is_connected = false;
                showman.account.name = constants::roster::FREE_PLACE.to_owned();
                showman.account.picture.clear();
                if is_before {
                    showman.ready = false;
                }
            }
            Seat::Player(i) => {
                let player = &mut self.roster.players[i];
                player.person.account.is_connected = false;
                player.person.account.name = constants::roster::FREE_PLACE.to_owned();
                player.person.account.picture.clear();
                if is_before {
                    player.person.ready = false;
                }
            }
        }

        if self.host_name.as_deref() == Some(name) {
            self.select_new_host(tunnel_finder);

            if self.settings.managed && !self.is_running() {
                if self.scheduler.stop_reason() == StopReason::Pause || self.state.pause {
                    self.on_pause_core(false, schedule_alarm, tunnel_finder);
                    return;
                }

                self.state.move_direction = 1;
                self.scheduler.set_stop_reason(StopReason::Move);
                self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            }
        }

        if with_error {
            tracing::warn!(%name, "participant left due to a transport error");
        }
    }

    fn on_config<T, F, S, G>(
        &mut self,
        sender: &str,
        config: &ConfigCommand,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
        gateway: &mut G,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
        G: ClientGateway,
    {
        if !self.is_host(sender) {
            return;
        }
        let Some(host_name) = self.host_name.clone() else {
            return;
        };
        let Some(host) = self.roster.find_account(&host_name) else {
            return;
        };
        let host_is_male = host.is_male;

        match config {
            ConfigCommand::AddTable => self.add_table(&host_name, tunnel_finder),
            ConfigCommand::DeleteTable { index } => {
                self.delete_table(*index, &host_name, schedule_alarm, tunnel_finder, gateway);
            }
            ConfigCommand::Free { is_player, index } => {
                self.free_table(*is_player, *index, &host_name, tunnel_finder);
            }
            ConfigCommand::Set {
                is_player,
                index,
                replacer,
            } => {
                self.set_person(*is_player, *index, replacer, &host_name, tunnel_finder, gateway);
            }
            ConfigCommand::ChangeType { is_player, index } => {
                if self.state.stage == GameStage::Before {
                    self.change_person_type(
                        *is_player,
                        *index,
                        Some((host_name.clone(), host_is_male)),
                        tunnel_finder,
                        gateway,
                    );
                }
            }
        }
    }

    fn add_table<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &mut self,
        host_name: &str,
        tunnel_finder: &F,
    ) {
        if self.roster.players.len() >= constants::roster::MAX_PLAYERS {
            return;
        }

        let seat = Player::free_place();
        let summary = Self::account_summary(seat.account(), false);
        self.roster.players.push(seat);

        self.broadcast(&ServerMessage::ConfigAddTable { account: summary }, tunnel_finder);
        let replic = self.lexicon.localize1(Phrase::NewGameTable, host_name);
        self.special_replic(&replic, tunnel_finder);
    }

    fn delete_table<T, F, S, G>(
        &mut self,
        index: usize,
        host_name: &str,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
        gateway: &mut G,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
        G: ClientGateway,
    {
        if self.roster.players.len() <= constants::roster::MIN_PLAYERS
            || index >= self.roster.players.len()
        {
            return;
        }

        let account = self.roster.players[index].account().clone();
        let is_online = account.is_connected;

        if self.state.stage != GameStage::Before && account.is_human && is_online {
            return;
        }

        self.roster.players.remove(index);
        self.drop_player_index(index, schedule_alarm, tunnel_finder);

        if is_online && account.is_human {
            self.roster.viewers.push(account.clone());
        }

        if !account.is_human {
            if !gateway.delete_client(&account.name) {
                tracing::warn!(name = %account.name, "cannot delete computer client");
            } else if gateway.contains(&account.name) {
                tracing::warn!(
                    name = %account.name,
                    "computer client was deleted but is still present"
                );
            }
        }

        self.broadcast(&ServerMessage::ConfigDeleteTable { index }, tunnel_finder);
        let replic = self
            .lexicon
            .localize2(Phrase::GameTableDeleted, host_name, &(index + 1).to_string());
        self.special_replic(&replic, tunnel_finder);

        if self.state.stage == GameStage::Before && self.roster.main_persons().all(|p| p.ready) {
            self.start_game(schedule_alarm, tunnel_finder);
        }
    }

    fn free_table<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &mut self,
        is_player: bool,
        index: usize,
        host_name: &str,
        tunnel_finder: &F,
    ) {
        if self.state.stage != GameStage::Before {
            return;
        }
        if is_player && index >= self.roster.players.len() {
            return;
        }

        let account = if is_player {
            self.roster.players[index].account().clone()
        } else {
            self.roster.showman.account.clone()
        };

        if !account.is_connected || !account.is_human {
            return;
        }

        if is_player {
            self.roster.players[index] = Player::free_place();
        } else {
            self.roster.showman = Person::free_place();
        }
        self.roster.viewers.push(account.clone());

        self.broadcast(
            &ServerMessage::ConfigFree { is_player, index },
            tunnel_finder,
        );
        let replic = self
            .lexicon
            .localize2(Phrase::FreedFromTable, host_name, &account.name);
        self.special_replic(&replic, tunnel_finder);
    }

    fn set_person<T, F, G>(
        &mut self,
        is_player: bool,
        index: usize,
        replacer: &str,
        host_name: &str,
        tunnel_finder: &F,
        gateway: &mut G,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        G: ClientGateway,
    {
        if self.state.stage != GameStage::Before {
            return;
        }
        if is_player && index >= self.roster.players.len() {
            return;
        }

        let target = if is_player {
            self.roster.players[index].account().clone()
        } else {
            self.roster.showman.account.clone()
        };
        let old_name = target.name.clone();

        let replaced_is_male = if target.is_human {
            if !self.swap_human_person(is_player, index, replacer) {
                return;
            }
            let account = if is_player {
                self.roster.players[index].account()
            } else {
                &self.roster.showman.account
            };
            account.is_male
        } else {
            if self.roster.contains_name(replacer) {
                return;
            }
            let bot = if is_player {
                self.bots.player_by_name(replacer).cloned()
            } else {
                self.bots.showman_by_name(replacer).cloned()
            };
            let Some(bot) = bot else {
                tracing::warn!(%replacer, "default computer account not found");
                return;
            };
            gateway.delete_client(&old_name);
            let is_male = bot.is_male;
            if is_player {
                self.roster.players[index] = Player::from_account(bot);
            } else {
                self.roster.showman = Person {
                    account: bot,
                    ready: false,
                };
            }
            is_male
        };

        self.broadcast(
            &ServerMessage::ConfigSet {
                is_player,
                index,
                replacer: replacer.to_owned(),
                is_male: replaced_is_male,
            },
            tunnel_finder,
        );
        let replic = self
            .lexicon
            .localize2(Phrase::Replaced, host_name, &old_name)
            .replace("{2}", replacer);
        self.special_replic(&replic, tunnel_finder);
    }

    /// Swaps a human seat with another human (showman, player or viewer)
    fn swap_human_person(&mut self, is_player: bool, index: usize, replacer: &str) -> bool {
        let Some(other_seat) = self.roster.find_seat(replacer) else {
            return false;
        };
        if !self.roster.account_at(other_seat).is_human {
            return false;
        }

        let target_person = if is_player {
            self.roster.players[index].person.clone()
        } else {
            self.roster.showman.clone()
        };

        match other_seat {
            Seat::Showman => {
                if !is_player {
                    return false;
                }
                let other = self.roster.showman.clone();
                self.roster.showman = target_person;
                self.roster.players[index].person = other;
            }
            Seat::Player(other_index) => {
                if is_player {
                    if other_index == index {
                        return false;
                    }
                    let other = self.roster.players[other_index].person.clone();
                    self.roster.players[other_index].person = target_person;
                    self.roster.players[index].person = other;
                } else {
                    let other = self.roster.players[other_index].person.clone();
                    self.roster.players[other_index].person = target_person;
                    self.roster.showman = other;
                }
            }
            Seat::Viewer(other_index) => {
                let other = self.roster.viewers[other_index].clone();
                if target_person.account.is_connected {
                    self.roster.viewers[other_index] = target_person.account.clone();
                } else {
                    self.roster.viewers.remove(other_index);
                }
                let new_person = Person {
                    account: other,
                    ready: false,
                };
                if is_player {
                    self.roster.players[index].person = new_person;
                } else {
                    self.roster.showman = new_person;
                }
            }
        }

        true
    }

    fn change_person_type<T, F, G>(
        &mut self,
        is_player: bool,
        index: usize,
        initiator: Option<(String, bool)>,
        tunnel_finder: &F,
        gateway: &mut G,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        G: ClientGateway,
    {
        if is_player && index >= self.roster.players.len() {
            return;
        }

        let account = if is_player {
            self.roster.players[index].account().clone()
        } else {
            self.roster.showman.account.clone()
        };
        let old_name = account.name.clone();
        let was_human = account.is_human;

        let (new_name, new_is_male) = if was_human {
            // Human seat becomes a computer seat.
            if account.is_connected {
                self.roster.viewers.push(account.clone());
            }
            let bot = if is_player {
                let used = self
                    .roster
                    .players
                    .iter()
                    .filter(|p| !p.account().is_human)
                    .map(|p| p.name().to_owned())
                    .collect_vec();
                self.bots.random_unused_player(&used).cloned()
            } else {
                self.bots.showmans.first().cloned()
            };
            let Some(bot) = bot else {
                tracing::warn!("computer account pool exhausted");
                return;
            };
            let result = (bot.name.clone(), bot.is_male);
            if is_player {
                self.roster.players[index] = Player::from_account(bot);
            } else {
                self.roster.showman = Person {
                    account: bot,
                    ready: false,
                };
            }
            result
        } else {
            // Computer seat becomes a vacant human seat.
            if !gateway.delete_client(&old_name) {
                tracing::warn!(name = %old_name, "cannot delete computer client");
            } else if gateway.contains(&old_name) {
                tracing::warn!(name = %old_name, "computer client still present after deletion");
            }
            if is_player {
                self.roster.players[index] = Player::free_place();
            } else {
                self.roster.showman = Person::free_place();
            }
            (constants::roster::FREE_PLACE.to_owned(), true)
        };

        self.broadcast(
            &ServerMessage::ConfigChangeType {
                is_player,
                index,
                is_human: !was_human,
                name: new_name,
                is_male: new_is_male,
            },
            tunnel_finder,
        );

        if let Some((initiator_name, _)) = initiator {
            let replic = self
                .lexicon
                .localize2(Phrase::PersonTypeChanged, &initiator_name, &old_name);
            self.special_replic(&replic, tunnel_finder);
        }
    }

    fn on_kick_or_ban<T, F, G>(
        &mut self,
        sender: &str,
        target: &str,
        ban: bool,
        tunnel_finder: &F,
        gateway: &mut G,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        G: ClientGateway,
    {
        if !self.is_host(sender) {
            return;
        }
        let Some(account) = self.roster.find_account(target) else {
            return;
        };

        if account.name == sender {
            let phrase = if ban {
                Phrase::CannotBanYourself
            } else {
                Phrase::CannotKickYourself
            };
            let text = self.lexicon.localize(phrase);
            self.system_notice(sender, &text, tunnel_finder);
            return;
        }

        if !account.is_human {
            let phrase = if ban {
                Phrase::CannotBanBots
            } else {
                Phrase::CannotKickBots
            };
            let text = self.lexicon.localize(phrase);
            self.system_notice(sender, &text, tunnel_finder);
            return;
        }

        if ban {
            self.banned.insert(target.to_owned());
        }
        gateway.kick(target, ban);

        let phrase = if ban { Phrase::Banned } else { Phrase::Kicked };
        let replic = self.lexicon.localize2(phrase, sender, target);
        self.special_replic(&replic, tunnel_finder);
    }

    fn on_picture<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &mut self,
        sender: &str,
        path: &str,
        data: Option<&str>,
        tunnel_finder: &F,
    ) {
        let seat = match self.roster.find_seat(sender) {
            Some(seat @ (Seat::Showman | Seat::Player(_))) => seat,
            _ => return,
        };

        let picture = match data {
            Some(payload) => {
                // Base64 payload: 4 characters encode 3 bytes.
                if payload.len() / 4 * 3 > constants::roster::MAX_AVATAR_SIZE {
                    let text = self.lexicon.localize(Phrase::AvatarTooBig);
                    self.system_notice(sender, &text, tunnel_finder);
                    return;
                }
                format!("data:{payload}")
            }
            None => path.to_owned(),
        };

        match seat {
            Seat::Showman => self.roster.showman.account.picture = picture.clone(),
            Seat::Player(i) => self.roster.players[i].person.account.picture = picture.clone(),
            Seat::Viewer(_) => return,
        }

        self.broadcast(
            &ServerMessage::Picture {
                name: sender.to_owned(),
                path: picture,
            },
            tunnel_finder,
        );
    }

    fn on_change<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &mut self,
        sender: &str,
        player_number: usize,
        sum: i32,
        tunnel_finder: &F,
    ) {
        if sender != self.showman_name() {
            return;
        }
        if player_number < 1 || player_number > self.roster.players.len() {
            return;
        }

        let index = player_number - 1;
        self.roster.players[index].sum = sum;
        let player_name = self.roster.players[index].name().to_owned();

        let replic = self
            .lexicon
            .localize2(Phrase::SumChanged, sender, &player_name)
            .replace("{2}", &sum.to_string());
        self.special_replic(&replic, tunnel_finder);
        self.inform_sums(tunnel_finder);
    }

    fn on_mark(&mut self) {
        if !self.state.can_mark_question {
            return;
        }
        self.state.marked_questions.push((
            self.engine.round_index(),
            self.engine.theme_index(),
            self.engine.question_index(),
        ));
    }
}

// Readiness and game start
impl<E: QuestionEngine> Game<E> {
    fn on_ready<T, F, S>(
        &mut self,
        sender: &str,
        to_ready: bool,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if self.state.stage != GameStage::Before {
            return;
        }

        let mut found = false;
        if self.roster.showman.name() == sender && self.roster.showman.ready != to_ready {
            self.roster.showman.ready = to_ready;
            found = true;
        }
        for player in &mut self.roster.players {
            if player.name() == sender && player.person.ready != to_ready {
                player.person.ready = to_ready;
                found = true;
            }
        }

        if found {
            self.broadcast(
                &ServerMessage::Ready {
                    name: sender.to_owned(),
                    ready: to_ready,
                },
                tunnel_finder,
            );
        }

        let ready_all = self.roster.main_persons().all(|p| p.ready);
        if ready_all {
            self.start_game(schedule_alarm, tunnel_finder);
        } else if self.settings.is_automatic
            && self
                .roster
                .players
                .iter()
                .all(|p| p.account().is_connected)
        {
            self.start_game(schedule_alarm, tunnel_finder);
        }
    }

    fn start_game<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        self.state.stage = GameStage::Begin;
        self.inform_stage(tunnel_finder);

        self.state.is_oral = self.settings.oral && self.roster.showman.account.is_human;

        self.plan(Step::StartGame, Duration::from_millis(100), schedule_alarm);
    }

    /// Fills every unconnected seat with a computer participant and starts
    fn auto_game<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        struct NullGateway;
        impl ClientGateway for NullGateway {
            fn delete_client(&mut self, _name: &str) -> bool {
                true
            }
            fn contains(&self, _name: &str) -> bool {
                false
            }
            fn kick(&mut self, _name: &str, _ban: bool) {}
        }
        let mut gateway = NullGateway;

        for index in 0..self.roster.players.len() {
            if !self.roster.players[index].account().is_connected {
                self.change_person_type(true, index, None, tunnel_finder, &mut gateway);
            }
        }
        if !self.roster.showman.account.is_connected {
            self.change_person_type(false, 0, None, tunnel_finder, &mut gateway);
        }

        self.start_game(schedule_alarm, tunnel_finder);
    }
}

// Pause and movement
impl<E: QuestionEngine> Game<E> {
    /// Pauses or resumes the session
    ///
    /// Pausing snapshots every timer and parks the scheduler; resuming
    /// shifts timer starts by the pause duration and re-checks whether the
    /// pending decision became satisfied while paused.
    fn on_pause_core<T, F, S>(&mut self, enabled: bool, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let now = Self::now();
        let times: [i64; 3];

        if enabled {
            if self.state.pause {
                return;
            }
            self.state.pause = true;
            self.state.pause_start_time = Some(now);

            if self.state.is_thinking {
                self.state.is_thinking_paused = true;
                self.state.is_thinking = false;
            }
            if self.state.is_playing_media {
                self.state.is_playing_media_paused = true;
                self.state.is_playing_media = false;
            }

            times = self.timers.snapshot(now);
            self.scheduler.pause(now);
            self.scheduler.set_stop_reason(StopReason::Pause);

            let replic = self.lexicon.localize(Phrase::PauseInGame);
            self.special_replic(&replic, tunnel_finder);
        } else {
            if !self.state.pause {
                return;
            }
            self.state.pause = false;

            let pause_start = self.state.pause_start_time.take().unwrap_or(now);
            let pause_duration = now.duration_since(pause_start).unwrap_or_default();

            times = self.timers.snapshot(pause_start);
            self.timers.shift_all(pause_duration);

            if self.state.is_playing_media_paused {
                self.state.is_playing_media_paused = false;
                self.state.is_playing_media = true;
            }
            if self.state.is_thinking_paused {
                self.state.is_thinking_paused = false;
                self.state.is_thinking = true;
            }

            self.scheduler.set_stop_reason(StopReason::None);
            self.scheduler.resume(now, schedule_alarm);
            self.recheck_pending_decision(schedule_alarm);

            let replic = self.lexicon.localize(Phrase::GameResumed);
            self.special_replic(&replic, tunnel_finder);
        }

        self.broadcast(&ServerMessage::Pause { enabled, times }, tunnel_finder);
    }

    /// A decision can become satisfied during a pause (e.g. the last report
    /// arrived); resuming must notice that instead of waiting forever
    fn recheck_pending_decision<S: FnMut(AlarmMessage, Duration)>(&mut self, schedule_alarm: &mut S) {
        if !self.state.is_waiting {
            return;
        }
        let satisfied = match self.state.decision {
            Decision::Reporting => self.state.reports_count <= 0,
            Decision::Answering { final_round: true } => {
                self.state.final_answers_received >= self.state.final_answers_expected
            }
            Decision::FinalStakeMaking => self.state.num_of_stakers <= 0,
            Decision::AppellationDecision { .. } => {
                self.state.appellation_votes_received + 1 >= self.roster.players.len()
            }
            _ => false,
        };
        if satisfied {
            self.resolve_decision(schedule_alarm);
        }
    }

    fn on_move<T, F, S>(
        &mut self,
        sender: &str,
        direction: i32,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !self.is_host(sender) && sender != self.showman_name() {
            return;
        }

        // A forward move while paused is a resume request.
        if (self.state.pause || self.scheduler.stop_reason() == StopReason::Pause) && direction == 1
        {
            self.on_pause_core(false, schedule_alarm, tunnel_finder);
            return;
        }

        self.state.move_direction = direction;

        match direction {
            -2 => {
                if !self.engine.can_move_back_round() {
                    return;
                }
            }
            -1 => {
                if !self.engine.can_move_back() {
                    return;
                }
            }
            1 => {
                if self.state.move_next_blocked {
                    return;
                }
            }
            2 => {
                if !self.engine.can_move_next_round() {
                    return;
                }
            }
            _ => return,
        }

        self.scheduler.set_stop_reason(StopReason::Move);
        self.stop_waiting();

        match direction {
            1 => self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm),
            -1 => {
                self.engine.move_back();
                self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            }
            -2 => {
                self.engine.move_back_round();
                self.present_round(schedule_alarm, tunnel_finder);
            }
            2 => {
                self.engine.move_next_round();
                self.present_round(schedule_alarm, tunnel_finder);
            }
            _ => {}
        }
    }
}

// Decision handlers
impl<E: QuestionEngine> Game<E> {
    fn on_first<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        sender: &str,
        player_index: usize,
        schedule_alarm: &mut S,
    ) {
        if !self.state.is_waiting || self.state.decision != Decision::StarterChoosing {
            return;
        }
        if sender != self.showman_name() {
            return;
        }
        if player_index >= self.roster.players.len() || !self.roster.players[player_index].flag {
            return;
        }

        self.state.chooser_index = player_index as i32;
        self.resolve_decision(schedule_alarm);
    }

    fn on_choice<T, F, S>(
        &mut self,
        sender: &str,
        theme_index: usize,
        question_index: usize,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !self.state.is_waiting || self.state.decision != Decision::QuestionChoosing {
            return;
        }
        let Some(chooser) = self.chooser_name() else {
            return;
        };
        let showman = self.showman_name();
        let from_showman = sender == showman;
        if sender != chooser && !(self.state.is_oral_now && from_showman) {
            return;
        }

        if self
            .engine
            .select_question(theme_index, question_index)
            .is_none()
        {
            return;
        }

        if self.state.is_oral_now {
            let counterpart = if from_showman { chooser } else { showman };
            self.send(&ServerMessage::Cancel, &counterpart, tunnel_finder);
        }

        self.resolve_decision(schedule_alarm);
    }

    fn on_press<T, F, S>(&mut self, sender: &str, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let now = Self::now();

        if self.state.decision != Decision::Pressing {
            // Premature press: start the blocking window and tell everyone.
            if let Some(i) = self.roster.player_index(sender) {
                if self.state.answerer_index != i as i32 {
                    self.roster.players[i].last_bad_try_time = Some(now);
                    self.broadcast(&ServerMessage::WrongTry { index: i }, tunnel_finder);
                }
            }
            return;
        }

        let blocking = self.settings.time.time_for_blocking_button;
        let mut answerer_index = None;
        for (i, player) in self.roster.players.iter().enumerate() {
            if player.name() != sender || !player.can_press {
                continue;
            }
            let blocked = player.last_bad_try_time.is_some_and(|bad_try| {
                now.duration_since(bad_try).unwrap_or_default() < blocking
            });
            if !blocked {
                answerer_index = Some(i);
            }
            break;
        }
        let Some(answerer_index) = answerer_index else {
            return;
        };

        if !self.settings.use_ping_penalty {
            self.state.answerer_index = answerer_index as i32;
            self.plan(Step::AskAnswer, Duration::ZERO, schedule_alarm);
            return;
        }

        let penalty = self.roster.players[answerer_index].ping_penalty;
        if self.state.is_deferring_answer {
            let future = now + Duration::from_millis(u64::from(penalty) * 100);
            let current_start = self.state.penalty_start_time.unwrap_or(now);
            let current_future =
                current_start + Duration::from_millis(u64::from(self.state.penalty) * 100);
            if future >= current_future {
                // The pending resolution fires first (ties favor it).
                return;
            }
        }

        self.state.answerer_index = answerer_index as i32;
        let player = &mut self.roster.players[answerer_index];
        player.ping_penalty = (player.ping_penalty + 1).min(constants::button::MAX_PING_PENALTY);

        if penalty == 0 {
            self.state.is_deferring_answer = false;
            self.plan(Step::AskAnswer, Duration::ZERO, schedule_alarm);
        } else {
            self.state.is_deferring_answer = true;
            self.state.penalty_start_time = Some(now);
            self.state.penalty = penalty;
            self.scheduler.set_stop_reason(StopReason::Wait);
            self.plan(
                Step::AskAnswer,
                Duration::from_millis(u64::from(penalty) * 100),
                schedule_alarm,
            );
        }
    }

    fn on_pass<T, F, S>(&mut self, sender: &str, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !self.state.is_question_playing {
            return;
        }

        let mut passed = None;
        for (i, player) in self.roster.players.iter_mut().enumerate() {
            if player.name() == sender && player.can_press {
                player.can_press = false;
                passed = Some(i);
                break;
            }
        }
        let Some(index) = passed else {
            return;
        };

        self.broadcast(&ServerMessage::PlayerPassed { index }, tunnel_finder);

        if self.state.is_thinking && self.roster.players.iter().all(|p| !p.can_press) {
            // Everyone waived the button: cut the wait short.
            self.plan(Step::WaitTry, Duration::from_millis(300), schedule_alarm);
        }
    }

    /// Draws a wrong answer for a bot: question wrongs first, then the
    /// generic pool, then the "no answer" sentinel, never failing
    fn synthesize_bot_answer(&mut self, template: &str, right: bool) -> (String, bool) {
        let question = self.engine.current_question();

        if right {
            let right_text = question
                .and_then(|q| q.right.first().cloned())
                .unwrap_or_else(|| "(...)".to_owned());
            return (grow_first_letter(&template.replace('#', &right_text)), false);
        }

        let mut pool: Vec<String> = question
            .map(|q| q.wrong.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|w| !self.state.used_wrong_versions.contains(w))
            .collect();

        if pool.is_empty() {
            pool = self
                .lexicon
                .generic_wrong_answers()
                .into_iter()
                .filter(|w| !self.state.used_wrong_versions.contains(w))
                .collect();
            let no_answer = self.lexicon.localize(Phrase::NoAnswer);
            if !self.state.used_wrong_versions.contains(&no_answer) && !pool.contains(&no_answer) {
                pool.push(no_answer);
            }
        }

        if pool.is_empty() {
            let fallback = self
                .lexicon
                .generic_wrong_answers()
                .into_iter()
                .next()
                .unwrap_or_else(|| "...".to_owned());
            pool.push(fallback);
        }

        let pick = pool[fastrand::usize(..pool.len())].clone();
        self.state.used_wrong_versions.push(pick.clone());
        (grow_first_letter(&template.replace('#', &pick)), true)
    }

    fn on_answer<T, F, S>(
        &mut self,
        sender: &str,
        text: &str,
        bot_marker: Option<bool>,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !self.state.decision.is_answering() {
            return;
        }
        let final_round = self.state.decision == Decision::Answering { final_round: true };

        if final_round {
            self.state.answerer_index = -1;
            let mut found = None;
            for (i, player) in self.roster.players.iter().enumerate() {
                if player.name() == sender && player.in_game {
                    found = Some(i);
                    break;
                }
            }
            let Some(i) = found else {
                return;
            };
            self.state.answerer_index = i as i32;
            self.broadcast(&ServerMessage::PersonFinalAnswer { index: i }, tunnel_finder);
        } else {
            if !self.state.is_waiting {
                return;
            }
            match self.answerer() {
                Some(answerer) if answerer.name() == sender => {}
                _ => return,
            }
        }

        let Ok(answerer_index) = usize::try_from(self.state.answerer_index) else {
            return;
        };

        let is_human = self.roster.players[answerer_index].account().is_human;
        let (answer, is_wrong) = if is_human {
            if text.is_empty() {
                (self.lexicon.localize(Phrase::IDontKnow), true)
            } else {
                (text.to_owned(), false)
            }
        } else {
            match bot_marker {
                Some(right) => self.synthesize_bot_answer(text, right),
                None => (text.to_owned(), false),
            }
        };

        let player = &mut self.roster.players[answerer_index];
        let first_answer = player.answer.is_empty();
        player.answer = answer;
        player.answer_is_wrong = is_wrong;
        player.answer_is_right = false;

        if final_round {
            if first_answer {
                self.state.final_answers_received += 1;
            }
            if self.state.final_answers_received >= self.state.final_answers_expected {
                self.resolve_decision(schedule_alarm);
            }
        } else {
            self.resolve_decision(schedule_alarm);
        }
    }

    fn on_atom<S: FnMut(AlarmMessage, Duration)>(&mut self, schedule_alarm: &mut S) {
        if !self.state.is_playing_media {
            return;
        }

        self.state.have_viewed_atom -= 1;
        if self.state.have_viewed_atom <= 0 {
            self.state.is_playing_media = false;
            self.scheduler
                .execute_immediate(Self::now(), schedule_alarm);
        } else {
            // A dropped viewer must not stall the game for a minute.
            let delay = Duration::from_secs(3) + self.settings.time.time_for_media_delay;
            self.scheduler
                .accelerate(delay, Self::now(), schedule_alarm);
        }
    }

    fn on_report<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        comment: Option<&str>,
        schedule_alarm: &mut S,
    ) {
        if self.state.decision != Decision::Reporting {
            return;
        }

        self.state.reports_count -= 1;
        if let Some(comment) = comment {
            if !comment.is_empty() {
                self.state.report_comments.push(comment.to_owned());
                self.state.accepted_reports += 1;
            }
        }

        if self.state.reports_count <= 0 {
            self.resolve_decision(schedule_alarm);
        }
    }

    fn on_is_right<T, F, S>(
        &mut self,
        sender: &str,
        right: bool,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !self.state.is_waiting {
            return;
        }

        let showman = self.showman_name();
        let validating = self.state.decision == Decision::AnswerValidating
            || (self.state.is_oral_now && self.state.decision.is_answering());
        if sender == showman && validating {
            let Ok(i) = usize::try_from(self.state.answerer_index) else {
                return;
            };
            if i >= self.roster.players.len() {
                return;
            }
            self.state.decision = Decision::AnswerValidating;
            let player = &mut self.roster.players[i];
            player.answer_is_right = right;
            player.answer_is_wrong = !right;
            self.state.showman_decision = true;
            self.resolve_decision(schedule_alarm);
            return;
        }

        if let Decision::AppellationDecision { .. } = self.state.decision {
            let mut voted = None;
            for (i, player) in self.roster.players.iter_mut().enumerate() {
                if player.flag && player.name() == sender {
                    player.flag = false;
                    voted = Some(i);
                    break;
                }
            }
            let Some(index) = voted else {
                return;
            };

            if right {
                self.state.appellation_right_votes += 1;
            }
            self.state.appellation_votes_received += 1;
            self.broadcast(&ServerMessage::PersonApellated { index }, tunnel_finder);

            if self.state.appellation_votes_received + 1 >= self.roster.players.len() {
                self.resolve_decision(schedule_alarm);
            }
        }
    }

    fn on_next<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        sender: &str,
        player_index: usize,
        schedule_alarm: &mut S,
    ) {
        if !self.state.is_waiting || self.state.decision != Decision::NextPersonStakeMaking {
            return;
        }
        if sender != self.showman_name() {
            return;
        }
        if player_index >= self.roster.players.len() || !self.roster.players[player_index].flag {
            return;
        }

        if self.state.order_index >= 0 && (self.state.order_index as usize) < self.state.order.len()
        {
            self.state.order[self.state.order_index as usize] = player_index as i32;
        }
        self.resolve_decision(schedule_alarm);
    }

    fn on_cat<T, F, S>(
        &mut self,
        sender: &str,
        player_index: usize,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !self.state.is_waiting || self.state.decision != Decision::CatGiving {
            return;
        }
        let Some(chooser) = self.chooser_name() else {
            return;
        };
        let showman = self.showman_name();
        let from_showman = sender == showman;
        if sender != chooser && !(self.state.is_oral_now && from_showman) {
            return;
        }
        if player_index >= self.roster.players.len() || !self.roster.players[player_index].flag {
            return;
        }

        self.state.answerer_index = player_index as i32;

        if self.state.is_oral_now {
            let counterpart = if from_showman { chooser } else { showman };
            self.send(&ServerMessage::Cancel, &counterpart, tunnel_finder);
        }

        self.resolve_decision(schedule_alarm);
    }

    fn on_cat_cost<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        sender: &str,
        sum: i32,
        schedule_alarm: &mut S,
    ) {
        let Decision::CatCostSetting {
            minimum,
            maximum,
            step,
        } = self.state.decision
        else {
            return;
        };
        if !self.state.is_waiting {
            return;
        }

        let answerer_name = self.answerer().map(|a| a.name().to_owned());
        let from_answerer = answerer_name.as_deref() == Some(sender);
        let from_showman = self.state.is_oral_now && sender == self.showman_name();
        if !from_answerer && !from_showman {
            return;
        }

        let on_step = step <= 0 || (sum - minimum) % step == 0;
        if sum >= minimum && sum <= maximum && on_step {
            self.state.cur_price_right = sum;
            self.state.cur_price_wrong = sum;
        }

        self.resolve_decision(schedule_alarm);
    }

    fn on_stake<T, F, S>(
        &mut self,
        sender: &str,
        kind: StakeKind,
        sum: Option<i32>,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Decision::AuctionStakeMaking { variants } = self.state.decision else {
            return;
        };
        if !self.state.is_waiting {
            return;
        }

        let Some(staker) = self.staker_name() else {
            return;
        };
        let showman = self.showman_name();
        let from_showman = sender == showman;
        if sender != staker && !(self.state.is_oral_now && from_showman) {
            return;
        }

        if !variants[usize::from(kind.code())] {
            self.state.stake_kind = None;
        } else if kind == StakeKind::Sum {
            let base = if self.state.stake != -1 {
                self.state.stake + constants::stakes::STAKE_STEP
            } else {
                self.state.cur_price_right + constants::stakes::STAKE_STEP
            };
            let minimum = round_up_to_stake_step(base);

            let Some(stake_sum) = sum else {
                self.state.stake_kind = None;
                return;
            };
            let staker_sum = self.staker_sum().unwrap_or(0);
            if stake_sum < minimum
                || stake_sum > staker_sum
                || stake_sum % constants::stakes::STAKE_STEP != 0
            {
                self.state.stake_kind = None;
                return;
            }
            self.state.stake_kind = Some(kind);
            self.state.stake_sum = stake_sum;
        } else {
            self.state.stake_kind = Some(kind);
        }

        if self.state.is_oral_now {
            let counterpart = if from_showman { staker } else { showman };
            self.send(&ServerMessage::Cancel, &counterpart, tunnel_finder);
        }

        self.resolve_decision(schedule_alarm);
    }

    fn staker_sum(&self) -> Option<i32> {
        usize::try_from(self.state.staker_index)
            .ok()
            .and_then(|i| self.roster.players.get(i))
            .map(|p| p.sum)
    }

    fn on_next_delete<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        sender: &str,
        player_index: usize,
        schedule_alarm: &mut S,
    ) {
        if !self.state.is_waiting
            || self.state.decision != Decision::NextPersonFinalThemeDeleting
        {
            return;
        }
        if sender != self.showman_name() {
            return;
        }
        if player_index >= self.roster.players.len() || !self.roster.players[player_index].flag {
            return;
        }

        self.state.current_deleter = player_index as i32;
        if !self.state.final_deleters.is_empty() {
            let cursor = self.state.deleter_cursor % self.state.final_deleters.len();
            self.state.final_deleters[cursor] = player_index as i32;
        }
        self.state.next_deleter_prompted = false;
        self.resolve_decision(schedule_alarm);
    }

    fn on_delete<T, F, S>(
        &mut self,
        sender: &str,
        theme_index: usize,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !self.state.is_waiting || self.state.decision != Decision::FinalThemeDeleting {
            return;
        }

        let deleter_name = usize::try_from(self.state.current_deleter)
            .ok()
            .and_then(|i| self.roster.players.get(i))
            .map(|p| p.name().to_owned());
        let Some(deleter) = deleter_name else {
            return;
        };
        let showman = self.showman_name();
        let from_showman = sender == showman;
        if sender != deleter && !(self.state.is_oral_now && from_showman) {
            return;
        }

        if !self.engine.active_theme_indices().contains(&theme_index) {
            return;
        }

        self.state.theme_index_to_delete = theme_index as i32;
        self.state.delete_prompted = false;

        if self.state.is_oral_now {
            let counterpart = if from_showman { deleter } else { showman };
            self.send(&ServerMessage::Cancel, &counterpart, tunnel_finder);
        }

        self.resolve_decision(schedule_alarm);
    }

    fn on_final_stake<T, F, S>(
        &mut self,
        sender: &str,
        sum: i32,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !self.state.is_waiting || self.state.decision != Decision::FinalStakeMaking {
            return;
        }

        let mut accepted = None;
        for (i, player) in self.roster.players.iter_mut().enumerate() {
            if player.name() != sender {
                continue;
            }
            if player.in_game && player.final_stake == -1 && sum >= 1 && sum <= player.sum {
                player.final_stake = sum;
                accepted = Some(i);
            }
            break;
        }

        if let Some(index) = accepted {
            self.state.num_of_stakers -= 1;
            self.broadcast(&ServerMessage::PersonFinalStake { index }, tunnel_finder);
        }

        if self.state.num_of_stakers <= 0 {
            self.resolve_decision(schedule_alarm);
        }
    }

    fn on_apellate<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        sender: &str,
        for_right_answer: bool,
        schedule_alarm: &mut S,
    ) {
        if !self.state.allow_appellation {
            return;
        }

        self.state.appellation_for_right_answer = for_right_answer;
        self.state.appellation_source = sender.to_owned();
        self.state.appelaer_index = -1;

        if for_right_answer {
            // Only the affected player may dispute their own wrong mark.
            if let Some(i) = self.roster.player_index(sender) {
                if let Some(entry) = self
                    .state
                    .question_history
                    .iter()
                    .find(|e| e.player_index == i)
                {
                    if !entry.is_right {
                        self.state.appelaer_index = i as i32;
                    }
                }
            }
        } else {
            // Any player may dispute the last right mark.
            if self.roster.player_index(sender).is_none() {
                return;
            }
            if let Some(last) = self.state.question_history.last() {
                if last.is_right {
                    self.state.appelaer_index = last.player_index as i32;
                }
            }
        }

        if self.state.appelaer_index != -1 {
            self.state.allow_appellation = false;
            self.state.resume_after_appellation = self.scheduler.planned_step();
            self.stop_waiting();
            self.scheduler.set_stop_reason(StopReason::Appellation);
            self.plan(
                Step::StartAppellation,
                Duration::from_millis(100),
                schedule_alarm,
            );
        }
    }
}

/// Upper-cases the first letter of a synthesized answer
fn grow_first_letter(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Rounds a minimum raise up to the stake step
fn round_up_to_stake_step(value: i32) -> i32 {
    let step = constants::stakes::STAKE_STEP;
    let remainder = value.rem_euclid(step);
    if remainder == 0 {
        value
    } else {
        value + (step - remainder)
    }
}

// Turn flow
impl<E: QuestionEngine> Game<E> {
    fn execute_step<T, F, S>(&mut self, step: Step, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        // Whatever wait preceded this step is over now.
        self.state.is_waiting = false;
        self.state.decision = Decision::None;
        self.scheduler.set_stop_reason(StopReason::None);

        match step {
            Step::AutoStart => {
                if self.state.stage == GameStage::Before {
                    self.auto_game(schedule_alarm, tunnel_finder);
                }
            }
            Step::StartGame => {
                let replic = self.lexicon.localize(Phrase::GameBeginning);
                self.special_replic(&replic, tunnel_finder);
                self.plan(Step::MoveNext, Duration::from_secs(1), schedule_alarm);
            }
            Step::MoveNext => {
                self.state.is_question_playing = false;
                match self.engine.move_next() {
                    EngineEvent::Round { .. } => self.present_round(schedule_alarm, tunnel_finder),
                    EngineEvent::ChooseQuestion => {
                        self.step_ask_to_choose(schedule_alarm, tunnel_finder);
                    }
                    EngineEvent::End => self.plan(Step::Winner, Duration::from_secs(1), schedule_alarm),
                }
            }
            Step::AskFirst => self.step_ask_first(schedule_alarm, tunnel_finder),
            Step::AskToChoose => self.step_ask_to_choose(schedule_alarm, tunnel_finder),
            Step::QuestionSelected => self.step_question_selected(schedule_alarm, tunnel_finder),
            Step::AskToTry => self.step_ask_to_try(schedule_alarm, tunnel_finder),
            Step::WaitTry => self.step_wait_try(schedule_alarm, tunnel_finder),
            Step::ContinueQuestion => self.step_continue_question(schedule_alarm, tunnel_finder),
            Step::AskAnswer => self.step_ask_answer(schedule_alarm, tunnel_finder),
            Step::AskRight => self.step_ask_right(schedule_alarm, tunnel_finder),
            Step::ApplyAnswer => self.step_apply_answer(schedule_alarm, tunnel_finder),
            Step::AskCat => self.step_ask_cat(schedule_alarm, tunnel_finder),
            Step::AskCatCost => self.step_ask_cat_cost(schedule_alarm, tunnel_finder),
            Step::AskStake => self.step_ask_stake(schedule_alarm, tunnel_finder),
            Step::PrintStakerPlayer => self.step_print_staker(schedule_alarm, tunnel_finder),
            Step::AskToDelete => self.step_ask_to_delete(schedule_alarm, tunnel_finder),
            Step::AskFinalStake => self.step_ask_final_stake(schedule_alarm, tunnel_finder),
            Step::PlayFinalQuestion => self.step_play_final_question(schedule_alarm, tunnel_finder),
            Step::AnnounceFinal => self.step_announce_final(schedule_alarm, tunnel_finder),
            Step::StartAppellation => self.step_start_appellation(schedule_alarm, tunnel_finder),
            Step::FinishAppellation => self.step_finish_appellation(schedule_alarm, tunnel_finder),
            Step::Winner => self.step_winner(schedule_alarm, tunnel_finder),
            Step::EndGame => self.step_end_game(),
        }
    }

    /// Announces a freshly entered round and arms its opening decision
    fn present_round<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(round) = self.engine.current_round() else {
            self.plan(Step::Winner, Duration::from_secs(1), schedule_alarm);
            return;
        };
        let kind = round.kind;
        let round_name = round.name.clone();

        self.state.stage = if kind == RoundKind::Final {
            GameStage::Final
        } else {
            GameStage::Round
        };
        self.inform_stage(tunnel_finder);
        self.special_replic(&round_name, tunnel_finder);

        self.timers.restart(TimerSlot::Round, Self::now());
        self.broadcast(
            &ServerMessage::RoundThemes {
                names: self.engine.theme_names(),
            },
            tunnel_finder,
        );
        self.broadcast(
            &ServerMessage::Tablo {
                themes: self.engine.table(),
            },
            tunnel_finder,
        );
        self.state.tablo_inform_stage = 2;
        self.state.question_history.clear();

        if kind == RoundKind::Final {
            for player in &mut self.roster.players {
                player.in_game = !player.account().is_free() && player.sum > 0;
            }

            let mut deleters: Vec<usize> = (0..self.roster.players.len())
                .filter(|&i| self.roster.players[i].in_game)
                .collect();
            deleters.sort_by_key(|&i| std::cmp::Reverse(self.roster.players[i].sum));
            self.state.final_deleters = deleters.into_iter().map(|i| i as i32).collect();
            self.state.deleter_cursor = 0;
            self.state.current_deleter = -1;
            self.state.theme_index_to_delete = -1;
            self.state.delete_prompted = false;
            self.state.next_deleter_prompted = false;

            if self.state.final_deleters.is_empty() {
                // Nobody qualified for the final round.
                if self.engine.move_next_round() {
                    self.present_round(schedule_alarm, tunnel_finder);
                } else {
                    self.plan(Step::Winner, Duration::from_secs(1), schedule_alarm);
                }
                return;
            }

            if self.engine.active_theme_indices().len() > 1 {
                self.plan(Step::AskToDelete, Duration::from_secs(2), schedule_alarm);
            } else {
                self.plan(Step::AskFinalStake, Duration::from_secs(1), schedule_alarm);
            }
        } else {
            for player in &mut self.roster.players {
                player.can_press = false;
                player.in_game = true;
            }

            if self.engine.round_index() == 0 && self.state.chooser_index < 0 {
                self.plan(Step::AskFirst, Duration::from_secs(2), schedule_alarm);
            } else {
                // Later rounds: the poorest player chooses first.
                if let Some(min_sum) = self.roster.players.iter().map(|p| p.sum).min() {
                    let chooser = self
                        .roster
                        .players
                        .iter()
                        .take_while(|p| p.sum != min_sum)
                        .count();
                    self.state.chooser_index = chooser as i32;
                }
                self.plan(Step::AskToChoose, Duration::from_secs(2), schedule_alarm);
            }
        }
    }

    fn step_ask_first<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        for player in &mut self.roster.players {
            player.flag = !player.account().is_free();
        }
        let flags: Vec<bool> = self.roster.players.iter().map(|p| p.flag).collect();

        self.send(
            &ServerMessage::FirstPrompt { flags },
            &self.showman_name(),
            tunnel_finder,
        );
        self.begin_waiting(
            Decision::StarterChoosing,
            Step::AskToChoose,
            self.settings.time.time_for_showman_decisions,
            schedule_alarm,
        );
    }

    fn step_ask_to_choose<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if self.engine.remaining_question_count() == 0 {
            self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            return;
        }

        if self.state.chooser_index < 0 {
            // The showman never picked: fall back to a random eligible seat.
            let eligible: Vec<usize> = (0..self.roster.players.len())
                .filter(|&i| !self.roster.players[i].account().is_free())
                .collect();
            if eligible.is_empty() {
                self.plan(Step::MoveNext, Duration::from_secs(2), schedule_alarm);
                return;
            }
            let pick = eligible[fastrand::usize(..eligible.len())];
            self.state.chooser_index = pick as i32;
        }
        for player in &mut self.roster.players {
            player.flag = false;
        }

        let Some(chooser) = self.chooser_name() else {
            self.plan(Step::MoveNext, Duration::from_secs(2), schedule_alarm);
            return;
        };

        self.state.is_oral_now = self.state.is_oral;
        self.send(&ServerMessage::ChoicePrompt, &chooser, tunnel_finder);
        if self.state.is_oral_now {
            self.send(&ServerMessage::ChoicePrompt, &self.showman_name(), tunnel_finder);
        }
        self.begin_waiting(
            Decision::QuestionChoosing,
            Step::QuestionSelected,
            self.settings.time.time_for_choosing_question,
            schedule_alarm,
        );
    }

    fn step_question_selected<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if self.engine.current_question().is_none()
            && self.engine.select_first_active().is_none()
        {
            self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            return;
        }

        let Some(question) = self.engine.current_question() else {
            self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            return;
        };
        let price = question.price;
        let text = question.text.clone();
        let kind = question.kind;
        let theme_index = self.engine.theme_index();
        let question_index = self.engine.question_index();

        self.broadcast(
            &ServerMessage::Choice {
                theme_index,
                question_index,
            },
            tunnel_finder,
        );

        self.state.allow_appellation = true;
        self.state.can_mark_question = true;
        self.state.used_wrong_versions.clear();
        self.state.question_history.clear();
        self.state.answerer_index = -1;
        self.state.staker_index = -1;
        self.state.stake = -1;
        self.state.stake_kind = None;
        self.state.stake_prompted = false;
        self.state.next_staker_prompted = false;
        self.state.order.clear();
        self.state.order_index = -1;
        self.state.showman_decision = false;
        self.state.cur_price_right = price;
        self.state.cur_price_wrong = price;
        for player in &mut self.roster.players {
            player.reset_for_question();
        }

        match kind {
            QuestionKind::Simple => {
                self.broadcast(
                    &ServerMessage::QType {
                        kind: "simple".to_owned(),
                    },
                    tunnel_finder,
                );
                self.broadcast(&ServerMessage::Question { price, text }, tunnel_finder);
                self.state.is_question_playing = true;
                for player in &mut self.roster.players {
                    player.can_press = !player.account().is_free();
                }
                let reading = self.reading_time(price);
                self.plan(Step::AskToTry, reading, schedule_alarm);
            }
            QuestionKind::Secret => {
                self.broadcast(
                    &ServerMessage::QType {
                        kind: "cat".to_owned(),
                    },
                    tunnel_finder,
                );
                self.plan(Step::AskCat, Duration::from_secs(1), schedule_alarm);
            }
            QuestionKind::Stake => {
                self.broadcast(
                    &ServerMessage::QType {
                        kind: "auction".to_owned(),
                    },
                    tunnel_finder,
                );
                for player in &mut self.roster.players {
                    player.stake_making = !player.account().is_free();
                }
                let seats = self.roster.players.len();
                let chooser = usize::try_from(self.state.chooser_index).unwrap_or(0) % seats.max(1);
                self.state.order = (0..seats).map(|k| ((chooser + k) % seats) as i32).collect();
                self.state.order_index = -1;
                self.state.staker_index = self.state.chooser_index;
                self.plan(Step::AskStake, Duration::from_secs(1), schedule_alarm);
            }
        }
    }

    /// Time for streaming the question text before the button window opens
    fn reading_time(&self, _price: i32) -> Duration {
        let length = self
            .engine
            .current_question()
            .map_or(0, |q| q.text.chars().count());
        let seconds = (length as u64 / u64::from(self.settings.reading_speed.max(1))).max(1);
        Duration::from_secs(seconds)
    }

    fn step_ask_to_try<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        self.broadcast(&ServerMessage::Try, tunnel_finder);
        self.state.is_thinking = true;
        self.timers.restart(TimerSlot::Thinking, Self::now());
        self.broadcast(
            &ServerMessage::Timer {
                slot: TimerSlot::Thinking.index(),
                args: vec![
                    "GO".to_owned(),
                    (self.settings.time.time_for_thinking_on_question.as_secs() * 10).to_string(),
                ],
            },
            tunnel_finder,
        );
        self.begin_waiting(
            Decision::Pressing,
            Step::WaitTry,
            self.settings.time.time_for_thinking_on_question,
            schedule_alarm,
        );
    }

    fn step_wait_try<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        self.broadcast(
            &ServerMessage::EndTry {
                arg: "A".to_owned(),
            },
            tunnel_finder,
        );
        self.reveal_and_finish(schedule_alarm, tunnel_finder);
    }

    fn reveal_and_finish<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let right = self
            .engine
            .current_question()
            .and_then(|q| q.right.first().cloned())
            .unwrap_or_default();
        self.broadcast(&ServerMessage::RightAnswer { text: right }, tunnel_finder);

        self.state.is_question_playing = false;
        self.state.is_thinking = false;
        self.state.answerer_index = -1;
        self.engine.finish_question();
        self.plan(Step::MoveNext, Duration::from_secs(2), schedule_alarm);
    }

    fn step_continue_question<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        self.state.answerer_index = -1;
        if self.roster.players.iter().any(|p| p.can_press) {
            self.step_ask_to_try(schedule_alarm, tunnel_finder);
        } else {
            self.step_wait_try(schedule_alarm, tunnel_finder);
        }
    }

    fn step_ask_answer<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        self.state.is_deferring_answer = false;

        let Ok(index) = usize::try_from(self.state.answerer_index) else {
            self.step_continue_question(schedule_alarm, tunnel_finder);
            return;
        };
        if index >= self.roster.players.len() {
            self.step_continue_question(schedule_alarm, tunnel_finder);
            return;
        }

        let kind = self.engine.current_question().map(|q| q.kind);
        if matches!(kind, Some(QuestionKind::Secret | QuestionKind::Stake)) {
            // The question was held back until its answerer was settled.
            let text = self
                .engine
                .current_question()
                .map(|q| q.text.clone())
                .unwrap_or_default();
            self.broadcast(
                &ServerMessage::Question {
                    price: self.state.cur_price_right,
                    text,
                },
                tunnel_finder,
            );
        }

        if self.state.is_thinking {
            self.state.is_thinking = false;
            self.broadcast(
                &ServerMessage::EndTry {
                    arg: index.to_string(),
                },
                tunnel_finder,
            );
        }

        self.state.is_oral_now = self.state.is_oral;
        let answerer = self.roster.players[index].name().to_owned();
        self.send(&ServerMessage::AnswerPrompt, &answerer, tunnel_finder);
        self.begin_waiting(
            Decision::Answering { final_round: false },
            Step::AskRight,
            self.settings.time.time_for_printing_answer,
            schedule_alarm,
        );
    }

    fn step_ask_right<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Ok(index) = usize::try_from(self.state.answerer_index) else {
            self.plan(Step::ContinueQuestion, Duration::from_millis(100), schedule_alarm);
            return;
        };
        if index >= self.roster.players.len() {
            self.plan(Step::ContinueQuestion, Duration::from_millis(100), schedule_alarm);
            return;
        }

        if self.roster.players[index].answer.is_empty() {
            let no_answer = self.lexicon.localize(Phrase::IDontKnow);
            let player = &mut self.roster.players[index];
            player.answer = no_answer;
            player.answer_is_wrong = true;
        }

        let answer = self.roster.players[index].answer.clone();
        let right_answers = self
            .engine
            .current_question()
            .map(|q| q.right.clone())
            .unwrap_or_default();

        self.state.showman_decision = false;
        self.state.is_oral_now = self.state.is_oral;
        self.send(
            &ServerMessage::IsRightPrompt {
                answer,
                right_answers,
            },
            &self.showman_name(),
            tunnel_finder,
        );
        self.begin_waiting(
            Decision::AnswerValidating,
            Step::ApplyAnswer,
            self.settings.time.time_for_showman_decisions,
            schedule_alarm,
        );
    }

    fn step_apply_answer<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Ok(index) = usize::try_from(self.state.answerer_index) else {
            self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            return;
        };
        if index >= self.roster.players.len() {
            self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            return;
        }

        if !self.state.showman_decision {
            // No verdict arrived in time: compare against the canon.
            let given = self.roster.players[index].answer.trim().to_lowercase();
            let right = self
                .engine
                .current_question()
                .is_some_and(|q| q.right.iter().any(|r| r.trim().to_lowercase() == given));
            let player = &mut self.roster.players[index];
            player.answer_is_right = right;
            player.answer_is_wrong = !right;
        }

        let right = self.roster.players[index].answer_is_right;
        let final_round = self.state.stage == GameStage::Final;

        if final_round {
            let delta = self.roster.players[index].final_stake.max(0);
            if right {
                self.roster.players[index].sum += delta;
            } else {
                self.roster.players[index].sum -= delta;
            }
            self.state.question_history.push(AnswerResult {
                player_index: index,
                is_right: right,
            });
            self.broadcast(
                &ServerMessage::Person {
                    is_right: right,
                    index,
                    delta,
                },
                tunnel_finder,
            );
            self.inform_sums(tunnel_finder);
            self.plan(Step::AnnounceFinal, Duration::from_secs(1), schedule_alarm);
            return;
        }

        if right {
            let delta = self.state.cur_price_right;
            self.roster.players[index].sum += delta;
            self.state.question_history.push(AnswerResult {
                player_index: index,
                is_right: true,
            });
            self.broadcast(
                &ServerMessage::Person {
                    is_right: true,
                    index,
                    delta,
                },
                tunnel_finder,
            );
            self.state.chooser_index = index as i32;
            self.inform_sums(tunnel_finder);
            self.reveal_and_finish(schedule_alarm, tunnel_finder);
        } else {
            let delta = self.state.cur_price_wrong;
            self.roster.players[index].sum -= delta;
            self.roster.players[index].can_press = false;
            self.state.question_history.push(AnswerResult {
                player_index: index,
                is_right: false,
            });
            self.broadcast(
                &ServerMessage::Person {
                    is_right: false,
                    index,
                    delta,
                },
                tunnel_finder,
            );
            self.state.answerer_index = -1;
            self.inform_sums(tunnel_finder);

            let kind = self.engine.current_question().map(|q| q.kind);
            if kind == Some(QuestionKind::Simple) {
                self.plan(Step::ContinueQuestion, Duration::from_secs(1), schedule_alarm);
            } else {
                self.reveal_and_finish(schedule_alarm, tunnel_finder);
            }
        }
    }

    fn step_ask_cat<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(chooser) = self.chooser_name() else {
            self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            return;
        };

        for player in &mut self.roster.players {
            player.flag = !player.account().is_free();
        }
        let flags: Vec<bool> = self.roster.players.iter().map(|p| p.flag).collect();

        self.state.is_oral_now = self.state.is_oral;
        self.send(&ServerMessage::CatPrompt { flags: flags.clone() }, &chooser, tunnel_finder);
        if self.state.is_oral_now {
            self.send(
                &ServerMessage::CatPrompt { flags },
                &self.showman_name(),
                tunnel_finder,
            );
        }
        self.begin_waiting(
            Decision::CatGiving,
            Step::AskCatCost,
            self.settings.time.time_for_showman_decisions,
            schedule_alarm,
        );
    }

    fn step_ask_cat_cost<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if self.state.answerer_index < 0 {
            // The chooser kept the secret question for themselves.
            self.state.answerer_index = self.state.chooser_index;
        }
        if self.state.answerer_index < 0 {
            self.plan(Step::MoveNext, Duration::from_millis(100), schedule_alarm);
            return;
        }

        let Some(range) = self.engine.current_question().and_then(|q| q.cost_range) else {
            self.step_ask_answer(schedule_alarm, tunnel_finder);
            return;
        };

        // Default cost applies when no choice arrives in time.
        self.state.cur_price_right = range.minimum;
        self.state.cur_price_wrong = range.minimum;

        let answerer = self
            .answerer()
            .map(|a| a.name().to_owned())
            .unwrap_or_default();
        self.state.is_oral_now = self.state.is_oral;
        self.send(
            &ServerMessage::CatCostPrompt {
                minimum: range.minimum,
                maximum: range.maximum,
                step: range.step,
            },
            &answerer,
            tunnel_finder,
        );
        if self.state.is_oral_now {
            self.send(
                &ServerMessage::CatCostPrompt {
                    minimum: range.minimum,
                    maximum: range.maximum,
                    step: range.step,
                },
                &self.showman_name(),
                tunnel_finder,
            );
        }
        self.begin_waiting(
            Decision::CatCostSetting {
                minimum: range.minimum,
                maximum: range.maximum,
                step: range.step,
            },
            Step::AskAnswer,
            self.settings.time.time_for_showman_decisions,
            schedule_alarm,
        );
    }

    fn step_ask_stake<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        // Settle the outcome of whatever prompt this step resumes from.
        let mut slot_just_filled = false;
        if self.state.next_staker_prompted {
            self.state.next_staker_prompted = false;
            let idx = self.state.order_index;
            if idx >= 0 && (idx as usize) < self.state.order.len() {
                if self.state.order[idx as usize] < 0 {
                    // The showman never picked: take the first live staker.
                    if let Some(first) = self.roster.players.iter().position(|p| p.stake_making) {
                        self.state.order[idx as usize] = first as i32;
                    }
                }
                slot_just_filled = self.state.order[idx as usize] >= 0;
            }
        } else if let Some(kind) = self.state.stake_kind.take() {
            self.state.stake_prompted = false;
            self.apply_stake(kind, tunnel_finder);
        } else if self.state.stake_prompted {
            // No stake arrived in time: the staker passes.
            self.state.stake_prompted = false;
            if let Ok(index) = usize::try_from(self.state.staker_index) {
                if index < self.roster.players.len() && self.roster.players[index].stake_making {
                    self.roster.players[index].stake_making = false;
                    self.broadcast(
                        &ServerMessage::PersonStake {
                            index,
                            kind: StakeKind::Pass,
                            sum: None,
                        },
                        tunnel_finder,
                    );
                }
            }
        }

        let stakers = self
            .roster
            .players
            .iter()
            .filter(|p| p.stake_making)
            .count();
        if stakers == 0 {
            self.engine.skip_question();
            self.plan(Step::MoveNext, Duration::from_secs(1), schedule_alarm);
            return;
        }
        if stakers == 1 {
            self.step_print_staker(schedule_alarm, tunnel_finder);
            return;
        }

        // Walk the rotation to the staker whose turn it is. A slot freshly
        // filled by the showman is taken as-is rather than skipped.
        let order_len = self.state.order.len();
        if order_len == 0 {
            self.engine.skip_question();
            self.plan(Step::MoveNext, Duration::from_secs(1), schedule_alarm);
            return;
        }
        let mut advance = !slot_just_filled;
        let mut found = false;
        for _ in 0..=order_len {
            if advance {
                self.state.order_index += 1;
                if self.state.order_index as usize >= order_len {
                    self.state.order_index = 0;
                }
            }
            advance = true;
            let entry = self.state.order[self.state.order_index as usize];
            if entry < 0 {
                for player in &mut self.roster.players {
                    player.flag = player.stake_making;
                }
                let flags: Vec<bool> = self.roster.players.iter().map(|p| p.flag).collect();
                self.send(
                    &ServerMessage::NextPrompt { flags },
                    &self.showman_name(),
                    tunnel_finder,
                );
                self.state.next_staker_prompted = true;
                self.begin_waiting(
                    Decision::NextPersonStakeMaking,
                    Step::AskStake,
                    self.settings.time.time_for_showman_decisions,
                    schedule_alarm,
                );
                return;
            }
            let index = entry as usize;
            if index < self.roster.players.len() && self.roster.players[index].stake_making {
                self.state.staker_index = entry;
                found = true;
                break;
            }
        }
        if !found {
            self.plan(Step::MoveNext, Duration::from_secs(1), schedule_alarm);
            return;
        }

        let Ok(staker) = usize::try_from(self.state.staker_index) else {
            self.plan(Step::MoveNext, Duration::from_secs(1), schedule_alarm);
            return;
        };

        let base = if self.state.stake != -1 {
            self.state.stake + constants::stakes::STAKE_STEP
        } else {
            self.state.cur_price_right + constants::stakes::STAKE_STEP
        };
        let minimum = round_up_to_stake_step(base);
        let variants = [
            self.state.stake == -1,
            self.roster.players[staker].sum >= minimum,
            self.state.stake != -1,
            true,
        ];

        let staker_name = self.roster.players[staker].name().to_owned();
        self.state.is_oral_now = self.state.is_oral;
        self.send(
            &ServerMessage::StakePrompt { variants, minimum },
            &staker_name,
            tunnel_finder,
        );
        if self.state.is_oral_now {
            self.send(
                &ServerMessage::StakePrompt { variants, minimum },
                &self.showman_name(),
                tunnel_finder,
            );
        }
        self.state.stake_prompted = true;
        self.begin_waiting(
            Decision::AuctionStakeMaking { variants },
            Step::AskStake,
            self.settings.time.time_for_making_stake,
            schedule_alarm,
        );
    }

    fn apply_stake<T: Tunnel, F: Fn(&str) -> Option<T>>(
        &mut self,
        kind: StakeKind,
        tunnel_finder: &F,
    ) {
        let Ok(index) = usize::try_from(self.state.staker_index) else {
            return;
        };
        if index >= self.roster.players.len() {
            return;
        }

        match kind {
            StakeKind::Nominal => {
                self.state.stake = self.state.cur_price_right;
                self.broadcast(
                    &ServerMessage::PersonStake {
                        index,
                        kind,
                        sum: None,
                    },
                    tunnel_finder,
                );
            }
            StakeKind::Sum => {
                self.state.stake = self.state.stake_sum;
                self.broadcast(
                    &ServerMessage::PersonStake {
                        index,
                        kind,
                        sum: Some(self.state.stake_sum),
                    },
                    tunnel_finder,
                );
            }
            StakeKind::Pass => {
                self.roster.players[index].stake_making = false;
                self.broadcast(
                    &ServerMessage::PersonStake {
                        index,
                        kind,
                        sum: None,
                    },
                    tunnel_finder,
                );
            }
            StakeKind::AllIn => {
                self.state.stake = self.roster.players[index].sum;
                self.broadcast(
                    &ServerMessage::PersonStake {
                        index,
                        kind,
                        sum: Some(self.state.stake),
                    },
                    tunnel_finder,
                );
            }
        }
    }

    fn step_print_staker<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(winner) = self.roster.players.iter().position(|p| p.stake_making) else {
            self.engine.skip_question();
            self.plan(Step::MoveNext, Duration::from_secs(1), schedule_alarm);
            return;
        };

        self.state.staker_index = winner as i32;
        if self.state.stake == -1 {
            self.state.stake = self.state.cur_price_right;
        }
        self.state.answerer_index = winner as i32;
        self.state.cur_price_right = self.state.stake;
        self.state.cur_price_wrong = self.state.stake;

        self.step_ask_answer(schedule_alarm, tunnel_finder);
    }

    fn step_ask_to_delete<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        // Apply a deletion recorded by the handler or the timeout default.
        if self.state.theme_index_to_delete >= 0 {
            let index = self.state.theme_index_to_delete as usize;
            self.engine.delete_theme(index);
            self.broadcast(&ServerMessage::ThemeDeleted { index }, tunnel_finder);
            self.state.theme_index_to_delete = -1;
            self.state.current_deleter = -1;
            self.state.deleter_cursor += 1;
            self.state.delete_prompted = false;
        }

        let active = self.engine.active_theme_indices();
        if active.len() <= 1 || self.state.final_deleters.is_empty() {
            self.plan(Step::AskFinalStake, Duration::from_secs(1), schedule_alarm);
            return;
        }

        if self.state.current_deleter >= 0 && self.state.delete_prompted {
            // The deleter never picked: delete the first active theme.
            self.state.theme_index_to_delete = active[0] as i32;
            self.state.delete_prompted = false;
            self.plan(Step::AskToDelete, Duration::from_millis(100), schedule_alarm);
            return;
        }

        if self.state.current_deleter < 0 {
            let len = self.state.final_deleters.len();
            let entry = self.state.final_deleters[self.state.deleter_cursor % len];
            if entry < 0 {
                if self.state.next_deleter_prompted {
                    // No pick from the showman: take the first living player.
                    let fallback = self.roster.players.iter().position(|p| p.in_game);
                    let Some(fallback) = fallback else {
                        self.plan(Step::AskFinalStake, Duration::from_secs(1), schedule_alarm);
                        return;
                    };
                    self.state.current_deleter = fallback as i32;
                    self.state.next_deleter_prompted = false;
                } else {
                    for player in &mut self.roster.players {
                        player.flag = player.in_game;
                    }
                    let flags: Vec<bool> = self.roster.players.iter().map(|p| p.flag).collect();
                    self.send(
                        &ServerMessage::NextDeletePrompt { flags },
                        &self.showman_name(),
                        tunnel_finder,
                    );
                    self.state.next_deleter_prompted = true;
                    self.begin_waiting(
                        Decision::NextPersonFinalThemeDeleting,
                        Step::AskToDelete,
                        self.settings.time.time_for_showman_decisions,
                        schedule_alarm,
                    );
                    return;
                }
            } else {
                self.state.current_deleter = entry;
            }
        }

        let deleter_name = usize::try_from(self.state.current_deleter)
            .ok()
            .and_then(|i| self.roster.players.get(i))
            .filter(|p| p.in_game)
            .map(|p| p.name().to_owned());
        let Some(deleter) = deleter_name else {
            // The slot points at a dead or removed seat: auto-delete.
            self.state.theme_index_to_delete = active[0] as i32;
            self.state.current_deleter = -1;
            self.plan(Step::AskToDelete, Duration::from_millis(100), schedule_alarm);
            return;
        };

        self.state.is_oral_now = self.state.is_oral;
        self.send(&ServerMessage::DeletePrompt, &deleter, tunnel_finder);
        if self.state.is_oral_now {
            self.send(&ServerMessage::DeletePrompt, &self.showman_name(), tunnel_finder);
        }
        self.state.delete_prompted = true;
        self.begin_waiting(
            Decision::FinalThemeDeleting,
            Step::AskToDelete,
            self.settings.time.time_for_choosing_question,
            schedule_alarm,
        );
    }

    fn step_ask_final_stake<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let mut stakers = 0;
        for player in &mut self.roster.players {
            if player.in_game {
                player.final_stake = -1;
                stakers += 1;
            }
        }
        self.state.num_of_stakers = stakers;

        if stakers == 0 {
            self.plan(Step::Winner, Duration::from_secs(1), schedule_alarm);
            return;
        }

        let names: Vec<String> = self
            .roster
            .players
            .iter()
            .filter(|p| p.in_game)
            .map(|p| p.name().to_owned())
            .collect();
        for name in names {
            self.send(&ServerMessage::FinalStakePrompt, &name, tunnel_finder);
        }
        self.begin_waiting(
            Decision::FinalStakeMaking,
            Step::PlayFinalQuestion,
            self.settings.time.time_for_making_stake,
            schedule_alarm,
        );
    }

    fn step_play_final_question<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        // Stakes that never arrived default to the minimum.
        for player in &mut self.roster.players {
            if player.in_game && player.final_stake == -1 {
                player.final_stake = 1;
            }
        }

        let active = self.engine.active_theme_indices();
        let Some(&theme) = active.first() else {
            self.plan(Step::Winner, Duration::from_secs(1), schedule_alarm);
            return;
        };
        if self.engine.select_theme(theme).is_none() {
            self.plan(Step::Winner, Duration::from_secs(1), schedule_alarm);
            return;
        }
        let question_index = self.engine.question_index();

        let text = self
            .engine
            .current_question()
            .map(|q| q.text.clone())
            .unwrap_or_default();
        self.broadcast(
            &ServerMessage::Choice {
                theme_index: theme,
                question_index,
            },
            tunnel_finder,
        );
        self.broadcast(&ServerMessage::Question { price: 0, text }, tunnel_finder);

        self.state.allow_appellation = true;
        self.state.can_mark_question = true;
        self.state.question_history.clear();
        self.state.used_wrong_versions.clear();
        self.state.announce_index = -1;
        self.state.final_answers_received = 0;
        self.state.final_answers_expected = 0;
        let mut prompts = Vec::new();
        for player in &mut self.roster.players {
            if player.in_game {
                player.answer.clear();
                player.answer_is_right = false;
                player.answer_is_wrong = false;
                self.state.final_answers_expected += 1;
                prompts.push(player.name().to_owned());
            }
        }
        for name in prompts {
            self.send(&ServerMessage::AnswerPrompt, &name, tunnel_finder);
        }

        self.timers.restart(TimerSlot::Thinking, Self::now());
        self.begin_waiting(
            Decision::Answering { final_round: true },
            Step::AnnounceFinal,
            self.settings.time.time_for_final_thinking,
            schedule_alarm,
        );
    }

    fn step_announce_final<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        // Answers that never arrived read as "I don't know".
        let no_answer = self.lexicon.localize(Phrase::IDontKnow);
        for player in &mut self.roster.players {
            if player.in_game && player.answer.is_empty() {
                player.answer = no_answer.clone();
                player.answer_is_wrong = true;
            }
        }

        let next = self
            .roster
            .players
            .iter()
            .enumerate()
            .find(|(i, p)| (*i as i32) > self.state.announce_index && p.in_game)
            .map(|(i, _)| i);
        let Some(index) = next else {
            self.engine.finish_question();
            self.plan(Step::Winner, Duration::from_secs(1), schedule_alarm);
            return;
        };

        self.state.announce_index = index as i32;
        self.state.answerer_index = index as i32;

        let player_name = self.roster.players[index].name().to_owned();
        let answer = self.roster.players[index].answer.clone();
        self.special_replic(&format!("{player_name}: {answer}"), tunnel_finder);

        let right_answers = self
            .engine
            .current_question()
            .map(|q| q.right.clone())
            .unwrap_or_default();
        self.state.showman_decision = false;
        self.send(
            &ServerMessage::IsRightPrompt {
                answer,
                right_answers,
            },
            &self.showman_name(),
            tunnel_finder,
        );
        self.begin_waiting(
            Decision::AnswerValidating,
            Step::ApplyAnswer,
            self.settings.time.time_for_showman_decisions,
            schedule_alarm,
        );
    }

    fn step_start_appellation<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Ok(appelaer) = usize::try_from(self.state.appelaer_index) else {
            let resume = self.state.resume_after_appellation.take().unwrap_or(Step::MoveNext);
            self.plan(resume, Duration::from_millis(100), schedule_alarm);
            return;
        };
        if appelaer >= self.roster.players.len() {
            let resume = self.state.resume_after_appellation.take().unwrap_or(Step::MoveNext);
            self.plan(resume, Duration::from_millis(100), schedule_alarm);
            return;
        }

        self.state.appellation_votes_received = 0;
        self.state.appellation_right_votes = 0;
        for (i, player) in self.roster.players.iter_mut().enumerate() {
            player.flag = i != appelaer && !player.account().is_free();
        }

        let answer = self.roster.players[appelaer].answer.clone();
        let right_answers = self
            .engine
            .current_question()
            .map(|q| q.right.clone())
            .unwrap_or_default();

        self.broadcast(
            &ServerMessage::PersonApellated { index: appelaer },
            tunnel_finder,
        );
        self.broadcast(
            &ServerMessage::IsRightPrompt {
                answer,
                right_answers,
            },
            tunnel_finder,
        );
        self.begin_waiting(
            Decision::AppellationDecision {
                for_right_answer: self.state.appellation_for_right_answer,
            },
            Step::FinishAppellation,
            self.settings.time.time_for_showman_decisions,
            schedule_alarm,
        );
    }

    fn step_finish_appellation<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let votes = self.state.appellation_votes_received;
        let right_votes = self.state.appellation_right_votes;
        let approved = votes > 0 && right_votes * 2 > votes;

        if approved {
            if let Ok(index) = usize::try_from(self.state.appelaer_index) {
                if index < self.roster.players.len() {
                    let delta = self.state.cur_price_right + self.state.cur_price_wrong;
                    if self.state.appellation_for_right_answer {
                        // The wrong mark is overturned: refund and award.
                        self.roster.players[index].sum += delta;
                        if let Some(entry) = self
                            .state
                            .question_history
                            .iter_mut()
                            .find(|e| e.player_index == index)
                        {
                            entry.is_right = true;
                        }
                        self.state.chooser_index = index as i32;
                    } else {
                        // The right mark is overturned: take it all back.
                        self.roster.players[index].sum -= delta;
                        if let Some(entry) = self
                            .state
                            .question_history
                            .iter_mut()
                            .rev()
                            .find(|e| e.is_right)
                        {
                            entry.is_right = false;
                        }
                    }
                    self.inform_sums(tunnel_finder);
                }
            }
        }

        for player in &mut self.roster.players {
            player.flag = false;
        }
        self.state.appelaer_index = -1;

        let resume = self.state.resume_after_appellation.take().unwrap_or(Step::MoveNext);
        self.plan(resume, Duration::from_secs(1), schedule_alarm);
    }

    fn step_winner<T, F, S>(&mut self, schedule_alarm: &mut S, tunnel_finder: &F)
    where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        self.state.stage = GameStage::After;
        self.inform_stage(tunnel_finder);

        let winner = self
            .roster
            .players
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| p.sum)
            .map_or(-1, |(i, _)| i as i32);
        self.broadcast(&ServerMessage::Winner { index: winner }, tunnel_finder);

        let humans = self
            .roster
            .person_names()
            .iter()
            .filter_map(|name| self.roster.find_account(name))
            .filter(|a| a.is_human && a.is_connected)
            .count();
        self.state.reports_count = humans as i32;

        if humans == 0 {
            self.plan(Step::EndGame, Duration::ZERO, schedule_alarm);
            return;
        }

        self.broadcast(&ServerMessage::ReportPrompt, tunnel_finder);
        self.begin_waiting(
            Decision::Reporting,
            Step::EndGame,
            Duration::from_secs(60),
            schedule_alarm,
        );
    }

    fn step_end_game(&mut self) {
        self.stop_waiting();
        self.scheduler.cancel();
        self.state.can_mark_question = false;
    }
}

// Seat removal re-normalization
impl<E: QuestionEngine> Game<E> {
    /// Re-normalizes every stored player-index reference after the seat at
    /// `removed` was deleted from the roster
    ///
    /// References greater than the removed index shift down by one;
    /// references equal to it get a per-reference recovery: the chooser
    /// falls to the poorest player, the answerer resets and the question
    /// flow is re-scheduled so the game cannot stall, the staker recomputes
    /// from the remaining auction participants, the turn-order permutation
    /// is rebuilt, and a pending starter choice is re-asked from scratch.
    /// Runs once per seat deletion; afterwards no reference points past the
    /// shrunk roster.
    fn drop_player_index<T, F, S>(
        &mut self,
        removed: usize,
        schedule_alarm: &mut S,
        tunnel_finder: &F,
    ) where
        T: Tunnel,
        F: Fn(&str) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let removed_i = removed as i32;

        if self.state.chooser_index > removed_i {
            self.state.chooser_index -= 1;
        } else if self.state.chooser_index == removed_i {
            // The chooser left: the poorest player inherits the choice.
            self.state.chooser_index = match self.roster.players.iter().map(|p| p.sum).min() {
                Some(min_sum) => self
                    .roster
                    .players
                    .iter()
                    .take_while(|p| p.sum != min_sum)
                    .count() as i32,
                None => -1,
            };
        }

        if self.state.answerer_index > removed_i {
            self.state.answerer_index -= 1;
        } else if self.state.answerer_index == removed_i {
            self.state.answerer_index = -1;
            let next_step = self.scheduler.planned_step();
            tracing::debug!(
                ?next_step,
                decision = ?self.state.decision,
                "answerer seat removed mid-question"
            );

            if self.state.decision.is_answering() && self.state.stage != GameStage::Final {
                // The answerer is gone: the question must move on.
                self.stop_waiting();
                if self.state.is_oral_now {
                    self.send(&ServerMessage::Cancel, &self.showman_name(), tunnel_finder);
                }
                self.plan(
                    Step::ContinueQuestion,
                    Duration::from_millis(100),
                    schedule_alarm,
                );
            } else if next_step == Some(Step::AskRight) {
                // They answered but the showman had not been asked yet.
                self.plan(
                    Step::ContinueQuestion,
                    Duration::from_millis(100),
                    schedule_alarm,
                );
            } else if matches!(next_step, Some(Step::AskCat | Step::AskCatCost)) {
                self.engine.skip_question();
                self.plan(Step::MoveNext, Duration::from_secs(2), schedule_alarm);
            } else if next_step == Some(Step::PrintStakerPlayer) {
                self.plan(Step::AskStake, Duration::from_millis(1500), schedule_alarm);
            }
        }

        if self.state.appelaer_index > removed_i {
            self.state.appelaer_index -= 1;
        } else if self.state.appelaer_index == removed_i {
            self.state.appelaer_index = -1;
        }

        if self.state.staker_index > removed_i {
            self.state.staker_index -= 1;
        } else if self.state.staker_index == removed_i {
            let stakers: Vec<usize> = self
                .roster
                .players
                .iter()
                .enumerate()
                .filter(|(_, p)| p.stake_making)
                .map(|(i, _)| i)
                .collect();
            if stakers.len() == 1 {
                self.state.staker_index = stakers[0] as i32;
            } else {
                self.state.staker_index = -1;
            }
        }

        let is_auction = self
            .engine
            .current_question()
            .is_some_and(|q| q.kind == QuestionKind::Stake);
        if !self.state.order.is_empty() && is_auction {
            let current = self.state.order.clone();
            let mut new_order = vec![-1_i32; self.roster.players.len()];
            let mut j = 0;
            for (i, &entry) in current.iter().enumerate() {
                if entry == removed_i {
                    if self.state.order_index >= i as i32 {
                        self.state.order_index -= 1; // -1 is fine here
                    }
                } else if j < new_order.len() {
                    new_order[j] = entry - i32::from(entry > removed_i);
                    j += 1;
                }
            }
            if self.state.order_index == current.len() as i32 - 1 {
                self.state.order_index = new_order.len() as i32 - 1;
            }
            self.state.order = new_order;

            if !self.roster.players.iter().any(|p| p.stake_making) {
                self.engine.skip_question();
                self.plan(Step::MoveNext, Duration::from_secs(2), schedule_alarm);
            } else if self.state.order_index == -1
                || self.state.order[self.state.order_index as usize] == -1
            {
                if matches!(
                    self.state.decision,
                    Decision::AuctionStakeMaking { .. } | Decision::NextPersonStakeMaking
                ) {
                    // The player due to stake is gone: keep the auction going.
                    self.stop_waiting();
                    self.send(&ServerMessage::Cancel, &self.showman_name(), tunnel_finder);
                    self.continue_making_stakes(schedule_alarm);
                }
            } else if self.state.decision == Decision::NextPersonStakeMaking {
                self.stop_waiting();
                self.send(&ServerMessage::Cancel, &self.showman_name(), tunnel_finder);
                self.continue_making_stakes(schedule_alarm);
            }
        }

        if self.state.stage == GameStage::Final && !self.state.final_deleters.is_empty() {
            let old = self.state.final_deleters.clone();
            let mut rebuilt = Vec::with_capacity(old.len());
            let mut cursor = self.state.deleter_cursor;
            for (i, &entry) in old.iter().enumerate() {
                if entry == removed_i {
                    if i < self.state.deleter_cursor {
                        cursor = cursor.saturating_sub(1);
                    }
                    continue;
                }
                rebuilt.push(entry - i32::from(entry > removed_i));
            }
            self.state.final_deleters = rebuilt;
            self.state.deleter_cursor = cursor;

            if self.state.current_deleter == removed_i {
                self.state.current_deleter = -1;
            } else if self.state.current_deleter > removed_i {
                self.state.current_deleter -= 1;
            }

            if self.state.final_deleters.is_empty() {
                // Everyone who could play the final is gone.
                if self.engine.can_move_next_round() {
                    self.engine.move_next_round();
                    self.present_round(schedule_alarm, tunnel_finder);
                } else {
                    self.plan(Step::Winner, Duration::from_secs(1), schedule_alarm);
                }
            }
        }

        let old_history = std::mem::take(&mut self.state.question_history);
        self.state.question_history = old_history
            .into_iter()
            .filter(|entry| entry.player_index != removed)
            .map(|entry| AnswerResult {
                is_right: entry.is_right,
                player_index: entry.player_index - usize::from(entry.player_index > removed),
            })
            .collect();

        if !self.state.is_waiting {
            return;
        }

        if self.state.decision == Decision::StarterChoosing {
            // The chooser set changed: ask again from the top.
            self.send(&ServerMessage::Cancel, &self.showman_name(), tunnel_finder);
            self.stop_waiting();
            self.plan(Step::AskFirst, Duration::from_secs(2), schedule_alarm);
        }
    }

    /// Resumes an auction after its current staker disappeared
    fn continue_making_stakes<S: FnMut(AlarmMessage, Duration)>(&mut self, schedule_alarm: &mut S) {
        let stakers: Vec<usize> = self
            .roster
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stake_making)
            .map(|(i, _)| i)
            .collect();

        if stakers.len() == 1 {
            self.state.staker_index = stakers[0] as i32;
            if self.state.stake == -1 {
                self.state.stake = self.state.cur_price_right;
            }
            self.plan(Step::PrintStakerPlayer, Duration::from_secs(1), schedule_alarm);
        } else {
            self.plan(Step::AskStake, Duration::from_secs(2), schedule_alarm);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::engine::{CostRange, Package, PackageEngine, Question, Round, Theme};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct MockTunnel {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl Tunnel for MockTunnel {
        fn send(&self, text: &str) {
            self.lines.lock().unwrap().push(text.to_owned());
        }

        fn close(self) {}
    }

    type Hub = Arc<Mutex<HashMap<String, MockTunnel>>>;

    fn hub() -> (Hub, impl Fn(&str) -> Option<MockTunnel>) {
        let map: Hub = Arc::default();
        let finder_map = Arc::clone(&map);
        let finder = move |name: &str| {
            let mut map = finder_map.lock().unwrap();
            Some(map.entry(name.to_owned()).or_default().clone())
        };
        (map, finder)
    }

    fn lines_of(hub: &Hub, name: &str) -> Vec<String> {
        hub.lock()
            .unwrap()
            .get(name)
            .map(|tunnel| tunnel.lines.lock().unwrap().clone())
            .unwrap_or_default()
    }

    type Alarms = Rc<RefCell<Vec<(AlarmMessage, Duration)>>>;

    fn alarm_sink() -> (Alarms, impl FnMut(AlarmMessage, Duration)) {
        let alarms: Alarms = Rc::default();
        let sink_alarms = Rc::clone(&alarms);
        let sink = move |alarm: AlarmMessage, delay: Duration| {
            sink_alarms.borrow_mut().push((alarm, delay));
        };
        (alarms, sink)
    }

    #[derive(Default)]
    struct MockGateway {
        deleted: Vec<String>,
        kicked: Vec<(String, bool)>,
    }

    impl ClientGateway for MockGateway {
        fn delete_client(&mut self, name: &str) -> bool {
            self.deleted.push(name.to_owned());
            true
        }

        fn contains(&self, _name: &str) -> bool {
            false
        }

        fn kick(&mut self, name: &str, ban: bool) {
            self.kicked.push((name.to_owned(), ban));
        }
    }

    fn question(price: i32, kind: QuestionKind) -> Question {
        Question {
            price,
            text: format!("Question for {price}"),
            right: vec!["Canonical".to_owned()],
            wrong: vec!["Plausible".to_owned()],
            kind,
            cost_range: if kind == QuestionKind::Secret {
                Some(CostRange {
                    minimum: 100,
                    maximum: 500,
                    step: 100,
                })
            } else {
                None
            },
        }
    }

    fn sample_package() -> Package {
        Package {
            name: "Sample".to_owned(),
            rounds: vec![
                Round {
                    name: "First round".to_owned(),
                    kind: RoundKind::Standard,
                    themes: vec![
                        Theme {
                            name: "History".to_owned(),
                            questions: vec![
                                question(100, QuestionKind::Simple),
                                question(200, QuestionKind::Stake),
                            ],
                        },
                        Theme {
                            name: "Science".to_owned(),
                            questions: vec![question(300, QuestionKind::Secret)],
                        },
                    ],
                },
                Round {
                    name: "Final".to_owned(),
                    kind: RoundKind::Final,
                    themes: vec![
                        Theme {
                            name: "Art".to_owned(),
                            questions: vec![question(0, QuestionKind::Simple)],
                        },
                        Theme {
                            name: "Cinema".to_owned(),
                            questions: vec![question(0, QuestionKind::Simple)],
                        },
                    ],
                },
            ],
        }
    }

    fn make_game() -> Game<PackageEngine> {
        Game::new(
            PackageEngine::new(sample_package()),
            GameSettings::default(),
            3,
            Lexicon::default(),
            BotPool::default(),
        )
        .unwrap()
    }

    fn seated_game<F: Fn(&str) -> Option<MockTunnel>>(finder: &F) -> Game<PackageEngine> {
        let mut game = make_game();
        game.join("Boris", true, Role::Showman, None, finder).unwrap();
        game.join("Alice", false, Role::Player, None, finder).unwrap();
        game.join("Bob", true, Role::Player, None, finder).unwrap();
        game.join("Clara", false, Role::Player, None, finder).unwrap();
        game
    }

    #[test]
    fn first_joiner_becomes_host() {
        let (_hub, finder) = hub();
        let game = seated_game(&finder);
        assert_eq!(game.host_name.as_deref(), Some("Boris"));
    }

    #[test]
    fn join_rejects_duplicate_names() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let result = game.join("Alice", true, Role::Viewer, None, &finder);
        assert_eq!(result, Err(JoinError::NameTaken));
    }

    #[test]
    fn join_and_connect_resolve_seats_identically() {
        let (_hub_a, finder_a) = hub();
        let mut direct = make_game();
        direct
            .join("Dana", false, Role::Player, None, &finder_a)
            .unwrap();

        let (_hub_b, finder_b) = hub();
        let mut wired = make_game();
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();
        wired.receive_message(
            "conn-1",
            "CONNECT\nplayer\nDana\nf\n-1",
            &mut sink,
            &finder_b,
            &mut gateway,
        );

        assert_eq!(
            serde_json::to_string(&direct.roster).unwrap(),
            serde_json::to_string(&wired.roster).unwrap()
        );
    }

    #[test]
    fn connect_race_admits_exactly_one() {
        let (hub, finder) = hub();
        let mut game = make_game();
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.receive_message(
            "conn-1",
            "CONNECT\nplayer\nDana\nf\n-1",
            &mut sink,
            &finder,
            &mut gateway,
        );
        game.receive_message(
            "conn-2",
            "CONNECT\nplayer\nDana\nf\n-1",
            &mut sink,
            &finder,
            &mut gateway,
        );

        assert!(
            lines_of(&hub, "Dana")
                .iter()
                .any(|line| line == "ACCEPTED")
        );
        let refusals = lines_of(&hub, "conn-2");
        assert!(refusals.iter().any(|line| line.starts_with("REFUSE\n")));
    }

    #[test]
    fn inappropriate_name_is_refused() {
        let (_hub, finder) = hub();
        let mut game = make_game();
        let result = game.join("fuck", true, Role::Player, None, &finder);
        assert_eq!(result, Err(JoinError::InappropriateName));
    }

    #[test]
    fn wrong_password_is_refused() {
        let (_hub, finder) = hub();
        let mut game = make_game();
        game.settings.network_game_password = Some("secret".to_owned());
        assert_eq!(
            game.join("Dana", false, Role::Player, None, &finder),
            Err(JoinError::WrongPassword)
        );
        assert!(
            game.join("Dana", false, Role::Player, Some("secret"), &finder)
                .is_ok()
        );
    }

    #[test]
    fn mismatched_message_leaves_state_untouched() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.state.stage = GameStage::Round;
        game.state.decision = Decision::StarterChoosing;
        game.state.is_waiting = true;

        let before = serde_json::to_string(&game.state).unwrap();

        // A question choice is not the pending decision kind.
        game.receive_message("Alice", "CHOICE\n0\n0", &mut sink, &finder, &mut gateway);
        // The right kind from the wrong sender is equally ignored.
        game.receive_message("Alice", "FIRST\n0", &mut sink, &finder, &mut gateway);

        let after = serde_json::to_string(&game.state).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn starter_choice_from_showman_is_accepted() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.state.stage = GameStage::Round;
        game.state.decision = Decision::StarterChoosing;
        game.state.is_waiting = true;
        for player in &mut game.roster.players {
            player.flag = true;
        }

        game.receive_message("Boris", "FIRST\n2", &mut sink, &finder, &mut gateway);

        assert_eq!(game.state.chooser_index, 2);
        assert!(!game.state.is_waiting);
    }

    #[test]
    fn seat_removal_mid_answer_recovers_the_question() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        // Seat 1 is occupied by a computer player so it can be deleted
        // mid-game; Clara sits at seat 2.
        game.roster.players[1] = Player::from_account(Account {
            name: "Robo".to_owned(),
            is_male: true,
            is_human: false,
            is_connected: true,
            picture: String::new(),
        });

        game.state.stage = GameStage::Round;
        game.state.chooser_index = 0;
        game.state.answerer_index = 1;
        game.state.decision = Decision::Answering { final_round: false };
        game.state.is_waiting = true;
        game.state.question_history = vec![
            AnswerResult {
                player_index: 1,
                is_right: false,
            },
            AnswerResult {
                player_index: 2,
                is_right: false,
            },
        ];

        game.receive_message(
            "Boris",
            "CONFIG\nDELETE_TABLE\n1",
            &mut sink,
            &finder,
            &mut gateway,
        );

        assert_eq!(game.roster.players.len(), 2);
        assert_eq!(game.roster.players[1].name(), "Clara");
        assert_eq!(game.state.answerer_index, -1);
        assert_eq!(game.state.chooser_index, 0);
        assert!(!game.state.is_waiting);
        assert_eq!(game.scheduler.planned_step(), Some(Step::ContinueQuestion));
        assert_eq!(gateway.deleted, vec!["Robo".to_owned()]);
        // The removed player's history entry is dropped, the later one shifts.
        assert_eq!(
            game.state.question_history,
            vec![AnswerResult {
                player_index: 1,
                is_right: false,
            }]
        );
    }

    #[test]
    fn appellation_is_one_shot() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.state.stage = GameStage::Round;
        game.state.allow_appellation = true;
        game.state.question_history = vec![AnswerResult {
            player_index: 0,
            is_right: false,
        }];

        game.receive_message("Alice", "APELLATE\n+", &mut sink, &finder, &mut gateway);
        assert_eq!(game.state.appelaer_index, 0);
        assert!(!game.state.allow_appellation);
        assert_eq!(game.scheduler.planned_step(), Some(Step::StartAppellation));
        assert_eq!(game.state.appellation_source, "Alice");

        // A second appellation while one is pending is a no-op.
        game.receive_message("Bob", "APELLATE\n-", &mut sink, &finder, &mut gateway);
        assert_eq!(game.state.appellation_source, "Alice");
        assert_eq!(game.scheduler.planned_step(), Some(Step::StartAppellation));
    }

    #[test]
    fn appellation_for_wrong_mark_requires_own_wrong_entry() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.state.allow_appellation = true;
        game.state.question_history = vec![AnswerResult {
            player_index: 0,
            is_right: true,
        }];

        // Alice's entry is a right mark; she cannot dispute it as wrong.
        game.receive_message("Alice", "APELLATE\n+", &mut sink, &finder, &mut gateway);
        assert_eq!(game.state.appelaer_index, -1);
        assert!(game.state.allow_appellation);

        // Bob disputes the right mark instead; it targets Alice's entry.
        game.receive_message("Bob", "APELLATE\n-", &mut sink, &finder, &mut gateway);
        assert_eq!(game.state.appelaer_index, 0);
        assert!(!game.state.allow_appellation);
    }

    #[test]
    fn ping_penalty_preemption_favors_earlier_resolution() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.settings.use_ping_penalty = true;
        game.state.stage = GameStage::Round;
        game.state.is_question_playing = true;
        game.state.decision = Decision::Pressing;
        game.state.is_waiting = true;
        for player in &mut game.roster.players {
            player.can_press = true;
        }
        game.roster.players[0].ping_penalty = 2;

        game.receive_message("Alice", "I", &mut sink, &finder, &mut gateway);
        assert!(game.state.is_deferring_answer);
        assert_eq!(game.state.answerer_index, 0);
        let deferred = *alarms.borrow().last().unwrap();
        assert_eq!(deferred.1, Duration::from_millis(200));

        // Bob carries no penalty and resolves immediately, superseding Alice.
        game.receive_message("Bob", "I", &mut sink, &finder, &mut gateway);
        assert_eq!(game.state.answerer_index, 1);
        let immediate = *alarms.borrow().last().unwrap();
        assert_eq!(immediate.1, Duration::ZERO);

        // Alice's deferred resolution is stale now.
        assert_eq!(game.scheduler.claim(&deferred.0), None);
        assert_eq!(game.scheduler.claim(&immediate.0), Some(Step::AskAnswer));
    }

    #[test]
    fn equal_resolution_times_favor_the_earlier_buzz() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.settings.use_ping_penalty = true;
        game.state.stage = GameStage::Round;
        game.state.decision = Decision::Pressing;
        game.state.is_waiting = true;
        for player in &mut game.roster.players {
            player.can_press = true;
        }
        game.roster.players[0].ping_penalty = 1;
        game.roster.players[1].ping_penalty = 1;

        game.receive_message("Alice", "I", &mut sink, &finder, &mut gateway);
        assert_eq!(game.state.answerer_index, 0);

        // Bob's projected resolution is not strictly earlier, so Alice wins.
        game.receive_message("Bob", "I", &mut sink, &finder, &mut gateway);
        assert_eq!(game.state.answerer_index, 0);
    }

    #[test]
    fn final_round_collects_all_answers_before_unblocking() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.state.stage = GameStage::Final;
        game.state.decision = Decision::Answering { final_round: true };
        game.state.is_waiting = true;
        game.state.final_answers_expected = 3;
        for player in &mut game.roster.players {
            player.in_game = true;
        }

        game.receive_message("Alice", "ANSWER\nPushkin", &mut sink, &finder, &mut gateway);
        assert!(game.state.is_waiting);
        game.receive_message("Bob", "ANSWER\nGogol", &mut sink, &finder, &mut gateway);
        assert!(game.state.is_waiting);
        game.receive_message("Clara", "ANSWER\nChekhov", &mut sink, &finder, &mut gateway);
        assert!(!game.state.is_waiting);
        assert_eq!(game.state.final_answers_received, 3);
    }

    #[test]
    fn wrong_answer_pool_never_runs_dry() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);

        game.engine.move_next();
        game.engine.select_question(0, 0);

        let pool_size = 1 + game.lexicon.generic_wrong_answers().len() + 1;
        for _ in 0..(pool_size + 3) {
            let (text, is_wrong) = game.synthesize_bot_answer("#", false);
            assert!(is_wrong);
            assert!(!text.is_empty());
        }
    }

    #[test]
    fn bot_right_answer_substitutes_the_canon() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);

        game.engine.move_next();
        game.engine.select_question(0, 0);

        let (text, is_wrong) = game.synthesize_bot_answer("it is #!", true);
        assert!(!is_wrong);
        assert_eq!(text, "It is Canonical!");
    }

    #[test]
    fn resume_rechecks_a_satisfied_decision() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();

        game.state.stage = GameStage::After;
        game.state.decision = Decision::Reporting;
        game.state.is_waiting = true;
        game.state.reports_count = 0;

        game.on_pause_core(true, &mut sink, &finder);
        assert!(game.state.pause);
        game.on_pause_core(false, &mut sink, &finder);

        assert!(!game.state.pause);
        assert!(!game.state.is_waiting);
    }

    #[test]
    fn pause_messages_carry_timer_snapshots() {
        let (hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();

        game.on_pause_core(true, &mut sink, &finder);
        let lines = lines_of(&hub, "Boris");
        let pause_line = lines
            .iter()
            .find(|line| line.starts_with("PAUSE\n+"))
            .expect("pause broadcast missing");
        assert_eq!(pause_line.split('\n').count(), 5);
    }

    #[test]
    fn kick_refuses_self_and_bots() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.roster.players[1] = Player::from_account(Account {
            name: "Robo".to_owned(),
            is_male: true,
            is_human: false,
            is_connected: true,
            picture: String::new(),
        });

        game.receive_message("Boris", "KICK\nBoris", &mut sink, &finder, &mut gateway);
        game.receive_message("Boris", "KICK\nRobo", &mut sink, &finder, &mut gateway);
        assert!(gateway.kicked.is_empty());

        game.receive_message("Boris", "KICK\nAlice", &mut sink, &finder, &mut gateway);
        assert_eq!(gateway.kicked, vec![("Alice".to_owned(), false)]);
    }

    #[test]
    fn ban_blacklists_the_target() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.receive_message("Boris", "BAN\nAlice", &mut sink, &finder, &mut gateway);
        assert_eq!(gateway.kicked, vec![("Alice".to_owned(), true)]);

        game.receive_message(
            "Boris",
            "DISCONNECT\nAlice\n-",
            &mut sink,
            &finder,
            &mut gateway,
        );
        assert_eq!(
            game.join("Alice", false, Role::Player, None, &finder),
            Err(JoinError::Banned)
        );
    }

    #[test]
    fn host_disconnect_reassigns_host() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        assert_eq!(game.host_name.as_deref(), Some("Boris"));
        game.receive_message(
            "Boris",
            "DISCONNECT\nBoris\n-",
            &mut sink,
            &finder,
            &mut gateway,
        );

        // The showman seat is free now, so a human player inherits the host.
        let new_host = game.host_name.clone().expect("host must be reassigned");
        assert!(["Alice", "Bob", "Clara"].contains(&new_host.as_str()));
    }

    #[test]
    fn disconnect_frees_the_seat_for_reconnection() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.receive_message(
            "Boris",
            "DISCONNECT\nBob\n-",
            &mut sink,
            &finder,
            &mut gateway,
        );
        assert!(game.roster.players[1].account().is_free());
        assert!(!game.roster.players[1].account().is_connected);

        // The freed seat is the first one scanned for a new player.
        let index = game.join("Dmitry", true, Role::Player, None, &finder).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn change_updates_score_with_one_based_index() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.receive_message("Boris", "CHANGE\n2\n4200", &mut sink, &finder, &mut gateway);
        assert_eq!(game.roster.players[1].sum, 4200);

        // Out-of-range numbers are ignored.
        game.receive_message("Boris", "CHANGE\n9\n1", &mut sink, &finder, &mut gateway);
        assert_eq!(
            game.roster.players.iter().map(|p| p.sum).collect_vec(),
            vec![0, 4200, 0]
        );
    }

    #[test]
    fn mark_requires_permission_and_records_coordinates() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.receive_message("Alice", "MARK", &mut sink, &finder, &mut gateway);
        assert!(game.state.marked_questions.is_empty());

        game.engine.move_next();
        game.engine.select_question(1, 0);
        game.state.can_mark_question = true;
        game.receive_message("Alice", "MARK", &mut sink, &finder, &mut gateway);
        assert_eq!(game.state.marked_questions, vec![(0, 1, 0)]);
    }

    #[test]
    fn unknown_commands_are_ignored_silently() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        let before = serde_json::to_string(&game.state).unwrap();
        game.receive_message("Alice", "FROBNICATE\n1\n2", &mut sink, &finder, &mut gateway);
        game.receive_message("Alice", "", &mut sink, &finder, &mut gateway);
        let after = serde_json::to_string(&game.state).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn session_snapshot_round_trips() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        game.state.stage = GameStage::Round;
        game.state.chooser_index = 1;

        let snapshot = serde_json::to_string(&game).unwrap();
        let restored: Game<PackageEngine> = serde_json::from_str(&snapshot).unwrap();

        assert_eq!(restored.state.chooser_index, 1);
        assert_eq!(restored.roster.players[0].name(), "Alice");
        assert_eq!(restored.host_name.as_deref(), Some("Boris"));
    }

    #[test]
    fn auction_order_rebuild_after_staker_removal() {
        let (_hub, finder) = hub();
        let mut game = seated_game(&finder);
        let (_alarms, mut sink) = alarm_sink();
        let mut gateway = MockGateway::default();

        game.roster.players[1] = Player::from_account(Account {
            name: "Robo".to_owned(),
            is_male: true,
            is_human: false,
            is_connected: true,
            picture: String::new(),
        });

        // An auction is underway: rotation 0,1,2 with seat 1 due to stake.
        game.state.stage = GameStage::Round;
        game.engine.move_next();
        game.engine.select_question(0, 1);
        game.state.chooser_index = 0;
        game.state.order = vec![0, 1, 2];
        game.state.order_index = 1;
        game.state.staker_index = 1;
        game.state.stake = -1;
        game.state.cur_price_right = 200;
        game.state.decision = Decision::AuctionStakeMaking {
            variants: [true, true, false, true],
        };
        game.state.is_waiting = true;
        for player in &mut game.roster.players {
            player.stake_making = true;
        }

        game.receive_message(
            "Boris",
            "CONFIG\nDELETE_TABLE\n1",
            &mut sink,
            &finder,
            &mut gateway,
        );

        // Seat 2 shifted down to 1; every order entry points at a live seat.
        assert_eq!(game.roster.players.len(), 2);
        for &entry in &game.state.order {
            assert!(entry == -1 || (entry as usize) < game.roster.players.len());
        }
        assert!(game.state.staker_index < game.roster.players.len() as i32);
    }
}
