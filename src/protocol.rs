//! Wire protocol codec
//!
//! Messages on the wire are plain text: tokens joined by a single reserved
//! separator character, with the first token selecting the command. This
//! module converts between that representation and typed values in exactly
//! one place: inbound frames are parsed into [`ClientCommand`] before any
//! game logic sees them (malformed frames are rejected here, not in the
//! handlers), and outbound [`ServerMessage`] values are encoded back into
//! the exact token sequences existing clients expect.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{account::Role, constants::wire::ARG_SEPARATOR};

/// Inbound command tokens
pub mod tokens {
    /// Game snapshot request from a connecting client
    pub const GAME_INFO: &str = "GAMEINFO";
    /// Join request
    pub const CONNECT: &str = "CONNECT";
    /// Departure notification
    pub const DISCONNECT: &str = "DISCONNECT";
    /// Full state request
    pub const INFO: &str = "INFO";
    /// Roster topology change (host only)
    pub const CONFIG: &str = "CONFIG";
    /// Showman picks the starting player
    pub const FIRST: &str = "FIRST";
    /// Pause toggle
    pub const PAUSE: &str = "PAUSE";
    /// Host starts the game
    pub const START: &str = "START";
    /// Readiness toggle
    pub const READY: &str = "READY";
    /// Avatar assignment
    pub const PICTURE: &str = "PICTURE";
    /// Question selection
    pub const CHOICE: &str = "CHOICE";
    /// Button press
    pub const I: &str = "I";
    /// Button waiver
    pub const PASS: &str = "PASS";
    /// Answer submission
    pub const ANSWER: &str = "ANSWER";
    /// Media element viewed acknowledgment
    pub const ATOM: &str = "ATOM";
    /// Game report submission
    pub const REPORT: &str = "REPORT";
    /// Answer validation verdict
    pub const IS_RIGHT: &str = "ISRIGHT";
    /// Showman picks the next staker
    pub const NEXT: &str = "NEXT";
    /// Secret question handover
    pub const CAT: &str = "CAT";
    /// Secret question cost selection
    pub const CAT_COST: &str = "CATCOST";
    /// Auction stake
    pub const STAKE: &str = "STAKE";
    /// Showman picks the next theme deleter
    pub const NEXT_DELETE: &str = "NEXTDELETE";
    /// Final theme deletion
    pub const DELETE: &str = "DELETE";
    /// Final round stake
    pub const FINAL_STAKE: &str = "FINALSTAKE";
    /// Appellation start
    pub const APELLATE: &str = "APELLATE";
    /// Manual score correction
    pub const CHANGE: &str = "CHANGE";
    /// Turn step command
    pub const MOVE: &str = "MOVE";
    /// Kick a participant
    pub const KICK: &str = "KICK";
    /// Ban a participant
    pub const BAN: &str = "BAN";
    /// Mark the current question
    pub const MARK: &str = "MARK";

    /// `CONFIG` parameter: add a player seat
    pub const CONFIG_ADD_TABLE: &str = "ADD_TABLE";
    /// `CONFIG` parameter: delete a player seat
    pub const CONFIG_DELETE_TABLE: &str = "DELETE_TABLE";
    /// `CONFIG` parameter: free a seat back to the free place
    pub const CONFIG_FREE: &str = "FREE";
    /// `CONFIG` parameter: put a named person on a seat
    pub const CONFIG_SET: &str = "SET";
    /// `CONFIG` parameter: toggle a seat between human and computer
    pub const CONFIG_CHANGE_TYPE: &str = "CHANGE_TYPE";

    /// Bot answer marker: templated right answer follows
    pub const ANSWER_RIGHT: &str = "RIGHT";
    /// Bot answer marker: templated wrong answer follows
    pub const ANSWER_WRONG: &str = "WRONG";
}

/// Outbound message tokens
pub mod out_tokens {
    /// Join accepted
    pub const ACCEPTED: &str = "ACCEPTED";
    /// Join or action refused, reason follows
    pub const REFUSE: &str = "REFUSE";
    /// Participant joined
    pub const CONNECTED: &str = "CONNECTED";
    /// Participant left
    pub const DISCONNECTED: &str = "DISCONNECTED";
    /// Roster topology changed
    pub const CONFIG: &str = "CONFIG";
    /// Readiness changed
    pub const READY: &str = "READY";
    /// Pending oral substitution cancelled
    pub const CANCEL: &str = "CANCEL";
    /// Player waived the button
    pub const PASS: &str = "PASS";
    /// Premature button press
    pub const WRONG_TRY: &str = "WRONGTRY";
    /// A final-round answer arrived
    pub const PERSON_FINAL_ANSWER: &str = "PERSONFINALANSWER";
    /// An appellation vote arrived
    pub const PERSON_APELLATED: &str = "PERSONAPELLATED";
    /// A final-round stake arrived
    pub const PERSON_FINAL_STAKE: &str = "PERSONFINALSTAKE";
    /// An auction stake was made
    pub const PERSON_STAKE: &str = "PERSONSTAKE";
    /// Timer control
    pub const TIMER: &str = "TIMER";
    /// Host assignment
    pub const HOSTNAME: &str = "HOSTNAME";
    /// Chat-log replic
    pub const REPLIC: &str = "REPLIC";
    /// Printed text line
    pub const PRINT: &str = "PRINT";
    /// Pause state with timer snapshots
    pub const PAUSE: &str = "PAUSE";
    /// Stage change
    pub const STAGE: &str = "STAGE";
    /// Score table
    pub const SUMS: &str = "SUMS";
    /// Theme names of the current round
    pub const ROUND_THEMES: &str = "ROUNDTHEMES";
    /// Remaining question prices per theme
    pub const TABLO: &str = "TABLO";
    /// Chosen question coordinates (or, with no args, a choice prompt)
    pub const CHOICE: &str = "CHOICE";
    /// Question price and text
    pub const QUESTION: &str = "QUESTION";
    /// Question type announcement
    pub const QTYPE: &str = "QTYPE";
    /// Right answer reveal
    pub const RIGHT_ANSWER: &str = "RIGHTANSWER";
    /// Button window opened
    pub const TRY: &str = "TRY";
    /// Button window closed
    pub const END_TRY: &str = "ENDTRY";
    /// Starter choice prompt with eligibility flags
    pub const FIRST: &str = "FIRST";
    /// Next-staker prompt with eligibility flags
    pub const NEXT: &str = "NEXT";
    /// Next-deleter prompt with eligibility flags
    pub const NEXT_DELETE: &str = "NEXTDELETE";
    /// Secret question handover prompt with eligibility flags
    pub const CAT: &str = "CAT";
    /// Secret question cost prompt (or cost range)
    pub const CAT_COST: &str = "CATCOST";
    /// Stake prompt with allowed variants
    pub const STAKE: &str = "STAKE";
    /// Final stake prompt
    pub const FINAL_STAKE: &str = "FINALSTAKE";
    /// Theme deletion prompt
    pub const DELETE: &str = "DELETE";
    /// Theme deleted
    pub const OUT: &str = "OUT";
    /// Answer prompt to the current answerer
    pub const ANSWER: &str = "ANSWER";
    /// Validation prompt to the showman
    pub const IS_RIGHT: &str = "ISRIGHT";
    /// Answer outcome applied to a player's score
    pub const PERSON: &str = "PERSON";
    /// Game winner
    pub const WINNER: &str = "WINNER";
    /// Lobby snapshot for connecting clients
    pub const GAME_INFO: &str = "GAMEINFO";
    /// Full roster snapshot
    pub const INFO2: &str = "INFO2";
    /// Reading speed setting
    pub const READING_SPEED: &str = "READINGSPEED";
    /// False start setting
    pub const FALSE_START: &str = "FALSESTART";
    /// Button blocking window setting
    pub const BUTTON_BLOCKING_TIME: &str = "BUTTONBLOCKINGTIME";
    /// Names of the available computer players
    pub const COMPUTER_ACCOUNTS: &str = "COMPUTERACCOUNTS";
    /// Report prompt at game end
    pub const REPORT: &str = "REPORT";
    /// Avatar location of a participant
    pub const PICTURE: &str = "PICTURE";
}

/// Replic code for system notices
pub const REPLIC_SYSTEM: &str = "t";
/// Replic code for special (out-of-band) notices
pub const REPLIC_SPECIAL: &str = "l";
/// Replic code for showman speech
pub const REPLIC_SHOWMAN: &str = "s";

/// Why an inbound frame was rejected at the boundary
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame was empty
    #[error("empty frame")]
    Empty,
    /// The command token is not part of the protocol
    #[error("unknown command {0:?}")]
    Unknown(String),
    /// The command is known but its arguments do not parse
    #[error("malformed arguments for {0}")]
    Malformed(&'static str),
}

/// Auction stake variants, by wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeKind {
    /// Play for the nominal question price
    Nominal,
    /// Raise to an explicit sum
    Sum,
    /// Pass
    Pass,
    /// Bet everything
    AllIn,
}

impl StakeKind {
    /// Decodes a stake kind from its wire code
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Nominal),
            1 => Some(Self::Sum),
            2 => Some(Self::Pass),
            3 => Some(Self::AllIn),
            _ => None,
        }
    }

    /// The wire code of this stake kind
    pub fn code(self) -> u8 {
        match self {
            Self::Nominal => 0,
            Self::Sum => 1,
            Self::Pass => 2,
            Self::AllIn => 3,
        }
    }
}

/// A roster topology change requested through `CONFIG`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Append a vacant player seat
    AddTable,
    /// Remove the player seat at the index
    DeleteTable {
        /// Seat to remove
        index: usize,
    },
    /// Reset a seat to the free place, demoting its occupant to viewer
    Free {
        /// Whether the seat is a player seat (showman otherwise)
        is_player: bool,
        /// Player seat index; ignored for the showman
        index: usize,
    },
    /// Put a named person (or bot) on a seat
    Set {
        /// Whether the seat is a player seat (showman otherwise)
        is_player: bool,
        /// Player seat index; ignored for the showman
        index: usize,
        /// Name of the replacement
        replacer: String,
    },
    /// Toggle a seat between human and computer occupancy
    ChangeType {
        /// Whether the seat is a player seat (showman otherwise)
        is_player: bool,
        /// Player seat index; ignored for the showman
        index: usize,
    },
}

/// A fully parsed inbound command
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Lobby snapshot request
    GameInfo,
    /// Join request
    Connect {
        /// Requested role
        role: Role,
        /// Requested name
        name: String,
        /// Declared sex, used for grammatical agreement only
        is_male: bool,
        /// Password when the game is protected
        password: Option<String>,
    },
    /// Departure notification from the connection layer
    Disconnect {
        /// Departing participant
        name: String,
        /// Whether the departure was caused by a transport error
        with_error: bool,
    },
    /// Full state request
    Info,
    /// Roster topology change
    Config(ConfigCommand),
    /// Showman's starter choice
    First {
        /// Chosen player index
        player_index: usize,
    },
    /// Pause toggle
    Pause {
        /// `true` to pause, `false` to resume
        enabled: bool,
    },
    /// Host-initiated game start
    Start,
    /// Readiness toggle
    Ready {
        /// New readiness value
        ready: bool,
    },
    /// Avatar assignment
    Picture {
        /// Path or URI of the avatar
        path: String,
        /// Optional inline base64 payload
        data: Option<String>,
    },
    /// Question selection by the chooser
    Choice {
        /// Theme index on the table
        theme_index: usize,
        /// Question index within the theme
        question_index: usize,
    },
    /// Button press
    Press,
    /// Button waiver
    Pass,
    /// Answer submission
    Answer {
        /// Literal answer text, or a bot template when a marker is present
        text: String,
        /// `Some(true)` for a templated right bot answer, `Some(false)` for wrong
        bot_marker: Option<bool>,
    },
    /// Media element viewed
    Atom,
    /// Game report
    Report {
        /// Optional free-form comment
        comment: Option<String>,
    },
    /// Validation verdict or appellation vote
    IsRight {
        /// `true` if the answer is ruled right
        right: bool,
    },
    /// Showman's next-staker choice
    Next {
        /// Chosen player index
        player_index: usize,
    },
    /// Secret question handover
    Cat {
        /// Receiving player index
        player_index: usize,
    },
    /// Secret question cost selection
    CatCost {
        /// Chosen cost
        sum: i32,
    },
    /// Auction stake
    Stake {
        /// Stake variant
        kind: StakeKind,
        /// Explicit sum for [`StakeKind::Sum`]
        sum: Option<i32>,
    },
    /// Showman's next-deleter choice
    NextDelete {
        /// Chosen player index
        player_index: usize,
    },
    /// Final theme deletion
    Delete {
        /// Theme index to delete
        theme_index: usize,
    },
    /// Final round stake
    FinalStake {
        /// Stake sum
        sum: i32,
    },
    /// Appellation start
    Apellate {
        /// `true` disputes the sender's own wrong mark, `false` the last right mark
        for_right_answer: bool,
    },
    /// Manual score correction by the showman
    Change {
        /// 1-based player number on the wire
        player_number: usize,
        /// New score
        sum: i32,
    },
    /// Turn step command
    Move {
        /// One of -2, -1, 1, 2
        direction: i32,
    },
    /// Kick request
    Kick {
        /// Target name
        name: String,
    },
    /// Ban request
    Ban {
        /// Target name
        name: String,
    },
    /// Mark the current question for the report
    Mark,
}

/// Encodes a boolean as its wire flag
fn flag(value: bool) -> &'static str {
    if value { "+" } else { "-" }
}

/// Decodes a wire flag; anything but `+` reads as `false`
fn parse_flag(token: &str) -> bool {
    token == "+"
}

fn parse_usize(token: Option<&&str>) -> Option<usize> {
    token.and_then(|t| t.parse().ok())
}

fn parse_i32(token: Option<&&str>) -> Option<i32> {
    token.and_then(|t| t.parse().ok())
}

impl ClientCommand {
    /// Parses one inbound frame
    ///
    /// This is the single place malformed input is rejected; handlers only
    /// ever see well-formed commands. Trailing extra tokens are tolerated
    /// for forward compatibility.
    ///
    /// # Errors
    ///
    /// [`FrameError::Empty`] for an empty frame, [`FrameError::Unknown`] for
    /// an unrecognized command token, and [`FrameError::Malformed`] when the
    /// command is known but its arguments do not parse.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        if text.is_empty() {
            return Err(FrameError::Empty);
        }

        let args: Vec<&str> = text.split(ARG_SEPARATOR).collect();

        match args[0] {
            tokens::GAME_INFO => Ok(Self::GameInfo),
            tokens::CONNECT => {
                let malformed = || FrameError::Malformed(tokens::CONNECT);
                if args.len() < 4 {
                    return Err(malformed());
                }
                let role = Role::from_str(args[1]).map_err(|()| malformed())?;
                Ok(Self::Connect {
                    role,
                    name: args[2].to_owned(),
                    is_male: args[3] == "m",
                    password: args.get(5).map(|p| (*p).to_owned()),
                })
            }
            tokens::DISCONNECT => {
                if args.len() < 3 {
                    return Err(FrameError::Malformed(tokens::DISCONNECT));
                }
                Ok(Self::Disconnect {
                    name: args[1].to_owned(),
                    with_error: parse_flag(args[2]),
                })
            }
            tokens::INFO => Ok(Self::Info),
            tokens::CONFIG => Self::parse_config(&args),
            tokens::FIRST => parse_usize(args.get(1))
                .map(|player_index| Self::First { player_index })
                .ok_or(FrameError::Malformed(tokens::FIRST)),
            tokens::PAUSE => args
                .get(1)
                .map(|a| Self::Pause {
                    enabled: parse_flag(a),
                })
                .ok_or(FrameError::Malformed(tokens::PAUSE)),
            tokens::START => Ok(Self::Start),
            tokens::READY => Ok(Self::Ready {
                ready: args.get(1).is_none_or(|a| parse_flag(a)),
            }),
            tokens::PICTURE => args
                .get(1)
                .map(|path| Self::Picture {
                    path: (*path).to_owned(),
                    data: args.get(2).map(|d| (*d).to_owned()),
                })
                .ok_or(FrameError::Malformed(tokens::PICTURE)),
            tokens::CHOICE => match (parse_usize(args.get(1)), parse_usize(args.get(2))) {
                (Some(theme_index), Some(question_index)) => Ok(Self::Choice {
                    theme_index,
                    question_index,
                }),
                _ => Err(FrameError::Malformed(tokens::CHOICE)),
            },
            tokens::I => Ok(Self::Press),
            tokens::PASS => Ok(Self::Pass),
            tokens::ANSWER => {
                let first: &str = args
                    .get(1)
                    .copied()
                    .ok_or(FrameError::Malformed(tokens::ANSWER))?;
                let bot_marker = match first {
                    tokens::ANSWER_RIGHT => Some(true),
                    tokens::ANSWER_WRONG => Some(false),
                    _ => None,
                };
                if bot_marker.is_some() {
                    let template: &str = args
                        .get(2)
                        .copied()
                        .ok_or(FrameError::Malformed(tokens::ANSWER))?;
                    Ok(Self::Answer {
                        text: template.to_owned(),
                        bot_marker,
                    })
                } else {
                    Ok(Self::Answer {
                        text: first.to_owned(),
                        bot_marker: None,
                    })
                }
            }
            tokens::ATOM => Ok(Self::Atom),
            tokens::REPORT => Ok(Self::Report {
                comment: args.get(2).map(|c| (*c).to_owned()),
            }),
            tokens::IS_RIGHT => args
                .get(1)
                .map(|a| Self::IsRight {
                    right: parse_flag(a),
                })
                .ok_or(FrameError::Malformed(tokens::IS_RIGHT)),
            tokens::NEXT => parse_usize(args.get(1))
                .map(|player_index| Self::Next { player_index })
                .ok_or(FrameError::Malformed(tokens::NEXT)),
            tokens::CAT => parse_usize(args.get(1))
                .map(|player_index| Self::Cat { player_index })
                .ok_or(FrameError::Malformed(tokens::CAT)),
            tokens::CAT_COST => parse_i32(args.get(1))
                .map(|sum| Self::CatCost { sum })
                .ok_or(FrameError::Malformed(tokens::CAT_COST)),
            tokens::STAKE => {
                let code = args
                    .get(1)
                    .and_then(|t| t.parse::<u8>().ok())
                    .and_then(StakeKind::from_code)
                    .ok_or(FrameError::Malformed(tokens::STAKE))?;
                let sum = parse_i32(args.get(2));
                if code == StakeKind::Sum && sum.is_none() {
                    return Err(FrameError::Malformed(tokens::STAKE));
                }
                Ok(Self::Stake { kind: code, sum })
            }
            tokens::NEXT_DELETE => parse_usize(args.get(1))
                .map(|player_index| Self::NextDelete { player_index })
                .ok_or(FrameError::Malformed(tokens::NEXT_DELETE)),
            tokens::DELETE => parse_usize(args.get(1))
                .map(|theme_index| Self::Delete { theme_index })
                .ok_or(FrameError::Malformed(tokens::DELETE)),
            tokens::FINAL_STAKE => parse_i32(args.get(1))
                .map(|sum| Self::FinalStake { sum })
                .ok_or(FrameError::Malformed(tokens::FINAL_STAKE)),
            tokens::APELLATE => Ok(Self::Apellate {
                for_right_answer: args.get(1).is_none_or(|a| parse_flag(a)),
            }),
            tokens::CHANGE => match (parse_usize(args.get(1)), parse_i32(args.get(2))) {
                (Some(player_number), Some(sum)) => Ok(Self::Change { player_number, sum }),
                _ => Err(FrameError::Malformed(tokens::CHANGE)),
            },
            tokens::MOVE => parse_i32(args.get(1))
                .map(|direction| Self::Move { direction })
                .ok_or(FrameError::Malformed(tokens::MOVE)),
            tokens::KICK => args
                .get(1)
                .map(|name| Self::Kick {
                    name: (*name).to_owned(),
                })
                .ok_or(FrameError::Malformed(tokens::KICK)),
            tokens::BAN => args
                .get(1)
                .map(|name| Self::Ban {
                    name: (*name).to_owned(),
                })
                .ok_or(FrameError::Malformed(tokens::BAN)),
            tokens::MARK => Ok(Self::Mark),
            other => Err(FrameError::Unknown(other.to_owned())),
        }
    }

    fn parse_config(args: &[&str]) -> Result<Self, FrameError> {
        let malformed = || Err(FrameError::Malformed(tokens::CONFIG));
        let Some(param) = args.get(1) else {
            return malformed();
        };
        let is_player = |token: Option<&&str>| token.is_some_and(|t| *t == "player");
        match *param {
            tokens::CONFIG_ADD_TABLE => Ok(Self::Config(ConfigCommand::AddTable)),
            tokens::CONFIG_DELETE_TABLE => match parse_usize(args.get(2)) {
                Some(index) => Ok(Self::Config(ConfigCommand::DeleteTable { index })),
                None => malformed(),
            },
            tokens::CONFIG_FREE => {
                let player = is_player(args.get(2));
                let index = if player {
                    match parse_usize(args.get(3)) {
                        Some(i) => i,
                        None => return malformed(),
                    }
                } else {
                    0
                };
                Ok(Self::Config(ConfigCommand::Free {
                    is_player: player,
                    index,
                }))
            }
            tokens::CONFIG_SET => {
                let player = is_player(args.get(2));
                let index = if player {
                    match parse_usize(args.get(3)) {
                        Some(i) => i,
                        None => return malformed(),
                    }
                } else {
                    0
                };
                match args.get(4) {
                    Some(replacer) => Ok(Self::Config(ConfigCommand::Set {
                        is_player: player,
                        index,
                        replacer: (*replacer).to_owned(),
                    })),
                    None => malformed(),
                }
            }
            tokens::CONFIG_CHANGE_TYPE => {
                let player = is_player(args.get(2));
                let index = if player {
                    match parse_usize(args.get(3)) {
                        Some(i) => i,
                        None => return malformed(),
                    }
                } else {
                    0
                };
                Ok(Self::Config(ConfigCommand::ChangeType {
                    is_player: player,
                    index,
                }))
            }
            _ => malformed(),
        }
    }
}

/// Roster entry as transmitted in `INFO2` and `CONFIG` payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Participant name or the free-place sentinel
    pub name: String,
    /// Sex flag
    pub is_male: bool,
    /// Connection flag
    pub is_connected: bool,
    /// Human flag
    pub is_human: bool,
    /// Readiness flag (always `false` for viewers)
    pub ready: bool,
}

impl AccountSummary {
    /// The five wire tokens of a roster entry, in transmission order
    fn wire_tokens(&self) -> [String; 5] {
        [
            self.name.clone(),
            flag(self.is_male).to_owned(),
            flag(self.is_connected).to_owned(),
            flag(self.is_human).to_owned(),
            flag(self.ready).to_owned(),
        ]
    }
}

/// An outbound message, encoded to tokens with [`ServerMessage::encode`]
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Join accepted (sent to the joining client only)
    Accepted,
    /// Refusal with a localized reason
    Refuse {
        /// Human-readable reason
        reason: String,
    },
    /// Participant joined a seat
    Connected {
        /// Assigned role
        role: Role,
        /// Assigned seat index
        index: usize,
        /// Participant name
        name: String,
        /// Sex flag
        is_male: bool,
    },
    /// Participant left
    Disconnected {
        /// Departing participant name
        name: String,
    },
    /// A player seat was appended
    ConfigAddTable {
        /// The new (vacant) seat
        account: AccountSummary,
    },
    /// A player seat was removed
    ConfigDeleteTable {
        /// Removed seat index
        index: usize,
    },
    /// A seat was freed
    ConfigFree {
        /// Whether a player seat was freed
        is_player: bool,
        /// Freed seat index
        index: usize,
    },
    /// A seat changed hands
    ConfigSet {
        /// Whether a player seat changed
        is_player: bool,
        /// Seat index
        index: usize,
        /// New occupant name
        replacer: String,
        /// New occupant sex flag
        is_male: bool,
    },
    /// A seat toggled between human and computer
    ConfigChangeType {
        /// Whether a player seat toggled
        is_player: bool,
        /// Seat index
        index: usize,
        /// Whether the seat is now human
        is_human: bool,
        /// New occupant name
        name: String,
        /// New occupant sex flag
        is_male: bool,
    },
    /// Readiness changed
    Ready {
        /// Participant name
        name: String,
        /// New readiness
        ready: bool,
    },
    /// Cancels a pending oral substitution prompt
    Cancel,
    /// A player waived the button
    PlayerPassed {
        /// Player index
        index: usize,
    },
    /// A player pressed prematurely
    WrongTry {
        /// Player index
        index: usize,
    },
    /// A final answer arrived from a player
    PersonFinalAnswer {
        /// Player index
        index: usize,
    },
    /// An appellation vote arrived
    PersonApellated {
        /// Player index
        index: usize,
    },
    /// A final stake arrived
    PersonFinalStake {
        /// Player index
        index: usize,
    },
    /// An auction stake was made
    PersonStake {
        /// Player index
        index: usize,
        /// Stake variant code
        kind: StakeKind,
        /// Explicit sum for raised stakes
        sum: Option<i32>,
    },
    /// Timer control for client display
    Timer {
        /// Timer slot (0..3)
        slot: usize,
        /// Subcommand and its arguments
        args: Vec<String>,
    },
    /// Host assignment
    Hostname {
        /// New host name, empty when no host remains
        name: String,
        /// Whether the engine picked the host itself
        by_game: bool,
    },
    /// Chat-log replic
    Replic {
        /// Replic code
        code: String,
        /// Replic text
        text: String,
    },
    /// Printed text line
    Print {
        /// Text to print
        text: String,
    },
    /// Pause toggled, with per-timer elapsed snapshots in deciseconds
    Pause {
        /// New pause state
        enabled: bool,
        /// Elapsed-at-pause per timer slot
        times: [i64; 3],
    },
    /// Stage changed
    Stage {
        /// Stage name
        name: String,
    },
    /// Score table
    Sums {
        /// Player scores in seat order
        values: Vec<i32>,
    },
    /// Theme names of the current round
    RoundThemes {
        /// Theme names
        names: Vec<String>,
    },
    /// Remaining question prices, one token per theme
    Tablo {
        /// Prices per theme; `None` marks a played question
        themes: Vec<Vec<Option<i32>>>,
    },
    /// Chosen question coordinates
    Choice {
        /// Theme index
        theme_index: usize,
        /// Question index
        question_index: usize,
    },
    /// Question choice prompt to the chooser
    ChoicePrompt,
    /// Question price and text
    Question {
        /// Question price
        price: i32,
        /// Question text
        text: String,
    },
    /// Question type announcement
    QType {
        /// Type name: `simple`, `cat` or `auction`
        kind: String,
    },
    /// Right answer reveal
    RightAnswer {
        /// Canonical right answer
        text: String,
    },
    /// Button window opened
    Try,
    /// Button window closed
    EndTry {
        /// Player index as text, or `A` for all
        arg: String,
    },
    /// Starter choice prompt to the showman
    FirstPrompt {
        /// Per-seat eligibility flags
        flags: Vec<bool>,
    },
    /// Next-staker prompt to the showman
    NextPrompt {
        /// Per-seat eligibility flags
        flags: Vec<bool>,
    },
    /// Next-deleter prompt to the showman
    NextDeletePrompt {
        /// Per-seat eligibility flags
        flags: Vec<bool>,
    },
    /// Secret question handover prompt
    CatPrompt {
        /// Per-seat eligibility flags
        flags: Vec<bool>,
    },
    /// Secret question cost prompt
    CatCostPrompt {
        /// Minimum cost
        minimum: i32,
        /// Maximum cost
        maximum: i32,
        /// Cost step
        step: i32,
    },
    /// Stake prompt
    StakePrompt {
        /// Allowed variants by stake code
        variants: [bool; 4],
        /// Minimum raise
        minimum: i32,
    },
    /// Final stake prompt
    FinalStakePrompt,
    /// Theme deletion prompt
    DeletePrompt,
    /// A final theme was deleted
    ThemeDeleted {
        /// Deleted theme index
        index: usize,
    },
    /// Answer prompt to the answerer
    AnswerPrompt,
    /// Validation prompt to the showman
    IsRightPrompt {
        /// The answer under validation
        answer: String,
        /// Canonical right answers for reference
        right_answers: Vec<String>,
    },
    /// Answer outcome applied to a score
    Person {
        /// Whether the answer was ruled right
        is_right: bool,
        /// Player index
        index: usize,
        /// Score delta magnitude
        delta: i32,
    },
    /// Game winner
    Winner {
        /// Winning player index, or -1 for a draw
        index: i32,
    },
    /// Lobby snapshot
    GameInfoSnapshot {
        /// Network game name
        game_name: String,
        /// Current host name
        host_name: String,
        /// Number of player seats
        players_count: usize,
        /// Name and connection flag per participant, roster order
        entries: Vec<(String, bool)>,
    },
    /// Full roster snapshot
    Info2 {
        /// Number of player seats
        players_count: usize,
        /// Showman, players, then connected viewers
        accounts: Vec<AccountSummary>,
    },
    /// Reading speed setting
    ReadingSpeed {
        /// Characters per second
        value: u32,
    },
    /// False start setting
    FalseStart {
        /// Whether false starts are allowed
        enabled: bool,
    },
    /// Button blocking window setting
    ButtonBlockingTime {
        /// Window length in seconds
        seconds: u64,
    },
    /// Names of the available computer players
    ComputerAccounts {
        /// Bot names
        names: Vec<String>,
    },
    /// Report prompt at game end
    ReportPrompt,
    /// Avatar location of a participant
    Picture {
        /// Participant name
        name: String,
        /// Avatar path or URI
        path: String,
    },
}

impl ServerMessage {
    /// Encodes the message into its wire token sequence
    pub fn encode(&self) -> String {
        let mut t: Vec<String> = Vec::new();
        let mut push = |s: &str| t.push(s.to_owned());

        match self {
            Self::Accepted => push(out_tokens::ACCEPTED),
            Self::Refuse { reason } => {
                push(out_tokens::REFUSE);
                push(reason);
            }
            Self::Connected {
                role,
                index,
                name,
                is_male,
            } => {
                push(out_tokens::CONNECTED);
                push(&role.to_string());
                push(&index.to_string());
                push(name);
                push(if *is_male { "m" } else { "f" });
                push("");
            }
            Self::Disconnected { name } => {
                push(out_tokens::DISCONNECTED);
                push(name);
            }
            Self::ConfigAddTable { account } => {
                push(out_tokens::CONFIG);
                push(tokens::CONFIG_ADD_TABLE);
                for token in account.wire_tokens() {
                    push(&token);
                }
            }
            Self::ConfigDeleteTable { index } => {
                push(out_tokens::CONFIG);
                push(tokens::CONFIG_DELETE_TABLE);
                push(&index.to_string());
            }
            Self::ConfigFree { is_player, index } => {
                push(out_tokens::CONFIG);
                push(tokens::CONFIG_FREE);
                push(if *is_player { "player" } else { "showman" });
                push(&index.to_string());
            }
            Self::ConfigSet {
                is_player,
                index,
                replacer,
                is_male,
            } => {
                push(out_tokens::CONFIG);
                push(tokens::CONFIG_SET);
                push(if *is_player { "player" } else { "showman" });
                push(&index.to_string());
                push(replacer);
                push(flag(*is_male));
            }
            Self::ConfigChangeType {
                is_player,
                index,
                is_human,
                name,
                is_male,
            } => {
                push(out_tokens::CONFIG);
                push(tokens::CONFIG_CHANGE_TYPE);
                push(if *is_player { "player" } else { "showman" });
                push(&index.to_string());
                push(flag(*is_human));
                push(name);
                push(flag(*is_male));
            }
            Self::Ready { name, ready } => {
                push(out_tokens::READY);
                push(name);
                push(flag(*ready));
            }
            Self::Cancel => push(out_tokens::CANCEL),
            Self::PlayerPassed { index } => {
                push(out_tokens::PASS);
                push(&index.to_string());
            }
            Self::WrongTry { index } => {
                push(out_tokens::WRONG_TRY);
                push(&index.to_string());
            }
            Self::PersonFinalAnswer { index } => {
                push(out_tokens::PERSON_FINAL_ANSWER);
                push(&index.to_string());
            }
            Self::PersonApellated { index } => {
                push(out_tokens::PERSON_APELLATED);
                push(&index.to_string());
            }
            Self::PersonFinalStake { index } => {
                push(out_tokens::PERSON_FINAL_STAKE);
                push(&index.to_string());
            }
            Self::PersonStake { index, kind, sum } => {
                push(out_tokens::PERSON_STAKE);
                push(&index.to_string());
                push(&kind.code().to_string());
                if let Some(sum) = sum {
                    push(&sum.to_string());
                }
            }
            Self::Timer { slot, args } => {
                push(out_tokens::TIMER);
                push(&slot.to_string());
                for arg in args {
                    push(arg);
                }
            }
            Self::Hostname { name, by_game } => {
                push(out_tokens::HOSTNAME);
                push(name);
                if *by_game {
                    push("");
                }
            }
            Self::Replic { code, text } => {
                push(out_tokens::REPLIC);
                push(code);
                push(text);
            }
            Self::Print { text } => {
                push(out_tokens::PRINT);
                push(text);
            }
            Self::Pause { enabled, times } => {
                push(out_tokens::PAUSE);
                push(flag(*enabled));
                for time in times {
                    push(&time.to_string());
                }
            }
            Self::Stage { name } => {
                push(out_tokens::STAGE);
                push(name);
            }
            Self::Sums { values } => {
                push(out_tokens::SUMS);
                for value in values {
                    push(&value.to_string());
                }
            }
            Self::RoundThemes { names } => {
                push(out_tokens::ROUND_THEMES);
                for name in names {
                    push(name);
                }
            }
            Self::Tablo { themes } => {
                push(out_tokens::TABLO);
                for theme in themes {
                    let row = theme
                        .iter()
                        .map(|price| price.map(|p| p.to_string()).unwrap_or_default())
                        .collect::<Vec<_>>()
                        .join(",");
                    push(&row);
                }
            }
            Self::Choice {
                theme_index,
                question_index,
            } => {
                push(out_tokens::CHOICE);
                push(&theme_index.to_string());
                push(&question_index.to_string());
            }
            Self::ChoicePrompt => push(out_tokens::CHOICE),
            Self::Question { price, text } => {
                push(out_tokens::QUESTION);
                push(&price.to_string());
                push(text);
            }
            Self::QType { kind } => {
                push(out_tokens::QTYPE);
                push(kind);
            }
            Self::RightAnswer { text } => {
                push(out_tokens::RIGHT_ANSWER);
                push(text);
            }
            Self::Try => push(out_tokens::TRY),
            Self::EndTry { arg } => {
                push(out_tokens::END_TRY);
                push(arg);
            }
            Self::FirstPrompt { flags } => {
                push(out_tokens::FIRST);
                for f in flags {
                    push(flag(*f));
                }
            }
            Self::NextPrompt { flags } => {
                push(out_tokens::NEXT);
                for f in flags {
                    push(flag(*f));
                }
            }
            Self::NextDeletePrompt { flags } => {
                push(out_tokens::NEXT_DELETE);
                for f in flags {
                    push(flag(*f));
                }
            }
            Self::CatPrompt { flags } => {
                push(out_tokens::CAT);
                for f in flags {
                    push(flag(*f));
                }
            }
            Self::CatCostPrompt {
                minimum,
                maximum,
                step,
            } => {
                push(out_tokens::CAT_COST);
                push(&minimum.to_string());
                push(&maximum.to_string());
                push(&step.to_string());
            }
            Self::StakePrompt { variants, minimum } => {
                push(out_tokens::STAKE);
                for v in variants {
                    push(flag(*v));
                }
                push(&minimum.to_string());
            }
            Self::FinalStakePrompt => push(out_tokens::FINAL_STAKE),
            Self::DeletePrompt => push(out_tokens::DELETE),
            Self::ThemeDeleted { index } => {
                push(out_tokens::OUT);
                push(&index.to_string());
            }
            Self::AnswerPrompt => push(out_tokens::ANSWER),
            Self::IsRightPrompt {
                answer,
                right_answers,
            } => {
                push(out_tokens::IS_RIGHT);
                push(answer);
                for right in right_answers {
                    push(right);
                }
            }
            Self::Person {
                is_right,
                index,
                delta,
            } => {
                push(out_tokens::PERSON);
                push(flag(*is_right));
                push(&index.to_string());
                push(&delta.to_string());
            }
            Self::Winner { index } => {
                push(out_tokens::WINNER);
                push(&index.to_string());
            }
            Self::GameInfoSnapshot {
                game_name,
                host_name,
                players_count,
                entries,
            } => {
                push(out_tokens::GAME_INFO);
                push(game_name);
                push(host_name);
                push(&players_count.to_string());
                for (name, connected) in entries {
                    push(name);
                    push(flag(*connected));
                    push("-");
                }
            }
            Self::Info2 {
                players_count,
                accounts,
            } => {
                push(out_tokens::INFO2);
                push(&players_count.to_string());
                for account in accounts {
                    for token in account.wire_tokens() {
                        push(&token);
                    }
                }
            }
            Self::ReadingSpeed { value } => {
                push(out_tokens::READING_SPEED);
                push(&value.to_string());
            }
            Self::FalseStart { enabled } => {
                push(out_tokens::FALSE_START);
                push(flag(*enabled));
            }
            Self::ButtonBlockingTime { seconds } => {
                push(out_tokens::BUTTON_BLOCKING_TIME);
                push(&seconds.to_string());
            }
            Self::ComputerAccounts { names } => {
                push(out_tokens::COMPUTER_ACCOUNTS);
                for name in names {
                    push(name);
                }
            }
            Self::ReportPrompt => push(out_tokens::REPORT),
            Self::Picture { name, path } => {
                push(out_tokens::PICTURE);
                push(name);
                push(path);
            }
        }

        t.join(&ARG_SEPARATOR.to_string())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parse_connect() {
        let cmd = ClientCommand::parse("CONNECT\nplayer\nAlice\nf\n-1").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Connect {
                role: Role::Player,
                name: "Alice".to_owned(),
                is_male: false,
                password: None,
            }
        );
    }

    #[test]
    fn parse_connect_with_password() {
        let cmd = ClientCommand::parse("CONNECT\nviewer\nBob\nm\n-1\nhunter2").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Connect {
                role: Role::Viewer,
                name: "Bob".to_owned(),
                is_male: true,
                password: Some("hunter2".to_owned()),
            }
        );
    }

    #[test]
    fn parse_connect_too_short_is_malformed() {
        assert_eq!(
            ClientCommand::parse("CONNECT\nplayer\nAlice"),
            Err(FrameError::Malformed(tokens::CONNECT))
        );
    }

    #[test]
    fn parse_unknown_command() {
        assert!(matches!(
            ClientCommand::parse("FROBNICATE\n1"),
            Err(FrameError::Unknown(_))
        ));
    }

    #[test]
    fn parse_choice_rejects_bad_numbers() {
        assert!(ClientCommand::parse("CHOICE\n1\nx").is_err());
        assert_eq!(
            ClientCommand::parse("CHOICE\n1\n2").unwrap(),
            ClientCommand::Choice {
                theme_index: 1,
                question_index: 2
            }
        );
    }

    #[test]
    fn parse_ready_defaults_to_positive() {
        assert_eq!(
            ClientCommand::parse("READY").unwrap(),
            ClientCommand::Ready { ready: true }
        );
        assert_eq!(
            ClientCommand::parse("READY\n-").unwrap(),
            ClientCommand::Ready { ready: false }
        );
    }

    #[test]
    fn parse_stake_requires_sum_for_raise() {
        assert!(ClientCommand::parse("STAKE\n1").is_err());
        assert_eq!(
            ClientCommand::parse("STAKE\n1\n500").unwrap(),
            ClientCommand::Stake {
                kind: StakeKind::Sum,
                sum: Some(500)
            }
        );
        assert_eq!(
            ClientCommand::parse("STAKE\n2").unwrap(),
            ClientCommand::Stake {
                kind: StakeKind::Pass,
                sum: None
            }
        );
    }

    #[test]
    fn parse_bot_answer_markers() {
        assert_eq!(
            ClientCommand::parse("ANSWER\nWRONG\nIs it #?").unwrap(),
            ClientCommand::Answer {
                text: "Is it #?".to_owned(),
                bot_marker: Some(false)
            }
        );
        assert_eq!(
            ClientCommand::parse("ANSWER\nBerlin").unwrap(),
            ClientCommand::Answer {
                text: "Berlin".to_owned(),
                bot_marker: None
            }
        );
    }

    #[test]
    fn parse_config_variants() {
        assert_eq!(
            ClientCommand::parse("CONFIG\nADD_TABLE").unwrap(),
            ClientCommand::Config(ConfigCommand::AddTable)
        );
        assert_eq!(
            ClientCommand::parse("CONFIG\nDELETE_TABLE\n2").unwrap(),
            ClientCommand::Config(ConfigCommand::DeleteTable { index: 2 })
        );
        assert_eq!(
            ClientCommand::parse("CONFIG\nSET\nplayer\n1\nBotwinnik").unwrap(),
            ClientCommand::Config(ConfigCommand::Set {
                is_player: true,
                index: 1,
                replacer: "Botwinnik".to_owned()
            })
        );
        assert_eq!(
            ClientCommand::parse("CONFIG\nCHANGE_TYPE\nshowman").unwrap(),
            ClientCommand::Config(ConfigCommand::ChangeType {
                is_player: false,
                index: 0
            })
        );
    }

    #[test]
    fn encode_connected_token_order() {
        let msg = ServerMessage::Connected {
            role: Role::Player,
            index: 2,
            name: "Alice".to_owned(),
            is_male: false,
        };
        assert_eq!(msg.encode(), "CONNECTED\nplayer\n2\nAlice\nf\n");
    }

    #[test]
    fn encode_pause_with_timer_snapshots() {
        let msg = ServerMessage::Pause {
            enabled: true,
            times: [120, 45, 0],
        };
        assert_eq!(msg.encode(), "PAUSE\n+\n120\n45\n0");
    }

    #[test]
    fn encode_hostname_by_game_appends_empty_token() {
        assert_eq!(
            ServerMessage::Hostname {
                name: "Alice".to_owned(),
                by_game: true
            }
            .encode(),
            "HOSTNAME\nAlice\n"
        );
        assert_eq!(
            ServerMessage::Hostname {
                name: "Alice".to_owned(),
                by_game: false
            }
            .encode(),
            "HOSTNAME\nAlice"
        );
    }

    #[test]
    fn encode_config_delete_table() {
        assert_eq!(
            ServerMessage::ConfigDeleteTable { index: 1 }.encode(),
            "CONFIG\nDELETE_TABLE\n1"
        );
    }

    #[test]
    fn encode_timer() {
        let msg = ServerMessage::Timer {
            slot: 2,
            args: vec!["GO".to_owned(), "300".to_owned(), "-2".to_owned()],
        };
        assert_eq!(msg.encode(), "TIMER\n2\nGO\n300\n-2");
    }

    #[test]
    fn encode_tablo_marks_played_cells() {
        let msg = ServerMessage::Tablo {
            themes: vec![vec![Some(100), None, Some(300)], vec![None, None]],
        };
        assert_eq!(msg.encode(), "TABLO\n100,,300\n,");
    }
}
