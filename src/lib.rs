//! # Quizhall Game Session Library
//!
//! This library implements the server-side session engine of a showman-led
//! trivia game: a single long-lived [`game::Game`] object that coordinates a
//! showman, players and viewers through a turn-based quiz transmitted over a
//! token-separated text protocol. The session validates every inbound
//! message against the currently pending decision, mutates the shared
//! roster/score state, drives a question engine through rounds, themes and
//! questions, and broadcasts the resulting deltas to all participants.
//!
//! The crate is transport-free. A hosting application supplies:
//!
//! - a [`session::Tunnel`] per participant (resolved by name through a
//!   `tunnel_finder` closure) over which encoded protocol lines are sent;
//! - a `schedule_alarm` closure that arms delayed wake-ups and later feeds
//!   them back through [`game::Game::receive_alarm`];
//! - a [`session::ClientGateway`] for connection-fabric operations (kicks,
//!   computer-client removal);
//! - one serialized execution context (actor mailbox or mutex) through
//!   which every call into the session is funneled.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::doc_markdown)]

pub mod account;
pub mod constants;
pub mod decision;
pub mod engine;
pub mod game;
pub mod lexicon;
pub mod names;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod timers;
