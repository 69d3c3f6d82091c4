//! Trace model and parser for scheduler instrumentation output.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`pid`] | [`Pid`] newtype |
//! | [`model`] | [`Trace`], [`LevelObservation`], [`TickLog`], [`TickSnapshot`], [`ProcessObservation`] |
//! | [`parser`] | terse and full grammar tokenizers |

pub mod model;
pub mod parser;
pub mod pid;

pub use model::{LevelObservation, ProcessObservation, QueueSet, TickLog, TickSnapshot, Trace};
pub use parser::{
    parse_full, parse_full_line, parse_line, parse_terse, parse_terse_line, read_full,
    read_terse, Grammar, LineOutcome, TraceLine,
};
pub use pid::Pid;
