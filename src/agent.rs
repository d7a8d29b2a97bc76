//! Message generation and reply targeting.

pub mod generator;
pub mod mention;

pub use generator::{
    AttemptError, GenerationFailure, GenerationResult, Generator, RecentOutputLog,
};
pub use mention::resolve_reply_target;
