//! The text command interface: grammar and dispatch.

mod dispatcher;
mod grammar;

pub use dispatcher::{version_text, CommandDispatcher, SessionEnded, HELP_TEXT, LIST_CHUNK_CHARS};
pub use grammar::{parse, GrammarError, ParsedCommand};
