//! Line-oriented command input for the mixdown shell

mod commands;
mod format;

pub use commands::{parse_command, Command, ParseError, Target, HELP};
pub use format::{format_duration, format_time};
