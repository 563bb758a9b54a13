//! tally-client — interactive front end for the tally client core.

pub mod config;
pub mod repl;

pub use config::ClientConfig;
pub use repl::{ReplCommand, USAGE, parse_line};
