//! Command-line interface for dailydrop.

mod commands;
pub mod progress;

pub use commands::{is_verbose, run};
