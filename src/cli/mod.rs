//! Command-line interface for plfetch.

mod commands;
pub mod icons;

pub use commands::{is_verbose, run};
