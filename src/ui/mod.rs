//! Command-line front end

mod cli;

pub use cli::{describe_event, Args, LogFormat};
