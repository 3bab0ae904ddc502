//! # netrender
//!
//! Library half of the `netrender` binary: command-line parsing, command
//! implementations and the optional TOML configuration file.
//!
//! The engine itself lives in `netrender-core`.

pub mod cli;
pub mod config;
