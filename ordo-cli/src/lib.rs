//! Ordo CLI - Command-line interface for ledger-based migrations.
//!
//! This crate provides the `ordo` binary: it reads `ordo.toml`, connects to
//! the database and drives the migration engine from `ordo-migrate`.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
