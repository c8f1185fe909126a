//! Command implementations for the CLI

pub mod chat;
pub mod models;
pub mod serve;
