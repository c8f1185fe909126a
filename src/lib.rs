//! ChatRelay: streaming chat client, proxy, and conversation manager for
//! local Ollama servers
//!
//! The crate has three load-bearing parts:
//!
//! - [`client`]: the upstream Ollama client with a line-buffered NDJSON
//!   stream decoder, behind the [`client::ChatBackend`] trait
//! - [`proxy`]: an axum server relaying browser requests to an Ollama
//!   upstream with unbuffered streaming and CORS
//! - [`session`]: the conversation orchestrator driving multi-model chat
//!   turns and bounded persistence
//!
//! The `chatrelay` binary fronts them with `serve`, `chat`, and `models`
//! subcommands.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod proxy;
pub mod session;
pub mod storage;

pub use client::{ChatBackend, ChatMessage, ModelTag, OllamaClient, Role};
pub use config::Config;
pub use error::{ChatRelayError, Result};
pub use session::{ChatSession, Conversation};
