//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Streaming chat client and proxy for local Ollama servers
#[derive(Debug, Parser)]
#[command(name = "chatrelay", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Ollama server base URL
    #[arg(long, global = true, env = "CHATRELAY_OLLAMA_URL")]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the browser-facing streaming proxy
    Serve {
        /// Socket address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Resolve the upstream from the x-ollama-url request header
        /// instead of the configured URL
        #[arg(long)]
        header_mode: bool,
    },

    /// Start an interactive chat session
    Chat {
        /// Model(s) to chat with; repeat for multi-model turns
        #[arg(short, long)]
        model: Vec<String>,

        /// Keep conversations in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Model operations
    Models {
        #[command(subcommand)]
        command: ModelCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ModelCommands {
    /// List models available on the Ollama server
    List {
        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from(["chatrelay", "serve", "--bind", "0.0.0.0:9090"]);
        match cli.command {
            Commands::Serve { bind, header_mode } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:9090"));
                assert!(!header_mode);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_serve_header_mode() {
        let cli = Cli::parse_from(["chatrelay", "serve", "--header-mode"]);
        match cli.command {
            Commands::Serve { header_mode, .. } => assert!(header_mode),
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_chat_with_models() {
        let cli = Cli::parse_from(["chatrelay", "chat", "-m", "llama3.2", "-m", "mistral"]);
        match cli.command {
            Commands::Chat { model, ephemeral } => {
                assert_eq!(model, ["llama3.2", "mistral"]);
                assert!(!ephemeral);
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn test_parse_models_list_json() {
        let cli = Cli::parse_from(["chatrelay", "models", "list", "--json"]);
        match cli.command {
            Commands::Models {
                command: ModelCommands::List { json },
            } => assert!(json),
            _ => panic!("expected models list"),
        }
    }

    #[test]
    fn test_global_url_flag() {
        let cli = Cli::parse_from([
            "chatrelay",
            "--url",
            "http://10.0.0.2:11434",
            "models",
            "list",
        ]);
        assert_eq!(cli.url.as_deref(), Some("http://10.0.0.2:11434"));
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::parse_from(["chatrelay", "-vv", "models", "list"]);
        assert_eq!(cli.verbose, 2);
    }
}
