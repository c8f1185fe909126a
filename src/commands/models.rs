//! Models command: list what the Ollama server has pulled

use crate::client::{format_size, is_vision_model, ChatBackend, OllamaClient};
use crate::config::Config;
use crate::error::Result;

use colored::Colorize;
use prettytable::{row, Table};

/// List available models
///
/// # Arguments
///
/// * `config` - Application configuration
/// * `json` - Emit the raw listing as JSON instead of a table
///
/// # Errors
///
/// Returns error if the client cannot be constructed or JSON output fails
pub async fn list(config: &Config, json: bool) -> Result<()> {
    let client = OllamaClient::new(&config.upstream.url)?;

    if !client.check_connection().await {
        eprintln!(
            "{}",
            format!("Cannot reach Ollama at {}", client.base_url()).red()
        );
    }

    let models = client.list_models().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        println!("No models found at {}", client.base_url());
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["NAME", "SIZE", "MODIFIED", "VISION"]);
    for model in &models {
        table.add_row(row![
            model.name,
            format_size(model.size),
            model.modified_at,
            if is_vision_model(&model.name) {
                "yes"
            } else {
                ""
            }
        ]);
    }
    table.printstd();
    println!("\n{} models available", models.len());

    Ok(())
}
