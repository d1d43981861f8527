//! `chatmesh check-config`: validate the app config and, optionally, a
//! chatbot config.

use anyhow::Context;
use chatmesh_config::{AppConfig, ChatbotConfig};
use std::path::Path;

pub fn run(config_path: Option<&Path>, init: bool, chatbot: Option<&Path>) -> anyhow::Result<()> {
    if init {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = super::load_app_config(config_path)?;
    config.validate()?;
    println!("Config OK");
    for line in summary(&config) {
        println!("   {line}");
    }
    if !config.has_api_key() {
        println!("   warning: no API key (set CHATMESH_API_KEY or OPENAI_API_KEY)");
    }

    if let Some(path) = chatbot {
        let chatbot = check_chatbot(path)?;
        println!(
            "Chatbot '{}' OK: {}, {} tool(s), recursion limit {}",
            chatbot.chatbot_id,
            chatbot.chatbot_mode,
            chatbot.agent_config.tools.len(),
            chatbot.recursion_limit
        );
    }
    Ok(())
}

fn summary(config: &AppConfig) -> Vec<String> {
    vec![
        format!("API URL:    {}", config.api_url),
        format!("Model:      {}", config.default_model),
        format!("Embedding:  {}", config.embedding_model),
        format!("Store:      {}", config.store.url),
        format!("Models:     {} configured", config.model_table().len()),
    ]
}

fn check_chatbot(path: &Path) -> anyhow::Result<ChatbotConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(ChatbotConfig::from_value(value)?)
}
