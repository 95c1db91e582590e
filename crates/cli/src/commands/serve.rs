//! `memgate serve` — Start the HTTP chat gateway.

use memgate_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Memgate Gateway");
    println!(
        "   Listening: {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("   Model: {}", config.completion.model);
    println!(
        "   Memory: {}",
        if config.memory.api_key.is_some() {
            "mem0"
        } else {
            "disabled"
        }
    );

    memgate_gateway::start(config).await?;

    Ok(())
}
