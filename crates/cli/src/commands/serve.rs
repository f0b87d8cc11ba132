//! `hearth serve` — Start the HTTP API server.

use std::path::Path;

use crate::runtime;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = runtime::load_config(config_path)?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let orchestrator = runtime::build(&config).await?;

    println!("hearth gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.default_provider, config.default_model);
    println!("   Store:     {:?}", config.store.backend);

    hearth_gateway::serve(&config, orchestrator).await?;
    Ok(())
}
