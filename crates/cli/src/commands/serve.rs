//! `convmem serve`: start the HTTP API server.

use convmem_config::AppConfig;

pub async fn run(
    mut config: AppConfig,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("convmem API");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Hot store:  {}", config.hot_store.backend);
    println!("   Durable:    {}", config.durable_store.backend);
    println!("   Model:      {}", config.provider.model);

    convmem_gateway::start(config).await?;

    Ok(())
}
