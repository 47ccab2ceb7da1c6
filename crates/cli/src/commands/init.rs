//! `convmem init`: write the default configuration.

use convmem_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run init.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set provider.api_key (or export CONVMEM_API_KEY)");
    println!("   2. Point hot_store.url at Redis, or set backend = \"memory\"");
    println!("   3. Run: convmem serve");

    Ok(())
}
