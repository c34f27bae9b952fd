//! `mcpchat tools`: start the configured servers and list the catalog.

use mcpchat_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.servers.is_empty() {
        println!("No servers configured. Add [servers.<name>] entries to:");
        println!("  {}", AppConfig::config_dir().join("config.toml").display());
        return Ok(());
    }

    let event_bus = mcpchat_core::event::EventBus::default();
    let (catalog, report) = super::build_catalog(&config, &event_bus).await?;

    println!();
    for (server, count) in &report.ready {
        println!("  {server}: ready ({count} tools)");
    }
    for (server, error) in &report.failed {
        println!("  {server}: FAILED ({error})");
    }
    println!();

    let definitions = catalog.definitions();
    if definitions.is_empty() {
        println!("  No tools advertised.");
    } else {
        for def in &definitions {
            let server = catalog.server_for(&def.name).unwrap_or("?");
            if def.description.is_empty() {
                println!("  {} [{server}]", def.name);
            } else {
                println!("  {} [{server}]: {}", def.name, def.description);
            }
        }
    }
    println!();

    catalog.close_all().await;
    Ok(())
}
