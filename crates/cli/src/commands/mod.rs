//! CLI command implementations.

pub mod chat;
pub mod onboard;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use mcpchat_config::AppConfig;
use mcpchat_core::event::{DomainEvent, EventBus};
use mcpchat_core::session::ToolSession;
use mcpchat_mcp::{BuildReport, CapabilityCatalog, ServerSession};

/// Build one session per configured server and initialize them all.
///
/// Failed servers are reported and published as degradation events, not
/// fatal; only an entirely failed fleet aborts the command.
pub async fn build_catalog(
    config: &AppConfig,
    event_bus: &EventBus,
) -> Result<(Arc<CapabilityCatalog>, BuildReport), Box<dyn std::error::Error>> {
    let init_timeout = Duration::from_secs(config.init_timeout_secs);
    let call_timeout = Duration::from_secs(config.tool_timeout_secs);

    let sessions: Vec<Arc<dyn ToolSession>> = config
        .servers
        .iter()
        .map(|(name, server)| {
            Arc::new(ServerSession::new(
                name.clone(),
                server.clone(),
                init_timeout,
                call_timeout,
            )) as Arc<dyn ToolSession>
        })
        .collect();

    let (catalog, report) = CapabilityCatalog::build(sessions).await;

    for (server, error) in &report.failed {
        eprintln!("  [!] Server '{server}' failed to start: {error}");
        event_bus.publish(DomainEvent::SessionDegraded {
            server: server.clone(),
            reason: error.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    if report.all_failed() {
        return Err("all configured servers failed to start".into());
    }

    Ok((Arc::new(catalog), report))
}
