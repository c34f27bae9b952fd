//! `mcpchat chat`: interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use mcpchat_agent::ChatLoop;
use mcpchat_config::AppConfig;
use mcpchat_core::event::EventBus;
use mcpchat_core::message::{Conversation, Message};
use mcpchat_core::provider::Provider;
use mcpchat_providers::OpenAiCompatProvider;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::new(
        "ollama",
        &config.base_url,
        config.api_key.clone().unwrap_or_else(|| "ollama".into()),
    ));

    // A dead endpoint or a typo'd model name should be visible before the
    // first turn, not as an opaque mid-conversation error.
    if !provider.health_check().await.unwrap_or(false) {
        eprintln!("  [!] Model endpoint {} is not reachable", config.base_url);
    } else if let Ok(models) = provider.list_models().await {
        if !models.is_empty() && !models.iter().any(|m| m == &config.model) {
            eprintln!(
                "  [!] Model '{}' is not in the endpoint's model list",
                config.model
            );
        }
    }

    let event_bus = Arc::new(EventBus::default());
    let (catalog, report) = super::build_catalog(&config, event_bus.as_ref()).await?;

    let agent = ChatLoop::new(
        Arc::clone(&provider),
        Arc::clone(&catalog),
        &config.model,
        config.temperature,
        &config.system_prompt,
        event_bus,
    )
    .with_max_rounds(config.max_tool_rounds)
    .with_max_tokens(config.max_tokens);

    let result = if let Some(msg) = message {
        run_single(&agent, &msg).await
    } else {
        run_interactive(&agent, &config, catalog.len(), &report).await
    };

    catalog.close_all().await;
    result
}

async fn run_single(
    agent: &ChatLoop,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut conv = Conversation::new();
    conv.push(Message::user(message));

    eprint!("  Thinking...");
    let response = agent.process(&mut conv).await?;
    eprint!("\r              \r");
    println!("{response}");
    Ok(())
}

async fn run_interactive(
    agent: &ChatLoop,
    config: &AppConfig,
    tool_count: usize,
    report: &mcpchat_mcp::BuildReport,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  mcpchat: Interactive Mode");
    println!("  -------------------------");
    println!("  Endpoint:  {}", config.base_url);
    println!("  Model:     {}", config.model);
    for (server, count) in &report.ready {
        println!("  Server:    {server} ({count} tools)");
    }
    for (server, _) in &report.failed {
        println!("  Server:    {server} (unavailable)");
    }
    println!("  Tools:     {tool_count} available");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut conv = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let Some(line) = line else {
            break; // stdin closed
        };

        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if matches!(line.as_str(), "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }

        conv.push(Message::user(&line));

        eprint!("  ...");
        // The SIGINT handler stays installed for the whole program once the
        // first select! polls ctrl_c(), so a Ctrl-C pressed mid-turn must
        // also have a listener or it is dropped on the floor.
        let result = tokio::select! {
            result = agent.process(&mut conv) => result,
            _ = tokio::signal::ctrl_c() => {
                eprint!("\r     \r");
                println!();
                println!("  [Interrupted]");
                break;
            }
        };
        match result {
            Ok(response) => {
                eprint!("\r     \r");
                println!();
                for line in response.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
