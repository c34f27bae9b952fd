//! The chat loop implementation.

use std::sync::Arc;

use mcpchat_core::event::{DomainEvent, EventBus};
use mcpchat_core::message::{Conversation, Message, Role};
use mcpchat_core::provider::{Provider, ProviderRequest};
use mcpchat_mcp::CapabilityCatalog;
use tracing::{debug, info, warn};

/// The core loop that interleaves LLM calls with tool dispatch.
pub struct ChatLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The merged tool catalog across all servers
    catalog: Arc<CapabilityCatalog>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// System prompt placed at the head of the conversation
    system_prompt: String,

    /// Maximum model rounds per user turn
    max_rounds: usize,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl ChatLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        catalog: Arc<CapabilityCatalog>,
        model: impl Into<String>,
        temperature: f32,
        system_prompt: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            catalog,
            model: model.into(),
            temperature,
            max_tokens: None,
            system_prompt: system_prompt.into(),
            max_rounds: 8,
            event_bus,
        }
    }

    /// Set the maximum number of model rounds per turn.
    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Process the conversation until the model produces a plain text answer.
    ///
    /// 1. Ensures the system prompt is message zero
    /// 2. Calls the LLM with the full history and the tool catalog
    /// 3. Executes requested tool calls in emission order, appending one
    ///    tool-result message per call
    /// 4. Loops until a text-only response or the round budget is spent
    pub async fn process(
        &self,
        conversation: &mut Conversation,
    ) -> Result<String, mcpchat_core::Error> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Processing conversation"
        );

        if conversation.messages.is_empty() || conversation.messages[0].role != Role::System {
            conversation
                .messages
                .insert(0, Message::system(&self.system_prompt));
        }

        let tool_definitions = self.catalog.definitions();
        let mut round = 0;
        let mut last_partial = String::new();

        loop {
            round += 1;

            if round > self.max_rounds {
                warn!(
                    conversation_id = %conversation.id,
                    rounds = self.max_rounds,
                    "Round limit reached, truncating turn"
                );
                self.event_bus.publish(DomainEvent::RoundLimitReached {
                    conversation_id: conversation.id.to_string(),
                    rounds: self.max_rounds,
                    timestamp: chrono::Utc::now(),
                });
                break;
            }

            debug!(conversation_id = %conversation.id, round, "Chat loop round");

            let mut request =
                ProviderRequest::new(&self.model, conversation.messages.clone())
                    .with_tools(tool_definitions.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;

            let response = match self.provider.complete(request).await {
                Ok(r) => r,
                Err(e) => {
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: "provider".into(),
                        error_message: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    return Err(e.into());
                }
            };

            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    conversation_id: conversation.id.to_string(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: chrono::Utc::now(),
                });
            }

            if response.message.tool_calls.is_empty() {
                // No tool calls, so this is the final text answer.
                let response_text = response.message.content.clone();
                conversation.push(response.message);
                return Ok(response_text);
            }

            debug!(
                tool_count = response.message.tool_calls.len(),
                "Dispatching tool calls"
            );

            let tool_calls = response.message.tool_calls.clone();
            if !response.message.content.trim().is_empty() {
                last_partial = response.message.content.clone();
            }
            conversation.push(response.message);

            // Dispatch serially, in the order the model emitted the calls,
            // so results land in the history in the same order.
            for tc in &tool_calls {
                let arguments = match serde_json::from_str::<serde_json::Value>(&tc.arguments) {
                    Ok(args) => args,
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Model emitted unparseable arguments");
                        conversation.push(Message::tool_result(
                            &tc.id,
                            format!("Error: arguments are not valid JSON: {e}"),
                        ));
                        continue;
                    }
                };

                let server = self
                    .catalog
                    .server_for(&tc.name)
                    .unwrap_or("unknown")
                    .to_string();
                let start = std::time::Instant::now();
                let result = self.catalog.invoke(&tc.name, arguments).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match result {
                    Ok(outcome) => {
                        self.event_bus.publish(DomainEvent::ToolInvoked {
                            tool_name: tc.name.clone(),
                            server: server.clone(),
                            success: !outcome.is_error,
                            duration_ms,
                            timestamp: chrono::Utc::now(),
                        });

                        let text = if outcome.is_error {
                            format!("Error: {}", outcome.text)
                        } else {
                            outcome.text
                        };
                        conversation.push(Message::tool_result(&tc.id, text));
                    }
                    Err(e) => {
                        // Unknown tools, bad arguments, timeouts, dead servers:
                        // all fed back so the model can recover.
                        warn!(tool = %tc.name, error = %e, "Tool invocation failed");

                        self.event_bus.publish(DomainEvent::ToolInvoked {
                            tool_name: tc.name.clone(),
                            server,
                            success: false,
                            duration_ms,
                            timestamp: chrono::Utc::now(),
                        });

                        conversation.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                    }
                }
            }
        }

        // Surface whatever partial answer the model produced along the way.
        let mut notice = format!(
            "I stopped after {} tool rounds without reaching a final answer. \
             Please narrow the request or continue from here.",
            self.max_rounds
        );
        if !last_partial.is_empty() {
            notice = format!("{last_partial}\n\n{notice}");
        }
        conversation.push(Message::assistant(&notice));
        Ok(notice)
    }
}
