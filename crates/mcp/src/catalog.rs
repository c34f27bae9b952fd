//! The aggregated capability catalog across all tool servers.
//!
//! The catalog owns one session per configured server, initializes them all
//! (tolerating partial failure), and merges their advertised tools into a
//! single collision-free namespace that the chat loop exposes to the model.
//!
//! Renaming rule: a tool name unique across the fleet is exposed unchanged;
//! a name advertised by more than one server is exposed as
//! `{server}_{name}` for every party to the collision. Underscores keep the
//! exposed names valid OpenAI-style function identifiers.

use std::collections::BTreeMap;
use std::sync::Arc;

use mcpchat_core::error::{CatalogError, Error, InvocationError, SessionError};
use mcpchat_core::provider::ToolDefinition;
use mcpchat_core::session::{InvocationOutcome, SessionState, ToolDescriptor, ToolSession};
use tracing::{info, warn};

/// One exposed tool: which session owns it and under what declared name.
struct CatalogEntry {
    session: Arc<dyn ToolSession>,
    /// The name the server declared (what `tools/call` expects).
    source_name: String,
    descriptor: ToolDescriptor,
}

/// What happened during catalog construction.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Servers that reached Ready, with their tool counts.
    pub ready: Vec<(String, usize)>,
    /// Servers that failed to initialize, with the reason.
    pub failed: Vec<(String, SessionError)>,
}

impl BuildReport {
    pub fn all_failed(&self) -> bool {
        self.ready.is_empty() && !self.failed.is_empty()
    }
}

/// The collision-free tool catalog across all ready sessions.
pub struct CapabilityCatalog {
    /// Keyed by exposed name; BTreeMap keeps `definitions()` deterministic.
    entries: BTreeMap<String, CatalogEntry>,
    sessions: Vec<Arc<dyn ToolSession>>,
}

impl CapabilityCatalog {
    /// Initialize every session and merge the advertised tools.
    ///
    /// Sessions are initialized in order; a failure is recorded in the
    /// report and the remaining servers still come up. Only an entirely
    /// empty fleet is the caller's problem to notice (`BuildReport::all_failed`).
    pub async fn build(sessions: Vec<Arc<dyn ToolSession>>) -> (Self, BuildReport) {
        let mut report = BuildReport::default();
        // One (server, descriptor, session) triple per advertised tool.
        let mut advertised: Vec<(String, ToolDescriptor, Arc<dyn ToolSession>)> = Vec::new();

        for session in &sessions {
            let server = session.server_name().to_string();
            match session.initialize().await {
                Ok(tools) => {
                    report.ready.push((server.clone(), tools.len()));
                    let mut seen_here: Vec<String> = Vec::new();
                    for tool in tools {
                        if seen_here.contains(&tool.name) {
                            // Duplicate within one server: first wins.
                            warn!(
                                server = %server,
                                tool = %tool.name,
                                "Server advertised a duplicate tool name, keeping the first"
                            );
                            continue;
                        }
                        seen_here.push(tool.name.clone());
                        advertised.push((server.clone(), tool, Arc::clone(session)));
                    }
                }
                Err(e) => {
                    warn!(server = %server, error = %e, "Server failed to initialize");
                    report.failed.push((server, e));
                }
            }
        }

        // Count how many servers advertise each declared name.
        let mut name_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, tool, _) in &advertised {
            *name_counts.entry(tool.name.as_str()).or_insert(0) += 1;
        }

        let mut exposed_names: Vec<String> = advertised
            .iter()
            .map(|(server, tool, _)| {
                if name_counts[tool.name.as_str()] > 1 {
                    format!("{server}_{}", tool.name)
                } else {
                    tool.name.clone()
                }
            })
            .collect();

        // A qualified name can itself collide with a distinct tool whose
        // declared name matches it (server `a` advertising `search` next to
        // a unique tool literally named `a_search`). Qualify the so-far
        // unqualified party of any residual collision; repeat until stable.
        loop {
            let requalify: Vec<usize> = {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for name in &exposed_names {
                    *counts.entry(name.as_str()).or_insert(0) += 1;
                }
                exposed_names
                    .iter()
                    .enumerate()
                    .filter(|(i, name)| {
                        counts[name.as_str()] > 1 && *name == &advertised[*i].1.name
                    })
                    .map(|(i, _)| i)
                    .collect()
            };
            if requalify.is_empty() {
                break;
            }
            for i in requalify {
                exposed_names[i] = format!("{}_{}", advertised[i].0, advertised[i].1.name);
            }
        }

        let mut entries: BTreeMap<String, CatalogEntry> = BTreeMap::new();
        for ((server, tool, session), exposed) in advertised.iter().zip(exposed_names) {
            // Fully qualified names can still collide in pathological cases
            // (server `a` with tool `x_y` next to server `a_x` with tool
            // `y`). First wins; losing an entry must never be silent.
            if entries.contains_key(&exposed) {
                warn!(
                    server = %server,
                    tool = %tool.name,
                    exposed = %exposed,
                    "Exposed name still collides after qualification, skipping"
                );
                continue;
            }
            info!(server = %server, tool = %tool.name, exposed = %exposed, "Registered tool");
            entries.insert(
                exposed,
                CatalogEntry {
                    session: Arc::clone(session),
                    source_name: tool.name.clone(),
                    descriptor: tool.clone(),
                },
            );
        }

        (Self { entries, sessions }, report)
    }

    /// Tool definitions for the provider, in deterministic (sorted) order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries
            .iter()
            .map(|(exposed, entry)| entry.descriptor.to_definition(exposed))
            .collect()
    }

    /// Which server owns an exposed tool name.
    pub fn server_for(&self, exposed_name: &str) -> Option<&str> {
        self.entries
            .get(exposed_name)
            .map(|e| e.session.server_name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exposed tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        self.entries.keys().map(|k| k.as_str()).collect()
    }

    /// Structural argument check: required fields from the schema must be
    /// present. Full JSON Schema validation is the server's job.
    fn validate_arguments(
        exposed_name: &str,
        descriptor: &ToolDescriptor,
        arguments: &serde_json::Value,
    ) -> Result<(), InvocationError> {
        let Some(required) = descriptor.input_schema.get("required").and_then(|r| r.as_array())
        else {
            return Ok(());
        };

        for field in required {
            if let Some(field_name) = field.as_str() {
                let present = arguments
                    .as_object()
                    .map(|obj| obj.contains_key(field_name))
                    .unwrap_or(false);
                if !present {
                    return Err(InvocationError::InvalidArguments {
                        tool: exposed_name.to_string(),
                        reason: format!("missing required field: '{field_name}'"),
                    });
                }
            }
        }

        Ok(())
    }

    /// Resolve an exposed name and invoke the tool on its owning session.
    ///
    /// An unknown name resolves to `CatalogError::UnknownTool`. So does a
    /// known name whose session has since left Ready: a dropped transport
    /// degrades that server's tools to unknown until the catalog is rebuilt.
    /// A Ready session can still lose its process mid-call, which surfaces
    /// as an `InvocationError`; callers decide whether to feed either back
    /// to the model or abort.
    pub async fn invoke(
        &self,
        exposed_name: &str,
        arguments: serde_json::Value,
    ) -> Result<InvocationOutcome, Error> {
        let entry = self
            .entries
            .get(exposed_name)
            .ok_or_else(|| CatalogError::UnknownTool(exposed_name.to_string()))?;

        if entry.session.state() != SessionState::Ready {
            return Err(CatalogError::UnknownTool(exposed_name.to_string()).into());
        }

        Self::validate_arguments(exposed_name, &entry.descriptor, &arguments)?;

        let outcome = entry
            .session
            .invoke(&entry.source_name, arguments)
            .await?;
        Ok(outcome)
    }

    /// Close every session. Idempotent.
    pub async fn close_all(&self) {
        for session in &self.sessions {
            session.close().await;
        }
    }
}
