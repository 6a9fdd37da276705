pub(crate) mod gate;
pub(crate) mod ledger;
pub(crate) mod runs;

use std::sync::Arc;

use runledger_lifecycle::{GenerationClient, RunController, UnconfiguredClient};
use runledger_storage::{Persistence, Stored};
use serde::Serialize;

use crate::config::{CliConfig, GenerationConfig};
use crate::OutputFormat;

/// Shared state of one CLI invocation.
pub(crate) struct App {
    pub store: Arc<Persistence>,
    pub controller: RunController,
    pub output: OutputFormat,
}

impl App {
    pub fn new(config: &CliConfig, output: OutputFormat) -> Self {
        let store = Arc::new(Persistence::from_config(&config.persistence));
        let controller = RunController::new(store.clone(), generator(&config.generation));
        App {
            store,
            controller,
            output,
        }
    }

    /// Print `value` as JSON, or `text()` in text mode.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<(), String> {
        match self.output {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(value)
                    .map_err(|e| format!("serialization error: {}", e))?;
                println!("{}", json);
            }
            OutputFormat::Text => {
                let text = text();
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
        }
        Ok(())
    }
}

/// Tell the operator when a local write did not reach the medium.
pub(crate) fn warn_degraded<T>(stored: &Stored<T>) {
    if let runledger_storage::Durability::Degraded { reason } = &stored.durability {
        eprintln!("warning: change kept in memory only: {}", reason);
    }
}

#[cfg(feature = "anthropic")]
fn generator(config: &GenerationConfig) -> Arc<dyn GenerationClient> {
    use runledger_lifecycle::generation::ENV_MODEL;
    use runledger_lifecycle::AnthropicClient;

    let lookup = |key: &str| {
        std::env::var(key)
            .ok()
            .or_else(|| (key == ENV_MODEL).then(|| config.model.clone()).flatten())
    };
    match AnthropicClient::from_lookup(lookup) {
        Ok(client) => {
            tracing::debug!(model = %client.model, "generation provider: anthropic");
            Arc::new(client)
        }
        Err(e) => {
            tracing::debug!(error = %e, "generation provider not configured");
            Arc::new(UnconfiguredClient)
        }
    }
}

#[cfg(not(feature = "anthropic"))]
fn generator(_config: &GenerationConfig) -> Arc<dyn GenerationClient> {
    Arc::new(UnconfiguredClient)
}
