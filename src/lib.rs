//! consilium - multi-expert case consultation over streaming LLM backends
//!
//! A triage step reads the case report and names the expert steps it needs.
//! The [`workflow::WorkflowEngine`] dispatches each required step once, in the
//! step universe's canonical order, streaming every generation through a
//! [`workflow::StreamAccumulator`], and finally synthesizes all analyses into
//! one report.
//!
//! # Example Usage
//!
//! ```no_run
//! use consilium::llm::{MockLLMClient, MockResponse};
//! use consilium::workflow::{Case, StepRegistry, WorkflowEngine};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(MockLLMClient::new());
//! client.add_response(MockResponse::text("REQUIRED SPECIALISTS: none"));
//! client.add_response(MockResponse::text("Nothing further needed."));
//!
//! let registry = Arc::new(StepRegistry::builtin()?);
//! let engine = WorkflowEngine::new(client, registry)?;
//! let state = engine.run(Case::new("Mild headache"), &CancellationToken::new()).await?;
//! println!("{}", state.final_report().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod llm;
pub mod progress;
pub mod util;
pub mod workflow;

pub use config::{ConfigError, ConsiliumConfig, Provider};
pub use llm::{BackendError, LLMClient};
pub use workflow::{Case, RunRecord, StepRegistry, WorkflowEngine, WorkflowError, WorkflowState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
