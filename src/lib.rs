//! # actlink - ACTion LINK
//!
//! Expose third-party app actions as LLM function tools and run them on behalf
//! of end users.
//!
//! ## Features
//!
//! - **Tools**: list actions from the backend catalog as OpenAI function tools
//! - **Connections**: pick the connected account an entity's action should use
//! - **Assistant runs**: answer tool calls of polled or streamed runs
//! - **Integrations**: create and inspect auth configurations for apps
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actlink::{ClientConfig, ExecuteActionParams, OpenAiToolSet};
//! use serde_json::json;
//!
//! # async fn demo() -> actlink::Result<()> {
//! let config = ClientConfig::builder().api_key("ak_...").build()?;
//! let toolset = OpenAiToolSet::from_config(&config)?;
//! let result = toolset
//!     .entity(Some("alice"))
//!     .execute(ExecuteActionParams::new("GITHUB_STAR_REPO").params(json!({
//!         "owner": "rust-lang",
//!         "repo": "rust"
//!     })))
//!     .await?;
//! println!("{}", result);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod core;
pub mod entity;
pub mod integrations;
pub mod llm;
pub mod logging;
pub mod toolset;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use backend::{BackendApi, HttpBackend};
pub use config::{ClientConfig, LlmConfig, PollPolicy};
pub use crate::core::{ErrorCode, ErrorKind, Result, SdkError, ValidationError};
pub use entity::{ConnectionConfig, Entity, ExecuteActionParams, InitiateConnectionParams};
pub use integrations::{Integrations, NewIntegration};
pub use llm::{AssistantEventStream, AssistantsApi, CancelHandle, OpenAiClient};
pub use toolset::{OpenAiToolSet, ToolFilters};
