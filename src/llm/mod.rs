//! LLM integration
//!
//! Glue between the action catalog and OpenAI-compatible chat/assistants APIs.
//!
//! ## Features
//!
//! - **Tool conversion**: actions become function tools
//! - **Tool execution**: tool calls run as actions for an entity
//! - **Run polling**: assistant runs are driven until they stop needing input
//! - **Streaming**: streamed runs are re-emitted while tool calls are answered

pub mod client;
pub mod converter;
pub mod executor;
pub mod poller;
pub mod stream;
pub mod types;

// Re-export main types
pub use client::{AssistantsApi, CreateRunRequest, EventStream, OpenAiClient};
pub use converter::{action_to_tool, actions_to_tools};
pub use executor::{execute_tool_call, execute_tool_calls, handle_tool_call, parse_arguments};
pub use poller::wait_for_run;
pub use stream::{AssistantEventStream, CancelHandle};
pub use types::{
    AssistantStreamEvent, ChatCompletion, ChatCompletionTool, ChatMessage, Choice, FunctionCall,
    FunctionDefinition, RequiredAction, Run, RunStatus, ToolCall, ToolOutput,
};
