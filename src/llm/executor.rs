//! Tool call execution
//!
//! Runs the actions the model asked for on behalf of an [`Entity`] and
//! packages the results the way the provider expects them back.

use super::types::{ChatCompletion, ToolCall, ToolOutput};
use crate::core::{Result, ValidationError};
use crate::entity::{Entity, ExecuteActionParams};
use futures::future::try_join_all;
use serde_json::Value;
use tracing::debug;

/// Decode the JSON-encoded arguments of a tool call
pub fn parse_arguments(tool_call: &ToolCall) -> Result<Value> {
    let raw = tool_call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| {
        ValidationError::single(
            "function.arguments",
            format!("invalid JSON for {}: {}", tool_call.function.name, e),
        )
        .into()
    })
}

/// Execute one tool call and return its JSON-encoded result
pub async fn execute_tool_call(entity: &Entity, tool_call: &ToolCall) -> Result<String> {
    let arguments = parse_arguments(tool_call)?;
    debug!(
        "executing tool call {} ({}) with arguments {}",
        tool_call.id, tool_call.function.name, tool_call.function.arguments
    );
    let result = entity
        .execute(ExecuteActionParams::new(&tool_call.function.name).params(arguments))
        .await?;
    debug!("tool call {} returned {}", tool_call.id, result);
    Ok(serde_json::to_string(&result)?)
}

/// Execute the tool calls of every choice, in choice order
///
/// All tool calls of a message run, one after another.
pub async fn handle_tool_call(entity: &Entity, completion: &ChatCompletion) -> Result<Vec<String>> {
    let mut outputs = Vec::new();
    for choice in &completion.choices {
        let Some(tool_calls) = &choice.message.tool_calls else {
            continue;
        };
        for tool_call in tool_calls {
            outputs.push(execute_tool_call(entity, tool_call).await?);
        }
    }
    Ok(outputs)
}

/// Execute a batch of tool calls concurrently
///
/// Outputs keep the order of `tool_calls`. The first failure aborts the batch.
pub async fn execute_tool_calls(entity: &Entity, tool_calls: &[ToolCall]) -> Result<Vec<ToolOutput>> {
    try_join_all(tool_calls.iter().map(|tool_call| async move {
        let output = execute_tool_call(entity, tool_call).await?;
        Ok::<_, crate::core::SdkError>(ToolOutput {
            tool_call_id: tool_call.id.clone(),
            output,
        })
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{App, ConnectedAccount};
    use crate::core::ErrorKind;
    use crate::llm::types::{ChatMessage, Choice};
    use crate::testing::{weather_backend, StubBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn completion(messages: Vec<Option<Vec<ToolCall>>>) -> ChatCompletion {
        ChatCompletion {
            id: "chatcmpl_1".to_string(),
            choices: messages
                .into_iter()
                .enumerate()
                .map(|(index, tool_calls)| Choice {
                    index: index as u32,
                    message: ChatMessage {
                        role: "assistant".to_string(),
                        content: None,
                        tool_calls,
                    },
                    finish_reason: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_parse_arguments_rejects_malformed_json() {
        let call = ToolCall::new("call_1", "WEATHER_NOW", "{\"city\": ");
        let err = parse_arguments(&call).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_parse_arguments_empty_is_object() {
        let call = ToolCall::new("call_1", "WEATHER_NOW", "");
        assert_eq!(parse_arguments(&call).unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_result_is_stringified_once() {
        let entity = Entity::new(weather_backend(), "default");
        let output = execute_tool_call(
            &entity,
            &ToolCall::new("call_1", "WEATHER_NOW", "{\"city\":\"Oslo\"}"),
        )
        .await
        .unwrap();
        assert_eq!(output, "{\"temp\":21}");
    }

    #[tokio::test]
    async fn test_handle_tool_call_skips_choices_without_calls() {
        let entity = Entity::new(weather_backend(), "default");
        let completion = completion(vec![
            Some(vec![ToolCall::new("call_1", "WEATHER_NOW", "{}")]),
            None,
        ]);
        let outputs = handle_tool_call(&entity, &completion).await.unwrap();
        assert_eq!(outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_tool_call_runs_every_call_in_order() {
        let backend = weather_backend();
        let entity = Entity::new(backend.clone(), "default");
        let completion = completion(vec![Some(vec![
            ToolCall::new("call_1", "WEATHER_TOMORROW", "{}"),
            ToolCall::new("call_2", "WEATHER_NOW", "{}"),
        ])]);

        let outputs = handle_tool_call(&entity, &completion).await.unwrap();
        assert_eq!(outputs, vec!["{\"temp\":17}", "{\"temp\":21}"]);
        let names: Vec<_> = backend.executions().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["WEATHER_TOMORROW", "WEATHER_NOW"]);
    }

    #[tokio::test]
    async fn test_batch_outputs_are_keyed_by_call_id() {
        let entity = Entity::new(weather_backend(), "default");
        let outputs = execute_tool_calls(
            &entity,
            &[
                ToolCall::new("call_a", "WEATHER_NOW", "{}"),
                ToolCall::new("call_b", "WEATHER_TOMORROW", "{}"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(outputs[0].tool_call_id, "call_a");
        assert_eq!(outputs[0].output, "{\"temp\":21}");
        assert_eq!(outputs[1].tool_call_id, "call_b");
    }

    #[tokio::test]
    async fn test_batch_fails_when_any_call_fails() {
        let backend = Arc::new(
            StubBackend::new()
                .with_app(App {
                    key: "github".to_string(),
                    ..Default::default()
                })
                .with_action(
                    serde_json::from_value(json!({"name": "GITHUB_STAR_REPO", "appKey": "github"}))
                        .unwrap(),
                )
                .with_account(
                    "someone_else",
                    ConnectedAccount {
                        id: "ca_1".to_string(),
                        app_name: "github".to_string(),
                        status: "ACTIVE".to_string(),
                        ..Default::default()
                    },
                ),
        );
        let entity = Entity::new(backend, "default");

        let err = execute_tool_calls(
            &entity,
            &[ToolCall::new("call_a", "GITHUB_STAR_REPO", "{}")],
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
