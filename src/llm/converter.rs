//! Action catalog to LLM function-tool conversion

use super::types::{ChatCompletionTool, FunctionDefinition};
use crate::backend::Action;

/// Convert an action into a function tool
///
/// The parameter schema is passed through untouched.
pub fn action_to_tool(action: &Action) -> ChatCompletionTool {
    ChatCompletionTool::function(FunctionDefinition {
        name: action.name.clone(),
        description: action.description.clone(),
        parameters: action.parameters.clone(),
    })
}

pub fn actions_to_tools(actions: &[Action]) -> Vec<ChatCompletionTool> {
    actions.iter().map(action_to_tool).collect()
}
