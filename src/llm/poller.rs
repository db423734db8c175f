//! Assistant run polling loop

use super::client::AssistantsApi;
use super::executor::execute_tool_calls;
use super::types::{Run, RunStatus};
use crate::config::PollPolicy;
use crate::core::{ErrorCode, Result, SdkError};
use crate::entity::Entity;
use tracing::debug;

/// Drive `run` until it leaves the polling set.
///
/// On `requires_action` the pending tool calls are executed and submitted and
/// the returned run becomes the new state. Otherwise the loop sleeps for the
/// policy interval and re-fetches. Returns the final run.
pub async fn wait_for_run(
    api: &dyn AssistantsApi,
    entity: &Entity,
    run: Run,
    thread_id: &str,
    policy: &PollPolicy,
) -> Result<Run> {
    let mut budget = policy.budget();
    let mut run = run;

    while run.status.is_active() {
        if !budget.try_consume() {
            return Err(SdkError::upstream(
                ErrorCode::PollLimitExceeded,
                None,
                format!(
                    "Run {} still {} after {} poll attempt(s)",
                    run.id,
                    run.status,
                    budget.attempts()
                ),
            ));
        }
        debug!("run {} status: {}", run.id, run.status);

        if run.status == RunStatus::RequiresAction {
            let outputs = execute_tool_calls(entity, run.pending_tool_calls()).await?;
            debug!(
                "submitting {} tool output(s) for run {} in thread {}",
                outputs.len(),
                run.id,
                thread_id
            );
            run = api.submit_tool_outputs(thread_id, &run.id, &outputs).await?;
        } else {
            tokio::time::sleep(policy.interval).await;
            run = api.retrieve_run(thread_id, &run.id).await?;
        }
    }

    debug!("run {} finished with status {}", run.id, run.status);
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run_with_status, requires_action_run, weather_backend, StubAssistants};
    use std::time::Duration;

    fn fast() -> PollPolicy {
        PollPolicy::default().with_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_single_submission_then_complete() {
        let assistants = StubAssistants::new()
            .after_submit(run_with_status("run_1", RunStatus::Completed));
        let entity = Entity::new(weather_backend(), "default");

        let run = wait_for_run(
            &assistants,
            &entity,
            requires_action_run("run_1", &[("call_1", "WEATHER_NOW", "{}")]),
            "thread_1",
            &fast(),
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        let submissions = assistants.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, "thread_1");
        assert_eq!(submissions[0].1, "run_1");
        assert_eq!(submissions[0].2[0].tool_call_id, "call_1");
        assert_eq!(submissions[0].2[0].output, "{\"temp\":21}");
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let assistants = StubAssistants::new()
            .then_retrieve(run_with_status("run_1", RunStatus::InProgress))
            .then_retrieve(run_with_status("run_1", RunStatus::Completed));
        let entity = Entity::new(weather_backend(), "default");

        let run = wait_for_run(
            &assistants,
            &entity,
            run_with_status("run_1", RunStatus::Queued),
            "thread_1",
            &fast(),
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(assistants.retrievals(), 2);
        assert!(assistants.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_run_is_returned_untouched() {
        let assistants = StubAssistants::new();
        let entity = Entity::new(weather_backend(), "default");

        let run = wait_for_run(
            &assistants,
            &entity,
            run_with_status("run_1", RunStatus::Failed),
            "thread_1",
            &fast(),
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(assistants.retrievals(), 0);
    }

    #[tokio::test]
    async fn test_max_attempts_stops_polling() {
        let assistants = StubAssistants::new().always_retrieve(RunStatus::InProgress);
        let entity = Entity::new(weather_backend(), "default");

        let err = wait_for_run(
            &assistants,
            &entity,
            run_with_status("run_1", RunStatus::Queued),
            "thread_1",
            &fast().with_max_attempts(3),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::PollLimitExceeded);
        assert!(err.to_string().contains("in_progress"));
        assert_eq!(assistants.retrievals(), 3);
    }

    #[tokio::test]
    async fn test_tool_failure_aborts_without_submitting() {
        let assistants = StubAssistants::new();
        let entity = Entity::new(weather_backend(), "default");

        let err = wait_for_run(
            &assistants,
            &entity,
            requires_action_run("run_1", &[("call_1", "NOT_AN_ACTION", "{}")]),
            "thread_1",
            &fast(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), crate::core::ErrorKind::NotFound);
        assert!(assistants.submissions().is_empty());
    }
}
