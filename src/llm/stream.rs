//! Streaming assistant runs
//!
//! [`AssistantEventStream`] re-emits the provider's run events unchanged while
//! a background driver answers `requires_action` events. Once the upstream
//! ends without a terminal event the driver falls back to polling.

use super::client::{AssistantsApi, EventStream};
use super::executor::execute_tool_calls;
use super::poller::wait_for_run;
use super::types::{AssistantStreamEvent, Run, EVENT_RUN_CREATED, EVENT_RUN_REQUIRES_ACTION};
use crate::config::PollPolicy;
use crate::core::{ErrorCode, Result, SdkError};
use crate::entity::Entity;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const EVENT_BUFFER: usize = 32;

/// Stops a running [`AssistantEventStream`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Everything the driver task owns
pub(crate) struct StreamDriver {
    pub api: Arc<dyn AssistantsApi>,
    pub entity: Entity,
    pub upstream: EventStream,
    pub thread_id: String,
    pub policy: PollPolicy,
}

/// Events of a streamed run, with tool calls answered in the background
///
/// Dropping the stream cancels the driver.
pub struct AssistantEventStream {
    events: ReceiverStream<Result<AssistantStreamEvent>>,
    cancel: CancelHandle,
    driver: Option<JoinHandle<Result<Option<Run>>>>,
}

impl AssistantEventStream {
    /// Spawn the driver on the current tokio runtime
    pub(crate) fn spawn(driver: StreamDriver) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let result = drive(driver, &tx, &task_token).await;
            if let Err(err) = &result {
                let _ = tx.send(Err(err.clone())).await;
            }
            result
        });
        Self {
            events: ReceiverStream::new(rx),
            cancel: CancelHandle { token },
            driver: Some(handle),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Stop consuming events and wait for the driver.
    ///
    /// Returns the final run, or the last run seen when cancelled.
    pub async fn finish(mut self) -> Result<Option<Run>> {
        self.events.close();
        let Some(handle) = self.driver.take() else {
            return Ok(None);
        };
        handle
            .await
            .map_err(|e| SdkError::unknown(format!("stream driver task failed: {}", e)))?
    }
}

impl Stream for AssistantEventStream {
    type Item = Result<AssistantStreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for AssistantEventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive(
    driver: StreamDriver,
    tx: &mpsc::Sender<Result<AssistantStreamEvent>>,
    token: &CancellationToken,
) -> Result<Option<Run>> {
    let StreamDriver {
        api,
        entity,
        mut upstream,
        thread_id,
        policy,
    } = driver;

    let mut run_id: Option<String> = None;
    let mut last_run: Option<Run> = None;
    let mut terminal = false;

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => {
                debug!("stream for thread {} cancelled", thread_id);
                return Ok(last_run);
            }
            next = upstream.next() => next,
        };
        let Some(event) = next else {
            break;
        };
        let event = event?;
        // A closed receiver only means nobody is reading; the run still needs answers.
        let _ = tx.send(Ok(event.clone())).await;

        let run = event.run();
        if event.event == EVENT_RUN_CREATED {
            if let Some(run) = &run {
                run_id = Some(run.id.clone());
            }
        }
        if run.is_some() {
            last_run = run;
        }
        let Some(id) = run_id.as_deref() else {
            continue;
        };

        if event.event == EVENT_RUN_REQUIRES_ACTION {
            if let Some(run) = &last_run {
                let outputs = execute_tool_calls(&entity, run.pending_tool_calls()).await?;
                debug!("submitting {} tool output(s) for streamed run {}", outputs.len(), id);
                api.submit_tool_outputs(&thread_id, id, &outputs).await?;
            }
        }

        if event.is_terminal() {
            terminal = true;
            break;
        }
    }

    let Some(run_id) = run_id else {
        return Err(SdkError::upstream(
            ErrorCode::NoRunId,
            None,
            "No run ID found",
        ));
    };

    if terminal && last_run.as_ref().is_some_and(|run| !run.status.is_active()) {
        return Ok(last_run);
    }

    debug!("stream ended before run {} finished, polling", run_id);
    tokio::select! {
        _ = token.cancelled() => {
            debug!("polling of run {} cancelled", run_id);
            Ok(last_run)
        }
        result = poll_remaining(api.as_ref(), &entity, &thread_id, &run_id, &policy) => result.map(Some),
    }
}

async fn poll_remaining(
    api: &dyn AssistantsApi,
    entity: &Entity,
    thread_id: &str,
    run_id: &str,
    policy: &PollPolicy,
) -> Result<Run> {
    let run = api.retrieve_run(thread_id, run_id).await?;
    wait_for_run(api, entity, run, thread_id, policy).await
}
