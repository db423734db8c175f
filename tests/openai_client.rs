use actlink::backend::HttpBackend;
use actlink::llm::{AssistantsApi, CreateRunRequest, OpenAiClient, RunStatus, ToolOutput};
use actlink::{OpenAiToolSet, PollPolicy};
use futures::StreamExt;
use reqwest::Client;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OpenAiClient {
    OpenAiClient::with_client(
        Client::new(),
        &server.uri(),
        SecretString::from("sk-test".to_string()),
    )
    .unwrap()
}

#[tokio::test]
async fn retrieve_run_sends_assistants_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("openai-beta", "assistants=v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "in_progress"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let run = client(&server).retrieve_run("thread_1", "run_1").await.unwrap();
    assert_eq!(run.status, RunStatus::InProgress);
}

#[tokio::test]
async fn submit_tool_outputs_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_json(json!({
            "tool_outputs": [{"tool_call_id": "call_1", "output": "{\"temp\":21}"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "status": "completed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let run = client(&server)
        .submit_tool_outputs(
            "thread_1",
            "run_1",
            &[ToolOutput {
                tool_call_id: "call_1".to_string(),
                output: "{\"temp\":21}".to_string(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

const RUN_EVENTS: &str = "event: thread.run.created\n\
data: {\"id\":\"run_1\",\"thread_id\":\"thread_1\",\"status\":\"queued\"}\n\
\n\
event: thread.run.requires_action\n\
data: {\"id\":\"run_1\",\"thread_id\":\"thread_1\",\"status\":\"requires_action\",\"required_action\":{\"type\":\"submit_tool_outputs\",\"submit_tool_outputs\":{\"tool_calls\":[{\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"WEATHER_NOW\",\"arguments\":\"{\\\"city\\\":\\\"Oslo\\\"}\"}}]}}}\n\
\n\
event: done\n\
data: [DONE]\n\
\n";

#[tokio::test]
async fn streamed_run_is_answered_end_to_end() {
    let llm = MockServer::start().await;
    let backend = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs"))
        .and(body_partial_json(json!({"assistant_id": "asst_1", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(RUN_EVENTS, "text/event-stream"))
        .expect(1)
        .mount(&llm)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_json(json!({
            "tool_outputs": [{"tool_call_id": "call_1", "output": "{\"temp\":21}"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "status": "queued"
        })))
        .expect(1)
        .mount(&llm)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "status": "completed"
        })))
        .mount(&llm)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/actions/WEATHER_NOW"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "WEATHER_NOW",
            "appKey": "weather"
        })))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/apps/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "weather",
            "yaml": {"no_auth": true}
        })))
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/actions/WEATHER_NOW/execute"))
        .and(body_json(json!({"input": {"city": "Oslo"}, "appName": "weather"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp": 21})))
        .expect(1)
        .mount(&backend)
        .await;

    let http_backend = HttpBackend::with_client(
        Client::new(),
        &backend.uri(),
        SecretString::from("test-key".to_string()),
    )
    .unwrap();
    let toolset = OpenAiToolSet::new(Arc::new(http_backend))
        .with_poll_policy(PollPolicy::default().with_interval(Duration::from_millis(5)));

    let llm_client = client(&llm);
    let upstream = llm_client
        .create_run_stream(
            "thread_1",
            &CreateRunRequest {
                assistant_id: "asst_1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut events =
        toolset.wait_and_handle_assistant_stream_tool_calls(Arc::new(llm_client), upstream, "thread_1", None);
    let mut names = Vec::new();
    while let Some(event) = events.next().await {
        names.push(event.unwrap().event);
    }
    let run = events.finish().await.unwrap().unwrap();

    assert_eq!(names, vec!["thread.run.created", "thread.run.requires_action"]);
    assert_eq!(run.status, RunStatus::Completed);
}
