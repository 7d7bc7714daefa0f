//! `/flow` dispatch against a mock executions API.

use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::{client, start_gateway_with, test_config, FixedAccessToken};
use identity_gateway::workflow::HttpWorkflowExecutor;

const WORKFLOW: &str = "projects/demo/locations/us-central1/workflows/ingest";

fn executor(api: &MockServer) -> Arc<HttpWorkflowExecutor> {
    Arc::new(HttpWorkflowExecutor::new(
        reqwest::Client::new(),
        format!("{}/v1", api.uri()),
        Arc::new(FixedAccessToken("ya29.workflow")),
    ))
}

async fn mount_executions(api: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/v1/{}/executions", WORKFLOW)))
        .and(header("authorization", "Bearer ya29.workflow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": format!("{}/executions/e-1", WORKFLOW),
            "state": "ACTIVE"
        })))
        .mount(api)
        .await;
}

fn sent_argument(request: &wiremock::Request) -> serde_json::Value {
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    serde_json::from_str(body["argument"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_flow_injects_cloud_trace_context() {
    let api = MockServer::start().await;
    mount_executions(&api).await;

    let mut config = test_config("http://127.0.0.1:9");
    config.workflow.workflow_id = Some(WORKFLOW.into());
    let gateway = start_gateway_with(config, None, executor(&api)).await;

    let response = client()
        .post(gateway.url("/flow"))
        .header("x-cloud-trace-context", "abc")
        .body("{\"a\":1}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "success");

    let received = api.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(
        sent_argument(&received[0]),
        serde_json::json!({"a": 1, "tracecontext": "abc"})
    );
}

#[tokio::test]
async fn test_flow_falls_back_to_traceparent() {
    let api = MockServer::start().await;
    mount_executions(&api).await;

    let mut config = test_config("http://127.0.0.1:9");
    config.workflow.workflow_id = Some(WORKFLOW.into());
    let gateway = start_gateway_with(config, None, executor(&api)).await;

    let traceparent = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
    let response = client()
        .post(gateway.url("/flow"))
        .header("traceparent", traceparent)
        .body("{\"order\":{\"id\":7}}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let received = api.received_requests().await.unwrap();
    assert_eq!(
        sent_argument(&received[0]),
        serde_json::json!({"order": {"id": 7}, "tracecontext": traceparent})
    );
}

#[tokio::test]
async fn test_flow_without_trace_passes_body_through() {
    let api = MockServer::start().await;
    mount_executions(&api).await;

    let mut config = test_config("http://127.0.0.1:9");
    config.workflow.workflow_id = Some(WORKFLOW.into());
    let gateway = start_gateway_with(config, None, executor(&api)).await;

    let response = client()
        .post(gateway.url("/flow"))
        .body("{\"a\": 1}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let received = api.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["argument"], "{\"a\": 1}");
}

#[tokio::test]
async fn test_flow_without_workflow_is_bad_gateway() {
    let api = MockServer::start().await;
    mount_executions(&api).await;

    let gateway = start_gateway_with(test_config("http://127.0.0.1:9"), None, executor(&api)).await;
    let response = client()
        .post(gateway.url("/flow"))
        .body("{\"a\":1}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    assert!(api.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_flow_api_failure_is_bad_gateway() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&api)
        .await;

    let mut config = test_config("http://127.0.0.1:9");
    config.workflow.workflow_id = Some(WORKFLOW.into());
    let gateway = start_gateway_with(config, None, executor(&api)).await;

    let response = client()
        .post(gateway.url("/flow"))
        .body("{\"a\":1}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("permission denied"));
}
