use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use argus_model::AccountId;

use super::test_utils::{setup_test_server, test_config};

const ACCOUNT_HEADER: &str = "x-account-id";

async fn submit(
    server: &TestServer,
    account: &AccountId,
    scan_type: &str,
    target: &str,
) -> axum_test::TestResponse {
    server
        .post("/api/v1/scan")
        .add_header(ACCOUNT_HEADER, account.to_string())
        .json(&json!({ "scan_type": scan_type, "target": target }))
        .await
}

async fn poll_until_terminal(
    server: &TestServer,
    account: &AccountId,
    task_id: &str,
) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = server
            .get(&format!("/api/v1/scan/{task_id}"))
        .add_header(ACCOUNT_HEADER, account.to_string())
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        let status = body["status"].as_str().unwrap().to_string();
        if status == "SUCCESS" || status == "FAILURE" {
            return body;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} did not reach a terminal state, last: {status}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn submit_without_identity_is_unauthorized() {
    let (server, _, _) = setup_test_server(test_config());
    let response = server
        .post("/api/v1/scan")
        .json(&json!({ "scan_type": "echo", "target": "example.com" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_identity_is_unauthorized() {
    let (server, _, _) = setup_test_server(test_config());
    let response = server
        .post("/api/v1/scan")
        .add_header(ACCOUNT_HEADER, "not-a-uuid")
        .json(&json!({ "scan_type": "echo", "target": "example.com" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_account_is_unauthorized() {
    let (server, _, _) = setup_test_server(test_config());
    let stranger = AccountId::new();
    let response = submit(&server, &stranger, "echo", "example.com").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submit_then_poll_to_success() {
    let (server, _, account) = setup_test_server(test_config());

    let response = submit(&server, &account, "echo", "example.com").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["cost"], 5);
    assert_eq!(body["credits_remaining"], 45);
    assert_eq!(body["scan_type"], "echo");
    assert_eq!(body["target"], "example.com");
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let terminal = poll_until_terminal(&server, &account, &task_id).await;
    assert_eq!(terminal["status"], "SUCCESS");
    assert_eq!(terminal["result"]["target"], "example.com");
    assert!(terminal.get("error").is_none());
}

#[tokio::test]
async fn transient_failures_surface_retry_counts() {
    let (server, _, account) = setup_test_server(test_config());

    let response = submit(&server, &account, "flaky", "example.com").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let task_id = response.json::<Value>()["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    let terminal = poll_until_terminal(&server, &account, &task_id).await;
    assert_eq!(terminal["status"], "SUCCESS");
    assert_eq!(terminal["retry_count"], 2);
}

#[tokio::test]
async fn insufficient_credits_is_402_with_accounting_headers() {
    let (server, state, _) = setup_test_server(test_config());
    let poor = AccountId::new();
    state.ledger.open_account(poor, 4, true);

    let response = submit(&server, &poor, "echo", "example.com").await;
    assert_eq!(response.status_code(), StatusCode::PAYMENT_REQUIRED);

    let headers = response.headers();
    assert_eq!(headers.get("x-credits-required").unwrap(), "5");
    assert_eq!(headers.get("x-credits-available").unwrap(), "4");
    assert_eq!(headers.get("x-credits-shortfall").unwrap(), "1");

    let body: Value = response.json();
    assert_eq!(body["error"]["detail"]["required"], 5);
    assert_eq!(body["error"]["detail"]["available"], 4);
    assert_eq!(body["error"]["detail"]["shortfall"], 1);
}

#[tokio::test]
async fn repeated_submissions_cannot_overspend() {
    let (server, state, _) = setup_test_server(test_config());
    let account = AccountId::new();
    state.ledger.open_account(account, 10, true);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        // The ledger serializes reservations; three back-to-back submits
        // see 10 -> 5 -> rejected.
        let response = submit(&server, &account, "echo", "example.com").await;
        statuses.push(response.status_code());
    }

    let admitted = statuses
        .iter()
        .filter(|status| **status == StatusCode::OK)
        .count();
    let rejected = statuses
        .iter()
        .filter(|status| **status == StatusCode::PAYMENT_REQUIRED)
        .count();
    assert_eq!(admitted, 2);
    assert_eq!(rejected, 1);
    assert_eq!(state.ledger.account(&account).unwrap().credits, 0);
}

#[tokio::test]
async fn inactive_account_is_forbidden() {
    let (server, state, _) = setup_test_server(test_config());
    let dormant = AccountId::new();
    state.ledger.open_account(dormant, 50, false);

    let response = submit(&server, &dormant, "echo", "example.com").await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(state.ledger.account(&dormant).unwrap().credits, 50);
}

#[tokio::test]
async fn unknown_scan_type_is_unprocessable_and_uncharged() {
    let (server, state, account) = setup_test_server(test_config());

    let response = submit(&server, &account, "nmap", "example.com").await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(state.ledger.account(&account).unwrap().credits, 50);
}

#[tokio::test]
async fn empty_target_is_unprocessable() {
    let (server, state, account) = setup_test_server(test_config());

    let response = submit(&server, &account, "echo", "   ").await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(state.ledger.account(&account).unwrap().credits, 50);
}

#[tokio::test]
async fn rate_limit_is_429_with_retry_after() {
    let mut config = test_config();
    config.admission.rate_limit = 2;
    let (server, state, account) = setup_test_server(config);

    for _ in 0..2 {
        let response = submit(&server, &account, "echo", "example.com").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let limited = submit(&server, &account, "echo", "example.com").await;
    assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().get("retry-after").is_some());

    // Only the two admitted submissions were charged.
    assert_eq!(state.ledger.account(&account).unwrap().credits, 40);
}

#[tokio::test]
async fn poll_of_unknown_task_is_not_found() {
    let (server, _, account) = setup_test_server(test_config());
    let response = server
        .get(&format!("/api/v1/scan/{}", uuid::Uuid::new_v4()))
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_of_queued_task_acknowledges() {
    let mut config = test_config();
    // No workers: the task stays queued so cancellation races nothing.
    config.dispatcher.workers = 0;
    let (server, _, account) = setup_test_server(config);

    let response = submit(&server, &account, "echo", "example.com").await;
    let task_id = response.json::<Value>()["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    let cancel = server
        .post(&format!("/api/v1/scan/{task_id}/cancel"))
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await;
    assert_eq!(cancel.status_code(), StatusCode::OK);
    let body: Value = cancel.json();
    assert_eq!(body["status"], "CANCELLING");

    let status = server
        .get(&format!("/api/v1/scan/{task_id}"))
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await;
    let view: Value = status.json();
    assert_eq!(view["status"], "PENDING");
    assert_eq!(view["progress"], "Cancellation requested");
}

#[tokio::test]
async fn cancel_of_terminal_task_conflicts() {
    let (server, _, account) = setup_test_server(test_config());

    let response = submit(&server, &account, "echo", "example.com").await;
    let task_id = response.json::<Value>()["task_id"]
        .as_str()
        .unwrap()
        .to_string();
    poll_until_terminal(&server, &account, &task_id).await;

    let cancel = server
        .post(&format!("/api/v1/scan/{task_id}/cancel"))
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await;
    assert_eq!(cancel.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancel_of_unknown_task_is_not_found() {
    let (server, _, account) = setup_test_server(test_config());
    let response = server
        .post(&format!("/api/v1/scan/{}/cancel", uuid::Uuid::new_v4()))
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn collectors_listing_is_sorted_with_costs() {
    let (server, _, account) = setup_test_server(test_config());
    let response = server
        .get("/api/v1/collectors")
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let listing: Vec<Value> = response.json();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0]["scan_type"], "echo");
    assert_eq!(listing[0]["cost"], 5);
    assert_eq!(listing[1]["scan_type"], "flaky");
}

#[tokio::test]
async fn credits_endpoint_reflects_spend() {
    let (server, _, account) = setup_test_server(test_config());

    let before: Value = server
        .get("/api/v1/credits")
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await
        .json();
    assert_eq!(before["credits"], 50);
    assert_eq!(before["active"], true);

    submit(&server, &account, "echo", "example.com").await;

    let after: Value = server
        .get("/api/v1/credits")
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await
        .json();
    assert_eq!(after["credits"], 45);
}

#[tokio::test]
async fn history_lists_recent_tasks_newest_first() {
    let (server, _, account) = setup_test_server(test_config());

    let first = submit(&server, &account, "echo", "first.example").await;
    let first_id = first.json::<Value>()["task_id"].as_str().unwrap().to_string();
    let second = submit(&server, &account, "echo", "second.example").await;
    let second_id =
        second.json::<Value>()["task_id"].as_str().unwrap().to_string();

    let history: Vec<Value> = server
        .get("/api/v1/history")
        .add_header(ACCOUNT_HEADER, account.to_string())
        .await
        .json();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["task_id"], second_id.as_str());
    assert_eq!(history[1]["task_id"], first_id.as_str());
}

#[tokio::test]
async fn history_is_scoped_to_the_calling_account() {
    let (server, state, account) = setup_test_server(test_config());
    let other = AccountId::new();
    state.ledger.open_account(other, 50, true);

    submit(&server, &account, "echo", "mine.example").await;

    let history: Vec<Value> = server
        .get("/api/v1/history")
        .add_header(ACCOUNT_HEADER, other.to_string())
        .await
        .json();
    assert!(history.is_empty());
}

#[tokio::test]
async fn health_reports_pool_shape() {
    let (server, _, _) = setup_test_server(test_config());
    let response = server.get("/api/v1/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["workers"], 2);
}

#[tokio::test]
async fn push_and_poll_agree_after_terminal() {
    let (server, state, account) = setup_test_server(test_config());

    // Subscribe through the notifier the way the websocket layer does.
    let response = submit(&server, &account, "echo", "example.com").await;
    let body: Value = response.json();
    let task_id = body["task_id"].as_str().unwrap().to_string();
    let id: argus_model::TaskId = task_id.parse().unwrap();
    let mut rx = state.notifier.subscribe(id);

    let polled = poll_until_terminal(&server, &account, &task_id).await;

    // Drain pushes until the stream closes on the terminal event.
    let mut last_push = None;
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(event)) => last_push = Some(event),
            Ok(Err(_)) => break,
            Err(_) => break,
        }
    }

    if let Some(push) = last_push {
        assert_eq!(push.task.status.to_string(), polled["status"]);
        assert_eq!(
            serde_json::to_value(&push.task.result).unwrap(),
            polled.get("result").cloned().unwrap_or(Value::Null)
        );
    }
}
