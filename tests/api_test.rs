//! HTTP tests: the router served on an ephemeral port over the memory store
//!
//! Run with: cargo test --test api_test

mod fixtures;
mod helpers;

use reqwest::{multipart, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use fixtures::*;
use helpers::*;
use invoice_workflow::error::{INVALID_LINK_MESSAGE, NOT_READY_MESSAGE};
use invoice_workflow::routes::internal::INTERNAL_KEY_HEADER;

async fn create_active_job(client: &reqwest::Client, base_url: &str) -> Value {
    let response = client
        .post(format!("{}/internal/jobs", base_url))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({
            "campaign_id": Uuid::new_v4(),
            "provider_id": Uuid::new_v4(),
            "manager_id": Uuid::new_v4(),
            "status": "active",
            "currency": "eur",
            "due_date": null,
        }))
        .send()
        .await
        .expect("Create job request failed");
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.unwrap()
}

async fn post_transition(client: &reqwest::Client, base_url: &str, job_id: &str, command: &str) {
    let response = client
        .post(format!("{}/internal/jobs/{}/transitions", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({ "command": command }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "{command} failed");
}

fn invoice_form(file_name: &str, data: &[u8]) -> multipart::Form {
    multipart::Form::new().part(
        "file",
        multipart::Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .unwrap(),
    )
}

/// Active job with contacts, moved to `pending_invoice`. Returns its id and
/// the emailed upload token.
async fn job_awaiting_invoice(
    harness: &Harness,
    client: &reqwest::Client,
    base_url: &str,
) -> (String, String) {
    let job = create_active_job(client, base_url).await;
    let job_id = job["id"].as_str().unwrap().to_string();
    harness
        .store
        .set_contacts(job_id.parse().unwrap(), contacts());
    post_transition(client, base_url, &job_id, "request_invoice").await;
    let token = harness.mailer.last_token_for(PROVIDER_EMAIL);
    (job_id, token)
}

#[tokio::test]
async fn health_reports_store_and_disabled_queue() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;

    let response = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["store"]["status"], "ok");
    assert_eq!(body["checks"]["retry_queue"]["status"], "disabled");

    harness.store.set_unavailable(true);
    let response = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn internal_routes_require_the_key() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/internal/jobs/{}", base_url, Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{}/internal/jobs/{}", base_url, Uuid::new_v4()))
        .header(INTERNAL_KEY_HEADER, "guess")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{}/internal/jobs/{}", base_url, Uuid::new_v4()))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provider_and_payer_complete_the_workflow_over_http() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();

    let job = create_active_job(&client, &base_url).await;
    assert_eq!(job["status"], "active");
    assert_eq!(job["currency"], "EUR");
    let job_id = job["id"].as_str().unwrap().to_string();
    harness.store.set_contacts(job_id.parse().unwrap(), contacts());

    let response = client
        .post(format!("{}/internal/jobs/{}/line-items", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({
            "client_id": Uuid::new_v4(),
            "campaign_id": Uuid::new_v4(),
            "job_type_id": Uuid::new_v4(),
            "manager_id": Uuid::new_v4(),
            "provider_id": Uuid::new_v4(),
            "period_year": 2026,
            "period_month": 4,
            "value_cents": 98_000,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    post_transition(&client, &base_url, &job_id, "request_invoice").await;
    let upload_token = harness.mailer.last_token_for(PROVIDER_EMAIL);

    // The upload page checks the link before rendering.
    let access: Value = client
        .get(format!("{}/api/v1/public/jobs/{}/access", base_url, job_id))
        .query(&[("token", upload_token.as_str()), ("purpose", "upload")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(access["valid"], true);
    assert_eq!(access["job"]["status"], "pending_invoice");
    assert_eq!(access["job"]["value_cents"], 98_000);
    assert!(access["job"].get("private_notes").is_none());

    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/documents", base_url, job_id))
        .query(&[("token", upload_token.as_str())])
        .multipart(invoice_form("invoice.pdf", b"%PDF-1.7 invoice"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let upload: Value = response.json().await.unwrap();
    assert_eq!(upload["success"], true);
    assert_eq!(upload["file_urls"].as_array().unwrap().len(), 1);

    // Second use of the same link.
    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/documents", base_url, job_id))
        .query(&[("token", upload_token.as_str())])
        .multipart(invoice_form("invoice.pdf", b"%PDF-1.7 invoice"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], INVALID_LINK_MESSAGE);

    let payment_token = harness.mailer.last_token_for(FINANCE_EMAIL);
    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/payment", base_url, job_id))
        .json(&json!({ "token": payment_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    let detail: Value = client
        .get(format!("{}/internal/jobs/{}", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["job"]["status"], "paid");
    assert_eq!(detail["job"]["documents"].as_array().unwrap().len(), 1);
    assert_eq!(detail["line_items"][0]["status"], "closed");
}

#[tokio::test]
async fn token_can_be_sent_as_a_form_field() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();
    let (job_id, token) = job_awaiting_invoice(&harness, &client, &base_url).await;

    let form = invoice_form("invoice.pdf", b"%PDF-1").text("token", token);
    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/documents", base_url, job_id))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unusable_links_get_a_generic_answer() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();
    let (job_id, token) = job_awaiting_invoice(&harness, &client, &base_url).await;

    for (job, token, purpose) in [
        (job_id.clone(), "forged".to_string(), "upload"),
        (job_id.clone(), token.clone(), "payment"),
        (Uuid::new_v4().to_string(), token.clone(), "upload"),
    ] {
        let access: Value = client
            .get(format!("{}/api/v1/public/jobs/{}/access", base_url, job))
            .query(&[("token", token.as_str()), ("purpose", purpose)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(access["valid"], false);
        assert_eq!(access["reason"], "invalid_or_expired");
        assert!(access.get("job").is_none());
    }

    // Upload without any token.
    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/documents", base_url, job_id))
        .multipart(invoice_form("invoice.pdf", b"%PDF-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn payment_before_upload_is_a_conflict() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();
    let (job_id, token) = job_awaiting_invoice(&harness, &client, &base_url).await;

    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/payment", base_url, job_id))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], NOT_READY_MESSAGE);
    assert!(!body.to_string().contains("pending_invoice"));

    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/payment", base_url, job_id))
        .json(&json!({ "token": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_files_are_reported_by_name() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();
    let (job_id, token) = job_awaiting_invoice(&harness, &client, &base_url).await;
    harness.blobs.reject_payload(b"unstorable");

    let form = invoice_form("invoice.pdf", b"%PDF-1").part(
        "file",
        multipart::Part::bytes(b"unstorable".to_vec())
            .file_name("receipt.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/documents", base_url, job_id))
        .query(&[("token", token.as_str())])
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["failed_files"], json!(["receipt.png"]));

    // An empty form is a client error and keeps the link alive.
    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/documents", base_url, job_id))
        .query(&[("token", token.as_str())])
        .multipart(multipart::Form::new().text("note", "nothing attached"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let access: Value = client
        .get(format!("{}/api/v1/public/jobs/{}/access", base_url, job_id))
        .query(&[("token", token.as_str()), ("purpose", "upload")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(access["valid"], true);
}

#[tokio::test]
async fn internal_override_notify_and_token_routes() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();
    let (job_id, token) = job_awaiting_invoice(&harness, &client, &base_url).await;

    // Illegal internal command.
    let response = client
        .post(format!("{}/internal/jobs/{}/transitions", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({ "command": "activate" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/internal/jobs/{}/override", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({ "status": "pending_payment", "actor": "ops@agency", "reason": "paper invoice received" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job: Value = response.json().await.unwrap();
    assert_eq!(job["status"], "pending_payment");
    assert_eq!(harness.store.overrides().len(), 1);

    let response = client
        .post(format!("{}/internal/jobs/{}/override", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({ "status": "paid", "actor": "", "reason": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/internal/jobs/{}/notify", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({ "status": "pending_payment" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let notified: Value = response.json().await.unwrap();
    assert_eq!(notified["outcome"], "delivered");
    assert_ne!(harness.mailer.last_token_for(FINANCE_EMAIL), token);

    let response = client
        .post(format!("{}/internal/jobs/{}/tokens", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({ "purpose": "payment" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let issued: Value = response.json().await.unwrap();
    let link = issued["link"].as_str().unwrap();
    assert!(link.starts_with(&format!("{}/payment/{}?token=", PUBLIC_BASE_URL, job_id)));
    let secret = token_from_body(link);

    let response = client
        .delete(format!("{}/internal/jobs/{}/tokens", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .post(format!("{}/api/v1/public/jobs/{}/payment", base_url, job_id))
        .json(&json!({ "token": secret }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn jobs_cannot_be_created_mid_workflow() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/internal/jobs", base_url))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .json(&json!({
            "campaign_id": Uuid::new_v4(),
            "provider_id": Uuid::new_v4(),
            "manager_id": Uuid::new_v4(),
            "status": "paid",
            "currency": "EUR",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_line_item_is_a_bad_request() {
    let harness = Harness::new();
    let base_url = spawn_app(&harness).await;
    let client = reqwest::Client::new();
    let job = create_active_job(&client, &base_url).await;
    let job_id = job["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let response = client
            .post(format!("{}/internal/jobs/{}/line-items", base_url, job_id))
            .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
            .json(&json!({
                "client_id": Uuid::new_v4(),
                "campaign_id": Uuid::new_v4(),
                "job_type_id": Uuid::new_v4(),
                "manager_id": Uuid::new_v4(),
                "provider_id": Uuid::new_v4(),
                "period_year": 2026,
                "period_month": 4,
                "value_cents": i64::MAX,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let detail: Value = client
        .get(format!("{}/internal/jobs/{}", base_url, job_id))
        .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["job"]["value_cents"], 0);
}
