//! Push-notification HTTP layer.
//!
//! `POST /webhook` accepts GitHub push events. An activity token is taken
//! before anything else is read, so a request is either refused with 503
//! while a reconfiguration drains, or sees only post-reload settings.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use deployer_core::RepoName;

use crate::state::AgentState;

type HmacSha256 = Hmac<Sha256>;

const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: PushRepository,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    html_url: String,
}

pub fn router(state: AgentState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/webhook", post(receive_push))
        .with_state(state)
}

async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to deployer!" }))
}

async fn receive_push(
    State(state): State<AgentState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let event = header_str(&headers, EVENT_HEADER).unwrap_or_default();
    if event != "push" {
        tracing::debug!(event, "ignoring webhook event");
        return reply(StatusCode::OK, "ignored");
    }

    let Some(token) = state.barrier.try_acquire() else {
        tracing::info!("webhook refused while reconfiguring");
        return reply(StatusCode::SERVICE_UNAVAILABLE, "reconfiguring, retry later");
    };

    let secrets = state.secrets.load().await;
    if let Some(secret) = secrets.webhook_secret.as_deref() {
        if !verify_signature(secret.as_bytes(), &body, header_str(&headers, SIGNATURE_HEADER)) {
            tracing::warn!("webhook signature rejected");
            return reply(StatusCode::UNAUTHORIZED, "invalid signature");
        }
    }

    let push: PushEvent = match serde_json::from_slice(&body) {
        Ok(push) => push,
        Err(err) => {
            return reply(StatusCode::BAD_REQUEST, &format!("invalid push payload: {err}"));
        }
    };

    let snapshot = state.settings.load().await;
    let Some((name, repo)) = snapshot.find_by_url(&push.repository.html_url) else {
        tracing::info!(url = %push.repository.html_url, "push for unconfigured repository");
        return reply(StatusCode::OK, "repository not configured");
    };
    let branch = push
        .git_ref
        .strip_prefix("refs/heads/")
        .unwrap_or(&push.git_ref);
    if branch != repo.branch {
        tracing::debug!(repo = %name, branch, "push for untracked branch");
        return reply(StatusCode::OK, "branch not tracked");
    }

    let name: RepoName = name.clone();
    tracing::info!(repo = %name, branch, "push accepted");
    let deployer = state.deployer.clone();
    tokio::spawn(async move {
        let _token = token;
        deployer.deploy(snapshot, &name).await;
    });
    reply(StatusCode::ACCEPTED, "deployment started")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn reply(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message })))
}

/// `sha256=<hex>` signature of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of an `X-Hub-Signature-256` header value.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> bool {
    let Some(encoded) = header.and_then(|value| value.strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };
    let Ok(expected) = hex::decode(encoded) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
