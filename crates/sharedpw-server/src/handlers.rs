use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    error::ShareError,
    reveal::{self, Revealed},
    store::Secret,
    AppState,
};

/// Largest accepted encoded payload.
pub const MAX_PAYLOAD_BYTES: usize = 1_048_576;

// ── IP extraction ────────────────────────────────────────────────────────────

fn extract_ip(headers: &HeaderMap, addr: &SocketAddr, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        if let Some(ip) = real_ip {
            return ip;
        }
    }
    addr.ip()
}

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Deposit ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    /// Encrypted payload, standard base64.
    pub secret: String,
    /// Lifetime in hours (1-72). Omitted means 72.
    pub hours: Option<i64>,
    /// Only allow reveals from the depositing address.
    #[serde(default)]
    pub bind_ip: bool,
    #[serde(default)]
    pub has_password: bool,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub iv: String,
    #[serde(default)]
    pub pw_tag: String,
    #[serde(default)]
    pub pw_iv: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub id: String,
    pub expire_at: i64,
}

pub async fn create_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<DepositRequest>,
) -> Response {
    if body.secret.is_empty() {
        return bad_request("secret must not be empty");
    }
    if body.secret.len() > MAX_PAYLOAD_BYTES {
        return bad_request("secret exceeds 1 MiB limit");
    }
    if STANDARD.decode(body.secret.as_bytes()).is_err() {
        return bad_request("secret must be standard base64");
    }

    let mut secret = match Secret::new() {
        Ok(s) => s,
        Err(e) => return share_error(e),
    };
    if let Some(hours) = body.hours {
        if let Err(e) = secret.set_timeout(hours) {
            return share_error(e);
        }
    }
    if body.bind_ip {
        secret.origin_ip = extract_ip(&headers, &addr, state.trust_proxy_headers).to_string();
    }
    secret.has_password = body.has_password;
    secret.hint = body.hint;
    secret.tag = body.tag;
    secret.iv = body.iv;
    secret.pw_tag = body.pw_tag;
    secret.pw_iv = body.pw_iv;

    match secret.save(state.gateway.as_ref(), body.secret) {
        Ok(()) => {
            info!(
                expire_at = secret.expire_at,
                bound = !secret.origin_ip.is_empty(),
                "audit: secret.create"
            );
            let resp = DepositResponse {
                id: secret.id.clone(),
                expire_at: secret.expire_at,
            };
            (StatusCode::CREATED, Json(resp)).into_response()
        }
        Err(e) => share_error(e),
    }
}

// ── Reveal ───────────────────────────────────────────────────────────────────

pub async fn get_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Response {
    let ip = extract_ip(&headers, &addr, state.trust_proxy_headers);
    match reveal::reveal(state.gateway.as_ref(), &id, ip, true) {
        Ok(revealed) => {
            info!("audit: secret.reveal");
            Json::<Revealed>(revealed).into_response()
        }
        Err(e) => share_error(e),
    }
}

// ── Existence check ──────────────────────────────────────────────────────────

pub async fn head_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Response {
    let ip = extract_ip(&headers, &addr, state.trust_proxy_headers);
    match reveal::reveal(state.gateway.as_ref(), &id, ip, false) {
        Ok(r) if r.exists => StatusCode::OK.into_response(),
        Ok(_) => share_error(ShareError::NotFound),
        Err(e) => share_error(e),
    }
}

// ── Error mapping ────────────────────────────────────────────────────────────

fn share_error(e: ShareError) -> Response {
    match e {
        ShareError::InvalidDuration(_) | ShareError::InvalidIdentifier => {
            bad_request(&e.to_string())
        }
        ShareError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not found or expired"})),
        )
            .into_response(),
        other => internal_error(other),
    }
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
}

fn internal_error(e: ShareError) -> Response {
    tracing::error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
