use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::models::AdmissionResponse;
use crate::rate_limit::Policy;
use crate::state::AppState;

// Guarded admission check for one endpoint family
pub async fn admit_handler(
    State(state): State<Arc<AppState>>,
    Path(policy): Path<Policy>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let admission = state.guard(policy, &headers, remote)?;

    let mut response = Json(AdmissionResponse {
        admitted: true,
        policy: policy.to_string(),
        remaining: admission.remaining,
    })
    .into_response();

    let h = response.headers_mut();
    h.insert("x-ratelimit-limit", HeaderValue::from(admission.limit));
    h.insert("x-ratelimit-remaining", HeaderValue::from(admission.remaining));
    Ok(response)
}
