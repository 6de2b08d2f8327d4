use axum::http::HeaderMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::{self, Authenticator};
use crate::config::Settings;
use crate::error::GatewayError;
use crate::metrics::{GUARD_LATENCY, REQUEST_TOTAL};
use crate::rate_limit::{Admission, Policy, RateLimiterRegistry};

// app's shared state
pub struct AppState {
    pub settings: Arc<Settings>,
    pub authenticator: Authenticator,
    pub limiters: Arc<RateLimiterRegistry>,
}

impl AppState {
    pub fn new(settings: Settings, limiters: Arc<RateLimiterRegistry>) -> Self {
        let authenticator = Authenticator::new(settings.api_key.clone());
        Self {
            settings: Arc::new(settings),
            authenticator,
            limiters,
        }
    }

    /// Authenticate, then admit under `policy` keyed by the caller's identity.
    pub fn guard(
        &self,
        policy: Policy,
        headers: &HeaderMap,
        remote: SocketAddr,
    ) -> Result<Admission, GatewayError> {
        REQUEST_TOTAL.inc();
        let timer = Instant::now();

        let result = self.authenticator.authenticate(headers).and_then(|key| {
            let identity = auth::resolve_identity(Some(&key), remote);
            self.limiters.check(policy, &identity).inspect_err(|_| {
                tracing::info!(
                    %policy,
                    identity = %auth::fingerprint(&identity),
                    "rate limit exceeded"
                );
            })
        });

        GUARD_LATENCY.observe(timer.elapsed().as_secs_f64());
        result
    }
}
