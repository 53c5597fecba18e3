//! HTTP client shared by every view of the admin frontend.
//!
//! All outbound calls go through [`HttpClient::send`]: it attaches the
//! session token, logs the call, classifies failures and hands exempt-area
//! 401s to the [`AuthFailureCoordinator`].

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::auth::{AuthFailureCoordinator, ExemptAreas, Settlement, TokenStore};
use crate::config::ClientConfig;
use crate::location::LocationProvider;
use crate::notify::Notifier;

use super::request::{ApiRequest, ApiResponse, OutboundRequest};
use super::transport::{ReqwestTransport, Transport, TransportError};
use super::{ApiError, ApiResult};

/// API client for the hospital backend.
/// Clone is cheap - every collaborator sits behind an Arc.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    location: Arc<dyn LocationProvider>,
    exempt: ExemptAreas,
    coordinator: Arc<AuthFailureCoordinator>,
}

impl HttpClient {
    /// Create a client that talks to the network through reqwest.
    pub fn new(
        config: &ClientConfig,
        tokens: Arc<dyn TokenStore>,
        location: Arc<dyn LocationProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> ApiResult<Self> {
        let transport = ReqwestTransport::new(config.timeout)
            .map_err(|e| ApiError::ClientSetup(e.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport), tokens, location, notifier))
    }

    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
        location: Arc<dyn LocationProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let coordinator =
            AuthFailureCoordinator::new(tokens.clone(), notifier, config.settle_window);
        Self::with_coordinator(config, transport, tokens, location, Arc::new(coordinator))
    }

    /// Use a pre-built coordinator, e.g. one carrying a real refresher.
    pub fn with_coordinator(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
        location: Arc<dyn LocationProvider>,
        coordinator: Arc<AuthFailureCoordinator>,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
            tokens,
            location,
            exempt: ExemptAreas::new(&config.exempt_areas),
            coordinator,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn coordinator(&self) -> &AuthFailureCoordinator {
        &self.coordinator
    }

    /// Absolute URL for a request path.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Send a request and settle it exactly once.
    ///
    /// A 401 on a request in an exempt area (by current page or by URL) is
    /// coordinated; everything else comes back exactly as the transport
    /// reported it.
    pub async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let err = match self.dispatch(&request, None).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if !err.is_auth_expired() {
            return Err(err);
        }

        let current_path = self.location.current_path();
        if !self.exempt.is_exempt(&current_path, &request.path) {
            return Err(err);
        }

        match self.coordinator.handle_auth_failure(&request).await {
            Settlement::Reject => Err(err),
            Settlement::RefreshFailed(reason) => Err(ApiError::RefreshFailed(reason)),
            Settlement::Replay(token) => {
                let mut replay = request;
                replay.mark_retried();
                debug!(
                    method = %replay.method,
                    path = %replay.path,
                    "Replaying request with refreshed token"
                );
                self.dispatch(&replay, Some(&token)).await
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.send(ApiRequest::patch(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> ApiResult<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    /// One trip over the wire: request hook, transport, response hook.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        token_override: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        let method = request.method.as_str();
        let path = request.path.as_str();
        let outbound = self.build_outbound(request, token_override)?;

        debug!(method, path, "API request");

        match self.transport.send(outbound).await {
            Ok(response) if response.status.is_success() => {
                debug!(status = response.status.as_u16(), method, path, "API response");
                Ok(response)
            }
            Ok(response) => {
                let body = String::from_utf8_lossy(&response.body);
                warn!(
                    status = response.status.as_u16(),
                    method,
                    path,
                    "API error response"
                );
                Err(ApiError::from_status(response.status, method, path, &body))
            }
            Err(TransportError::NoResponse(detail)) => {
                error!(method, path, error = %detail, "No response received");
                Err(ApiError::NetworkUnreachable {
                    method: method.to_string(),
                    path: path.to_string(),
                    detail,
                })
            }
            Err(TransportError::NotSent(detail)) => {
                error!(method, path, error = %detail, "Request setup failed");
                Err(ApiError::ClientSetup(detail))
            }
            Err(TransportError::BodyUnreadable { status, detail }) => {
                error!(
                    status = status.as_u16(),
                    method,
                    path,
                    error = %detail,
                    "Response body could not be read"
                );
                Err(ApiError::InvalidResponse(format!(
                    "{} {} answered {} but the body could not be read: {}",
                    method, path, status, detail
                )))
            }
        }
    }

    fn build_outbound(
        &self,
        request: &ApiRequest,
        token_override: Option<&str>,
    ) -> ApiResult<OutboundRequest> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }
        // Bodies are always encoded as JSON below.
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let token = match token_override {
            Some(token) => Some(token.to_string()),
            None => self.tokens.token(),
        };
        match token {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ApiError::ClientSetup(format!("Invalid session token: {}", e)))?;
                headers.insert(header::AUTHORIZATION, value);
            }
            None => {
                // Callers cannot smuggle credentials past an empty session.
                headers.remove(header::AUTHORIZATION);
            }
        }

        let body = request
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| ApiError::ClientSetup(format!("Failed to encode body: {}", e)))?;

        Ok(OutboundRequest {
            method: request.method.clone(),
            url: self.url_for(&request.path),
            headers,
            body,
        })
    }
}
