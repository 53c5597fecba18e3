//! The wire behind [`HttpClient`](super::HttpClient).

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use super::request::{ApiResponse, OutboundRequest};

/// Failure to get a complete response off the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Sent, but no response arrived (refused connection, DNS, timeout).
    #[error("no response: {0}")]
    NoResponse(String),
    /// Never left the process (invalid URL, unbuildable request).
    #[error("{0}")]
    NotSent(String),
    /// The server answered with `status`, then the body broke off.
    #[error("{status} with unreadable body: {detail}")]
    BodyUnreadable { status: StatusCode, detail: String },
}

pub trait Transport: Send + Sync {
    fn send(&self, request: OutboundRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>>;
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::NotSent(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn classify(err: reqwest::Error) -> TransportError {
        if err.is_builder() {
            TransportError::NotSent(err.to_string())
        } else {
            TransportError::NoResponse(err.to_string())
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: OutboundRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(Self::classify)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::BodyUnreadable {
                    status,
                    detail: e.to_string(),
                })?;

            Ok(ApiResponse {
                status,
                headers,
                body: body.to_vec(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use reqwest::Method;

    #[tokio::test]
    async fn test_invalid_url_is_never_sent() {
        let transport = ReqwestTransport::new(Duration::from_secs(1)).expect("client builds");
        let result = transport
            .send(OutboundRequest {
                method: Method::GET,
                url: "not a url".to_string(),
                headers: HeaderMap::new(),
                body: None,
            })
            .await;
        assert!(matches!(result, Err(TransportError::NotSent(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_has_no_response() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).expect("client builds");
        // Port 9 (discard) is closed on test machines.
        let result = transport
            .send(OutboundRequest {
                method: Method::GET,
                url: "http://127.0.0.1:9/api/patients".to_string(),
                headers: HeaderMap::new(),
                body: None,
            })
            .await;
        assert!(matches!(result, Err(TransportError::NoResponse(_))));
    }
}
