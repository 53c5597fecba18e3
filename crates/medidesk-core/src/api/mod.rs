//! REST API client module for the hospital backend.
//!
//! This module provides the `HttpClient` every view uses to reach the
//! backend (patients, appointments, doctors, billing, reports).
//!
//! Requests carry a bearer token when a session exists, time out after
//! 15 seconds, and 401s inside exempt areas are coordinated by
//! [`crate::auth::AuthFailureCoordinator`].

pub mod client;
pub mod error;
pub mod request;
pub mod transport;

pub use client::HttpClient;
pub use error::{ApiError, ApiResult};
pub use request::{ApiRequest, ApiResponse, OutboundRequest};
pub use transport::{ReqwestTransport, Transport, TransportError};
