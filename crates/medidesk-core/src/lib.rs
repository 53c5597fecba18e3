//! Core library for medidesk - the API session layer of the hospital
//! administration frontend.
//!
//! - [`api`]: the shared HTTP client and its error taxonomy
//! - [`auth`]: token storage, exempt areas, auth-failure coordination
//! - [`guard`]: navigation gate for protected views
//! - [`config`], [`location`], [`notify`]: collaborators the above consume

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod location;
pub mod notify;

pub use api::{ApiError, ApiRequest, ApiResponse, ApiResult, HttpClient};
pub use auth::{AuthFailureCoordinator, ExemptAreas, FileTokenStore, MemoryTokenStore, TokenStore};
pub use config::ClientConfig;
pub use guard::{Navigation, RouteGuard};
pub use location::{LocationProvider, SharedLocation};
pub use notify::{Notification, NotificationLevel, NotificationLog, Notifier, TracingNotifier};
