//! Authentication module for session tokens and auth-failure handling.
//!
//! This module provides:
//! - `TokenStore`: where the session token lives (memory or a JSON file)
//! - `ExemptAreas`: areas that never force a login redirect
//! - `AuthFailureCoordinator`: single-flight recovery from 401 responses

pub mod coordinator;
pub mod exempt;
pub mod session;

pub use coordinator::{
    AuthFailureCoordinator, NoRefreshEndpoint, PendingRequest, RefreshOutcome, Settlement,
    TokenRefresher,
};
pub use exempt::ExemptAreas;
pub use session::{FileTokenStore, MemoryTokenStore, SessionData, TokenStore};
