//! Navigation gate for protected views.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{ExemptAreas, TokenStore};
use crate::config::ClientConfig;
use crate::location::LocationProvider;
use crate::notify::{Notification, Notifier};

pub const UNAUTHENTICATED_AREA_MESSAGE: &str =
    "You are not signed in. This page stays open, but changes may fail until you sign in.";
pub const UNAUTHENTICATED_AREA_KEY: &str = "exempt-area-unauthenticated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    /// No session, but the page is in an exempt area.
    AllowWithWarning,
    Redirect { to: String },
}

impl Navigation {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Navigation::Redirect { .. })
    }
}

pub struct RouteGuard {
    exempt: ExemptAreas,
    login_path: String,
    public_paths: Vec<String>,
    notifier: Arc<dyn Notifier>,
    warned: AtomicBool,
}

impl RouteGuard {
    pub fn new(config: &ClientConfig, notifier: Arc<dyn Notifier>) -> Self {
        let login_path = normalize(&config.login_path);
        Self {
            exempt: ExemptAreas::new(&config.exempt_areas),
            public_paths: vec![login_path.clone()],
            login_path,
            notifier,
            warned: AtomicBool::new(false),
        }
    }

    /// Let a path through without a session (sign-up, password reset, ...).
    pub fn with_public_path(mut self, path: &str) -> Self {
        self.public_paths.push(normalize(path));
        self
    }

    /// Decide whether navigation to `path` may proceed.
    ///
    /// The exempt-area warning fires once, then stays quiet until a session
    /// has been seen again.
    pub fn check(&self, session_present: bool, path: &str) -> Navigation {
        if session_present {
            self.warned.store(false, Ordering::Relaxed);
            return Navigation::Allow;
        }

        let target = normalize(path);
        if self.public_paths.iter().any(|p| *p == target) {
            return Navigation::Allow;
        }

        if self.exempt.matches(&target) {
            if !self.warned.swap(true, Ordering::Relaxed) {
                info!(path = %target, "No session in exempt area, allowing with warning");
                self.notifier.notify(Notification::warn(
                    UNAUTHENTICATED_AREA_MESSAGE,
                    UNAUTHENTICATED_AREA_KEY,
                ));
            }
            return Navigation::AllowWithWarning;
        }

        debug!(path = %target, to = %self.login_path, "No session, redirecting to login");
        Navigation::Redirect {
            to: self.login_path.clone(),
        }
    }

    pub fn check_current(
        &self,
        tokens: &dyn TokenStore,
        location: &dyn LocationProvider,
    ) -> Navigation {
        self.check(tokens.has_session(), &location.current_path())
    }
}

/// Path without query, fragment or trailing slash.
fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
