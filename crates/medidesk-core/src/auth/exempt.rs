//! Areas of the application that degrade to a warning instead of forcing
//! a login redirect when the session is gone.
//!
//! An area is named by one or more path segments (`billing`,
//! `billing/payments`). A path or URL belongs to the area when those
//! segments appear consecutively in it, so `/billing/42` and
//! `http://host/api/billing/invoices` match `billing` while `/rebilling`
//! does not.

/// Allow-list of exempt areas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExemptAreas {
    areas: Vec<Vec<String>>,
}

impl ExemptAreas {
    pub fn new<I, S>(areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let areas = areas
            .into_iter()
            .map(|a| segments(a.as_ref()).map(str::to_ascii_lowercase).collect::<Vec<_>>())
            .filter(|a| !a.is_empty())
            .collect();
        Self { areas }
    }

    /// Whether a single path or URL falls inside any exempt area.
    pub fn matches(&self, path_or_url: &str) -> bool {
        let path: Vec<String> = segments(strip_origin(path_or_url))
            .map(str::to_ascii_lowercase)
            .collect();
        self.areas
            .iter()
            .any(|area| path.windows(area.len()).any(|w| w == area.as_slice()))
    }

    /// A failing request is exempt when the user is on an exempt page
    /// or the request itself targets an exempt area.
    pub fn is_exempt(&self, current_path: &str, request_url: &str) -> bool {
        self.matches(current_path) || self.matches(request_url)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty())
}

fn strip_origin(path_or_url: &str) -> &str {
    match path_or_url.find("://") {
        Some(idx) => {
            let rest = &path_or_url[idx + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("")
        }
        None => path_or_url,
    }
}
