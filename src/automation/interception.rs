use serde::{Deserialize, Serialize};

/// Where a navigation ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    OnTarget,
    /// An identity provider or challenge page matched `hint`.
    Intercepted { hint: String },
}

impl Location {
    pub fn is_intercepted(&self) -> bool {
        matches!(self, Location::Intercepted { .. })
    }
}

/// Case-insensitive URL substrings identifying identity-provider and
/// challenge pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptionRules {
    hints: Vec<String>,
}

impl InterceptionRules {
    pub fn new<I, S>(hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hints: hints
                .into_iter()
                .map(|h| h.as_ref().trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, url: &str) -> Location {
        let url = url.to_lowercase();
        match self.hints.iter().find(|hint| url.contains(hint.as_str())) {
            Some(hint) => Location::Intercepted { hint: hint.clone() },
            None => Location::OnTarget,
        }
    }
}

/// Page is usable once the URL contains `url_fragment` and `selector` exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessMarker {
    pub url_fragment: String,
    pub selector: String,
}

impl ReadinessMarker {
    pub fn url_matches(&self, url: &str) -> bool {
        url.to_lowercase().contains(&self.url_fragment.to_lowercase())
    }
}
