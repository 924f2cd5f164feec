use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::signature::ProjectSignature;

/// Markers scraped from the page DOM by the content script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomMarkers {
    /// `<meta name="generator">` content
    pub generator: Option<String>,
    /// `<meta name="application-name">` or `og:site_name`
    pub application_name: Option<String>,
    /// `src` attributes of script tags
    pub script_srcs: Vec<String>,
    /// A short sample of the visible body text
    pub body_text: Option<String>,
}

/// One page-load observation of a tab
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageObservation {
    pub url: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub dom_markers: DomMarkers,
}

impl PageObservation {
    /// Build an observation from a URL alone, deriving the hostname
    #[must_use]
    pub fn from_url(url: &str, title: &str) -> Self {
        let hostname = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            url: url.to_string(),
            hostname,
            title: title.to_string(),
            dom_markers: DomMarkers::default(),
        }
    }
}

/// Scored project signal produced by the classifier
///
/// Transient: consumed once by workspace assignment and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSignal {
    pub project_signature: Option<ProjectSignature>,
    #[serde(default)]
    pub tech_stack: BTreeSet<String>,
    pub confidence: f32,
}

impl ProjectSignal {
    /// Signal for a workspace the user named explicitly
    #[must_use]
    pub fn manual(name: &str) -> Self {
        Self {
            project_signature: Some(ProjectSignature::manual(name)),
            tech_stack: BTreeSet::new(),
            confidence: 1.0,
        }
    }
}
