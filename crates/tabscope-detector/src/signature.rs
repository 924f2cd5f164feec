use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// Where a project signature came from, ordered by reliability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SignatureKind {
    /// Hosted repository, e.g. `github.com/owner/repo`
    Repo,
    /// Dev server on a loopback host, keyed by port
    Localhost,
    /// Application name declared by the page itself
    App,
    /// Name given by the user
    Manual,
}

/// Stable identifier used to match observations to a workspace.
///
/// Serialized as `"<kind>:<value>"`, e.g. `"localhost:3000"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectSignature {
    pub kind: SignatureKind,
    pub value: String,
}

impl ProjectSignature {
    #[must_use]
    pub fn new(kind: SignatureKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn repo(path: impl Into<String>) -> Self {
        Self::new(SignatureKind::Repo, path)
    }

    #[must_use]
    pub fn localhost(port: u16) -> Self {
        Self::new(SignatureKind::Localhost, port.to_string())
    }

    #[must_use]
    pub fn app(name: impl Into<String>) -> Self {
        Self::new(SignatureKind::App, name)
    }

    #[must_use]
    pub fn manual(name: impl Into<String>) -> Self {
        Self::new(SignatureKind::Manual, name)
    }

    /// Human-readable workspace name for this signature
    ///
    /// Repo signatures use the last path segment, localhost ones the port.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.kind {
            SignatureKind::Repo => self
                .value
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or(&self.value)
                .to_string(),
            SignatureKind::Localhost => format!("localhost:{}", self.value),
            SignatureKind::App | SignatureKind::Manual => self.value.clone(),
        }
    }
}

impl fmt::Display for ProjectSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Error returned when a serialized signature cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSignatureError(String);

impl fmt::Display for ParseSignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid project signature: {}", self.0)
    }
}

impl std::error::Error for ParseSignatureError {}

impl FromStr for ProjectSignature {
    type Err = ParseSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| ParseSignatureError(s.to_string()))?;
        let kind = SignatureKind::from_str(kind).map_err(|_| ParseSignatureError(s.to_string()))?;
        if value.is_empty() {
            return Err(ParseSignatureError(s.to_string()));
        }
        Ok(Self::new(kind, value))
    }
}

impl TryFrom<String> for ProjectSignature {
    type Error = ParseSignatureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProjectSignature> for String {
    fn from(signature: ProjectSignature) -> Self {
        signature.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_localhost_signature() {
        let sig: ProjectSignature = "localhost:5173".parse().unwrap();
        assert_eq!(sig.kind, SignatureKind::Localhost);
        assert_eq!(sig.value, "5173");
    }

    #[test]
    fn test_parse_keeps_colons_in_value() {
        let sig: ProjectSignature = "manual:Client: Acme".parse().unwrap();
        assert_eq!(sig.kind, SignatureKind::Manual);
        assert_eq!(sig.value, "Client: Acme");
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!("svn:foo".parse::<ProjectSignature>().is_err());
        assert!("repo:".parse::<ProjectSignature>().is_err());
        assert!("no-colon".parse::<ProjectSignature>().is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let sig = ProjectSignature::repo("github.com/rust-lang/cargo");
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, "\"repo:github.com/rust-lang/cargo\"");
        let back: ProjectSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            ProjectSignature::repo("github.com/rust-lang/cargo").display_name(),
            "cargo"
        );
        assert_eq!(ProjectSignature::localhost(3000).display_name(), "localhost:3000");
        assert_eq!(ProjectSignature::app("Grafana").display_name(), "Grafana");
    }

    #[test]
    fn test_kind_ordering_follows_priority() {
        assert!(SignatureKind::Repo < SignatureKind::Localhost);
        assert!(SignatureKind::Localhost < SignatureKind::App);
    }
}
