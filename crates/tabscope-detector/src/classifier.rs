use regex::Regex;
use std::collections::BTreeSet;
use strum_macros::Display;
use url::Url;

use crate::observation::{PageObservation, ProjectSignal};
use crate::rules::{
    DEFAULT_THRESHOLD, DEV_DOMAINS, DEV_PORTS, GENERATOR_FINGERPRINTS, GENERATOR_WEIGHT,
    KEYWORD_WEIGHT, LOCALHOST_DEV_PORT_WEIGHT, LOCALHOST_WEIGHT, LOOPBACK_HOSTS, MAX_CONFIDENCE,
    REPO_HOSTS, REPO_HOST_WEIGHT, REPO_PATH_WEIGHT, REPO_RESERVED_OWNERS, SCRIPT_FINGERPRINTS,
    TECH_KEYWORDS,
};
use crate::signature::ProjectSignature;

/// Which rule contributed to a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RuleKind {
    RepoPath,
    RepoHost,
    Localhost,
    DevDomain,
    Keyword,
    Generator,
    ScriptSrc,
}

/// One fired rule and its weight
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub kind: RuleKind,
    pub weight: f32,
    pub detail: String,
}

/// Full scoring breakdown of an observation
#[derive(Debug, Clone, Default)]
pub struct Assessment {
    /// Sum of rule weights, clamped to [`MAX_CONFIDENCE`]
    pub confidence: f32,
    pub signature: Option<ProjectSignature>,
    pub tech_stack: BTreeSet<String>,
    pub hits: Vec<RuleHit>,
}

impl Assessment {
    fn fire(&mut self, kind: RuleKind, weight: f32, detail: impl Into<String>) {
        self.hits.push(RuleHit {
            kind,
            weight,
            detail: detail.into(),
        });
    }

    fn raw_score(&self) -> f32 {
        self.hits.iter().map(|h| h.weight).sum()
    }
}

/// Hand-tuned scorer turning page observations into project signals.
///
/// Pure: the result depends only on the observation passed in.
pub struct ProjectSignalClassifier {
    threshold: f32,
    keywords: Vec<(Regex, &'static str)>,
}

impl ProjectSignalClassifier {
    /// Create a classifier with the default decision threshold
    #[must_use]
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    /// Create a classifier with a custom decision threshold
    ///
    /// # Panics
    ///
    /// May panic if a keyword pattern is invalid (should never happen with the built-in table)
    #[must_use]
    pub fn with_threshold(threshold: f32) -> Self {
        let keywords = TECH_KEYWORDS
            .iter()
            .map(|(keyword, tech)| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword));
                (Regex::new(&pattern).unwrap(), *tech)
            })
            .collect();
        Self {
            threshold,
            keywords,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Classify an observation, returning `None` when confidence does not
    /// exceed the threshold
    #[must_use]
    pub fn classify(&self, observation: &PageObservation) -> Option<ProjectSignal> {
        self.classify_at(observation, self.threshold)
    }

    /// Classify against an explicit threshold instead of the configured one
    #[must_use]
    pub fn classify_at(&self, observation: &PageObservation, threshold: f32) -> Option<ProjectSignal> {
        let assessment = self.assess(observation);
        if assessment.confidence <= threshold {
            log::debug!(
                "No project signal for {} (confidence {:.2} <= {threshold:.2})",
                observation.url,
                assessment.confidence,
            );
            return None;
        }

        Some(ProjectSignal {
            project_signature: assessment.signature,
            tech_stack: assessment.tech_stack,
            confidence: assessment.confidence,
        })
    }

    /// Score an observation and report every rule that fired
    #[must_use]
    pub fn assess(&self, observation: &PageObservation) -> Assessment {
        let mut assessment = Assessment::default();
        let parsed = Url::parse(&observation.url).ok();
        let hostname = if observation.hostname.is_empty() {
            parsed
                .as_ref()
                .and_then(|u| u.host_str())
                .unwrap_or_default()
                .to_ascii_lowercase()
        } else {
            observation.hostname.to_ascii_lowercase()
        };

        let repo = parsed
            .as_ref()
            .and_then(|u| Self::apply_repo_rule(&mut assessment, &hostname, u));
        let localhost = parsed
            .as_ref()
            .and_then(|u| Self::apply_localhost_rule(&mut assessment, &hostname, u));
        Self::apply_dev_domain_rule(&mut assessment, &hostname);
        self.apply_keyword_rule(&mut assessment, observation);
        Self::apply_fingerprint_rules(&mut assessment, observation);

        let app_name = observation
            .dom_markers
            .application_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ProjectSignature::app);

        assessment.signature = repo.or(localhost).or(app_name);
        assessment.confidence = assessment.raw_score().clamp(0.0, MAX_CONFIDENCE);
        assessment
    }

    fn apply_repo_rule(
        assessment: &mut Assessment,
        hostname: &str,
        url: &Url,
    ) -> Option<ProjectSignature> {
        let host = REPO_HOSTS
            .iter()
            .copied()
            .find(|h| hostname == *h || hostname == format!("www.{h}"))?;

        let mut segments = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty());
        let owner = segments.next();
        let repo = segments.next();

        match (owner, repo) {
            (Some(owner), Some(repo))
                if !REPO_RESERVED_OWNERS.contains(&owner.to_ascii_lowercase().as_str()) =>
            {
                let repo = repo.trim_end_matches(".git");
                let path = format!("{host}/{owner}/{repo}").to_ascii_lowercase();
                assessment.fire(RuleKind::RepoPath, REPO_PATH_WEIGHT, path.clone());
                Some(ProjectSignature::repo(path))
            }
            _ => {
                assessment.fire(RuleKind::RepoHost, REPO_HOST_WEIGHT, host);
                None
            }
        }
    }

    fn apply_localhost_rule(
        assessment: &mut Assessment,
        hostname: &str,
        url: &Url,
    ) -> Option<ProjectSignature> {
        let is_loopback = LOOPBACK_HOSTS.contains(&hostname)
            || hostname.ends_with(".localhost")
            || hostname.ends_with(".local");
        if !is_loopback {
            return None;
        }

        let port = url.port_or_known_default()?;
        let weight = if DEV_PORTS.contains(&port) {
            LOCALHOST_DEV_PORT_WEIGHT
        } else {
            LOCALHOST_WEIGHT
        };
        assessment.fire(RuleKind::Localhost, weight, format!("{hostname}:{port}"));
        Some(ProjectSignature::localhost(port))
    }

    fn apply_dev_domain_rule(assessment: &mut Assessment, hostname: &str) {
        let matched = DEV_DOMAINS.iter().find(|(domain, _)| {
            hostname == *domain || hostname.ends_with(&format!(".{domain}"))
        });
        if let Some((domain, weight)) = matched {
            assessment.fire(RuleKind::DevDomain, *weight, *domain);
        }
    }

    fn apply_keyword_rule(&self, assessment: &mut Assessment, observation: &PageObservation) {
        let body = observation.dom_markers.body_text.as_deref().unwrap_or("");
        for (pattern, tech) in &self.keywords {
            if assessment.tech_stack.contains(*tech) {
                continue;
            }
            if pattern.is_match(&observation.title) || pattern.is_match(body) {
                assessment.tech_stack.insert((*tech).to_string());
                assessment.fire(RuleKind::Keyword, KEYWORD_WEIGHT, *tech);
            }
        }
    }

    fn apply_fingerprint_rules(assessment: &mut Assessment, observation: &PageObservation) {
        let markers = &observation.dom_markers;

        if let Some(generator) = markers.generator.as_deref() {
            let generator = generator.to_ascii_lowercase();
            if let Some((_, tech)) = GENERATOR_FINGERPRINTS
                .iter()
                .find(|(needle, _)| generator.contains(*needle))
            {
                assessment.tech_stack.insert((*tech).to_string());
                assessment.fire(RuleKind::Generator, GENERATOR_WEIGHT, *tech);
            }
        }

        let srcs: Vec<String> = markers
            .script_srcs
            .iter()
            .map(|s| s.to_ascii_lowercase())
            .collect();
        for (needle, tech, weight) in SCRIPT_FINGERPRINTS {
            if srcs.iter().any(|src| src.contains(*needle)) {
                assessment.tech_stack.insert((*tech).to_string());
                assessment.fire(RuleKind::ScriptSrc, *weight, *needle);
            }
        }
    }
}

impl Default for ProjectSignalClassifier {
    fn default() -> Self {
        Self::new()
    }
}
