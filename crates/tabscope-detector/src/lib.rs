//! Project signal detection for browser tabs.
//!
//! Turns a page observation (URL, title, DOM markers) into a scored
//! [`ProjectSignal`] using a fixed table of weighted rules.

pub mod classifier;
pub mod observation;
pub mod rules;
pub mod signature;

pub use classifier::{Assessment, ProjectSignalClassifier, RuleHit, RuleKind};
pub use observation::{DomMarkers, PageObservation, ProjectSignal};
pub use rules::{CONTENT_SCRIPT_THRESHOLD, DEFAULT_THRESHOLD, MAX_CONFIDENCE};
pub use signature::{ParseSignatureError, ProjectSignature, SignatureKind};
