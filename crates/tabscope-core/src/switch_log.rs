use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tabscope_storage::{ContextSwitchEvent, Database, WorkspaceId, SWITCH_RETENTION_DAYS};

use crate::error::EngineResult;

/// Append-only log of transitions between workspaces
#[derive(Clone)]
pub struct ContextSwitchLog {
    database: Arc<Database>,
}

impl ContextSwitchLog {
    #[must_use]
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Record a transition into `to`
    ///
    /// Nothing is written when `to` equals `from` or names a workspace that
    /// no longer exists. Events past the retention window are dropped on the
    /// same write. Returns whether an event was appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the log or the workspaces cannot be read or written
    pub fn record(
        &self,
        from: Option<&WorkspaceId>,
        to: &WorkspaceId,
        url: &str,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<bool> {
        if from == Some(to) {
            return Ok(false);
        }
        if !self.database.load_workspaces()?.contains_key(to) {
            log::debug!("Not recording switch into unknown workspace {to}");
            return Ok(false);
        }

        let mut events = self.database.load_switch_events()?;
        let cutoff = timestamp - Duration::days(SWITCH_RETENTION_DAYS);
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        if events.len() < before {
            log::debug!("Dropped {} expired context switches", before - events.len());
        }

        events.push(ContextSwitchEvent {
            from_workspace_id: from.cloned(),
            to_workspace_id: to.clone(),
            timestamp,
            url: url.to_string(),
        });
        self.database.save_switch_events(&events)?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns an error if the log cannot be read
    pub fn all(&self) -> EngineResult<Vec<ContextSwitchEvent>> {
        Ok(self.database.load_switch_events()?)
    }

    /// Events at or after `since`, in append order
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read
    pub fn since(&self, since: DateTime<Utc>) -> EngineResult<Vec<ContextSwitchEvent>> {
        let mut events = self.database.load_switch_events()?;
        events.retain(|e| e.timestamp >= since);
        Ok(events)
    }

    /// # Errors
    ///
    /// Returns an error if the log cannot be read
    pub fn count_since(&self, since: DateTime<Utc>) -> EngineResult<usize> {
        Ok(self
            .database
            .load_switch_events()?
            .iter()
            .filter(|e| e.timestamp >= since)
            .count())
    }

    /// The most recent `n` events, newest last
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read
    pub fn last(&self, n: usize) -> EngineResult<Vec<ContextSwitchEvent>> {
        let events = self.database.load_switch_events()?;
        let skip = events.len().saturating_sub(n);
        Ok(events.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WorkspaceRegistry;
    use crate::test_support::{at, signal_for, test_db, FakeHost};
    use tabscope_detector::ProjectSignature;

    fn setup() -> (ContextSwitchLog, WorkspaceId, WorkspaceId) {
        let db = test_db();
        let registry = WorkspaceRegistry::new(db.clone(), FakeHost::new());
        let a = registry
            .create_workspace(&signal_for(ProjectSignature::localhost(3000)), at(8, 0))
            .unwrap();
        let b = registry
            .create_workspace(&signal_for(ProjectSignature::localhost(4000)), at(8, 0))
            .unwrap();
        (ContextSwitchLog::new(db), a, b)
    }

    #[test]
    fn test_record_appends_transition() {
        let (log, a, b) = setup();
        assert!(log.record(None, &a, "http://localhost:3000/", at(9, 0)).unwrap());
        assert!(log.record(Some(&a), &b, "http://localhost:4000/", at(9, 5)).unwrap());

        let events = log.all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].from_workspace_id, Some(a));
        assert_eq!(events[1].to_workspace_id, b);
    }

    #[test]
    fn test_same_workspace_is_not_a_switch() {
        let (log, a, _) = setup();
        assert!(!log.record(Some(&a), &a, "http://localhost:3000/x", at(9, 0)).unwrap());
        assert!(log.all().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_target_is_not_recorded() {
        let (log, a, _) = setup();
        let ghost = WorkspaceId::from("ws_ghost");
        assert!(!log.record(Some(&a), &ghost, "http://x.test/", at(9, 0)).unwrap());
        assert!(log.all().unwrap().is_empty());
    }

    #[test]
    fn test_expired_events_are_pruned_on_write() {
        let (log, a, b) = setup();
        let old = at(9, 0) - Duration::days(SWITCH_RETENTION_DAYS + 1);
        log.record(None, &a, "http://localhost:3000/", old).unwrap();
        log.record(Some(&a), &b, "http://localhost:4000/", at(9, 0)).unwrap();

        let events = log.all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, at(9, 0));
    }

    #[test]
    fn test_queries() {
        let (log, a, b) = setup();
        log.record(None, &a, "u1", at(9, 0)).unwrap();
        log.record(Some(&a), &b, "u2", at(10, 0)).unwrap();
        log.record(Some(&b), &a, "u3", at(11, 0)).unwrap();

        assert_eq!(log.count_since(at(10, 0)).unwrap(), 2);
        assert_eq!(log.since(at(10, 30)).unwrap()[0].url, "u3");

        let last = log.last(2).unwrap();
        assert_eq!(last.iter().map(|e| e.url.as_str()).collect::<Vec<_>>(), ["u2", "u3"]);
        assert_eq!(log.last(10).unwrap().len(), 3);
    }
}
