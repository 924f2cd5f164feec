use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tabscope_storage::{Database, FocusRecord};
use url::Url;

use crate::error::EngineResult;
use crate::host::{BlockRule, BrowserHost, Notification, NotificationKind};

/// Host alarm carrying the break reminder
pub const FOCUS_BREAK_ALARM: &str = "focus-break";

const RULE_ID_BASE: u32 = 1000;
const RULE_ID_SPAN: u32 = 9000;

/// Deterministic block rule id for a site, in `1000..10000`
///
/// The hash is the classic 31-multiplier string hash over UTF-16 code
/// units with 32-bit wrap-around, so ids stay stable across restarts.
#[must_use]
pub fn rule_id_for_site(site: &str) -> u32 {
    let hash = site
        .encode_utf16()
        .fold(0_i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    RULE_ID_BASE + hash.unsigned_abs() % RULE_ID_SPAN
}

#[must_use]
pub fn block_rule_for_site(site: &str) -> BlockRule {
    BlockRule {
        id: rule_id_for_site(site),
        url_filter: format!("||{site}"),
    }
}

/// Whether a blocklist entry is a bare domain such as `x.com`
fn is_bare_domain(site: &str) -> bool {
    site.contains('.') && !site.contains('/')
}

/// Match a URL against one blocklist entry
///
/// Bare domains match the host or any subdomain of it, the same scope as the
/// installed `||site` filter. Other entries (keywords, paths) fall back to a
/// substring match on the whole URL.
#[must_use]
pub fn site_matches(url: &str, site: &str) -> bool {
    let site = site.trim().to_ascii_lowercase();
    if site.is_empty() {
        return false;
    }
    if is_bare_domain(&site) {
        return Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| host == site || host.ends_with(&format!(".{site}")));
    }
    url.to_ascii_lowercase().contains(&site)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusStatus {
    pub active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub break_due_at: Option<DateTime<Utc>>,
    pub blocked_sites: Vec<String>,
    pub distractions: u32,
}

/// Idle/Active focus state machine backed by the persisted runtime record
#[derive(Clone)]
pub struct FocusModeController {
    database: Arc<Database>,
    host: Arc<dyn BrowserHost>,
}

impl FocusModeController {
    #[must_use]
    pub fn new(database: Arc<Database>, host: Arc<dyn BrowserHost>) -> Self {
        Self { database, host }
    }

    /// # Errors
    ///
    /// Returns an error if the runtime record or settings cannot be read
    pub fn status(&self) -> EngineResult<FocusStatus> {
        let focus = self.database.load_runtime()?.focus;
        let blocked_sites = if focus.active {
            self.database.get_settings()?.blocklist
        } else {
            Vec::new()
        };
        Ok(FocusStatus {
            active: focus.active,
            started_at: focus.started_at,
            break_due_at: focus.break_due_at,
            blocked_sites,
            distractions: focus.distractions,
        })
    }

    /// Install block rules for the blocklist and arm the break reminder
    ///
    /// Host refusals are logged; focus still becomes active, with only the
    /// rule ids the host accepted recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime record or settings cannot be read or written
    pub async fn enable(&self, now: DateTime<Utc>) -> EngineResult<FocusStatus> {
        let mut runtime = self.database.load_runtime()?;
        if runtime.focus.active {
            return self.status();
        }
        let settings = self.database.get_settings()?;

        let mut by_id: BTreeMap<u32, BlockRule> = BTreeMap::new();
        for site in &settings.blocklist {
            let rule = block_rule_for_site(site);
            if let Some(existing) = by_id.get(&rule.id) {
                log::warn!(
                    "Block rule id {} of {site} collides with {}; {site} stays unblocked",
                    rule.id,
                    existing.url_filter
                );
                continue;
            }
            by_id.insert(rule.id, rule);
        }
        let rules: Vec<BlockRule> = by_id.into_values().collect();
        let installed_rule_ids = match self.host.add_block_rules(&rules).await {
            Ok(()) => rules.iter().map(|r| r.id).collect(),
            Err(e) => {
                log::warn!("Failed to install focus block rules: {e}");
                BTreeSet::new()
            }
        };

        let break_due_at = (settings.focus_duration_minutes > 0)
            .then(|| now + Duration::minutes(i64::from(settings.focus_duration_minutes)));
        if let Some(due) = break_due_at {
            if let Err(e) = self.host.schedule_alarm(FOCUS_BREAK_ALARM, due).await {
                log::warn!("Failed to schedule break reminder: {e}");
            }
        }

        runtime.focus = FocusRecord {
            active: true,
            installed_rule_ids,
            started_at: Some(now),
            break_due_at,
            distractions: 0,
        };
        self.database.save_runtime(&runtime)?;
        log::info!("Focus mode enabled, blocking {} sites", rules.len());
        self.status()
    }

    /// Remove every derivable and recorded block rule and return to idle
    ///
    /// Safe to call when already idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime record or settings cannot be read or written
    pub async fn disable(&self) -> EngineResult<FocusStatus> {
        let mut runtime = self.database.load_runtime()?;
        let settings = self.database.get_settings()?;

        let mut rule_ids: BTreeSet<u32> = settings
            .blocklist
            .iter()
            .map(|site| rule_id_for_site(site))
            .collect();
        rule_ids.extend(runtime.focus.installed_rule_ids.iter().copied());
        let rule_ids: Vec<u32> = rule_ids.into_iter().collect();

        if let Err(e) = self.host.remove_block_rules(&rule_ids).await {
            log::warn!("Failed to remove focus block rules: {e}");
        }
        if let Err(e) = self.host.clear_alarm(FOCUS_BREAK_ALARM).await {
            log::warn!("Failed to clear break reminder: {e}");
        }

        let was_active = runtime.focus.active;
        runtime.focus = FocusRecord::default();
        self.database.save_runtime(&runtime)?;
        if was_active {
            log::info!("Focus mode disabled");
        }
        self.status()
    }

    /// # Errors
    ///
    /// Returns an error if the runtime record or settings cannot be read or written
    pub async fn toggle(&self, now: DateTime<Utc>) -> EngineResult<FocusStatus> {
        if self.database.load_runtime()?.focus.active {
            self.disable().await
        } else {
            self.enable(now).await
        }
    }

    /// Check an activated tab against the blocklist while focus is active
    ///
    /// A match counts a distraction and notifies; the session continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime record or settings cannot be read or written
    pub async fn check_activation(&self, url: &str) -> EngineResult<bool> {
        let mut runtime = self.database.load_runtime()?;
        if !runtime.focus.active {
            return Ok(false);
        }
        let settings = self.database.get_settings()?;
        let Some(site) = settings.blocklist.iter().find(|site| site_matches(url, site)) else {
            return Ok(false);
        };

        runtime.focus.distractions += 1;
        self.database.save_runtime(&runtime)?;
        log::info!("Distraction #{} on {site}", runtime.focus.distractions);

        let notification = Notification {
            kind: NotificationKind::Distraction,
            title: "Stay focused".to_string(),
            message: format!("{site} is on your focus blocklist"),
        };
        if let Err(e) = self.host.notify(notification).await {
            log::warn!("Failed to send distraction notification: {e}");
        }
        Ok(true)
    }

    /// Handle the break alarm; returns whether a reminder was sent
    ///
    /// An alarm that fires ahead of the persisted deadline is re-armed.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime record cannot be read or written
    pub async fn on_alarm(&self, now: DateTime<Utc>) -> EngineResult<bool> {
        let mut runtime = self.database.load_runtime()?;
        let Some(due) = runtime.focus.break_due_at.filter(|_| runtime.focus.active) else {
            return Ok(false);
        };
        if due > now {
            if let Err(e) = self.host.schedule_alarm(FOCUS_BREAK_ALARM, due).await {
                log::warn!("Failed to re-arm break reminder: {e}");
            }
            return Ok(false);
        }

        runtime.focus.break_due_at = None;
        self.database.save_runtime(&runtime)?;

        let minutes = runtime
            .focus
            .started_at
            .map_or(0, |started| (now - started).num_minutes());
        let notification = Notification {
            kind: NotificationKind::BreakReminder,
            title: "Time for a break".to_string(),
            message: format!("You have been focused for {minutes} minutes"),
        };
        if let Err(e) = self.host.notify(notification).await {
            log::warn!("Failed to send break reminder: {e}");
        }
        Ok(true)
    }

    /// Re-arm the break alarm after a wake; an overdue deadline fires now
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime record cannot be read or written
    pub async fn rearm(&self, now: DateTime<Utc>) -> EngineResult<()> {
        let focus = self.database.load_runtime()?.focus;
        match focus.break_due_at {
            Some(due) if focus.active && due <= now => {
                self.on_alarm(now).await?;
            }
            Some(due) if focus.active => {
                if let Err(e) = self.host.schedule_alarm(FOCUS_BREAK_ALARM, due).await {
                    log::warn!("Failed to re-arm break reminder: {e}");
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Focus never survives a browser restart
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime record or settings cannot be read or written
    pub async fn reset_on_startup(&self) -> EngineResult<()> {
        self.disable().await?;
        Ok(())
    }
}
