//! Recording host double shared by the engine tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tabscope_detector::{PageObservation, ProjectSignal, ProjectSignature};
use tabscope_storage::{Database, GroupColor, GroupId, TabId};

use crate::host::{BlockRule, BrowserHost, HostError, HostResult, Notification};

#[derive(Debug, Default)]
pub struct FakeState {
    pub tabs: BTreeMap<TabId, String>,
    pub next_tab: TabId,
    pub next_group: GroupId,
    pub groups: BTreeMap<GroupId, Vec<TabId>>,
    pub group_calls: Vec<(Vec<TabId>, Option<GroupId>)>,
    pub labels: Vec<(GroupId, String, GroupColor)>,
    pub created: Vec<(String, bool)>,
    pub closed: Vec<TabId>,
    pub activated: Vec<TabId>,
    pub ungrouped: Vec<TabId>,
    pub notifications: Vec<Notification>,
    pub installed_rules: BTreeMap<u32, String>,
    pub removed_rule_ids: Vec<u32>,
    pub alarms: BTreeMap<String, DateTime<Utc>>,
    pub failing_urls: BTreeSet<String>,
    pub reject_rules: bool,
}

pub struct FakeHost {
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_tab: 100,
                next_group: 500,
                ..FakeState::default()
            }),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Open a tab as if the user did it
    pub fn open_tab(&self, url: &str) -> TabId {
        let mut state = self.state();
        state.next_tab += 1;
        let id = state.next_tab;
        state.tabs.insert(id, url.to_string());
        id
    }

    /// Close a tab behind the engine's back
    pub fn vanish_tab(&self, tab_id: TabId) {
        let mut state = self.state();
        state.tabs.remove(&tab_id);
        for members in state.groups.values_mut() {
            members.retain(|id| *id != tab_id);
        }
    }
}

#[async_trait]
impl BrowserHost for FakeHost {
    async fn tab_url(&self, tab_id: TabId) -> HostResult<Option<String>> {
        self.state()
            .tabs
            .get(&tab_id)
            .map(|url| Some(url.clone()))
            .ok_or(HostError::TabNotFound(tab_id))
    }

    async fn create_tab(&self, url: &str, active: bool) -> HostResult<TabId> {
        let mut state = self.state();
        if state.failing_urls.contains(url) {
            return Err(HostError::Unavailable(format!("cannot open {url}")));
        }
        state.next_tab += 1;
        let id = state.next_tab;
        state.tabs.insert(id, url.to_string());
        state.created.push((url.to_string(), active));
        Ok(id)
    }

    async fn activate_tab(&self, tab_id: TabId) -> HostResult<()> {
        let mut state = self.state();
        if !state.tabs.contains_key(&tab_id) {
            return Err(HostError::TabNotFound(tab_id));
        }
        state.activated.push(tab_id);
        Ok(())
    }

    async fn close_tabs(&self, tab_ids: &[TabId]) -> HostResult<()> {
        let mut state = self.state();
        for id in tab_ids {
            state.tabs.remove(id);
            state.closed.push(*id);
        }
        Ok(())
    }

    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        group_id: Option<GroupId>,
    ) -> HostResult<GroupId> {
        let mut state = self.state();
        state.group_calls.push((tab_ids.to_vec(), group_id));
        if let Some(missing) = tab_ids.iter().find(|id| !state.tabs.contains_key(*id)) {
            return Err(HostError::TabNotFound(*missing));
        }
        let group = match group_id {
            Some(g) if state.groups.contains_key(&g) => g,
            Some(g) => return Err(HostError::GroupRejected(format!("no group {g}"))),
            None => {
                state.next_group += 1;
                state.next_group
            }
        };
        for members in state.groups.values_mut() {
            members.retain(|id| !tab_ids.contains(id));
        }
        let members = state.groups.entry(group).or_default();
        for id in tab_ids {
            members.push(*id);
        }
        Ok(group)
    }

    async fn update_group(
        &self,
        group_id: GroupId,
        title: &str,
        color: GroupColor,
    ) -> HostResult<()> {
        self.state().labels.push((group_id, title.to_string(), color));
        Ok(())
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> HostResult<()> {
        let mut state = self.state();
        for members in state.groups.values_mut() {
            members.retain(|id| !tab_ids.contains(id));
        }
        state.ungrouped.extend_from_slice(tab_ids);
        Ok(())
    }

    async fn observe_page(&self, tab_id: TabId) -> HostResult<Option<PageObservation>> {
        let state = self.state();
        let url = state.tabs.get(&tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        Ok(Some(PageObservation::from_url(url, "")))
    }

    async fn notify(&self, notification: Notification) -> HostResult<()> {
        self.state().notifications.push(notification);
        Ok(())
    }

    async fn add_block_rules(&self, rules: &[BlockRule]) -> HostResult<()> {
        let mut state = self.state();
        if state.reject_rules {
            return Err(HostError::PermissionDenied("declarativeNetRequest".into()));
        }
        for rule in rules {
            state.installed_rules.insert(rule.id, rule.url_filter.clone());
        }
        Ok(())
    }

    async fn remove_block_rules(&self, rule_ids: &[u32]) -> HostResult<()> {
        let mut state = self.state();
        for id in rule_ids {
            state.installed_rules.remove(id);
            state.removed_rule_ids.push(*id);
        }
        Ok(())
    }

    async fn schedule_alarm(&self, name: &str, at: DateTime<Utc>) -> HostResult<()> {
        self.state().alarms.insert(name.to_string(), at);
        Ok(())
    }

    async fn clear_alarm(&self, name: &str) -> HostResult<()> {
        self.state().alarms.remove(name);
        Ok(())
    }
}

pub fn test_db() -> Arc<Database> {
    Arc::new(Database::in_memory().unwrap())
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 14, hour, minute, 0).unwrap()
}

pub fn signal_for(signature: ProjectSignature) -> ProjectSignal {
    ProjectSignal {
        project_signature: Some(signature),
        tech_stack: BTreeSet::new(),
        confidence: 0.6,
    }
}
