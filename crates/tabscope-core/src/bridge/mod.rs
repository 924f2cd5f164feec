//! Native messaging bridge between the browser extension and the engine.
//!
//! Three tasks cooperate: a reader decoding frames from the browser, a single
//! engine task processing events and requests strictly in order, and a writer
//! serializing every outbound frame. Host primitives are remote calls that
//! the reader completes when the matching `hostReply` arrives.

pub mod codec;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tabscope_detector::PageObservation;
use tabscope_storage::{Database, GroupColor, GroupId, TabId};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::engine::Engine;
use crate::error::{ErrorCode, RequestError};
use crate::host::{BlockRule, BrowserHost, HostError, HostResult, Notification};
use crate::messages::{HostEvent, Request, Response};

use codec::{encode_frame, read_frame, FrameError};

/// `{"ok": ...}` or `{"error": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome<T, E> {
    Ok(T),
    Error(E),
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(error) => Self::Error(error),
        }
    }
}

/// Frames sent by the browser
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    Event {
        event: HostEvent,
    },
    /// Decoded lazily so a malformed request can still be answered by id
    Request {
        id: u64,
        request: Value,
    },
    HostReply {
        id: u64,
        result: Outcome<Value, HostError>,
    },
}

/// Host primitives invoked on the browser side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCall {
    TabUrl {
        tab_id: TabId,
    },
    CreateTab {
        url: String,
        active: bool,
    },
    ActivateTab {
        tab_id: TabId,
    },
    CloseTabs {
        tab_ids: Vec<TabId>,
    },
    GroupTabs {
        tab_ids: Vec<TabId>,
        group_id: Option<GroupId>,
    },
    UpdateGroup {
        group_id: GroupId,
        title: String,
        color: GroupColor,
    },
    UngroupTabs {
        tab_ids: Vec<TabId>,
    },
    ObservePage {
        tab_id: TabId,
    },
    Notify {
        notification: Notification,
    },
    AddBlockRules {
        rules: Vec<BlockRule>,
    },
    RemoveBlockRules {
        rule_ids: Vec<u32>,
    },
    ScheduleAlarm {
        name: String,
        at: DateTime<Utc>,
    },
    ClearAlarm {
        name: String,
    },
}

/// Frames sent to the browser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    Response {
        id: u64,
        result: Outcome<Response, RequestError>,
    },
    HostCall {
        id: u64,
        call: HostCall,
    },
}

type PendingReply = oneshot::Sender<Outcome<Value, HostError>>;

/// [`BrowserHost`] implemented as calls over the native messaging channel
pub struct NativeHost {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    timeout: Duration,
}

impl NativeHost {
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>, timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            timeout,
        }
    }

    fn pending(&self) -> HostResult<MutexGuard<'_, HashMap<u64, PendingReply>>> {
        self.pending
            .lock()
            .map_err(|_| HostError::Unavailable("pending call table poisoned".to_string()))
    }

    /// Deliver a reply; returns `false` for an unknown or expired call id
    pub fn complete(&self, id: u64, result: Outcome<Value, HostError>) -> bool {
        let Ok(mut pending) = self.pending() else {
            return false;
        };
        pending
            .remove(&id)
            .is_some_and(|sender| sender.send(result).is_ok())
    }

    /// Fail every pending call and refuse new ones
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending() {
            let dropped = pending.len();
            pending.clear();
            if dropped > 0 {
                log::warn!("Abandoned {dropped} pending host calls");
            }
        }
    }

    async fn call<T: DeserializeOwned>(&self, call: HostCall) -> HostResult<T> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("browser disconnected".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending()?.insert(id, tx);

        if self.outbound.send(Outbound::HostCall { id, call }).is_err() {
            self.pending()?.remove(&id);
            return Err(HostError::Unavailable("bridge writer stopped".to_string()));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Outcome::Ok(value))) => serde_json::from_value(value)
                .map_err(|e| HostError::Protocol(format!("reply to call {id}: {e}"))),
            Ok(Ok(Outcome::Error(error))) => Err(error),
            Ok(Err(_)) => Err(HostError::Unavailable("browser disconnected".to_string())),
            Err(_) => {
                self.pending()?.remove(&id);
                Err(HostError::Unavailable(format!(
                    "host call {id} timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

#[async_trait]
impl BrowserHost for NativeHost {
    async fn tab_url(&self, tab_id: TabId) -> HostResult<Option<String>> {
        self.call(HostCall::TabUrl { tab_id }).await
    }

    async fn create_tab(&self, url: &str, active: bool) -> HostResult<TabId> {
        self.call(HostCall::CreateTab {
            url: url.to_string(),
            active,
        })
        .await
    }

    async fn activate_tab(&self, tab_id: TabId) -> HostResult<()> {
        self.call(HostCall::ActivateTab { tab_id }).await
    }

    async fn close_tabs(&self, tab_ids: &[TabId]) -> HostResult<()> {
        self.call(HostCall::CloseTabs {
            tab_ids: tab_ids.to_vec(),
        })
        .await
    }

    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        group_id: Option<GroupId>,
    ) -> HostResult<GroupId> {
        self.call(HostCall::GroupTabs {
            tab_ids: tab_ids.to_vec(),
            group_id,
        })
        .await
    }

    async fn update_group(
        &self,
        group_id: GroupId,
        title: &str,
        color: GroupColor,
    ) -> HostResult<()> {
        self.call(HostCall::UpdateGroup {
            group_id,
            title: title.to_string(),
            color,
        })
        .await
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> HostResult<()> {
        self.call(HostCall::UngroupTabs {
            tab_ids: tab_ids.to_vec(),
        })
        .await
    }

    async fn observe_page(&self, tab_id: TabId) -> HostResult<Option<PageObservation>> {
        self.call(HostCall::ObservePage { tab_id }).await
    }

    async fn notify(&self, notification: Notification) -> HostResult<()> {
        self.call(HostCall::Notify { notification }).await
    }

    async fn add_block_rules(&self, rules: &[BlockRule]) -> HostResult<()> {
        self.call(HostCall::AddBlockRules {
            rules: rules.to_vec(),
        })
        .await
    }

    async fn remove_block_rules(&self, rule_ids: &[u32]) -> HostResult<()> {
        self.call(HostCall::RemoveBlockRules {
            rule_ids: rule_ids.to_vec(),
        })
        .await
    }

    async fn schedule_alarm(&self, name: &str, at: DateTime<Utc>) -> HostResult<()> {
        self.call(HostCall::ScheduleAlarm {
            name: name.to_string(),
            at,
        })
        .await
    }

    async fn clear_alarm(&self, name: &str) -> HostResult<()> {
        self.call(HostCall::ClearAlarm {
            name: name.to_string(),
        })
        .await
    }
}

enum Work {
    Event(HostEvent),
    Request { id: u64, request: Request },
}

/// Serialize an outbound frame, replacing a response that is too large for
/// the browser with an error response carrying the same id
fn encode_outbound(message: &Outbound) -> Option<Vec<u8>> {
    match encode_frame(message) {
        Ok(frame) => Some(frame),
        Err(FrameError::TooLarge { size, limit }) => {
            let Outbound::Response { id, .. } = message else {
                log::error!("Dropping host call of {size} bytes (limit {limit})");
                return None;
            };
            let replacement = Outbound::Response {
                id: *id,
                result: Outcome::Error(RequestError::new(
                    ErrorCode::ResponseTooLarge,
                    format!("response of {size} bytes exceeds the {limit} byte limit"),
                )),
            };
            encode_frame(&replacement).ok()
        }
        Err(e) => {
            log::error!("Failed to encode outbound frame: {e}");
            None
        }
    }
}

async fn write_loop<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let Some(frame) = encode_outbound(&message) else {
            continue;
        };
        if let Err(e) = writer.write_all(&frame).await {
            log::error!("Bridge write failed: {e}");
            return;
        }
        if let Err(e) = writer.flush().await {
            log::error!("Bridge flush failed: {e}");
            return;
        }
    }
}

async fn engine_loop(
    engine: Engine,
    mut work: mpsc::UnboundedReceiver<Work>,
    outbound: mpsc::UnboundedSender<Outbound>,
) {
    while let Some(item) = work.recv().await {
        match item {
            Work::Event(event) => engine.handle_event(event).await,
            Work::Request { id, request } => {
                let result = engine.handle_request(request).await.into();
                if outbound.send(Outbound::Response { id, result }).is_err() {
                    log::warn!("Dropping response {id}: writer stopped");
                }
            }
        }
    }
}

async fn read_loop<R>(
    mut reader: R,
    host: &NativeHost,
    work: &mpsc::UnboundedSender<Work>,
    outbound: &mpsc::UnboundedSender<Outbound>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let item = match read_frame::<_, Inbound>(&mut reader).await {
            Ok(Some(Inbound::Event { event })) => Work::Event(event),
            Ok(Some(Inbound::Request { id, request })) => match serde_json::from_value(request) {
                Ok(request) => Work::Request { id, request },
                Err(e) => {
                    let error = RequestError::new(ErrorCode::InvalidRequest, e.to_string());
                    let reply = Outbound::Response {
                        id,
                        result: Outcome::Error(error),
                    };
                    if outbound.send(reply).is_err() {
                        log::debug!("Dropping rejection of request {id}: writer stopped");
                    }
                    continue;
                }
            },
            Ok(Some(Inbound::HostReply { id, result })) => {
                if !host.complete(id, result) {
                    log::warn!("Reply for unknown or expired host call {id}");
                }
                continue;
            }
            Ok(None) => {
                log::info!("Browser closed the connection");
                return;
            }
            Err(FrameError::Json(e)) => {
                log::warn!("Skipping malformed frame: {e}");
                continue;
            }
            Err(e) => {
                log::error!("Bridge read failed: {e}");
                return;
            }
        };

        if work.send(item).is_err() {
            log::error!("Engine task stopped; closing bridge");
            return;
        }
    }
}

/// Serve the extension over `reader`/`writer` until the browser disconnects
///
/// A `wake` event is processed first so persisted deadlines are re-armed.
///
/// # Errors
///
/// Returns an error if a bridge task panicked
pub async fn run_bridge<R, W>(
    database: Arc<Database>,
    host_call_timeout: Duration,
    reader: R,
    writer: W,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (work_tx, work_rx) = mpsc::unbounded_channel();
    let host = Arc::new(NativeHost::new(outbound_tx.clone(), host_call_timeout));
    let engine = Engine::new(database, host.clone());

    let writer_task = tokio::spawn(write_loop(writer, outbound_rx));
    let engine_task = tokio::spawn(engine_loop(engine, work_rx, outbound_tx.clone()));
    log::info!("Bridge started");

    if work_tx.send(Work::Event(HostEvent::Wake)).is_ok() {
        read_loop(reader, &host, &work_tx, &outbound_tx).await;
    }

    host.close();
    drop(work_tx);
    engine_task.await?;

    // The writer drains once every sender is gone
    drop(host);
    drop(outbound_tx);
    writer_task.await?;
    log::info!("Bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use codec::write_frame;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_completes_with_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = Arc::new(NativeHost::new(tx, Duration::from_secs(5)));

        let caller = {
            let host = host.clone();
            tokio::spawn(async move { host.tab_url(42).await })
        };

        let Some(Outbound::HostCall { id, call }) = rx.recv().await else {
            panic!("expected a host call");
        };
        assert_eq!(call, HostCall::TabUrl { tab_id: 42 });
        assert!(host.complete(id, Outcome::Ok(json!("https://docs.rs/"))));

        assert_eq!(caller.await.unwrap().unwrap(), Some("https://docs.rs/".to_string()));
        assert!(!host.complete(id, Outcome::Ok(Value::Null)));
    }

    #[tokio::test]
    async fn test_host_error_reply_is_surfaced() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = Arc::new(NativeHost::new(tx, Duration::from_secs(5)));

        let caller = {
            let host = host.clone();
            tokio::spawn(async move { host.activate_tab(9).await })
        };
        let Some(Outbound::HostCall { id, .. }) = rx.recv().await else {
            panic!("expected a host call");
        };
        host.complete(id, Outcome::Error(HostError::TabNotFound(9)));

        assert_eq!(caller.await.unwrap(), Err(HostError::TabNotFound(9)));
    }

    #[tokio::test]
    async fn test_unanswered_call_times_out() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let host = NativeHost::new(tx, Duration::from_millis(20));

        let result = host.clear_alarm("focus-break").await;
        assert!(matches!(result, Err(HostError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_closed_host_fails_fast() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let host = NativeHost::new(tx, Duration::from_secs(60));
        host.close();

        assert!(matches!(
            host.tab_url(1).await,
            Err(HostError::Unavailable(_))
        ));
    }

    #[test]
    fn test_wire_shapes() {
        let inbound: Inbound = serde_json::from_value(json!({
            "type": "event",
            "event": {"type": "tabActivated", "tabId": 5}
        }))
        .unwrap();
        assert!(matches!(
            inbound,
            Inbound::Event {
                event: HostEvent::TabActivated { tab_id: 5 }
            }
        ));

        let inbound: Inbound = serde_json::from_value(json!({
            "type": "hostReply",
            "id": 3,
            "result": {"error": {"kind": "tabNotFound", "detail": 8}}
        }))
        .unwrap();
        assert!(matches!(
            inbound,
            Inbound::HostReply {
                id: 3,
                result: Outcome::Error(HostError::TabNotFound(8))
            }
        ));

        let outbound = Outbound::HostCall {
            id: 4,
            call: HostCall::GroupTabs {
                tab_ids: vec![1, 2],
                group_id: None,
            },
        };
        assert_eq!(
            serde_json::to_value(&outbound).unwrap(),
            json!({
                "type": "hostCall",
                "id": 4,
                "call": {"method": "groupTabs", "tabIds": [1, 2], "groupId": null}
            })
        );
    }

    #[test]
    fn test_oversized_response_becomes_error() {
        let settings = tabscope_storage::Settings {
            blocklist: vec!["x".repeat(codec::MAX_OUTBOUND_FRAME)],
            ..tabscope_storage::Settings::default()
        };
        let message = Outbound::Response {
            id: 11,
            result: Outcome::Ok(Response::Settings(settings)),
        };

        let frame = encode_outbound(&message).unwrap();
        let decoded: Value = serde_json::from_slice(&frame[4..]).unwrap();
        assert_eq!(decoded["id"], 11);
        assert_eq!(decoded["result"]["error"]["code"], "responseTooLarge");
    }

    #[tokio::test]
    async fn test_reader_keeps_going_after_writer_stops() {
        let mut input = Vec::new();
        write_frame(
            &mut input,
            &json!({"type": "request", "id": 1, "request": {"action": "formatDisk"}}),
        )
        .await
        .unwrap();
        write_frame(&mut input, &json!({"type": "event", "event": {"type": "wake"}}))
            .await
            .unwrap();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        drop(outbound_rx);
        let (work_tx, mut work_rx) = mpsc::unbounded_channel();
        let host = NativeHost::new(outbound_tx.clone(), Duration::from_secs(1));

        read_loop(input.as_slice(), &host, &work_tx, &outbound_tx).await;

        assert!(matches!(work_rx.try_recv(), Ok(Work::Event(HostEvent::Wake))));
        assert!(work_rx.try_recv().is_err());
    }

    /// Drive a bridge over an in-memory pipe, answering host calls with `null`
    async fn exchange(frames: Vec<Value>, expected_responses: usize) -> Vec<Value> {
        let (client, server) = tokio::io::duplex(1 << 16);
        let (server_read, server_write) = tokio::io::split(server);
        let bridge = tokio::spawn(run_bridge(
            test_db(),
            Duration::from_secs(5),
            server_read,
            server_write,
        ));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        for frame in &frames {
            write_frame(&mut client_write, frame).await.unwrap();
        }

        let mut responses = Vec::new();
        while responses.len() < expected_responses {
            let frame: Value = read_frame(&mut client_read).await.unwrap().unwrap();
            match frame["type"].as_str() {
                Some("hostCall") => {
                    let reply = json!({"type": "hostReply", "id": frame["id"], "result": {"ok": null}});
                    write_frame(&mut client_write, &reply).await.unwrap();
                }
                Some("response") => responses.push(frame),
                other => panic!("unexpected frame type {other:?}"),
            }
        }

        drop(client_read);
        drop(client_write);
        bridge.await.unwrap().unwrap();
        responses
    }

    #[tokio::test]
    async fn test_bridge_answers_requests_in_order() {
        let responses = exchange(
            vec![
                json!({"type": "request", "id": 1, "request": {"action": "getSettings"}}),
                json!({"type": "request", "id": 2, "request": {"action": "getWorkspaces"}}),
            ],
            2,
        )
        .await;

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["ok"]["kind"], "settings");
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"]["ok"]["data"], json!([]));
    }

    #[tokio::test]
    async fn test_bridge_rejects_unknown_action_by_id() {
        let responses = exchange(
            vec![json!({"type": "request", "id": 7, "request": {"action": "formatDisk"}})],
            1,
        )
        .await;

        assert_eq!(responses[0]["id"], 7);
        assert_eq!(responses[0]["result"]["error"]["code"], "invalidRequest");
    }

    #[tokio::test]
    async fn test_bridge_surfaces_engine_errors() {
        let responses = exchange(
            vec![json!({
                "type": "request",
                "id": 3,
                "request": {"action": "deleteWorkspace", "workspaceId": "ws_nope"}
            })],
            1,
        )
        .await;

        assert_eq!(responses[0]["result"]["error"]["code"], "notFound");
    }
}
