use crate::codec::{self, Inbound};
use crate::error::{ObsError, ObsResult};
use crate::model::{Record, Reply, Request};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

pub const DEFAULT_ID_LENGTH: usize = 16;

/// Sink for encoded outbound frames, drained by the transport writer.
pub type Outbound = mpsc::UnboundedSender<String>;

type PendingMap = Arc<Mutex<HashMap<String, PendingRequest>>>;

struct PendingRequest {
    token: u64,
    request_type: String,
    responder: oneshot::Sender<ObsResult<Reply>>,
    created_at: Instant,
}

/// Outcome of routing one decoded inbound record.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Resolved { message_id: String },
    UnknownId(String),
    /// No correlation id; belongs to the event dispatcher.
    Unsolicited(Record),
}

/// Tracks in-flight requests and matches replies to them by `message-id`.
pub struct Correlator {
    pending: PendingMap,
    id_length: usize,
    next_token: AtomicU64,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::with_id_length(DEFAULT_ID_LENGTH)
    }

    pub fn with_id_length(id_length: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            id_length: id_length.max(1),
            next_token: AtomicU64::new(1),
        }
    }

    /// Draws an id that is not currently pending. The id is not reserved;
    /// `submit` performs draw and registration under a single lock.
    pub fn next_id(&self) -> String {
        let pending = lock(&self.pending);
        unique_id(&pending, self.id_length)
    }

    pub fn submit(
        &self,
        request_type: &str,
        params: Record,
        outbound: &Outbound,
    ) -> ObsResult<ReplyHandle> {
        if outbound.is_closed() {
            return Err(ObsError::TransportUnavailable);
        }

        let (tx, rx) = oneshot::channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let message_id = {
            let mut pending = lock(&self.pending);
            let id = unique_id(&pending, self.id_length);
            pending.insert(
                id.clone(),
                PendingRequest {
                    token,
                    request_type: request_type.to_string(),
                    responder: tx,
                    created_at: Instant::now(),
                },
            );
            id
        };

        let request = Request {
            message_id: message_id.clone(),
            request_type: request_type.to_string(),
            params,
        };
        let frame = match codec::encode(&request) {
            Ok(frame) => frame,
            Err(err) => {
                remove_if_token(&self.pending, &message_id, token);
                return Err(err);
            }
        };
        if outbound.send(frame).is_err() {
            remove_if_token(&self.pending, &message_id, token);
            return Err(ObsError::TransportUnavailable);
        }
        tracing::debug!(message_id = %message_id, request_type = %request_type, "request sent");

        Ok(ReplyHandle {
            message_id,
            request_type: request_type.to_string(),
            token,
            rx,
            pending: self.pending.clone(),
        })
    }

    pub fn on_inbound(&self, record: Record) -> Routed {
        let (message_id, record) = match codec::classify(record) {
            Inbound::Reply { message_id, record } => (message_id, record),
            Inbound::Event(record) | Inbound::Unrecognized(record) => {
                return Routed::Unsolicited(record)
            }
        };

        let entry = lock(&self.pending).remove(&message_id);
        let Some(entry) = entry else {
            tracing::warn!(
                message_id = %message_id,
                "{}; dropping",
                ObsError::UnknownCorrelationId(message_id.clone())
            );
            return Routed::UnknownId(message_id);
        };

        let result = Reply::from_record(record);
        if let Err(err) = &result {
            tracing::warn!(
                message_id = %message_id,
                request_type = %entry.request_type,
                error = %err,
                "reply could not be parsed"
            );
        }
        tracing::debug!(
            message_id = %message_id,
            request_type = %entry.request_type,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "reply matched"
        );
        let _ = entry.responder.send(result);
        Routed::Resolved { message_id }
    }

    /// Drains the pending set, failing every waiter with `reason()`.
    pub fn fail_all<F>(&self, reason: F) -> usize
    where
        F: Fn() -> ObsError,
    {
        let drained: Vec<(String, PendingRequest)> = lock(&self.pending).drain().collect();
        let count = drained.len();
        for (message_id, entry) in drained {
            tracing::debug!(
                message_id = %message_id,
                request_type = %entry.request_type,
                "failing pending request"
            );
            let _ = entry.responder.send(Err(reason()));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.pending).keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
}

/// Caller's side of one pending request. Dropping it cancels the request.
pub struct ReplyHandle {
    message_id: String,
    request_type: String,
    token: u64,
    rx: oneshot::Receiver<ObsResult<Reply>>,
    pending: PendingMap,
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("message_id", &self.message_id)
            .field("request_type", &self.request_type)
            .finish_non_exhaustive()
    }
}

impl ReplyHandle {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub async fn wait(mut self, deadline: Duration) -> ObsResult<Reply> {
        let outcome = tokio::time::timeout(deadline, &mut self.rx).await;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ObsError::ConnectionLost),
            Err(_) => {
                if !remove_if_token(&self.pending, &self.message_id, self.token) {
                    // Resolved between the deadline firing and the removal.
                    if let Ok(result) = self.rx.try_recv() {
                        return result;
                    }
                }
                tracing::warn!(
                    message_id = %self.message_id,
                    request_type = %self.request_type,
                    deadline_ms = deadline.as_millis() as u64,
                    "request timed out"
                );
                Err(ObsError::TimedOut {
                    message_id: self.message_id.clone(),
                    after: deadline,
                })
            }
        }
    }
}

impl Drop for ReplyHandle {
    fn drop(&mut self) {
        remove_if_token(&self.pending, &self.message_id, self.token);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the entry only if it still belongs to the request that created it;
/// the id may have been reused after the original entry resolved.
fn remove_if_token(pending: &PendingMap, message_id: &str, token: u64) -> bool {
    let mut pending = lock(pending);
    match pending.get(message_id) {
        Some(entry) if entry.token == token => {
            pending.remove(message_id);
            true
        }
        _ => false,
    }
}

fn unique_id(pending: &HashMap<String, PendingRequest>, len: usize) -> String {
    loop {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        if !pending.contains_key(&id) {
            return id;
        }
        tracing::trace!(message_id = %id, "message-id collision, redrawing");
    }
}
