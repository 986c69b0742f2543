use crate::auth;
use crate::codec;
use crate::correlator::{Correlator, Outbound, Routed, DEFAULT_ID_LENGTH};
use crate::error::{ObsError, ObsResult};
use crate::events::{EventDispatcher, EventFilter, EventSubscription};
use crate::model::{AuthChallenge, Record, Reply, ReplyStatus};
use crate::transport::{self, Connection, TransportEvent};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:4444";
pub const GET_AUTH_REQUIRED: &str = "GetAuthRequired";
pub const AUTHENTICATE: &str = "Authenticate";

const CLOSE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingAuthDecision,
    Authenticating,
    Ready,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingAuthDecision => "awaiting_auth_decision",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct SessionOptions {
    pub url: String,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub message_id_length: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            password: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            message_id_length: DEFAULT_ID_LENGTH,
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("url", &self.url)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("message_id_length", &self.message_id_length)
            .finish()
    }
}

/// Tasks and frame sink of one open connection. `generation` is the epoch
/// that opened it.
struct Link {
    generation: u64,
    outbound: Outbound,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    pump: JoinHandle<()>,
}

impl Link {
    async fn shutdown(mut self) {
        self.pump.abort();
        drop(self.outbound);
        if tokio::time::timeout(CLOSE_GRACE, &mut self.writer).await.is_err() {
            self.writer.abort();
        }
        self.reader.abort();
    }

    fn abort(self) {
        self.pump.abort();
        self.writer.abort();
        self.reader.abort();
    }
}

struct Shared {
    correlator: Correlator,
    events: EventDispatcher,
    state: watch::Sender<SessionState>,
    link: Mutex<Option<Link>>,
    /// Bumped by every connect claim, close and disconnect. Only written
    /// while the state channel is locked; handshake steps apply only while
    /// their epoch is current.
    epoch: AtomicU64,
    handshake: tokio::sync::Mutex<()>,
}

impl Shared {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Moves from one of `from` to `next` and starts a new epoch.
    fn claim(&self, from: &[SessionState], next: SessionState) -> Option<u64> {
        let mut prev = next;
        let mut claimed = None;
        self.state.send_if_modified(|state| {
            if !from.contains(state) {
                return false;
            }
            prev = *state;
            *state = next;
            claimed = Some(self.epoch.fetch_add(1, Ordering::SeqCst) + 1);
            true
        });
        if claimed.is_some() {
            tracing::info!(from = %prev, to = %next, "session state changed");
        }
        claimed
    }

    /// Moves to `next` only while `epoch` is current and the state is one
    /// of `from`.
    fn advance(&self, epoch: u64, from: &[SessionState], next: SessionState) -> bool {
        let mut prev = next;
        let changed = self.state.send_if_modified(|state| {
            if self.current_epoch() != epoch || !from.contains(state) {
                return false;
            }
            prev = *state;
            *state = next;
            true
        });
        if changed {
            tracing::info!(from = %prev, to = %next, "session state changed");
        }
        changed
    }

    /// Returns to `Disconnected` under a new epoch. With `only`, nothing
    /// happens unless that epoch is still current.
    fn reset(&self, only: Option<u64>) -> bool {
        let mut prev = SessionState::Disconnected;
        let mut reset = false;
        self.state.send_if_modified(|state| {
            let current = self.current_epoch();
            if only.is_some_and(|epoch| epoch != current) {
                return false;
            }
            self.epoch.store(current + 1, Ordering::SeqCst);
            reset = true;
            prev = *state;
            *state = SessionState::Disconnected;
            prev != SessionState::Disconnected
        });
        let next = SessionState::Disconnected;
        if reset && prev != next {
            tracing::info!(from = %prev, to = %next, "session state changed");
        }
        reset
    }

    fn route(&self, text: &str) {
        let record = match codec::decode(text) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(error = %err, "dropping inbound frame");
                return;
            }
        };
        if let Routed::Unsolicited(record) = self.correlator.on_inbound(record) {
            self.events.publish(record);
        }
    }

    fn on_disconnected(&self, generation: u64, reason: Option<String>) {
        let link = {
            let mut guard = lock(&self.link);
            if guard.as_ref().map(|link| link.generation) != Some(generation) {
                return;
            }
            guard.take()
        };
        if self.reset(Some(generation)) {
            let failed = self.correlator.fail_all(|| ObsError::ConnectionLost);
            tracing::info!(reason = ?reason, failed_requests = failed, "disconnected from obs");
        } else {
            tracing::debug!(reason = ?reason, "superseded connection closed");
        }
        drop(link);
    }
}

async fn receive_loop(
    shared: Arc<Shared>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut reason = None;
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Text(text) => shared.route(&text),
            TransportEvent::Disconnected(r) => {
                reason = r;
                break;
            }
        }
    }
    shared.on_disconnected(generation, reason);
}

/// One obs-websocket session: connection lifecycle, auth handshake and the
/// request path. Dropping the session tears down its connection.
pub struct Session {
    options: SessionOptions,
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let shared = Arc::new(Shared {
            correlator: Correlator::with_id_length(options.message_id_length),
            events: EventDispatcher::new(),
            state,
            link: Mutex::new(None),
            epoch: AtomicU64::new(0),
            handshake: tokio::sync::Mutex::new(()),
        });
        Self { options, shared }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        self.shared.events.subscribe(filter)
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    /// Opens the connection and runs the auth handshake. Resolves once the
    /// session is `Ready`, or left unauthenticated because the peer wants a
    /// password and none was configured.
    pub async fn connect(&self) -> ObsResult<()> {
        let Some(epoch) = self.shared.claim(
            &[SessionState::Disconnected, SessionState::Failed],
            SessionState::Connecting,
        ) else {
            tracing::warn!(state = %self.state(), "connect rejected");
            return Err(ObsError::AlreadyConnected);
        };

        // A failed handshake may have left its connection open.
        let stale = lock(&self.shared.link).take();
        if let Some(link) = stale {
            link.shutdown().await;
            self.shared.correlator.fail_all(|| ObsError::ConnectionLost);
        }
        let _handshake = self.shared.handshake.lock().await;

        tracing::info!(url = %self.options.url, "connecting to obs");
        let connection = match transport::open(&self.options.url, self.options.connect_timeout).await {
            Ok(connection) => connection,
            Err(err) => {
                tracing::warn!(url = %self.options.url, error = %err, "connect failed");
                self.shared
                    .advance(epoch, &[SessionState::Connecting], SessionState::Failed);
                return Err(err);
            }
        };
        if let Err(connection) = self.install(epoch, connection) {
            tracing::info!("session closed while the socket was opening");
            connection.shutdown(CLOSE_GRACE).await;
            return Err(ObsError::ConnectionLost);
        }

        // Whoever moved the epoch on also owns the installed link.
        if !self.shared.advance(
            epoch,
            &[SessionState::Connecting],
            SessionState::AwaitingAuthDecision,
        ) {
            return Err(ObsError::ConnectionLost);
        }

        self.handshake(epoch, self.options.password.as_deref()).await
    }

    /// Retries the challenge/response with `password` on a session that is
    /// connected but not yet authenticated. Fails with `AlreadyConnected`
    /// while another handshake is running.
    pub async fn authenticate(&self, password: &str) -> ObsResult<()> {
        let Ok(_handshake) = self.shared.handshake.try_lock() else {
            tracing::warn!("authenticate rejected: handshake already in flight");
            return Err(ObsError::AlreadyConnected);
        };
        let epoch = self.shared.current_epoch();
        match self.state() {
            SessionState::AwaitingAuthDecision => {}
            SessionState::Failed => {
                if !self.shared.advance(
                    epoch,
                    &[SessionState::Failed],
                    SessionState::AwaitingAuthDecision,
                ) {
                    return Err(ObsError::ConnectionLost);
                }
            }
            SessionState::Ready => return Ok(()),
            _ => return Err(ObsError::TransportUnavailable),
        }
        self.handshake(epoch, Some(password)).await
    }

    async fn handshake(&self, epoch: u64, password: Option<&str>) -> ObsResult<()> {
        let result = self.run_handshake(epoch, password).await;
        if let Err(err) = &result {
            tracing::warn!(error = %err, "handshake failed");
            self.shared.advance(
                epoch,
                &[SessionState::AwaitingAuthDecision, SessionState::Authenticating],
                SessionState::Failed,
            );
        }
        result
    }

    async fn run_handshake(&self, epoch: u64, password: Option<&str>) -> ObsResult<()> {
        let reply = self
            .request(GET_AUTH_REQUIRED, Record::new())
            .await?
            .into_result(GET_AUTH_REQUIRED)?;
        let challenge = AuthChallenge::from_reply(&reply)?;

        if !challenge.auth_required {
            if !self.shared.advance(
                epoch,
                &[SessionState::AwaitingAuthDecision],
                SessionState::Ready,
            ) {
                return Err(ObsError::ConnectionLost);
            }
            return Ok(());
        }

        let Some(password) = password else {
            tracing::warn!("obs requires authentication but no password is configured; privileged commands will be rejected");
            return Ok(());
        };

        if !self.shared.advance(
            epoch,
            &[SessionState::AwaitingAuthDecision],
            SessionState::Authenticating,
        ) {
            return Err(ObsError::ConnectionLost);
        }
        let mut params = Record::new();
        params.insert(
            "auth".to_string(),
            Value::String(auth::auth_response(password, &challenge.salt, &challenge.challenge)),
        );
        let reply = self.request(AUTHENTICATE, params).await?;
        match reply.status {
            ReplyStatus::Ok => {
                if !self.shared.advance(
                    epoch,
                    &[SessionState::Authenticating],
                    SessionState::Ready,
                ) {
                    return Err(ObsError::ConnectionLost);
                }
                tracing::info!("authenticated with obs");
                Ok(())
            }
            ReplyStatus::Error => Err(ObsError::AuthenticationFailed(
                reply
                    .error
                    .unwrap_or_else(|| "rejected by peer".to_string()),
            )),
        }
    }

    /// Adopts `connection` as the live link unless `epoch` has been
    /// superseded, in which case the connection is handed back.
    fn install(&self, epoch: u64, connection: Connection) -> Result<(), Connection> {
        let mut guard = lock(&self.shared.link);
        if self.shared.current_epoch() != epoch {
            return Err(connection);
        }
        let Connection {
            outbound,
            inbound,
            writer,
            reader,
        } = connection;
        let pump = tokio::spawn(receive_loop(self.shared.clone(), epoch, inbound));
        let replaced = guard.replace(Link {
            generation: epoch,
            outbound,
            writer,
            reader,
            pump,
        });
        if let Some(old) = replaced {
            old.abort();
        }
        Ok(())
    }

    fn outbound(&self) -> ObsResult<Outbound> {
        match self.state() {
            SessionState::Disconnected | SessionState::Connecting => {
                return Err(ObsError::TransportUnavailable)
            }
            _ => {}
        }
        lock(&self.shared.link)
            .as_ref()
            .map(|link| link.outbound.clone())
            .ok_or(ObsError::TransportUnavailable)
    }

    /// Sends a request on any open connection and waits for its reply with the
    /// configured timeout. Error replies are returned as `Ok`.
    pub async fn request(&self, request_type: &str, params: Record) -> ObsResult<Reply> {
        self.request_with_timeout(request_type, params, self.options.request_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        request_type: &str,
        params: Record,
        timeout: Duration,
    ) -> ObsResult<Reply> {
        let outbound = self.outbound()?;
        let handle = self.shared.correlator.submit(request_type, params, &outbound)?;
        drop(outbound);
        handle.wait(timeout).await
    }

    /// Like `request`, but only once the session is `Ready`. Otherwise nothing
    /// is sent and the call fails with `NotAuthenticated`.
    pub async fn authenticated_request(&self, request_type: &str, params: Record) -> ObsResult<Reply> {
        let state = self.state();
        if state != SessionState::Ready {
            tracing::warn!(request_type = %request_type, state = %state, "not authenticated; command not sent");
            return Err(ObsError::NotAuthenticated);
        }
        self.request(request_type, params).await
    }

    /// Fails pending requests, closes the socket and returns to
    /// `Disconnected`. Closing a closed session does nothing.
    pub async fn close(&self) {
        self.shared.reset(None);
        let link = lock(&self.shared.link).take();
        if let Some(link) = &link {
            link.pump.abort();
        }
        let failed = self.shared.correlator.fail_all(|| ObsError::ConnectionLost);
        if let Some(link) = link {
            link.shutdown().await;
            tracing::info!(failed_requests = failed, "session closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let link = lock(&self.shared.link).take();
        if let Some(link) = link {
            link.abort();
        }
        self.shared.correlator.fail_all(|| ObsError::ConnectionLost);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{obs_handler, FakeObs, TEST_CHALLENGE, TEST_PASSWORD, TEST_SALT};
    use serde_json::json;

    fn options(url: &str, password: Option<&str>) -> SessionOptions {
        SessionOptions {
            url: url.to_string(),
            password: password.map(str::to_string),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            ..SessionOptions::default()
        }
    }

    #[tokio::test]
    async fn open_peer_goes_straight_to_ready() {
        let mut fake = FakeObs::start(obs_handler(None)).await;
        let session = Session::new(options(&fake.url, None));
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        let first = fake.next_request().await;
        assert_eq!(first["request-type"], json!("GetAuthRequired"));
        assert!(fake.try_next_request().is_none());
    }

    #[tokio::test]
    async fn password_protected_peer_authenticates() {
        let mut fake = FakeObs::start(obs_handler(Some(TEST_PASSWORD))).await;
        let session = Session::new(options(&fake.url, Some(TEST_PASSWORD)));
        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        let auth = fake.next_request_of("Authenticate").await;
        assert_eq!(
            auth["auth"],
            json!(auth::auth_response(TEST_PASSWORD, TEST_SALT, TEST_CHALLENGE))
        );
    }

    #[tokio::test]
    async fn wrong_password_fails_but_keeps_queries_working() {
        let fake = FakeObs::start(obs_handler(Some(TEST_PASSWORD))).await;
        let session = Session::new(options(&fake.url, Some("wrong")));
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, ObsError::AuthenticationFailed(ref msg) if msg == "Authentication Failed."));
        assert_eq!(session.state(), SessionState::Failed);

        let reply = session.request("GetVersion", Record::new()).await.unwrap();
        assert!(reply.is_ok());
        let err = session
            .authenticated_request("StartRecording", Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ObsError::NotAuthenticated));
    }

    #[tokio::test]
    async fn missing_password_leaves_session_unauthenticated() {
        let mut fake = FakeObs::start(obs_handler(Some(TEST_PASSWORD))).await;
        let session = Session::new(options(&fake.url, None));
        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::AwaitingAuthDecision);
        fake.next_request_of("GetAuthRequired").await;

        let err = session
            .authenticated_request("StartRecording", Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ObsError::NotAuthenticated));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fake.try_next_request().is_none(), "no frame may be sent");

        session.authenticate(TEST_PASSWORD).await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn concurrent_authenticate_runs_one_handshake() {
        let mut fake = FakeObs::start(obs_handler(Some(TEST_PASSWORD))).await;
        let session = Session::new(options(&fake.url, None));
        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::AwaitingAuthDecision);
        fake.next_request_of("GetAuthRequired").await;

        let (a, b) = tokio::join!(
            session.authenticate(TEST_PASSWORD),
            session.authenticate(TEST_PASSWORD)
        );
        assert!(a.is_ok());
        assert!(matches!(b, Err(ObsError::AlreadyConnected)));
        assert_eq!(session.state(), SessionState::Ready);

        fake.next_request_of("Authenticate").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fake.try_next_request().is_none(), "only one handshake may run");
    }

    #[tokio::test]
    async fn authenticate_during_connect_handshake_is_rejected() {
        let fake = FakeObs::start(obs_handler(Some(TEST_PASSWORD))).await;
        let session = Session::new(options(&fake.url, Some(TEST_PASSWORD)));
        let mut states = session.state_changes();

        let (connected, retried) = tokio::join!(session.connect(), async {
            states
                .wait_for(|s| {
                    matches!(
                        s,
                        SessionState::AwaitingAuthDecision | SessionState::Authenticating
                    )
                })
                .await
                .unwrap();
            session.authenticate(TEST_PASSWORD).await
        });
        connected.unwrap();
        assert!(matches!(retried, Err(ObsError::AlreadyConnected)));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn close_then_reconnect_while_first_open_is_pending() {
        let fake = FakeObs::start(obs_handler(None)).await;
        let session = Session::new(options(&fake.url, None));
        let mut states = session.state_changes();

        let (first, second) = tokio::join!(session.connect(), async {
            states
                .wait_for(|s| *s == SessionState::Connecting)
                .await
                .unwrap();
            session.close().await;
            session.connect().await
        });
        assert!(matches!(first, Err(ObsError::ConnectionLost)));
        second.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.request("GetVersion", Record::new()).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn concurrent_connect_is_rejected() {
        let fake = FakeObs::start(obs_handler(None)).await;
        let session = Session::new(options(&fake.url, None));
        let (a, b) = tokio::join!(session.connect(), session.connect());
        let oks = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(oks, 1);
        assert!(matches!(a.err().or(b.err()), Some(ObsError::AlreadyConnected)));
        assert!(matches!(session.connect().await, Err(ObsError::AlreadyConnected)));
    }

    #[tokio::test]
    async fn unreachable_peer_moves_to_failed_and_can_retry() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);
        let session = Session::new(options(&url, None));
        assert!(matches!(session.connect().await, Err(ObsError::WebSocket(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(session.connect().await, Err(ObsError::WebSocket(_))));
    }

    #[tokio::test]
    async fn request_before_connect_is_transport_unavailable() {
        let session = Session::new(SessionOptions::default());
        let err = session.request("GetVersion", Record::new()).await.unwrap_err();
        assert!(matches!(err, ObsError::TransportUnavailable));
    }

    #[tokio::test]
    async fn peer_disconnect_fails_every_pending_request() {
        let fake = FakeObs::start(obs_handler(None)).await;
        let session = Session::new(options(&fake.url, None));
        session.connect().await.unwrap();

        let (a, b, c, _) = tokio::join!(
            session.request("Hang", Record::new()),
            session.request("Hang", Record::new()),
            session.request("Hang", Record::new()),
            async {
                while session.pending_requests() < 3 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                fake.drop_connection();
            }
        );
        for result in [a, b, c] {
            assert!(matches!(result, Err(ObsError::ConnectionLost)));
        }
        assert_eq!(session.pending_requests(), 0);

        let mut states = session.state_changes();
        tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| *s == SessionState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(
            session.request("GetVersion", Record::new()).await,
            Err(ObsError::TransportUnavailable)
        ));
    }

    #[tokio::test]
    async fn reconnects_after_peer_disconnect() {
        let fake = FakeObs::start(obs_handler(None)).await;
        let session = Session::new(options(&fake.url, None));
        session.connect().await.unwrap();
        fake.drop_connection();

        let mut states = session.state_changes();
        tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| *s == SessionState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();

        session.connect().await.unwrap();
        fake.wait_for_connections(2).await;
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.request("GetVersion", Record::new()).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn close_cancels_pending_and_is_idempotent() {
        let fake = FakeObs::start(obs_handler(None)).await;
        let session = Session::new(options(&fake.url, None));
        session.connect().await.unwrap();

        let (pending, _) = tokio::join!(session.request("Hang", Record::new()), async {
            while session.pending_requests() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            session.close().await;
        });
        assert!(matches!(pending, Err(ObsError::ConnectionLost)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.pending_requests(), 0);

        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn unanswered_request_times_out_and_is_forgotten() {
        let fake = FakeObs::start(obs_handler(None)).await;
        let session = Session::new(options(&fake.url, None));
        session.connect().await.unwrap();
        let err = session
            .request_with_timeout("Hang", Record::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ObsError::TimedOut { .. }));
        assert_eq!(session.pending_requests(), 0);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn unsolicited_frames_reach_subscribers_and_junk_is_ignored() {
        let fake = FakeObs::start(obs_handler(None)).await;
        let session = Session::new(options(&fake.url, None));
        let mut events = session.subscribe(EventFilter::of_type("RecordingStarted"));
        session.connect().await.unwrap();

        fake.push_raw("this is not json");
        fake.push(json!({"message-id": "nobody-asked", "status": "ok"}));
        fake.push(json!({"update-type": "RecordingStarted", "recordingFilename": "a.mkv"}));

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.payload["recordingFilename"], json!("a.mkv"));
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.request("GetVersion", Record::new()).await.unwrap().is_ok());
    }
}
