use crate::config::ObsConfig;
use crate::error::{ObsError, ObsResult};
use crate::events::{EventFilter, EventSubscription};
use crate::model::{AuthChallenge, Record, Reply, VersionInfo};
use crate::session::{Session, SessionOptions, SessionState, GET_AUTH_REQUIRED};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;

pub const GET_VERSION: &str = "GetVersion";
pub const START_RECORDING: &str = "StartRecording";
pub const STOP_RECORDING: &str = "StopRecording";
pub const START_STREAMING: &str = "StartStreaming";
pub const STOP_STREAMING: &str = "StopStreaming";
pub const SET_CURRENT_SCENE: &str = "SetCurrentScene";
pub const SET_CURRENT_PROFILE: &str = "SetCurrentProfile";

#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    options: SessionOptions,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ObsConfig) -> Self {
        Self {
            options: SessionOptions {
                url: config.endpoint_url(),
                password: config.password.clone(),
                connect_timeout: Duration::from_millis(config.connect_timeout_ms),
                request_timeout: Duration::from_millis(config.request_timeout_ms),
                message_id_length: config.message_id_length,
            },
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.options.url = url.into();
        self
    }

    pub fn address(mut self, host: &str, port: u16) -> Self {
        self.options.url = format!("ws://{host}:{port}");
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.options.password = Some(password.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    pub fn message_id_length(mut self, len: usize) -> Self {
        self.options.message_id_length = len;
        self
    }

    pub fn build(self) -> ObsResult<ObsClient> {
        let url = self.options.url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ObsError::InvalidConfig(format!(
                "endpoint must be a ws:// or wss:// url, got {url:?}"
            )));
        }
        if self.options.request_timeout.is_zero() || self.options.connect_timeout.is_zero() {
            return Err(ObsError::InvalidConfig(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(ObsClient {
            session: Session::new(self.options),
        })
    }

    /// Builds the client and connects it.
    pub async fn connect(self) -> ObsResult<ObsClient> {
        let client = self.build()?;
        client.connect().await?;
        Ok(client)
    }
}

/// Typed obs-websocket commands over a [`Session`].
pub struct ObsClient {
    session: Session,
}

impl ObsClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.session.state_changes()
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        self.session.subscribe(filter)
    }

    pub async fn connect(&self) -> ObsResult<()> {
        self.session.connect().await
    }

    pub async fn close(&self) {
        self.session.close().await
    }

    pub async fn get_version(&self) -> ObsResult<VersionInfo> {
        let reply = self.query(GET_VERSION).await?;
        VersionInfo::from_reply(&reply)
    }

    pub async fn get_auth_info(&self) -> ObsResult<AuthChallenge> {
        let reply = self.query(GET_AUTH_REQUIRED).await?;
        AuthChallenge::from_reply(&reply)
    }

    pub async fn start_recording(&self) -> ObsResult<()> {
        self.command(START_RECORDING, Record::new()).await.map(drop)
    }

    pub async fn stop_recording(&self) -> ObsResult<()> {
        self.command(STOP_RECORDING, Record::new()).await.map(drop)
    }

    pub async fn start_streaming(&self) -> ObsResult<()> {
        self.command(START_STREAMING, Record::new()).await.map(drop)
    }

    pub async fn stop_streaming(&self) -> ObsResult<()> {
        self.command(STOP_STREAMING, Record::new()).await.map(drop)
    }

    pub async fn set_current_scene(&self, scene: &str) -> ObsResult<()> {
        let params = single_param("scene-name", scene);
        self.command(SET_CURRENT_SCENE, params).await.map(drop)
    }

    pub async fn set_current_profile(&self, profile: &str) -> ObsResult<()> {
        let params = single_param("profile-name", profile);
        self.command(SET_CURRENT_PROFILE, params).await.map(drop)
    }

    /// Any request, sent without the `Ready` check. Error replies are
    /// returned as-is.
    pub async fn request(&self, request_type: &str, params: Record) -> ObsResult<Reply> {
        self.session.request(request_type, params).await
    }

    /// Any request that needs an authenticated session; error replies become
    /// `ObsError::Protocol`.
    pub async fn authenticated_request(&self, request_type: &str, params: Record) -> ObsResult<Reply> {
        self.command(request_type, params).await
    }

    async fn query(&self, request_type: &str) -> ObsResult<Reply> {
        self.session
            .request(request_type, Record::new())
            .await?
            .into_result(request_type)
    }

    async fn command(&self, request_type: &str, params: Record) -> ObsResult<Reply> {
        let reply = self.session.authenticated_request(request_type, params).await?;
        reply.into_result(request_type).map_err(|err| {
            tracing::warn!(request_type = %request_type, error = %err, "obs rejected command");
            err
        })
    }
}

fn single_param(key: &str, value: &str) -> Record {
    let mut params = Record::new();
    params.insert(key.to_string(), Value::String(value.to_string()));
    params
}
