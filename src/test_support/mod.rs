//! In-process obs-websocket peer for tests.

use crate::codec;
use crate::model::Record;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const TEST_PASSWORD: &str = "supersecret";
pub const TEST_SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";
pub const TEST_CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";

type Handler = Arc<dyn Fn(&Record) -> Option<Value> + Send + Sync>;

enum PeerCommand {
    Send(String),
    Close,
}

pub struct FakeObs {
    pub url: String,
    received: mpsc::UnboundedReceiver<Record>,
    commands: mpsc::UnboundedSender<PeerCommand>,
    connections: watch::Receiver<usize>,
    task: JoinHandle<()>,
}

impl FakeObs {
    /// `handler` returns the reply body for a request, or `None` to stay
    /// silent. `message-id` is echoed and `status` defaults to `"ok"`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Record) -> Option<Value> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let (commands, mut command_rx) = mpsc::unbounded_channel::<PeerCommand>();
        let (connections_tx, connections) = watch::channel(0usize);

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                connections_tx.send_modify(|n| *n += 1);
                let (mut sink, mut source) = ws.split();
                loop {
                    tokio::select! {
                        msg = source.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let record = codec::decode(&text).unwrap();
                                let _ = received_tx.send(record.clone());
                                if let Some(body) = handler(&record) {
                                    let reply = complete_reply(body, &record);
                                    if sink.send(Message::Text(reply.to_string())).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                        cmd = command_rx.recv() => match cmd {
                            Some(PeerCommand::Send(text)) => {
                                if sink.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            Some(PeerCommand::Close) => {
                                let _ = sink.close().await;
                                break;
                            }
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            url,
            received,
            commands,
            connections,
            task,
        }
    }

    /// Pushes a JSON frame to the connected client.
    pub fn push(&self, value: Value) {
        self.push_raw(value.to_string());
    }

    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.commands.send(PeerCommand::Send(text.into()));
    }

    pub fn drop_connection(&self) {
        let _ = self.commands.send(PeerCommand::Close);
    }

    pub async fn wait_for_client(&self) {
        self.wait_for_connections(1).await;
    }

    pub async fn wait_for_connections(&self, count: usize) {
        let mut connections = self.connections.clone();
        tokio::time::timeout(Duration::from_secs(2), connections.wait_for(|n| *n >= count))
            .await
            .expect("client did not connect")
            .unwrap();
    }

    pub async fn next_request(&mut self) -> Record {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .expect("no request arrived")
            .expect("peer stopped")
    }

    pub fn try_next_request(&mut self) -> Option<Record> {
        self.received.try_recv().ok()
    }

    /// Next request of the given type, skipping any others.
    pub async fn next_request_of(&mut self, request_type: &str) -> Record {
        loop {
            let record = self.next_request().await;
            if record["request-type"] == json!(request_type) {
                return record;
            }
        }
    }
}

impl Drop for FakeObs {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn complete_reply(body: Value, request: &Record) -> Value {
    let mut reply = match body {
        Value::Object(map) => map,
        other => {
            let mut map = Record::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    if let Some(id) = request.get("message-id") {
        reply.entry("message-id").or_insert_with(|| id.clone());
    }
    reply
        .entry("status")
        .or_insert_with(|| Value::String("ok".to_string()));
    Value::Object(reply)
}

/// Answers like an obs-websocket 4.x server. With `password`, the peer
/// requires authentication against `TEST_SALT`/`TEST_CHALLENGE`. Requests of
/// type `Hang` are never answered.
pub fn obs_handler(
    password: Option<&'static str>,
) -> impl Fn(&Record) -> Option<Value> + Send + Sync + 'static {
    move |request: &Record| {
        let request_type = request.get("request-type")?.as_str()?;
        match request_type {
            "GetAuthRequired" => Some(match password {
                Some(_) => json!({
                    "authRequired": true,
                    "challenge": TEST_CHALLENGE,
                    "salt": TEST_SALT
                }),
                None => json!({"authRequired": false}),
            }),
            "Authenticate" => {
                let expected = password.map(|pw| crate::auth::auth_response(pw, TEST_SALT, TEST_CHALLENGE));
                let given = request.get("auth").and_then(Value::as_str);
                if expected.is_some() && given == expected.as_deref() {
                    Some(json!({}))
                } else {
                    Some(json!({"status": "error", "error": "Authentication Failed."}))
                }
            }
            "GetVersion" => Some(json!({
                "version": 1.1,
                "obs-websocket-version": "4.9.1",
                "obs-studio-version": "27.2.4",
                "available-requests": "GetVersion,GetAuthRequired,Authenticate",
                "supported-image-export-formats": "bmp,jpeg,png"
            })),
            "SetCurrentScene" | "SetCurrentProfile" => {
                let key = if request_type == "SetCurrentScene" {
                    "scene-name"
                } else {
                    "profile-name"
                };
                match request.get(key).and_then(Value::as_str) {
                    Some(name) if name.starts_with("missing") => {
                        Some(json!({"status": "error", "error": "requested scene does not exist"}))
                    }
                    Some(_) => Some(json!({})),
                    None => Some(json!({"status": "error", "error": format!("missing {key}")})),
                }
            }
            "Hang" => None,
            _ => Some(json!({})),
        }
    }
}
