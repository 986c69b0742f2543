use crate::correlator::Outbound;
use crate::error::{ObsError, ObsResult};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    /// The socket closed or errored; carries the close reason if any.
    Disconnected(Option<String>),
}

/// An open websocket split into a frame sink, an event source and the two
/// tasks that move frames between them and the socket.
pub struct Connection {
    pub outbound: Outbound,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
    pub writer: JoinHandle<()>,
    pub reader: JoinHandle<()>,
}

impl Connection {
    /// Closes the socket, giving the writer `grace` to send the close frame.
    pub async fn shutdown(self, grace: Duration) {
        drop(self.outbound);
        drop(self.inbound);
        let mut writer = self.writer;
        if tokio::time::timeout(grace, &mut writer).await.is_err() {
            writer.abort();
        }
        self.reader.abort();
    }
}

/// Opens `url` and resolves once the websocket handshake completes.
pub async fn open(url: &str, connect_timeout: Duration) -> ObsResult<Connection> {
    let (ws, _response) = match tokio::time::timeout(connect_timeout, connect_async(url)).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(err)) => return Err(err.into()),
        Err(_) => {
            return Err(ObsError::Connect(format!(
                "{url}: no answer within {} ms",
                connect_timeout.as_millis()
            )))
        }
    };
    let (mut sink, mut stream) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(err) = sink.send(Message::Text(text)).await {
                tracing::warn!(error = %err, "websocket send failed");
                return;
            }
        }
        // All senders dropped: the session is closing.
        if let Err(err) = sink.close().await {
            tracing::debug!(error = %err, "websocket close handshake failed");
        }
    });

    let reader = tokio::spawn(async move {
        let reason = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if in_tx.send(TransportEvent::Text(text)).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => break frame.map(|f| f.reason.to_string()),
                Some(Ok(_)) => {}
                Some(Err(err)) => break Some(err.to_string()),
                None => break None,
            }
        };
        let _ = in_tx.send(TransportEvent::Disconnected(reason));
    });

    Ok(Connection {
        outbound: out_tx,
        inbound: in_rx,
        writer,
        reader,
    })
}
