//! Agent message channel
//!
//! Ordered, at-most-once transport bound to one fixed local port per
//! agent kind. The agent binds the port; the supervisor connects after
//! spawning it. Framing is newline-delimited JSON. The channel never
//! retries a dropped transport: the supervisor detects the resulting
//! silence through its inter-message-gap timeout.

use crate::agent::types::Envelope;
use crate::error::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

/// Upper bound on one framed line; oversized frames fail the decode.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Connection attempts while the freshly-spawned agent binds its port.
const CONNECT_ATTEMPTS: u32 = 20;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Point-to-point message channel to one agent instance.
pub struct MessageChannel {
    framed: Framed<TcpStream, LinesCodec>,
    port: u16,
    closed: bool,
    last_seq: Option<u64>,
}

impl MessageChannel {
    /// Connect to the agent listening on `port`.
    ///
    /// Retries for a bounded window; the agent needs a moment between
    /// spawn and bind. A channel that never comes up is a spawn failure
    /// as far as the supervisor is concerned.
    pub async fn connect(port: u16) -> Result<Self> {
        let mut last_err = None;
        for attempt in 0..CONNECT_ATTEMPTS {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(stream) => {
                    tracing::debug!(port, attempt, "Agent channel connected");
                    return Ok(Self {
                        framed: Framed::new(
                            stream,
                            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
                        ),
                        port,
                        closed: false,
                        last_seq: None,
                    });
                }
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
        Err(Error::Channel(format!(
            "Failed to connect to agent channel on port {}: {}",
            port,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts".to_string())
        )))
    }

    /// Port this channel is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send one envelope to the agent.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        if self.closed {
            return Err(Error::Channel(format!(
                "Channel on port {} is closed",
                self.port
            )));
        }
        let line = serde_json::to_string(envelope)?;
        self.framed
            .send(line)
            .await
            .map_err(|e| Error::Channel(format!("Send on port {} failed: {}", self.port, e)))
    }

    /// Receive the next envelope, in send order.
    ///
    /// Returns `None` once the channel is closed: by `close()`, by the
    /// peer, or by a transport error (at-most-once: no retry). Malformed
    /// lines are skipped, not fatal.
    pub async fn recv(&mut self) -> Option<Envelope> {
        if self.closed {
            return None;
        }
        loop {
            match self.framed.next().await {
                Some(Ok(line)) => match serde_json::from_str::<Envelope>(&line) {
                    Ok(envelope) => {
                        if let Some(last) = self.last_seq {
                            if envelope.seq <= last {
                                tracing::warn!(
                                    port = self.port,
                                    seq = envelope.seq,
                                    last_seq = last,
                                    "Out-of-order sequence on agent channel"
                                );
                            }
                        }
                        self.last_seq = Some(envelope.seq);
                        return Some(envelope);
                    }
                    Err(e) => {
                        tracing::warn!(
                            port = self.port,
                            error = %e,
                            "Skipping malformed agent message"
                        );
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(port = self.port, error = %e, "Agent channel transport error");
                    self.closed = true;
                    return None;
                }
                None => {
                    tracing::debug!(port = self.port, "Agent channel closed by peer");
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    /// Close the channel. Closing an already-closed channel is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = SinkExt::<String>::close(&mut self.framed).await {
            tracing::debug!(port = self.port, error = %e, "Channel close error (ignored)");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::MessageKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn listen() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_recv_preserves_send_order() {
        let (listener, port) = listen().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for seq in 1..=3u64 {
                let line = serde_json::to_string(&Envelope::heartbeat(seq)).unwrap();
                stream.write_all(line.as_bytes()).await.unwrap();
                stream.write_all(b"\n").await.unwrap();
            }
        });

        let mut channel = MessageChannel::connect(port).await.unwrap();
        for expected in 1..=3u64 {
            let envelope = channel.recv().await.unwrap();
            assert_eq!(envelope.seq, expected);
        }
        assert!(channel.recv().await.is_none());
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let (listener, port) = listen().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"not json at all\n").await.unwrap();
            let line = serde_json::to_string(&Envelope::heartbeat(1)).unwrap();
            stream.write_all(line.as_bytes()).await.unwrap();
            stream.write_all(b"\n").await.unwrap();
        });

        let mut channel = MessageChannel::connect(port).await.unwrap();
        let envelope = channel.recv().await.unwrap();
        assert_eq!(envelope.kind, MessageKind::Heartbeat);
        assert_eq!(envelope.seq, 1);
    }

    #[tokio::test]
    async fn test_send_reaches_agent() {
        let (listener, port) = listen().await;
        let reader = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            String::from_utf8(buf).unwrap()
        });

        let mut channel = MessageChannel::connect(port).await.unwrap();
        channel
            .send(&Envelope::new(
                MessageKind::Status,
                1,
                serde_json::json!({"status": "configured"}),
            ))
            .await
            .unwrap();
        channel.close().await;

        let received = reader.await.unwrap();
        assert!(received.contains("\"status\""));
        assert!(received.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (listener, port) = listen().await;
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let mut channel = MessageChannel::connect(port).await.unwrap();
        channel.close().await;
        channel.close().await;
        assert!(channel.is_closed());
        assert!(channel.recv().await.is_none());
        assert!(channel.send(&Envelope::heartbeat(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_fails_when_nobody_listens() {
        // Bind and drop to get a port that is very likely free.
        let (listener, port) = listen().await;
        drop(listener);

        let result = MessageChannel::connect(port).await;
        assert!(matches!(result, Err(Error::Channel(_))));
    }
}
