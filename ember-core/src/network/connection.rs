//! Framed TCP transport to a single device.
//!
//! A [`Connection`] owns a pair of background tasks: a writer fed by
//! an mpsc channel and a reader that forwards every decoded message
//! as a [`TransportEvent`]. The stream-lifecycle events (end of
//! stream, parse failure) arrive on the same channel, so the consumer
//! sees one ordered sequence of transport activity.
//!
//! Dropping the `Connection` closes the socket: the writer task ends
//! when the send channel closes, which drops the write half.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::EmberCodec;
use crate::error::EmberError;
use crate::message::Message;

/// Transport activity, delivered in arrival order.
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded inbound message.
    Packet(Message),
    /// The peer closed the stream or the link dropped.
    EndOfStream,
    /// Inbound bytes could not be decoded; the reader has stopped.
    ParseError,
}

/// An open transport to one device.
#[derive(Debug)]
pub struct Connection {
    // Channel to the background writer task.
    tx: mpsc::Sender<Message>,
    // Events from the background reader task.
    events: mpsc::Receiver<TransportEvent>,
}

impl Connection {
    /// Open a TCP connection bounded by `timeout` and start the
    /// reader/writer tasks.
    pub async fn open(host: &str, port: u16, timeout: Duration) -> Result<Self, EmberError> {
        let addr = format!("{host}:{port}");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| EmberError::Timeout(timeout))??;
        stream.set_nodelay(true)?;
        debug!("transport open to {addr}");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let (mut net_writer, mut net_reader) = Framed::new(stream, EmberCodec).split();

        // User -> Network
        let (user_tx, mut network_rx) = mpsc::channel::<Message>(100);

        // Network -> User
        let (network_tx, user_rx) = mpsc::channel::<TransportEvent>(100);

        // Writer task: User -> Network
        tokio::spawn(async move {
            while let Some(msg) = network_rx.recv().await {
                if let Err(e) = net_writer.send(msg).await {
                    warn!("transport write error: {e}");
                    break;
                }
            }
            // Flushes and closes the write half.
            let _ = net_writer.close().await;
        });

        // Reader task: Network -> User
        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(msg) => {
                        if network_tx.send(TransportEvent::Packet(msg)).await.is_err() {
                            // Consumer is gone, stop reading.
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("transport decode error: {e}");
                        let _ = network_tx.send(TransportEvent::ParseError).await;
                        return;
                    }
                }
            }
            let _ = network_tx.send(TransportEvent::EndOfStream).await;
        });

        Self {
            tx: user_tx,
            events: user_rx,
        }
    }

    /// Queue a message for transmission.
    ///
    /// Fails with a protocol API error once the link is closed or the
    /// writer has died on a broken socket.
    pub async fn send(&self, msg: Message) -> Result<(), EmberError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| EmberError::Api("send on closed connection".to_string()))
    }

    /// Receive the next transport event.
    ///
    /// `None` means both background tasks are gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}
