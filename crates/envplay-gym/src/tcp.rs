//! TCP transport.
//!
//! Adapts a [`TcpStream`] carrying length-prefixed frames (see
//! [`crate::framing`]) into a [`Transport`]. A reader task turns inbound
//! frames into [`TransportEvent`]s and a writer task drains the outbound
//! queue.

use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use envplay_core::error::TransportError;

use crate::framing::{read_frame, write_frame};
use crate::transport::{Transport, TransportEvent};

/// Connect to a remote environment at `addr`.
///
/// # Errors
///
/// Returns [`TransportError::Io`] if the connection cannot be established.
pub async fn connect(addr: impl ToSocketAddrs) -> Result<Transport, TransportError> {
    let stream = TcpStream::connect(addr).await?;
    // Requests are small and latency bound.
    stream.set_nodelay(true)?;
    if let Ok(peer) = stream.peer_addr() {
        info!(%peer, "connected to remote environment");
    }
    Ok(from_stream(stream))
}

/// Wrap an already connected stream. Must be called from within a Tokio
/// runtime.
pub fn from_stream(stream: TcpStream) -> Transport {
    let (mut reader, mut writer) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let events = in_tx.clone();
    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(text)) => {
                    if events.send(TransportEvent::Message(text)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("remote closed the connection");
                    let _ = events.send(TransportEvent::Closed);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "read failed");
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &text).await {
                warn!(error = %e, "write failed");
                let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                break;
            }
        }
    });

    Transport::new(out_tx, in_rx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EnvClient;
    use crate::protocol::{Reply, Request};
    use envplay_core::types::Observation;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn client_talks_to_framed_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let text = read_frame(&mut stream).await.unwrap().unwrap();
            let request: Request = serde_json::from_str(&text).unwrap();
            assert_eq!(request, Request::Reset);
            let reply = Reply::Reset {
                observation: Observation::new("frame-0"),
            };
            write_frame(&mut stream, &reply.to_text()).await.unwrap();
        });

        let client = EnvClient::spawn(connect(addr).await.unwrap());
        let reply = client.reset().await.unwrap();
        assert_eq!(reply.observation.as_str(), "frame-0");
        server.await.unwrap();

        // The server dropped its stream; the next call fails at connection level.
        let err = client.reset().await.unwrap_err();
        assert!(err.is_connection_level());
    }

    #[tokio::test]
    async fn connect_refused_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(addr).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
