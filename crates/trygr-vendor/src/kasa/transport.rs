//! Transport used to reach Kasa plugs

use super::protocol::{decrypt, frame, HEADER_LEN};
use super::{KasaError, KasaResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Largest reply accepted from a plug
const MAX_REPLY_LEN: usize = 64 * 1024;

/// Sends one JSON command to a plug and returns its reply
#[async_trait]
pub trait KasaTransport: Send + Sync {
    async fn request(&self, host: &str, port: u16, payload: &Value) -> KasaResult<Value>;
}

/// Framed TCP transport, one connection per request
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(&self, host: &str, port: u16, payload: &Value) -> KasaResult<Value> {
        let body = serde_json::to_vec(payload)?;
        let mut stream = TcpStream::connect((host, port)).await?;
        stream.write_all(&frame(&body)).await?;

        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await?;
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_REPLY_LEN {
            return Err(KasaError::Protocol(format!("reply of {len} bytes is too large")));
        }

        let mut reply = vec![0u8; len];
        stream.read_exact(&mut reply).await?;
        Ok(serde_json::from_slice(&decrypt(&reply))?)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000))
    }
}

#[async_trait]
impl KasaTransport for TcpTransport {
    #[instrument(skip(self, payload))]
    async fn request(&self, host: &str, port: u16, payload: &Value) -> KasaResult<Value> {
        debug!(%payload, "Sending Kasa command");
        timeout(self.timeout, self.exchange(host, port, payload))
            .await
            .map_err(|_| KasaError::Timeout {
                host: host.to_string(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::super::protocol::encrypt;
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Minimal plug: decodes one request and answers with a fixed reply
    async fn fake_plug(reply: Value) -> (u16, tokio::task::JoinHandle<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let len = socket.read_u32().await.unwrap() as usize;
            let mut body = vec![0u8; len];
            socket.read_exact(&mut body).await.unwrap();
            let request: Value = serde_json::from_slice(&decrypt(&body)).unwrap();

            let out = serde_json::to_vec(&reply).unwrap();
            socket.write_u32(out.len() as u32).await.unwrap();
            socket.write_all(&encrypt(&out)).await.unwrap();
            request
        });

        (port, handle)
    }

    #[tokio::test]
    async fn test_request_round_trip_over_tcp() {
        let reply = json!({"system": {"set_relay_state": {"err_code": 0}}});
        let (port, plug) = fake_plug(reply.clone()).await;

        let transport = TcpTransport::default();
        let payload = json!({"system": {"set_relay_state": {"state": 1}}});
        let got = transport.request("127.0.0.1", port, &payload).await.unwrap();

        assert_eq!(got, reply);
        assert_eq!(plug.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept but never answer
        let _hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let transport = TcpTransport::new(Duration::from_millis(50));
        let err = transport
            .request("127.0.0.1", port, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, KasaError::Timeout { .. }));
    }
}
