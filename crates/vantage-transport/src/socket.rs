//! Persistent WebSocket client for the alignment protocol.
//!
//! [`LocalizationSocket`] keeps one connection open for the whole session.
//! Outbound frames go through the write half under a lock; a reader task
//! owns the read half, decodes every binary message and forwards only the
//! response whose id matches the most recently sent request. Anything else
//! is logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use vantage_types::{GeoPosition, VantageError};

use crate::channel::LocalizationChannel;
use crate::messages::{LocalizationRequest, LocalizationResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how patiently to connect.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// `None` waits for a response until the session budget runs out.
    pub request_timeout: Option<Duration>,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Alignment endpoint for a session anchored at `fix`.
    pub fn alignment(ws_base: &str, fix: GeoPosition, token: &str) -> Self {
        Self::new(format!(
            "{}/alignment/ws?latitude={}&longitude={}&token={}",
            ws_base.trim_end_matches('/'),
            fix.latitude,
            fix.longitude,
            token
        ))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

struct Connection {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
    open: Arc<AtomicBool>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// WebSocket client with request-id correlation.
pub struct LocalizationSocket {
    config: SocketConfig,
    conn: Mutex<Option<Connection>>,
    expected: Arc<StdMutex<Option<u64>>>,
    responses_tx: mpsc::UnboundedSender<LocalizationResponse>,
    responses_rx: Mutex<mpsc::UnboundedReceiver<LocalizationResponse>>,
}

impl LocalizationSocket {
    pub fn new(config: SocketConfig) -> Self {
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        Self {
            config,
            conn: Mutex::new(None),
            expected: Arc::new(StdMutex::new(None)),
            responses_tx,
            responses_rx: Mutex::new(responses_rx),
        }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Open the connection, or do nothing if it is already open.
    ///
    /// # Errors
    ///
    /// [`VantageError::ConnectTimeout`] when the handshake does not finish
    /// within the configured timeout, [`VantageError::Transport`] when it
    /// fails outright.
    pub async fn connect(&self) -> Result<(), VantageError> {
        let mut guard = self.conn.lock().await;
        if guard
            .as_ref()
            .is_some_and(|c| c.open.load(Ordering::SeqCst))
        {
            debug!("localization socket already open");
            return Ok(());
        }

        let timeout = self.config.connect_timeout;
        let (ws, _) = tokio::time::timeout(timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| VantageError::ConnectTimeout(timeout.as_millis() as u64))?
            .map_err(|e| VantageError::Transport(format!("ws connect: {e}")))?;

        let (sink, stream) = ws.split();
        let open = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(
            stream,
            Arc::clone(&self.expected),
            self.responses_tx.clone(),
            Arc::clone(&open),
        ));
        *guard = Some(Connection { sink, reader, open });
        info!("localization socket connected");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.open.load(Ordering::SeqCst))
    }

    /// Send `blob` as the frame of request `request_id`.
    ///
    /// From now on only a response carrying `request_id` is delivered.
    pub async fn send(&self, request_id: u64, blob: Vec<u8>) -> Result<(), VantageError> {
        *self.expected.lock().unwrap_or_else(PoisonError::into_inner) = Some(request_id);

        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .filter(|c| c.open.load(Ordering::SeqCst))
            .ok_or_else(|| VantageError::Transport("socket is not connected".to_string()))?;

        let len = blob.len();
        conn.sink
            .send(Message::Binary(blob.into()))
            .await
            .map_err(|e| VantageError::Transport(format!("ws send: {e}")))?;
        debug!(request_id, bytes = len, "frame sent");
        Ok(())
    }

    /// Wait for the response to `request_id`.
    ///
    /// # Errors
    ///
    /// [`VantageError::RequestTimeout`] when a request timeout is configured
    /// and elapses first.
    pub async fn response(&self, request_id: u64) -> Result<LocalizationResponse, VantageError> {
        let mut rx = self.responses_rx.lock().await;
        let wait = async {
            loop {
                match rx.recv().await {
                    Some(resp) if resp.request_id == request_id => return Ok(resp),
                    Some(resp) => {
                        warn!(
                            expected = request_id,
                            received = resp.request_id,
                            "discarding response queued for an earlier request"
                        );
                    }
                    None => {
                        return Err(VantageError::Channel("response queue closed".to_string()));
                    }
                }
            }
        };

        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| VantageError::RequestTimeout(request_id))?,
            None => wait.await,
        }
    }

    /// Close the connection. A later `connect` opens a fresh one.
    pub async fn close(&self) {
        if let Some(mut conn) = self.conn.lock().await.take() {
            let _ = conn.sink.close().await;
            conn.open.store(false, Ordering::SeqCst);
            info!("localization socket closed");
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    expected: Arc<StdMutex<Option<u64>>>,
    responses: mpsc::UnboundedSender<LocalizationResponse>,
    open: Arc<AtomicBool>,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Binary(data)) => match LocalizationResponse::decode(&data) {
                Ok(resp) => {
                    let current = *expected.lock().unwrap_or_else(PoisonError::into_inner);
                    if current == Some(resp.request_id) {
                        let _ = responses.send(resp);
                    } else {
                        let err = VantageError::ResponseMismatch {
                            expected: current.unwrap_or_default(),
                            received: resp.request_id,
                        };
                        error!(error = %err, "dropping stray response");
                    }
                }
                Err(e) => warn!(error = %e, "undecodable response"),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => debug!(text = %text.as_str(), "ignoring text frame"),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "localization socket read failed");
                break;
            }
        }
    }
    open.store(false, Ordering::SeqCst);
    info!("localization socket reader finished");
}

#[async_trait]
impl LocalizationChannel for LocalizationSocket {
    async fn connect(&self) -> Result<(), VantageError> {
        LocalizationSocket::connect(self).await
    }

    async fn send_frame(&self, request: &LocalizationRequest) -> Result<(), VantageError> {
        self.send(request.request_id, request.encode()).await
    }

    async fn await_response(&self, request_id: u64) -> Result<LocalizationResponse, VantageError> {
        self.response(request_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ExternalParameters, InternalParameters, ResponseOffsets};
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use vantage_geo::Quaternion;

    fn request(request_id: u64, order: u32) -> LocalizationRequest {
        LocalizationRequest::alignment(
            request_id,
            ExternalParameters {
                position: GeoPosition::new(37.0, -122.0, 5.0),
                orientation: Quaternion::identity(),
            },
            InternalParameters {
                scene_width: 2,
                scene_height: 2,
                fov: 60.0,
                projection: [0.0; 16],
            },
            2,
            order,
            vec![1, 2, 3],
        )
    }

    /// Fake service: answers after `frames` requests, first with a stray id
    /// and then with the real one.
    async fn spawn_service(frames: usize, accepted: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let ws = accept_async(stream).await.unwrap();
                    let (mut tx, mut rx) = ws.split();
                    let mut seen = Vec::new();
                    while let Some(Ok(msg)) = rx.next().await {
                        if let Message::Binary(data) = msg {
                            seen.push(LocalizationRequest::decode(&data).unwrap());
                        }
                        if seen.len() == frames {
                            let id = seen[0].request_id;
                            let stray = LocalizationResponse::failure(id + 10, 1, "stray");
                            let real = LocalizationResponse::success(id, ResponseOffsets::default());
                            tx.send(Message::Binary(stray.encode().into())).await.unwrap();
                            tx.send(Message::Binary(real.encode().into())).await.unwrap();
                            seen.clear();
                        }
                    }
                });
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn scan_frames_share_one_response() {
        let accepted = Arc::new(AtomicUsize::new(0));
        let url = spawn_service(2, Arc::clone(&accepted)).await;
        let socket = LocalizationSocket::new(SocketConfig::new(url));

        socket.connect().await.unwrap();
        socket.send_frame(&request(14, 0)).await.unwrap();
        socket.send_frame(&request(14, 1)).await.unwrap();

        let resp = socket.await_response(14).await.unwrap();
        assert_eq!(resp.request_id, 14);
        assert!(resp.offsets.is_some());
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_open() {
        let accepted = Arc::new(AtomicUsize::new(0));
        let url = spawn_service(1, Arc::clone(&accepted)).await;
        let socket = LocalizationSocket::new(SocketConfig::new(url));

        socket.connect().await.unwrap();
        socket.connect().await.unwrap();
        assert!(socket.is_connected().await);
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        socket.close().await;
        assert!(!socket.is_connected().await);
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config = SocketConfig::new(format!("ws://{addr}"))
            .with_connect_timeout(Duration::from_millis(100));
        let socket = LocalizationSocket::new(config);
        assert_eq!(socket.connect().await, Err(VantageError::ConnectTimeout(100)));
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let accepted = Arc::new(AtomicUsize::new(0));
        // Service waits for 3 frames; only one is sent.
        let url = spawn_service(3, accepted).await;
        let config =
            SocketConfig::new(url).with_request_timeout(Some(Duration::from_millis(100)));
        let socket = LocalizationSocket::new(config);

        socket.connect().await.unwrap();
        socket.send_frame(&request(24, 0)).await.unwrap();
        assert_eq!(
            socket.await_response(24).await,
            Err(VantageError::RequestTimeout(24))
        );
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let socket = LocalizationSocket::new(SocketConfig::new("ws://127.0.0.1:9"));
        assert!(matches!(
            socket.send(4, vec![0]).await,
            Err(VantageError::Transport(_))
        ));
    }

    #[test]
    fn alignment_url_layout() {
        let config = SocketConfig::alignment(
            "wss://api.example.com/api/0.2.0/",
            GeoPosition::new(37.5, -122.25, 0.0),
            "abc",
        );
        assert_eq!(
            config.url,
            "wss://api.example.com/api/0.2.0/alignment/ws?latitude=37.5&longitude=-122.25&token=abc"
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
    }
}
