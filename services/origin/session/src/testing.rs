//! In-process mock controller for tests.

use crate::config::ClientConfig;
use futures::{SinkExt, StreamExt};
use origin_wire::{
    codec, Message, MessageType, Payload, HEARTBEAT_COMMAND, HEARTBEAT_DESTINATION,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Short timings so lifecycle tests finish quickly
pub(crate) fn fast_config(url: &str) -> ClientConfig {
    ClientConfig {
        url: url.to_string(),
        command_timeout: Duration::from_secs(2),
        verify_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(1),
        heartbeat_interval: Duration::from_millis(40),
        heartbeat_timeout: Duration::from_millis(150),
        backoff_base: Duration::from_millis(2),
        backoff_max: Duration::from_millis(10),
        ..ClientConfig::default()
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 5s");
}

#[derive(Clone, Debug)]
enum Control {
    Send(String),
    Disconnect,
}

#[derive(Default)]
struct MockState {
    accepted: AtomicUsize,
    refusing: AtomicBool,
    silent_heartbeat: AtomicBool,
    verify_code: AtomicI64,
    handshake_delay_ms: AtomicU64,
    received: Mutex<Vec<Message>>,
    held: Mutex<Vec<Message>>,
}

/// WebSocket server speaking the controller's JSON envelope.
///
/// Replies `ErrorCode = 0` to every command except a few test commands:
/// `Ignore` gets no reply, `Fail` gets [`FAIL_CODE`](Self::FAIL_CODE),
/// `Noise` is preceded by a stray reply, `Interleave` is surrounded by five
/// notifications, `Hold` replies are withheld until
/// [`HOLD_BATCH`](Self::HOLD_BATCH) arrive, then sent in reverse order, and
/// `Stall` is answered before the connection stops reading for
/// [`STALL`](Self::STALL).
pub(crate) struct MockController {
    pub(crate) url: String,
    state: Arc<MockState>,
    control: broadcast::Sender<Control>,
    task: JoinHandle<()>,
}

impl MockController {
    pub(crate) const FAIL_CODE: i64 = 17;
    pub(crate) const HOLD_BATCH: usize = 4;
    pub(crate) const STALL: Duration = Duration::from_secs(30);

    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());
        let (control, _) = broadcast::channel(64);

        let task = {
            let state = Arc::clone(&state);
            let control = control.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    if state.refusing.load(Ordering::SeqCst) {
                        drop(stream);
                        continue;
                    }
                    state.accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, Arc::clone(&state), control.subscribe()));
                }
            })
        };

        Self {
            url: format!("ws://{}/SmartScope-1.0/mountControlEndpoint", addr),
            state,
            control,
            task,
        }
    }

    pub(crate) fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Commands received so far, in arrival order
    pub(crate) fn received(&self) -> Vec<Message> {
        self.state.received.lock().unwrap().clone()
    }

    pub(crate) fn set_verify_code(&self, code: i64) {
        self.state.verify_code.store(code, Ordering::SeqCst);
    }

    pub(crate) fn set_refusing(&self, refusing: bool) {
        self.state.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Delay the WebSocket handshake of later connections
    pub(crate) fn set_handshake_delay(&self, delay: Duration) {
        self.state
            .handshake_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn set_silent_heartbeat(&self, silent: bool) {
        self.state.silent_heartbeat.store(silent, Ordering::SeqCst);
    }

    /// Send a raw text frame on every open connection
    pub(crate) fn push(&self, frame: String) {
        let _ = self.control.send(Control::Send(frame));
    }

    /// Drop every open connection without a close handshake
    pub(crate) fn drop_connections(&self) {
        let _ = self.control.send(Control::Disconnect);
    }

    pub(crate) fn notification(source: &str, command: &str) -> String {
        Self::notification_with(source, command, Payload::new())
    }

    pub(crate) fn notification_with(source: &str, command: &str, payload: Payload) -> String {
        let message = Message {
            source: source.to_string(),
            destination: "WebApp".to_string(),
            command: command.to_string(),
            kind: MessageType::Notification,
            payload,
            ..Default::default()
        };
        codec::encode(&message).unwrap()
    }
}

impl Drop for MockController {
    fn drop(&mut self) {
        self.task.abort();
        let _ = self.control.send(Control::Disconnect);
    }
}

fn reply(request: &Message, code: i64) -> Message {
    Message {
        source: request.destination.clone(),
        destination: request.source.clone(),
        command: request.command.clone(),
        kind: MessageType::Response,
        sequence_id: request.sequence_id,
        error_code: Some(code),
        error_message: (code != 0).then(|| "mock failure".to_string()),
        payload: request.payload.clone(),
    }
}

fn indexed_notification(index: usize) -> Message {
    let mut payload = Payload::new();
    payload.insert("Index".into(), index.into());
    Message {
        source: "TaskController".to_string(),
        destination: "WebApp".to_string(),
        command: "Progress".to_string(),
        kind: MessageType::Notification,
        payload,
        ..Default::default()
    }
}

fn respond(state: &MockState, request: &Message) -> Vec<Message> {
    if request.destination == HEARTBEAT_DESTINATION && request.command == HEARTBEAT_COMMAND {
        if state.silent_heartbeat.load(Ordering::SeqCst) {
            return Vec::new();
        }
        return vec![reply(request, state.verify_code.load(Ordering::SeqCst))];
    }

    match request.command.as_str() {
        "Ignore" => Vec::new(),
        "Fail" => vec![reply(request, MockController::FAIL_CODE)],
        "Noise" => {
            let mut stray = reply(request, 0);
            stray.sequence_id = 999_999;
            stray.payload.insert("Stray".into(), true.into());
            vec![stray, reply(request, 0)]
        }
        "Interleave" => {
            let mut frames: Vec<Message> = (0..5).map(indexed_notification).collect();
            frames.insert(2, reply(request, 0));
            frames
        }
        "Hold" => {
            let mut held = state.held.lock().unwrap();
            held.push(request.clone());
            if held.len() < MockController::HOLD_BATCH {
                return Vec::new();
            }
            held.drain(..).rev().map(|m| reply(&m, 0)).collect()
        }
        _ => vec![reply(request, 0)],
    }
}

async fn serve(
    stream: TcpStream,
    state: Arc<MockState>,
    mut control: broadcast::Receiver<Control>,
) {
    let delay = state.handshake_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            cmd = control.recv() => match cmd {
                Ok(Control::Send(frame)) => {
                    if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Control::Disconnect) | Err(_) => return,
            },
            frame = source.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => continue,
                };
                let Ok(request) = codec::decode(text.as_str()) else {
                    continue;
                };
                state.received.lock().unwrap().push(request.clone());
                for message in respond(&state, &request) {
                    let frame = codec::encode(&message).unwrap();
                    if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                if request.command == "Stall" {
                    tokio::time::sleep(MockController::STALL).await;
                    return;
                }
            }
        }
    }
}

/// Serve one canned HTTP response per connection, recording request lines
pub(crate) async fn http_responder(
    status: &'static str,
    body: &'static [u8],
) -> (String, Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
    http_responder_with_length(status, body, body.len()).await
}

/// Like [`http_responder`] but advertising `content_length` bytes, so a
/// length above `body.len()` yields a truncated transfer
pub(crate) async fn http_responder_with_length(
    status: &'static str,
    body: &'static [u8],
    content_length: usize,
) -> (String, Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&requests);
    let task = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let head = String::from_utf8_lossy(&buf);
            if let Some(line) = head.lines().next() {
                seen.lock().unwrap().push(line.to_string());
            }

            let header = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                status, content_length
            );
            let _ = stream.write_all(header.as_bytes()).await;
            let _ = stream.write_all(body).await;
            let _ = stream.shutdown().await;
        }
    });

    (addr.to_string(), requests, task)
}

