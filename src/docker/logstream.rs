//! WebSocket delivery of container log streams.
//!
//! A connected client gets the tailed (and, when following, live) log
//! lines of one container as text frames. Four cooperating tasks share a
//! cancellation token: a pump that turns raw log frames into complete
//! lines, a keepalive pinger, a watcher for client disconnects, and the
//! dispatch loop that owns the outbound frames. Cancelling the token
//! from any of them tears the whole pipeline down and drops the log
//! stream, which closes its daemon connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bollard::container::LogOutput;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::client::LogStream;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Bound on buffered lines between the pump and the dispatch loop; a
/// slow client applies backpressure to the daemon read instead of
/// growing memory.
const QUEUE_DEPTH: usize = 128;

enum Event {
    Line(String),
    Failure(String),
}

/// Drives one WebSocket session over a container log stream until the
/// stream ends or the client goes away.
pub async fn run(socket: WebSocket, logs: LogStream) {
    let (sink, reader) = socket.split();
    let sink = Arc::new(Mutex::new(sink));
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);

    let pump = tokio::spawn(pump_lines(logs, tx, token.clone()));
    let keepalive = tokio::spawn(keepalive(Arc::clone(&sink), token.clone()));
    let watcher = tokio::spawn(watch_disconnect(reader, token.clone()));

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = rx.recv() => match event {
                Some(Event::Line(line)) => {
                    if let Err(err) = sink.lock().await.send(Message::Text(line.into())).await {
                        // Usually just the client going away mid-stream.
                        log::debug!("log frame send failed: {err}");
                        break;
                    }
                }
                Some(Event::Failure(message)) => {
                    let payload = serde_json::json!({ "error": message }).to_string();
                    if let Err(err) = sink.lock().await.send(Message::Text(payload.into())).await {
                        log::debug!("error frame send failed: {err}");
                        break;
                    }
                }
                // Pump finished and the queue drained; say goodbye.
                None => {
                    let _ = sink.lock().await.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    token.cancel();
    let _ = tokio::join!(pump, keepalive, watcher);
}

/// Reads raw log frames and emits complete lines.
///
/// Stdout and stderr keep separate partial-line buffers so interleaved
/// frames cannot splice half lines together. Stream errors after a
/// cancellation are expected teardown noise and swallowed; any other
/// terminal error is forwarded to the client.
async fn pump_lines(mut logs: LogStream, tx: mpsc::Sender<Event>, token: CancellationToken) {
    let mut stdout = LineBuffer::default();
    let mut stderr = LineBuffer::default();

    loop {
        let item = tokio::select! {
            _ = token.cancelled() => return,
            item = logs.next() => item,
        };

        match item {
            Some(Ok(output)) => {
                let mut lines = Vec::new();
                match output {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        stdout.extend(&message, &mut lines);
                    }
                    LogOutput::StdErr { message } => stderr.extend(&message, &mut lines),
                    LogOutput::StdIn { .. } => {}
                }
                for line in lines {
                    if send_event(&tx, &token, Event::Line(line)).await.is_err() {
                        return;
                    }
                }
            }
            Some(Err(err)) => {
                if !token.is_cancelled() {
                    log::debug!("log stream ended with error: {err}");
                    let _ = send_event(&tx, &token, Event::Failure(err.to_string())).await;
                }
                return;
            }
            None => break,
        }
    }

    for line in stdout.flush().into_iter().chain(stderr.flush()) {
        if send_event(&tx, &token, Event::Line(line)).await.is_err() {
            return;
        }
    }
}

async fn send_event(
    tx: &mpsc::Sender<Event>,
    token: &CancellationToken,
    event: Event,
) -> Result<(), ()> {
    tokio::select! {
        _ = token.cancelled() => Err(()),
        sent = tx.send(event) => sent.map_err(|_| ()),
    }
}

/// Pings the client periodically so intermediate proxies keep the
/// connection open; a failed ping means the client is gone.
async fn keepalive(
    sink: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {
                if sink.lock().await.send(Message::Ping(Default::default())).await.is_err() {
                    token.cancel();
                    return;
                }
            }
        }
    }
}

/// Consumes inbound frames and cancels the pipeline once the client
/// closes or the connection drops. Pongs and stray client frames are
/// ignored.
async fn watch_disconnect(mut reader: SplitStream<WebSocket>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            message = reader.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    token.cancel();
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Accumulates byte chunks and yields complete, newline-terminated
/// lines. Carriage returns before the newline are stripped.
#[derive(Default)]
struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8], lines: &mut Vec<String>) {
        for byte in chunk {
            if *byte == b'\n' {
                lines.push(self.take_line());
            } else {
                self.partial.push(*byte);
            }
        }
    }

    /// Returns the trailing unterminated line, if any.
    fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        Some(self.take_line())
    }

    fn take_line(&mut self) -> String {
        if self.partial.last() == Some(&b'\r') {
            self.partial.pop();
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use futures_util::stream;

    #[test]
    fn test_line_buffer_splits_and_keeps_partial() {
        let mut buffer = LineBuffer::default();
        let mut lines = Vec::new();
        buffer.extend(b"first\nsecond\npar", &mut lines);
        assert_eq!(lines, ["first", "second"]);
        buffer.extend(b"tial\n", &mut lines);
        assert_eq!(lines.last().map(String::as_str), Some("partial"));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_line_buffer_strips_carriage_return_and_flushes() {
        let mut buffer = LineBuffer::default();
        let mut lines = Vec::new();
        buffer.extend(b"windows line\r\nleftover", &mut lines);
        assert_eq!(lines, ["windows line"]);
        assert_eq!(buffer.flush().as_deref(), Some("leftover"));
        assert_eq!(buffer.flush(), None);
    }

    #[tokio::test]
    async fn test_pump_emits_lines_then_closes_channel() {
        let frames = vec![
            Ok(LogOutput::StdOut {
                message: Bytes::from_static(b"out one\nout "),
            }),
            Ok(LogOutput::StdErr {
                message: Bytes::from_static(b"err one\n"),
            }),
            Ok(LogOutput::StdOut {
                message: Bytes::from_static(b"two\n"),
            }),
        ];
        let logs: LogStream = Box::pin(stream::iter(frames));
        let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);

        pump_lines(logs, tx, CancellationToken::new()).await;

        let mut lines = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                Event::Line(line) => lines.push(line),
                Event::Failure(message) => panic!("unexpected failure event: {message}"),
            }
        }
        assert_eq!(lines, ["out one", "err one", "out two"]);
    }

    #[tokio::test]
    async fn test_pump_forwards_terminal_error() {
        let frames = vec![
            Ok(LogOutput::StdOut {
                message: Bytes::from_static(b"last line\n"),
            }),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: "daemon went away".to_owned(),
            }),
        ];
        let logs: LogStream = Box::pin(stream::iter(frames));
        let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);

        pump_lines(logs, tx, CancellationToken::new()).await;

        assert!(matches!(rx.recv().await, Some(Event::Line(_))));
        match rx.recv().await {
            Some(Event::Failure(message)) => assert!(message.contains("daemon went away")),
            other => panic!("expected failure event, got {:?}", other.is_some()),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_pump_stops_on_cancellation() {
        let logs: LogStream = Box::pin(stream::pending());
        let (tx, _rx) = mpsc::channel(QUEUE_DEPTH);
        let token = CancellationToken::new();

        let pump = tokio::spawn(pump_lines(logs, tx, token.clone()));
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump should stop promptly after cancellation")
            .expect("pump task should not panic");
    }
}
