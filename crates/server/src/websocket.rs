//! WebSocket streaming recognition
//!
//! Protocol: the client opens `/v1/streaming` and sends JSON frames. The
//! first frame must be `config`; `audio` frames carry base64 chunks and
//! may override `raw`/`data_bytes`; `eos` ends the audio. Without
//! `interim` the server answers with a single final `result`; with
//! `interim: true` it answers with one `result` after every chunk plus a
//! final one. Closing the socket before `eos` cancels the request: the
//! decoder is still released and no response is produced.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use lattice_serve_core::{
    RecognitionConfig, RecognizeResponse, Result as ServeResult, ServeError,
    SpeechRecognitionResult,
};
use lattice_serve_decoder::{
    bidi_streaming_recognize, streaming_recognize, ChunkSource, ResponseSink, StreamingChunk,
};

use crate::metrics::record_request;
use crate::state::AppState;

/// WebSocket frame types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// First frame: the governing recognition config.
    Config {
        config: RecognitionConfig,
        #[serde(default)]
        uuid: Option<String>,
        /// Emit an interim result after every chunk (bidirectional mode).
        #[serde(default)]
        interim: bool,
    },
    /// One audio chunk, base64 encoded. `raw` and `data_bytes` may change
    /// mid-stream; everything else is fixed by the config frame.
    Audio {
        data: String,
        #[serde(default)]
        raw: Option<bool>,
        #[serde(default)]
        data_bytes: Option<usize>,
    },
    /// End of audio.
    Eos,
    /// Server response frame.
    Result {
        results: Vec<SpeechRecognitionResult>,
        is_final: bool,
    },
    /// Server error frame; the stream is closed afterwards.
    Error { message: String },
}

enum SourceItem {
    Chunk(StreamingChunk),
    Eos,
}

/// Blocking end of the socket-to-driver bridge.
struct ChannelSource {
    rx: mpsc::Receiver<SourceItem>,
}

impl ChunkSource for ChannelSource {
    fn next_chunk(&mut self) -> ServeResult<Option<StreamingChunk>> {
        match self.rx.blocking_recv() {
            Some(SourceItem::Chunk(chunk)) => Ok(Some(chunk)),
            Some(SourceItem::Eos) => Ok(None),
            // sender dropped without eos: the client went away
            None => Err(ServeError::Cancelled),
        }
    }
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<RecognizeResponse>,
}

impl ResponseSink for ChannelSink {
    fn send(&mut self, response: RecognizeResponse) -> ServeResult<()> {
        self.tx.send(response).map_err(|_| ServeError::Cancelled)
    }
}

pub async fn handle_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(tokio::sync::Mutex::new(sender));

    // the first frame must carry the config
    let (config, uuid, interim) = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<WsMessage>(&text) {
                Ok(WsMessage::Config {
                    config,
                    uuid,
                    interim,
                }) => {
                    break (
                        config,
                        uuid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                        interim,
                    )
                }
                Ok(_) => {
                    send_error(&sender, "first frame must be a config frame").await;
                    return;
                }
                Err(e) => {
                    send_error(&sender, &format!("unparsable frame: {e}")).await;
                    return;
                }
            },
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    };

    tracing::debug!(request_id = %uuid, model = %config.model_id(), interim, "stream opened");

    let (chunk_tx, chunk_rx) = mpsc::channel::<SourceItem>(8);
    let (interim_tx, mut interim_rx) = mpsc::unbounded_channel::<RecognizeResponse>();

    let driver = {
        let dispatcher = Arc::clone(&state.dispatcher);
        tokio::task::spawn_blocking(move || {
            let mut source = ChannelSource { rx: chunk_rx };
            if interim {
                let mut sink = ChannelSink { tx: interim_tx };
                bidi_streaming_recognize(&dispatcher, &mut source, &mut sink)
            } else {
                drop(interim_tx);
                streaming_recognize(&dispatcher, &mut source)
            }
        })
    };

    // forward interim results while reading audio frames
    let forwarder = {
        let sender = Arc::clone(&sender);
        tokio::spawn(async move {
            while let Some(response) = interim_rx.recv().await {
                let frame = WsMessage::Result {
                    results: response.results,
                    is_final: false,
                };
                if send_frame(&sender, &frame).await.is_err() {
                    break;
                }
            }
        })
    };

    let mut cancelled = false;
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<WsMessage>(&text) {
                Ok(WsMessage::Audio {
                    data,
                    raw,
                    data_bytes,
                }) => {
                    let audio = match BASE64.decode(data.as_bytes()) {
                        Ok(audio) => audio,
                        Err(e) => {
                            send_error(&sender, &format!("audio is not valid base64: {e}")).await;
                            cancelled = true;
                            break;
                        }
                    };
                    let mut chunk_config = config.clone();
                    if let Some(raw) = raw {
                        chunk_config.raw = raw;
                    }
                    if let Some(data_bytes) = data_bytes {
                        chunk_config.data_bytes = data_bytes;
                    }
                    let chunk = StreamingChunk {
                        config: chunk_config,
                        audio,
                        uuid: uuid.clone(),
                    };
                    if chunk_tx.send(SourceItem::Chunk(chunk)).await.is_err() {
                        // driver already finished (likely with an error)
                        break;
                    }
                }
                Ok(WsMessage::Eos) => {
                    let _ = chunk_tx.send(SourceItem::Eos).await;
                    break;
                }
                Ok(_) => {
                    send_error(&sender, "unexpected frame mid-stream").await;
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    send_error(&sender, &format!("unparsable frame: {e}")).await;
                    cancelled = true;
                    break;
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                cancelled = true;
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) => {
                cancelled = true;
                break;
            }
        }
    }

    // dropping the sender without eos makes the driver observe cancellation
    drop(chunk_tx);

    let outcome = driver.await;
    let _ = forwarder.await;

    match outcome {
        Ok(Ok(response)) => {
            if cancelled {
                tracing::debug!(request_id = %uuid, "stream cancelled, dropping response");
                record_request("streaming", false);
            } else {
                let frame = WsMessage::Result {
                    results: response.results,
                    is_final: true,
                };
                let _ = send_frame(&sender, &frame).await;
                record_request("streaming", true);
            }
        }
        Ok(Err(ServeError::Cancelled)) => {
            tracing::debug!(request_id = %uuid, "stream cancelled");
            record_request("streaming", false);
        }
        Ok(Err(err)) => {
            tracing::warn!(request_id = %uuid, error = %err, "stream failed");
            send_error(&sender, &err.to_string()).await;
            record_request("streaming", false);
        }
        Err(e) => {
            tracing::error!(request_id = %uuid, error = %e, "decode task failed");
            send_error(&sender, "internal error").await;
            record_request("streaming", false);
        }
    }

    let mut sender = sender.lock().await;
    let _ = sender.send(Message::Close(None)).await;
}

async fn send_frame(
    sender: &Arc<tokio::sync::Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
    frame: &WsMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_default();
    let mut sender = sender.lock().await;
    sender.send(Message::Text(text)).await
}

async fn send_error(
    sender: &Arc<tokio::sync::Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
    message: &str,
) {
    let frame = WsMessage::Error {
        message: message.to_string(),
    };
    let _ = send_frame(sender, &frame).await;
}
