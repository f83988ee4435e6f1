//! Outward stream plumbing: the envelope sink the pipeline writes to, the
//! stream the caller reads from, and the narrator that turns text into
//! paced status envelopes.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use newsdesk_core::provider::ChunkReceiver;
use newsdesk_core::{ProtocolEnvelope, Stage, Transcript, TurnError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::tokens::TokenStreamer;

/// One item on the outward stream: an encoded envelope, or the turn's error.
pub type TurnItem = Result<String, TurnError>;

/// Writing half of the outward stream.
///
/// Every emitted envelope is also kept, so the turn can report what it sent.
#[derive(Debug)]
pub struct EnvelopeSink {
    tx: mpsc::Sender<TurnItem>,
    emitted: Vec<ProtocolEnvelope>,
}

impl EnvelopeSink {
    pub fn new(tx: mpsc::Sender<TurnItem>) -> Self {
        Self {
            tx,
            emitted: Vec::new(),
        }
    }

    /// A bounded sink/stream pair.
    pub fn channel(capacity: usize) -> (Self, TurnStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), TurnStream::new(rx))
    }

    /// Encode and send one envelope, waiting for channel capacity.
    pub async fn emit(&mut self, envelope: ProtocolEnvelope) -> Result<(), TurnError> {
        let json = envelope.to_json()?;
        self.tx
            .send(Ok(json))
            .await
            .map_err(|_| TurnError::StreamClosed)?;
        self.emitted.push(envelope);
        Ok(())
    }

    /// Terminate the stream with an error item.
    pub async fn fail(&self, err: TurnError) {
        let _ = self.tx.send(Err(err)).await;
    }

    pub fn emitted(&self) -> &[ProtocolEnvelope] {
        &self.emitted
    }

    pub fn take_emitted(&mut self) -> Vec<ProtocolEnvelope> {
        std::mem::take(&mut self.emitted)
    }
}

/// Reading half of the outward stream, as handed to the caller.
pub struct TurnStream {
    inner: ReceiverStream<TurnItem>,
}

impl TurnStream {
    pub fn new(rx: mpsc::Receiver<TurnItem>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Read the stream to its end.
    ///
    /// Collection stops at the first error; chunks received before it are kept.
    pub async fn drain(mut self) -> DrainedTurn {
        let mut chunks = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(chunk) => chunks.push(chunk),
                Err(err) => {
                    return DrainedTurn {
                        chunks,
                        error: Some(err),
                    };
                }
            }
        }
        DrainedTurn {
            chunks,
            error: None,
        }
    }
}

impl Stream for TurnStream {
    type Item = TurnItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// A fully read turn.
#[derive(Debug)]
pub struct DrainedTurn {
    pub chunks: Vec<String>,
    pub error: Option<TurnError>,
}

impl DrainedTurn {
    /// The raw wire text.
    pub fn wire(&self) -> String {
        self.chunks.concat()
    }

    pub fn transcript(&self) -> Result<Transcript, serde_json::Error> {
        Transcript::decode(self.chunks.iter().map(String::as_str))
    }
}

/// Turns text into paced status envelopes.
#[derive(Debug, Clone)]
pub struct Narrator {
    streamer: TokenStreamer,
}

impl Narrator {
    pub fn new(streamer: TokenStreamer) -> Self {
        Self { streamer }
    }

    /// Narrate a one-line progress message.
    pub async fn narrate(&self, sink: &mut EnvelopeSink, message: &str) -> Result<(), TurnError> {
        self.stream_text(sink, format!("{message}\n")).await
    }

    /// Stream `text` token by token, unchanged.
    pub async fn stream_text(&self, sink: &mut EnvelopeSink, text: String) -> Result<(), TurnError> {
        let mut tokens = self.streamer.spawn(text);
        while let Some(token) = tokens.recv().await {
            sink.emit(ProtocolEnvelope::status(token)).await?;
        }
        Ok(())
    }

    /// Forward completion deltas as status envelopes, as they arrive.
    pub async fn forward_deltas(
        &self,
        sink: &mut EnvelopeSink,
        mut deltas: ChunkReceiver,
        stage: Stage,
    ) -> Result<(), TurnError> {
        while let Some(chunk) = deltas.recv().await {
            let chunk = chunk.map_err(|e| TurnError::upstream(stage, e))?;
            if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                sink.emit(ProtocolEnvelope::status(content)).await?;
            }
            if chunk.done {
                break;
            }
        }
        Ok(())
    }
}
