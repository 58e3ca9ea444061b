//! Per-request session drivers
//!
//! Three request shapes share one lifecycle: acquire a worker, begin an
//! utterance, feed chunks, extract results, end and release. The drivers
//! are synchronous; each active request occupies one thread and blocks in
//! `acquire` when its model's pool is empty.
//!
//! Worker release is structural: the pool lease's drop resets and returns
//! the worker on every exit path, including cancellation and engine
//! errors. Cancellation is observed between chunks; a running engine call
//! is never interrupted.

use lattice_serve_core::{
    RecognitionConfig, RecognizeRequest, RecognizeResponse, Result, ServeError,
};

use crate::dispatch::Dispatcher;

/// Chunk length in seconds used when slicing unary audio internally.
pub const DEFAULT_CHUNK_SECONDS: f32 = 1.0;

/// One streaming request message: the config in effect plus an audio chunk.
#[derive(Debug, Clone)]
pub struct StreamingChunk {
    pub config: RecognitionConfig,
    pub audio: Vec<u8>,
    pub uuid: String,
}

/// Source of streaming request messages, read in receive order.
pub trait ChunkSource {
    /// The next chunk, `Ok(None)` at end-of-stream, or `Err(Cancelled)`
    /// when the transport dropped the request.
    fn next_chunk(&mut self) -> Result<Option<StreamingChunk>>;
}

/// Sink for interim responses on bidirectional requests.
pub trait ResponseSink {
    fn send(&mut self, response: RecognizeResponse) -> Result<()>;
}

/// Unary request: one message carrying the full audio, one response.
pub fn recognize(
    dispatcher: &Dispatcher,
    request: &RecognizeRequest,
    chunk_seconds: f32,
) -> Result<RecognizeResponse> {
    let config = &request.config;
    let model_id = config.model_id();
    if !dispatcher.has_model(&model_id) {
        return Err(ServeError::ModelNotFound(model_id));
    }

    let pool = dispatcher.pool(&model_id)?;
    let mut worker = pool.acquire();
    tracing::debug!(request_id = %request.uuid, model = %model_id, "decoder acquired");

    worker.begin(&request.uuid)?;

    if config.raw {
        worker.feed_full_raw(
            &request.audio,
            config.sample_rate_hertz as f32,
            config.data_bytes,
            chunk_seconds,
        )?;
    } else {
        worker.feed_full_wav(&request.audio, chunk_seconds)?;
    }

    let results = worker.results(config.max_alternatives, config.word_level, false)?;
    worker.end();

    Ok(RecognizeResponse::from_alternatives(
        results,
        config.word_level,
    ))
}

/// Client-streaming request: a stream of chunks, one final response.
///
/// The first message's config selects the model and governs the stream;
/// subsequent messages may change only `raw` and `data_bytes`.
pub fn streaming_recognize(
    dispatcher: &Dispatcher,
    source: &mut dyn ChunkSource,
) -> Result<RecognizeResponse> {
    let first = source
        .next_chunk()?
        .ok_or_else(|| ServeError::InvalidRequest("empty request stream".into()))?;

    let config = first.config.clone();
    let model_id = config.model_id();
    if !dispatcher.has_model(&model_id) {
        return Err(ServeError::ModelNotFound(model_id));
    }

    let pool = dispatcher.pool(&model_id)?;
    let mut worker = pool.acquire();
    tracing::debug!(request_id = %first.uuid, model = %model_id, "decoder acquired");

    worker.begin(&first.uuid)?;

    let mut chunk = first;
    let mut chunk_no = 0u32;
    loop {
        chunk_no += 1;
        tracing::debug!(request_id = %chunk.uuid, chunk = chunk_no, "chunk received");

        feed_chunk(&mut worker, &config, &chunk)?;

        match source.next_chunk()? {
            Some(next) => chunk = next,
            None => break,
        }
    }

    let results = worker.results(config.max_alternatives, config.word_level, false)?;
    worker.end();

    Ok(RecognizeResponse::from_alternatives(
        results,
        config.word_level,
    ))
}

/// Bidirectional-streaming request: after every chunk an interim response
/// reflecting the lattice frontier is emitted through `sink`;
/// end-of-stream produces one final, finalized response, which is
/// returned for the transport to deliver.
pub fn bidi_streaming_recognize(
    dispatcher: &Dispatcher,
    source: &mut dyn ChunkSource,
    sink: &mut dyn ResponseSink,
) -> Result<RecognizeResponse> {
    let first = source
        .next_chunk()?
        .ok_or_else(|| ServeError::InvalidRequest("empty request stream".into()))?;

    let config = first.config.clone();
    let model_id = config.model_id();
    if !dispatcher.has_model(&model_id) {
        return Err(ServeError::ModelNotFound(model_id));
    }

    let pool = dispatcher.pool(&model_id)?;
    let mut worker = pool.acquire();
    tracing::debug!(request_id = %first.uuid, model = %model_id, "decoder acquired");

    worker.begin(&first.uuid)?;

    let mut chunk = first;
    loop {
        feed_chunk(&mut worker, &config, &chunk)?;

        let results = worker.results(config.max_alternatives, config.word_level, true)?;
        sink.send(RecognizeResponse::from_alternatives(
            results,
            config.word_level,
        ))?;

        match source.next_chunk()? {
            Some(next) => chunk = next,
            None => break,
        }
    }

    let results = worker.results(config.max_alternatives, config.word_level, false)?;
    worker.end();

    Ok(RecognizeResponse::from_alternatives(
        results,
        config.word_level,
    ))
}

/// Feed one streaming chunk. Only `raw` and `data_bytes` are honored from
/// the chunk's own config; everything else comes from the stream's
/// governing config.
fn feed_chunk(
    worker: &mut crate::worker::DecoderWorker,
    config: &RecognitionConfig,
    chunk: &StreamingChunk,
) -> Result<()> {
    if chunk.config.raw {
        worker.feed_raw_chunk(
            &chunk.audio,
            config.sample_rate_hertz as f32,
            chunk.config.data_bytes,
        )
    } else {
        worker.feed_wav_chunk(&chunk.audio)
    }
}
