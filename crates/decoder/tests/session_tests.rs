//! End-to-end request scenarios through the session drivers

mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use common::{model_dir, silent_pcm, silent_wav, spec};

use lattice_serve_core::{
    RecognitionConfig, RecognizeRequest, RecognizeResponse, ModelId, Result, ServeError,
};
use lattice_serve_decoder::testing::MockEngine;
use lattice_serve_decoder::{
    bidi_streaming_recognize, recognize, streaming_recognize, ChunkSource, Dispatcher,
    ResponseSink, StreamingChunk, DEFAULT_CHUNK_SECONDS,
};

fn config(model: &str, raw: bool) -> RecognitionConfig {
    RecognitionConfig {
        model: model.to_string(),
        language_code: "en".to_string(),
        sample_rate_hertz: 16000,
        max_alternatives: 2,
        raw,
        data_bytes: 0,
        word_level: false,
    }
}

struct VecSource {
    chunks: VecDeque<StreamingChunk>,
    cancel_at_end: bool,
}

impl VecSource {
    fn new(chunks: Vec<StreamingChunk>) -> Self {
        Self {
            chunks: chunks.into(),
            cancel_at_end: false,
        }
    }

    fn cancelled_after(chunks: Vec<StreamingChunk>) -> Self {
        Self {
            chunks: chunks.into(),
            cancel_at_end: true,
        }
    }
}

impl ChunkSource for VecSource {
    fn next_chunk(&mut self) -> Result<Option<StreamingChunk>> {
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.cancel_at_end => Err(ServeError::Cancelled),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct VecSink {
    responses: Vec<RecognizeResponse>,
}

impl ResponseSink for VecSink {
    fn send(&mut self, response: RecognizeResponse) -> Result<()> {
        self.responses.push(response);
        Ok(())
    }
}

fn wav_chunks(config: &RecognitionConfig, parts: &[Vec<u8>]) -> Vec<StreamingChunk> {
    parts
        .iter()
        .map(|audio| StreamingChunk {
            config: config.clone(),
            audio: audio.clone(),
            uuid: "stream-test".to_string(),
        })
        .collect()
}

#[test]
fn unary_silent_second_succeeds() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let request = RecognizeRequest {
        config: config("general", false),
        audio: silent_wav(16000),
        uuid: "scenario-1".to_string(),
    };

    let response = recognize(&dispatcher, &request, DEFAULT_CHUNK_SECONDS).unwrap();
    assert_eq!(response.results.len(), 1);
    for alt in &response.results[0].alternatives {
        assert!((0.0..=1.0).contains(&alt.confidence));
    }
}

#[test]
fn concurrent_unary_requests_all_succeed_with_small_pool() {
    let dir = model_dir();
    let dispatcher = Arc::new(
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 2)]).unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..3 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(thread::spawn(move || {
            let request = RecognizeRequest {
                config: config("general", false),
                audio: silent_wav(16000),
                uuid: format!("concurrent-{i}"),
            };
            recognize(&dispatcher, &request, DEFAULT_CHUNK_SECONDS).unwrap()
        }));
    }

    for handle in handles {
        let response = handle.join().unwrap();
        assert!(!response.results[0].alternatives.is_empty());
    }

    let pool = dispatcher.pool(&ModelId::new("general", "en")).unwrap();
    assert_eq!(pool.idle_count(), 2);
}

#[test]
fn unknown_model_returns_not_found_before_acquiring() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let request = RecognizeRequest {
        config: config("missing", false),
        audio: silent_wav(16000),
        uuid: "scenario-3".to_string(),
    };

    let err = recognize(&dispatcher, &request, DEFAULT_CHUNK_SECONDS).unwrap_err();
    assert!(matches!(err, ServeError::ModelNotFound(_)));

    let pool = dispatcher.pool(&ModelId::new("general", "en")).unwrap();
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn client_streaming_matches_unary_on_the_same_audio() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let unary_request = RecognizeRequest {
        config: config("general", false),
        audio: silent_wav(16000),
        uuid: "unary".to_string(),
    };
    let unary = recognize(&dispatcher, &unary_request, DEFAULT_CHUNK_SECONDS).unwrap();

    let parts: Vec<Vec<u8>> = (0..4).map(|_| silent_wav(4000)).collect();
    let mut source = VecSource::new(wav_chunks(&config("general", false), &parts));
    let streamed = streaming_recognize(&dispatcher, &mut source).unwrap();

    let a = &unary.results[0].alternatives;
    let b = &streamed.results[0].alternatives;
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.transcript, y.transcript);
        assert_eq!(x.lm_score, y.lm_score);
        assert_eq!(x.am_score, y.am_score);
    }
}

#[test]
fn raw_streaming_uses_per_chunk_data_bytes() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let mut cfg = config("general", true);
    let mut chunks = Vec::new();
    for bytes in [8000usize, 4000, 12000] {
        cfg.data_bytes = bytes;
        chunks.push(StreamingChunk {
            config: cfg.clone(),
            audio: silent_pcm(bytes / 2),
            uuid: "raw-stream".to_string(),
        });
    }
    let mut source = VecSource::new(chunks);
    let streamed = streaming_recognize(&dispatcher, &mut source).unwrap();

    let mut unary_cfg = config("general", true);
    unary_cfg.data_bytes = 24000;
    let unary_request = RecognizeRequest {
        config: unary_cfg,
        audio: silent_pcm(12000),
        uuid: "raw-unary".to_string(),
    };
    let unary = recognize(&dispatcher, &unary_request, DEFAULT_CHUNK_SECONDS).unwrap();

    assert_eq!(
        streamed.results[0].alternatives[0].transcript,
        unary.results[0].alternatives[0].transcript
    );
    assert_eq!(
        streamed.results[0].alternatives[0].am_score,
        unary.results[0].alternatives[0].am_score
    );
}

#[test]
fn bidi_emits_interim_after_each_chunk_plus_final() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let parts: Vec<Vec<u8>> = (0..4).map(|_| silent_wav(4000)).collect();
    let mut source = VecSource::new(wav_chunks(&config("general", false), &parts));
    let mut sink = VecSink::default();

    let last = bidi_streaming_recognize(&dispatcher, &mut source, &mut sink).unwrap();
    assert_eq!(sink.responses.len(), 4);

    // each interim reflects the frontier after its chunk and no later one
    for (i, interim) in sink.responses.iter().enumerate() {
        if i > 0 {
            assert_ne!(
                interim.results[0].alternatives[0].am_score,
                sink.responses[i - 1].results[0].alternatives[0].am_score
            );
        }
    }

    // the final response corresponds to the full input
    let unary_request = RecognizeRequest {
        config: config("general", false),
        audio: silent_wav(16000),
        uuid: "bidi-reference".to_string(),
    };
    let unary = recognize(&dispatcher, &unary_request, DEFAULT_CHUNK_SECONDS).unwrap();

    assert_eq!(
        last.results[0].alternatives[0].am_score,
        unary.results[0].alternatives[0].am_score
    );
    assert_eq!(
        last.results[0].alternatives[0].lm_score,
        unary.results[0].alternatives[0].lm_score
    );
}

#[test]
fn empty_stream_is_an_invalid_request() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let mut source = VecSource::new(Vec::new());
    let err = streaming_recognize(&dispatcher, &mut source).unwrap_err();
    assert!(matches!(err, ServeError::InvalidRequest(_)));
}

#[test]
fn cancellation_mid_stream_releases_the_worker() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let parts: Vec<Vec<u8>> = (0..2).map(|_| silent_wav(4000)).collect();
    let mut source = VecSource::cancelled_after(wav_chunks(&config("general", false), &parts));

    let err = streaming_recognize(&dispatcher, &mut source).unwrap_err();
    assert!(matches!(err, ServeError::Cancelled));

    // the worker went back to the pool despite the cancellation
    let pool = dispatcher.pool(&ModelId::new("general", "en")).unwrap();
    assert_eq!(pool.idle_count(), 1);
    assert!(!pool.acquire().is_active());
}

#[test]
fn malformed_audio_mid_stream_fails_and_releases() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let chunks = vec![
        StreamingChunk {
            config: config("general", false),
            audio: silent_wav(4000),
            uuid: "bad-stream".to_string(),
        },
        StreamingChunk {
            config: config("general", false),
            audio: b"truncated garbage".to_vec(),
            uuid: "bad-stream".to_string(),
        },
    ];
    let mut source = VecSource::new(chunks);

    let err = streaming_recognize(&dispatcher, &mut source).unwrap_err();
    assert!(matches!(err, ServeError::InvalidAudio(_)));

    let pool = dispatcher.pool(&ModelId::new("general", "en")).unwrap();
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn zero_length_unary_audio_yields_empty_alternatives() {
    let dir = model_dir();
    let dispatcher =
        Dispatcher::new(&MockEngine::new(), &[spec("general", "en", dir.path(), 1)]).unwrap();

    let request = RecognizeRequest {
        config: config("general", false),
        audio: silent_wav(0),
        uuid: "zero".to_string(),
    };

    let response = recognize(&dispatcher, &request, DEFAULT_CHUNK_SECONDS).unwrap();
    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].alternatives.is_empty());
}
