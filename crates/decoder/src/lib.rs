//! Decoder pools and request dispatch for lattice-serve
//!
//! The pieces, leaves first:
//! - [`bundle::ModelBundle`]: immutable, shareable artifacts of one model
//! - [`worker::DecoderWorker`]: per-utterance mutable decoding state
//! - [`pool::DecoderPool`]: bounded blocking queue of warm workers
//! - [`dispatch::Dispatcher`]: model id to pool registry
//! - [`session`]: per-request drivers for the three request shapes
//! - [`lattice`]: n-best extraction, rescoring, word alignment
//! - [`testing`]: deterministic in-memory engine backing the test suite

pub mod bundle;
pub mod dispatch;
pub mod lattice;
pub mod pool;
pub mod session;
pub mod testing;
pub mod worker;

pub use bundle::{ModelBundle, ModelLayout};
pub use dispatch::Dispatcher;
pub use pool::{DecoderPool, WorkerLease};
pub use session::{
    bidi_streaming_recognize, recognize, streaming_recognize, ChunkSource, ResponseSink,
    StreamingChunk, DEFAULT_CHUNK_SECONDS,
};
pub use worker::DecoderWorker;
