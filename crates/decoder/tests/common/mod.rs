//! Shared fixtures: model directories, specs, and WAV bytes

// not every test binary uses every fixture
#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;

use tempfile::TempDir;

use lattice_serve_config::ModelSpec;

/// A model directory carrying only the required artifacts.
pub fn model_dir() -> TempDir {
    model_dir_with(ModelDirOpts::default())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModelDirOpts {
    pub word_boundary: bool,
    pub rnnlm: bool,
    pub ivectors: bool,
}

pub fn model_dir_with(opts: ModelDirOpts) -> TempDir {
    let dir = TempDir::new().expect("create temp model dir");
    let root = dir.path();

    std::fs::create_dir(root.join("conf")).unwrap();
    for name in ["HCLG.fst", "final.mdl", "words.txt", "conf/mfcc.conf"] {
        std::fs::write(root.join(name), b"fixture").unwrap();
    }

    if opts.ivectors {
        std::fs::write(root.join("conf/ivector_extractor.conf"), b"fixture").unwrap();
    }
    if opts.word_boundary {
        std::fs::write(root.join("word_boundary.int"), b"fixture").unwrap();
    }
    if opts.rnnlm {
        std::fs::create_dir(root.join("rnnlm")).unwrap();
        for name in ["final.raw", "word_embedding.mat", "G.fst"] {
            std::fs::write(root.join("rnnlm").join(name), b"fixture").unwrap();
        }
    }

    dir
}

pub fn spec(name: &str, language_code: &str, path: &Path, n_decoders: usize) -> ModelSpec {
    ModelSpec {
        name: name.to_string(),
        language_code: language_code.to_string(),
        path: path.to_path_buf(),
        n_decoders,
        beam: 16.0,
        min_active: 200,
        max_active: 7000,
        lattice_beam: 6.0,
        acoustic_scale: 1.0,
        frame_subsampling_factor: 3,
        silence_weight: 1.0,
        max_ngram_order: 3,
        rnnlm_weight: 0.5,
        bos_index: "1".to_string(),
        eos_index: "2".to_string(),
    }
}

/// A mono 16 kHz PCM16 WAV of `samples` zero-valued samples.
pub fn silent_wav(samples: usize) -> Vec<u8> {
    wav_from_samples(&vec![0i16; samples])
}

pub fn wav_from_samples(samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Raw mono 16-bit little-endian PCM of `samples` zero-valued samples.
pub fn silent_pcm(samples: usize) -> Vec<u8> {
    vec![0u8; samples * 2]
}
