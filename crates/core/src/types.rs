//! Recognition results and the request/response surface

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one loaded model: `(name, language_code)`.
///
/// Used as the key of the dispatcher's pool registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,
    pub language_code: String,
}

impl ModelId {
    pub fn new(name: impl Into<String>, language_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language_code: language_code.into(),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.language_code)
    }
}

/// A single word hypothesis with timings and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub start_time: f32,
    pub end_time: f32,
    pub confidence: f32,
    pub word: String,
}

/// One transcription hypothesis and details about the parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f64,
    pub am_score: f32,
    pub lm_score: f32,
    /// Word-level output; only the best alternative carries words.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

/// Result for one continuous utterance, highest-likelihood first.
pub type UtteranceResult = Vec<Alternative>;

/// Per-request recognition parameters consumed by the core.
///
/// On streaming requests the first message's config governs the whole
/// stream; subsequent messages may change only `raw` and `data_bytes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub model: String,
    pub language_code: String,
    #[serde(default)]
    pub sample_rate_hertz: u32,
    #[serde(default)]
    pub max_alternatives: usize,
    /// Audio is raw headerless mono 16-bit PCM instead of a WAV container.
    #[serde(default)]
    pub raw: bool,
    /// Byte count of one raw PCM chunk; ignored for WAV audio.
    #[serde(default)]
    pub data_bytes: usize,
    /// Request word-level timings and confidences.
    #[serde(default)]
    pub word_level: bool,
}

impl RecognitionConfig {
    pub fn model_id(&self) -> ModelId {
        ModelId::new(&self.model, &self.language_code)
    }
}

/// A unary recognition request: full audio plus its config.
#[derive(Debug, Clone)]
pub struct RecognizeRequest {
    pub config: RecognitionConfig,
    pub audio: Vec<u8>,
    pub uuid: String,
}

/// One utterance's alternatives as returned to the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechRecognitionResult {
    pub alternatives: Vec<Alternative>,
}

/// Response carrying an ordered list of utterance results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub results: Vec<SpeechRecognitionResult>,
}

impl RecognizeResponse {
    /// Package decoded alternatives into a response.
    ///
    /// Alternatives with empty transcripts are dropped, and word-level
    /// output is stripped unless the request asked for it.
    pub fn from_alternatives(alternatives: UtteranceResult, word_level: bool) -> Self {
        let alternatives = alternatives
            .into_iter()
            .filter(|alt| !alt.transcript.is_empty())
            .map(|mut alt| {
                if !word_level {
                    alt.words.clear();
                }
                alt
            })
            .collect();

        Self {
            results: vec![SpeechRecognitionResult { alternatives }],
        }
    }
}

/// Fuse language and acoustic scores into a single confidence in `[0, 1]`.
pub fn calculate_confidence(lm_score: f32, am_score: f32, n_words: usize) -> f64 {
    let fused = -0.000_146_648_8 * (2.388_449 * f64::from(lm_score) + f64::from(am_score))
        / (n_words as f64 + 1.0)
        + 0.956;
    fused.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(calculate_confidence(-1e9, 0.0, 0), 1.0);
        assert_eq!(calculate_confidence(1e9, 1e9, 0), 0.0);

        let mid = calculate_confidence(100.0, 1500.0, 4);
        assert!((0.0..=1.0).contains(&mid));
    }

    #[test]
    fn confidence_matches_known_fusion() {
        // 0 words: -0.0001466488 * (2.388449 * 10 + 20) / 1 + 0.956
        let c = calculate_confidence(10.0, 20.0, 0);
        assert!((c - 0.949_534_8).abs() < 1e-4);
    }

    #[test]
    fn response_drops_empty_transcripts_and_strips_words() {
        let alts = vec![
            Alternative {
                transcript: "hello world".into(),
                confidence: 0.9,
                am_score: -10.0,
                lm_score: 4.0,
                words: vec![Word {
                    start_time: 0.0,
                    end_time: 0.3,
                    confidence: 0.8,
                    word: "hello".into(),
                }],
            },
            Alternative::default(),
        ];

        let resp = RecognizeResponse::from_alternatives(alts.clone(), false);
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].alternatives.len(), 1);
        assert!(resp.results[0].alternatives[0].words.is_empty());

        let resp = RecognizeResponse::from_alternatives(alts, true);
        assert_eq!(resp.results[0].alternatives[0].words.len(), 1);
    }

    #[test]
    fn model_id_display() {
        let id = ModelId::new("general", "en");
        assert_eq!(id.to_string(), "general (en)");
    }
}
