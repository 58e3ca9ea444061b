//! Lattice post-processing: n-best extraction, RNNLM rescoring, word alignment

use lattice_serve_core::engine::{LatticeHandle, WordAlignment};
use lattice_serve_core::{calculate_confidence, Alternative, ServeError, UtteranceResult, Word};

use crate::bundle::ModelBundle;

/// Frame shift of the engine's feature pipeline in seconds.
const FRAME_SHIFT: f32 = 0.01;

/// Turn a decoded compact lattice into ranked alternatives.
///
/// When the bundle carries an RNNLM, the lattice is rescored by pruned
/// composition with the on-demand difference LM before n-best extraction;
/// an empty composition keeps the original lattice with a warning. Word
/// alignment always runs on the original, non-rescored lattice, and the
/// resulting word sequence is attached to the best alternative only.
pub fn find_alternatives(
    bundle: &ModelBundle,
    clat: &LatticeHandle,
    n_best: usize,
    word_level: bool,
) -> Result<UtteranceResult, ServeError> {
    let art = bundle.artifacts();
    let mut results: UtteranceResult = Vec::new();

    let rescored = if bundle.has_rnnlm() {
        // Scale out the acoustic component before composing so that
        // determinization takes the LM's best path regardless of the
        // scale's sign, then compose with
        // scale(-w, backoff(G)) ∘ scale(w, rnnlm).
        let acoustic_scale = f64::from(bundle.acoustic_scale());
        let prepared = if bundle.acoustic_scale() != 1.0 {
            let scaled = art.scale_acoustic(clat, acoustic_scale.recip());
            art.top_sort_if_needed(&scaled)
        } else {
            art.top_sort_if_needed(clat)
        };

        match art.compose_rnnlm_pruned(&prepared)? {
            Some(composed) => Some(composed),
            None => {
                tracing::warn!("empty lattice after rnnlm rescoring, keeping original");
                None
            }
        }
    } else {
        None
    };
    let scored = rescored.as_ref().unwrap_or(clat);

    let paths = art.nbest(scored, n_best);
    if paths.is_empty() {
        tracing::warn!("no n-best entries");
        return Ok(results);
    }

    for path in &paths {
        let words: Vec<String> = path
            .word_ids
            .iter()
            .map(|&id| art.word(id).unwrap_or_default())
            .collect();

        results.push(Alternative {
            transcript: words.join(" "),
            confidence: calculate_confidence(path.lm_score, path.am_score, path.word_ids.len()),
            am_score: path.am_score,
            lm_score: path.lm_score,
            words: Vec::new(),
        });
    }

    if !(bundle.has_word_boundary() && word_level) {
        return Ok(results);
    }

    let aligned = match art.word_align(clat) {
        WordAlignment::Aligned(lat) => Some(art.top_sort_if_needed(&lat)),
        WordAlignment::Partial(lat) => {
            tracing::warn!("word alignment incomplete, outputting partial lattice");
            Some(art.top_sort_if_needed(&lat))
        }
        WordAlignment::Empty => {
            tracing::warn!("empty aligned lattice, producing no word level output");
            None
        }
    };

    if let Some(aligned) = aligned {
        let scaled = art.scale_lattice(&aligned, 1.0, f64::from(bundle.acoustic_scale()));
        let time_unit = FRAME_SHIFT * bundle.frame_subsampling_factor() as f32;

        let words: Vec<Word> = art
            .mbr_one_best(&scaled)
            .into_iter()
            .map(|w| Word {
                start_time: w.begin_frame * time_unit,
                end_time: w.end_frame * time_unit,
                confidence: w.confidence,
                word: art.word(w.word_id).unwrap_or_default(),
            })
            .collect();

        // Only the best alternative carries word timings.
        if !words.is_empty() {
            if let Some(best) = results.first_mut() {
                best.words = words;
            }
        }
    }

    Ok(results)
}
