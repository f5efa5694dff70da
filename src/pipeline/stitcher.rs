//! Cross-chunk transcript stitching.
//!
//! Consecutive chunks share an overlap region, so the backend transcribes
//! the same words twice at every chunk boundary. The stitcher removes the
//! repetition by matching the new result's prefix against the trailing
//! words of what has already been emitted, and trimming the matched run.
//!
//! Matching is fuzzy by necessity: the two passes over the overlap see
//! different acoustic context and routinely disagree on punctuation,
//! capitalization or even a word. When no trustworthy match exists the
//! stitcher appends the result unmodified: occasional duplicated words
//! read far better than silently dropped ones.

use crate::defaults;
use crate::stt::backend::{TranscriptionResult, WordToken};
use std::time::Duration;

/// Recognition markers the backends emit for non-speech audio.
const MARKERS: &[&str] = &[
    "[BLANK_AUDIO]",
    "[INAUDIBLE]",
    "[MUSIC]",
    "[APPLAUSE]",
    "[LAUGHTER]",
    "(BLANK_AUDIO)",
    "(inaudible)",
];

/// What the stitcher decided for one chunk.
#[derive(Debug, Clone)]
pub struct StitchOutcome {
    /// Words to append to the running transcript.
    pub words: Vec<WordToken>,
    /// How many words were trimmed from the result's prefix.
    pub trimmed: usize,
    /// True when a boundary was expected but no acceptable match was
    /// found, so the result was appended unmodified. Diagnostic only;
    /// never an error.
    pub ambiguous: bool,
}

/// Configuration for the stitcher.
#[derive(Debug, Clone)]
pub struct StitcherConfig {
    /// Overlap between consecutive chunks.
    pub overlap: Duration,
    /// Expected speaking rate, used to predict how many words the
    /// overlap region holds.
    pub words_per_second: f32,
    /// Minimum matched run length for a trim. Single-word matches on
    /// common words are too risky.
    pub min_match_words: usize,
}

impl StitcherConfig {
    pub fn new(overlap: Duration) -> Self {
        Self {
            overlap,
            words_per_second: defaults::WORDS_PER_SECOND,
            min_match_words: defaults::MIN_MATCH_WORDS,
        }
    }

    /// Predicted word count of the overlap region.
    fn predicted_overlap_words(&self) -> usize {
        (self.overlap.as_secs_f32() * self.words_per_second).round() as usize
    }

    /// Search window, in words, on both sides of the boundary. Twice the
    /// prediction leaves room for fast speech.
    fn window_words(&self) -> usize {
        (self.predicted_overlap_words() * 2).max(self.min_match_words)
    }
}

/// Deduplicates chunk boundaries against the emitted transcript.
pub struct TranscriptStitcher {
    config: StitcherConfig,
    /// Normalized trailing words of the transcript, capped at the window.
    context: Vec<String>,
    ambiguous_count: u64,
}

impl TranscriptStitcher {
    pub fn new(config: StitcherConfig) -> Self {
        Self {
            config,
            context: Vec::new(),
            ambiguous_count: 0,
        }
    }

    /// Stitch one chunk's result onto the transcript.
    ///
    /// `continuous` must be false when the chunk does not border the
    /// previously emitted audio (first chunk, or the preceding chunk was
    /// gated out as silence). A discontinuous chunk overlaps silence, not
    /// the transcript tail, so no trimming is attempted and the stale
    /// context is discarded.
    pub fn stitch(&mut self, result: &TranscriptionResult, continuous: bool) -> StitchOutcome {
        let incoming = clean_markers(&result.words);
        if incoming.is_empty() {
            return StitchOutcome {
                words: Vec::new(),
                trimmed: 0,
                ambiguous: false,
            };
        }

        if !continuous {
            self.context.clear();
        }

        let normalized: Vec<String> = incoming.iter().map(|w| normalize(&w.text)).collect();

        let trimmed = if self.context.is_empty() {
            0
        } else {
            self.find_trim(&normalized)
        };

        let ambiguous = continuous && !self.context.is_empty() && trimmed == 0;
        if ambiguous {
            self.ambiguous_count += 1;
        }

        // Update the rolling context with everything that will be emitted.
        let window = self.config.window_words();
        self.context.extend_from_slice(&normalized[trimmed..]);
        if self.context.len() > window {
            self.context.drain(..self.context.len() - window);
        }

        StitchOutcome {
            words: incoming[trimmed..].to_vec(),
            trimmed,
            ambiguous,
        }
    }

    /// Number of chunks appended without a trustworthy boundary match.
    pub fn ambiguous_count(&self) -> u64 {
        self.ambiguous_count
    }

    /// Find how many words to drop from the incoming prefix.
    ///
    /// Searches for the longest contiguous run shared between the context
    /// window and the incoming prefix window. Ties are broken by how
    /// close the resulting trim is to the predicted overlap word count.
    /// Returns 0 when nothing meets `min_match_words`.
    fn find_trim(&self, incoming: &[String]) -> usize {
        let window = self.config.window_words();
        let prefix_len = incoming.len().min(window);
        let prefix = &incoming[..prefix_len];
        let predicted = self.config.predicted_overlap_words();

        let mut best_len = 0usize;
        let mut best_trim = 0usize;

        for i in 0..self.context.len() {
            for j in 0..prefix.len() {
                let mut len = 0;
                while i + len < self.context.len()
                    && j + len < prefix.len()
                    && self.context[i + len] == prefix[j + len]
                {
                    len += 1;
                }
                if len < self.config.min_match_words {
                    continue;
                }
                // Trim everything through the end of the matched run; the
                // words before it inside the prefix are re-recognitions of
                // overlap audio too.
                let trim = j + len;
                if trim > prefix_len {
                    continue;
                }
                let better = len > best_len
                    || (len == best_len
                        && trim.abs_diff(predicted) < best_trim.abs_diff(predicted));
                if better {
                    best_len = len;
                    best_trim = trim;
                }
            }
        }

        best_trim
    }
}

/// Lowercase and strip surrounding punctuation for matching purposes.
fn normalize(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Drop recognition markers and empty tokens.
fn clean_markers(words: &[WordToken]) -> Vec<WordToken> {
    words
        .iter()
        .filter(|w| {
            let text = w.text.trim();
            !text.is_empty() && !MARKERS.iter().any(|m| text.contains(m))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: &str) -> TranscriptionResult {
        TranscriptionResult::from_text(text)
    }

    fn stitcher() -> TranscriptStitcher {
        TranscriptStitcher::new(StitcherConfig::new(Duration::from_secs(2)))
    }

    fn texts(outcome: &StitchOutcome) -> Vec<&str> {
        outcome.words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn first_chunk_passes_through() {
        let mut s = stitcher();
        let outcome = s.stitch(&result("the quick brown fox"), false);
        assert_eq!(texts(&outcome), vec!["the", "quick", "brown", "fox"]);
        assert_eq!(outcome.trimmed, 0);
        assert!(!outcome.ambiguous);
    }

    #[test]
    fn overlap_repetition_is_trimmed() {
        let mut s = stitcher();
        s.stitch(&result("the quick brown fox jumps"), false);
        let outcome = s.stitch(&result("fox jumps over the lazy dog"), true);
        assert_eq!(texts(&outcome), vec!["over", "the", "lazy", "dog"]);
        assert_eq!(outcome.trimmed, 2);
        assert!(!outcome.ambiguous);
    }

    #[test]
    fn matching_ignores_case_and_punctuation() {
        let mut s = stitcher();
        s.stitch(&result("we will meet at Noon, tomorrow"), false);
        let outcome = s.stitch(&result("noon tomorrow in the lobby"), true);
        assert_eq!(texts(&outcome), vec!["in", "the", "lobby"]);
    }

    #[test]
    fn no_match_appends_unmodified_and_flags_ambiguity() {
        let mut s = stitcher();
        s.stitch(&result("completely different words here"), false);
        let outcome = s.stitch(&result("nothing matches the previous text"), true);
        assert_eq!(outcome.trimmed, 0);
        assert!(outcome.ambiguous);
        assert_eq!(outcome.words.len(), 5);
        assert_eq!(s.ambiguous_count(), 1);
    }

    #[test]
    fn single_word_match_is_not_trimmed() {
        // "the" repeats but a one-word match is below min_match_words.
        let mut s = stitcher();
        s.stitch(&result("pass me the"), false);
        let outcome = s.stitch(&result("the salt please"), true);
        assert_eq!(outcome.trimmed, 0);
        assert!(outcome.ambiguous);
    }

    #[test]
    fn discontinuous_chunk_skips_matching() {
        let mut s = stitcher();
        s.stitch(&result("see you lazy dog tomorrow"), false);
        // A silent chunk was gated out in between; even though "lazy dog"
        // matches, the overlap region was silence and must not be trimmed.
        let outcome = s.stitch(&result("lazy dog walks by"), false);
        assert_eq!(outcome.trimmed, 0);
        assert!(!outcome.ambiguous);
        assert_eq!(outcome.words.len(), 4);
    }

    #[test]
    fn empty_result_is_a_quiet_no_op() {
        let mut s = stitcher();
        s.stitch(&result("some words"), false);
        let outcome = s.stitch(&result(""), true);
        assert!(outcome.words.is_empty());
        assert!(!outcome.ambiguous);
        assert_eq!(s.ambiguous_count(), 0);
    }

    #[test]
    fn markers_are_removed_before_matching() {
        let mut s = stitcher();
        let outcome = s.stitch(&result("[BLANK_AUDIO] hello there [MUSIC]"), false);
        assert_eq!(texts(&outcome), vec!["hello", "there"]);
    }

    #[test]
    fn marker_only_result_is_empty() {
        let mut s = stitcher();
        let outcome = s.stitch(&result("[BLANK_AUDIO]"), false);
        assert!(outcome.words.is_empty());
    }

    #[test]
    fn trim_never_exceeds_the_prefix_window() {
        // Overlap predicts ~5 words; window is 10. Even with a long
        // repeated run the trim stays within the incoming prefix window.
        let mut s = stitcher();
        s.stitch(
            &result("a b c d e f g h i j k l m n o p"),
            false,
        );
        let outcome = s.stitch(&result("i j k l m n o p q r"), true);
        assert!(outcome.trimmed <= 10);
        let emitted = texts(&outcome);
        assert!(emitted.ends_with(&["q", "r"]));
    }

    #[test]
    fn three_chunk_session_reads_continuously() {
        let mut s = stitcher();
        let mut transcript: Vec<String> = Vec::new();

        for (i, text) in [
            "the quick brown fox jumps",
            "fox jumps over the lazy dog",
            "the lazy dog sleeps now",
        ]
        .iter()
        .enumerate()
        {
            let outcome = s.stitch(&result(text), i > 0);
            transcript.extend(outcome.words.iter().map(|w| w.text.clone()));
        }

        assert_eq!(
            transcript.join(" "),
            "the quick brown fox jumps over the lazy dog sleeps now"
        );
    }

    #[test]
    fn tie_breaks_toward_the_predicted_boundary() {
        // Two equally long candidate matches; the one whose trim count is
        // closer to the predicted 5 overlap words must win.
        let mut s = stitcher();
        s.stitch(&result("x y said again and again x y"), false);
        let outcome = s.stitch(&result("x y and more words follow"), true);
        // Trimming "x y" (2 words, distance 3 from prediction 5) beats
        // nothing; ensure it trimmed rather than flagged ambiguous.
        assert_eq!(outcome.trimmed, 2);
        assert_eq!(texts(&outcome), vec!["and", "more", "words", "follow"]);
    }

    #[test]
    fn context_survives_across_multiple_small_chunks() {
        let mut s = stitcher();
        s.stitch(&result("alpha beta"), false);
        s.stitch(&result("gamma delta"), true);
        // Context should now hold alpha..delta; a repeat of the last two
        // words across the boundary still matches.
        let outcome = s.stitch(&result("gamma delta epsilon"), true);
        assert_eq!(texts(&outcome), vec!["epsilon"]);
    }
}
