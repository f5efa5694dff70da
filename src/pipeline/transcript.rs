//! Running transcript accumulator.

use crate::stt::backend::WordToken;

/// The session's accumulated transcript.
///
/// Append-only: the stitcher decides which words of each chunk survive,
/// and once appended a word is never revised.
#[derive(Debug, Default)]
pub struct RunningTranscript {
    words: Vec<WordToken>,
}

impl RunningTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append stitched words to the transcript.
    pub fn push_words(&mut self, words: Vec<WordToken>) {
        self.words.extend(words);
    }

    /// Full transcript as a single space-separated string.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The trailing `n` words, oldest first.
    pub fn tail(&self, n: usize) -> &[WordToken] {
        let start = self.words.len().saturating_sub(n);
        &self.words[start..]
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<WordToken> {
        text.split_whitespace().map(WordToken::new).collect()
    }

    #[test]
    fn accumulates_in_order() {
        let mut transcript = RunningTranscript::new();
        transcript.push_words(words("the quick brown"));
        transcript.push_words(words("fox jumps"));
        assert_eq!(transcript.text(), "the quick brown fox jumps");
        assert_eq!(transcript.word_count(), 5);
    }

    #[test]
    fn tail_returns_trailing_words() {
        let mut transcript = RunningTranscript::new();
        transcript.push_words(words("one two three four"));
        let tail: Vec<&str> = transcript.tail(2).iter().map(|w| w.text.as_str()).collect();
        assert_eq!(tail, vec!["three", "four"]);
    }

    #[test]
    fn tail_larger_than_transcript_returns_everything() {
        let mut transcript = RunningTranscript::new();
        transcript.push_words(words("only two"));
        assert_eq!(transcript.tail(10).len(), 2);
    }

    #[test]
    fn empty_transcript() {
        let transcript = RunningTranscript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.text(), "");
        assert!(transcript.tail(5).is_empty());
    }
}
