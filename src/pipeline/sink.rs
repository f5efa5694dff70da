//! Transcript output sinks.

use crate::error::Result;
use std::io::Write;

/// Pluggable output handler for stitched transcript fragments.
///
/// Pairs with `AudioSource` for input. The controller calls
/// [`emit`](Self::emit) with the words each chunk contributed after
/// stitching, so output flows progressively while the session runs.
pub trait TranscriptSink: Send + 'static {
    /// Handle one stitched fragment. Called once per contributing chunk.
    fn emit(&mut self, text: &str) -> Result<()>;

    /// Called on session shutdown. Return the accumulated transcript if
    /// applicable.
    fn finish(&mut self) -> Option<String> {
        None
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Streams fragments to stdout as they arrive.
///
/// Fragments print space-separated on one growing line; stdout is flushed
/// per fragment so a reader following the stream sees words promptly.
pub struct StdoutSink {
    emitted_any: bool,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { emitted_any: false }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptSink for StdoutSink {
    fn emit(&mut self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        if self.emitted_any {
            write!(stdout, " {}", text)?;
        } else {
            write!(stdout, "{}", text)?;
        }
        stdout.flush()?;
        self.emitted_any = true;
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        if self.emitted_any {
            println!();
        }
        None
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Collects fragments for finite runs and library use.
/// Returns the accumulated transcript on finish().
pub struct CollectorSink {
    collected: Vec<String>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self {
            collected: Vec::new(),
        }
    }

    pub fn fragments(&self) -> &[String] {
        &self.collected
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptSink for CollectorSink {
    fn emit(&mut self, text: &str) -> Result<()> {
        self.collected.push(text.to_string());
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        if self.collected.is_empty() {
            None
        } else {
            Some(self.collected.join(" "))
        }
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_is_object_safe() {
        let _sink: Box<dyn TranscriptSink> = Box::new(CollectorSink::new());
    }

    #[test]
    fn collector_sink_collects_and_joins_fragments() {
        let mut sink = CollectorSink::new();

        sink.emit("the quick").unwrap();
        sink.emit("brown fox").unwrap();

        assert_eq!(sink.fragments().len(), 2);
        assert_eq!(sink.finish(), Some("the quick brown fox".to_string()));
    }

    #[test]
    fn collector_sink_empty_returns_none() {
        let mut sink = CollectorSink::new();
        assert_eq!(sink.finish(), None);
    }

    #[test]
    fn collector_sink_single_fragment() {
        let mut sink = CollectorSink::new();
        sink.emit("alone").unwrap();
        assert_eq!(sink.finish(), Some("alone".to_string()));
    }

    #[test]
    fn sink_names() {
        assert_eq!(CollectorSink::new().name(), "collector");
        assert_eq!(StdoutSink::new().name(), "stdout");
    }

    #[test]
    fn stdout_sink_does_not_panic() {
        let mut sink = StdoutSink::new();
        sink.emit("hello").unwrap();
        sink.emit("there").unwrap();
        assert_eq!(sink.finish(), None);
    }
}
