// src/detect/mod.rs

//! Output event detection.
//!
//! None of the supervised tools expose a machine-readable "build finished"
//! signal, so lifecycle events are inferred from their text output. All of
//! that guesswork is confined to this module: the supervisor only ever sees
//! [`OutputEvent`]s.
//!
//! - [`lines`] turns raw chunks into cleaned lines (reassembly + ANSI strip).
//! - [`Detector`] classifies each line against an ordered predicate list.

pub mod lines;

use std::path::{Path, PathBuf};

pub use lines::{strip_ansi, LineBuffer};

/// What a single line of tool output means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// The bundler reports it wrote this artifact.
    BundleWritten(PathBuf),
    /// The type-checker reports an error.
    TypeError(String),
    /// Anything else.
    Generic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PredicateKind {
    BundleWritten(PathBuf),
    TypeError,
}

/// A line matches when it contains every needle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePredicate {
    kind: PredicateKind,
    needles: Vec<String>,
}

impl LinePredicate {
    /// `marker` and the artifact path both appear in the line, e.g.
    /// `created dist/module.js in 120ms`.
    pub fn bundle_written(marker: impl Into<String>, artifact: impl AsRef<Path>) -> Self {
        let artifact = artifact.as_ref();
        Self {
            kind: PredicateKind::BundleWritten(artifact.to_path_buf()),
            needles: vec![marker.into(), display_path(artifact)],
        }
    }

    /// e.g. `src/table.ts(12,5): error TS2322: ...`
    pub fn type_error(marker: impl Into<String>) -> Self {
        Self {
            kind: PredicateKind::TypeError,
            needles: vec![marker.into()],
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        self.needles.iter().all(|needle| line.contains(needle.as_str()))
    }

    fn event_for(&self, line: &str) -> OutputEvent {
        match &self.kind {
            PredicateKind::BundleWritten(path) => OutputEvent::BundleWritten(path.clone()),
            PredicateKind::TypeError => OutputEvent::TypeError(line.trim().to_string()),
        }
    }
}

/// Tools print paths with forward slashes regardless of platform.
fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Stateful classifier for one output stream.
///
/// Keep one `Detector` per (process, stream): the line buffer assumes the
/// chunks it sees come from a single stream in order.
#[derive(Debug, Clone)]
pub struct Detector {
    predicates: Vec<LinePredicate>,
    buffer: LineBuffer,
}

impl Detector {
    pub fn new(predicates: Vec<LinePredicate>) -> Self {
        Self {
            predicates,
            buffer: LineBuffer::new(),
        }
    }

    /// Feed a raw chunk, returning the cleaned lines it completes.
    pub fn lines(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push(chunk)
    }

    /// Flush the trailing partial line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        self.buffer.finish()
    }

    /// Classify one cleaned line; the first matching predicate wins.
    pub fn classify_line(&self, line: &str) -> OutputEvent {
        self.predicates
            .iter()
            .find(|p| p.matches(line))
            .map(|p| p.event_for(line))
            .unwrap_or_else(|| OutputEvent::Generic(line.to_string()))
    }

    /// Feed a raw chunk and classify every line it completes.
    pub fn classify(&mut self, chunk: &[u8]) -> Vec<OutputEvent> {
        self.lines(chunk)
            .iter()
            .map(|line| self.classify_line(line))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundler_detector() -> Detector {
        Detector::new(vec![
            LinePredicate::bundle_written("created", "dist/module.js"),
            LinePredicate::type_error("error TS"),
        ])
    }

    #[test]
    fn rollup_created_line_is_bundle_written() {
        let mut d = bundler_detector();
        let events = d.classify(b"\x1b[32mcreated \x1b[1mdist/module.js\x1b[22m in \x1b[1m120ms\x1b[22m\x1b[39m\n");
        assert_eq!(events, vec![OutputEvent::BundleWritten(PathBuf::from("dist/module.js"))]);
    }

    #[test]
    fn multi_output_created_line_matches() {
        let mut d = bundler_detector();
        let events = d.classify(b"created dist/index.js, dist/module.js, dist/nomodule.js in 2.1s\n");
        assert_eq!(events, vec![OutputEvent::BundleWritten(PathBuf::from("dist/module.js"))]);
    }

    #[test]
    fn created_line_for_other_artifact_is_generic() {
        let mut d = bundler_detector();
        let events = d.classify(b"created dist/index.d.ts in 300ms\n");
        assert_eq!(
            events,
            vec![OutputEvent::Generic("created dist/index.d.ts in 300ms".into())]
        );
    }

    #[test]
    fn first_matching_predicate_wins() {
        let mut d = bundler_detector();
        let events = d.classify(b"created dist/module.js with error TS2322 warnings\n");
        assert!(matches!(events[0], OutputEvent::BundleWritten(_)));
    }

    #[test]
    fn type_error_carries_cleaned_message() {
        let mut d = bundler_detector();
        let events = d.classify(
            b"\x1b[96msrc/table.ts\x1b[0m(12,5): \x1b[91merror\x1b[0m\x1b[90m TS2322: \x1b[0mType 'string' is not assignable\n",
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            OutputEvent::TypeError(msg) => {
                assert!(msg.starts_with("src/table.ts(12,5): error TS2322"));
            }
            other => panic!("expected TypeError, got {other:?}"),
        }
    }

    #[test]
    fn partial_lines_are_classified_once_complete() {
        let mut d = bundler_detector();
        assert!(d.classify(b"created dist/mo").is_empty());
        let events = d.classify(b"dule.js in 5ms\nwaiting for changes...\n");
        assert_eq!(
            events,
            vec![
                OutputEvent::BundleWritten(PathBuf::from("dist/module.js")),
                OutputEvent::Generic("waiting for changes...".into()),
            ]
        );
    }

    #[test]
    fn no_predicates_means_everything_is_generic() {
        let mut d = Detector::new(Vec::new());
        assert_eq!(
            d.classify(b"listening on :3000\n"),
            vec![OutputEvent::Generic("listening on :3000".into())]
        );
    }
}
