// src/detect/lines.rs

//! Line reassembly and terminal escape stripping.

use std::sync::LazyLock;

use regex::Regex;

/// `ESC [ <params> <letter>`: colours, cursor movement, line clearing.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ANSI escape pattern is valid")
});

/// Remove terminal control sequences from `line`.
pub fn strip_ansi(line: &str) -> String {
    ANSI_ESCAPE.replace_all(line, "").into_owned()
}

/// Splits a byte stream into cleaned lines.
///
/// A trailing partial line is kept until the chunk that completes it arrives
/// (or until [`LineBuffer::finish`]). Bytes are only decoded once a whole
/// line is available, so multi-byte characters split across chunks survive.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk and return every line it completes.
    ///
    /// Lines that are empty (or whitespace only) after stripping are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(clean_line)
            .collect()
    }

    /// Flush whatever partial line is left (the stream has closed).
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        clean_line(&rest)
    }

    /// Bytes currently waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn clean_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let decoded = String::from_utf8_lossy(raw);
    let line = strip_ansi(&decoded);
    if line.trim().is_empty() {
        None
    } else {
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_colour_codes() {
        let raw = "\u{1b}[32mcreated \u{1b}[1mdist/module.js\u{1b}[22m in \u{1b}[1m120ms\u{1b}[22m\u{1b}[39m";
        assert_eq!(strip_ansi(raw), "created dist/module.js in 120ms");
    }

    #[test]
    fn strips_screen_clearing_sequences() {
        assert_eq!(strip_ansi("\u{1b}[2J\u{1b}[3J\u{1b}[Hwatching"), "watching");
        assert_eq!(strip_ansi("\u{1b}[?25lhidden cursor"), "hidden cursor");
    }

    #[test]
    fn reassembles_line_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"created dist/mod").is_empty());
        assert_eq!(buf.pending_len(), 16);
        assert_eq!(buf.push(b"ule.js in 1s\nnext"), vec!["created dist/module.js in 1s"]);
        assert_eq!(buf.finish().as_deref(), Some("next"));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn drops_empty_and_blank_lines_and_crlf() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"a\r\n\n   \n\x1b[0m\nb\n");
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn utf8_split_across_chunks_is_preserved() {
        let bytes = "✅ done\n".as_bytes();
        let mut buf = LineBuffer::new();
        assert!(buf.push(&bytes[..2]).is_empty());
        assert_eq!(buf.push(&bytes[2..]), vec!["✅ done"]);
    }

    fn expected_lines(text: &str) -> Vec<String> {
        text.split('\n')
            .filter_map(|l| clean_line(l.as_bytes()))
            .collect()
    }

    proptest! {
        #[test]
        fn chunking_never_drops_or_duplicates_lines(
            lines in proptest::collection::vec("[a-z \u{e9}\u{1b}\\[0-9;m]{0,12}", 0..12),
            cuts in proptest::collection::vec(any::<usize>(), 0..8),
        ) {
            let text = lines.join("\n");
            let bytes = text.as_bytes();

            let mut cut_points: Vec<usize> = cuts
                .into_iter()
                .map(|c| if bytes.is_empty() { 0 } else { c % bytes.len() })
                .collect();
            cut_points.sort_unstable();
            cut_points.dedup();

            let mut buf = LineBuffer::new();
            let mut got = Vec::new();
            let mut start = 0;
            for cut in cut_points {
                got.extend(buf.push(&bytes[start..cut]));
                start = cut;
            }
            got.extend(buf.push(&bytes[start..]));
            got.extend(buf.finish());

            prop_assert_eq!(got, expected_lines(&text));
        }
    }
}
