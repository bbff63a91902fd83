//! Extracts error messages from compiler log output.
//!
//! TeX-style logs mark an error with a `!` line, follow it with context
//! lines, and terminate the block with a blank line. An `<inserted text>`
//! marker line may appear inside a block; the marker itself is not part of
//! the message. A later `!` line while a block is still buffering replaces
//! the buffer instead of emitting it first; observed server logs rely on
//! that shape, so it is kept as-is.

const INSERTED_TEXT_MARKER: &str = "<inserted text>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No message block open.
    Initial,
    /// Buffering a block started by a `!` line.
    GotBang,
    /// Buffering after an `<inserted text>` marker.
    InsertedText,
}

/// Lazily yields one message per completed log block. Single pass, not
/// restartable.
pub fn extract_log_messages<I>(lines: I) -> LogMessages<I::IntoIter>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    LogMessages {
        lines: lines.into_iter(),
        state: State::Initial,
        buf: String::new(),
    }
}

pub struct LogMessages<I> {
    lines: I,
    state: State,
    buf: String,
}

impl<I> Iterator for LogMessages<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        for line in self.lines.by_ref() {
            let line = line.as_ref().trim_end();
            match self.state {
                State::Initial => {
                    if let Some(rest) = line.strip_prefix('!') {
                        self.buf = rest.trim_start().to_string();
                        self.state = State::GotBang;
                    }
                }
                State::GotBang | State::InsertedText => {
                    if line == INSERTED_TEXT_MARKER {
                        self.state = State::InsertedText;
                    } else if line.is_empty() {
                        self.state = State::Initial;
                        return Some(std::mem::take(&mut self.buf));
                    } else if let Some(rest) = line.strip_prefix('!') {
                        // Replaces the pending message, no emit.
                        self.buf = rest.trim_start().to_string();
                        self.state = State::GotBang;
                    } else {
                        self.buf.push('\n');
                        self.buf.push_str(line);
                    }
                }
            }
        }
        // An unterminated block at end of input is discarded.
        self.buf.clear();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(lines: &[&str]) -> Vec<String> {
        extract_log_messages(lines.iter()).collect()
    }

    #[test]
    fn extracts_block_with_inserted_text_marker() {
        let messages = collect(&[
            "! Undefined control sequence.",
            "<inserted text>",
            "  foo",
            "",
            "ok",
        ]);
        assert_eq!(messages, vec!["Undefined control sequence.\n  foo"]);
    }

    #[test]
    fn ignores_lines_outside_blocks() {
        let messages = collect(&[
            "This is pdfTeX, Version 3.14159265",
            "(./main.tex",
            "! Missing $ inserted.",
            "l.10 x^2",
            "",
            "Output written on main.pdf",
        ]);
        assert_eq!(messages, vec!["Missing $ inserted.\nl.10 x^2"]);
    }

    #[test]
    fn emits_one_message_per_block() {
        let messages = collect(&[
            "! first error.",
            "detail one",
            "",
            "noise",
            "! second error.",
            "",
        ]);
        assert_eq!(messages, vec!["first error.\ndetail one", "second error."]);
    }

    #[test]
    fn later_bang_line_replaces_pending_buffer() {
        let messages = collect(&["! swallowed.", "! kept.", "context", ""]);
        assert_eq!(messages, vec!["kept.\ncontext"]);
    }

    #[test]
    fn unterminated_block_is_discarded() {
        assert_eq!(collect(&["! dangling error", "still buffering"]), Vec::<String>::new());
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        let messages = collect(&["! error.   ", "line two\t", ""]);
        assert_eq!(messages, vec!["error.\nline two"]);
    }

    #[test]
    fn marker_line_is_not_part_of_the_message() {
        let messages = collect(&["! err.", "<inserted text>", "", ""]);
        assert_eq!(messages, vec!["err."]);
    }
}
