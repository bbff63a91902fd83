//! Reverses the double encoding applied to document text on the wire.
//!
//! The server mangles text with the JS idiom `unescape(encodeURIComponent(x))`
//! before transmission. Undoing it means re-expanding every character outside
//! the URL-safe set into a percent escape (`%XX` below U+0100, `%uXXXX`
//! above) and percent-decoding the result as UTF-8. `%uXXXX` sequences are
//! not valid percent escapes and survive the decode verbatim.

use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MangleError {
    #[error("unmangled text is not valid UTF-8")]
    InvalidUtf8,
}

/// Recovers original document text from its mangled wire form.
pub fn unmangle(mangled: &str) -> Result<String, MangleError> {
    let mut escaped = String::with_capacity(mangled.len());
    for ch in mangled.chars() {
        if is_safe(ch) {
            escaped.push(ch);
        } else {
            let code = ch as u32;
            if code < 0x100 {
                escaped.push_str(&format!("%{code:02X}"));
            } else {
                escaped.push_str(&format!("%u{code:04X}"));
            }
        }
    }
    percent_decode_str(&escaped)
        .decode_utf8()
        .map(|text| text.into_owned())
        .map_err(|_| MangleError::InvalidUtf8)
}

fn is_safe(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '@' | '*' | '_' | '+' | '-' | '.' | '/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_characters_pass_through() {
        let text = "path/to_file-v2.tex+@*";
        assert_eq!(unmangle(text).expect("unmangle"), text);
    }

    #[test]
    fn ascii_punctuation_and_whitespace_survive() {
        assert_eq!(
            unmangle("\\section{Intro} % note\n\ttext").expect("unmangle"),
            "\\section{Intro} % note\n\ttext"
        );
    }

    #[test]
    fn percent_sign_reencodes_cleanly() {
        assert_eq!(unmangle("100%").expect("unmangle"), "100%");
        assert_eq!(unmangle("a%20b").expect("unmangle"), "a%20b");
    }

    #[test]
    fn wide_characters_become_literal_u_escapes() {
        // U+20AC is outside the one-byte escape range and not alphanumeric;
        // standard percent-decoding leaves the %u form untouched.
        assert_eq!(unmangle("cost: \u{20AC}").expect("unmangle"), "cost: %u20AC");
    }

    #[test]
    fn unicode_letters_stay_as_written() {
        assert_eq!(unmangle("na\u{EF}ve").expect("unmangle"), "na\u{EF}ve");
    }

    #[test]
    fn stray_high_byte_is_a_content_error() {
        // U+00A9 escapes to %A9, which no UTF-8 sequence can absorb alone.
        assert_eq!(unmangle("\u{A9}"), Err(MangleError::InvalidUtf8));
    }
}
