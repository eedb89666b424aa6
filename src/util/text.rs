use std::borrow::Cow;

/// Whether `c` is a control character that must not reach stored text.
///
/// Tab, newline and carriage return are kept: post bodies rely on them.
fn is_stripped(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Strip control characters from feed-provided text.
///
/// Removes C0/C1 control characters and DEL, keeping tab, newline and
/// carriage return. A bare ESC also swallows the ANSI CSI sequence (`ESC [`
/// parameters, final byte) that follows it, so colour codes pasted into feed
/// titles do not leave `[31m` behind.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            // Parameter and intermediate bytes run until the final byte @..~
            for next in chars.by_ref() {
                if ('@'..='~').contains(&next) {
                    break;
                }
            }
        } else if !is_stripped(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_borrowed() {
        let input = "Go 1.22 released: what's new";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_whitespace_controls_preserved() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_controls_removed() {
        assert_eq!(strip_control_chars("a\u{0}b\u{7}c\u{7f}d"), "abcd");
    }

    #[test]
    fn test_c1_controls_removed() {
        assert_eq!(strip_control_chars("x\u{85}y\u{9b}z"), "xyz");
    }

    #[test]
    fn test_ansi_sequences_removed() {
        assert_eq!(strip_control_chars("\u{1b}[31mRed\u{1b}[0m title"), "Red title");
    }

    #[test]
    fn test_bare_escape_removed() {
        assert_eq!(strip_control_chars("a\u{1b}b"), "ab");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(strip_control_chars("Gopher 日本語\u{1}"), "Gopher 日本語");
    }
}
