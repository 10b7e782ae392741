//! Inbound frame cleanup.
//!
//! Tag stripping here is cosmetic. It removes anything that looks like `<...>` (and an
//! unterminated `<...` at the end of a frame) so markup from the assistant does not show
//! up raw in the transcript. It is not an HTML sanitizer and gives no security guarantee.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Marker the server puts in its greeting frame. The client shows its own ready notice,
/// so frames carrying this text are not displayed again.
pub const READY_SENTINEL: &str = "PDFs loaded successfully";

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>?").expect("tag pattern is a valid regex"));

/// What the client should do with one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundText {
    /// Server greeting duplicating the local ready notice.
    Greeting,
    Display(String),
}

pub fn strip_tags(raw: &str) -> Cow<'_, str> {
    TAG_PATTERN.replace_all(raw, "")
}

pub fn is_ready_greeting(raw: &str) -> bool {
    raw.contains(READY_SENTINEL)
}

pub fn classify_inbound(raw: &str) -> InboundText {
    if is_ready_greeting(raw) {
        return InboundText::Greeting;
    }
    InboundText::Display(strip_tags(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_markup() {
        assert_eq!(strip_tags("<b>hi</b> there"), "hi there");
        assert_eq!(strip_tags("<p class=\"x\">para</p>"), "para");
    }

    #[test]
    fn plain_text_is_borrowed_unchanged() {
        let stripped = strip_tags("no markup here");
        assert!(matches!(stripped, Cow::Borrowed(_)));
        assert_eq!(stripped, "no markup here");
    }

    #[test]
    fn unterminated_bracket_swallows_the_rest() {
        assert_eq!(strip_tags("a < b"), "a ");
        assert_eq!(strip_tags("1 < 2 > 0"), "1  0");
    }

    #[test]
    fn tags_spanning_lines_are_removed() {
        assert_eq!(strip_tags("x<span\nid=1>y"), "xy");
    }

    #[test]
    fn sentinel_frames_are_greetings() {
        assert_eq!(
            classify_inbound("PDFs loaded successfully! You can now ask questions."),
            InboundText::Greeting
        );
        assert_eq!(
            classify_inbound("[server] PDFs loaded successfully"),
            InboundText::Greeting
        );
        assert_eq!(
            classify_inbound("<i>answer</i>"),
            InboundText::Display("answer".to_string())
        );
    }
}
