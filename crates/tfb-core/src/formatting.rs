//! Formatting utilities (Telegram HTML escaping, entity rendering).

use crate::messaging::types::{EntityKind, TextEntity};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        c => out.push(c),
    }
}

pub fn has_formatting(entities: &[TextEntity]) -> bool {
    entities.iter().any(|e| e.kind.is_formatting())
}

/// Render message text plus its formatting entities as Telegram HTML.
///
/// Entity offsets are UTF-16 code units, as Telegram reports them. Overlapping
/// (non-nested) spans are split so the output stays well-formed.
pub fn render_entities_html(text: &str, entities: &[TextEntity]) -> String {
    let mut spans: Vec<&TextEntity> = entities
        .iter()
        .filter(|e| e.kind.is_formatting() && e.length > 0)
        .collect();
    // Outer spans first when two start at the same offset.
    spans.sort_by(|a, b| a.offset.cmp(&b.offset).then(b.length.cmp(&a.length)));

    let mut out = String::with_capacity(text.len() + spans.len() * 16);
    let mut open: Vec<&TextEntity> = Vec::new();
    let mut next = 0usize;
    let mut pos = 0usize;

    for ch in text.chars() {
        close_ended(&mut out, &mut open, pos);
        while next < spans.len() && spans[next].offset <= pos {
            out.push_str(&open_tag(&spans[next].kind));
            open.push(spans[next]);
            next += 1;
        }
        push_escaped(&mut out, ch);
        pos += ch.len_utf16();
    }
    close_ended(&mut out, &mut open, usize::MAX);

    out
}

fn end_of(e: &TextEntity) -> usize {
    e.offset.saturating_add(e.length)
}

/// Close every open span that ends at or before `pos`. Spans opened after it
/// are closed too and re-opened, keeping tags properly nested.
fn close_ended<'a>(out: &mut String, open: &mut Vec<&'a TextEntity>, pos: usize) {
    let Some(first) = open.iter().position(|e| end_of(e) <= pos) else {
        return;
    };
    let popped: Vec<&TextEntity> = open.drain(first..).collect();
    for e in popped.iter().rev() {
        out.push_str(close_tag(&e.kind));
    }
    for e in popped {
        if end_of(e) > pos {
            out.push_str(&open_tag(&e.kind));
            open.push(e);
        }
    }
}

fn open_tag(kind: &EntityKind) -> String {
    match kind {
        EntityKind::Bold => "<b>".to_string(),
        EntityKind::Italic => "<i>".to_string(),
        EntityKind::Underline => "<u>".to_string(),
        EntityKind::Strikethrough => "<s>".to_string(),
        EntityKind::Spoiler => "<tg-spoiler>".to_string(),
        EntityKind::Code => "<code>".to_string(),
        EntityKind::Pre { language: None } => "<pre>".to_string(),
        EntityKind::Pre {
            language: Some(lang),
        } => format!("<pre><code class=\"language-{}\">", escape_html(lang)),
        EntityKind::TextLink { url } => format!("<a href=\"{}\">", escape_html(url)),
        EntityKind::Plain => String::new(),
    }
}

fn close_tag(kind: &EntityKind) -> &'static str {
    match kind {
        EntityKind::Bold => "</b>",
        EntityKind::Italic => "</i>",
        EntityKind::Underline => "</u>",
        EntityKind::Strikethrough => "</s>",
        EntityKind::Spoiler => "</tg-spoiler>",
        EntityKind::Code => "</code>",
        EntityKind::Pre { language: None } => "</pre>",
        EntityKind::Pre { language: Some(_) } => "</code></pre>",
        EntityKind::TextLink { .. } => "</a>",
        EntityKind::Plain => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ent(kind: EntityKind, offset: usize, length: usize) -> TextEntity {
        TextEntity {
            kind,
            offset,
            length,
        }
    }

    #[test]
    fn escapes_html() {
        assert_eq!(escape_html("<a&b>\""), "&lt;a&amp;b&gt;&quot;");
    }

    #[test]
    fn renders_simple_bold() {
        let html = render_entities_html("Hello bold", &[ent(EntityKind::Bold, 6, 4)]);
        assert_eq!(html, "Hello <b>bold</b>");
    }

    #[test]
    fn offsets_are_utf16() {
        // The emoji is two UTF-16 code units.
        let html = render_entities_html("😀 hi", &[ent(EntityKind::Italic, 3, 2)]);
        assert_eq!(html, "😀 <i>hi</i>");
    }

    #[test]
    fn nested_and_overlapping_spans_stay_well_formed() {
        let nested = render_entities_html(
            "abcdef",
            &[ent(EntityKind::Bold, 0, 6), ent(EntityKind::Italic, 2, 2)],
        );
        assert_eq!(nested, "<b>ab<i>cd</i>ef</b>");

        let overlap = render_entities_html(
            "abcdef",
            &[ent(EntityKind::Bold, 0, 4), ent(EntityKind::Italic, 2, 4)],
        );
        assert_eq!(overlap, "<b>ab<i>cd</i></b><i>ef</i>");
    }

    #[test]
    fn links_code_and_escaping() {
        let html = render_entities_html(
            "see <docs> now",
            &[
                ent(
                    EntityKind::TextLink {
                        url: "https://x.test/?a=1&b=2".to_string(),
                    },
                    0,
                    3,
                ),
                ent(
                    EntityKind::Pre {
                        language: Some("rust".to_string()),
                    },
                    4,
                    6,
                ),
            ],
        );
        assert_eq!(
            html,
            "<a href=\"https://x.test/?a=1&amp;b=2\">see</a> <pre><code class=\"language-rust\">&lt;docs&gt;</code></pre> now"
        );
    }

    #[test]
    fn plain_entities_do_not_count_as_formatting() {
        let mention = [ent(EntityKind::Plain, 0, 5)];
        assert!(!has_formatting(&mention));
        assert_eq!(render_entities_html("@user", &mention), "@user");
        assert!(has_formatting(&[ent(EntityKind::Code, 0, 1)]));
    }
}
