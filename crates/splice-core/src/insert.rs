//! Output insertion.

use crate::editor::{EditorSurface, Position};
use crate::settings::Settings;

/// How returned output is written into a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputStyle {
    /// Prefix written before the output.
    pub prefix: String,
    /// Repeat the prefix on every output line.
    pub multiline: bool,
}

impl OutputStyle {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            prefix: settings.decoration_prefix.clone(),
            multiline: settings.decorate_multiline,
        }
    }
}

/// Result of writing output into a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    /// Where the text was inserted.
    pub at: Position,
    /// Cursor position after the insertion.
    pub cursor: Position,
}

/// Format raw output as the text to insert.
///
/// Carriage returns are dropped and one trailing line break is removed. The
/// result starts with a line break so output lands below the cursor line.
pub fn format_output(raw: &str, style: &OutputStyle) -> String {
    let text = raw.replace('\r', "");
    let text = text.strip_suffix('\n').unwrap_or(&text);
    let body = if style.multiline {
        text.replace('\n', &format!("\n{}", style.prefix))
    } else {
        text.to_string()
    };
    format!("\n{}{}", style.prefix, body)
}

/// Insert formatted output at the cursor and move the cursor to the end of
/// the last inserted line.
///
/// Returns `None` when the output is empty or the cursor position no longer
/// exists in the document.
pub fn insert_output<S>(surface: &mut S, raw: &str, style: &OutputStyle) -> Option<Insertion>
where
    S: EditorSurface + ?Sized,
{
    if raw.is_empty() {
        return None;
    }

    let body = format_output(raw, style);
    let at = surface.cursor();
    if !surface.replace_range(&body, at, at) {
        tracing::debug!("Cursor {:?} is stale, output dropped", at);
        return None;
    }

    let breaks = body.matches('\n').count();
    let last = body.rsplit('\n').next().unwrap_or_default();
    let cursor = if breaks == 0 {
        Position::new(at.line, at.ch + last.chars().count())
    } else {
        Position::new(at.line + breaks, last.chars().count())
    };
    surface.set_cursor(cursor);

    Some(Insertion { at, cursor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::TextBuffer;

    fn quoted() -> OutputStyle {
        OutputStyle {
            prefix: ">>> ".to_string(),
            multiline: true,
        }
    }

    #[test]
    fn test_format_multiline_prefix() {
        assert_eq!(format_output("a\nb\n", &quoted()), "\n>>> a\n>>> b");
    }

    #[test]
    fn test_format_single_prefix() {
        let style = OutputStyle {
            prefix: "> ".to_string(),
            multiline: false,
        };
        assert_eq!(format_output("a\r\nb\r\n", &style), "\n> a\nb");
    }

    #[test]
    fn test_format_strips_only_one_break() {
        assert_eq!(format_output("a\n\n", &OutputStyle::default()), "\na\n");
    }

    #[test]
    fn test_insert_moves_cursor() {
        let mut buf = TextBuffer::new("%%%\nx\n%%%\nafter");
        buf.set_cursor(Position::new(2, 3));

        let insertion = insert_output(&mut buf, "a\nb\n", &quoted()).unwrap();
        assert_eq!(buf.text(), "%%%\nx\n%%%\n>>> a\n>>> b\nafter");
        assert_eq!(insertion.at, Position::new(2, 3));
        assert_eq!(insertion.cursor, Position::new(4, 5));
        assert_eq!(buf.cursor(), Position::new(4, 5));
    }

    #[test]
    fn test_consecutive_chunks_append() {
        let mut buf = TextBuffer::new("%%%\n%%%");
        buf.set_cursor(Position::new(1, 3));

        insert_output(&mut buf, "1\n", &OutputStyle::default()).unwrap();
        insert_output(&mut buf, "2\n", &OutputStyle::default()).unwrap();
        assert_eq!(buf.text(), "%%%\n%%%\n1\n2");
    }

    #[test]
    fn test_empty_and_stale() {
        let mut buf = TextBuffer::new("x");
        assert!(insert_output(&mut buf, "", &quoted()).is_none());

        buf.set_cursor(Position::new(7, 0));
        assert!(insert_output(&mut buf, "out", &quoted()).is_none());
        assert_eq!(buf.text(), "x");
    }
}
