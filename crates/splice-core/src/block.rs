//! Executable block location.
//!
//! A block is the run of lines between two delimiter lines:
//!
//! ```text
//! %%%            <- start_line
//! x = 1          <- content
//! x + 1          <- content
//! %%%            <- end_line
//! ```
//!
//! Delimiter lines may carry trailing decoration (`%%% python`). Delimiters
//! are paired in document order: the 1st with the 2nd, the 2nd with the 3rd,
//! and so on, and the first pair whose range contains the cursor wins.

/// A located block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Lines strictly between the delimiters, joined with `\n`.
    pub content: String,
    /// Line index of the opening delimiter.
    pub start_line: usize,
    /// Line index of the closing delimiter.
    pub end_line: usize,
}

/// Finds blocks bounded by a delimiter marker.
#[derive(Debug, Clone)]
pub struct BlockLocator {
    delimiter: String,
}

impl BlockLocator {
    /// Create a locator. The delimiter is trimmed before any comparison.
    pub fn new(delimiter: &str) -> Self {
        Self {
            delimiter: delimiter.trim().to_string(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Whether `line` opens or closes a block (decoration allowed).
    pub fn is_delimiter(&self, line: &str) -> bool {
        !self.delimiter.is_empty() && line.trim().starts_with(&self.delimiter)
    }

    /// Whether `line` is exactly the delimiter (ignoring surrounding whitespace).
    pub fn is_bare_delimiter(&self, line: &str) -> bool {
        !self.delimiter.is_empty() && line.trim() == self.delimiter
    }

    /// Indices of all delimiter lines, in document order.
    pub fn delimiter_lines<S: AsRef<str>>(&self, lines: &[S]) -> Vec<usize> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| self.is_delimiter(line.as_ref()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Locate the block around `cursor_line`.
    ///
    /// Returns `None` when the document has fewer than two delimiter lines or
    /// the cursor lies outside every delimiter pair.
    pub fn locate<S: AsRef<str>>(&self, lines: &[S], cursor_line: usize) -> Option<Block> {
        let delimiters = self.delimiter_lines(lines);
        if delimiters.len() < 2 {
            return None;
        }

        delimiters
            .windows(2)
            .find(|pair| (pair[0]..=pair[1]).contains(&cursor_line))
            .map(|pair| Block {
                content: join_lines(&lines[pair[0] + 1..pair[1]]),
                start_line: pair[0],
                end_line: pair[1],
            })
    }

    /// Enter-mode check for the line just inserted at `line`.
    ///
    /// When the line above is a bare delimiter preceded by an odd number of
    /// bare delimiters, it closes a block; the block from the nearest earlier
    /// delimiter is returned. An even count means it opens one, and `None` is
    /// returned.
    pub fn closed_above<S: AsRef<str>>(&self, lines: &[S], line: usize) -> Option<Block> {
        let above = line.checked_sub(1)?;
        if !self.is_bare_delimiter(lines.get(above)?.as_ref()) {
            return None;
        }

        let earlier = &lines[..above];
        let count = earlier
            .iter()
            .filter(|l| self.is_bare_delimiter(l.as_ref()))
            .count();
        if count % 2 == 0 {
            return None;
        }

        let open = earlier
            .iter()
            .rposition(|l| self.is_bare_delimiter(l.as_ref()))?;
        Some(Block {
            content: join_lines(&lines[open + 1..above]),
            start_line: open,
            end_line: above,
        })
    }

    /// Strip delimiter lines and stray markers from a user selection.
    ///
    /// Leading and trailing delimiter lines (bare, or followed by whitespace
    /// and decoration) are removed, then a marker left glued to the very start
    /// or end of the remaining text.
    pub fn strip_selection(&self, text: &str) -> String {
        let is_marker_line = |line: &str| {
            !self.delimiter.is_empty()
                && line
                    .trim()
                    .strip_prefix(self.delimiter.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        };

        let mut lines: Vec<&str> = text.lines().collect();
        while lines.first().is_some_and(|l| is_marker_line(l)) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| is_marker_line(l)) {
            lines.pop();
        }

        let joined = lines.join("\n");
        let mut body = joined.trim();
        if !self.delimiter.is_empty() {
            body = body.strip_prefix(self.delimiter.as_str()).unwrap_or(body);
            body = body.strip_suffix(self.delimiter.as_str()).unwrap_or(body);
        }
        body.trim().to_string()
    }
}

fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Vec<&str> {
        text.split('\n').collect()
    }

    #[test]
    fn test_simple_block() {
        let locator = BlockLocator::new("%%%");
        let block = locator.locate(&["%%%", "x=1", "%%%"], 1).unwrap();
        assert_eq!(
            block,
            Block {
                content: "x=1".to_string(),
                start_line: 0,
                end_line: 2,
            }
        );
    }

    #[test]
    fn test_cursor_on_delimiters() {
        let locator = BlockLocator::new(" %%% ");
        let lines = ["%%%", "a", "%%%"];
        assert_eq!(locator.locate(&lines, 0).unwrap().content, "a");
        assert_eq!(locator.locate(&lines, 2).unwrap().content, "a");
    }

    #[test]
    fn test_nth_pair() {
        let locator = BlockLocator::new("%%%");
        let lines = doc("intro\n%%%\na\n%%%\nprose\n%%% py\nb\nc\n%%%\nend");

        let second = locator.locate(&lines, 7).unwrap();
        assert_eq!(second.content, "b\nc");
        assert_eq!((second.start_line, second.end_line), (5, 8));

        // Between blocks the (2nd, 3rd) delimiter pair also qualifies.
        let between = locator.locate(&lines, 4).unwrap();
        assert_eq!((between.start_line, between.end_line), (3, 5));
    }

    #[test]
    fn test_outside_any_block() {
        let locator = BlockLocator::new("%%%");
        let lines = doc("intro\n%%%\na\n%%%\nend");
        assert!(locator.locate(&lines, 0).is_none());
        assert!(locator.locate(&lines, 4).is_none());
        assert!(locator.locate(&lines, 99).is_none());
    }

    #[test]
    fn test_fewer_than_two_delimiters() {
        let locator = BlockLocator::new("%%%");
        for cursor in 0..4 {
            assert!(locator.locate(&doc("a\n%%%\nb\nc"), cursor).is_none());
            assert!(locator.locate(&doc("a\nb\nc\nd"), cursor).is_none());
        }
    }

    #[test]
    fn test_empty_delimiter_never_matches() {
        let locator = BlockLocator::new("  ");
        assert!(locator.locate(&["", "x", ""], 1).is_none());
    }

    #[test]
    fn test_locate_is_idempotent() {
        let locator = BlockLocator::new("%%%");
        let lines = doc("%%%\na\nb\n%%%");
        assert_eq!(locator.locate(&lines, 2), locator.locate(&lines, 2));
    }

    #[test]
    fn test_empty_block() {
        let locator = BlockLocator::new("%%%");
        let block = locator.locate(&["%%%", "%%%"], 0).unwrap();
        assert_eq!(block.content, "");
    }

    #[test]
    fn test_closed_above_odd_count() {
        let locator = BlockLocator::new("%%%");
        let lines = doc("%%%\nx = 1\ny = 2\n%%%\n");
        let block = locator.closed_above(&lines, 4).unwrap();
        assert_eq!(block.content, "x = 1\ny = 2");
        assert_eq!((block.start_line, block.end_line), (0, 3));
    }

    #[test]
    fn test_closed_above_even_count_opens() {
        let locator = BlockLocator::new("%%%");
        let lines = doc("%%%\na\n%%%\ntext\n%%%\n");
        assert!(locator.closed_above(&lines, 5).is_none());
        assert!(locator.closed_above(&lines, 1).is_none());
    }

    #[test]
    fn test_closed_above_requires_delimiter() {
        let locator = BlockLocator::new("%%%");
        let lines = doc("%%%\na\nb\n");
        assert!(locator.closed_above(&lines, 3).is_none());
        assert!(locator.closed_above(&lines, 0).is_none());
        assert!(locator.closed_above(&lines, 42).is_none());
    }

    #[test]
    fn test_strip_selection() {
        let locator = BlockLocator::new("%%%");
        assert_eq!(locator.strip_selection("%%%\nx = 1\n%%% out"), "x = 1");
        assert_eq!(locator.strip_selection("%%%x + 1%%%"), "x + 1");
        assert_eq!(locator.strip_selection("  2 * 3  "), "2 * 3");
        assert_eq!(locator.strip_selection("%%%\n%%%"), "");
    }
}
