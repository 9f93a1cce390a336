//! Metadata header extraction.
//!
//! Only a restricted `key: value` subset of a YAML header is understood;
//! anything else inside the header is skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker line opening and closing the header.
pub const HEADER_MARKER: &str = "---";

static ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][\w-]*)\s*:\s*(.*)$").expect("valid entry regex"));

/// A coerced header value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontmatterValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for FrontmatterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontmatterValue::Bool(b) => write!(f, "{}", b),
            FrontmatterValue::Number(n) => write!(f, "{}", n),
            FrontmatterValue::String(s) => f.write_str(s),
        }
    }
}

/// Parsed header entries, ordered by key.
pub type Frontmatter = BTreeMap<String, FrontmatterValue>;

/// Extract the metadata header from the start of a document.
///
/// Returns an empty mapping when the document has no closed header.
pub fn extract(text: &str) -> Frontmatter {
    let mut entries = Frontmatter::new();
    let lines: Vec<&str> = text.lines().collect();

    if lines.first().map(|line| line.trim_end()) != Some(HEADER_MARKER) {
        return entries;
    }
    let Some(len) = lines[1..]
        .iter()
        .position(|line| line.trim_end() == HEADER_MARKER)
    else {
        return entries;
    };

    for line in &lines[1..1 + len] {
        if let Some(caps) = ENTRY.captures(line.trim()) {
            entries.insert(caps[1].to_string(), coerce(caps[2].trim()));
        }
    }
    entries
}

/// Coerce a raw value: quoted string, boolean, finite number, raw string.
fn coerce(raw: &str) -> FrontmatterValue {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return FrontmatterValue::String(raw[1..raw.len() - 1].to_string());
        }
    }

    match raw {
        "true" => return FrontmatterValue::Bool(true),
        "false" => return FrontmatterValue::Bool(false),
        _ => {}
    }

    if !raw.is_empty()
        && let Ok(number) = raw.parse::<f64>()
        && number.is_finite()
    {
        return FrontmatterValue::Number(number);
    }

    FrontmatterValue::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_values() {
        let doc = "---\ntitle: \"My: note\"\nalias: 'x'\ndraft: true\nweight: 2.5\ncount: -3\nplain: hello world\n---\nbody";
        let fm = extract(doc);

        assert_eq!(fm.len(), 6);
        assert_eq!(fm["title"], FrontmatterValue::String("My: note".to_string()));
        assert_eq!(fm["alias"], FrontmatterValue::String("x".to_string()));
        assert_eq!(fm["draft"], FrontmatterValue::Bool(true));
        assert_eq!(fm["weight"], FrontmatterValue::Number(2.5));
        assert_eq!(fm["count"], FrontmatterValue::Number(-3.0));
        assert_eq!(fm["plain"], FrontmatterValue::String("hello world".to_string()));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let doc = "---\nok: 1\n- list item\n: novalue\n  indented: yes\n---\n";
        let fm = extract(doc);

        assert_eq!(fm.len(), 2);
        assert_eq!(fm["ok"], FrontmatterValue::Number(1.0));
        assert_eq!(fm["indented"], FrontmatterValue::String("yes".to_string()));
    }

    #[test]
    fn test_no_header() {
        assert!(extract("title: x\n---\n").is_empty());
        assert!(extract("").is_empty());
        assert!(extract("\n---\na: 1\n---").is_empty());
    }

    #[test]
    fn test_unclosed_header() {
        assert!(extract("---\na: 1\nb: 2\n").is_empty());
    }

    #[test]
    fn test_edge_values() {
        let fm = extract("---\nempty:\nnan: NaN\ninf: inf\nquote: \"\nTrue: True\n---");
        assert_eq!(fm["empty"], FrontmatterValue::String(String::new()));
        assert_eq!(fm["nan"], FrontmatterValue::String("NaN".to_string()));
        assert_eq!(fm["inf"], FrontmatterValue::String("inf".to_string()));
        assert_eq!(fm["quote"], FrontmatterValue::String("\"".to_string()));
        assert_eq!(fm["True"], FrontmatterValue::String("True".to_string()));
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let fm = extract("---\na: 1\nb: yes\nc: false\n---");
        let json = serde_json::to_string(&fm).unwrap();
        assert_eq!(json, r#"{"a":1.0,"b":"yes","c":false}"#);
    }

    #[test]
    fn test_display() {
        let fm = extract("---\nn: 2\nx: 2.5\nb: false\ns: \"q\"\n---");
        let shown: Vec<String> = fm.values().map(|v| v.to_string()).collect();
        assert_eq!(shown, vec!["false", "2", "q", "2.5"]);
    }
}
