//! Shortcut expansion.
//!
//! A shortcut rule maps a short trigger prefix to a call template, so that a
//! block starting with `@ what is rust?` can become
//! `chat("""what is rust?""")` before it is sent anywhere.

use std::sync::LazyLock;

use regex::Regex;

/// Token replaced by the expanded parameter.
pub const PARAM_PLACEHOLDER: &str = "##param##";

/// Placeholder preceded by the raw-string marker.
pub const RAW_PARAM_PLACEHOLDER: &str = "r##param##";

static RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*->\s*(.+)$").expect("valid rule regex"));

/// A single `trigger -> template` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutRule {
    pub trigger: String,
    pub template: String,
}

/// Ordered rule set, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcutRules {
    rules: Vec<ShortcutRule>,
}

impl ShortcutRules {
    /// Parse rules from user text, one per line.
    ///
    /// Blank lines, lines without `->` and rules with an empty trigger are
    /// ignored.
    pub fn parse(text: &str) -> Self {
        let rules = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| RULE.captures(line))
            .map(|caps| ShortcutRule {
                trigger: caps[1].trim().to_string(),
                template: caps[2].trim().to_string(),
            })
            .filter(|rule| !rule.trigger.is_empty())
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[ShortcutRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the rule whose trigger is the longest prefix of `line`.
    ///
    /// Ties go to the rule declared first.
    pub fn matching(&self, line: &str) -> Option<&ShortcutRule> {
        let line = line.trim_start();
        self.rules
            .iter()
            .filter(|rule| !rule.trigger.is_empty() && line.starts_with(&rule.trigger))
            .fold(None, |best: Option<&ShortcutRule>, rule| match best {
                Some(current) if current.trigger.chars().count() >= rule.trigger.chars().count() => {
                    Some(current)
                }
                _ => Some(rule),
            })
    }

    /// Expand `content` with the best-matching rule.
    ///
    /// Only the first line is tested against triggers. Content that matches
    /// no rule is returned unchanged.
    pub fn expand(&self, content: &str) -> String {
        let mut lines = content.lines();
        let first = lines.next().unwrap_or_default();

        let Some(rule) = self.matching(first) else {
            return content.to_string();
        };

        let head = first.trim_start();
        let mut param = head[rule.trigger.len()..].trim_start().to_string();
        for line in lines {
            param.push('\n');
            param.push_str(line);
        }
        let param = trim_blank_lines(&param);

        tracing::debug!("Expanding shortcut '{}'", rule.trigger);
        substitute(&rule.template, &param)
    }
}

/// Escape every `"""` so the parameter cannot terminate a triple-quoted string.
pub fn escape_triple_quotes(text: &str) -> String {
    text.replace(r#"""""#, r#"\""""#)
}

/// Reverse [`escape_triple_quotes`].
pub fn unescape_triple_quotes(text: &str) -> String {
    text.replace(r#"\""""#, r#"""""#)
}

fn substitute(template: &str, param: &str) -> String {
    let escaped = escape_triple_quotes(param);

    let quoted = template.contains(&format!("\"\"\"{}", PARAM_PLACEHOLDER))
        || template.contains(&format!("'''{}", PARAM_PLACEHOLDER));
    if quoted {
        return template.replace(PARAM_PLACEHOLDER, &escaped);
    }

    if template.contains(RAW_PARAM_PLACEHOLDER) {
        let wrapped = format!("r\"\"\"{}\"\"\"", escaped);
        return template
            .replace(RAW_PARAM_PLACEHOLDER, &wrapped)
            .replace(PARAM_PLACEHOLDER, &wrapped);
    }

    let wrapped = format!("\"\"\"{}\"\"\"", escaped);
    template.replace(PARAM_PLACEHOLDER, &wrapped)
}

/// Drop whitespace-only lines from both ends.
fn trim_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end.max(start)].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        let rules = ShortcutRules::parse(
            "@ -> chat(##param##)\n\nnot a rule\n  ?? ->  ask(##param##)  \n   -> empty\nsh->run(##param##)",
        );
        let triggers: Vec<&str> = rules.rules().iter().map(|r| r.trigger.as_str()).collect();
        assert_eq!(triggers, vec!["@", "??", "sh"]);
        assert_eq!(rules.rules()[1].template, "ask(##param##)");
    }

    #[test]
    fn test_expand_multiline() {
        let rules = ShortcutRules::parse("@ -> chat(##param##)");
        assert_eq!(
            rules.expand("@ hello\nworld"),
            "chat(\"\"\"hello\nworld\"\"\")"
        );
    }

    #[test]
    fn test_no_match_unchanged() {
        let rules = ShortcutRules::parse("@ -> chat(##param##)");
        assert_eq!(rules.expand("x = 1\n@ y"), "x = 1\n@ y");
        assert_eq!(ShortcutRules::default().expand("@ hi"), "@ hi");
    }

    #[test]
    fn test_longest_trigger_wins() {
        let rules = ShortcutRules::parse("@ -> short(##param##)\n@@ -> long(##param##)");
        assert_eq!(rules.expand("@@ x"), "long(\"\"\"x\"\"\")");
        assert_eq!(rules.expand("@ x"), "short(\"\"\"x\"\"\")");
    }

    #[test]
    fn test_tie_first_declared_wins() {
        let rules = ShortcutRules::parse("! -> first(##param##)\n! -> second(##param##)");
        assert_eq!(rules.expand("!go"), "first(\"\"\"go\"\"\")");
    }

    #[test]
    fn test_blank_lines_trimmed() {
        let rules = ShortcutRules::parse("@ -> chat(##param##)");
        assert_eq!(rules.expand("@\n\n  body\n\n"), "chat(\"\"\"  body\"\"\")");
        assert_eq!(rules.expand("@"), "chat(\"\"\"\"\"\")");
    }

    #[test]
    fn test_triple_quotes_escaped() {
        let rules = ShortcutRules::parse("@ -> chat(##param##)");
        let expanded = rules.expand(r#"@ say """hi""""#);
        assert_eq!(expanded, r#"chat("""say \"""hi\"""""")"#);
    }

    #[test]
    fn test_escape_roundtrip() {
        for text in [r#"a """ b"#, r#""""""""#, "plain", r#"x""y"#] {
            assert_eq!(unescape_triple_quotes(&escape_triple_quotes(text)), text);
        }
        assert!(!escape_triple_quotes(r#"a """ b"#).contains(r#" """ "#));
    }

    #[test]
    fn test_template_already_quoted() {
        let rules = ShortcutRules::parse("@ -> chat('''##param##''')\n# -> md(\"\"\"##param##\"\"\")");
        assert_eq!(rules.expand("@ hi"), "chat('''hi''')");
        assert_eq!(rules.expand("# hi"), "md(\"\"\"hi\"\"\")");
    }

    #[test]
    fn test_raw_marker() {
        let rules = ShortcutRules::parse("re -> regex(r##param##)");
        assert_eq!(rules.expand(r"re \d+"), r#"regex(r"""\d+""")"#);
    }

    #[test]
    fn test_every_placeholder_replaced() {
        let rules = ShortcutRules::parse("twice -> f(##param##, ##param##)");
        assert_eq!(rules.expand("twice a"), "f(\"\"\"a\"\"\", \"\"\"a\"\"\")");
    }

    #[test]
    fn test_trigger_matches_after_leading_whitespace() {
        let rules = ShortcutRules::parse("@ -> chat(##param##)");
        assert_eq!(rules.expand("   @ hi"), "chat(\"\"\"hi\"\"\")");
    }
}
