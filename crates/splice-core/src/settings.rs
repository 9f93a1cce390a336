//! User settings.
//!
//! Settings are persisted as a JSON blob with camelCase keys. A pipeline
//! invocation always works on an immutable snapshot (`Arc<Settings>`), so
//! edits made while output is still arriving never leak into a running
//! execution.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::shortcut::ShortcutRules;

/// Placeholder in shell path, arguments and environment that resolves to the
/// installation directory.
pub const PLUGIN_DIR_PLACEHOLDER: &str = "##plugin##";

/// Process-wide user settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Interpreter executable (name resolved through `PATH`, or a path).
    pub shell_path: String,
    /// Interpreter arguments, split like a POSIX shell command line.
    pub shell_args: String,
    /// Text sent to a session right after it starts.
    pub startup_command: String,
    /// Text sent to a session right before it is terminated.
    pub teardown_command: String,
    /// Extra environment, one `KEY=VALUE` per line.
    pub environment: String,
    /// Pattern stripped from every line of interpreter output.
    pub output_pattern: String,
    /// Shortcut rules, one `trigger -> template` per line.
    pub shortcuts: String,
    /// Marker line bounding executable blocks.
    pub delimiter: String,
    /// Prefix written in front of inserted output.
    pub decoration_prefix: String,
    /// Prefix every output line, not only the first one.
    pub decorate_multiline: bool,
    /// Show output as a notice instead of inserting it.
    pub notice_output: bool,
    /// Number of output chunks discarded after a session starts.
    pub suppressed_lines: usize,
    /// Run one session per document instead of one shared session.
    pub separate_sessions: bool,
    /// Send JSON envelopes instead of plain command text.
    pub structured_protocol: bool,
    /// Route commands to an external interpreter instead of evaluating in-process.
    pub advanced_mode: bool,
    /// Run a block when Enter is pressed after its closing delimiter.
    pub execute_on_enter: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell_path: "python3".to_string(),
            shell_args: format!("-u {}/py_manager.py", PLUGIN_DIR_PLACEHOLDER),
            startup_command: String::new(),
            teardown_command: String::new(),
            environment: String::new(),
            output_pattern: r"^(>>> |\.\.\. )+".to_string(),
            shortcuts: "@ -> chat(##param##)\n".to_string(),
            delimiter: "%%%".to_string(),
            decoration_prefix: String::new(),
            decorate_multiline: false,
            notice_output: false,
            suppressed_lines: 0,
            separate_sessions: false,
            structured_protocol: true,
            advanced_mode: false,
            execute_on_enter: true,
        }
    }
}

impl Settings {
    /// Default location of the settings blob (`<config dir>/splice/settings.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("splice").join("settings.json"))
    }

    /// Load settings from a JSON file.
    ///
    /// A missing file yields the defaults; unknown keys are ignored and
    /// missing keys take their default value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|e| Error::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| Error::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write settings to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|e| Error::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parsed shortcut rules.
    pub fn shortcut_rules(&self) -> ShortcutRules {
        ShortcutRules::parse(&self.shortcuts)
    }

    /// Interpreter arguments split into words with shell quoting rules.
    pub fn args(&self) -> Result<Vec<String>> {
        Ok(shell_words::split(&self.shell_args)?)
    }

    /// Interpreter environment parsed from `KEY=VALUE` lines.
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        parse_env(&self.environment)
    }

    /// Compiled output-cleaning pattern, `None` when the pattern is blank.
    pub fn cleanup_pattern(&self) -> Result<Option<Regex>> {
        if self.output_pattern.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Regex::new(&self.output_pattern)?))
    }
}

/// Parse `KEY=VALUE` lines. Blank lines, `#` comments and lines without `=`
/// are skipped.
pub fn parse_env(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_with_quotes() {
        let args = |text: &str| {
            Settings {
                shell_args: text.to_string(),
                ..Settings::default()
            }
            .args()
        };

        assert_eq!(args("-u  main.py").unwrap(), vec!["-u", "main.py"]);
        assert_eq!(
            args(r#"-c "print('a b')" 'x y'"#).unwrap(),
            vec!["-c", "print('a b')", "x y"]
        );
        assert_eq!(
            args(r#"-c echo\ hi "a\"b""#).unwrap(),
            vec!["-c", "echo hi", "a\"b"]
        );
        assert_eq!(args(r#"--name="" end"#).unwrap(), vec!["--name=", "end"]);
        assert!(args("   ").unwrap().is_empty());
        assert!(matches!(args(r#"-c "open"#), Err(Error::Arguments(_))));
    }

    #[test]
    fn test_parse_env() {
        let env = parse_env("A=1\n# comment\n\nB = two words\nbroken\n=nokey");
        assert_eq!(env.len(), 2);
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "two words");
    }

    #[test]
    fn test_cleanup_pattern() {
        let mut settings = Settings::default();
        assert!(settings.cleanup_pattern().unwrap().is_some());

        settings.output_pattern = "  ".to_string();
        assert!(settings.cleanup_pattern().unwrap().is_none());

        settings.output_pattern = "(".to_string();
        assert!(matches!(settings.cleanup_pattern(), Err(Error::Pattern(_))));
    }

    #[test]
    fn test_load_missing_and_partial() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("settings.json");

        assert_eq!(Settings::load(&path).unwrap(), Settings::default());

        fs::write(&path, r#"{"delimiter": "```", "separateSessions": true}"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.delimiter, "```");
        assert!(settings.separate_sessions);
        assert_eq!(settings.shell_path, "python3");
    }

    #[test]
    fn test_save_then_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("settings.json");

        let settings = Settings {
            advanced_mode: true,
            suppressed_lines: 2,
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"advancedMode\": true"));
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_invalid_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(Error::Settings { .. })));
    }
}
