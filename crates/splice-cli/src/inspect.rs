//! Read-only commands: locate, expand, frontmatter and settings.

use std::fs;
use std::path::Path;

use splice_core::{BlockLocator, Settings, frontmatter};

use crate::colors;

/// Load settings from `path`, falling back to the defaults.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Ok(Settings::load(path)?),
        None => Ok(Settings::default()),
    }
}

/// Print the block around `line` (0-based).
pub fn locate(file: &Path, settings_path: Option<&Path>, line: usize) -> anyhow::Result<()> {
    let settings = load_settings(settings_path)?;
    let text = fs::read_to_string(file)?;
    let lines: Vec<&str> = text.split('\n').collect();

    let locator = BlockLocator::new(&settings.delimiter);
    let Some(block) = locator.locate(&lines, line) else {
        anyhow::bail!("No code block found at line {}", line + 1);
    };

    println!(
        "{}Block{} lines {}-{}",
        colors::BOLD,
        colors::RESET,
        block.start_line + 1,
        block.end_line + 1
    );
    println!("{}", block.content);
    Ok(())
}

/// Print `content` with shortcuts expanded.
pub fn expand(content: &str, settings_path: Option<&Path>) -> anyhow::Result<()> {
    let settings = load_settings(settings_path)?;
    println!("{}", settings.shortcut_rules().expand(content));
    Ok(())
}

/// Print the frontmatter of `file` as JSON.
pub fn frontmatter(file: &Path) -> anyhow::Result<()> {
    let text = fs::read_to_string(file)?;
    let entries = frontmatter::extract(&text);
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

/// Print the settings, their location, or create the settings file.
pub fn settings(path: Option<&Path>, show_path: bool, init: bool) -> anyhow::Result<()> {
    if show_path {
        match path {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("No configuration directory on this platform"),
        }
        return Ok(());
    }

    let settings = load_settings(path)?;
    if init {
        let Some(path) = path else {
            anyhow::bail!("No configuration directory on this platform");
        };
        if path.exists() {
            println!(
                "{}Settings already exist:{} {}",
                colors::YELLOW,
                colors::RESET,
                path.display()
            );
        } else {
            settings.save(path)?;
            println!(
                "{}Wrote default settings:{} {}",
                colors::GREEN,
                colors::RESET,
                path.display()
            );
        }
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
