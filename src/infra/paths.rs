// src/infra/paths.rs — Config and prompt directory resolution
//
// PROMPT_DOCTOR_HOME overrides the config location for isolation.
// The prompts directory is project-local by default (`./prompts`), since
// templates usually live next to the code that renders them.

use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// Default prompts directory, relative to the working directory.
pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

fn prompt_doctor_home() -> Option<PathBuf> {
    std::env::var_os("PROMPT_DOCTOR_HOME").map(PathBuf::from)
}

/// Configuration directory: $PROMPT_DOCTOR_HOME/ or ~/.prompt-doctor/
pub fn config_dir() -> PathBuf {
    if let Some(home) = prompt_doctor_home() {
        return home;
    }
    dirs_home().join(".prompt-doctor")
}

/// Home directory, falling back to the working directory when unknown.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Directory holding all versions of one template.
pub fn template_dir(root: &Path, template_id: &str) -> PathBuf {
    root.join(template_id)
}

/// File holding one version of a template: `<root>/<id>/<version>.txt`.
pub fn version_file(root: &Path, template_id: &str, version: u32) -> PathBuf {
    template_dir(root, template_id).join(format!("{version}.txt"))
}

/// Parse a version number out of a `<n>.txt` file name.
pub fn parse_version_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".txt")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Only canonical names: "01.txt" would alias version 1.
    stem.parse::<u32>()
        .ok()
        .filter(|v| *v > 0 && v.to_string() == stem)
}
