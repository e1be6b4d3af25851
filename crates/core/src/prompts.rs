//! Instruction prompts.
//!
//! The defaults are compiled in from the repository's `prompts/` directory.
//! A directory of `*.md` files can override any of them at startup; the file
//! stem selects the prompt (`system_prompt.md`, `animation.md`, ...).

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Placeholder replaced by the Live2D model name in the animation prompt.
pub const MODEL_PLACEHOLDER: &str = "{model}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    /// Persona used for every chat completion.
    pub system: String,
    /// Animation selection instruction, templated on [`MODEL_PLACEHOLDER`].
    pub animation: String,
    pub photo_intent: String,
    /// Question asked to the vision provider about an uploaded photo.
    pub vision: String,
    /// Reply sent when a client connects.
    pub greeting: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Prompts {
    pub fn builtin() -> Self {
        Self {
            system: include_str!("../../../prompts/system_prompt.md").trim().to_string(),
            animation: include_str!("../../../prompts/animation.md").trim().to_string(),
            photo_intent: include_str!("../../../prompts/photo_intent.md").trim().to_string(),
            vision: include_str!("../../../prompts/vision.md").trim().to_string(),
            greeting: include_str!("../../../prompts/greeting.md").trim().to_string(),
        }
    }

    /// Loads overrides from `dir` on top of the built-in prompts.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut overrides = read_prompt_files(dir)
            .with_context(|| format!("Failed to read prompts from {}", dir.display()))?;
        let mut prompts = Self::builtin();

        for (key, slot) in [
            ("system_prompt", &mut prompts.system),
            ("animation", &mut prompts.animation),
            ("photo_intent", &mut prompts.photo_intent),
            ("vision", &mut prompts.vision),
            ("greeting", &mut prompts.greeting),
        ] {
            if let Some(content) = overrides.remove(key) {
                debug!(prompt = key, "Using prompt override");
                *slot = content.trim().to_string();
            }
        }
        for key in overrides.keys() {
            warn!(prompt = %key, "Ignoring unrecognised prompt file");
        }
        Ok(prompts)
    }

    /// The animation instruction for one Live2D model.
    pub fn animation_for(&self, model: &str) -> String {
        self.animation.replace(MODEL_PLACEHOLDER, model)
    }
}

fn read_prompt_files(dir: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            prompts.insert(key, fs::read_to_string(&path)?);
        }
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_prompts_are_present() {
        let prompts = Prompts::builtin();
        assert!(prompts.system.contains("Xiaofan"));
        assert!(prompts.animation.contains(MODEL_PLACEHOLDER));
        assert!(!prompts.photo_intent.is_empty());
        assert!(!prompts.vision.is_empty());
        assert!(!prompts.greeting.is_empty());
    }

    #[test]
    fn animation_prompt_names_the_model() {
        let prompt = Prompts::builtin().animation_for("Mao");
        assert!(prompt.contains("The current Live2D model is Mao."));
        assert!(!prompt.contains(MODEL_PLACEHOLDER));
    }

    #[test]
    fn directory_overrides_single_prompts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("system_prompt.md"), "  Be brief.\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let prompts = Prompts::load(dir.path()).unwrap();
        assert_eq!(prompts.system, "Be brief.");
        assert_eq!(prompts.vision, Prompts::builtin().vision);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Prompts::load(&dir.path().join("absent")).is_err());
    }
}
