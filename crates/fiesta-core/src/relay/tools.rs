//! Canned responses for assistant function calls.
//!
//! The assistant may ask for a declared function to be called. Functions
//! are not executed; each name maps to a fixed prompt string that is
//! handed back to the assistant as the function's output.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::assistant::AssistantError;

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    prompts: HashMap<String, String>,
}

impl ToolRegistry {
    /// Load a JSON object of `function name -> prompt` from `path`.
    ///
    /// A missing file yields an empty registry. A file that is not a JSON
    /// object of strings is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "function prompts file not found; no functions available");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read function prompts {}", path.display()));
            }
        };

        let prompts: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid function prompts JSON in {}", path.display()))?;

        info!(count = prompts.len(), "loaded function prompts");
        Ok(Self { prompts })
    }

    pub fn from_map(prompts: HashMap<String, String>) -> Self {
        Self { prompts }
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// The canned output for `name`. Arguments are only logged.
    pub fn call(&self, name: &str, arguments: &serde_json::Value) -> Result<String, AssistantError> {
        let prompt = self
            .prompts
            .get(name)
            .ok_or_else(|| AssistantError::UnknownFunction(name.to_owned()))?;
        info!(function = name, %arguments, "function called");
        Ok(prompt.clone())
    }
}
