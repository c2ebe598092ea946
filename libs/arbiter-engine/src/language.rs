//! Language Adapter
//!
//! Maps a logical language id ("cpp", "java", "javascript") to the execution
//! backend's runtime id and to the problem's starter-code slot. The registry
//! comes from `config/languages.json`; which languages a problem accepts comes
//! from the problem's own templates.

use std::path::Path;

use arbiter_common::Problem;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One configured language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    /// Logical id used by callers, lowercase
    pub id: String,
    /// Name used by problem templates ("C++")
    pub display_name: String,
    /// Execution backend's language/runtime id
    pub runtime_id: u32,
}

/// Result of resolving a language against a problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLanguage {
    pub language: String,
    pub runtime_id: u32,
    pub source_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageRegistry {
    pub languages: Vec<LanguageSpec>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LanguageRegistry {
    /// Judge0 CE ids for GCC 9, OpenJDK 13 and Node 12
    pub fn builtin() -> Self {
        let spec = |id: &str, display_name: &str, runtime_id| LanguageSpec {
            id: id.to_string(),
            display_name: display_name.to_string(),
            runtime_id,
        };
        Self {
            languages: vec![
                spec("cpp", "C++", 54),
                spec("java", "Java", 62),
                spec("javascript", "JavaScript", 63),
            ],
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Case-insensitive lookup; surrounding whitespace is ignored
    pub fn get(&self, language: &str) -> Option<&LanguageSpec> {
        let wanted = language.trim();
        self.languages
            .iter()
            .find(|l| l.id.eq_ignore_ascii_case(wanted))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.languages.iter().map(|l| l.id.as_str()).collect()
    }

    /// Resolve `language` for `problem`
    ///
    /// Fails with `UnsupportedLanguage` when the language is unknown to the
    /// registry or the problem carries no template for it.
    pub fn resolve(&self, language: &str, problem: &Problem) -> Result<ResolvedLanguage, EngineError> {
        let unsupported = || EngineError::UnsupportedLanguage {
            language: language.trim().to_string(),
        };

        let spec = self.get(language).ok_or_else(unsupported)?;
        let template = problem
            .template_for(&spec.display_name)
            .ok_or_else(unsupported)?;

        Ok(ResolvedLanguage {
            language: spec.id.clone(),
            runtime_id: spec.runtime_id,
            source_template: template.initial_code.clone(),
        })
    }
}
