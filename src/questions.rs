//! Static question data, loaded once at startup and read-only thereafter.

use crate::types::Question;
use std::path::Path;

/// Environment variable pointing at an alternative question file
pub const QUESTIONS_PATH_ENV: &str = "QUIZZOS_QUESTIONS";

const BUNDLED_QUESTIONS: &str = include_str!("../data/questions.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read question file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse question data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("question catalog is empty")]
    Empty,
}

/// Ordered, immutable sequence of questions. Pages are 1-based.
#[derive(Debug, Clone)]
pub struct Catalog {
    questions: Vec<Question>,
}

impl Catalog {
    pub fn new(questions: Vec<Question>) -> Result<Self, CatalogError> {
        if questions.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { questions })
    }

    /// The question set compiled into the binary.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::new(serde_json::from_str(BUNDLED_QUESTIONS)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(serde_json::from_str(&raw)?)
    }

    /// Load from the path in `QUIZZOS_QUESTIONS`, falling back to the
    /// bundled set when the variable is unset.
    pub fn from_env() -> Result<Self, CatalogError> {
        match std::env::var(QUESTIONS_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                tracing::info!("Loading questions from {}", path);
                Self::load(path.trim())
            }
            _ => Self::bundled(),
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Fetch a question by 1-based page index.
    pub fn page(&self, page: usize) -> Option<&Question> {
        if page == 0 {
            return None;
        }
        self.questions.get(page - 1)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}
