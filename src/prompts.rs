//! Prompt pools cycled across concurrent request slots.

use std::path::Path;
use std::sync::Arc;

use crate::error::{BenchError, Result};

/// Essay-style prompts that produce long answers.
pub const LONG_FORM_PROMPTS: [&str; 10] = [
    "Explain how the process of photosynthesis works and why it is essential for life on Earth.",
    "What are the main causes and consequences of climate change in the 21st century?",
    "Describe the architecture and training process of a modern large language model (LLM) like GPT-4.",
    "Discuss the impact of social media on mental health, particularly among teenagers.",
    "Compare and contrast capitalism and socialism as economic systems, including their pros and cons.",
    "What were the key events and outcomes of the Cold War, and how did it shape the modern world?",
    "How does the human brain process language, and what are some major theories in neurolinguistics?",
    "What is quantum computing, and how does it differ from classical computing in terms of principles and applications?",
    "Describe the plot, themes, and significance of George Orwell's 1984 in the context of modern society.",
    "How do vaccines work, and why are they considered one of the most important achievements in medical science?",
];

/// Factual-recall prompts that produce short answers.
pub const SHORT_FORM_PROMPTS: [&str; 10] = [
    "What is the capital of Australia?",
    "Who wrote the novel Pride and Prejudice?",
    "What is the chemical symbol for gold?",
    "In which year did the first human land on the Moon?",
    "What is the largest planet in our solar system?",
    "How many bones are in the adult human body?",
    "What is the boiling point of water at sea level in degrees Celsius?",
    "Who painted the Mona Lisa?",
    "What is the longest river in Africa?",
    "Which element has the atomic number 1?",
];

/// Canonical prompt sets selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptSet {
    #[default]
    LongForm,
    ShortForm,
}

impl std::fmt::Display for PromptSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptSet::LongForm => write!(f, "long"),
            PromptSet::ShortForm => write!(f, "short"),
        }
    }
}

impl std::str::FromStr for PromptSet {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" | "long-form" => Ok(PromptSet::LongForm),
            "short" | "short-form" => Ok(PromptSet::ShortForm),
            _ => Err(format!("Unknown prompt set: {}", s)),
        }
    }
}

/// Immutable, non-empty, ordered prompt collection.
///
/// Cloning is cheap; all clones share the same backing slice.
#[derive(Debug, Clone)]
pub struct PromptPool {
    prompts: Arc<[String]>,
}

impl PromptPool {
    /// Build a pool from owned prompts. Fails if `prompts` is empty.
    pub fn new(prompts: Vec<String>) -> Result<Self> {
        if prompts.is_empty() {
            return Err(BenchError::EmptyPromptPool);
        }
        Ok(Self {
            prompts: prompts.into(),
        })
    }

    pub fn long_form() -> Self {
        Self::from_static(&LONG_FORM_PROMPTS)
    }

    pub fn short_form() -> Self {
        Self::from_static(&SHORT_FORM_PROMPTS)
    }

    pub fn for_set(set: PromptSet) -> Self {
        match set {
            PromptSet::LongForm => Self::long_form(),
            PromptSet::ShortForm => Self::short_form(),
        }
    }

    /// Load one prompt per non-blank line of a text file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let prompts: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        tracing::debug!(path = %path.display(), count = prompts.len(), "Loaded prompt file");
        Self::new(prompts)
    }

    fn from_static(prompts: &[&str]) -> Self {
        Self {
            prompts: prompts.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Prompt for slot `index`, wrapping around the pool.
    pub fn get(&self, index: usize) -> &str {
        &self.prompts[index % self.prompts.len()]
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// Never true for a constructed pool.
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_canonical_pools() {
        assert_eq!(PromptPool::long_form().len(), 10);
        assert_eq!(PromptPool::short_form().len(), 10);
        assert!(PromptPool::long_form().get(0).contains("photosynthesis"));
        assert_eq!(
            PromptPool::short_form().get(0),
            "What is the capital of Australia?"
        );
    }

    #[test]
    fn test_get_wraps_around() {
        let pool = PromptPool::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert_eq!(pool.get(0), "a");
        assert_eq!(pool.get(2), "c");
        assert_eq!(pool.get(3), "a");
        assert_eq!(pool.get(100), "b");
    }

    #[test]
    fn test_empty_pool_rejected() {
        let err = PromptPool::new(Vec::new()).unwrap_err();
        assert!(matches!(err, BenchError::EmptyPromptPool));
    }

    #[test]
    fn test_prompt_set_parsing() {
        assert_eq!("long".parse::<PromptSet>().unwrap(), PromptSet::LongForm);
        assert_eq!("SHORT".parse::<PromptSet>().unwrap(), PromptSet::ShortForm);
        assert_eq!(
            "short-form".parse::<PromptSet>().unwrap(),
            PromptSet::ShortForm
        );
        assert!("medium".parse::<PromptSet>().is_err());
        assert_eq!(PromptSet::ShortForm.to_string(), "short");
    }

    #[test]
    fn test_from_file_skips_blank_lines() {
        let path = std::env::temp_dir().join(format!("prompts-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "first prompt\n\n   \n  second prompt  \n").unwrap();

        let pool = PromptPool::from_file(&path).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(1), "second prompt");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_file_blank_is_empty_pool() {
        let path = std::env::temp_dir().join(format!("prompts-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "\n\n").unwrap();

        let err = PromptPool::from_file(&path).unwrap_err();
        assert!(matches!(err, BenchError::EmptyPromptPool));

        std::fs::remove_file(&path).ok();
    }

    proptest! {
        #[test]
        fn prop_slot_maps_modulo(
            prompts in proptest::collection::vec("[a-z]{1,8}", 1..20),
            index in 0usize..10_000,
        ) {
            let pool = PromptPool::new(prompts.clone()).unwrap();
            prop_assert_eq!(pool.get(index), prompts[index % prompts.len()].as_str());
            // stable across clones and repeated calls
            let other = pool.clone();
            prop_assert_eq!(pool.get(index), other.get(index));
        }
    }
}
