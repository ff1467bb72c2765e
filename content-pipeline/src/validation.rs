use std::fmt;

/// Why a generated post was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("generator returned empty output")]
    EmptyOutput,

    #[error("generator refused: matched \"{phrase}\"")]
    RefusalDetected { phrase: String },
}

/// Decides whether a generated text is a refusal.
///
/// Returns the matched phrase (or any description) when it is.
pub trait RefusalCheck: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

impl<F> RefusalCheck for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn detect(&self, text: &str) -> Option<String> {
        if self(text) {
            Some("custom refusal check".to_string())
        } else {
            None
        }
    }
}

pub const DEFAULT_REFUSAL_PHRASES: &[&str] = &[
    "i cannot discuss this",
    "i can't discuss this",
    "i won't create this",
    "i will not create this",
    "i cannot create",
    "i can't create",
    "i cannot help with",
    "i can't help with",
    "i'm unable to",
    "i am unable to",
    "i cannot fulfill",
    "i can't fulfill",
    "as an ai language model",
    "i'm sorry, but i",
    "sorry, i can't",
    "я не могу обсуждать эту тему",
    "не могу обсуждать",
    "отказываюсь обсуждать",
    "это неэтично",
    "это неприемлемо",
    "я не буду",
    "не могу создать",
    "не могу написать",
    "извините, но я не могу",
    "сожалею, но я не могу",
];

/// Case-insensitive substring match against a fixed phrase list
#[derive(Debug, Clone)]
pub struct PhraseRefusalDetector {
    phrases: Vec<String>,
}

impl PhraseRefusalDetector {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for PhraseRefusalDetector {
    fn default() -> Self {
        Self::new(DEFAULT_REFUSAL_PHRASES.iter().copied())
    }
}

impl RefusalCheck for PhraseRefusalDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| lowered.contains(phrase.as_str()))
            .cloned()
    }
}

/// Accepts or rejects generator output before anything is charged
pub struct Validator {
    refusal: Box<dyn RefusalCheck>,
}

impl Validator {
    pub fn new(refusal: impl RefusalCheck + 'static) -> Self {
        Self {
            refusal: Box::new(refusal),
        }
    }

    pub fn validate(&self, output: &str) -> Result<(), Rejection> {
        if output.trim().is_empty() {
            return Err(Rejection::EmptyOutput);
        }

        match self.refusal.detect(output) {
            Some(phrase) => Err(Rejection::RefusalDetected { phrase }),
            None => Ok(()),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(PhraseRefusalDetector::default())
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}
