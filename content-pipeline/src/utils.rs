use std::collections::{HashMap, HashSet};

/// Split user-typed keywords into a clean, ordered, de-duplicated list.
///
/// Comma separated input keeps each phrase whole ("machine learning, robots");
/// otherwise every non-stop word becomes a keyword.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let raw: Vec<String> = if lowered.contains(',') {
        lowered
            .split(',')
            .map(|phrase| phrase.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect()
    } else {
        lowered
            .split_whitespace()
            .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|word| !is_stop_word(word))
            .collect()
    };

    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|keyword| keyword.chars().count() >= 2)
        .filter(|keyword| seen.insert(keyword.clone()))
        .collect()
}

/// Most frequent meaningful words across `texts`, most frequent first.
/// Ties keep first-seen order so the result is stable.
pub fn top_terms<'a>(texts: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for text in texts {
        for word in text.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.chars().count() <= 3 || is_stop_word(word) {
                continue;
            }
            let count = counts.entry(word.to_string()).or_insert(0);
            if *count == 0 {
                order.push(word.to_string());
            }
            *count += 1;
        }
    }

    let mut ranked: Vec<(usize, String)> = order.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| counts[&b.1].cmp(&counts[&a.1]).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(_, word)| word).collect()
}

/// Check if a word is a common stop word
pub fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" | "of" | "with" | "by" |
        "a" | "an" | "is" | "are" | "was" | "were" | "be" | "been" | "have" | "has" | "had" |
        "do" | "does" | "did" | "will" | "would" | "could" | "should" | "may" | "might" | "must" |
        "can" | "this" | "that" | "these" | "those" | "about" | "from" | "into" | "over" |
        "after" | "before" | "more" | "most" | "some" | "such" | "than" | "then" | "they" |
        "their" | "there" | "what" | "when" | "where" | "which" | "while" | "who" | "why" |
        "how" | "its" | "it" | "not" | "new" | "says" | "said"
    )
}

/// Text processing utilities
pub mod text {
    /// Truncate to at most `max_chars` characters, preferring a sentence end
    /// in the second half, then a word boundary.
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let truncated: String = text.chars().take(max_chars).collect();
        let sentence_end = truncated
            .rfind('.')
            .filter(|&end| truncated[..end].chars().count() >= max_chars / 2);

        if let Some(last_sentence) = sentence_end {
            truncated[..last_sentence + 1].to_string()
        } else if let Some(last_space) = truncated.rfind(' ') {
            format!("{}...", &truncated[..last_space])
        } else {
            format!("{}...", truncated)
        }
    }

    /// Collapse all whitespace runs into single spaces
    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Lower-case, drop punctuation, collapse whitespace
    pub fn normalize_text(text: &str) -> String {
        text.to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Host part of a URL (domain or IP)
    pub fn extract_domain(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_string()))
    }

    pub fn is_http_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => url.scheme() == "http" || url.scheme() == "https",
            Err(_) => false,
        }
    }

    /// `host/path` lower-cased, without `www.`, query, fragment or trailing slash
    pub fn canonical_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?.to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        let path = url.path().trim_end_matches('/').to_lowercase();
        Some(format!("{}{}", host, path))
    }
}
