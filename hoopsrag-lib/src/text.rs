//! Word-level helpers shared by the hashing embedder and the grounding check.

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from",
    "has", "have", "how", "in", "is", "it", "its", "many", "much", "of", "on", "or", "per",
    "that", "the", "their", "this", "to", "was", "were", "what", "when", "which", "who", "will",
    "with",
];

/// Lowercased word and number tokens. Decimal numbers (`10.2`) stay whole.
pub fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[must_use]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Tokens that carry meaning: no stopwords.
pub fn content_terms(text: &str) -> impl Iterator<Item = String> + '_ {
    tokens(text).filter(|t| !is_stopword(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwords_sorted() {
        assert!(STOPWORDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_tokens_keep_decimals() {
        let toks: Vec<String> = tokens("Player X: 10.2 assists per game, 2024-25.").collect();
        assert_eq!(
            toks,
            vec!["player", "x", "10.2", "assists", "per", "game", "2024", "25"]
        );
    }

    #[test]
    fn test_content_terms_drop_stopwords() {
        let terms: Vec<String> = content_terms("How many assists does Player X average?").collect();
        assert_eq!(terms, vec!["assists", "player", "x", "average"]);
    }
}
