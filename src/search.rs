use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NORMALIZE_RE: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Minimum score for a node to appear in search results.
pub const MATCH_THRESHOLD: f32 = 0.55;

pub struct SearchEngine;

impl SearchEngine {
    /// Lowercase and strip everything that is not a letter or digit, so
    /// "Vec::push()" and "vec push" compare equal.
    pub fn normalize(text: &str) -> String {
        NORMALIZE_RE
            .replace_all(&text.to_lowercase(), "")
            .into_owned()
    }

    /// Best similarity between a normalized query and any of a node's
    /// text fields (content, card fronts, card backs).
    pub fn score(normalized_query: &str, fields: &[&str]) -> f32 {
        fields
            .iter()
            .map(|field| Self::similarity(normalized_query, &Self::normalize(field)))
            .fold(0.0, f32::max)
    }

    fn similarity(a: &str, b: &str) -> f32 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        if a == b {
            return 1.0;
        }

        // Substring matches score high, weighted by how much of the
        // field the query covers.
        if b.contains(a) {
            let ratio = a.len() as f32 / b.len() as f32;
            return 0.6 + (ratio * 0.4);
        }

        if a.contains(b) {
            let ratio = b.len() as f32 / a.len() as f32;
            return 0.5 + (ratio * 0.3);
        }

        let jaro_winkler = strsim::jaro_winkler(a, b);
        if jaro_winkler > 0.85 {
            return jaro_winkler as f32;
        }

        // Length-based similarity as a weak fallback.
        let len_sim = 1.0 - ((a.len() as f32 - b.len() as f32).abs() / (a.len() + b.len()) as f32);
        len_sim * 0.3
    }
}
