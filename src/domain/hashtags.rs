//! Hashtag normalization and hashtag-based ranking.
//!
//! Stored hashtags are inconsistent (`#Ocean`, `ocean`, `#OCEAN`), so lookups
//! try a set of variants and comparisons happen on the normalized form.

use crate::domain::catalog::CatalogEntry;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\p{L}\p{N}_]+$").expect("static hashtag pattern"))
}

/// Strips whitespace and leading `#`, then lowercases.
/// Returns `None` for anything that is not a single word.
pub fn normalize(tag: &str) -> Option<String> {
    let bare = tag.trim().trim_start_matches('#');
    if bare.is_empty() || !tag_pattern().is_match(bare) {
        return None;
    }
    Some(bare.to_lowercase())
}

/// Spellings under which a tag may have been stored.
pub fn variants(tag: &str) -> Vec<String> {
    let bare = tag.trim().trim_start_matches('#');
    if bare.is_empty() || !tag_pattern().is_match(bare) {
        return Vec::new();
    }

    let lower = bare.to_lowercase();
    let mut chars = lower.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    let upper = bare.to_uppercase();

    let mut out: Vec<String> = Vec::with_capacity(8);
    for form in [bare.to_string(), lower, capitalized, upper] {
        for candidate in [form.clone(), format!("#{}", form)] {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    }
    out
}

/// Normalized hashtag set of an entry.
pub fn entry_tags(entry: &CatalogEntry) -> HashSet<String> {
    entry.hashtags().iter().filter_map(|t| normalize(t)).collect()
}

/// Ranks candidates by how many of their hashtags the user follows.
///
/// Higher overlap first; ties are shuffled. Entries with no overlap are kept
/// after the scored ones so a sparse follow list still fills the page.
pub fn rank_by_overlap<R: Rng + ?Sized>(
    candidates: Vec<CatalogEntry>,
    followed: &[String],
    k: usize,
    rng: &mut R,
) -> Vec<CatalogEntry> {
    let followed: HashSet<String> = followed.iter().filter_map(|t| normalize(t)).collect();

    let mut scored: Vec<(usize, CatalogEntry)> = candidates
        .into_iter()
        .map(|entry| {
            let score = entry_tags(&entry).intersection(&followed).count();
            (score, entry)
        })
        .collect();

    // Shuffle first, then a stable sort keeps the random order within a score.
    scored.shuffle(rng);
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(k).map(|(_, e)| e).collect()
}

/// Random sample of up to `k` entries, used when the user follows nothing.
pub fn sample<R: Rng + ?Sized>(
    candidates: Vec<CatalogEntry>,
    k: usize,
    rng: &mut R,
) -> Vec<CatalogEntry> {
    let mut candidates = candidates;
    candidates.shuffle(rng);
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::fixtures::tagged;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_normalize_strips_prefix_and_case() {
        assert_eq!(normalize("#Ocean"), Some("ocean".to_string()));
        assert_eq!(normalize("  ocean "), Some("ocean".to_string()));
        assert_eq!(normalize("#"), None);
        assert_eq!(normalize("two words"), None);
    }

    #[test]
    fn test_variants_cover_prefix_and_casing() {
        let v = variants("ocean");
        assert_eq!(
            v,
            vec!["ocean", "#ocean", "Ocean", "#Ocean", "OCEAN", "#OCEAN"]
        );
    }

    #[test]
    fn test_variants_keep_original_spelling_first() {
        let v = variants("#SeaLife");
        assert_eq!(v[0], "SeaLife");
        assert_eq!(v[1], "#SeaLife");
        assert!(v.contains(&"sealife".to_string()));
        assert!(v.contains(&"#SEALIFE".to_string()));
    }

    #[test]
    fn test_variants_reject_invalid_tags() {
        assert!(variants("").is_empty());
        assert!(variants("#a b").is_empty());
    }

    #[test]
    fn test_rank_by_overlap_orders_by_score() {
        let candidates = vec![
            tagged("none", 1, &["#cats"]),
            tagged("two", 2, &["#ocean", "#Surf"]),
            tagged("one", 3, &["#ocean"]),
        ];
        let followed = vec!["ocean".to_string(), "#surf".to_string()];
        let mut rng = StepRng::new(0, 1);

        let ranked = rank_by_overlap(candidates, &followed, 2, &mut rng);
        let ids: Vec<_> = ranked.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["two", "one"]);
    }

    #[test]
    fn test_sample_never_exceeds_k() {
        let candidates = (0..10).map(|i| tagged(&i.to_string(), i, &[])).collect();
        let mut rng = StepRng::new(3, 7);
        assert_eq!(sample(candidates, 4, &mut rng).len(), 4);
    }
}
