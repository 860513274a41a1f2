/// Relevance ranking for food search results
///
/// Classifies how a free-text query matches each record's name (falling back to the
/// brand as a weaker signal), scores it, drops records that do not match at all, and
/// orders the rest. Pure and deterministic; no I/O.

use crate::types::{FoodItem, FoodSource, MatchType, RankedFood};
use regex::Regex;
use std::cmp::Ordering;
use tracing::debug;

/// Base score for each match type. The gap between adjacent types is larger than
/// `MAX_POSITION_BONUS + MAX_USAGE_BONUS`, so modifiers never reorder match types.
const EXACT_SCORE: f64 = 1000.0;
const STARTS_WITH_SCORE: f64 = 800.0;
const WORD_MATCH_SCORE: f64 = 600.0;
const CONTAINS_SCORE: f64 = 400.0;
const BRAND_MATCH_SCORE: f64 = 200.0;

const MAX_POSITION_BONUS: f64 = 50.0;
const MAX_USAGE_BONUS: f64 = 49.0;
const USAGE_BONUS_SCALE: f64 = 10.0;

impl MatchType {
    pub fn base_score(&self) -> f64 {
        match self {
            MatchType::Exact => EXACT_SCORE,
            MatchType::StartsWith => STARTS_WITH_SCORE,
            MatchType::WordMatch => WORD_MATCH_SCORE,
            MatchType::Contains => CONTAINS_SCORE,
            MatchType::BrandMatch => BRAND_MATCH_SCORE,
        }
    }
}

/// Lowercase and strip diacritics so "Hähnchen", "HAHNCHEN" and "hahnchen" compare equal.
/// `ß` expands to `ss`; whitespace runs collapse to one space.
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = true;

    for ch in input.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
            continue;
        }
        last_space = false;
        match ch {
            'ä' | 'á' | 'à' | 'â' | 'ã' | 'å' | 'ā' => out.push('a'),
            'ö' | 'ó' | 'ò' | 'ô' | 'õ' | 'ø' | 'ō' => out.push('o'),
            'ü' | 'ú' | 'ù' | 'û' | 'ū' => out.push('u'),
            'é' | 'è' | 'ê' | 'ë' | 'ē' => out.push('e'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'ç' | 'ć' | 'č' => out.push('c'),
            'ñ' | 'ń' => out.push('n'),
            'ś' | 'š' => out.push('s'),
            'ž' | 'ź' | 'ż' => out.push('z'),
            'ł' => out.push('l'),
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            other => out.push(other),
        }
    }

    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Char index of `needle` in `haystack`, if present
fn char_position(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .find(needle)
        .map(|byte_idx| haystack[..byte_idx].chars().count())
}

/// Strictly decreasing in `position`, bounded by `MAX_POSITION_BONUS`
fn position_bonus(position: usize) -> f64 {
    MAX_POSITION_BONUS / (1.0 + position as f64)
}

/// Increasing in `usage_count`, saturating at `MAX_USAGE_BONUS`
fn usage_bonus(usage_count: u32) -> f64 {
    ((usage_count as f64).ln_1p() * USAGE_BONUS_SCALE).min(MAX_USAGE_BONUS)
}

/// Query pre-processed once per ranking call
struct PreparedQuery {
    normalized: String,
    word: Option<Regex>,
}

impl PreparedQuery {
    fn new(query: &str) -> Self {
        let normalized = normalize_text(query);
        let word = Regex::new(&format!(r"\b{}\b", regex::escape(&normalized))).ok();
        Self { normalized, word }
    }

    /// Strongest match of this query against a record, with its position
    fn classify(&self, item: &FoodItem) -> Option<(MatchType, usize)> {
        let name = normalize_text(&item.name);

        if name == self.normalized {
            return Some((MatchType::Exact, 0));
        }
        if name.starts_with(&self.normalized) {
            return Some((MatchType::StartsWith, 0));
        }
        if let Some(word) = &self.word {
            if let Some(m) = word.find(&name) {
                return Some((MatchType::WordMatch, name[..m.start()].chars().count()));
            }
        }
        if let Some(position) = char_position(&name, &self.normalized) {
            return Some((MatchType::Contains, position));
        }

        let brand = normalize_text(item.brand.as_deref()?);
        char_position(&brand, &self.normalized).map(|position| (MatchType::BrandMatch, position))
    }
}

/// Score and order `records` against `query`, dropping records with no match signal.
///
/// Ordering: score descending, then earlier match position, then higher usage count,
/// then input order.
pub fn rank(records: Vec<FoodItem>, query: &str, source: FoodSource) -> Vec<RankedFood> {
    if records.is_empty() || query.trim().is_empty() {
        return Vec::new();
    }

    let prepared = PreparedQuery::new(query);
    if prepared.normalized.is_empty() {
        return Vec::new();
    }

    let total = records.len();
    let mut ranked: Vec<(usize, RankedFood)> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let (match_type, match_position) = prepared.classify(&item)?;
            let relevance_score = match_type.base_score()
                + position_bonus(match_position)
                + usage_bonus(item.usage_count);
            Some((
                index,
                RankedFood {
                    item,
                    match_type,
                    match_position,
                    relevance_score,
                    source,
                },
            ))
        })
        .collect();

    ranked.sort_by(|(a_idx, a), (b_idx, b)| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.match_position.cmp(&b.match_position))
            .then_with(|| b.item.usage_count.cmp(&a.item.usage_count))
            .then_with(|| a_idx.cmp(b_idx))
    });

    debug!(
        "Ranked {} of {} {} records for query '{}'",
        ranked.len(),
        total,
        source,
        prepared.normalized
    );

    ranked.into_iter().map(|(_, food)| food).collect()
}
