//! The classical meter knowledge base.
//!
//! [`MeterCatalog`] is the read-only lookup interface the pipeline consumes:
//! canonicalization, search, and theme/difficulty queries. A default catalog
//! covering the sixteen classical bahrs ships with the crate so the pipeline
//! is runnable out of the box; callers with richer data supply their own
//! descriptors.
//!
//! The catalog is immutable after construction and shared process-wide behind
//! an `Arc`.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// How demanding a meter is for generation models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One rhythmic foot (tafeela) with its binary light/heavy pattern and the
/// sanctioned deviations classical prosody allows on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Foot {
    /// Foot name, e.g. `فعولن`.
    pub name: String,
    /// Light/heavy pattern, `1` = mutaharrik, `0` = sakin.
    pub pattern: String,
    /// Allowed zihafs and ilals, passed verbatim to the prosody judge.
    #[serde(default)]
    pub allowed_zihafs: Vec<String>,
}

impl Foot {
    fn new(name: &str, pattern: &str, zihafs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            allowed_zihafs: zihafs.iter().map(|z| (*z).to_string()).collect(),
        }
    }
}

/// Everything the catalog knows about one meter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterDescriptor {
    /// Canonical Arabic name, e.g. `بحر الكامل`.
    pub name: String,
    /// Short display name, e.g. `الكامل`.
    pub display_name: String,
    /// Ordered feet of one hemistich.
    pub feet: Vec<Foot>,
    /// Recognized truncated/altered variants (majzū’, mashtūr, manhūk).
    #[serde(default)]
    pub sub_meters: Vec<String>,
    pub difficulty: Difficulty,
    /// Themes this meter traditionally serves.
    #[serde(default)]
    pub themes: Vec<String>,
}

impl MeterDescriptor {
    /// Foot names in order, the form stored on `Constraints::meter_feet`.
    #[must_use]
    pub fn foot_names(&self) -> Vec<String> {
        self.feet.iter().map(|f| f.name.clone()).collect()
    }

    /// Reference tafeelat string for one hemistich, e.g.
    /// `متفاعلن متفاعلن متفاعلن`.
    #[must_use]
    pub fn reference_pattern(&self) -> String {
        self.feet
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All allowed zihafs across the meter's feet, deduplicated in foot order.
    #[must_use]
    pub fn allowed_zihafs(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for foot in &self.feet {
            for z in &foot.allowed_zihafs {
                if !seen.contains(z) {
                    seen.push(z.clone());
                }
            }
        }
        seen
    }
}

/// Rejection from the knowledge base, carrying near-match suggestions so a
/// higher level can retry with a corrected name.
#[derive(Debug, Error, Diagnostic)]
pub enum MeterError {
    #[error("unknown meter `{name}`; closest matches: {}", .suggestions.join("، "))]
    #[diagnostic(
        code(qasida::meters::unknown),
        help("Retry with one of the suggested canonical names.")
    )]
    Unknown {
        name: String,
        /// Up to three similar canonical names.
        suggestions: Vec<String>,
    },
}

/// Read-only meter lookup shared by resolvers and the evaluator.
pub struct MeterCatalog {
    by_name: FxHashMap<String, Arc<MeterDescriptor>>,
    /// Alias (short name, bare name) → canonical name.
    aliases: FxHashMap<String, String>,
    /// Canonical names in insertion order, for deterministic listings.
    order: Vec<String>,
}

impl MeterCatalog {
    /// Build a catalog from caller-supplied descriptors.
    ///
    /// Each descriptor is reachable by its canonical name, its display name,
    /// and the display name without the `ال` article.
    #[must_use]
    pub fn from_descriptors(descriptors: Vec<MeterDescriptor>) -> Self {
        let mut by_name = FxHashMap::default();
        let mut aliases = FxHashMap::default();
        let mut order = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let canonical = descriptor.name.clone();
            aliases.insert(descriptor.display_name.clone(), canonical.clone());
            if let Some(bare) = descriptor.display_name.strip_prefix("ال") {
                aliases.insert(bare.to_string(), canonical.clone());
            }
            order.push(canonical.clone());
            by_name.insert(canonical, Arc::new(descriptor));
        }
        Self { by_name, aliases, order }
    }

    /// The default catalog: the sixteen classical meters.
    #[must_use]
    pub fn classical() -> Self {
        Self::from_descriptors(classical_descriptors())
    }

    /// Look a meter up by canonical name or alias.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<MeterDescriptor>> {
        let name = name.trim();
        if let Some(found) = self.by_name.get(name) {
            return Some(Arc::clone(found));
        }
        self.aliases
            .get(name)
            .and_then(|canonical| self.by_name.get(canonical))
            .map(Arc::clone)
    }

    /// `true` when `name` resolves to a known meter.
    #[must_use]
    pub fn recognizes(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Resolve `name` to its canonical form, or fail with up to three
    /// near-match suggestions.
    pub fn canonicalize(&self, name: &str) -> Result<String, MeterError> {
        if let Some(descriptor) = self.lookup(name) {
            return Ok(descriptor.name.clone());
        }
        Err(MeterError::Unknown {
            name: name.trim().to_string(),
            suggestions: self.nearest(name, 3),
        })
    }

    /// Substring search over canonical and display names.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Arc<MeterDescriptor>> {
        let query = query.trim();
        self.iter()
            .filter(|d| d.name.contains(query) || d.display_name.contains(query))
            .collect()
    }

    /// Meters whose traditional themes include `theme`.
    #[must_use]
    pub fn by_theme(&self, theme: &str) -> Vec<Arc<MeterDescriptor>> {
        self.iter()
            .filter(|d| d.themes.iter().any(|t| t.contains(theme) || theme.contains(t.as_str())))
            .collect()
    }

    /// Meters at the given difficulty.
    #[must_use]
    pub fn by_difficulty(&self, level: Difficulty) -> Vec<Arc<MeterDescriptor>> {
        self.iter().filter(|d| d.difficulty == level).collect()
    }

    /// All descriptors, in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = Arc<MeterDescriptor>> + '_ {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name).map(Arc::clone))
    }

    /// The `count` canonical names closest to `name` by bigram overlap.
    fn nearest(&self, name: &str, count: usize) -> Vec<String> {
        let mut scored: Vec<(f64, &String)> = self
            .order
            .iter()
            .map(|candidate| (bigram_similarity(name, candidate), candidate))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(count)
            .map(|(_, candidate)| candidate.clone())
            .collect()
    }
}

/// Dice coefficient over character bigrams; rough but alphabet-agnostic.
fn bigram_similarity(a: &str, b: &str) -> f64 {
    let bigrams = |s: &str| -> Vec<(char, char)> {
        let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let left = bigrams(a);
    let right = bigrams(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let mut remaining = right.clone();
    let mut shared = 0usize;
    for bigram in &left {
        if let Some(pos) = remaining.iter().position(|r| r == bigram) {
            remaining.swap_remove(pos);
            shared += 1;
        }
    }
    (2.0 * shared as f64) / (left.len() + right.len()) as f64
}

/// The sixteen classical meters with their base tafeelat.
fn classical_descriptors() -> Vec<MeterDescriptor> {
    let faoolun = || Foot::new("فعولن", "11010", &["القبض: فعولن ← فعول"]);
    let mafaeelun = || Foot::new("مفاعيلن", "1101010", &["القبض: مفاعيلن ← مفاعلن", "الكف: مفاعيلن ← مفاعيل"]);
    let faelatun = || Foot::new("فاعلاتن", "1011010", &["الخبن: فاعلاتن ← فعلاتن", "الكف: فاعلاتن ← فاعلات"]);
    let faelun = || Foot::new("فاعلن", "10110", &["الخبن: فاعلن ← فعلن"]);
    let mustafelun = || Foot::new("مستفعلن", "1010110", &["الخبن: مستفعلن ← متفعلن", "الطي: مستفعلن ← مستعلن"]);
    let mutafaelun = || Foot::new("متفاعلن", "1101110", &["الإضمار: متفاعلن ← متْفاعلن"]);
    let mufaalatun = || Foot::new("مفاعلتن", "1101110", &["العصب: مفاعلتن ← مفاعلْتن"]);
    let mafoolat = || Foot::new("مفعولات", "1010101", &["الطي: مفعولات ← فاعلات"]);

    let meter = |name: &str,
                 display: &str,
                 feet: Vec<Foot>,
                 sub_meters: &[&str],
                 difficulty: Difficulty,
                 themes: &[&str]| MeterDescriptor {
        name: name.to_string(),
        display_name: display.to_string(),
        feet,
        sub_meters: sub_meters.iter().map(|s| (*s).to_string()).collect(),
        difficulty,
        themes: themes.iter().map(|s| (*s).to_string()).collect(),
    };

    vec![
        meter(
            "بحر الطويل",
            "الطويل",
            vec![faoolun(), mafaeelun(), faoolun(), mafaeelun()],
            &[],
            Difficulty::Hard,
            &["ملاحم", "قصائد طويلة", "مدح", "فخر"],
        ),
        meter(
            "بحر المديد",
            "المديد",
            vec![faelatun(), faelun(), faelatun()],
            &["بحر المديد المجزوء"],
            Difficulty::Medium,
            &["غزل", "مدح", "وصف"],
        ),
        meter(
            "بحر البسيط",
            "البسيط",
            vec![mustafelun(), faelun(), mustafelun(), faelun()],
            &["بحر البسيط المجزوء", "بحر البسيط المخلى"],
            Difficulty::Medium,
            &["جميع الأغراض", "غزل", "مدح", "هجاء", "وصف"],
        ),
        meter(
            "بحر الوافر",
            "الوافر",
            vec![mufaalatun(), mufaalatun(), faoolun()],
            &["بحر الوافر المجزوء"],
            Difficulty::Medium,
            &["حماسة", "فخر", "مدح"],
        ),
        meter(
            "بحر الكامل",
            "الكامل",
            vec![mutafaelun(), mutafaelun(), mutafaelun()],
            &["بحر الكامل المجزوء"],
            Difficulty::Easy,
            &["جميع الأغراض", "غزل", "مدح", "وصف", "الحب"],
        ),
        meter(
            "بحر الهزج",
            "الهزج",
            vec![mafaeelun(), mafaeelun()],
            &[],
            Difficulty::Easy,
            &["غزل", "وصف", "رثاء"],
        ),
        meter(
            "بحر الرجز",
            "الرجز",
            vec![mustafelun(), mustafelun(), mustafelun()],
            &["بحر الرجز المجزوء", "بحر الرجز المشطور", "بحر الرجز المنهوك"],
            Difficulty::Easy,
            &["هجاء", "سخرية", "تعليم"],
        ),
        meter(
            "بحر الرمل",
            "الرمل",
            vec![faelatun(), faelatun(), faelatun()],
            &["بحر الرمل المجزوء"],
            Difficulty::Easy,
            &["غزل", "وصف", "الحب"],
        ),
        meter(
            "بحر السريع",
            "السريع",
            vec![mustafelun(), mustafelun(), mafoolat()],
            &["بحر السريع المشطور"],
            Difficulty::Medium,
            &["هجاء", "حماسة"],
        ),
        meter(
            "بحر المنسرح",
            "المنسرح",
            vec![mustafelun(), mafoolat(), mustafelun()],
            &["بحر المنسرح المنهوك"],
            Difficulty::Hard,
            &["وصف", "غزل"],
        ),
        meter(
            "بحر الخفيف",
            "الخفيف",
            vec![faelatun(), mustafelun(), faelatun()],
            &["بحر الخفيف المجزوء"],
            Difficulty::Medium,
            &["غزل", "وصف", "حكمة"],
        ),
        meter(
            "بحر المضارع",
            "المضارع",
            vec![mafaeelun(), faelatun()],
            &[],
            Difficulty::Hard,
            &["غزل", "وصف"],
        ),
        meter(
            "بحر المقتضب",
            "المقتضب",
            vec![mafoolat(), mustafelun()],
            &[],
            Difficulty::Hard,
            &["هجاء", "سخرية"],
        ),
        meter(
            "بحر المجتث",
            "المجتث",
            vec![mustafelun(), faelatun()],
            &[],
            Difficulty::Medium,
            &["غزل", "وصف"],
        ),
        meter(
            "بحر المتقارب",
            "المتقارب",
            vec![faoolun(), faoolun(), faoolun(), faoolun()],
            &["بحر المتقارب المجزوء"],
            Difficulty::Easy,
            &["غزل", "وصف", "حكمة"],
        ),
        meter(
            "بحر المحدث",
            "المحدث",
            vec![faelun(), faelun(), faelun(), faelun()],
            &["بحر المحدث المجزوء", "بحر المحدث المشطور"],
            Difficulty::Medium,
            &["غزل", "وصف"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classical_catalog_has_sixteen_meters() {
        let catalog = MeterCatalog::classical();
        assert_eq!(catalog.iter().count(), 16);
    }

    #[test]
    fn lookup_accepts_aliases() {
        let catalog = MeterCatalog::classical();
        assert!(catalog.recognizes("بحر الكامل"));
        assert!(catalog.recognizes("الكامل"));
        assert!(catalog.recognizes("كامل"));
        assert!(!catalog.recognizes("بحر غير موجود"));
    }

    #[test]
    fn canonicalize_round_trips() {
        let catalog = MeterCatalog::classical();
        assert_eq!(catalog.canonicalize("كامل").unwrap(), "بحر الكامل");
    }

    #[test]
    fn unknown_meter_carries_suggestions() {
        let catalog = MeterCatalog::classical();
        let err = catalog.canonicalize("بحر الكاامل").unwrap_err();
        let MeterError::Unknown { suggestions, .. } = err;
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions.contains(&"بحر الكامل".to_string()));
    }

    #[test]
    fn theme_query_finds_love_meters() {
        let catalog = MeterCatalog::classical();
        let meters = catalog.by_theme("الحب");
        assert!(meters.iter().any(|m| m.name == "بحر الكامل"));
    }

    #[test]
    fn difficulty_buckets_are_disjoint() {
        let catalog = MeterCatalog::classical();
        let easy = catalog.by_difficulty(Difficulty::Easy).len();
        let medium = catalog.by_difficulty(Difficulty::Medium).len();
        let hard = catalog.by_difficulty(Difficulty::Hard).len();
        assert_eq!(easy + medium + hard, 16);
    }

    #[test]
    fn reference_pattern_joins_feet() {
        let catalog = MeterCatalog::classical();
        let kamel = catalog.lookup("بحر الكامل").unwrap();
        assert_eq!(kamel.reference_pattern(), "متفاعلن متفاعلن متفاعلن");
        assert_eq!(kamel.foot_names().len(), 3);
    }
}
