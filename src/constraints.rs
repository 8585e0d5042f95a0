//! The constraint record that drives every stage of the pipeline.
//!
//! A [`Constraints`] value is produced by the constraint parser, enriched by
//! the meter and rhyme resolvers, and consumed by the generator, evaluator,
//! and refiners. It is mutable through replacement: nodes return an updated
//! copy rather than mutating shared state.
//!
//! # Invariants
//!
//! - Once `meter` is set to a recognized canonical name, `meter_feet` is
//!   populated from the meter catalog.
//! - `rhyme_letter`, when set, is a single base-form Arabic letter (see
//!   [`crate::utils::arabic::normalize_rhyme_letter`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vocalization of the rhyme letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Harakah {
    Sukun,
    Fatha,
    Kasra,
    Damma,
}

impl Harakah {
    /// Arabic display name, as used in prompts and summaries.
    #[must_use]
    pub fn arabic_name(&self) -> &'static str {
        match self {
            Harakah::Sukun => "السكون",
            Harakah::Fatha => "الفتحة",
            Harakah::Kasra => "الكسرة",
            Harakah::Damma => "الضمة",
        }
    }

    /// Parse from either the transliterated or the Arabic name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Harakah> {
        match s.trim() {
            "sukun" | "السكون" | "سكون" => Some(Harakah::Sukun),
            "fatha" | "الفتحة" | "فتحة" => Some(Harakah::Fatha),
            "kasra" | "الكسرة" | "كسرة" => Some(Harakah::Kasra),
            "damma" | "الضمة" | "ضمة" => Some(Harakah::Damma),
            _ => None,
        }
    }
}

impl fmt::Display for Harakah {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arabic_name())
    }
}

/// Classical rhyme classification by the number of moving letters between the
/// rhyme's two sakin anchors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhymeType {
    Mutawatir,
    Mutarakib,
    Mutadarik,
    Mutaqarib,
    Mutakawis,
}

impl RhymeType {
    /// Arabic display name.
    #[must_use]
    pub fn arabic_name(&self) -> &'static str {
        match self {
            RhymeType::Mutawatir => "المتواتر",
            RhymeType::Mutarakib => "المتراكب",
            RhymeType::Mutadarik => "المتدارك",
            RhymeType::Mutaqarib => "المتقارب",
            RhymeType::Mutakawis => "المتكاوس",
        }
    }

    /// Parse from either the transliterated or the Arabic name.
    #[must_use]
    pub fn parse(s: &str) -> Option<RhymeType> {
        match s.trim() {
            "mutawatir" | "المتواتر" => Some(RhymeType::Mutawatir),
            "mutarakib" | "المتراكب" => Some(RhymeType::Mutarakib),
            "mutadarik" | "المتدارك" => Some(RhymeType::Mutadarik),
            "mutaqarib" | "المتقارب" => Some(RhymeType::Mutaqarib),
            "mutakawis" | "المتكاوس" => Some(RhymeType::Mutakawis),
            _ => None,
        }
    }
}

impl fmt::Display for RhymeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arabic_name())
    }
}

/// Everything the pipeline knows about what the poem should be.
///
/// # Examples
///
/// ```
/// use qasida::constraints::{Constraints, Harakah};
///
/// let constraints = Constraints::builder("اكتب بيتين في الحب")
///     .meter("بحر الكامل")
///     .rhyme_letter('ق')
///     .rhyme_harakah(Harakah::Kasra)
///     .line_count(2)
///     .theme("الحب")
///     .build();
///
/// assert_eq!(constraints.line_count, Some(2));
/// assert_eq!(constraints.rhyme_letter, Some('ق'));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Canonical Arabic meter name, e.g. `بحر الكامل`. `None` until resolved.
    pub meter: Option<String>,
    /// Ordered foot-pattern names derived from the meter catalog.
    ///
    /// Derived data, never user-supplied; populated by the meter resolver.
    #[serde(default)]
    pub meter_feet: Vec<String>,
    /// The rowi: the defining consonant of the rhyme, in base form.
    pub rhyme_letter: Option<char>,
    /// Vocalization of the rowi.
    pub rhyme_harakah: Option<Harakah>,
    /// Classical rhyme classification.
    pub rhyme_type: Option<RhymeType>,
    /// Number of baits. Each bait is two hemistichs.
    pub line_count: Option<u32>,
    pub theme: Option<String>,
    pub tone: Option<String>,
    pub register: Option<String>,
    pub era: Option<String>,
    pub poet_style: Option<String>,
    #[serde(default)]
    pub imagery: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sections: Vec<String>,
    /// Free-form notes from the parser about unclear or extra requirements.
    #[serde(default)]
    pub ambiguities: Vec<String>,
    /// Verbatim user input this record was parsed from.
    #[serde(default)]
    pub original_prompt: String,
}

impl Constraints {
    /// Start building a constraint record from the user's verbatim request.
    #[must_use]
    pub fn builder(original_prompt: impl Into<String>) -> ConstraintsBuilder {
        ConstraintsBuilder {
            inner: Constraints {
                original_prompt: original_prompt.into(),
                ..Default::default()
            },
        }
    }

    /// `true` when the meter name is present (recognition is the catalog's
    /// business, not this record's).
    #[must_use]
    pub fn has_meter(&self) -> bool {
        self.meter.as_deref().is_some_and(|m| !m.is_empty())
    }

    /// `true` when every field the generator needs is present.
    #[must_use]
    pub fn ready_for_generation(&self) -> bool {
        self.has_meter()
            && !self.meter_feet.is_empty()
            && self.rhyme_letter.is_some()
            && self.line_count.is_some()
    }

    /// Number of hemistichs the finished poem must contain.
    #[must_use]
    pub fn total_hemistichs(&self) -> Option<u32> {
        self.line_count.map(|baits| baits * 2)
    }
}

/// Fluent builder for [`Constraints`].
#[derive(Debug, Default)]
pub struct ConstraintsBuilder {
    inner: Constraints,
}

impl ConstraintsBuilder {
    #[must_use]
    pub fn meter(mut self, meter: impl Into<String>) -> Self {
        self.inner.meter = Some(meter.into());
        self
    }

    #[must_use]
    pub fn meter_feet<I, S>(mut self, feet: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.meter_feet = feet.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn rhyme_letter(mut self, letter: char) -> Self {
        self.inner.rhyme_letter = Some(letter);
        self
    }

    #[must_use]
    pub fn rhyme_harakah(mut self, harakah: Harakah) -> Self {
        self.inner.rhyme_harakah = Some(harakah);
        self
    }

    #[must_use]
    pub fn rhyme_type(mut self, rhyme_type: RhymeType) -> Self {
        self.inner.rhyme_type = Some(rhyme_type);
        self
    }

    #[must_use]
    pub fn line_count(mut self, baits: u32) -> Self {
        self.inner.line_count = Some(baits);
        self
    }

    #[must_use]
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.inner.theme = Some(theme.into());
        self
    }

    #[must_use]
    pub fn tone(mut self, tone: impl Into<String>) -> Self {
        self.inner.tone = Some(tone.into());
        self
    }

    #[must_use]
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn imagery<I, S>(mut self, imagery: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.imagery = imagery.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn ambiguity(mut self, note: impl Into<String>) -> Self {
        self.inner.ambiguities.push(note.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Constraints {
        self.inner
    }
}
