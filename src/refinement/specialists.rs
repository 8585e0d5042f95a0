//! The four specialist refiners: line count, prosody, rhyme, diacritics.
//!
//! Each owns one rewrite prompt, applies only when its dimension failed with
//! a real verdict (a defective dimension has nothing actionable to fix), and
//! returns a no-change outcome on empty or identical replies.

use async_trait::async_trait;

use super::refiner::{outcome_from_reply, RefineOutcome, Refiner};
use crate::constraints::Constraints;
use crate::pipeline::node::{NodeEnv, NodeError};
use crate::poem::{Dimension, DimensionResult, Poem, Quality};
use crate::prompts::{params, template_ids};

fn needs_work(result: &DimensionResult) -> bool {
    !result.is_valid && result.defect.is_none()
}

fn broken_baits(result: &DimensionResult) -> String {
    let invalid = result.invalid_bait_indices();
    if invalid.is_empty() {
        "غير محددة".to_string()
    } else {
        invalid
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("، ")
    }
}

fn unspecified() -> String {
    "غير محدد".to_string()
}

/// Adjusts the poem to the requested bait count.
pub struct LineCountRefiner;

#[async_trait]
impl Refiner for LineCountRefiner {
    fn name(&self) -> &'static str {
        "line_count_refiner"
    }

    fn affects(&self) -> &'static [Dimension] {
        &[Dimension::LineCount]
    }

    fn applies(&self, _poem: &Poem, quality: &Quality) -> bool {
        needs_work(&quality.line_count)
    }

    async fn refine(
        &self,
        poem: &Poem,
        constraints: &Constraints,
        _quality: &Quality,
        env: &NodeEnv,
    ) -> Result<RefineOutcome, NodeError> {
        let expected = constraints
            .line_count
            .map_or_else(|| poem.bait_count().max(1) as u32, |n| n);
        let prompt = env.prompts.format(
            template_ids::LINE_COUNT_REFINER,
            &params([
                ("expected", expected.to_string()),
                ("total_hemistichs", (expected * 2).to_string()),
                ("poem", poem.text()),
            ]),
        )?;
        let reply = env.generate(&prompt).await?;
        Ok(outcome_from_reply(&reply.text, poem))
    }
}

/// Rewrites metrically broken baits onto the meter's tafeelat.
pub struct ProsodyRefiner;

#[async_trait]
impl Refiner for ProsodyRefiner {
    fn name(&self) -> &'static str {
        "prosody_refiner"
    }

    fn affects(&self) -> &'static [Dimension] {
        &[Dimension::Prosody, Dimension::Diacritics]
    }

    fn applies(&self, _poem: &Poem, quality: &Quality) -> bool {
        needs_work(&quality.prosody)
    }

    async fn refine(
        &self,
        poem: &Poem,
        constraints: &Constraints,
        quality: &Quality,
        env: &NodeEnv,
    ) -> Result<RefineOutcome, NodeError> {
        let issues = quality
            .prosody
            .baits
            .iter()
            .filter(|b| !b.is_valid)
            .filter_map(|b| {
                b.detail
                    .as_ref()
                    .map(|d| format!("البيت {}: {}", b.bait_index, d))
            })
            .collect::<Vec<_>>();
        let prompt = env.prompts.format(
            template_ids::PROSODY_REFINER,
            &params([
                ("poem", poem.text()),
                ("meter", constraints.meter.clone().unwrap_or_else(unspecified)),
                ("meter_feet", constraints.meter_feet.join(" ")),
                ("broken_baits", broken_baits(&quality.prosody)),
                (
                    "issues",
                    if issues.is_empty() {
                        "غير مفصلة".to_string()
                    } else {
                        issues.join("\n")
                    },
                ),
            ]),
        )?;
        let reply = env.generate(&prompt).await?;
        Ok(outcome_from_reply(&reply.text, poem))
    }
}

/// Re-rhymes the closing hemistichs onto the declared rowi.
pub struct RhymeRefiner;

#[async_trait]
impl Refiner for RhymeRefiner {
    fn name(&self) -> &'static str {
        "rhyme_refiner"
    }

    fn affects(&self) -> &'static [Dimension] {
        &[Dimension::Rhyme, Dimension::Diacritics]
    }

    fn applies(&self, _poem: &Poem, quality: &Quality) -> bool {
        needs_work(&quality.rhyme)
    }

    async fn refine(
        &self,
        poem: &Poem,
        constraints: &Constraints,
        quality: &Quality,
        env: &NodeEnv,
    ) -> Result<RefineOutcome, NodeError> {
        let prompt = env.prompts.format(
            template_ids::RHYME_REFINER,
            &params([
                ("poem", poem.text()),
                (
                    "qafiya_letter",
                    constraints
                        .rhyme_letter
                        .map(|c| c.to_string())
                        .unwrap_or_else(unspecified),
                ),
                (
                    "qafiya_harakah",
                    constraints
                        .rhyme_harakah
                        .map(|h| h.arabic_name().to_string())
                        .unwrap_or_else(unspecified),
                ),
                ("broken_baits", broken_baits(&quality.rhyme)),
            ]),
        )?;
        let reply = env.generate(&prompt).await?;
        Ok(outcome_from_reply(&reply.text, poem))
    }
}

/// Completes missing vocalization without touching word choice.
pub struct DiacriticsRefiner;

#[async_trait]
impl Refiner for DiacriticsRefiner {
    fn name(&self) -> &'static str {
        "diacritics_refiner"
    }

    fn affects(&self) -> &'static [Dimension] {
        &[Dimension::Diacritics]
    }

    fn applies(&self, _poem: &Poem, quality: &Quality) -> bool {
        needs_work(&quality.diacritics)
    }

    async fn refine(
        &self,
        poem: &Poem,
        _constraints: &Constraints,
        quality: &Quality,
        env: &NodeEnv,
    ) -> Result<RefineOutcome, NodeError> {
        let prompt = env.prompts.format(
            template_ids::DIACRITICS_REFINER,
            &params([
                ("poem", poem.text()),
                ("issues", quality.diacritics.summary.clone()),
            ]),
        )?;
        let reply = env.generate(&prompt).await?;
        Ok(outcome_from_reply(&reply.text, poem))
    }
}
