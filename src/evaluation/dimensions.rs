//! The four validation dimensions.
//!
//! Line count is deterministic; diacritics, prosody, and rhyme dispatch to
//! the judge LLM with specialized prompts. An unusable judge reply degrades
//! that dimension to a zero-scoring `parse_error` defect instead of failing
//! the evaluation — only transport-level LLM errors propagate.

use serde::Deserialize;
use tracing::debug;

use crate::constraints::Constraints;
use crate::pipeline::node::{NodeEnv, NodeError};
use crate::poem::{BaitResult, DimensionDefect, DimensionResult, Poem};
use crate::prompts::{params, template_ids};
use crate::utils::arabic::last_word;
use crate::utils::json_ext;

/// Cap on enumerated bait indices in summaries; beyond it only counts appear.
const MAX_ENUMERATED_BAITS: usize = 5;

/// Deterministic structural check: even verse count, at least one bait, and
/// agreement with the requested bait count.
#[must_use]
pub fn validate_line_count(poem: &Poem, constraints: &Constraints) -> DimensionResult {
    let verses = poem.verses.len();
    if verses < 2 {
        return DimensionResult::invalid(format!("عدد الأشطر {verses}؛ القصيدة دون بيت كامل"));
    }
    if verses % 2 != 0 {
        return DimensionResult::invalid(format!("عدد الأشطر {verses} فردي؛ شطر بلا عجز"));
    }
    let baits = verses / 2;
    if let Some(expected) = constraints.line_count
        && baits != expected as usize
    {
        return DimensionResult::invalid(format!(
            "عدد الأبيات {baits} والمطلوب {expected}"
        ));
    }
    DimensionResult::valid(format!("{baits} بيتا كما هو مطلوب"))
}

#[derive(Debug, Deserialize)]
struct DiacriticsReply {
    is_valid: bool,
    #[serde(default)]
    missing_positions: Vec<String>,
}

/// Judge-checked full vocalization.
pub async fn validate_diacritics(
    poem: &Poem,
    env: &NodeEnv,
) -> Result<DimensionResult, NodeError> {
    let prompt = env.prompts.format(
        template_ids::DIACRITICS_VALIDATION,
        &params([("verses", poem.text())]),
    )?;
    let reply = env.generate(&prompt).await?;
    match json_ext::parse_reply::<DiacriticsReply>(&reply.text) {
        Ok(verdict) if verdict.is_valid => {
            Ok(DimensionResult::valid("التشكيل مكتمل"))
        }
        Ok(verdict) => Ok(DimensionResult::invalid(format!(
            "مواضع ناقصة التشكيل: {}",
            if verdict.missing_positions.is_empty() {
                "غير محددة".to_string()
            } else {
                verdict.missing_positions.join("، ")
            }
        ))),
        Err(err) => {
            debug!(error = %err, "diacritics judge reply unusable");
            Ok(DimensionResult::defective(
                DimensionDefect::ParseError,
                "تعذر قراءة حكم التشكيل",
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProsodyReply {
    is_valid: bool,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    error_details: Option<String>,
}

/// Judge-checked prosody, one call per bait.
///
/// All valid reference patterns — the base meter rendering and each sub-meter
/// — are passed to the judge, which reports the one the bait matched.
pub async fn validate_prosody(
    poem: &Poem,
    constraints: &Constraints,
    env: &NodeEnv,
) -> Result<DimensionResult, NodeError> {
    let Some(descriptor) = constraints
        .meter
        .as_deref()
        .and_then(|name| env.meters.lookup(name))
    else {
        return Ok(DimensionResult::defective(
            DimensionDefect::BahrUnknown,
            format!(
                "بحر غير معروف: {}",
                constraints.meter.as_deref().unwrap_or("غير محدد")
            ),
        ));
    };

    let mut reference_patterns = vec![descriptor.reference_pattern()];
    reference_patterns.extend(descriptor.sub_meters.iter().cloned());
    let reference_patterns = reference_patterns.join(" | ");
    let allowed_zihafs = {
        let zihafs = descriptor.allowed_zihafs();
        if zihafs.is_empty() {
            "لا شيء".to_string()
        } else {
            zihafs.join("، ")
        }
    };

    let mut baits = Vec::new();
    for (i, (opening, closing)) in poem.baits().enumerate() {
        env.cancel.ensure_active()?;
        let bait_index = i + 1;
        let prompt = env.prompts.format(
            template_ids::PROSODY_VALIDATION,
            &params([
                ("bait", format!("{opening} # {closing}")),
                ("meter", descriptor.name.clone()),
                ("reference_patterns", reference_patterns.clone()),
                ("allowed_zihafs", allowed_zihafs.clone()),
            ]),
        )?;
        let reply = env.generate(&prompt).await?;
        match json_ext::parse_reply::<ProsodyReply>(&reply.text) {
            Ok(verdict) => baits.push(BaitResult {
                bait_index,
                is_valid: verdict.is_valid,
                detail: verdict.error_details.or(verdict.pattern),
            }),
            Err(err) => {
                debug!(bait = bait_index, error = %err, "prosody judge reply unusable");
                return Ok(DimensionResult::defective(
                    DimensionDefect::ParseError,
                    format!("تعذر قراءة حكم العروض للبيت {bait_index}"),
                ));
            }
        }
    }

    Ok(per_bait_result(baits, &descriptor.name, "موزون"))
}

#[derive(Debug, Deserialize)]
struct RhymeReply {
    #[serde(default)]
    invalid_baits: Vec<usize>,
}

/// Judge-checked rhyme discipline over the closing hemistichs.
pub async fn validate_rhyme(
    poem: &Poem,
    constraints: &Constraints,
    env: &NodeEnv,
) -> Result<DimensionResult, NodeError> {
    let Some(letter) = constraints.rhyme_letter else {
        return Ok(DimensionResult::valid("لا قافية مطلوبة للتحقق"));
    };

    let line_endings = poem
        .baits()
        .enumerate()
        .map(|(i, (_, closing))| {
            format!("{}. {}", i + 1, last_word(closing).unwrap_or(closing))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = env.prompts.format(
        template_ids::RHYME_VALIDATION,
        &params([
            ("qafiya_letter", letter.to_string()),
            (
                "qafiya_harakah",
                constraints
                    .rhyme_harakah
                    .map(|h| h.arabic_name().to_string())
                    .unwrap_or_else(|| "غير محددة".to_string()),
            ),
            ("line_endings", line_endings),
        ]),
    )?;
    let reply = env.generate(&prompt).await?;

    match json_ext::parse_reply::<RhymeReply>(&reply.text) {
        Ok(verdict) => {
            let total = poem.bait_count();
            let baits = (1..=total)
                .map(|bait_index| BaitResult {
                    bait_index,
                    is_valid: !verdict.invalid_baits.contains(&bait_index),
                    detail: None,
                })
                .collect();
            Ok(per_bait_result(baits, &letter.to_string(), "على القافية"))
        }
        Err(err) => {
            debug!(error = %err, "rhyme judge reply unusable");
            Ok(DimensionResult::defective(
                DimensionDefect::ParseError,
                "تعذر قراءة حكم القافية",
            ))
        }
    }
}

/// Assemble a per-bait dimension result with the standard summary shape:
/// all-valid, a short enumeration of offenders, or an offender count.
fn per_bait_result(baits: Vec<BaitResult>, subject: &str, ok_word: &str) -> DimensionResult {
    let invalid: Vec<usize> = baits
        .iter()
        .filter(|b| !b.is_valid)
        .map(|b| b.bait_index)
        .collect();
    let is_valid = invalid.is_empty();
    let summary = if is_valid {
        format!("جميع الأبيات {ok_word} ({subject})")
    } else if invalid.len() < MAX_ENUMERATED_BAITS {
        format!(
            "أبيات مخالفة ({subject}): {}",
            invalid
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("، ")
        )
    } else {
        format!("{} بيتا مخالفا ({subject})", invalid.len())
    };
    DimensionResult {
        is_valid,
        baits,
        summary,
        defect: None,
    }
}
