//! Prompt templates.
//!
//! The core talks to templates through the [`PromptFormatter`] contract only.
//! [`TemplateSet`] is the in-memory implementation: templates are plain
//! strings with `{key}` placeholders, registered once at startup and immutable
//! afterwards. The default set carries a workable Arabic template for every id
//! the pipeline uses; production deployments overwrite them with curated
//! prompt files.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Template ids the core requires.
///
/// A formatter that cannot serve all of these cannot drive the pipeline.
pub mod template_ids {
    pub const CONSTRAINT_PARSING: &str = "constraint_parsing";
    pub const METER_SELECTION: &str = "meter_selection";
    pub const RHYME_SELECTION: &str = "rhyme_selection";
    pub const POEM_GENERATION: &str = "poem_generation";
    pub const PROSODY_VALIDATION: &str = "prosody_validation";
    pub const RHYME_VALIDATION: &str = "rhyme_validation";
    pub const LINE_COUNT_VALIDATION: &str = "line_count_validation";
    pub const DIACRITICS_VALIDATION: &str = "diacritics_validation";
    pub const PROSODY_REFINER: &str = "prosody_refiner";
    pub const RHYME_REFINER: &str = "rhyme_refiner";
    pub const LINE_COUNT_REFINER: &str = "line_count_refiner";
    pub const DIACRITICS_REFINER: &str = "diacritics_refiner";
    pub const GENERATION_SELECTION: &str = "generation_selection";
    pub const PROSODY_REFINER_SELECTION: &str = "prosody_refiner_selection";
    pub const RHYME_REFINER_SELECTION: &str = "rhyme_refiner_selection";
    pub const HARMONY_STRUCTURED: &str = "harmony_structured";

    /// Every id, for completeness checks.
    pub const ALL: [&str; 16] = [
        CONSTRAINT_PARSING,
        METER_SELECTION,
        RHYME_SELECTION,
        POEM_GENERATION,
        PROSODY_VALIDATION,
        RHYME_VALIDATION,
        LINE_COUNT_VALIDATION,
        DIACRITICS_VALIDATION,
        PROSODY_REFINER,
        RHYME_REFINER,
        LINE_COUNT_REFINER,
        DIACRITICS_REFINER,
        GENERATION_SELECTION,
        PROSODY_REFINER_SELECTION,
        RHYME_REFINER_SELECTION,
        HARMONY_STRUCTURED,
    ];
}

/// Parameter map handed to [`PromptFormatter::format`].
pub type PromptParams = FxHashMap<String, String>;

/// Build a [`PromptParams`] from key/value pairs.
#[must_use]
pub fn params<const N: usize>(pairs: [(&str, String); N]) -> PromptParams {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Errors from prompt formatting.
#[derive(Debug, Error, Diagnostic)]
pub enum PromptError {
    #[error("unknown prompt template `{id}`")]
    #[diagnostic(
        code(qasida::prompts::unknown_template),
        help("Register the template on the TemplateSet before building the pipeline.")
    )]
    UnknownTemplate { id: String },

    #[error("template `{id}` references `{{{key}}}` but no such parameter was supplied")]
    #[diagnostic(code(qasida::prompts::missing_param))]
    MissingParam { id: String, key: String },
}

/// `format(template_id, params) → string`, the only surface the core sees.
pub trait PromptFormatter: Send + Sync {
    fn format(&self, template_id: &str, params: &PromptParams) -> Result<String, PromptError>;
}

/// In-memory template registry with `{key}` substitution.
///
/// # Examples
///
/// ```
/// use qasida::prompts::{params, PromptFormatter, TemplateSet};
///
/// let templates = TemplateSet::defaults()
///     .with_template("greeting", "مرحبا يا {name}");
/// let text = templates
///     .format("greeting", &params([("name", "شاعر".to_string())]))
///     .unwrap();
/// assert_eq!(text, "مرحبا يا شاعر");
/// ```
pub struct TemplateSet {
    templates: FxHashMap<String, String>,
}

impl TemplateSet {
    /// An empty set; useful when every template comes from external storage.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            templates: FxHashMap::default(),
        }
    }

    /// The built-in template set covering every required id.
    #[must_use]
    pub fn defaults() -> Self {
        let mut set = Self::empty();
        for (id, body) in default_templates() {
            set.templates.insert(id.to_string(), body.to_string());
        }
        set
    }

    /// Register or overwrite a template.
    #[must_use]
    pub fn with_template(mut self, id: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(id.into(), body.into());
        self
    }

    /// Ids with no registered template, out of the required set.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        template_ids::ALL
            .into_iter()
            .filter(|id| !self.templates.contains_key(*id))
            .collect()
    }
}

impl PromptFormatter for TemplateSet {
    fn format(&self, template_id: &str, params: &PromptParams) -> Result<String, PromptError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| PromptError::UnknownTemplate {
                id: template_id.to_string(),
            })?;

        // Only identifier-shaped `{key}` spans are placeholders; literal JSON
        // braces in the template body pass through untouched.
        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            if let Some(close) = after.find('}') {
                let key = &after[..close];
                if is_placeholder_key(key) {
                    let value = params.get(key).ok_or_else(|| PromptError::MissingParam {
                        id: template_id.to_string(),
                        key: key.to_string(),
                    })?;
                    out.push_str(value);
                    rest = &after[close + 1..];
                    continue;
                }
            }
            out.push('{');
            rest = after;
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn is_placeholder_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Minimal working templates for every required id.
///
/// Kept deliberately terse: they carry the field contracts (expected JSON
/// shapes, placeholder names) but none of the curated literary guidance a
/// production prompt file would.
fn default_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            template_ids::CONSTRAINT_PARSING,
            "حلل طلب المستخدم التالي واستخرج قيود القصيدة.\n\
             الطلب: {user_prompt}\n\
             أجب بكائن JSON فقط بالمفاتيح: meter, qafiya_letter, qafiya_harakah, \
             line_count, theme, tone, imagery, keywords, ambiguities.",
        ),
        (
            template_ids::METER_SELECTION,
            "اختر البحر الأنسب للقصيدة.\n\
             الطلب الأصلي: {original_prompt}\n\
             البحر الحالي: {current_meter}\n\
             الموضوع: {theme}\n\
             النغمة: {tone}\n\
             البحور المرشحة:\n{available_meters}\n\
             أجب بكائن JSON: {\"meter_name\": \"…\"}",
        ),
        (
            template_ids::RHYME_SELECTION,
            "اختر القافية المناسبة للقصيدة.\n\
             الطلب الأصلي: {original_prompt}\n\
             الموضوع: {theme}\n\
             المكونات الناقصة: {missing_components}\n\
             أجب بكائن JSON: {\"qafiya_letter\": \"…\", \"qafiya_harakah\": \"…\", \"qafiya_type\": \"…\"}",
        ),
        (
            template_ids::POEM_GENERATION,
            "اكتب قصيدة عربية فصيحة مشكولة بالكامل.\n\
             البحر: {meter}\n\
             التفعيلات: {meter_feet}\n\
             القافية: حرف {qafiya_letter} بحركة {qafiya_harakah}\n\
             عدد الأبيات: {line_count} (أي {total_hemistichs} شطرا)\n\
             الموضوع: {theme}\n\
             النغمة: {tone}\n\
             الصور: {imagery}\n\
             الكلمات المفتاحية: {keywords}\n\
             اكتب كل شطر في سطر مستقل دون أي تعليق.",
        ),
        (
            template_ids::PROSODY_VALIDATION,
            "تحقق من وزن البيت التالي.\n\
             البيت: {bait}\n\
             البحر: {meter}\n\
             الأنماط المرجعية الصحيحة: {reference_patterns}\n\
             الزحافات والعلل الجائزة: {allowed_zihafs}\n\
             أجب بكائن JSON: {\"is_valid\": bool, \"pattern\": \"…\", \"error_details\": \"…\"}",
        ),
        (
            template_ids::RHYME_VALIDATION,
            "تحقق من التزام القصيدة بالقافية.\n\
             حرف الروي المطلوب: {qafiya_letter}\n\
             الحركة المطلوبة: {qafiya_harakah}\n\
             أواخر الأعجاز:\n{line_endings}\n\
             أجب بكائن JSON: {\"invalid_baits\": [أرقام الأبيات المخالفة بدءا من 1]}",
        ),
        (
            template_ids::LINE_COUNT_VALIDATION,
            "تحقق من عدد الأبيات: المطلوب {expected} بيتا والموجود {actual} شطرا.\n\
             أجب بكائن JSON: {\"is_valid\": bool}",
        ),
        (
            template_ids::DIACRITICS_VALIDATION,
            "تحقق من اكتمال التشكيل في الأبيات التالية:\n{verses}\n\
             أجب بكائن JSON: {\"is_valid\": bool, \"missing_positions\": [\"…\"]}",
        ),
        (
            template_ids::PROSODY_REFINER,
            "صحح وزن القصيدة التالية دون تغيير معناها.\n\
             القصيدة:\n{poem}\n\
             البحر: {meter}\n\
             التفعيلات: {meter_feet}\n\
             الأبيات المكسورة: {broken_baits}\n\
             تفاصيل الكسر: {issues}\n\
             أعد كتابة القصيدة كاملة، كل شطر في سطر.",
        ),
        (
            template_ids::RHYME_REFINER,
            "صحح قافية القصيدة التالية.\n\
             القصيدة:\n{poem}\n\
             حرف الروي: {qafiya_letter}\n\
             الحركة: {qafiya_harakah}\n\
             الأبيات المخالفة: {broken_baits}\n\
             أعد كتابة القصيدة كاملة، كل شطر في سطر.",
        ),
        (
            template_ids::LINE_COUNT_REFINER,
            "عدل القصيدة التالية لتصبح {expected} بيتا بالضبط ({total_hemistichs} شطرا).\n\
             القصيدة:\n{poem}\n\
             أعد كتابة القصيدة كاملة، كل شطر في سطر.",
        ),
        (
            template_ids::DIACRITICS_REFINER,
            "أكمل تشكيل القصيدة التالية تشكيلا تاما دون تغيير كلماتها.\n\
             القصيدة:\n{poem}\n\
             المواضع الناقصة: {issues}\n\
             أعد كتابة القصيدة كاملة، كل شطر في سطر.",
        ),
        (
            template_ids::GENERATION_SELECTION,
            "قارن بين المسودات التالية لقصيدة واحدة واختر أفضلها.\n\
             البحر: {meter}\n\
             القافية: {qafiya}\n\
             عدد الأبيات: {line_count}\n\
             الموضوع: {theme}\n\
             المسودات:\n{candidates}\n\
             أجب بكائن JSON: {\"selected_candidate\": رقم يبدأ من 0, \"reasoning\": \"…\"}",
        ),
        (
            template_ids::PROSODY_REFINER_SELECTION,
            "اختر من المسودات التالية أسلمها وزنا على {meter}.\n\
             القصيدة الأصلية:\n{original_poem}\n\
             المسودات:\n{candidates}\n\
             أجب بكائن JSON: {\"selected_candidate\": رقم يبدأ من 0}",
        ),
        (
            template_ids::RHYME_REFINER_SELECTION,
            "اختر من المسودات التالية أسلمها قافية (الروي {qafiya}).\n\
             القصيدة الأصلية:\n{original_poem}\n\
             المسودات:\n{candidates}\n\
             أجب بكائن JSON: {\"selected_candidate\": رقم يبدأ من 0}",
        ),
        (
            template_ids::HARMONY_STRUCTURED,
            "You are reconstructing the reasoning behind a poetry-generation \
             pipeline run as a training dialogue.\n\
             User prompt: {user_prompt}\n\
             Initial constraints: {initial_constraints}\n\
             Pipeline steps, in order:\n{call_summaries}\n\
             Final poem:\n{final_poem}\n\
             Final quality: {final_quality}\n\
             Reply with a single JSON object: {\"system_message\": {…}, \
             \"developer_message\": {…}, \"messages\": [{\"role\": \"…\", \
             \"channel\": \"analysis|commentary|final\", \"content\": \"…\"}]}.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_required_id() {
        assert!(TemplateSet::defaults().missing_required().is_empty());
    }

    #[test]
    fn substitution_replaces_all_placeholders() {
        let set = TemplateSet::empty().with_template("t", "{a} و {b} و {a}");
        let out = set
            .format("t", &params([("a", "أ".to_string()), ("b", "ب".to_string())]))
            .unwrap();
        assert_eq!(out, "أ و ب و أ");
    }

    #[test]
    fn missing_param_is_reported_by_key() {
        let set = TemplateSet::empty().with_template("t", "needs {missing}");
        let err = set.format("t", &params([])).unwrap_err();
        match err {
            PromptError::MissingParam { key, .. } => assert_eq!(key, "missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_template_is_an_error() {
        let err = TemplateSet::empty().format("nope", &params([])).unwrap_err();
        assert!(matches!(err, PromptError::UnknownTemplate { .. }));
    }

    #[test]
    fn literal_json_braces_pass_through() {
        let set = TemplateSet::empty()
            .with_template("t", "أجب بكائن JSON: {\"is_valid\": bool, \"x\": {value}}");
        let out = set.format("t", &params([("value", "1".to_string())])).unwrap();
        assert_eq!(out, "أجب بكائن JSON: {\"is_valid\": bool, \"x\": 1}");
    }

    #[test]
    fn default_templates_format_with_expected_params() {
        let set = TemplateSet::defaults();
        let out = set
            .format(
                template_ids::LINE_COUNT_VALIDATION,
                &params([("expected", "2".to_string()), ("actual", "4".to_string())]),
            )
            .unwrap();
        assert!(out.contains('2'));
        assert!(out.contains("is_valid"));
    }
}
