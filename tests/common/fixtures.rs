//! Scripted replies and sample records shared across the suites.

use qasida::constraints::{Constraints, Harakah};
use qasida::poem::Poem;

/// Constraints complete enough for generation.
pub fn ready_constraints() -> Constraints {
    Constraints::builder("اكتب بيتين في الحب على بحر الكامل قافية القاف")
        .meter("بحر الكامل")
        .meter_feet(["متفاعلن", "متفاعلن", "متفاعلن"])
        .rhyme_letter('ق')
        .rhyme_harakah(Harakah::Kasra)
        .line_count(2)
        .theme("الحب")
        .build()
}

/// A two-bait poem carrying the ready constraints.
pub fn sample_poem() -> Poem {
    Poem::new(
        vec![
            "أَهْوَاكَ يَا قَمَرَ اللَّيَالِي مُطْلَقُ".to_string(),
            "وَبِنُورِ وَجْهِكَ يُشْرِقُ الأُفُقُ".to_string(),
            "مَا زِلْتُ أَذْكُرُ وَالمَدَامِعُ تَسْبِقُ".to_string(),
            "عَهْدًا بِقَلْبِي لَا يَزَالُ يُحَلِّقُ".to_string(),
        ],
        "mock",
        "mock-model",
        ready_constraints(),
    )
}

/// Parser reply for the simple-generation scenario.
pub fn parser_reply() -> String {
    r#"{"meter": "بحر الكامل", "qafiya_letter": "ق", "line_count": 2, "theme": "الحب"}"#
        .to_string()
}

/// Rhyme-selection reply filling harakah and type.
pub fn rhyme_reply() -> String {
    r#"{"qafiya_harakah": "kasra", "qafiya_type": "mutawatir"}"#.to_string()
}

/// Generator reply: four hemistichs, rhyme on ق.
pub fn generation_reply() -> String {
    sample_poem().verses.join("\n")
}

pub fn diacritics_ok() -> String {
    r#"{"is_valid": true, "missing_positions": []}"#.to_string()
}

pub fn diacritics_bad() -> String {
    r#"{"is_valid": false, "missing_positions": ["البيت 1"]}"#.to_string()
}

pub fn prosody_ok() -> String {
    r#"{"is_valid": true, "pattern": "متفاعلن متفاعلن متفاعلن"}"#.to_string()
}

pub fn prosody_bad() -> String {
    r#"{"is_valid": false, "pattern": "مستفعلن", "error_details": "كسر في الحشو"}"#.to_string()
}

pub fn rhyme_valid() -> String {
    r#"{"invalid_baits": []}"#.to_string()
}

pub fn rhyme_invalid(baits: &[usize]) -> String {
    format!(
        r#"{{"invalid_baits": [{}]}}"#,
        baits
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Replies for one full evaluation of a two-bait poem, in call order:
/// diacritics, prosody ×2, rhyme.
pub fn full_eval_replies(rhyme: String) -> Vec<String> {
    vec![diacritics_ok(), prosody_ok(), prosody_ok(), rhyme]
}
