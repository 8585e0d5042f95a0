mod common;

use std::sync::Arc;

use common::{fixtures, test_env};
use qasida::config::{NodeSpec, PipelineConfig};
use qasida::llm::MockLlm;
use qasida::pipeline::context::keys;
use qasida::pipeline::{PipelineContext, PipelineNode};
use qasida::poem::{DimensionResult, Quality};
use qasida::refinement::{RefinementReport, RefinerChain};
use serde_json::json;

fn rhyme_only_chain(max_iterations: u32) -> RefinerChain {
    let spec = NodeSpec::new("refiner_chain").with_params(json!({
        "refiners": ["rhyme_refiner"],
        "max_iterations": max_iterations,
        "target_quality": 0.9,
    }));
    RefinerChain::from_spec(&spec, &PipelineConfig::default()).unwrap()
}

fn context_with_poem(poem: &qasida::poem::Poem) -> PipelineContext {
    let mut ctx = PipelineContext::new();
    ctx.insert(
        keys::CONSTRAINTS,
        serde_json::to_value(&poem.constraints).unwrap(),
    );
    ctx.insert(keys::POEM, serde_json::to_value(poem).unwrap());
    ctx
}

fn report_of(output: &qasida::pipeline::NodeOutput) -> RefinementReport {
    serde_json::from_value(output.get(keys::REFINEMENT).unwrap().clone()).unwrap()
}

fn acceptable_quality(baits: usize) -> Quality {
    Quality {
        overall_score: 1.0,
        total_baits: baits,
        prosody: DimensionResult::valid("ok"),
        rhyme: DimensionResult::valid("ok"),
        line_count: DimensionResult::valid("ok"),
        diacritics: DimensionResult::valid("ok"),
        issues: Vec::new(),
        recommendations: Vec::new(),
        is_acceptable: true,
    }
}

#[tokio::test]
async fn rhyme_refinement_converges() {
    let fixed_poem = [
        "جَدَّدْتُ فِي دَرْبِ الغَرَامِ تَأَلُّقِي",
        "وَمَضَيْتُ نَحْوَ البَدْرِ أَسْأَلُ عَنْ لِقِي",
        "وَالقَلْبُ يَخْفِقُ وَالمَدَامِعُ تَلْتَقِي",
        "وَأَنَا عَلَى عَهْدِ المَحَبَّةِ أَرْتَقِي",
    ]
    .join("\n");

    let llm = Arc::new(MockLlm::scripted([
        // entry evaluation: two baits break the rhyme
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_invalid(&[1, 2]),
        // the refiner's rewrite
        fixed_poem,
        // partial re-evaluation of the affected dimensions (rhyme, diacritics)
        fixtures::rhyme_valid(),
        fixtures::diacritics_ok(),
    ]));
    let (env, _execution) = test_env(Arc::clone(&llm));

    let chain = rhyme_only_chain(3);
    let ctx = context_with_poem(&fixtures::sample_poem());
    let output = chain.run(&ctx, &env).await.unwrap();

    let report = report_of(&output);
    assert_eq!(report.iterations, 1);
    assert!(!report.stalled);
    assert_eq!(report.refiners_ran, vec!["rhyme_refiner"]);
    assert!(report
        .history
        .iter()
        .any(|s| s.refiner_name == "rhyme_refiner" && s.delta > 0.0));

    let quality: Quality =
        serde_json::from_value(output.get(keys::EVALUATION).unwrap().clone()).unwrap();
    assert!(quality.rhyme.is_valid);
    // never worse than the 0.7 the poem came in with
    assert!(quality.overall_score >= 0.7);
}

#[tokio::test]
async fn degrading_refiner_output_is_discarded() {
    let worse_poem = "شطر بلا قافية\nشطر آخر بلا وزن\nثالث مكسور\nرابع تائه";
    let llm = Arc::new(MockLlm::scripted([
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_invalid(&[1, 2]),
        worse_poem.to_string(),
        // re-evaluation says the rewrite is worse on both affected dimensions
        fixtures::rhyme_invalid(&[1, 2]),
        fixtures::diacritics_bad(),
    ]));
    let (env, _execution) = test_env(llm);

    let chain = rhyme_only_chain(3);
    let input_poem = fixtures::sample_poem();
    let ctx = context_with_poem(&input_poem);
    let output = chain.run(&ctx, &env).await.unwrap();

    let report = report_of(&output);
    let step = report
        .history
        .iter()
        .find(|s| s.refiner_name == "rhyme_refiner")
        .unwrap();
    assert!(step.discarded);
    assert!(step.score_after < step.score_before);

    // the chain's output poem equals its input poem
    let poem: qasida::poem::Poem =
        serde_json::from_value(output.get(keys::POEM).unwrap().clone()).unwrap();
    assert_eq!(poem.verses, input_poem.verses);
    assert!(report.stalled);
}

#[tokio::test]
async fn acceptable_poem_passes_through_untouched() {
    // any LLM call would consume a reply and shift the cycle; an empty probe
    // script means a call shows up as a call_count change
    let llm = Arc::new(MockLlm::scripted(["unused"]));
    let (env, _execution) = test_env(Arc::clone(&llm));

    let poem = fixtures::sample_poem().with_quality(acceptable_quality(2));
    let chain = rhyme_only_chain(3);
    let output = chain.run(&context_with_poem(&poem), &env).await.unwrap();

    let report = report_of(&output);
    assert_eq!(report.iterations, 0);
    assert!(report.history.is_empty());
    assert!(report.refiners_ran.is_empty());
    let returned: qasida::poem::Poem =
        serde_json::from_value(output.get(keys::POEM).unwrap().clone()).unwrap();
    assert_eq!(returned.verses, poem.verses);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn zero_iteration_budget_evaluates_once_and_returns() {
    let llm = Arc::new(MockLlm::scripted([
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_invalid(&[1, 2]),
    ]));
    let (env, _execution) = test_env(Arc::clone(&llm));

    let chain = rhyme_only_chain(0);
    let output = chain
        .run(&context_with_poem(&fixtures::sample_poem()), &env)
        .await
        .unwrap();

    let report = report_of(&output);
    assert_eq!(report.iterations, 0);
    assert!(report.history.is_empty());
    // exactly the entry evaluation, nothing more
    assert_eq!(llm.call_count(), 3 + 1);
}

#[tokio::test]
async fn refiner_failure_is_contained() {
    // the refiner's reply is fine, but the partial re-evaluation reply is
    // garbage for rhyme — dimension degrades to a parse_error defect, which
    // still never aborts the chain
    let llm = Arc::new(MockLlm::scripted([
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_invalid(&[1, 2]),
        "إليك القصيدة المحسنة:\nشطر أول جديد\nشطر ثان جديد\nشطر ثالث جديد\nشطر رابع جديد"
            .to_string(),
        "no json here".to_string(),
        fixtures::diacritics_ok(),
    ]));
    let (env, _execution) = test_env(llm);

    let chain = rhyme_only_chain(1);
    let input_poem = fixtures::sample_poem();
    let output = chain.run(&context_with_poem(&input_poem), &env).await.unwrap();

    // the parse_error defect scores the rewrite at the same 0.7, which is not
    // a degradation, so the chain accepts it; what matters is that the run
    // finished and recorded the step
    let report = report_of(&output);
    assert_eq!(report.history.len(), 1);
    assert!(!report.history[0].failed);
    let quality: Quality =
        serde_json::from_value(output.get(keys::EVALUATION).unwrap().clone()).unwrap();
    assert!(quality.overall_score >= 0.0);
}

#[tokio::test]
async fn refinement_history_is_recorded_per_iteration() {
    // two iterations: the first rewrite changes the poem without fixing the
    // rhyme, the second fixes it completely
    let llm = Arc::new(MockLlm::scripted([
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_invalid(&[1, 2]),
        "أول تحسين:\nشطر\nشطر معدل\nشطر آخر\nشطر رابع".to_string(),
        fixtures::rhyme_invalid(&[1, 2]),
        fixtures::diacritics_ok(),
        "ثاني تحسين:\nشطر نهائي\nشطر معدل\nشطر آخر\nشطر رابع".to_string(),
        fixtures::rhyme_valid(),
        fixtures::diacritics_ok(),
    ]));
    let (env, _execution) = test_env(llm);

    let chain = rhyme_only_chain(3);
    let output = chain
        .run(&context_with_poem(&fixtures::sample_poem()), &env)
        .await
        .unwrap();

    let report = report_of(&output);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.history.len(), 2);
    assert_eq!(report.history[0].iteration, 1);
    assert_eq!(report.history[1].iteration, 2);
    assert!(report.history[1].score_after > report.history[0].score_after);
}
