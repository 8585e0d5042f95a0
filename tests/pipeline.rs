mod common;

use std::sync::Arc;

use common::fixtures;
use qasida::capture::ExecutionStatus;
use qasida::config::{NodeSpec, PipelineConfig};
use qasida::control::CancelToken;
use qasida::llm::MockLlm;
use qasida::meters::MeterCatalog;
use qasida::pipeline::context::keys;
use qasida::pipeline::{PipelineEngine, PipelineError};
use qasida::prompts::TemplateSet;

fn generation_pipeline() -> Vec<NodeSpec> {
    vec![
        NodeSpec::new("constraint_parser"),
        NodeSpec::new("meter_resolver"),
        NodeSpec::new("rhyme_resolver"),
        NodeSpec::new("generator"),
        NodeSpec::new("evaluator"),
    ]
}

fn engine_with(llm: Arc<MockLlm>, pipeline: Vec<NodeSpec>) -> PipelineEngine {
    let config = Arc::new(PipelineConfig {
        pipeline,
        ..Default::default()
    });
    PipelineEngine::from_config(
        config,
        llm,
        Arc::new(TemplateSet::defaults()),
        Arc::new(MeterCatalog::classical()),
    )
    .unwrap()
}

#[tokio::test]
async fn simple_generation_end_to_end() {
    // parser, rhyme resolver, generator, then the four-dimension evaluation
    // of a two-bait poem (diacritics, prosody ×2, rhyme)
    let llm = Arc::new(MockLlm::scripted([
        fixtures::parser_reply(),
        fixtures::rhyme_reply(),
        fixtures::generation_reply(),
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_valid(),
    ]));
    let engine = engine_with(Arc::clone(&llm), generation_pipeline());

    let outcome = engine
        .run_prompt(
            "اكتب بيتين في الحب على بحر الكامل قافية القاف",
            CancelToken::never(),
        )
        .await
        .unwrap();

    let poem = outcome.poem().unwrap();
    assert_eq!(poem.verses.len(), 4);
    let quality = poem.quality.as_ref().unwrap();
    assert_eq!(quality.total_baits, 2);
    assert!(quality.is_acceptable);

    let constraints = outcome.context.constraints().unwrap();
    assert_eq!(constraints.meter.as_deref(), Some("بحر الكامل"));
    assert_eq!(constraints.rhyme_letter, Some('ق'));
    assert!(!constraints.meter_feet.is_empty());

    // every node appears in the captured execution
    let record = outcome.execution.snapshot();
    assert_eq!(record.status, ExecutionStatus::Completed);
    for component in [
        "constraint_parser",
        "meter_resolver",
        "rhyme_resolver",
        "generator",
        "evaluator",
    ] {
        assert!(
            record.calls.iter().any(|c| c.component_name == component),
            "missing captured call for {component}"
        );
    }
    // the meter resolver recognized the meter without an LLM call
    assert_eq!(llm.call_count(), 7);
}

#[tokio::test]
async fn parse_failure_terminates_with_partial_context() {
    let llm = Arc::new(MockLlm::scripted(["this reply has no json at all"]));
    let engine = engine_with(llm, generation_pipeline());

    let err = engine.run_prompt("اكتب شعرا", CancelToken::never()).await.unwrap_err();
    assert_eq!(err.kind(), "parse_error");
    let record = err.failure_record();
    assert_eq!(record["node"], "constraint_parser");
    assert_eq!(record["partial_context"]["user_prompt"], "اكتب شعرا");
}

#[tokio::test]
async fn cancellation_before_run_unwinds_cleanly() {
    let llm = Arc::new(MockLlm::scripted(["never used"]));
    let engine = engine_with(Arc::clone(&llm), generation_pipeline());

    let (handle, token) = CancelToken::pair();
    handle.cancel();
    let err = engine.run_prompt("اكتب شعرا", token).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { .. }));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn invalid_meter_is_recovered_through_the_llm() {
    // parser returns an unknown meter; the resolver asks the LLM and gets a
    // canonical replacement
    let llm = Arc::new(MockLlm::scripted([
        r#"{"meter": "بحر غير موجود", "qafiya_letter": "ق", "line_count": 2, "theme": "الحب"}"#
            .to_string(),
        r#"{"meter_name": "بحر الكامل"}"#.to_string(),
        fixtures::rhyme_reply(),
        fixtures::generation_reply(),
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_valid(),
    ]));
    let engine = engine_with(llm, generation_pipeline());

    let outcome = engine
        .run_prompt("اكتب بيتين على بحر غير موجود", CancelToken::never())
        .await
        .unwrap();
    let constraints = outcome.context.constraints().unwrap();
    assert_eq!(constraints.meter.as_deref(), Some("بحر الكامل"));

    // the captured meter-resolution step shows input ≠ output
    let record = outcome.execution.snapshot();
    let resolution = record
        .calls
        .iter()
        .find(|c| c.component_name == "meter_resolver")
        .unwrap();
    assert_eq!(
        resolution.inputs["constraints"]["meter"],
        "بحر غير موجود"
    );
    assert_eq!(resolution.outputs["constraints"]["meter"], "بحر الكامل");
}

#[tokio::test]
async fn line_count_one_yields_two_verses() {
    let llm = Arc::new(MockLlm::scripted([
        r#"{"meter": "بحر الكامل", "qafiya_letter": "ق", "line_count": 1, "theme": "الحب"}"#
            .to_string(),
        fixtures::rhyme_reply(),
        // two hemistichs only
        fixtures::sample_poem().verses[..2].join("\n"),
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_valid(),
    ]));
    let engine = engine_with(llm, generation_pipeline());

    let outcome = engine
        .run_prompt("اكتب بيتا واحدا", CancelToken::never())
        .await
        .unwrap();
    let poem = outcome.poem().unwrap();
    assert_eq!(poem.verses.len(), 2);
    assert_eq!(poem.quality.unwrap().total_baits, 1);
}

#[tokio::test]
async fn node_reports_follow_pipeline_order() {
    let llm = Arc::new(MockLlm::scripted([
        fixtures::parser_reply(),
        fixtures::rhyme_reply(),
        fixtures::generation_reply(),
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_valid(),
    ]));
    let engine = engine_with(llm, generation_pipeline());
    assert_eq!(
        engine.node_names(),
        vec![
            "constraint_parser",
            "meter_resolver",
            "rhyme_resolver",
            "generator",
            "evaluator"
        ]
    );

    let outcome = engine
        .run_prompt("اكتب بيتين", CancelToken::never())
        .await
        .unwrap();
    let names: Vec<&str> = outcome.nodes.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "constraint_parser",
            "meter_resolver",
            "rhyme_resolver",
            "generator",
            "evaluator"
        ]
    );
    assert!(outcome.context.contains_key(keys::EVALUATION));
}

#[tokio::test]
async fn captured_calls_are_in_start_order_with_llm_metadata() {
    let llm = Arc::new(MockLlm::scripted([
        fixtures::parser_reply(),
        fixtures::rhyme_reply(),
        fixtures::generation_reply(),
        fixtures::diacritics_ok(),
        fixtures::prosody_ok(),
        fixtures::prosody_ok(),
        fixtures::rhyme_valid(),
    ]));
    let engine = engine_with(llm, generation_pipeline());
    let outcome = engine
        .run_prompt("اكتب بيتين", CancelToken::never())
        .await
        .unwrap();

    let record = outcome.execution.snapshot();
    for window in record.calls.windows(2) {
        assert!(window[0].timestamp <= window[1].timestamp);
    }
    // every node that spoke to the LLM carries provider, model, and a prompt
    // (a node's record keeps its most recent call; totals count all of them)
    let llm_calls: Vec<_> = record.calls.iter().filter_map(|c| c.llm.as_ref()).collect();
    assert_eq!(llm_calls.len(), 4);
    for info in llm_calls {
        assert_eq!(info.provider, "mock");
        assert_eq!(info.model, "mock-model");
        assert!(!info.prompt.is_empty());
    }
    assert_eq!(record.total_llm_calls, 7);
    assert!(record.total_tokens > 0);
}
