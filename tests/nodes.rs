mod common;

use std::sync::Arc;

use common::{fixtures, test_env};
use qasida::constraints::Constraints;
use qasida::llm::MockLlm;
use qasida::nodes::{ConstraintParser, MeterResolver, PoemGenerator, RhymeResolver};
use qasida::pipeline::context::keys;
use qasida::pipeline::{NodeError, PipelineContext, PipelineNode};
use qasida::poem::Poem;

fn context_with(constraints: &Constraints) -> PipelineContext {
    let mut ctx = PipelineContext::from_user_prompt(&constraints.original_prompt);
    ctx.insert(
        keys::CONSTRAINTS,
        serde_json::to_value(constraints).unwrap(),
    );
    ctx
}

fn constraints_of(output: &qasida::pipeline::NodeOutput) -> Constraints {
    serde_json::from_value(output.get(keys::CONSTRAINTS).unwrap().clone()).unwrap()
}

#[tokio::test]
async fn parser_tolerates_prose_and_fences() {
    let llm = Arc::new(MockLlm::scripted([format!(
        "بالتأكيد، هذه هي القيود:\n```json\n{}\n```\nوفقك الله.",
        fixtures::parser_reply()
    )]));
    let (env, _execution) = test_env(llm);

    let ctx = PipelineContext::from_user_prompt("اكتب بيتين في الحب على بحر الكامل قافية القاف");
    let output = ConstraintParser::new().run(&ctx, &env).await.unwrap();
    let constraints = constraints_of(&output);
    assert_eq!(constraints.meter.as_deref(), Some("بحر الكامل"));
    assert_eq!(constraints.rhyme_letter, Some('ق'));
    assert_eq!(constraints.line_count, Some(2));
    assert_eq!(
        constraints.original_prompt,
        "اكتب بيتين في الحب على بحر الكامل قافية القاف"
    );
}

#[tokio::test]
async fn parser_rejects_reply_without_any_constraint() {
    let llm = Arc::new(MockLlm::scripted([r#"{"something_else": true}"#]));
    let (env, _execution) = test_env(llm);

    let ctx = PipelineContext::from_user_prompt("اكتب شعرا");
    let err = ConstraintParser::new().run(&ctx, &env).await.unwrap_err();
    assert!(matches!(err, NodeError::Parse(_)));
}

#[tokio::test]
async fn meter_resolver_is_idempotent_on_canonical_input() {
    // an empty script: any LLM call would fail the test via call_count
    let llm = Arc::new(MockLlm::scripted(["unused"]));
    let (env, _execution) = test_env(Arc::clone(&llm));

    let resolved = fixtures::ready_constraints();
    let output = MeterResolver::new()
        .run(&context_with(&resolved), &env)
        .await
        .unwrap();
    let first = constraints_of(&output);
    assert_eq!(first, resolved);
    assert_eq!(llm.call_count(), 0);

    // run the resolver again over its own output
    let output = MeterResolver::new()
        .run(&context_with(&first), &env)
        .await
        .unwrap();
    assert_eq!(constraints_of(&output), first);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn meter_resolver_attaches_feet_for_short_names() {
    let llm = Arc::new(MockLlm::scripted(["unused"]));
    let (env, _execution) = test_env(llm);

    let constraints = Constraints::builder("p").meter("الكامل").build();
    let output = MeterResolver::new()
        .run(&context_with(&constraints), &env)
        .await
        .unwrap();
    let resolved = constraints_of(&output);
    assert_eq!(resolved.meter.as_deref(), Some("بحر الكامل"));
    assert_eq!(resolved.meter_feet, vec!["متفاعلن"; 3]);
}

#[tokio::test]
async fn rhyme_resolver_passes_through_complete_specification() {
    let llm = Arc::new(MockLlm::scripted(["unused"]));
    let (env, _execution) = test_env(Arc::clone(&llm));

    let complete = fixtures::ready_constraints();
    let complete = Constraints {
        rhyme_type: Some(qasida::constraints::RhymeType::Mutawatir),
        ..complete
    };
    let output = RhymeResolver::new()
        .run(&context_with(&complete), &env)
        .await
        .unwrap();
    assert_eq!(constraints_of(&output), complete);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn rhyme_resolver_normalizes_hamza_carriers() {
    let llm = Arc::new(MockLlm::scripted([fixtures::rhyme_reply()]));
    let (env, _execution) = test_env(llm);

    let constraints = Constraints::builder("p").rhyme_letter('ؤ').build();
    let output = RhymeResolver::new()
        .run(&context_with(&constraints), &env)
        .await
        .unwrap();
    assert_eq!(constraints_of(&output).rhyme_letter, Some('ء'));
}

#[tokio::test]
async fn rhyme_resolver_rejects_non_arabic_letter() {
    let llm = Arc::new(MockLlm::scripted(["unused"]));
    let (env, _execution) = test_env(llm);

    let constraints = Constraints::builder("p").rhyme_letter('x').build();
    let err = RhymeResolver::new()
        .run(&context_with(&constraints), &env)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Rhyme(_)));
}

#[tokio::test]
async fn generator_defaults_to_two_baits() {
    let llm = Arc::new(MockLlm::scripted([fixtures::generation_reply()]));
    let (env, _execution) = test_env(llm);

    let mut constraints = fixtures::ready_constraints();
    constraints.line_count = None;
    let output = PoemGenerator::new()
        .run(&context_with(&constraints), &env)
        .await
        .unwrap();
    let poem: Poem = serde_json::from_value(output.get(keys::POEM).unwrap().clone()).unwrap();
    assert_eq!(poem.constraints.line_count, Some(2));
    assert_eq!(poem.verses.len(), 4);
    assert_eq!(poem.provider, "mock");
}

#[tokio::test]
async fn generator_requires_resolved_constraints() {
    let llm = Arc::new(MockLlm::scripted(["unused"]));
    let (env, _execution) = test_env(llm);

    let bare = Constraints::builder("p").build();
    let err = PoemGenerator::new()
        .run(&context_with(&bare), &env)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Validation { .. }));
}
