mod common;

use std::sync::Arc;

use common::nodes::AlwaysFailingNode;
use common::{fixtures, test_env};
use qasida::llm::MockLlm;
use qasida::nodes::PoemGenerator;
use qasida::pipeline::context::keys;
use qasida::pipeline::{BestOfN, PipelineContext, PipelineNode};
use qasida::poem::Poem;
use qasida::prompts::template_ids;
use serde_json::json;

fn context_with_constraints() -> PipelineContext {
    let mut ctx = PipelineContext::new();
    ctx.insert(
        keys::CONSTRAINTS,
        serde_json::to_value(fixtures::ready_constraints()).unwrap(),
    );
    ctx
}

fn candidate_poem(tag: usize) -> String {
    (0..4)
        .map(|i| format!("مسودة {tag} شطر {i} ينتهي بالحق"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn three_candidates_judge_selects_winner() {
    // three generator calls (any interleaving), then the judge
    let llm = Arc::new(MockLlm::scripted([
        candidate_poem(0),
        candidate_poem(1),
        candidate_poem(2),
        r#"{"selected_candidate": 2, "reasoning": "أسلمها وزنا"}"#.to_string(),
    ]));
    let (env, execution) = test_env(Arc::clone(&llm));

    let wrapper = BestOfN::wrap(
        "best_of_n",
        Arc::new(PoemGenerator::new()),
        3,
        vec![0.5, 0.9, 1.3],
        template_ids::GENERATION_SELECTION,
    );
    let output = wrapper
        .run(&context_with_constraints(), &env)
        .await
        .unwrap();

    // selection metadata points at candidate 2 with its scheduled temperature
    assert_eq!(output.get(keys::CANDIDATE_INDEX), Some(&json!(2)));
    assert_eq!(output.get(keys::CANDIDATE_TEMPERATURE), Some(&json!(1.3)));
    assert_eq!(
        output.get(keys::SELECTION).unwrap()["selected_candidate"],
        json!(2)
    );

    // three generator invocations with distinct temperatures
    let mut temps: Vec<f64> = llm
        .temperatures()
        .iter()
        .take(3)
        .map(|t| t.unwrap())
        .collect();
    temps.sort_by(f64::total_cmp);
    assert_eq!(temps, vec![0.5, 0.9, 1.3]);

    // the final poem equals what candidate 2's generator call produced
    let record = execution.snapshot();
    let candidate_call = record
        .calls
        .iter()
        .find(|c| c.candidate_index == Some(2) && c.llm.is_some())
        .unwrap();
    let poem: Poem = serde_json::from_value(output.get(keys::POEM).unwrap().clone()).unwrap();
    assert_eq!(
        poem.text(),
        candidate_call.llm.as_ref().unwrap().response.as_deref().unwrap()
    );
}

#[tokio::test]
async fn n_equals_one_behaves_like_the_inner_node() {
    let llm = Arc::new(MockLlm::scripted([candidate_poem(0)]));
    let (env, _execution) = test_env(Arc::clone(&llm));

    let wrapper = BestOfN::wrap(
        "best_of_n",
        Arc::new(PoemGenerator::new()),
        1,
        vec![0.7],
        template_ids::GENERATION_SELECTION,
    );
    let output = wrapper
        .run(&context_with_constraints(), &env)
        .await
        .unwrap();

    // exactly one LLM call: the generator; no judge
    assert_eq!(llm.call_count(), 1);
    let poem: Poem = serde_json::from_value(output.get(keys::POEM).unwrap().clone()).unwrap();
    assert_eq!(poem.verses.len(), 4);
    assert_eq!(output.get(keys::CANDIDATE_INDEX), Some(&json!(0)));
}

#[tokio::test]
async fn out_of_range_selection_falls_back_to_first_candidate() {
    let llm = Arc::new(MockLlm::scripted([
        candidate_poem(0),
        candidate_poem(1),
        r#"{"selected_candidate": 9}"#.to_string(),
    ]));
    let (env, _execution) = test_env(llm);

    let wrapper = BestOfN::wrap(
        "best_of_n",
        Arc::new(PoemGenerator::new()),
        2,
        vec![0.5, 0.9],
        template_ids::GENERATION_SELECTION,
    );
    let output = wrapper
        .run(&context_with_constraints(), &env)
        .await
        .unwrap();

    assert_eq!(output.get(keys::CANDIDATE_INDEX), Some(&json!(0)));
    assert_eq!(
        output.get(keys::SELECTION).unwrap()["fallback"],
        json!("out_of_range")
    );
}

#[tokio::test]
async fn all_failed_candidates_leave_context_unchanged() {
    let llm = Arc::new(MockLlm::scripted(["unused"]));
    let (env, _execution) = test_env(Arc::clone(&llm));

    let wrapper = BestOfN::wrap(
        "best_of_n",
        Arc::new(AlwaysFailingNode),
        3,
        vec![0.5, 0.9, 1.3],
        template_ids::GENERATION_SELECTION,
    );
    let output = wrapper
        .run(&context_with_constraints(), &env)
        .await
        .unwrap();

    assert_eq!(output.get(keys::ALL_FAILED), Some(&json!(true)));
    assert!(output.get(keys::POEM).is_none());
    // no judge call was made
    assert_eq!(llm.call_count(), 0);
    // the wrapper's output still validates (the escape hatch)
    assert!(wrapper.validate_output(&output));
}

#[tokio::test]
async fn candidate_calls_are_tagged_in_the_capture() {
    let llm = Arc::new(MockLlm::scripted([
        candidate_poem(0),
        candidate_poem(1),
        r#"{"selected_candidate": 1}"#.to_string(),
    ]));
    let (env, execution) = test_env(llm);

    let wrapper = BestOfN::wrap(
        "best_of_n",
        Arc::new(PoemGenerator::new()),
        2,
        vec![0.5, 0.9],
        template_ids::GENERATION_SELECTION,
    );
    wrapper
        .run(&context_with_constraints(), &env)
        .await
        .unwrap();

    let record = execution.snapshot();
    let tagged: Vec<_> = record
        .calls
        .iter()
        .filter_map(|c| c.candidate_index)
        .collect();
    assert!(tagged.contains(&0));
    assert!(tagged.contains(&1));
    // the selection step appears after every candidate call
    let selection_pos = record
        .calls
        .iter()
        .position(|c| c.method_name == "select_best")
        .unwrap();
    let last_candidate_pos = record
        .calls
        .iter()
        .rposition(|c| c.candidate_index.is_some())
        .unwrap();
    assert!(selection_pos > last_candidate_pos);
}
