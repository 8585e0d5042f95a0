mod common;

use std::sync::Arc;

use common::fixtures;
use qasida::capture::{CallType, ExecutionCapture, PipelineExecution};
use qasida::harmony::{Channel, CompilerError, HarmonyCompiler};
use qasida::llm::MockLlm;
use qasida::poem::{DimensionResult, Quality};
use qasida::prompts::TemplateSet;
use serde_json::json;

fn quality() -> Quality {
    Quality {
        overall_score: 0.92,
        total_baits: 2,
        prosody: DimensionResult::valid("ok"),
        rhyme: DimensionResult::valid("ok"),
        line_count: DimensionResult::valid("ok"),
        diacritics: DimensionResult::valid("ok"),
        issues: Vec::new(),
        recommendations: Vec::new(),
        is_acceptable: true,
    }
}

/// A recorded execution with five captured calls: parse, enrich, generate,
/// evaluate, refine.
fn recorded_execution() -> PipelineExecution {
    let capture = ExecutionCapture::start("اكتب بيتين في الحب", None);
    let scope = capture.root_scope();
    let poem = fixtures::sample_poem();

    let guard = scope.begin("constraint_parser", "run", CallType::Parse, json!({}));
    guard.finish(&json!({"constraints": {"meter": "بحر الكامل", "theme": "الحب"}}));

    let guard = scope.begin("meter_resolver", "run", CallType::Enrich, json!({}));
    guard.finish(&json!({"constraints": {"meter": "بحر الكامل", "line_count": 2}}));

    let guard = scope.begin("generator", "run", CallType::Generate, json!({}));
    guard.finish(&json!({"poem": {"verses": poem.verses}}));

    let guard = scope.begin("evaluator", "evaluate", CallType::Evaluate, json!({}));
    guard.finish(&json!({"overall_score": 0.7, "is_acceptable": false, "issues": ["rhyme"]}));

    let guard = scope.begin(
        "rhyme_refiner",
        "refine",
        CallType::Refine,
        json!({"verses": ["قديم"]}),
    );
    guard.finish(&json!({"verses": poem.verses, "no_change": false}));

    capture.complete(Some(&poem), Some(&quality()));
    capture.snapshot()
}

fn compiler(llm: Arc<MockLlm>) -> HarmonyCompiler {
    HarmonyCompiler::new(llm, Arc::new(TemplateSet::defaults()))
}

fn structured_reply(final_content: &str) -> String {
    let analysis: Vec<serde_json::Value> = (0..5)
        .map(|i| {
            json!({
                "role": "assistant",
                "channel": "analysis",
                "content": format!("خطوة {i}: تحليل المكون")
            })
        })
        .collect();
    let mut messages = analysis;
    messages.push(json!({
        "role": "assistant",
        "channel": "final",
        "content": final_content
    }));
    json!({
        "system_message": {"instructions": "أنت شاعر"},
        "developer_message": {"pipeline": "qasida"},
        "messages": messages
    })
    .to_string()
}

#[tokio::test]
async fn compiles_a_recorded_execution() {
    let execution = recorded_execution();
    let final_content = format!("القصيدة النهائية:\n{}", fixtures::sample_poem().text());
    let llm = Arc::new(MockLlm::scripted([structured_reply(&final_content)]));

    let document = compiler(Arc::clone(&llm)).compile(&execution).await.unwrap();

    assert!(document.system_message.is_object());
    assert!(document.developer_message.is_object());
    assert!(document.on_channel(Channel::Analysis).len() >= 5);
    let finals = document.on_channel(Channel::Final);
    assert_eq!(finals.len(), 1);
    // the final message mentions the poem's verses
    assert!(finals[0].content.contains(&fixtures::sample_poem().verses[0]));

    // the synthesis prompt carried the per-call projections
    let prompt = &llm.prompts()[0];
    assert!(prompt.contains("constraint_parser"));
    assert!(prompt.contains("rhyme_refiner"));
    assert!(prompt.contains("overall_score"));
}

#[tokio::test]
async fn missing_final_message_is_synthesized() {
    let execution = recorded_execution();
    let reply = json!({
        "system_message": {},
        "developer_message": {},
        "messages": [
            {"role": "assistant", "channel": "analysis", "content": "تحليل فقط"}
        ]
    })
    .to_string();
    let llm = Arc::new(MockLlm::scripted([reply]));

    let document = compiler(llm).compile(&execution).await.unwrap();
    let finals = document.on_channel(Channel::Final);
    assert_eq!(finals.len(), 1);
    // synthesized from the final poem and quality
    assert!(finals[0].content.contains(&fixtures::sample_poem().verses[0]));
    assert!(finals[0].content.contains("0.92"));
}

#[tokio::test]
async fn unusable_reply_surfaces_with_raw_attached() {
    let execution = recorded_execution();
    let llm = Arc::new(MockLlm::scripted(["مجرد نثر بلا بنية"]));

    let err = compiler(llm).compile(&execution).await.unwrap_err();
    match err {
        CompilerError::Malformed { raw, .. } => assert!(raw.contains("نثر")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn artifacts_are_written_under_the_execution_id() {
    let execution = recorded_execution();
    let final_content = fixtures::sample_poem().text();
    let llm = Arc::new(MockLlm::scripted([structured_reply(&final_content)]));
    let harmony = compiler(llm);

    let document = harmony.compile(&execution).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (structured_path, dialogue_path) = harmony
        .write_artifacts(&document, &execution, dir.path())
        .unwrap();

    assert!(structured_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_structured.json"));
    assert!(dialogue_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_harmony.txt"));

    let structured = std::fs::read_to_string(&structured_path).unwrap();
    let parsed: qasida::harmony::HarmonyDocument = serde_json::from_str(&structured).unwrap();
    assert_eq!(parsed, document);

    let dialogue = std::fs::read_to_string(&dialogue_path).unwrap();
    assert!(dialogue.contains("<|system|>"));
    assert!(dialogue.contains("<|assistant|final|>"));
}
