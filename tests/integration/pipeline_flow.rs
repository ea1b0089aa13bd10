//! End-to-end pipelines over the scripted port

use super::test_utils::{evaluation_contract, invoker, report_contract, summary_contract};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use temper::cancel::CancelSignal;
use temper::config::TemperConfig;
use temper::error::OrchestrationError;
use temper::pipeline::{FanOutSpec, PipelineOrchestrator, Stage, StageOutput};
use temper::provider::ScriptedPort;
use temper::refine::LoopConfig;
use temper::request::{Context, Step};
use temper::scenarios::{
    AdCreative, QualityReport, ScenarioKind, AD_CREATIVE, AD_EVALUATION, BENEFIT_LIST,
    OFFER_RESULT, QUALITY_REPORT,
};

fn ad_port(scores: &'static [i64]) -> Arc<ScriptedPort> {
    let evaluations = Arc::new(AtomicU32::new(0));
    Arc::new(
        ScriptedPort::new()
            .reply(
                BENEFIT_LIST,
                [json!({"consumer_benefits": ["saves money", "peace of mind", "looks great"]})],
            )
            .reply(
                AD_CREATIVE,
                [json!({
                    "hypothesis": "Night owls value light",
                    "headline": "Light that pays for itself",
                    "body_copy": "Charge by day, glow all night."
                })],
            )
            .respond_with(AD_EVALUATION, move |_| {
                let n = evaluations.fetch_add(1, Ordering::SeqCst) as usize;
                let score = scores[n.min(scores.len() - 1)];
                Ok(json!({"evaluation": "tighten the headline", "score": score}).into())
            }),
    )
}

#[tokio::test]
async fn test_ad_campaign_runs_benefits_then_refines_creative() {
    let port = ad_port(&[4, 6, 9]);
    let pipeline = ScenarioKind::AdCampaign.build(invoker(&port, 3)).unwrap();

    let result = pipeline
        .run(Context::new().with("product_or_service_description", "A solar-powered lantern"))
        .await
        .unwrap();

    assert_eq!(result.stages.len(), 2);
    assert_eq!(
        result.context.get_path("benefits.consumer_benefits.0"),
        Some(&json!("saves money"))
    );

    match result.final_output() {
        Some(StageOutput::Refined(state)) => {
            assert!(state.accepted);
            assert_eq!(state.iterations, 3);
        }
        other => panic!("expected refined output, got {:?}", other),
    }
    let creative: AdCreative = serde_json::from_value(result.final_value()).unwrap();
    assert_eq!(creative.headline, "Light that pays for itself");

    // The creative stage sees the benefits selected from the first stage.
    let creative_request = &port.requests_for(AD_CREATIVE)[0];
    assert!(creative_request.instructions.contains("A solar-powered lantern"));
    assert!(creative_request.instructions.contains("peace of mind"));
    let evaluation_request = &port.requests_for(AD_EVALUATION)[0];
    assert!(evaluation_request.instructions.contains("Light that pays for itself"));
}

#[tokio::test]
async fn test_unaccepted_refine_stage_fails_the_pipeline() {
    let port = ad_port(&[3, 5, 4, 2]);
    let pipeline = ScenarioKind::AdCampaign.build(invoker(&port, 3)).unwrap();

    let err = pipeline
        .run(Context::new().with("product_or_service_description", "A kettle"))
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some("creative"));
    match err.root_cause() {
        OrchestrationError::LoopExhausted { state } => {
            assert_eq!(state.iterations, 4);
            assert_eq!(state.best_score(), Some(5.0));
        }
        other => panic!("expected exhausted loop, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_input_fails_before_any_call() {
    let port = ad_port(&[9]);
    let pipeline = ScenarioKind::AdCampaign.build(invoker(&port, 3)).unwrap();

    let err = pipeline.run(Context::new()).await.unwrap_err();

    assert_eq!(err.failed_stage(), None);
    assert!(matches!(err, OrchestrationError::Input(_)));
    assert_eq!(port.calls(), 0);
}

#[tokio::test]
async fn test_whole_context_stage_rejects_missing_inputs() {
    let port = Arc::new(ScriptedPort::new().reply(
        OFFER_RESULT,
        [json!({
            "core_offer": "x",
            "bonuses": [],
            "scarcity": "x",
            "guarantee": "x",
            "pricing_strategy": "x",
            "messaging": "x"
        })],
    ));
    let pipeline = ScenarioKind::Offer.build(invoker(&port, 2)).unwrap();

    let err = pipeline
        .run(Context::new().with("core_idea", "Online coaching"))
        .await
        .unwrap_err();

    match &err {
        OrchestrationError::Input(message) => {
            assert!(message.contains("dream_outcome"));
            assert!(message.contains("proof_of_success"));
        }
        other => panic!("expected input error, got {:?}", other),
    }
    assert_eq!(port.calls(), 0);
}

fn quality_port() -> Arc<ScriptedPort> {
    Arc::new(ScriptedPort::new().respond_with(QUALITY_REPORT, |request| {
        let name = request.context.get("dataset").cloned().unwrap_or(Value::Null);
        if name == json!("corrupt") {
            Ok(json!({"dataset_name": name, "issues_found": "everything"}).into())
        } else {
            Ok(json!({"dataset_name": name, "issues_found": ["duplicate rows"]}).into())
        }
    }))
}

#[tokio::test]
async fn test_dataset_quality_fans_out_per_dataset() {
    let port = quality_port();
    let pipeline = ScenarioKind::DatasetQuality.build(invoker(&port, 3)).unwrap();

    let result = pipeline
        .run(Context::new().with("datasets", json!(["sales", "inventory", "hr"])))
        .await
        .unwrap();

    let reports: Vec<QualityReport> = serde_json::from_value(result.final_value()).unwrap();
    let names: Vec<&str> = reports.iter().map(|r| r.dataset_name.as_str()).collect();
    assert_eq!(names, vec!["sales", "inventory", "hr"]);
    assert_eq!(port.calls(), 3);
}

#[tokio::test]
async fn test_failing_batch_item_fails_strict_stage() {
    let port = quality_port();
    let pipeline = ScenarioKind::DatasetQuality.build(invoker(&port, 2)).unwrap();

    let err = pipeline
        .run(Context::new().with("datasets", json!(["sales", "corrupt", "hr"])))
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some("reports"));
    match err.root_cause() {
        OrchestrationError::BatchFailed { total, failures } => {
            assert_eq!(*total, 3);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, 1);
        }
        other => panic!("expected batch failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_declared_pipeline_tolerates_failed_items() {
    let config: TemperConfig = toml::from_str(
        r#"
[[pipelines.tolerant.stages]]
name = "reports"
instructions = "Analyze the dataset '{dataset}'"
contract = "quality_report"
[pipelines.tolerant.stages.fan_out]
collection = "datasets"
item_key = "dataset"
max_concurrency = 2
tolerate_failures = true

[[pipelines.tolerant.stages]]
name = "summary"
instructions = "Summarize {reports}"
contract = "summary"

[contracts.summary]
fields = [{ name = "text", type = "string" }]
"#,
    )
    .unwrap();
    assert!(config.validate().is_ok());

    let port = Arc::new(
        ScriptedPort::new()
            .respond_with(QUALITY_REPORT, |request| {
                let name = request.context.get("dataset").cloned().unwrap_or(Value::Null);
                if name == json!("corrupt") {
                    Ok(json!({"dataset_name": name}).into())
                } else {
                    Ok(json!({"dataset_name": name, "issues_found": []}).into())
                }
            })
            .reply("summary", [json!({"text": "one dataset could not be analyzed"})]),
    );
    let pipeline = config
        .pipeline("tolerant")
        .unwrap()
        .build("tolerant", &config.catalog().unwrap(), invoker(&port, 2))
        .unwrap();

    let result = pipeline
        .run(Context::new().with("datasets", json!(["sales", "corrupt"])))
        .await
        .unwrap();

    let reports = result.context.get("reports").unwrap();
    assert_eq!(reports[0]["dataset_name"], json!("sales"));
    assert_eq!(reports[1], Value::Null);
    assert_eq!(
        result.final_value(),
        json!({"text": "one dataset could not be analyzed"})
    );

    let summary_request = &port.requests_for("summary")[0];
    assert!(summary_request.instructions.contains("sales"));
    assert!(summary_request.instructions.contains("null"));
}

#[tokio::test]
async fn test_pipeline_result_serializes_for_reporting() {
    let port = quality_port();
    let pipeline = ScenarioKind::DatasetQuality.build(invoker(&port, 1)).unwrap();
    let result = pipeline
        .run(Context::new().with("datasets", json!(["sales"])))
        .await
        .unwrap();

    let rendered = serde_json::to_value(&result).unwrap();
    assert_eq!(rendered["pipeline"], json!("dataset_quality"));
    assert_eq!(rendered["stages"][0]["stage"], json!("reports"));
    assert_eq!(rendered["stages"][0]["output"]["kind"], json!("batch"));
    assert_eq!(
        rendered["stages"][0]["output"]["items"][0]["outcome"]["status"],
        json!("succeeded")
    );
    assert!(rendered["elapsed_ms"].is_u64());
}

/// Drafts echo their topic; topic "b" never scores above 3.
fn topic_port() -> Arc<ScriptedPort> {
    Arc::new(
        ScriptedPort::new()
            .respond_with("summary", |request| {
                let topic = request.context.get("topic").cloned().unwrap_or(Value::Null);
                Ok(json!({"text": topic}).into())
            })
            .respond_with("evaluation", |request| {
                let score = if request.context.get("topic") == Some(&json!("b")) { 3 } else { 9 };
                Ok(json!({"evaluation": "sharpen it", "score": score}).into())
            }),
    )
}

fn refine_over_topics(port: &Arc<ScriptedPort>, spec: FanOutSpec) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        "topics",
        invoker(port, 2),
        vec![Stage::refine(
            "drafts",
            Step::new("draft", "Write a tagline about {topic}", summary_contract()),
            Step::new("judge", "Judge this tagline: {candidate}", evaluation_contract()),
            LoopConfig::new(9.0, 2),
        )
        .parallel_over(spec)],
    )
    .unwrap()
}

#[tokio::test]
async fn test_refine_fan_out_writes_null_for_exhausted_items() {
    let port = topic_port();
    let pipeline = refine_over_topics(
        &port,
        FanOutSpec::over("topics", "topic").tolerating_failures(),
    );

    let result = pipeline
        .run(Context::new().with("topics", json!(["a", "b", "c"])))
        .await
        .unwrap();

    assert_eq!(
        result.context.get("drafts"),
        Some(&json!([{"text": "a"}, null, {"text": "c"}]))
    );
    match result.final_output() {
        Some(StageOutput::Batch { items }) => {
            assert!(items[0].is_succeeded());
            match items[1].error() {
                Some(OrchestrationError::LoopExhausted { state }) => {
                    assert_eq!(state.iterations, 2);
                    assert_eq!(state.best_score(), Some(3.0));
                }
                other => panic!("expected exhausted loop, got {:?}", other),
            }
            assert!(items[2].is_succeeded());
        }
        other => panic!("expected batch output, got {:?}", other),
    }
    // One round each for "a" and "c", two for "b".
    assert_eq!(port.calls_for("summary"), 4);
    assert_eq!(port.calls_for("evaluation"), 4);
}

#[tokio::test]
async fn test_refine_fan_out_fails_strict_stage_on_exhausted_item() {
    let port = topic_port();
    let pipeline = refine_over_topics(&port, FanOutSpec::over("topics", "topic"));

    let err = pipeline
        .run(Context::new().with("topics", json!(["a", "b", "c"])))
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some("drafts"));
    match err.root_cause() {
        OrchestrationError::BatchFailed { total, failures } => {
            assert_eq!(*total, 3);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, 1);
            assert!(failures[0].1.contains("Refine loop exhausted"));
        }
        other => panic!("expected batch failure, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_reaches_running_fan_out_stage() {
    let port = Arc::new(
        ScriptedPort::new()
            .respond_with("report", |request| {
                let name = request.context.get("dataset").cloned().unwrap_or(Value::Null);
                Ok(json!({"dataset_name": name, "issues_found": []}).into())
            })
            .with_latency("report", |_| Duration::from_millis(100))
            .reply("summary", [json!({"text": "never reached"})]),
    );
    let signal = CancelSignal::new();
    let pipeline = PipelineOrchestrator::new(
        "cancelled_batch",
        invoker(&port, 1),
        vec![
            Stage::invoke("reports", Step::new("reports", "Check {dataset}", report_contract()))
                .parallel_over(FanOutSpec::over("datasets", "dataset").with_max_concurrency(1)),
            Stage::invoke("summary", Step::new("summary", "Summarize {reports}", summary_contract())),
        ],
    )
    .unwrap()
    .with_cancel(signal.clone());

    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let err = pipeline
        .run(Context::new().with("datasets", json!(["sales", "inventory", "hr"])))
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some("reports"));
    assert!(err.is_cancelled());
    // The first item finished, the second was in flight, the third never started.
    assert_eq!(port.calls_for("report"), 2);
    assert_eq!(port.calls_for("summary"), 0);
}
