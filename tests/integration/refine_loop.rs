//! Generate/evaluate refinement loop

use super::test_utils::{evaluation_contract, invoker, summary_contract};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use temper::cancel::CancelSignal;
use temper::error::OrchestrationError;
use temper::provider::ScriptedPort;
use temper::refine::{
    EvaluationLoopController, LoopConfig, LoopPhase, Termination, CANDIDATE_KEY, FEEDBACK_KEY,
};
use temper::request::{Context, Step};

fn controller(port: &Arc<ScriptedPort>, threshold: f64, max_iterations: u32) -> EvaluationLoopController {
    EvaluationLoopController::new(
        invoker(port, 2),
        Step::new("draft", "Draft a tagline for {product}", summary_contract()),
        Step::new("judge", "Judge this tagline: {candidate}", evaluation_contract()),
        LoopConfig::new(threshold, max_iterations),
    )
    .unwrap()
}

/// Numbered drafts so each candidate is distinguishable.
fn drafting_port(scores: &'static [i64]) -> Arc<ScriptedPort> {
    let drafts = Arc::new(AtomicU32::new(0));
    let evaluations = Arc::new(AtomicU32::new(0));
    Arc::new(
        ScriptedPort::new()
            .respond_with("summary", move |_| {
                let n = drafts.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!({"text": format!("draft {}", n)}).into())
            })
            .respond_with("evaluation", move |_| {
                let n = evaluations.fetch_add(1, Ordering::SeqCst) as usize;
                let score = scores[n.min(scores.len() - 1)];
                Ok(json!({"evaluation": format!("needs work ({})", score), "score": score}).into())
            }),
    )
}

#[tokio::test]
async fn test_accepts_on_third_iteration() {
    let port = drafting_port(&[4, 6, 9]);
    let state = controller(&port, 9.0, 5)
        .run(&Context::new().with("product", "solar lantern"))
        .await
        .unwrap();

    assert!(state.accepted);
    assert_eq!(state.termination, Some(Termination::Accepted));
    assert_eq!(state.iterations, 3);
    assert_eq!(state.score_history, vec![4.0, 6.0, 9.0]);
    let outcome = state.outcome().unwrap();
    assert_eq!(outcome.artifact, json!({"text": "draft 3"}));
    assert_eq!(outcome.iteration, 3);
    assert_eq!(port.calls_for("summary"), 3);
    assert_eq!(port.calls_for("evaluation"), 3);
}

#[tokio::test]
async fn test_feedback_reaches_next_generation() {
    let port = drafting_port(&[4, 6, 9]);
    controller(&port, 9.0, 5)
        .run(&Context::new().with("product", "solar lantern"))
        .await
        .unwrap();

    let generations = port.requests_for("summary");
    assert!(generations[0].context.get(FEEDBACK_KEY).is_none());
    assert_eq!(
        generations[1].context.get(FEEDBACK_KEY),
        Some(&json!("needs work (4)"))
    );
    assert_eq!(
        generations[2].context.get(FEEDBACK_KEY),
        Some(&json!("needs work (6)"))
    );
    // Every generation starts from the same seed.
    for request in &generations {
        assert_eq!(request.instructions, "Draft a tagline for solar lantern");
    }

    let evaluations = port.requests_for("evaluation");
    assert_eq!(
        evaluations[1].context.get(CANDIDATE_KEY),
        Some(&json!({"text": "draft 2"}))
    );
}

#[tokio::test]
async fn test_exhaustion_returns_best_candidate() {
    let port = drafting_port(&[5, 7, 6]);
    let state = controller(&port, 9.0, 3)
        .run(&Context::new().with("product", "kettle"))
        .await
        .unwrap();

    assert!(!state.accepted);
    assert_eq!(state.termination, Some(Termination::Exhausted));
    assert_eq!(state.iterations, 3);
    assert_eq!(state.best_score(), Some(7.0));
    assert_eq!(state.outcome().unwrap().artifact, json!({"text": "draft 2"}));
    assert_eq!(port.calls_for("evaluation"), 3);
}

#[tokio::test]
async fn test_equal_scores_keep_earliest_best() {
    let port = drafting_port(&[6, 6]);
    let state = controller(&port, 9.0, 2)
        .run(&Context::new().with("product", "kettle"))
        .await
        .unwrap();

    assert_eq!(state.best.as_ref().unwrap().iteration, 1);
}

#[tokio::test]
async fn test_threshold_at_first_iteration_stops_immediately() {
    let port = drafting_port(&[10]);
    let state = controller(&port, 9.0, 4)
        .run(&Context::new().with("product", "kettle"))
        .await
        .unwrap();

    assert!(state.accepted);
    assert_eq!(state.iterations, 1);
    assert_eq!(port.calls(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let port = drafting_port(&[4]);
    let signal = CancelSignal::new();
    signal.cancel();

    let state = controller(&port, 9.0, 4)
        .run_with_cancel(&Context::new().with("product", "kettle"), &signal)
        .await
        .unwrap();

    assert_eq!(state.termination, Some(Termination::Cancelled));
    assert_eq!(state.cancelled_at, Some(LoopPhase::Generating));
    assert_eq!(state.iterations, 0);
    assert_eq!(port.calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_generation_keeps_unscored_candidate() {
    let signal = CancelSignal::new();
    let trigger = signal.clone();
    let port = Arc::new(
        ScriptedPort::new()
            .respond_with("summary", move |_| {
                trigger.cancel();
                Ok(json!({"text": "only draft"}).into())
            })
            .reply("evaluation", [json!({"evaluation": "fine", "score": 3})]),
    );

    let state = controller(&port, 9.0, 4)
        .run_with_cancel(&Context::new().with("product", "kettle"), &signal)
        .await
        .unwrap();

    assert_eq!(state.cancelled_at, Some(LoopPhase::Evaluating));
    let current = state.current.as_ref().unwrap();
    assert_eq!(current.artifact, json!({"text": "only draft"}));
    assert!(current.score.is_none());
    assert_eq!(port.calls_for("evaluation"), 0);
}

#[test]
fn test_unreachable_threshold_is_rejected_before_any_call() {
    let port = Arc::new(ScriptedPort::new());
    let result = EvaluationLoopController::new(
        invoker(&port, 2),
        Step::new("draft", "Draft", summary_contract()),
        Step::new("judge", "Judge", evaluation_contract()),
        LoopConfig::new(11.0, 3),
    );
    assert!(result.is_err());
    assert_eq!(port.calls(), 0);
}

#[tokio::test]
async fn test_separate_evaluator_has_its_own_attempt_budget() {
    let port = Arc::new(
        ScriptedPort::new()
            .reply("summary", [json!({"wrong": 1}), json!({"text": "draft"})])
            .reply("evaluation", [json!({"evaluation": "no score given"})]),
    );
    let controller = EvaluationLoopController::new(
        invoker(&port, 3),
        Step::new("draft", "Draft a tagline for {product}", summary_contract()),
        Step::new("judge", "Judge this tagline: {candidate}", evaluation_contract()),
        LoopConfig::new(9.0, 3),
    )
    .unwrap()
    .with_evaluator(invoker(&port, 1));

    let err = controller
        .run(&Context::new().with("product", "solar lantern"))
        .await
        .unwrap_err();

    match err {
        OrchestrationError::Invoke(invoke) => {
            assert_eq!(invoke.attempts(), 1);
            assert!(invoke.to_string().contains("evaluation"));
        }
        other => panic!("expected invoke error, got {:?}", other),
    }
    // Generation used its retry; evaluation got exactly one call.
    assert_eq!(port.calls_for("summary"), 2);
    assert_eq!(port.calls_for("evaluation"), 1);
}
