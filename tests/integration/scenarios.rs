//! Built-in scenarios over the scripted port

use super::test_utils::invoker;
use serde_json::json;
use std::sync::Arc;
use temper::provider::ScriptedPort;
use temper::request::Context;
use temper::scenarios::{
    builtin_catalog, AdEvaluation, BlogEvalResult, OfferResult, OrderResult, ScenarioKind,
    AD_EVALUATION, BLOG_EVALUATION, OFFER_RESULT, ORDER_RESULT,
};

#[test]
fn test_every_scenario_builds() {
    let port = Arc::new(ScriptedPort::new());
    for kind in ScenarioKind::ALL {
        let pipeline = kind.build(invoker(&port, 3)).unwrap();
        assert_eq!(pipeline.name(), kind.name());
        assert!(!pipeline.stage_names().is_empty());
    }
    assert_eq!(port.calls(), 0);
}

#[test]
fn test_required_inputs_are_referenced_by_instructions() {
    for kind in ScenarioKind::ALL {
        let definition = kind.definition();
        for input in kind.required_inputs() {
            let referenced = definition.stages.iter().any(|stage| {
                stage.instructions.contains(&format!("{{{}}}", input))
                    || stage.inputs.values().any(|path| path == input)
                    || stage
                        .fan_out
                        .as_ref()
                        .map(|spec| spec.collection == *input)
                        .unwrap_or(false)
            });
            assert!(referenced, "{} never uses input {}", kind, input);
        }
    }
}

#[tokio::test]
async fn test_offer_scenario_decodes_typed_result() {
    let port = Arc::new(ScriptedPort::new().reply(
        OFFER_RESULT,
        [json!({
            "core_offer": "12-week coaching program",
            "bonuses": ["templates", "community access"],
            "scarcity": "10 seats per cohort",
            "guarantee": "Full refund after 30 days",
            "pricing_strategy": "Three installments",
            "messaging": "Get fit without giving up your evenings"
        })],
    ));
    let pipeline = ScenarioKind::Offer.build(invoker(&port, 2)).unwrap();
    let context = Context::from_value(json!({
        "core_idea": "Online fitness coaching",
        "dream_outcome": "Fit in 12 weeks",
        "perceived_challenges": "No time",
        "time_frame": "12 weeks",
        "effort_and_sacrifice": "30 minutes a day",
        "proof_of_success": "200 clients"
    }))
    .unwrap();

    let result = pipeline.run(context).await.unwrap();
    let offer: OfferResult = serde_json::from_value(result.final_value()).unwrap();
    assert_eq!(offer.bonuses.len(), 2);
    assert!(port.requests()[0].instructions.contains("Online fitness coaching"));
}

#[tokio::test]
async fn test_blog_review_rejects_out_of_range_scores_then_recovers() {
    let port = Arc::new(ScriptedPort::new().reply(
        BLOG_EVALUATION,
        [
            json!({
                "coherence_score": 8,
                "originality_score": 0.7,
                "readability_score": 62.5,
                "improvement_suggestions": "Shorter sentences"
            }),
            json!({
                "coherence_score": 0.8,
                "originality_score": 0.7,
                "readability_score": 62.5,
                "improvement_suggestions": "Shorter sentences"
            }),
        ],
    ));
    let pipeline = ScenarioKind::BlogReview.build(invoker(&port, 3)).unwrap();
    let context = Context::new()
        .with("blog_text", "Vector databases, explained.")
        .with("target_audience", "data engineers")
        .with("target_readability", 60);

    let result = pipeline.run(context).await.unwrap();
    let review: BlogEvalResult = serde_json::from_value(result.final_value()).unwrap();
    assert_eq!(review.coherence_score, 0.8);
    assert_eq!(port.calls(), 2);
    assert!(port.requests()[1].instructions.contains("coherence_score"));
}

#[tokio::test]
async fn test_order_lookup_returns_client_orders() {
    let port = Arc::new(ScriptedPort::new().reply(
        ORDER_RESULT,
        [json!({
            "client_id": 42,
            "orders": [
                {"order_id": "A-1", "total": 19.99},
                {"order_id": "A-2", "total": 5.0}
            ]
        })],
    ));
    let pipeline = ScenarioKind::OrderLookup.build(invoker(&port, 2)).unwrap();
    let context = Context::new()
        .with("client_id", 42)
        .with("orders_on_file", json!([{"order_id": "A-1", "client_id": 42}]));

    let result = pipeline.run(context).await.unwrap();
    let orders: OrderResult = serde_json::from_value(result.final_value()).unwrap();
    assert_eq!(orders.client_id, 42);
    assert_eq!(orders.orders.len(), 2);
}

#[test]
fn test_builtin_catalog_describes_contracts() {
    let catalog = builtin_catalog().unwrap();
    let description = catalog.get(BLOG_EVALUATION).unwrap().describe();
    assert!(description.contains("readability_score"));
    assert!(description.contains("between 0 and 100"));
}

#[test]
fn test_integral_float_output_decodes_into_typed_results() {
    let catalog = builtin_catalog().unwrap();

    let evaluation = catalog
        .get(AD_EVALUATION)
        .unwrap()
        .validate_value(&json!({"evaluation": "ok", "score": 9.0}))
        .unwrap();
    let decoded: AdEvaluation = evaluation.decode().unwrap();
    assert_eq!(decoded.score, 9);

    let orders = catalog
        .get(ORDER_RESULT)
        .unwrap()
        .validate_value(&json!({"client_id": 42.0, "orders": []}))
        .unwrap();
    let decoded: OrderResult = orders.decode().unwrap();
    assert_eq!(decoded.client_id, 42);
}
