//! Built-in scenarios.
//!
//! Ready-made contracts, typed result structs and pipeline definitions for
//! common marketing and data-quality workflows. Configured pipelines and
//! contracts with the same names take precedence over these.

use crate::contract::{ContractCatalog, ContractDefinition, FieldSpec, FieldType};
use crate::error::OrchestrationError;
use crate::invoker::RetryingInvoker;
use crate::pipeline::{
    FanOutSpec, PipelineDefinition, PipelineOrchestrator, RefineDefinition, StageDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const BENEFIT_LIST: &str = "benefit_list";
pub const AD_CREATIVE: &str = "ad_creative";
pub const AD_EVALUATION: &str = "ad_evaluation";
pub const QUALITY_REPORT: &str = "quality_report";
pub const OFFER_RESULT: &str = "offer_result";
pub const BLOG_EVALUATION: &str = "blog_evaluation";
pub const ORDER_RESULT: &str = "order_result";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitList {
    pub consumer_benefits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdCreative {
    pub hypothesis: String,
    pub headline: String,
    pub body_copy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdEvaluation {
    pub evaluation: String,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub dataset_name: String,
    pub issues_found: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferResult {
    pub core_offer: String,
    pub bonuses: Vec<String>,
    pub scarcity: String,
    pub guarantee: String,
    pub pricing_strategy: String,
    pub messaging: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogEvalResult {
    pub coherence_score: f64,
    pub originality_score: f64,
    pub readability_score: f64,
    pub improvement_suggestions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub client_id: i64,
    pub orders: Vec<BTreeMap<String, Value>>,
}

fn contract(description: &str, fields: Vec<FieldSpec>) -> ContractDefinition {
    ContractDefinition {
        description: Some(description.to_string()),
        fields,
    }
}

/// Contract declarations used by the built-in scenarios.
pub fn builtin_contracts() -> BTreeMap<String, ContractDefinition> {
    let mut contracts = BTreeMap::new();
    contracts.insert(
        BENEFIT_LIST.to_string(),
        contract(
            "Consumer benefits of a product or service",
            vec![FieldSpec::array_of("consumer_benefits", FieldType::String)],
        ),
    );
    contracts.insert(
        AD_CREATIVE.to_string(),
        contract(
            "An ad creative built around a hypothesis",
            vec![
                FieldSpec::string("hypothesis"),
                FieldSpec::string("headline"),
                FieldSpec::string("body_copy"),
            ],
        ),
    );
    contracts.insert(
        AD_EVALUATION.to_string(),
        contract(
            "A critique of an ad creative with a 0-10 score",
            vec![
                FieldSpec::string("evaluation"),
                FieldSpec::integer("score").bounded(0.0, 10.0),
            ],
        ),
    );
    contracts.insert(
        QUALITY_REPORT.to_string(),
        contract(
            "Quality issues found in one dataset",
            vec![
                FieldSpec::string("dataset_name").described("Name of the dataset being analyzed"),
                FieldSpec::array_of("issues_found", FieldType::String)
                    .described("Quality issues identified in the dataset"),
            ],
        ),
    );
    contracts.insert(
        OFFER_RESULT.to_string(),
        contract(
            "An irresistible offer",
            vec![
                FieldSpec::string("core_offer").described("The primary product or service"),
                FieldSpec::array_of("bonuses", FieldType::String)
                    .described("Complementary items or services"),
                FieldSpec::string("scarcity").described("Urgency or limited availability"),
                FieldSpec::string("guarantee").described("Risk-reversal strategy"),
                FieldSpec::string("pricing_strategy")
                    .described("Pricing structure emphasizing value"),
                FieldSpec::string("messaging").described("Compelling language for the offer"),
            ],
        ),
    );
    contracts.insert(
        BLOG_EVALUATION.to_string(),
        contract(
            "Blog post quality scores",
            vec![
                FieldSpec::number("coherence_score").bounded(0.0, 1.0),
                FieldSpec::number("originality_score").bounded(0.0, 1.0),
                FieldSpec::number("readability_score")
                    .bounded(0.0, 100.0)
                    .described("Flesch-Kincaid reading ease"),
                FieldSpec::string("improvement_suggestions"),
            ],
        ),
    );
    contracts.insert(
        ORDER_RESULT.to_string(),
        contract(
            "Orders belonging to one client",
            vec![
                FieldSpec::integer("client_id"),
                FieldSpec::array_of("orders", FieldType::Object)
                    .described("List of orders belonging to the client"),
            ],
        ),
    );
    contracts
}

pub fn builtin_catalog() -> Result<ContractCatalog, OrchestrationError> {
    ContractCatalog::from_definitions(&builtin_contracts())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    AdCampaign,
    DatasetQuality,
    Offer,
    BlogReview,
    OrderLookup,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 5] = [
        ScenarioKind::AdCampaign,
        ScenarioKind::DatasetQuality,
        ScenarioKind::Offer,
        ScenarioKind::BlogReview,
        ScenarioKind::OrderLookup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::AdCampaign => "ad_campaign",
            ScenarioKind::DatasetQuality => "dataset_quality",
            ScenarioKind::Offer => "offer",
            ScenarioKind::BlogReview => "blog_review",
            ScenarioKind::OrderLookup => "order_lookup",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ScenarioKind::AdCampaign => {
                "Consumer benefits, then an ad creative refined until it scores at least 9/10"
            }
            ScenarioKind::DatasetQuality => "Independent quality reports for each dataset, in parallel",
            ScenarioKind::Offer => "An offer with bonuses, scarcity, guarantee and pricing",
            ScenarioKind::BlogReview => "Coherence, originality and readability scores for a blog post",
            ScenarioKind::OrderLookup => "Structured order list for a client",
        }
    }

    /// Top-level keys the input context must provide.
    pub fn required_inputs(self) -> &'static [&'static str] {
        match self {
            ScenarioKind::AdCampaign => &["product_or_service_description"],
            ScenarioKind::DatasetQuality => &["datasets"],
            ScenarioKind::Offer => &[
                "core_idea",
                "dream_outcome",
                "perceived_challenges",
                "time_frame",
                "effort_and_sacrifice",
                "proof_of_success",
            ],
            ScenarioKind::BlogReview => &["blog_text", "target_audience", "target_readability"],
            ScenarioKind::OrderLookup => &["client_id", "orders_on_file"],
        }
    }

    pub fn definition(self) -> PipelineDefinition {
        match self {
            ScenarioKind::AdCampaign => ad_campaign(),
            ScenarioKind::DatasetQuality => dataset_quality(),
            ScenarioKind::Offer => offer(),
            ScenarioKind::BlogReview => blog_review(),
            ScenarioKind::OrderLookup => order_lookup(),
        }
    }

    pub fn build(self, invoker: RetryingInvoker) -> Result<PipelineOrchestrator, OrchestrationError> {
        self.definition()
            .build(self.name(), &builtin_catalog()?, invoker)
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| OrchestrationError::Configuration(format!("Unknown scenario: {}", s)))
    }
}

/// Built-in pipeline definitions keyed by scenario name.
pub fn builtin_pipelines() -> BTreeMap<String, PipelineDefinition> {
    ScenarioKind::ALL
        .into_iter()
        .map(|kind| (kind.name().to_string(), kind.definition()))
        .collect()
}

fn described(kind: ScenarioKind, stages: Vec<StageDefinition>) -> PipelineDefinition {
    PipelineDefinition {
        description: Some(kind.description().to_string()),
        required_inputs: kind.required_inputs().iter().map(|key| key.to_string()).collect(),
        stages,
    }
}

fn ad_campaign() -> PipelineDefinition {
    let mut benefits = StageDefinition::new(
        "benefits",
        "Generate a list of consumer benefits for the following product/service description: \
         {product_or_service_description}\n\
         Focus on the top 3 emotional and monetary benefits that will make this person's life better.",
        BENEFIT_LIST,
    );
    benefits.inputs.insert(
        "product_or_service_description".to_string(),
        "product_or_service_description".to_string(),
    );

    let mut creative = StageDefinition::new(
        "creative",
        "You are a master offer creator. Your task is to craft an irresistible offer that compels \
         the target audience to take action.\n\
         Generate ad creatives for the following product/service: {product_or_service_description}\n\
         Find innovative ways to present these benefits to the target audience: {consumer_benefits}",
        AD_CREATIVE,
    );
    creative.inputs.insert(
        "product_or_service_description".to_string(),
        "product_or_service_description".to_string(),
    );
    creative.inputs.insert(
        "consumer_benefits".to_string(),
        "benefits.consumer_benefits".to_string(),
    );
    creative.refine = Some(RefineDefinition {
        instructions: "Evaluate the following ad creative: {candidate}".to_string(),
        contract: AD_EVALUATION.to_string(),
        threshold: 9.0,
        max_iterations: 4,
        score_field: "score".to_string(),
        rationale_field: "evaluation".to_string(),
    });

    described(ScenarioKind::AdCampaign, vec![benefits, creative])
}

fn dataset_quality() -> PipelineDefinition {
    let mut reports = StageDefinition::new(
        "reports",
        "You are a data quality expert. Analyze each dataset independently and provide a report \
         of quality issues.\nAnalyze the dataset '{dataset}' for quality issues.",
        QUALITY_REPORT,
    );
    reports.fan_out = Some(FanOutSpec::over("datasets", "dataset"));
    described(ScenarioKind::DatasetQuality, vec![reports])
}

fn offer() -> PipelineDefinition {
    let offer = StageDefinition::new(
        "offer",
        "You are an expert marketing agent specializing in crafting irresistible offers. Given the \
         details of a business idea and customer insights, develop an offer that maximizes \
         perceived value and minimizes resistance. Your output should address core elements like \
         the offer, bonuses, scarcity, guarantees, pricing, and messaging.\n\
         Business idea: {core_idea}\n\
         Dream outcome: {dream_outcome}\n\
         Perceived challenges: {perceived_challenges}\n\
         Time frame: {time_frame}\n\
         Effort and sacrifice: {effort_and_sacrifice}\n\
         Proof of success: {proof_of_success}",
        OFFER_RESULT,
    );
    described(ScenarioKind::Offer, vec![offer])
}

fn blog_review() -> PipelineDefinition {
    let review = StageDefinition::new(
        "review",
        "You are a blog writing assistant for AI engineering and data science. Assess the blog \
         post below for coherence, originality and readability for the audience \
         '{target_audience}', and suggest improvements to achieve a readability score of at \
         least {target_readability}.\n\nBlog post:\n{blog_text}",
        BLOG_EVALUATION,
    );
    described(ScenarioKind::BlogReview, vec![review])
}

fn order_lookup() -> PipelineDefinition {
    let lookup = StageDefinition::new(
        "orders",
        "You are an assistant retrieving client orders from the database. Return the orders \
         belonging to client {client_id}. Orders on file: {orders_on_file}",
        ORDER_RESULT,
    );
    described(ScenarioKind::OrderLookup, vec![lookup])
}
