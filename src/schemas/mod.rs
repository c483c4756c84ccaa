use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::models::Assessment;
use crate::services::answer_grading::Correctness;
use crate::services::assessment_generation::GeneratedAssessment;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

/// Every successful or soft-failed response is wrapped in a `message` key.
#[derive(Debug, Serialize)]
pub(crate) struct MessageEnvelope<T> {
    pub(crate) message: T,
}

pub(crate) type AssessmentListResponse = MessageEnvelope<Vec<Assessment>>;

#[derive(Debug, Serialize)]
pub(crate) struct GenerationComplete {
    /// Misspelling is part of the public contract.
    pub(crate) generated_assessement: GeneratedAssessment,
    pub(crate) status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum GenerationOutcome {
    Complete(GenerationComplete),
    Notice(&'static str),
}

pub(crate) type GenerationResponse = MessageEnvelope<GenerationOutcome>;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GradingRequest {
    #[serde(default)]
    pub(crate) question: serde_json::Value,
    #[serde(default)]
    pub(crate) answer: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradingResponse {
    pub(crate) correct: Correctness,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExplanationQuery {
    #[serde(default)]
    pub(crate) problem: Option<String>,
}
