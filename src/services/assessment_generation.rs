use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::metrics;
use crate::db::types::QuestionType;
use crate::repositories::assessments::CreateQuestion;
use crate::services::assessment_store::{AssessmentStore, NewAssessment, StoreError};
use crate::services::llm::{ChatMessage, ChatRequest, CompletionClient, ContentPart, LlmError, Purpose};

pub(crate) const DEFAULT_QUESTION_COUNT: &str = "10";
pub(crate) const DEFAULT_COURSE_ID: &str = "1";

/// Browsers sometimes submit an empty file slot under this name.
const PLACEHOLDER_FILE_NAME: &str = "undefined";

#[derive(Debug, Error)]
pub(crate) enum GenerationError {
    #[error("completion request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("Invalid JSON response from AI")]
    InvalidResponse(#[source] serde_json::Error),
    #[error("failed to persist assessment: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub(crate) struct UploadedFile {
    pub(crate) file_name: Option<String>,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct GenerationInput {
    /// Passed through verbatim to the prompt and to storage.
    pub(crate) question_count: String,
    pub(crate) files: Vec<UploadedFile>,
    pub(crate) text: String,
    pub(crate) course_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GeneratedAssessment {
    pub(crate) assessment_name: String,
    pub(crate) questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GeneratedQuestion {
    pub(crate) question: String,
    pub(crate) question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "answer_texts")]
    pub(crate) answers: Option<Vec<String>>,
}

/// Models often write numeric or boolean options unquoted; those are kept as
/// their JSON text. Nested arrays and objects are rejected.
fn answer_texts<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(values) = Option::<Vec<Value>>::deserialize(deserializer)? else {
        return Ok(None);
    };

    values
        .into_iter()
        .map(|value| match value {
            Value::String(text) => Ok(text),
            Value::Number(number) => Ok(number.to_string()),
            Value::Bool(flag) => Ok(flag.to_string()),
            other => Err(serde::de::Error::custom(format!("unsupported answer option: {other}"))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

impl GeneratedAssessment {
    /// Rows to insert. Only multiple-choice questions keep their answers.
    pub(crate) fn question_rows(&self) -> Vec<CreateQuestion> {
        self.questions
            .iter()
            .map(|generated| CreateQuestion {
                question: generated.question.clone(),
                question_type: generated.question_type,
                answers: generated
                    .question_type
                    .stores_answers()
                    .then(|| generated.answers.clone().unwrap_or_default()),
            })
            .collect()
    }
}

/// Generates an assessment from the uploaded material and stores it for `user_id`.
pub(crate) async fn generate(
    llm: &dyn CompletionClient,
    store: &dyn AssessmentStore,
    user_id: &str,
    input: GenerationInput,
) -> Result<GeneratedAssessment, GenerationError> {
    let images = encode_images(&input.files);
    tracing::info!(
        user_id,
        files = input.files.len(),
        images = images.len(),
        text_chars = input.text.len(),
        question_count = %input.question_count,
        "Generating assessment"
    );

    let request = ChatRequest {
        purpose: Purpose::Generation,
        messages: build_messages(&input.question_count, &input.text, images),
        json_mode: true,
    };
    let completion = llm.complete(request).await?;
    let generated = decode_assessment(&completion)?;

    let stored = store
        .create_with_questions(
            NewAssessment {
                user_id: user_id.to_string(),
                total_questions: input.question_count,
                name: generated.assessment_name.clone(),
                course_id: input.course_id,
            },
            generated.question_rows(),
        )
        .await?;

    metrics::record_assessment_generated(stored.questions.len());
    tracing::info!(
        assessment_id = stored.assessment.id,
        questions = stored.questions.len(),
        "Assessment stored"
    );

    Ok(generated)
}

pub(crate) fn encode_images(files: &[UploadedFile]) -> Vec<ContentPart> {
    files
        .iter()
        .filter(|file| file.file_name.as_deref() != Some(PLACEHOLDER_FILE_NAME))
        .map(|file| ContentPart::jpeg_base64(&STANDARD.encode(&file.bytes)))
        .collect()
}

/// One system message, plus a user message only when there is material.
pub(crate) fn build_messages(
    question_count: &str,
    text: &str,
    images: Vec<ContentPart>,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt(question_count))];

    let user_parts = match (text.is_empty(), images.is_empty()) {
        (true, true) => None,
        (true, false) => Some(images),
        (false, true) => Some(vec![ContentPart::text(text)]),
        (false, false) => {
            let mut parts = Vec::with_capacity(images.len() + 1);
            parts.push(ContentPart::text(text));
            parts.extend(images);
            Some(parts)
        }
    };

    if let Some(parts) = user_parts {
        messages.push(ChatMessage::user_parts(parts));
    }

    messages
}

pub(crate) fn decode_assessment(completion: &str) -> Result<GeneratedAssessment, GenerationError> {
    serde_json::from_str(completion.trim()).map_err(|err| {
        tracing::warn!(error = %err, response_chars = completion.len(), "Unusable assessment JSON");
        GenerationError::InvalidResponse(err)
    })
}

fn system_prompt(question_count: &str) -> String {
    format!(
        r#"You generate practice assessments from the material the user provides.

Question types:
- "MCQ": multiple choice.
- "BOOL": true or false.
- "LATEX": the student types a worked answer. Prefer this type over the other two.

Math formatting (MathJax):
- Use math notation in questions and answers whenever it makes them clearer, including MCQ and BOOL.
- Inline math goes in \( ... \), for example "Solve for \(x\) in \(2x + 3 = 7\)."
- Display math goes in \[ ... \], for example "Evaluate: \[ \int_0^1 x^2 \,dx \]".

Requirements:
- Write an assessment with {question_count} questions based on the input.
- Respond with one JSON object with exactly these keys:
  - "assessment_name": string
  - "questions": array of objects, each with
    - "question": string
    - "question_type": "MCQ", "BOOL" or "LATEX"
    - "answers": array of strings, required when "question_type" is "MCQ" or "BOOL"

Return only the JSON object. No explanations, comments or surrounding text."#
    )
}
