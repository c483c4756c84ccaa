use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::llm::{ChatMessage, ChatRequest, CompletionClient, LlmError, Purpose};

pub(crate) const INVALID_AI_RESPONSE: &str = "Invalid JSON response from AI";

/// Grading verdict as sent to clients. A verdict the model did not express
/// as `{"correct": 0|1}` is reported as an error object under the same key,
/// which existing clients already handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum Correctness {
    Verdict(u8),
    Invalid { error: &'static str },
}

impl Correctness {
    fn invalid() -> Self {
        Self::Invalid { error: INVALID_AI_RESPONSE }
    }
}

#[derive(Deserialize)]
struct VerdictPayload {
    correct: u8,
}

pub(crate) async fn grade(
    llm: &dyn CompletionClient,
    question: &Value,
    answer: &Value,
) -> Result<Correctness, LlmError> {
    let request = ChatRequest {
        purpose: Purpose::Grading,
        messages: vec![ChatMessage::system(grading_prompt(
            &embed_value(question),
            &embed_value(answer),
        ))],
        json_mode: true,
    };

    let completion = llm.complete(request).await?;
    let correctness = decode_verdict(&completion);
    tracing::info!(verdict = ?correctness, "Answer graded");
    Ok(correctness)
}

pub(crate) fn decode_verdict(completion: &str) -> Correctness {
    match serde_json::from_str::<VerdictPayload>(completion.trim()) {
        Ok(VerdictPayload { correct }) if correct <= 1 => Correctness::Verdict(correct),
        Ok(VerdictPayload { correct }) => {
            tracing::warn!(correct, "Grading verdict out of range");
            Correctness::invalid()
        }
        Err(err) => {
            tracing::warn!(error = %err, "Unusable grading JSON");
            Correctness::invalid()
        }
    }
}

/// Strings are embedded as their text, anything else as JSON, absent as empty.
fn embed_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn grading_prompt(question: &str, answer: &str) -> String {
    format!(
        r#"You grade answers to assessment questions.
The question and the answer may use MathJax notation.

Question: {question}
Answer: {answer}

Reply with a number:
- 1 if the answer is correct
- 0 if the answer is incorrect

Respond with JSON only, exactly in this shape:
{{"correct": 1}}

Return nothing but that JSON object."#
    )
}
