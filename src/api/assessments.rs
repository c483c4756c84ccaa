use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::Session;
use crate::core::state::AppState;
use crate::schemas::{GenerationComplete, GenerationOutcome, GenerationResponse, MessageEnvelope};
use crate::services::assessment_generation::{
    self, GenerationInput, UploadedFile, DEFAULT_COURSE_ID, DEFAULT_QUESTION_COUNT,
};
use crate::services::identity::RequestState;

const SIGNED_OUT_NOTICE: &str = "User not logged in";
const GENERATION_COMPLETE: &str = "Generation complete!";

pub(crate) async fn generate_assessment(
    State(state): State<AppState>,
    Session(caller): Session,
    multipart: Multipart,
) -> Result<Json<GenerationResponse>, ApiError> {
    let RequestState::SignedIn(claims) = caller else {
        return Ok(Json(MessageEnvelope { message: GenerationOutcome::Notice(SIGNED_OUT_NOTICE) }));
    };

    let input = read_generation_form(multipart, state.settings().uploads().max_upload_size_mb)
        .await?;

    let generated =
        assessment_generation::generate(state.llm(), state.store(), &claims.sub, input).await?;

    Ok(Json(MessageEnvelope {
        message: GenerationOutcome::Complete(GenerationComplete {
            generated_assessement: generated,
            status: GENERATION_COMPLETE,
        }),
    }))
}

async fn read_generation_form(
    mut multipart: Multipart,
    max_upload_size_mb: u64,
) -> Result<GenerationInput, ApiError> {
    let mut input = GenerationInput {
        question_count: DEFAULT_QUESTION_COUNT.to_string(),
        files: Vec::new(),
        text: String::new(),
        course_id: DEFAULT_COURSE_ID.to_string(),
    };
    let rejected = |err: MultipartError| form_error(err, max_upload_size_mb);

    while let Some(field) = multipart.next_field().await.map_err(rejected)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "uploadedFiles" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let bytes = field.bytes().await.map_err(rejected)?;
                input.files.push(UploadedFile { file_name, bytes: bytes.to_vec() });
            }
            "numOfQuestions" => input.question_count = field.text().await.map_err(rejected)?,
            "textInput" => input.text = field.text().await.map_err(rejected)?,
            "courseId" => input.course_id = field.text().await.map_err(rejected)?,
            _ => {}
        }
    }

    Ok(input)
}

fn form_error(err: MultipartError, max_upload_size_mb: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::BadRequest(format!("Upload exceeds {max_upload_size_mb}MB limit"));
    }
    tracing::debug!(error = %err, "Rejected multipart body");
    ApiError::BadRequest("Invalid multipart data".to_string())
}
