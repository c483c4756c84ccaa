use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request},
    Router,
};
use futures_util::{stream, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::db::models::{Assessment, Question};
use crate::repositories::assessments::CreateQuestion;
use crate::services::assessment_store::{
    AssessmentStore, NewAssessment, StoreError, StoredAssessment,
};
use crate::services::identity::{IdentityError, IdentityVerifier, RequestState, SessionClaims};
use crate::services::llm::{ChatRequest, CompletionClient, FragmentStream, LlmError};

pub(crate) const TEST_SESSION_KID: &str = "ins_test_key_1";
pub(crate) const MULTIPART_BOUNDARY: &str = "quizgen-test-boundary";

pub(crate) struct TestContext {
    pub(crate) app: Router,
    pub(crate) store: Arc<FakeAssessmentStore>,
    pub(crate) llm: Arc<FakeCompletionClient>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("QUIZGEN_ENV", "test");
    std::env::set_var("QUIZGEN_STRICT_CONFIG", "0");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("BACKEND_CORS_ORIGINS");
    std::env::remove_var("QUIZGEN_PORT");
    std::env::remove_var("MAX_UPLOAD_SIZE_MB");
}

pub(crate) async fn setup_test_context(
    llm: FakeCompletionClient,
    identity: FakeIdentityVerifier,
) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    let settings = Settings::load().expect("settings");
    build_context(settings, FakeAssessmentStore::default(), llm, identity, guard)
}

pub(crate) fn build_context(
    settings: Settings,
    store: FakeAssessmentStore,
    llm: FakeCompletionClient,
    identity: FakeIdentityVerifier,
    guard: OwnedMutexGuard<()>,
) -> TestContext {
    let store = Arc::new(store);
    let llm = Arc::new(llm);
    let state = AppState::new(settings, store.clone(), llm.clone(), Arc::new(identity));
    let app = api::router::router(state);

    TestContext { app, store, llm, _guard: guard }
}

enum FakeReply {
    Text(String),
    Fragments { fragments: Vec<String>, failure: StdMutex<Option<LlmError>>, stall: bool },
    Unavailable,
}

/// Completion client that records every request and answers from a script.
pub(crate) struct FakeCompletionClient {
    reply: FakeReply,
    requests: StdMutex<Vec<ChatRequest>>,
}

impl FakeCompletionClient {
    fn with_reply(reply: FakeReply) -> Self {
        Self { reply, requests: StdMutex::new(Vec::new()) }
    }

    pub(crate) fn replying(text: &str) -> Self {
        Self::with_reply(FakeReply::Text(text.to_string()))
    }

    fn fragments(fragments: Vec<&str>, failure: Option<LlmError>, stall: bool) -> Self {
        Self::with_reply(FakeReply::Fragments {
            fragments: fragments.into_iter().map(str::to_string).collect(),
            failure: StdMutex::new(failure),
            stall,
        })
    }

    pub(crate) fn streaming(fragments: Vec<&str>) -> Self {
        Self::fragments(fragments, None, false)
    }

    pub(crate) fn streaming_then_error(fragments: Vec<&str>, failure: LlmError) -> Self {
        Self::fragments(fragments, Some(failure), false)
    }

    /// Yields `fragments`, then keeps the stream open without ever finishing.
    pub(crate) fn streaming_then_stalling(fragments: Vec<&str>) -> Self {
        Self::fragments(fragments, None, true)
    }

    pub(crate) fn unavailable() -> Self {
        Self::with_reply(FakeReply::Unavailable)
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn record(&self, request: ChatRequest) {
        self.requests.lock().expect("requests lock").push(request);
    }
}

fn upstream_down() -> LlmError {
    LlmError::Api { status: 503, body: "upstream unavailable".to_string() }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.record(request);
        match &self.reply {
            FakeReply::Text(text) => Ok(text.clone()),
            FakeReply::Fragments { fragments, .. } => Ok(fragments.concat()),
            FakeReply::Unavailable => Err(upstream_down()),
        }
    }

    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, LlmError> {
        self.record(request);
        let mut items: Vec<Result<String, LlmError>> = match &self.reply {
            FakeReply::Text(text) => vec![Ok(text.clone())],
            FakeReply::Fragments { fragments, .. } => fragments.iter().cloned().map(Ok).collect(),
            FakeReply::Unavailable => return Err(upstream_down()),
        };
        if let FakeReply::Fragments { failure, stall, .. } = &self.reply {
            if let Some(err) = failure.lock().expect("failure lock").take() {
                items.push(Err(err));
            }
            if *stall {
                return Ok(Box::pin(stream::iter(items).chain(stream::pending())));
            }
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

/// In-memory store that interprets numeric fields the way Postgres would.
#[derive(Default)]
pub(crate) struct FakeAssessmentStore {
    assessments: StdMutex<Vec<Assessment>>,
    questions: StdMutex<Vec<Question>>,
    fail_writes: bool,
}

impl FakeAssessmentStore {
    pub(crate) fn failing_writes() -> Self {
        Self { fail_writes: true, ..Self::default() }
    }

    pub(crate) fn seed(&self, user_id: &str, name: &str) -> Assessment {
        let mut assessments = self.assessments.lock().expect("assessments lock");
        let assessment = Assessment {
            id: assessments.len() as i64 + 1,
            user_id: user_id.to_string(),
            total_questions: 10,
            name: name.to_string(),
            course_id: 1,
        };
        assessments.push(assessment.clone());
        assessment
    }

    pub(crate) fn assessments(&self) -> Vec<Assessment> {
        self.assessments.lock().expect("assessments lock").clone()
    }

    pub(crate) fn questions(&self) -> Vec<Question> {
        self.questions.lock().expect("questions lock").clone()
    }
}

fn rejected(message: String) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(message))
}

#[async_trait]
impl AssessmentStore for FakeAssessmentStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Assessment>, StoreError> {
        Ok(self.assessments().into_iter().filter(|row| row.user_id == user_id).collect())
    }

    async fn create_with_questions(
        &self,
        assessment: NewAssessment,
        questions: Vec<CreateQuestion>,
    ) -> Result<StoredAssessment, StoreError> {
        if self.fail_writes {
            return Err(rejected("connection reset".to_string()));
        }
        let total_questions = assessment.total_questions.trim().parse::<i32>().map_err(|_| {
            rejected(format!("invalid input syntax for type integer: {}", assessment.total_questions))
        })?;
        let course_id = assessment.course_id.trim().parse::<i64>().map_err(|_| {
            rejected(format!("invalid input syntax for type bigint: {}", assessment.course_id))
        })?;

        let mut assessments = self.assessments.lock().expect("assessments lock");
        let mut stored_questions = self.questions.lock().expect("questions lock");

        let row = Assessment {
            id: assessments.len() as i64 + 1,
            user_id: assessment.user_id,
            total_questions,
            name: assessment.name,
            course_id,
        };
        let inserted: Vec<Question> = questions
            .into_iter()
            .enumerate()
            .map(|(offset, question)| Question {
                id: (stored_questions.len() + offset) as i64 + 1,
                assessment_id: row.id,
                question: question.question,
                question_type: question.question_type,
                is_answered: false,
                answers: question.answers,
            })
            .collect();

        assessments.push(row.clone());
        stored_questions.extend(inserted.iter().cloned());

        Ok(StoredAssessment { assessment: row, questions: inserted })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(rejected("connection reset".to_string()));
        }
        Ok(())
    }
}

pub(crate) struct FakeIdentityVerifier {
    subject: Option<String>,
}

impl FakeIdentityVerifier {
    pub(crate) fn signed_in(subject: &str) -> Self {
        Self { subject: Some(subject.to_string()) }
    }

    pub(crate) fn signed_out() -> Self {
        Self { subject: None }
    }
}

#[async_trait]
impl IdentityVerifier for FakeIdentityVerifier {
    async fn authenticate(&self, _headers: &HeaderMap) -> RequestState {
        match &self.subject {
            Some(sub) => RequestState::SignedIn(SessionClaims {
                sub: sub.clone(),
                azp: Some("http://localhost:3000".to_string()),
                sid: Some("sess_test".to_string()),
            }),
            None => RequestState::SignedOut(IdentityError::MissingToken),
        }
    }
}

pub(crate) fn session_public_key_pem() -> &'static str {
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/session_signing_key.pub.pem"))
}

pub(crate) fn session_jwks_json() -> &'static str {
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/session_signing_jwks.json"))
}

fn session_private_key_pem() -> &'static str {
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/session_signing_key.pem"))
}

pub(crate) fn session_token(sub: &str, azp: Option<&str>, expires_in_seconds: i64) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_SESSION_KID.to_string());
    session_token_with_header(header, sub, azp, expires_in_seconds)
}

pub(crate) fn session_token_with_header(
    header: Header,
    sub: &str,
    azp: Option<&str>,
    expires_in_seconds: i64,
) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock").as_secs() as i64;
    let mut claims = HashMap::new();
    claims.insert("sub", serde_json::json!(sub));
    claims.insert("iat", serde_json::json!(now - 1_000));
    claims.insert("nbf", serde_json::json!(now - 1_000));
    claims.insert("exp", serde_json::json!(now + expires_in_seconds));
    claims.insert("sid", serde_json::json!("sess_test"));
    if let Some(azp) = azp {
        claims.insert("azp", serde_json::json!(azp));
    }

    let key =
        EncodingKey::from_rsa_pem(session_private_key_pem().as_bytes()).expect("signing key");
    jsonwebtoken::encode(&header, &claims, &key).expect("session token")
}

pub(crate) fn json_request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) enum FormPart<'a> {
    Field(&'a str, &'a str),
    File { name: &'a str, file_name: &'a str, bytes: &'a [u8] },
}

pub(crate) fn multipart_request(uri: &str, parts: &[FormPart<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::Field(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            FormPart::File { name, file_name, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: image/jpeg\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart request")
}

pub(crate) async fn read_body(response: axum::response::Response<Body>) -> String {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = read_body(response).await;
    serde_json::from_str(&body).unwrap_or_else(|err| panic!("json parse: {err}; body: {body}"))
}
