use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::db::models::{Assessment, Question};
use crate::repositories::assessments::{self, CreateAssessment, CreateQuestion};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Assessment fields as submitted. `total_questions` and `course_id` are the
/// raw form values; the store decides how to interpret them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewAssessment {
    pub(crate) user_id: String,
    pub(crate) total_questions: String,
    pub(crate) name: String,
    pub(crate) course_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredAssessment {
    pub(crate) assessment: Assessment,
    pub(crate) questions: Vec<Question>,
}

#[async_trait]
pub(crate) trait AssessmentStore: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Assessment>, StoreError>;

    /// Writes the assessment and its questions atomically.
    async fn create_with_questions(
        &self,
        assessment: NewAssessment,
        questions: Vec<CreateQuestion>,
    ) -> Result<StoredAssessment, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub(crate) struct PgAssessmentStore {
    pool: PgPool,
}

impl PgAssessmentStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssessmentStore for PgAssessmentStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Assessment>, StoreError> {
        Ok(assessments::list_by_user(&self.pool, user_id).await?)
    }

    async fn create_with_questions(
        &self,
        assessment: NewAssessment,
        questions: Vec<CreateQuestion>,
    ) -> Result<StoredAssessment, StoreError> {
        let (assessment, questions) = assessments::create_with_questions(
            &self.pool,
            CreateAssessment {
                user_id: &assessment.user_id,
                total_questions: &assessment.total_questions,
                name: &assessment.name,
                course_id: &assessment.course_id,
            },
            &questions,
        )
        .await?;

        Ok(StoredAssessment { assessment, questions })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(assessments::ping(&self.pool).await?)
    }
}
