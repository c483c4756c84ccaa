use sqlx::PgPool;

use crate::db::models::{Assessment, Question};
use crate::db::types::QuestionType;

const ASSESSMENT_COLUMNS: &str = "id, user_id, total_questions, name, course_id";
const QUESTION_COLUMNS: &str = "id, assessment_id, question, question_type, is_answered, answers";

/// `total_questions` and `course_id` arrive exactly as the client sent them;
/// Postgres performs the integer conversion and rejects non-numeric input.
pub(crate) struct CreateAssessment<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) total_questions: &'a str,
    pub(crate) name: &'a str,
    pub(crate) course_id: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CreateQuestion {
    pub(crate) question: String,
    pub(crate) question_type: QuestionType,
    pub(crate) answers: Option<Vec<String>>,
}

pub(crate) async fn list_by_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!(
        "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE user_id = $1 ORDER BY id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Inserts the assessment and all of its questions in one transaction.
pub(crate) async fn create_with_questions(
    pool: &PgPool,
    params: CreateAssessment<'_>,
    questions: &[CreateQuestion],
) -> Result<(Assessment, Vec<Question>), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let assessment = sqlx::query_as::<_, Assessment>(&format!(
        "INSERT INTO assessments (user_id, total_questions, name, course_id)
         VALUES ($1, CAST($2::text AS INTEGER), $3, CAST($4::text AS BIGINT))
         RETURNING {ASSESSMENT_COLUMNS}"
    ))
    .bind(params.user_id)
    .bind(params.total_questions)
    .bind(params.name)
    .bind(params.course_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut inserted = Vec::with_capacity(questions.len());
    for question in questions {
        let row = sqlx::query_as::<_, Question>(&format!(
            "INSERT INTO questions (assessment_id, question, question_type, is_answered, answers)
             VALUES ($1, $2, $3, FALSE, $4)
             RETURNING {QUESTION_COLUMNS}"
        ))
        .bind(assessment.id)
        .bind(&question.question)
        .bind(question.question_type)
        .bind(&question.answers)
        .fetch_one(&mut *tx)
        .await?;
        inserted.push(row);
    }

    tx.commit().await?;
    Ok((assessment, inserted))
}

pub(crate) async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
