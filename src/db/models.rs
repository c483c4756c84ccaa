use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::types::QuestionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct Assessment {
    pub(crate) id: i64,
    pub(crate) user_id: String,
    pub(crate) total_questions: i32,
    pub(crate) name: String,
    pub(crate) course_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: i64,
    pub(crate) assessment_id: i64,
    pub(crate) question: String,
    pub(crate) question_type: QuestionType,
    pub(crate) is_answered: bool,
    pub(crate) answers: Option<Vec<String>>,
}
