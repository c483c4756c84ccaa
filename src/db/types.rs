use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "questiontype", rename_all = "UPPERCASE")]
pub(crate) enum QuestionType {
    /// Multiple choice; the only type that stores its answer options.
    Mcq,
    /// True or false.
    Bool,
    /// Free-form answer, usually math, graded by the model.
    Latex,
}

impl QuestionType {
    pub(crate) fn stores_answers(self) -> bool {
        matches!(self, Self::Mcq)
    }
}
