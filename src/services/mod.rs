pub(crate) mod answer_grading;
pub(crate) mod assessment_generation;
pub(crate) mod assessment_store;
pub(crate) mod explanation;
pub(crate) mod identity;
pub(crate) mod llm;
