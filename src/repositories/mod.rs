pub(crate) mod assessments;
