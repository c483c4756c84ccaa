use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures_util::{Stream, StreamExt};

use crate::core::state::AppState;
use crate::schemas::ExplanationQuery;
use crate::services::explanation::{explanation_frames, ExplanationFrame};

const DONE_MARKER: &str = "[DONE]";

pub(crate) async fn explain(
    State(state): State<AppState>,
    Query(query): Query<ExplanationQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let problem = query.problem.unwrap_or_default();
    tracing::info!(problem_chars = problem.len(), "Explanation requested");

    let events = explanation_frames(state.llm_handle(), problem).map(|frame| {
        let event = match frame {
            ExplanationFrame::Fragment(text) => Event::default().data(normalize_line_breaks(&text)),
            ExplanationFrame::Done => Event::default().data(DONE_MARKER),
        };
        Ok(event)
    });

    Sse::new(events)
}

/// SSE fields cannot carry carriage returns; every line break becomes `\n`
/// and is sent as its own `data:` line.
fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
