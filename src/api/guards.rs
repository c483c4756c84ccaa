use std::convert::Infallible;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::core::state::AppState;
use crate::services::identity::RequestState;

/// Caller identity for handlers that branch on it. Never rejects: an
/// unverifiable caller is extracted as signed out.
pub(crate) struct Session(pub(crate) RequestState);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let request_state = state.identity().authenticate(&parts.headers).await;

        match &request_state {
            RequestState::SignedIn(claims) => {
                tracing::debug!(subject = %claims.sub, session = ?claims.sid, "Session verified");
            }
            RequestState::SignedOut(reason) => {
                tracing::debug!(reason = %reason, "Request is signed out");
            }
        }

        Ok(Session(request_state))
    }
}
