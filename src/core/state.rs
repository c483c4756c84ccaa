use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::assessment_store::AssessmentStore;
use crate::services::identity::IdentityVerifier;
use crate::services::llm::CompletionClient;

/// Shared handles for every request. All of them are read-only after startup;
/// tests swap the trait objects for in-memory fakes.
#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn AssessmentStore>,
    llm: Arc<dyn CompletionClient>,
    identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn AssessmentStore>,
        llm: Arc<dyn CompletionClient>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, llm, identity }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn AssessmentStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn llm(&self) -> &dyn CompletionClient {
        self.inner.llm.as_ref()
    }

    /// Owned handle for response bodies that outlive the handler.
    pub(crate) fn llm_handle(&self) -> Arc<dyn CompletionClient> {
        Arc::clone(&self.inner.llm)
    }

    pub(crate) fn identity(&self) -> &dyn IdentityVerifier {
        self.inner.identity.as_ref()
    }
}
