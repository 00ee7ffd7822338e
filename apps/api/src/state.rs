use std::sync::Arc;

use crate::config::Config;
use crate::documents::DocumentStoreConnector;
use crate::llm_client::LlmConnector;
use crate::messaging::Publisher;
use crate::secrets::SecretStore;
use crate::storage::ObjectStore;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// The model clients and the document store are built per invocation from
/// fetched secrets, so the state holds connectors for them rather than
/// clients (see `generation::invocation`).
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub secrets: Arc<dyn SecretStore>,
    /// Image asset store.
    pub objects: Arc<dyn ObjectStore>,
    pub publisher: Arc<dyn Publisher>,
    pub llm: Arc<dyn LlmConnector>,
    pub documents: Arc<dyn DocumentStoreConnector>,
}
