use std::sync::Arc;

use tokio::sync::Mutex;

use revdesk_providers::{OpenAIExtractor, WebhookNotifier, http_client};
use revdesk_store::Store;
use revdesk_types::Settings;

/// Shared handler state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<Mutex<Store>>,
    pub client: reqwest::Client,
    pub extractor: Option<Arc<OpenAIExtractor>>,
    pub notifier: Arc<WebhookNotifier>,
}

impl AppState {
    /// Build state with the extractor and notifier described by `settings`.
    #[must_use]
    pub fn new(settings: Settings, store: Store) -> Self {
        let extractor = OpenAIExtractor::from_settings(&settings.extractor).map(Arc::new);
        let notifier = Arc::new(WebhookNotifier::from_settings(&settings.notifier));
        Self {
            settings: Arc::new(settings),
            store: Arc::new(Mutex::new(store)),
            client: http_client().clone(),
            extractor,
            notifier,
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Option<OpenAIExtractor>) -> Self {
        self.extractor = extractor.map(Arc::new);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: WebhookNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }
}
