use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clients::VisionClient;
use crate::config::Config;
use crate::db::Store;
use crate::services::{ExportWriter, InvoiceService, Mailer};

/// Build a shared HTTP client with reasonable defaults for API calls.
/// This client should be reused across all HTTP-based services to enable
/// connection pooling and avoid socket exhaustion.
fn build_shared_http_client(timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .user_agent("Factura/1.0")
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub exporter: ExportWriter,

    pub invoice_service: InvoiceService,

    pub mailer: Mailer,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let http_client = build_shared_http_client(u64::from(config.extraction.request_timeout_seconds))?;
        let vision = VisionClient::new(http_client, &config.extraction);

        Self::with_parts(config, store, vision)
    }

    /// Wires the state from pre-built parts so tests can inject an in-memory
    /// store or a stub extraction endpoint.
    pub fn with_parts(config: Config, store: Store, vision: VisionClient) -> anyhow::Result<Self> {
        let exporter = ExportWriter::new(&config.storage);
        let invoice_service = InvoiceService::new(
            store.clone(),
            exporter.clone(),
            vision,
            &config.storage,
        );
        let mailer = Mailer::new(&config.email);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            exporter,
            invoice_service,
            mailer,
        })
    }
}
