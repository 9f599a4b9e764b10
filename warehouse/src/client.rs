use std::sync::Arc;
use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use token_source::TokenSourceProvider;

use crate::data::DataOperations;
use crate::dataset::DatasetManager;
use crate::error::Error;
use crate::http::service_client::ServiceClient;
use crate::service::WarehouseService;
use crate::table::TableManager;

const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct ClientConfig {
    pub http: Option<ClientWithMiddleware>,
    pub endpoint: String,
    pub token_source_provider: Option<Box<dyn TokenSourceProvider>>,
    pub project_id: Option<String>,
    /// Logs every raw response body.
    pub debug: bool,
    /// How often a running query, copy or load job is polled.
    pub job_poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http: None,
            endpoint: "https://bigquery.googleapis.com".to_string(),
            token_source_provider: None,
            project_id: None,
            debug: false,
            job_poll_interval: DEFAULT_JOB_POLL_INTERVAL,
        }
    }
}

#[cfg(feature = "auth")]
pub use google_cloud_auth;

#[cfg(feature = "auth")]
impl ClientConfig {
    /// Uses the application default credentials.
    pub async fn with_auth(self) -> Result<Self, google_cloud_auth::error::Error> {
        let ts = google_cloud_auth::token::DefaultTokenSourceProvider::new(Self::auth_config()).await?;
        Ok(self.with_token_source(ts))
    }

    pub async fn with_credentials(
        self,
        credentials: google_cloud_auth::credentials::CredentialsFile,
    ) -> Result<Self, google_cloud_auth::error::Error> {
        let ts = google_cloud_auth::token::DefaultTokenSourceProvider::new_with_credentials(
            Self::auth_config(),
            Box::new(credentials),
        )
        .await?;
        Ok(self.with_token_source(ts))
    }

    /// Reads a service account or authorized user key file. Nothing is read from or written to the
    /// process environment.
    pub async fn with_credentials_file(self, path: impl Into<String>) -> Result<Self, google_cloud_auth::error::Error> {
        let credentials = google_cloud_auth::credentials::CredentialsFile::new_from_file(path.into()).await?;
        self.with_credentials(credentials).await
    }

    fn with_token_source(mut self, ts: google_cloud_auth::token::DefaultTokenSourceProvider) -> Self {
        if self.project_id.is_none() {
            self.project_id = ts.project_id.clone();
        }
        self.token_source_provider = Some(Box::new(ts));
        self
    }

    fn auth_config() -> google_cloud_auth::project::Config<'static> {
        google_cloud_auth::project::Config::default().with_scopes(&crate::http::service_client::SCOPES)
    }
}

/// Shared by the managers of one [`Client`].
#[derive(Debug)]
pub(crate) struct Context {
    pub project_id: String,
    pub service: Arc<dyn WarehouseService>,
    pub job_poll_interval: Duration,
}

/// Entry point. Cheap to clone and safe to share between tasks; it only holds configuration.
#[derive(Clone, Debug)]
pub struct Client {
    dataset_manager: DatasetManager,
    table_manager: TableManager,
    data_operations: DataOperations,
    context: Arc<Context>,
}

impl Client {
    /// Creates a client talking to the REST endpoint in `config`.
    ///
    /// Fails with [`Error::Validation`] when the config has no project id or no token source.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let project_id = config
            .project_id
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::validation("project id is required"))?;
        let tsp = config
            .token_source_provider
            .ok_or_else(|| Error::validation("token source provider is required"))?;
        let http = config
            .http
            .unwrap_or_else(|| reqwest_middleware::ClientBuilder::new(reqwest::Client::default()).build());
        let service = ServiceClient::new(tsp.token_source(), config.endpoint.as_str(), http, config.debug);
        Ok(Self::with_context(Context {
            project_id,
            service: Arc::new(service),
            job_poll_interval: config.job_poll_interval,
        }))
    }

    /// Creates a client over any [`WarehouseService`], e.g. the in-memory emulator.
    pub fn from_service(project_id: impl Into<String>, service: Arc<dyn WarehouseService>) -> Self {
        Self::with_context(Context {
            project_id: project_id.into(),
            service,
            job_poll_interval: DEFAULT_JOB_POLL_INTERVAL,
        })
    }

    pub fn with_job_poll_interval(self, interval: Duration) -> Self {
        Self::with_context(Context {
            project_id: self.context.project_id.clone(),
            service: self.context.service.clone(),
            job_poll_interval: interval,
        })
    }

    fn with_context(context: Context) -> Self {
        let context = Arc::new(context);
        Self {
            dataset_manager: DatasetManager::new(context.clone()),
            table_manager: TableManager::new(context.clone()),
            data_operations: DataOperations::new(context.clone()),
            context,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.context.project_id
    }

    pub fn dataset(&self) -> &DatasetManager {
        &self.dataset_manager
    }

    pub fn table(&self) -> &TableManager {
        &self.table_manager
    }

    pub fn data(&self) -> &DataOperations {
        &self.data_operations
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::client::{Client, ClientConfig};
    use crate::emulator::InMemoryWarehouse;
    use crate::error::Error;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "https://bigquery.googleapis.com");
        assert_eq!(config.job_poll_interval, Duration::from_secs(1));
        assert!(config.project_id.is_none());
        assert!(config.token_source_provider.is_none());
    }

    #[test]
    fn new_requires_project_and_credentials() {
        assert!(matches!(Client::new(ClientConfig::default()), Err(Error::Validation { .. })));
        let config = ClientConfig {
            project_id: Some("p".to_string()),
            ..Default::default()
        };
        assert!(matches!(Client::new(config), Err(Error::Validation { .. })));
    }

    #[test]
    fn clone_and_share() {
        fn assert_send_sync<T: Send + Sync + Clone>(_: &T) {}
        let client = Client::from_service("p", Arc::new(InMemoryWarehouse::new()))
            .with_job_poll_interval(Duration::from_millis(10));
        assert_send_sync(&client);
        let cloned = client.clone();
        assert_eq!(cloned.project_id(), "p");
    }
}
