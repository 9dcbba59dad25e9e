use std::sync::Arc;

use harbor_client::{HttpTransport, IntegrationPlatform, RemoteClient, ReqwestTransport};
use harbor_core::{Error, HarborConfig, Result, StatusRegistry};

/// Default delay between execution polls in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Shared collaborators every runner needs.
#[derive(Clone)]
pub struct RunEnvironment {
    /// Live progress records.
    pub registry: StatusRegistry,
    /// Transport for direct HTTP calls.
    pub transport: Arc<dyn HttpTransport>,
    /// Remote integration platform.
    pub platform: Arc<dyn IntegrationPlatform>,
    /// Delay between execution polls in milliseconds.
    pub poll_interval_ms: u64,
}

impl RunEnvironment {
    /// Assembles an environment from explicit collaborators.
    pub fn new(
        registry: StatusRegistry,
        transport: Arc<dyn HttpTransport>,
        platform: Arc<dyn IntegrationPlatform>,
    ) -> Self {
        Self {
            registry,
            transport,
            platform,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Builds a network-backed environment from configuration.
    pub fn from_config(config: &HarborConfig, registry: StatusRegistry) -> Self {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
        let platform = RemoteClient::with_transport(config.platform.clone(), Arc::clone(&transport));
        Self::new(registry, transport, Arc::new(platform))
            .with_poll_interval(config.runner.poll_interval_ms)
    }

    /// Overrides the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Fails when the platform has no credentials.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming where credentials come from.
    pub fn require_platform(&self) -> Result<()> {
        if self.platform.is_configured() {
            Ok(())
        } else {
            Err(Error::Config(
                "Platform credentials not configured. Set BOOMI_ACCOUNT_ID, BOOMI_USERNAME and \
                 BOOMI_PASSWORD or edit ~/.harbor/config.toml"
                    .to_owned(),
            ))
        }
    }
}
