use crate::error::RuntimeError;
use connectors::{error::connect, sql::base::adapter::SqlAdapter};
use engine_config::settings::validated::ValidatedSettings;
use std::sync::Arc;
use tracing::info;

/// The three servers a site migration talks to.
#[derive(Clone)]
pub struct Adapters {
    pub source: Arc<dyn SqlAdapter>,
    pub target: Arc<dyn SqlAdapter>,
    /// Same adapter as `target` when both live on one server.
    pub central: Arc<dyn SqlAdapter>,
}

impl Adapters {
    /// Tenant and central databases on one server.
    pub fn new(source: Arc<dyn SqlAdapter>, target: Arc<dyn SqlAdapter>) -> Self {
        Adapters {
            source,
            central: Arc::clone(&target),
            target,
        }
    }

    pub fn with_central(mut self, central: Arc<dyn SqlAdapter>) -> Self {
        self.central = central;
        self
    }
}

pub async fn connect_adapters(settings: &ValidatedSettings) -> Result<Adapters, RuntimeError> {
    let source = connect(&settings.source_url).await?;
    let target = connect(&settings.target_url).await?;
    let adapters = Adapters::new(source, target);

    if settings.central_url == settings.target_url {
        info!("Central database shares the target server");
        return Ok(adapters);
    }
    let central = connect(&settings.central_url).await?;
    Ok(adapters.with_central(central))
}
