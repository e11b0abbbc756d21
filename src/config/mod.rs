pub mod settings;

pub use settings::{ApiEndpoints, Config, NetworkConfig};

use crate::error::ClientError;
use std::sync::Arc;

/// Loads `.env` (if present) and the environment into a validated `Config`.
pub fn load_config() -> Result<Arc<Config>, ClientError> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    config.validate()?;
    config.log_settings();

    Ok(Arc::new(config))
}
