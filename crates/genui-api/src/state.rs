use genui_core::GenUiConfig;
use genui_service::{GenerationService, ServiceError};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub service: GenerationService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: GenerationService) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }

    pub async fn from_config(config: GenUiConfig) -> Result<Self, ServiceError> {
        Ok(Self::new(GenerationService::from_config(config).await?))
    }
}
