// ABOUTME: Request entry points: background and synchronous generation, record queries,
// ABOUTME: artifact retrieval and the runtime-mutable model configuration

use crate::blob::{artifact_key, BlobStore, FsBlobStore, MemoryBlobStore};
use crate::error::{Result, ServiceError};
use crate::events::{GenerationEventBus, GenerationEventKind};
use crate::store::GenerationStore;
use arc_swap::ArcSwap;
use genui_ai::{GatewayPolicy, LLMProvider, LLMProviderFactory, ModelGateway};
use genui_core::{
    ConfigManager, GatewayConfig, GenUiConfig, GenerationId, GenerationRecord, GenerationStatus,
    ProviderConfig, RuntimeConfig, RuntimeConfigPatch,
};
use genui_pipeline::{
    GenerationOutcome, NoopObserver, ProgressEvent, ProgressObserver, PromptTemplates,
    RefinementController, RefinementPolicy, Stages,
};
use genui_queue::{BackgroundScheduler, TaskFailure, TaskResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const TASK_PANICKED: &str = "generation task panicked";
pub const TASK_CANCELLED: &str = "generation task cancelled";

/// Where a run gets its model provider from.
#[derive(Clone)]
enum ProviderSource {
    /// Built per run from the static provider section and the run's config snapshot
    Configured {
        provider: ProviderConfig,
        gateway: GatewayConfig,
    },
    Fixed(Arc<dyn LLMProvider>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub active: usize,
    pub running: usize,
    pub waiting: usize,
    pub max_concurrent: usize,
}

struct Inner {
    store: Arc<GenerationStore>,
    blobs: Arc<dyn BlobStore>,
    events: Arc<GenerationEventBus>,
    scheduler: BackgroundScheduler,
    runtime: ArcSwap<RuntimeConfig>,
    startup_runtime: RuntimeConfig,
    provider: ProviderSource,
    gateway_policy: GatewayPolicy,
    refinement: RefinementPolicy,
    templates: Arc<PromptTemplates>,
    namespace: String,
}

/// Owns the record store, blob store and scheduler, and runs generations.
#[derive(Clone)]
pub struct GenerationService {
    inner: Arc<Inner>,
}

pub struct GenerationServiceBuilder {
    config: GenUiConfig,
    provider: Option<Arc<dyn LLMProvider>>,
    blobs: Option<Arc<dyn BlobStore>>,
    templates: Option<PromptTemplates>,
}

impl GenerationServiceBuilder {
    /// Use `provider` for every run instead of building one from configuration.
    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = Some(templates);
        self
    }

    pub async fn build(self) -> Result<GenerationService> {
        let config = self.config;
        ConfigManager::validate_config(&config)?;

        let store = match &config.storage.data_dir {
            Some(dir) => GenerationStore::open(dir).await?,
            None => GenerationStore::in_memory(),
        };

        let blobs: Arc<dyn BlobStore> = match (self.blobs, &config.storage.data_dir) {
            (Some(blobs), _) => blobs,
            (None, Some(dir)) => Arc::new(FsBlobStore::new(dir.join("blobs"))),
            (None, None) => Arc::new(MemoryBlobStore::new()),
        };

        let templates = match self.templates {
            Some(templates) => templates,
            None => PromptTemplates::load(config.prompts.dir.as_deref())?,
        };

        let provider = match self.provider {
            Some(provider) => ProviderSource::Fixed(provider),
            None => ProviderSource::Configured {
                provider: config.provider.clone(),
                gateway: config.gateway.clone(),
            },
        };

        let runtime = RuntimeConfig::from(&config);
        runtime.validate()?;

        info!(
            persistent = store.is_persistent(),
            max_concurrent_runs = config.scheduler.max_concurrent_runs,
            "Generation service ready"
        );

        Ok(GenerationService {
            inner: Arc::new(Inner {
                store: Arc::new(store),
                blobs,
                events: Arc::new(GenerationEventBus::new()),
                scheduler: BackgroundScheduler::new(config.scheduler.max_concurrent_runs),
                runtime: ArcSwap::from_pointee(runtime.clone()),
                startup_runtime: runtime,
                provider,
                gateway_policy: GatewayPolicy::from(&config.gateway),
                refinement: RefinementPolicy::from(&config.refinement),
                templates: Arc::new(templates),
                namespace: config.storage.namespace.clone(),
            }),
        })
    }
}

fn validate_prompt(prompt: &str) -> Result<&str> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ServiceError::InvalidPrompt(
            "prompt must not be empty".to_string(),
        ));
    }
    Ok(prompt)
}

impl GenerationService {
    pub fn builder(config: GenUiConfig) -> GenerationServiceBuilder {
        GenerationServiceBuilder {
            config,
            provider: None,
            blobs: None,
            templates: None,
        }
    }

    pub async fn from_config(config: GenUiConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    /// Create a `pending` record and run the pipeline for it in the background.
    ///
    /// Returns as soon as the run is scheduled; the record carries all later
    /// outcomes, including failures.
    pub fn start_generation(&self, prompt: &str) -> Result<GenerationRecord> {
        let prompt = validate_prompt(prompt)?;
        let record = self.inner.store.create(prompt);
        let id = record.id;
        self.inner.events.publish(GenerationEventKind::Created, &record);
        info!(generation_id = %id, "Generation accepted");

        let runner = self.clone();
        let finisher = self.clone();
        let prompt = record.prompt.clone();
        let launched = self.inner.scheduler.launch(
            format!("generation {}", id),
            move || async move { runner.execute(id, prompt).await },
            move |result| finisher.finish(id, result),
        );

        if let Err(e) = launched {
            self.fail_record(id, &e.to_string());
            return Err(e.into());
        }
        Ok(record)
    }

    async fn execute(&self, id: GenerationId, prompt: String) -> Result<String> {
        let record = self.inner.store.mark_generating(id)?;
        self.inner.events.publish(GenerationEventKind::Started, &record);

        let snapshot = self.inner.runtime.load_full();
        let controller = self.controller_for(&snapshot)?;
        let observer = RecordObserver {
            store: self.inner.store.clone(),
            events: self.inner.events.clone(),
            id,
        };

        let outcome = controller.run(&prompt, &observer).await?;
        let key = artifact_key(&self.inner.namespace, id);
        self.inner
            .blobs
            .put(&key, outcome.artifact.into_bytes(), HTML_CONTENT_TYPE)
            .await?;

        info!(
            generation_id = %id,
            score = outcome.score,
            iterations = outcome.iterations,
            reason = %outcome.stop_reason,
            "Generation artifact stored"
        );
        Ok(key)
    }

    fn finish(&self, id: GenerationId, result: TaskResult<String, ServiceError>) {
        match result {
            Ok(key) => match self.inner.store.mark_completed(id, &key) {
                Ok(record) => {
                    self.inner.events.publish(GenerationEventKind::Completed, &record);
                    info!(generation_id = %id, "Generation completed");
                }
                Err(e) => error!(generation_id = %id, "Failed to complete record: {}", e),
            },
            Err(failure) => {
                let message = match failure {
                    TaskFailure::Failed(e) => e.to_string(),
                    TaskFailure::Panicked => TASK_PANICKED.to_string(),
                    TaskFailure::Cancelled => TASK_CANCELLED.to_string(),
                };
                warn!(generation_id = %id, "Generation failed: {}", message);
                self.fail_record(id, &message);
            }
        }
    }

    fn fail_record(&self, id: GenerationId, message: &str) {
        match self.inner.store.mark_failed(id, message) {
            Ok(record) => {
                self.inner.events.publish(GenerationEventKind::Failed, &record);
            }
            Err(e) => error!(generation_id = %id, "Failed to record failure: {}", e),
        }
    }

    fn controller_for(&self, snapshot: &RuntimeConfig) -> Result<RefinementController> {
        let provider = match &self.inner.provider {
            ProviderSource::Fixed(provider) => provider.clone(),
            ProviderSource::Configured { provider, gateway } => {
                LLMProviderFactory::create_from_config(provider, snapshot, gateway)
                    .map_err(|e| ServiceError::Provider(e.to_string()))?
            }
        };
        let gateway = ModelGateway::new(provider, self.inner.gateway_policy.clone());
        let stages = Stages::new(gateway, snapshot.models.clone(), self.inner.templates.clone());
        Ok(RefinementController::new(stages, self.inner.refinement.clone()))
    }

    pub fn get_status(&self, id: GenerationId) -> Result<GenerationRecord> {
        self.inner.store.get(id).ok_or(ServiceError::NotFound(id))
    }

    /// Every record, newest first.
    pub fn list_generations(&self) -> Vec<GenerationRecord> {
        self.inner.store.list_all()
    }

    /// The stored artifact of a completed generation.
    pub async fn get_artifact(&self, id: GenerationId) -> Result<String> {
        let record = self.get_status(id)?;
        let key = match (&record.status, &record.output_ref) {
            (GenerationStatus::Completed, Some(key)) => key.clone(),
            _ => {
                return Err(ServiceError::ArtifactNotReady {
                    id,
                    status: record.status,
                })
            }
        };

        let blob = self
            .inner
            .blobs
            .get(&key)
            .await?
            .ok_or(ServiceError::ArtifactMissing(id))?;
        Ok(String::from_utf8_lossy(&blob.bytes).into_owned())
    }

    /// Run the whole pipeline inline and return the outcome without creating a record.
    pub async fn generate_sync(&self, prompt: &str) -> Result<GenerationOutcome> {
        let prompt = validate_prompt(prompt)?;
        let snapshot = self.inner.runtime.load_full();
        let controller = self.controller_for(&snapshot)?;
        debug!("Running synchronous generation");
        Ok(controller.run(prompt, &NoopObserver).await?)
    }

    pub fn get_config(&self) -> RuntimeConfig {
        (**self.inner.runtime.load()).clone()
    }

    /// Apply `patch` atomically. Runs already started keep their snapshot.
    pub fn update_config(&self, patch: &RuntimeConfigPatch) -> Result<RuntimeConfig> {
        loop {
            let current = self.inner.runtime.load_full();
            let next = Arc::new(current.merged(patch)?);
            let previous = self.inner.runtime.compare_and_swap(&current, next.clone());
            if Arc::ptr_eq(&*previous, &current) {
                info!(provider_url = %next.provider_url, "Runtime configuration updated");
                return Ok(next.as_ref().clone());
            }
        }
    }

    /// Restore the configuration the service started with.
    pub fn reset_config(&self) -> RuntimeConfig {
        let startup = self.inner.startup_runtime.clone();
        self.inner.runtime.store(Arc::new(startup.clone()));
        info!("Runtime configuration reset to startup values");
        startup
    }

    pub fn events(&self) -> &Arc<GenerationEventBus> {
        &self.inner.events
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        let scheduler = &self.inner.scheduler;
        SchedulerStats {
            active: scheduler.active(),
            running: scheduler.running(),
            waiting: scheduler.waiting(),
            max_concurrent: scheduler.max_concurrent(),
        }
    }

    /// Stop accepting runs, wait for running ones, and flush the record store.
    ///
    /// Returns `false` when `timeout` elapsed before every run finished.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        let drained = self.inner.scheduler.shutdown(timeout).await;
        if let Err(e) = self.inner.store.flush().await {
            warn!("Failed to flush generation store: {}", e);
        }
        drained
    }
}

/// Mirrors controller progress into the record and the event bus.
struct RecordObserver {
    store: Arc<GenerationStore>,
    events: Arc<GenerationEventBus>,
    id: GenerationId,
}

impl ProgressObserver for RecordObserver {
    fn on_event(&self, event: &ProgressEvent) {
        let (stage, iteration) = match event {
            ProgressEvent::StageStarted { stage, iteration } => (stage.as_str(), *iteration),
            ProgressEvent::InitialScored { .. } => ("scored", 0),
            ProgressEvent::CandidateCompared { iteration, .. } => ("compared", *iteration),
            ProgressEvent::RefinementStopped { iterations, .. } => ("refined", *iterations),
        };

        match self
            .store
            .record_progress(self.id, stage, iteration, event.best_score())
        {
            Ok(record) => {
                self.events.publish(GenerationEventKind::Progress, &record);
            }
            Err(e) => debug!(generation_id = %self.id, "Progress not recorded: {}", e),
        }
    }
}
