use genui_core::{GenerationRecord, GenerationStatus, ModelsPatch, RuntimeConfigPatch};
use genui_service::testing::{scripted_pipeline, test_config, PipelineScript, CODER_MODEL};
use genui_service::{
    GenerationEventKind, GenerationService, GenerationStore, ServiceError, INTERRUPTED_BY_RESTART,
    TASK_PANICKED,
};
use std::time::Duration;
use tokio_test::assert_ok;

async fn service_with(script: PipelineScript) -> GenerationService {
    GenerationService::builder(test_config())
        .provider(scripted_pipeline(script))
        .build()
        .await
        .unwrap()
}

async fn wait_terminal(service: &GenerationService, record: &GenerationRecord) -> GenerationRecord {
    for _ in 0..200 {
        let current = service.get_status(record.id).unwrap();
        if current.status.is_terminal() {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("generation {} never finished", record.id);
}

#[tokio::test]
async fn test_background_generation_completes() {
    let service = service_with(PipelineScript::default()).await;

    let record = assert_ok!(service.start_generation("Build a landing page"));
    assert_eq!(record.status, GenerationStatus::Pending);

    let done = wait_terminal(&service, &record).await;
    assert_eq!(done.status, GenerationStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(done.error.is_none());
    let key = done.output_ref.clone().unwrap();
    assert!(key.starts_with("genui/generations/"));
    assert!(key.ends_with(".html"));

    // refined candidate scored 88 > 80 and replaced the initial one
    let artifact = service.get_artifact(record.id).await.unwrap();
    assert_eq!(artifact, "<html>refined</html>");

    let progress = done.progress.unwrap();
    assert_eq!(progress.best_score, Some(88.0));
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let service = service_with(PipelineScript::default()).await;
    assert!(matches!(
        service.start_generation("   "),
        Err(ServiceError::InvalidPrompt(_))
    ));
    assert!(service.list_generations().is_empty());
}

#[tokio::test]
async fn test_stage_failure_marks_record_failed() {
    let service = service_with(PipelineScript {
        coder_fails: true,
        ..Default::default()
    })
    .await;

    let record = service.start_generation("Build a dashboard").unwrap();
    let done = wait_terminal(&service, &record).await;

    assert_eq!(done.status, GenerationStatus::Failed);
    assert!(done.output_ref.is_none());
    let error = done.error.unwrap();
    assert!(error.contains("candidate"), "unexpected error: {}", error);
    assert!(matches!(
        service.get_artifact(record.id).await,
        Err(ServiceError::ArtifactNotReady {
            status: GenerationStatus::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_panicking_run_is_recorded() {
    let service = service_with(PipelineScript {
        coder_panics: true,
        ..Default::default()
    })
    .await;

    let record = service.start_generation("Build a form").unwrap();
    let done = wait_terminal(&service, &record).await;
    assert_eq!(done.status, GenerationStatus::Failed);
    assert_eq!(done.error.as_deref(), Some(TASK_PANICKED));

    // the service keeps accepting work
    assert_ok!(service.start_generation("Another one"));
}

#[tokio::test]
async fn test_artifact_not_ready_while_running() {
    let service = service_with(PipelineScript {
        coder_delay: Duration::from_millis(200),
        ..Default::default()
    })
    .await;

    let record = service.start_generation("Slow page").unwrap();
    assert!(matches!(
        service.get_artifact(record.id).await,
        Err(ServiceError::ArtifactNotReady { .. })
    ));

    let done = wait_terminal(&service, &record).await;
    assert_eq!(done.status, GenerationStatus::Completed);
}

#[tokio::test]
async fn test_unknown_generation_is_not_found() {
    let service = service_with(PipelineScript::default()).await;
    let id = uuid::Uuid::new_v4();
    assert!(matches!(service.get_status(id), Err(ServiceError::NotFound(_))));
    assert!(matches!(
        service.get_artifact(id).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let service = service_with(PipelineScript::default()).await;
    let first = service.start_generation("first").unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = service.start_generation("second").unwrap();

    let ids: Vec<_> = service.list_generations().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[tokio::test]
async fn test_generate_sync_leaves_no_record() {
    let service = service_with(PipelineScript {
        initial_score: 95.0,
        ..Default::default()
    })
    .await;

    let outcome = service.generate_sync("Quick page").await.unwrap();
    assert_eq!(outcome.artifact, "<html>initial</html>");
    assert_eq!(outcome.iterations, 0);
    assert!(service.list_generations().is_empty());
}

#[tokio::test]
async fn test_config_update_and_reset() {
    let service = service_with(PipelineScript::default()).await;
    let startup = service.get_config();

    let patch = RuntimeConfigPatch {
        models: Some(ModelsPatch {
            coding: Some("other/coder".to_string()),
            ..Default::default()
        }),
        provider_url: None,
    };
    let updated = service.update_config(&patch).unwrap();
    assert_eq!(updated.models.coding, "other/coder");
    assert_eq!(service.get_config().models.coding, "other/coder");
    assert_eq!(updated.models.evaluation, startup.models.evaluation);

    let invalid = RuntimeConfigPatch {
        models: None,
        provider_url: Some("not a url".to_string()),
    };
    assert!(matches!(
        service.update_config(&invalid),
        Err(ServiceError::Config(_))
    ));
    assert_eq!(service.get_config().models.coding, "other/coder");

    let reset = service.reset_config();
    assert_eq!(reset, startup);
    assert_eq!(service.get_config().models.coding, CODER_MODEL);
}

#[tokio::test]
async fn test_new_runs_use_updated_models() {
    let provider = scripted_pipeline(PipelineScript {
        initial_score: 95.0,
        ..Default::default()
    });
    let service = GenerationService::builder(test_config())
        .provider(provider.clone())
        .build()
        .await
        .unwrap();

    service
        .update_config(&RuntimeConfigPatch {
            models: Some(ModelsPatch {
                coding: Some("second/coder".to_string()),
                ..Default::default()
            }),
            provider_url: None,
        })
        .unwrap();

    let record = service.start_generation("Use the new coder").unwrap();
    let done = wait_terminal(&service, &record).await;
    assert_eq!(done.status, GenerationStatus::Completed);
    assert_eq!(provider.calls_for_model("second/coder").len(), 1);
    assert!(provider.calls_for_model(CODER_MODEL).is_empty());
}

#[tokio::test]
async fn test_events_follow_lifecycle() {
    let service = service_with(PipelineScript::default()).await;
    let mut rx = service.events().subscribe();

    let record = service.start_generation("Event page").unwrap();
    wait_terminal(&service, &record).await;

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.generation_id, record.id);
        kinds.push(event.kind);
    }
    assert_eq!(kinds.first(), Some(&GenerationEventKind::Created));
    assert!(kinds.contains(&GenerationEventKind::Started));
    assert!(kinds.contains(&GenerationEventKind::Progress));
    assert_eq!(kinds.last(), Some(&GenerationEventKind::Completed));
}

#[tokio::test]
async fn test_shutdown_drains_and_rejects() {
    let service = service_with(PipelineScript {
        coder_delay: Duration::from_millis(50),
        ..Default::default()
    })
    .await;

    let record = service.start_generation("Drain me").unwrap();
    assert!(service.shutdown(Some(Duration::from_secs(10))).await);
    assert_eq!(
        service.get_status(record.id).unwrap().status,
        GenerationStatus::Completed
    );

    assert!(matches!(
        service.start_generation("Too late"),
        Err(ServiceError::Scheduler(_))
    ));
}

#[tokio::test]
async fn test_persistent_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.storage.data_dir = Some(dir.path().to_path_buf());

    let service = GenerationService::builder(config.clone())
        .provider(scripted_pipeline(PipelineScript::default()))
        .build()
        .await
        .unwrap();
    let record = service.start_generation("Persist me").unwrap();
    wait_terminal(&service, &record).await;
    assert!(service.shutdown(None).await);
    drop(service);

    let reopened = GenerationService::builder(config)
        .provider(scripted_pipeline(PipelineScript::default()))
        .build()
        .await
        .unwrap();
    let restored = reopened.get_status(record.id).unwrap();
    assert_eq!(restored.status, GenerationStatus::Completed);
    assert_eq!(
        reopened.get_artifact(record.id).await.unwrap(),
        "<html>refined</html>"
    );
}

#[tokio::test]
async fn test_interrupted_records_fail_on_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let store = GenerationStore::open(dir.path()).await.unwrap();
    let pending = store.create("never started");
    let running = store.create("was running");
    store.mark_generating(running.id).unwrap();
    store.flush().await.unwrap();
    drop(store);

    let reopened = GenerationStore::open(dir.path()).await.unwrap();
    for id in [pending.id, running.id] {
        let record = reopened.get(id).unwrap();
        assert_eq!(record.status, GenerationStatus::Failed);
        assert_eq!(record.error.as_deref(), Some(INTERRUPTED_BY_RESTART));
    }
}

#[tokio::test]
async fn test_unusable_namespace_is_rejected_at_build() {
    for namespace in ["", "../outside"] {
        let mut config = test_config();
        config.storage.namespace = namespace.to_string();
        let built = GenerationService::builder(config)
            .provider(scripted_pipeline(PipelineScript::default()))
            .build()
            .await;
        assert!(
            matches!(built, Err(ServiceError::Config(_))),
            "namespace {:?} was accepted",
            namespace
        );
    }
}
