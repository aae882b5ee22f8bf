use genui_ai::testing::{ScriptedProvider, ScriptedReply};
use genui_ai::{CallOptions, GatewayError, GatewayPolicy, Message, ModelGateway, OutputShape};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Verdict {
    name: String,
    score: f64,
}

fn policy(max_attempts: u32) -> GatewayPolicy {
    GatewayPolicy {
        max_attempts,
        call_timeout: Duration::from_secs(5),
        retry_backoff: Duration::ZERO,
    }
}

fn messages() -> Vec<Message> {
    vec![Message::system("judge"), Message::user("rate this")]
}

fn gateway(provider: &Arc<ScriptedProvider>, policy: GatewayPolicy) -> ModelGateway {
    ModelGateway::new(provider.clone(), policy)
}

#[tokio::test]
async fn test_structured_retries_until_valid() {
    let provider = Arc::new(ScriptedProvider::from_queue(vec![
        ScriptedReply::content("I think it is good"),
        ScriptedReply::json(json!({"name": "v1"})),
        ScriptedReply::json(json!({"name": "v1", "score": 81.5})),
    ]));
    let gateway = gateway(&provider, policy(3));

    let verdict: Verdict = gateway
        .complete_structured(
            "eval-model",
            &messages(),
            &OutputShape::strict::<Verdict>("verdict"),
            CallOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        verdict,
        Verdict {
            name: "v1".to_string(),
            score: 81.5
        }
    );
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_structured_reports_last_failure_after_exhaustion() {
    let provider = Arc::new(ScriptedProvider::new(|_| ScriptedReply::content("nope")));
    let gateway = gateway(&provider, policy(3));

    let err = gateway
        .complete_structured::<Verdict>(
            "eval-model",
            &messages(),
            &OutputShape::strict::<Verdict>("verdict"),
            CallOptions::default(),
        )
        .await
        .unwrap_err();

    match &err {
        GatewayError::RetriesExhausted {
            attempts, model, ..
        } => {
            assert_eq!(*attempts, 3);
            assert_eq!(model, "eval-model");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(matches!(err.last_attempt(), GatewayError::InvalidJson(_)));
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_semantic_check_failure_is_retried() {
    let provider = Arc::new(ScriptedProvider::from_queue(vec![
        ScriptedReply::json(json!({"name": "", "score": 50})),
        ScriptedReply::json(json!({"name": "ok", "score": 50})),
    ]));
    let gateway = gateway(&provider, policy(3));

    let verdict: Verdict = gateway
        .complete_structured_checked(
            "eval-model",
            &messages(),
            &OutputShape::strict::<Verdict>("verdict"),
            CallOptions::default(),
            |v: &Verdict| {
                if v.name.is_empty() {
                    Err("name must not be empty".to_string())
                } else {
                    Ok(())
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(verdict.name, "ok");
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_shape_controls_response_format() {
    let provider = Arc::new(ScriptedProvider::new(|_| {
        ScriptedReply::json(json!({"name": "a", "score": 1}))
    }));
    let gateway = gateway(&provider, policy(1));

    let _: Verdict = gateway
        .complete_structured(
            "m",
            &messages(),
            &OutputShape::strict::<Verdict>("verdict"),
            CallOptions::default().temperature(0.2),
        )
        .await
        .unwrap();
    let _: Verdict = gateway
        .complete_structured(
            "m",
            &messages(),
            &OutputShape::advisory::<Verdict>("verdict"),
            CallOptions::default(),
        )
        .await
        .unwrap();

    let calls = provider.calls();
    assert_eq!(calls[0].schema_name(), Some("verdict"));
    assert_eq!(calls[0].config.temperature, Some(0.2));
    assert!(calls[1].wants_json());
    assert_eq!(calls[1].schema_name(), None);
}

#[tokio::test]
async fn test_empty_output_parses_as_empty_object() {
    let provider = Arc::new(ScriptedProvider::new(|_| ScriptedReply::content("")));
    let gateway = gateway(&provider, policy(1));

    let value = gateway
        .complete_json("m", &messages(), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(value, json!({}));
}

#[tokio::test]
async fn test_slow_attempt_times_out_and_retries() {
    let provider = Arc::new(ScriptedProvider::new(|call| {
        if call.index == 0 {
            ScriptedReply::content("late").after(Duration::from_millis(500))
        } else {
            ScriptedReply::content("  on time \n")
        }
    }));
    let gateway = gateway(
        &provider,
        GatewayPolicy {
            max_attempts: 2,
            call_timeout: Duration::from_millis(50),
            retry_backoff: Duration::ZERO,
        },
    );

    let text = gateway
        .complete_text("coding-model", &messages(), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "on time");
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_timeout_on_every_attempt() {
    let provider = Arc::new(ScriptedProvider::new(|_| {
        ScriptedReply::content("late").after(Duration::from_millis(300))
    }));
    let gateway = gateway(
        &provider,
        GatewayPolicy {
            max_attempts: 2,
            call_timeout: Duration::from_millis(20),
            retry_backoff: Duration::ZERO,
        },
    );

    let err = gateway
        .complete_text("m", &messages(), CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err.last_attempt(), GatewayError::Timeout(_)));
}

#[tokio::test]
async fn test_samples_keep_request_order() {
    let provider = Arc::new(ScriptedProvider::new(|call| match call.index {
        0 => ScriptedReply::content("first").after(Duration::from_millis(60)),
        1 => ScriptedReply::content("second").after(Duration::from_millis(10)),
        _ => ScriptedReply::content("third"),
    }));
    let gateway = gateway(&provider, policy(1));

    let samples = gateway
        .complete_text_samples("coding-model", &messages(), 3, CallOptions::default())
        .await
        .unwrap();
    assert_eq!(samples, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_one_failed_sample_retries_whole_batch() {
    let provider = Arc::new(ScriptedProvider::new(|call| {
        if call.index == 1 {
            ScriptedReply::fail("upstream 502")
        } else {
            ScriptedReply::content(format!("sample {}", call.index))
        }
    }));
    let gateway = gateway(&provider, policy(3));

    let samples = gateway
        .complete_text_samples("coding-model", &messages(), 3, CallOptions::default())
        .await
        .unwrap();
    assert_eq!(samples.len(), 3);
    assert_eq!(provider.call_count(), 6);
}

#[tokio::test]
async fn test_zero_samples_is_rejected_without_calls() {
    let provider = Arc::new(ScriptedProvider::new(|_| ScriptedReply::content("x")));
    let gateway = gateway(&provider, policy(3));

    let err = gateway
        .complete_text_samples("m", &messages(), 0, CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest(_)));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_transport_errors_surface_after_retries() {
    let provider = Arc::new(ScriptedProvider::new(|_| ScriptedReply::fail("connection refused")));
    let gateway = gateway(&provider, policy(2));

    let err = gateway
        .complete_text("m", &messages(), CallOptions::default())
        .await
        .unwrap_err();
    match err.last_attempt() {
        GatewayError::Transport(message) => assert!(message.contains("connection refused")),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(provider.call_count(), 2);
}
