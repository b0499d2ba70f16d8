mod common;

use std::sync::Arc;

use common::{Method, mock, record, server_error, settle};
use formctl::{
    CHANGED_TITLE, FieldRules, FormController, FormError, SendMethod, ServerValidationConfig,
    Severity, SubmitOutcome, TransportError,
};
use serde_json::json;

#[tokio::test]
async fn field_error_blocks_write_and_shows_validation() {
    let (transport, mut server) = mock();
    let form = FormController::builder(transport)
        .with_validator(FieldRules::new().required("name", "Name must not be empty"))
        .build();
    form.populate(record(json!({"name": "", "email": "a@x.com"})))
        .expect("populate");
    assert!(!form.is_validation_shown());

    let outcome = form.submit(SendMethod::Post, "/rest/users").await;
    assert_eq!(outcome.expect("submit"), SubmitOutcome::Invalid);
    assert!(form.is_validation_shown());
    assert_eq!(
        form.validation_message("name").as_deref(),
        Some("Name must not be empty")
    );
    settle().await;
    assert!(server.try_next().is_none(), "no request may be sent");
}

#[tokio::test]
async fn update_sends_snapshot_with_original_hash() {
    let (transport, mut server) = mock();
    let form = FormController::builder(transport).build();
    form.populate(record(json!({"name": "Alice", "hash": "h1"})))
        .expect("populate");
    form.set("name", json!("Bob"));

    let serve = async {
        let exchange = server.next().await;
        assert_eq!(exchange.method, Method::Put);
        assert_eq!(exchange.url, "/rest/users/1");
        assert_eq!(
            exchange.body,
            Some(json!({"name": "Bob", "originalHash": "h1", "namespace": 2}))
        );
        exchange.reply(json!(null));
    };
    let submit = form.submit_with(SendMethod::Put, "/rest/users/1", |payload| {
        payload.insert("namespace".to_string(), json!(2));
    });
    let (outcome, ()) = tokio::join!(submit, serve);
    assert!(outcome.expect("submit").is_submitted());
}

#[tokio::test]
async fn create_posts_values() {
    let (transport, mut server) = mock();
    let form = FormController::builder(transport).build();
    form.populate(record(json!({"name": "Alice"}))).expect("populate");

    let serve = async {
        let exchange = server.next().await;
        assert_eq!(exchange.method, Method::Post);
        assert_eq!(exchange.body, Some(json!({"name": "Alice"})));
        exchange.reply(json!({"id": 7}));
    };
    let (outcome, ()) = tokio::join!(form.on_submit(SendMethod::Post, "/rest/users"), serve);
    assert_eq!(outcome.expect("submit"), SubmitOutcome::Submitted);
    assert!(!form.is_disabled());
}

#[tokio::test]
async fn submission_waits_for_server_reconciliation() {
    let (transport, mut server) = mock();
    let form = FormController::builder(transport)
        .with_server_validation(ServerValidationConfig::new("/rest/validate", ["email"]))
        .with_validator(FieldRules::new().server_message("email"))
        .build();
    form.populate(record(json!({"email": "a@x.com"})))
        .expect("populate");

    let serve = async {
        let validation = server.next().await;
        assert_eq!(validation.url, "/rest/validate");
        settle().await;
        assert!(server.try_next().is_none(), "write must wait for validation");
        validation.reply(json!({}));

        let write = server.next().await;
        assert_eq!(write.method, Method::Put);
        assert_eq!(write.body, Some(json!({"email": "a@x.com"})));
        write.reply(json!(null));
    };
    let (outcome, ()) = tokio::join!(form.submit(SendMethod::Put, "/rest/users/1"), serve);
    assert_eq!(outcome.expect("submit"), SubmitOutcome::Submitted);
}

#[tokio::test]
async fn edit_after_reconciliation_is_confirmed_before_write() {
    let (transport, mut server) = mock();
    let form = Arc::new(
        FormController::builder(transport)
            .with_server_validation(ServerValidationConfig::new("/rest/validate", ["email"]))
            .with_validator(FieldRules::new().server_message("email"))
            .build(),
    );
    form.populate(record(json!({"email": "free@x.com"})))
        .expect("populate");
    let first = server.next().await;

    let editor = tokio::spawn({
        let form = Arc::clone(&form);
        let mut states = form.subscribe();
        async move {
            let confirmed = states
                .wait_for(|state| {
                    state
                        .field("email")
                        .is_some_and(|field| field.server_validated)
                })
                .await
                .expect("state channel");
            drop(confirmed);
            form.set("email", json!("taken@x.com"));
        }
    });
    let submit = tokio::spawn({
        let form = Arc::clone(&form);
        async move { form.submit(SendMethod::Put, "/rest/users/1").await }
    });
    settle().await;

    first.reply(json!({}));
    editor.await.expect("editor");

    let second = server.next().await;
    assert_eq!(second.method, Method::Post);
    assert_eq!(second.url, "/rest/validate");
    assert_eq!(second.body, Some(json!({"email": "taken@x.com"})));
    second.reply(json!({}));

    let write = server.next().await;
    assert_eq!(write.method, Method::Put);
    assert_eq!(write.body, Some(json!({"email": "taken@x.com"})));
    let email = form.snapshot().field("email").cloned().expect("email field");
    assert!(email.server_validated);
    assert_eq!(email.server_value, Some(json!("taken@x.com")));
    write.reply(json!(null));

    let outcome = submit.await.expect("join").expect("submit");
    assert_eq!(outcome, SubmitOutcome::Submitted);
}

#[tokio::test]
async fn server_reported_issue_blocks_submission() {
    let (transport, mut server) = mock();
    let form = FormController::builder(transport)
        .with_server_validation(ServerValidationConfig::new("/rest/validate", ["email"]))
        .with_validator(FieldRules::new().server_message("email"))
        .build();
    form.populate(record(json!({"email": "taken@x.com"})))
        .expect("populate");

    let serve = async {
        server
            .next()
            .await
            .reply(json!({"email": "Email already used"}));
    };
    let (outcome, ()) = tokio::join!(form.on_submit(SendMethod::Put, "/rest/users/1"), serve);
    assert_eq!(outcome.expect("submit"), SubmitOutcome::Invalid);
    assert_eq!(
        form.validation_message("email").as_deref(),
        Some("Email already used")
    );
    assert!(!form.is_disabled());
    settle().await;
    assert!(server.try_next().is_none());
}

#[tokio::test]
async fn concurrent_change_disables_form() {
    let (transport, mut server) = mock();
    let form = FormController::builder(transport).build();
    form.populate(record(json!({"name": "Alice", "hash": "h1"})))
        .expect("populate");

    let serve = async {
        let exchange = server.next().await;
        assert!(form.is_disabled(), "form is disabled while submitting");
        let url = exchange.url.clone();
        exchange.fail(TransportError::Changed { url });
    };
    let (outcome, ()) = tokio::join!(form.on_submit(SendMethod::Put, "/rest/users/1"), serve);
    assert_eq!(outcome.expect("handled"), SubmitOutcome::Conflict);
    assert!(form.is_disabled());
    let status = form.status();
    assert_eq!(status.severity(), Severity::Danger);
    assert!(status.text().starts_with(CHANGED_TITLE));
}

#[tokio::test]
async fn raw_submit_propagates_conflict() {
    let (transport, mut server) = mock();
    let form = FormController::builder(transport).build();
    form.populate(record(json!({"name": "Alice"}))).expect("populate");

    let serve = async {
        let exchange = server.next().await;
        let url = exchange.url.clone();
        exchange.fail(TransportError::Changed { url });
    };
    let (outcome, ()) = tokio::join!(form.submit(SendMethod::Put, "/rest/users/1"), serve);
    let err = outcome.expect_err("conflict propagates");
    assert!(err.is_changed());
    assert!(form.status().is_empty());
}

#[tokio::test]
async fn other_failures_propagate_and_reenable() {
    let (transport, mut server) = mock();
    let form = FormController::builder(transport).build();
    form.populate(record(json!({"name": "Alice"}))).expect("populate");

    let serve = async {
        server
            .next()
            .await
            .fail(server_error("/rest/users/1", 500));
    };
    let (outcome, ()) = tokio::join!(form.on_submit(SendMethod::Put, "/rest/users/1"), serve);
    match outcome {
        Err(FormError::Transport(TransportError::Status { status, .. })) => {
            assert_eq!(status, 500)
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    assert!(!form.is_disabled());
    assert!(form.status().is_empty());
}

#[tokio::test]
async fn submit_before_load_fails_with_server_validation() {
    let (transport, _server) = mock();
    let form = FormController::builder(transport)
        .with_server_validation(ServerValidationConfig::new("/rest/validate", ["email"]))
        .build();
    let outcome = form.on_submit(SendMethod::Post, "/rest/users").await;
    assert!(matches!(outcome, Err(FormError::NotReady)));
    assert!(!form.is_disabled());
}
