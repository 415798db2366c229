//! Integration tests for the request pipeline, driven through the router.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{Method, Request, StatusCode};
use common::{
    body_json, body_text, build_routes, get, object, post_json, send, with_session,
    RecordingRenderer,
};
use serde_json::{json, Map, Value};
use triage_api::config::PipelineSettings;
use triage_api::descriptor::{
    authorize_fn, handler_fn, AllowAll, RouteDefinition, RouteHandler,
};
use triage_api::registrar::Registrar;
use triage_api::render::{Rendered, TemplateRenderer};
use triage_api::request::{Reply, RouteRequest, RouteResponse, Session, REDIRECT_TO_KEY};
use triage_api::{RouteError, Verb};
use triage_core::policy::{AuthorizationMode, LocalsPolicy};
use triage_core::validation::{FieldRule, Rule, RuleSchema};

fn route(verb: Verb, path: &str) -> RouteDefinition {
    RouteDefinition::new()
        .verb(verb)
        .path(path)
        .authorization(AllowAll)
}

fn success() -> RouteDefinition {
    route(Verb::Get, "/success")
        .template("success")
        .handler(handler_fn(|_, _| Reply::payload(json!({ "success": true }))))
}

fn lenient() -> PipelineSettings {
    PipelineSettings {
        authorization_mode: AuthorizationMode::Lenient,
        ..PipelineSettings::default()
    }
}

/// Yields once before answering, so the pipeline has to await it.
struct Deferred(Result<Value, String>);

#[async_trait]
impl RouteHandler for Deferred {
    async fn handle(
        &self,
        _req: &mut RouteRequest,
        _res: &mut RouteResponse,
    ) -> Result<Reply, RouteError> {
        tokio::task::yield_now().await;
        match &self.0 {
            Ok(value) => Reply::payload(value),
            Err(message) => Err(RouteError::handler(message.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Test: a returned payload is rendered exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn returned_payload_is_rendered() {
    let renderer = RecordingRenderer::new();
    let app = build_routes(&renderer, PipelineSettings::default(), vec![success()]);

    let response = get(app, "/success").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "rendered success");

    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].template, "success");
    assert_eq!(calls[0].payload["success"], true);
}

// ---------------------------------------------------------------------------
// Test: a returned error is reported with its message unchanged
// ---------------------------------------------------------------------------

#[tokio::test]
async fn returned_error_is_reported() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/error")
        .template("error")
        .handler(handler_fn(|_, _| Err(RouteError::handler("this is an error"))));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = get(app, "/error").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "this is an error");
    assert_eq!(json["code"], "HANDLER_ERROR");
    assert!(renderer.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Test: an explicit http error status is used for the report
// ---------------------------------------------------------------------------

#[tokio::test]
async fn explicit_http_error_status_is_used() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/gone").handler(handler_fn(|_, _| {
        Err(RouteError::handler("resource is gone").with_status(410))
    }));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = get(app, "/gone").await;

    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(body_json(response).await["error"], "resource is gone");
}

// ---------------------------------------------------------------------------
// Test: a handled reply suppresses render and error reporting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handled_reply_returns_handler_response() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/handled")
        .template("never")
        .handler(handler_fn(|_, res| {
            res.send(StatusCode::CREATED, "custom response");
            Ok(Reply::Handled)
        }));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = get(app, "/handled").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_text(response).await, "custom response");
    assert!(renderer.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Test: async handlers that fulfil render, those that reject report
// ---------------------------------------------------------------------------

#[tokio::test]
async fn async_fulfilment_is_rendered() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/deferred")
        .template("deferred")
        .handler(Deferred(Ok(json!({ "success": true }))));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = get(app, "/deferred").await;

    assert_eq!(response.status(), StatusCode::OK);
    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload["success"], true);
}

#[tokio::test]
async fn async_rejection_is_reported() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/deferred")
        .template("deferred")
        .handler(Deferred(Err("this is an error".into())));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = get(app, "/deferred").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "this is an error");
    assert!(renderer.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Test: failed authorization redirects to sign-in and remembers the URL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unauthenticated_request_redirects_to_signin() {
    let renderer = RecordingRenderer::new();
    let definition = RouteDefinition::new()
        .verb(Verb::Get)
        .path("/user_not_authenticated")
        .template("secret")
        .authorization(authorize_fn(|_| Err(RouteError::handler("not authorized"))))
        .handler(handler_fn(|_, _| Reply::payload(json!({ "secret": true }))));
    let session = Session::new();
    let app = with_session(
        build_routes(&renderer, PipelineSettings::default(), vec![definition]),
        &session,
    );

    let response = get(app, "/user_not_authenticated").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[LOCATION], "/user");
    assert_eq!(
        session.get(REDIRECT_TO_KEY),
        Some(json!("%2Fuser_not_authenticated"))
    );
    assert!(renderer.calls().is_empty());
}

#[tokio::test]
async fn redirect_target_keeps_the_query_string() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/private")
        .authorization(authorize_fn(|_| Err(RouteError::unauthorized("no"))))
        .handler(handler_fn(|_, _| Ok(Reply::Empty)));
    let session = Session::new();
    let settings = PipelineSettings {
        signin_path: "/login".into(),
        ..PipelineSettings::default()
    };
    let app = with_session(build_routes(&renderer, settings, vec![definition]), &session);

    let response = get(app, "/private?tab=a%20b").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[LOCATION], "/login");
    assert_eq!(
        session.get(REDIRECT_TO_KEY),
        Some(json!("%2Fprivate%3Ftab%3Da%2520b"))
    );
}

#[tokio::test]
async fn unauthorized_without_session_still_redirects() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/private")
        .authorization(authorize_fn(|_| Err(RouteError::unauthorized("no"))))
        .handler(handler_fn(|_, _| Ok(Reply::Empty)));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = get(app, "/private").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[LOCATION], "/user");
}

#[tokio::test]
async fn authenticated_request_is_rendered() {
    let renderer = RecordingRenderer::new();
    let definition = RouteDefinition::new()
        .verb(Verb::Get)
        .path("/user_authenticated")
        .template("secret")
        .authorization(authorize_fn(|req| match req.session().and_then(|s| s.get("user")) {
            Some(_) => Ok(()),
            None => Err(RouteError::unauthorized("not authorized")),
        }))
        .handler(handler_fn(|_, _| Reply::payload(json!({ "secret": true }))));
    let session = Session::from_map(object(json!({ "user": "ada" })));
    let app = with_session(
        build_routes(&renderer, PipelineSettings::default(), vec![definition]),
        &session,
    );

    let response = get(app, "/user_authenticated").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(renderer.calls().len(), 1);
    assert_eq!(session.get(REDIRECT_TO_KEY), None);
}

// ---------------------------------------------------------------------------
// Test: static locals under both locals policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn static_locals_are_merged_into_payload() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/locals")
        .template("locals")
        .local("title", "declared")
        .local("nav", json!(["home"]))
        .handler(handler_fn(|_, _| {
            Reply::payload(json!({ "title": "from handler", "success": true }))
        }));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    get(app, "/locals").await;

    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload["title"], "declared");
    assert_eq!(calls[0].payload["nav"], json!(["home"]));
    assert_eq!(calls[0].payload["success"], true);
    assert!(calls[0].locals.is_empty());
}

#[tokio::test]
async fn static_locals_can_apply_to_response_locals() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/locals")
        .template("locals")
        .local("title", "declared")
        .handler(handler_fn(|_, _| Reply::payload(json!({ "success": true }))));
    let settings = PipelineSettings {
        locals_policy: LocalsPolicy::ApplyToResponseLocals,
        ..PipelineSettings::default()
    };
    let app = build_routes(&renderer, settings, vec![definition]);

    get(app, "/locals").await;

    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].locals["title"], "declared");
    assert!(!calls[0].payload.contains_key("title"));
}

// ---------------------------------------------------------------------------
// Test: session fields default into the payload only when absent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_email_defaults_into_payload() {
    let renderer = RecordingRenderer::new();
    let definitions = vec![
        route(Verb::Get, "/implicit")
            .template("profile")
            .handler(handler_fn(|_, _| Ok(Reply::Empty))),
        route(Verb::Get, "/explicit")
            .template("profile")
            .handler(handler_fn(|_, _| {
                Reply::payload(json!({ "email": "other@example.com" }))
            })),
    ];
    let session = Session::from_map(object(json!({ "email": "ada@example.com" })));
    let app = with_session(
        build_routes(&renderer, PipelineSettings::default(), definitions),
        &session,
    );

    get(app.clone(), "/implicit").await;
    get(app, "/explicit").await;

    let calls = renderer.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].payload["email"], "ada@example.com");
    assert_eq!(calls[1].payload["email"], "other@example.com");
}

// ---------------------------------------------------------------------------
// Test: validation runs before authorization and the handler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_failure_is_reported_as_400() {
    let renderer = RecordingRenderer::new();
    let authorized = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&authorized);
    let definition = RouteDefinition::new()
        .verb(Verb::Post)
        .path("/signup")
        .template("signup")
        .validation(RuleSchema::default().rule(FieldRule::new("name", Rule::Required)))
        .authorization(authorize_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .handler(handler_fn(|_, _| Ok(Reply::Empty)));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = post_json(app, "/signup", json!({})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "\"name\" is required");
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(authorized.load(Ordering::SeqCst), 0);
    assert!(renderer.calls().is_empty());
}

#[tokio::test]
async fn handler_sees_normalized_body() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Post, "/search")
        .validation(RuleSchema::default().rule(FieldRule::new(
            "page",
            Rule::Default { value: json!(1) },
        )))
        .handler(handler_fn(|req, _| Reply::payload(&req.body)));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = post_json(app, "/search", json!({ "q": "rust" })).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(body_json(response).await, json!({ "q": "rust", "page": 1 }));
}

#[tokio::test]
async fn malformed_json_body_is_a_validation_error() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Post, "/search").handler(handler_fn(|_, _| Ok(Reply::Empty)));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri("/search")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn urlencoded_form_body_is_validated() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Post, "/signin")
        .validation(RuleSchema::default().rule(FieldRule::new("email", Rule::Required)))
        .handler(handler_fn(|req, _| Reply::payload(&req.body)));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri("/signin")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("email=a%40b.c&remember=on"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "email": "a@b.c", "remember": "on" })
    );
}

#[tokio::test]
async fn form_body_missing_required_field_is_400() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Post, "/signin")
        .validation(RuleSchema::default().rule(FieldRule::new("email", Rule::Required)))
        .handler(handler_fn(|_, _| Ok(Reply::Empty)));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri("/signin")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("password=secret"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "\"email\" is required");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Post, "/upload").handler(handler_fn(|_, _| Ok(Reply::Empty)));
    let settings = PipelineSettings {
        body_limit_bytes: 8,
        ..PipelineSettings::default()
    };
    let app = build_routes(&renderer, settings, vec![definition]);

    let response = post_json(app, "/upload", json!({ "data": "far more than eight bytes" })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: parameter setup feeds the later stages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn set_params_output_reaches_handler() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Get, "/items/{id}")
        .template("item")
        .set_params(|req| {
            let id: u64 = req
                .param("id")
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| RouteError::validation("id must be numeric"))?;
            req.derived.insert("id".into(), json!(id));
            Ok(())
        })
        .handler(handler_fn(|req, _| {
            Reply::payload(json!({
                "id": req.derived["id"],
                "view": req.query_param("view"),
            }))
        }));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let ok = get(app.clone(), "/items/42?view=full").await;
    let bad = get(app, "/items/abc").await;

    assert_eq!(ok.status(), StatusCode::OK);
    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload["id"], 42);
    assert_eq!(calls[0].payload["view"], "full");

    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(bad).await["error"], "id must be numeric");
}

// ---------------------------------------------------------------------------
// Test: lenient mode lets routes without authorization through
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lenient_mode_proceeds_without_authorization() {
    let renderer = RecordingRenderer::new();
    let definition = RouteDefinition::new()
        .verb(Verb::Get)
        .path("/open")
        .template("open")
        .handler(handler_fn(|_, _| Ok(Reply::Empty)));
    let app = build_routes(&renderer, lenient(), vec![definition]);

    let response = get(app, "/open").await;

    assert_eq!(response.status(), StatusCode::OK);
    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].payload.is_empty());
}

// ---------------------------------------------------------------------------
// Test: replies without a template
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_reply_without_template_leaves_response_as_built() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Delete, "/items/{id}").handler(handler_fn(|_, res| {
        res.set_status(StatusCode::NO_CONTENT);
        Ok(Reply::Empty)
    }));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = send(
        app,
        Request::builder()
            .method(Method::DELETE)
            .uri("/items/7")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn handler_redirect_suppresses_render() {
    let renderer = RecordingRenderer::new();
    let definition = route(Verb::Post, "/logout")
        .template("never")
        .handler(handler_fn(|_, res| {
            res.redirect(StatusCode::SEE_OTHER, "/")?;
            Reply::payload(json!({ "ignored": true }))
        }));
    let app = build_routes(&renderer, PipelineSettings::default(), vec![definition]);

    let response = post_json(app, "/logout", json!({})).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], "/");
    assert!(renderer.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Test: a renderer failure is reported through the error stage
// ---------------------------------------------------------------------------

struct FailingRenderer;

impl TemplateRenderer for FailingRenderer {
    fn render(
        &self,
        _template: &str,
        _payload: &Map<String, Value>,
        _locals: &Map<String, Value>,
    ) -> Result<Rendered, RouteError> {
        Err(RouteError::render("template missing"))
    }
}

#[tokio::test]
async fn render_failure_is_reported_as_500() {
    let mut registrar = Registrar::new(Arc::new(FailingRenderer), PipelineSettings::default());
    registrar.register_definition(success(), "tests/success").unwrap();

    let response = get(registrar.into_router(), "/success").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "template missing");
    assert_eq!(json["code"], "RENDER_ERROR");
}
