//! API integration tests.

use axum::http::{Method, StatusCode};
use serde_json::json;

use callcanvas::ws::ServerEvent;

mod common;
use common::{
    ScriptedGenerator, WEBHOOK_TOKEN, dev_token, expect_status, json_body, next_event, request,
    test_app, test_app_with,
};

fn webhook(body: serde_json::Value, token: Option<&str>) -> axum::http::Request<axum::body::Body> {
    let mut req = request(Method::POST, "/webhooks/conversation-event", None, Some(body));
    if let Some(token) = token {
        req.headers_mut()
            .insert("x-webhook-token", token.parse().unwrap());
    }
    req
}

/// Test that health endpoint works without authentication.
#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let _display = app.join("conv-1", "alice");

    let response = app.send(request(Method::GET, "/health", None, None)).await;
    let json = expect_status(response, StatusCode::OK).await;

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["activeSessions"], 1);
    assert_eq!(json["generatorConfigured"], true);
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let app = test_app();

    let response = app
        .send(request(Method::GET, "/conversations", None, None))
        .await;
    let json = expect_status(response, StatusCode::UNAUTHORIZED).await;
    assert_eq!(json["code"], "missing_auth_header");

    let response = app
        .send(request(
            Method::GET,
            "/conversations",
            Some("not-a-jwt"),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_rejects_wrong_token() {
    let app = test_app_with(ScriptedGenerator::default(), Some(WEBHOOK_TOKEN));
    let event = json!({"type": "agent_response", "conversationId": "conv-1"});

    let response = app.send(webhook(event.clone(), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(webhook(event.clone(), Some("wrong"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(webhook(event, Some(WEBHOOK_TOKEN))).await;
    let json = expect_status(response, StatusCode::OK).await;
    assert_eq!(json["outcome"], "no_session");
}

#[tokio::test]
async fn test_webhook_without_session_creates_nothing() {
    let app = test_app();
    let event = json!({
        "type": "agent_response",
        "conversationId": "ghost",
        "toolCalls": [{"name": "generate_image", "arguments": {"prompt": "a barn"}}]
    });

    let response = app.send(webhook(event, None)).await;
    let json = expect_status(response, StatusCode::OK).await;

    assert_eq!(json["outcome"], "no_session");
    assert!(app.bridge.registry().is_empty());
    assert_eq!(app.generator.calls(), 0);
}

#[tokio::test]
async fn test_webhook_tool_call_reaches_display() {
    let app = test_app();
    let mut display = app.join("conv-1", "alice");
    assert!(matches!(
        next_event(&mut display).await,
        ServerEvent::Joined { .. }
    ));

    let event = json!({
        "type": "agent_response",
        "conversationId": "conv-1",
        "toolCalls": [{
            "name": "generate_image",
            "arguments": "{\"prompt\":\"a slate roof\",\"style\":\"modern\",\"aspectRatio\":\"1:1\"}"
        }]
    });
    let response = app.send(webhook(event, None)).await;
    let json = expect_status(response, StatusCode::OK).await;
    assert_eq!(json, json!({"outcome": "dispatched", "count": 1}));

    match next_event(&mut display).await {
        ServerEvent::ImageGenerating { prompt, .. } => assert_eq!(prompt, "a slate roof"),
        other => panic!("expected image_generating, got {:?}", other),
    }
    match next_event(&mut display).await {
        ServerEvent::ImageGenerated { image, .. } => {
            assert_eq!(image.url, "https://img.test/a-slate-roof.png");
            assert_eq!(image.aspect_ratio.as_str(), "1:1");
        }
        other => panic!("expected image_generated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_webhook_skips_malformed_tool_calls() {
    let app = test_app();
    let mut display = app.join("conv-1", "alice");
    next_event(&mut display).await;

    let event = json!({
        "type": "agent_response",
        "conversationId": "conv-1",
        "toolCalls": [
            {"name": 7},
            {"name": "generate_image", "arguments": {"prompt": "a pergola"}}
        ]
    });
    let json = expect_status(app.send(webhook(event, None)).await, StatusCode::OK).await;
    assert_eq!(json, json!({"outcome": "dispatched", "count": 1}));

    let event = json!({
        "type": "agent_response",
        "conversationId": "conv-1",
        "role": "agent",
        "message": "Let me show you a stone walkway.",
        "toolCalls": null
    });
    let json = expect_status(app.send(webhook(event, None)).await, StatusCode::OK).await;
    assert_eq!(json, json!({"outcome": "dispatched", "count": 1}));
}

#[tokio::test]
async fn test_webhook_end_signal_ends_session() {
    let app = test_app();
    let mut display = app.join("conv-1", "alice");
    next_event(&mut display).await;

    let event = json!({"type": "conversation_ended", "conversationId": "conv-1"});
    let json = expect_status(app.send(webhook(event, None)).await, StatusCode::OK).await;
    assert_eq!(json, json!({"outcome": "ended", "imageCount": 0}));

    assert!(matches!(
        next_event(&mut display).await,
        ServerEvent::SessionEnded { image_count: 0, .. }
    ));
    assert!(!app.bridge.registry().contains("conv-1"));
}

#[tokio::test]
async fn test_generate_list_and_end() {
    let app = test_app();
    let _display = app.join("conv-1", "alice");
    let token = dev_token("alice");

    let response = app
        .send(request(
            Method::POST,
            "/conversations/conv-1/images",
            Some(&token),
            Some(json!({"prompt": "a blue door", "style": "sketch"})),
        ))
        .await;
    let image = expect_status(response, StatusCode::CREATED).await;
    assert_eq!(image["prompt"], "a blue door");
    assert_eq!(image["style"], "sketch");
    assert_eq!(image["aspectRatio"], "16:9");
    assert_eq!(image["creditsUsed"], 1);

    let response = app
        .send(request(
            Method::GET,
            "/conversations/conv-1/images",
            Some(&token),
            None,
        ))
        .await;
    let list = expect_status(response, StatusCode::OK).await;
    assert_eq!(list["conversationId"], "conv-1");
    assert_eq!(list["images"].as_array().unwrap().len(), 1);
    assert_eq!(list["creditsUsed"], 1);

    let response = app
        .send(request(
            Method::GET,
            "/conversations",
            Some(&token),
            None,
        ))
        .await;
    let sessions = expect_status(response, StatusCode::OK).await;
    assert_eq!(sessions[0]["conversationId"], "conv-1");
    assert_eq!(sessions[0]["imageCount"], 1);
    assert_eq!(sessions[0]["bound"], true);

    let response = app
        .send(request(
            Method::DELETE,
            "/conversations/conv-1",
            Some(&token),
            None,
        ))
        .await;
    let ended = expect_status(response, StatusCode::OK).await;
    assert_eq!(ended["images"].as_array().unwrap().len(), 1);

    let response = app
        .send(request(
            Method::GET,
            "/conversations/conv-1/images",
            Some(&token),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_rejects_empty_prompt() {
    let app = test_app();
    let _display = app.join("conv-1", "alice");

    let response = app
        .send(request(
            Method::POST,
            "/conversations/conv-1/images",
            Some(&dev_token("alice")),
            Some(json!({"prompt": "   "})),
        ))
        .await;
    let json = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(app.generator.calls(), 0);
}

#[tokio::test]
async fn test_generation_failure_maps_to_bad_gateway() {
    let app = test_app_with(ScriptedGenerator::default().fail("a cursed image"), None);
    let mut display = app.join("conv-1", "alice");
    next_event(&mut display).await;

    let response = app
        .send(request(
            Method::POST,
            "/conversations/conv-1/images",
            Some(&dev_token("alice")),
            Some(json!({"prompt": "a cursed image"})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    assert!(matches!(
        next_event(&mut display).await,
        ServerEvent::ImageGenerating { .. }
    ));
    assert!(matches!(
        next_event(&mut display).await,
        ServerEvent::ImageError { .. }
    ));
    assert!(app.bridge.registry().contains("conv-1"));
}

#[tokio::test]
async fn test_other_users_are_forbidden() {
    let app = test_app();
    let _display = app.join("conv-1", "alice");

    let response = app
        .send(request(
            Method::GET,
            "/conversations/conv-1/images",
            Some(&dev_token("mallory")),
            None,
        ))
        .await;
    let json = expect_status(response, StatusCode::FORBIDDEN).await;
    assert_eq!(json["code"], "FORBIDDEN");

    let response = app
        .send(request(
            Method::DELETE,
            "/conversations/conv-1",
            Some(&dev_token("mallory")),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.bridge.registry().contains("conv-1"));

    let response = app
        .send(request(
            Method::GET,
            "/conversations/missing/images",
            Some(&dev_token("mallory")),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_can_list_all_sessions() {
    let app = test_app();
    let _a = app.join("conv-a", "alice");
    let _b = app.join("conv-b", "bob");

    let response = app
        .send(request(
            Method::GET,
            "/conversations?all=true",
            Some(&dev_token("alice")),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(request(
            Method::GET,
            "/conversations",
            Some(&dev_token("alice")),
            None,
        ))
        .await;
    let own = expect_status(response, StatusCode::OK).await;
    assert_eq!(own.as_array().unwrap().len(), 1);

    let admin = app.admin_token();
    let response = app
        .send(request(
            Method::GET,
            "/conversations?all=true",
            Some(&admin),
            None,
        ))
        .await;
    let all = expect_status(response, StatusCode::OK).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let response = app
        .send(request(
            Method::GET,
            "/conversations/conv-b/images",
            Some(&admin),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_agent_config_endpoint() {
    let app = test_app();
    let token = dev_token("alice");

    let response = app
        .send(request(
            Method::POST,
            "/agent/config",
            Some(&token),
            Some(json!({
                "name": "Sales",
                "conversational_config": {"prompt": {"prompt": "Be helpful."}}
            })),
        ))
        .await;
    let config = expect_status(response, StatusCode::OK).await;
    assert_eq!(config["name"], "Sales");
    assert_eq!(
        config["conversational_config"]["agent"]["tools"][0]["name"],
        "generate_image"
    );

    let response = app
        .send(request(
            Method::POST,
            "/agent/config",
            Some(&token),
            Some(json!("not an object")),
        ))
        .await;
    let json = json_body(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}
