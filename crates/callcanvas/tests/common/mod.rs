//! Test utilities and common setup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode, header};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use callcanvas::api::{self, AppState};
use callcanvas::auth::{AuthConfig, AuthState, Role};
use callcanvas::bridge::{BridgeConfig, ClientChannel, SessionBridge};
use callcanvas::generation::{
    GenerationError, GenerationResult, ImageGenerator, ImageModel, ImageResult,
};
use callcanvas::trigger::{TriggerExtractor, TriggerRequest};
use callcanvas::ws::ServerEvent;

pub const TEST_JWT_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";
pub const WEBHOOK_TOKEN: &str = "hook-secret";

/// Generator answering from a script keyed by prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn delay(mut self, prompt: &str, delay: Duration) -> Self {
        self.delays.insert(prompt.to_string(), delay);
        self
    }

    pub fn fail(mut self, prompt: &str) -> Self {
        self.failures.insert(prompt.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _user_id: &str,
        request: &TriggerRequest,
    ) -> GenerationResult<ImageResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&request.prompt) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.contains(&request.prompt) {
            return Err(GenerationError::PredictionFailed(
                "content flagged".to_string(),
            ));
        }
        Ok(image_for(&request.prompt))
    }
}

pub fn image_for(prompt: &str) -> ImageResult {
    ImageResult {
        url: format!("https://img.test/{}.png", prompt.replace(' ', "-")),
        credits_used: 1,
        model: ImageModel::FluxSchnell,
    }
}

/// Create a test AuthConfig with dev tokens and a JWT secret.
pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        dev_mode: true,
        jwt_secret: Some(TEST_JWT_SECRET.to_string()),
        ..Default::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub bridge: Arc<SessionBridge>,
    pub generator: Arc<ScriptedGenerator>,
}

impl TestApp {
    /// Bind a display for `user` as the websocket handler would.
    pub fn join(&self, conversation_id: &str, user: &str) -> mpsc::Receiver<ServerEvent> {
        let (channel, rx) = ClientChannel::new(64);
        self.bridge
            .join(conversation_id, user, channel)
            .expect("join should succeed");
        rx
    }

    pub fn admin_token(&self) -> String {
        self.state
            .auth
            .generate_token("admin", Role::Admin)
            .expect("token")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn test_app() -> TestApp {
    test_app_with(ScriptedGenerator::default(), None)
}

pub fn test_app_with(generator: ScriptedGenerator, webhook_token: Option<&str>) -> TestApp {
    let generator = Arc::new(generator);
    let bridge = Arc::new(SessionBridge::new(
        generator.clone(),
        TriggerExtractor::default(),
        BridgeConfig::default(),
    ));
    let state = AppState::new(Arc::clone(&bridge), AuthState::new(test_auth_config()))
        .with_webhook_token(webhook_token.map(str::to_string));
    let router = api::create_router(state.clone());

    TestApp {
        router,
        state,
        bridge,
        generator,
    }
}

pub fn dev_token(user: &str) -> String {
    format!("dev:{}", user)
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn expect_status(response: Response<Body>, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    json_body(response).await
}

/// Receive the next event, failing the test after a timeout.
pub async fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}
