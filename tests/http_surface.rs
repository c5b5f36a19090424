#![allow(missing_docs)]
// Integration tests for the HTTP surface over the real pipeline: in-process
// axum requests (tower oneshot) against stub LLM and mesh providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::json;
use tower::util::ServiceExt;

use eroom::config::{ModelParams, Prompts, ServerConfig};
use eroom::llm::{CompletionRequest, LlmError, LlmGateway, TextCompletion};
use eroom::mesh::MeshSubmitter;
use eroom::pipeline::{JobRunner, Pipeline};
use eroom::queue::QueueManager;
use eroom::server::{router, AppState};
use eroom::store::ResultStore;

const TOKEN: &str = "room-server-token";

// ── Stub providers ──

/// Scenario text on even calls, script text on odd calls; optional delay
/// to keep the single worker busy.
struct SlowAlternatingProvider {
    scenario_text: String,
    script_text: String,
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl TextCompletion for SlowAlternatingProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        tokio::time::sleep(self.delay).await;
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        if count.checked_rem(2) == Some(0) {
            Ok(self.scenario_text.clone())
        } else {
            Ok(self.script_text.clone())
        }
    }
}

struct OkMesh;

#[async_trait]
impl MeshSubmitter for OkMesh {
    async fn submit_model(&self, _prompt: &str, object_name: &str, key_index: usize) -> String {
        format!("track-{object_name}-{key_index}")
    }
}

// ── Fixtures ──

fn scenario_text(total: u32, difficulty: &str) -> String {
    let mut objects = vec![json!({"name": "GameManager", "type": "game_manager"})];
    objects.push(json!({
        "name": "ExitDoor",
        "type": "interactive_object",
        "interactive_description": "the way out",
        "visual_description": "oak door with iron bands",
    }));
    for n in 1..total {
        objects.push(json!({
            "name": format!("Prop{n}"),
            "type": "interactive_object",
            "interactive_description": format!("use prop {n}"),
            "visual_description": format!("prop number {n}"),
        }));
    }
    let scenario = json!({
        "scenario_data": {
            "theme": "pirate cove",
            "description": "a cove",
            "escape_condition": "open the door",
            "puzzle_flow": "linear",
            "exit_mechanism": "logic_unlock",
            "keyword_count": {"user": 2, "expanded": total.saturating_sub(2), "total": total},
            "difficulty": difficulty,
        },
        "object_instructions": objects,
    });
    format!("```json\n{scenario}\n```")
}

fn app_with_delay(delay: Duration) -> Router {
    let store = Arc::new(ResultStore::new());
    let config = Arc::new(ServerConfig {
        prompts: Prompts {
            scenario: "design a room".to_owned(),
            unified_scripts: "write the scripts".to_owned(),
        },
        model: ModelParams {
            name: "test-model".to_owned(),
            max_tokens: 1000,
            scenario_temperature: 0.9,
            script_temperature: 0.2,
        },
    });
    let provider = Arc::new(SlowAlternatingProvider {
        scenario_text: scenario_text(6, "normal"),
        script_text: "```csharp\npublic class GameManager {\n}\n```\n\
                      ```csharp\npublic class ExitDoor : Interactable {\n}\n```"
            .to_owned(),
        delay,
        calls: AtomicUsize::new(0),
    });
    let llm = Arc::new(LlmGateway::new(provider, config.model.clone()));
    let runner: Arc<dyn JobRunner> = Arc::new(Pipeline::new(
        config,
        llm,
        Arc::new(OkMesh),
        Arc::clone(&store),
    ));
    let queue = Arc::new(QueueManager::start(1, runner, Arc::clone(&store)));
    router(AppState {
        store,
        queue,
        api_token: TOKEN.to_owned(),
    })
}

fn app() -> Router {
    app_with_delay(Duration::ZERO)
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", TOKEN)
        .body(Body::empty())
        .expect("request")
}

fn post(uri: &str, payload: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .header("authorization", TOKEN)
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn creation_body() -> serde_json::Value {
    json!({
        "uuid": "u1",
        "theme": "pirate cove",
        "keywords": ["chest", "map"],
        "difficulty": "normal",
        "roomPrefab": "https://ex/r.txt",
    })
}

async fn submit(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post("/room/create", &creation_body()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "대기중");
    body["ruid"].as_str().expect("ruid").to_owned()
}

async fn poll_until_document(app: &Router, ruid: &str) -> serde_json::Value {
    let uri = format!("/room/result?ruid={ruid}");
    for _ in 0..300 {
        let response = app
            .clone()
            .oneshot(get(&uri))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        if body.get("success").is_some() {
            return body;
        }
        assert!(
            matches!(body["status"].as_str(), Some("QUEUED") | Some("PROCESSING")),
            "unexpected poll body: {body}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {ruid} never produced a document");
}

// ── Tests ──

#[tokio::test]
async fn test_s1_happy_path_end_to_end() {
    let app = app();
    let ruid = submit(&app).await;

    let document = poll_until_document(&app, &ruid).await;
    assert_eq!(document["success"], true);
    assert_eq!(document["ruid"], ruid.as_str());
    assert_eq!(document["uuid"], "u1");

    let mechanism = document["scenario"]["scenario_data"]["exit_mechanism"]
        .as_str()
        .expect("exit_mechanism");
    assert!(["key", "code", "logic_unlock"].contains(&mechanism));

    let scripts = document["scripts"].as_object().expect("scripts map");
    assert!(!scripts.is_empty());

    let interactive = document["scenario"]["object_instructions"]
        .as_array()
        .expect("objects")
        .iter()
        .filter(|o| o["type"] == "interactive_object")
        .count();
    assert_eq!(
        document["models"].as_array().expect("models").len(),
        interactive
    );

    // Deliver-once: the second poll is a 404.
    let response = app
        .oneshot(get(&format!("/room/result?ruid={ruid}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_s2_missing_uuid_is_400() {
    let app = app();
    let body = json!({
        "theme": "x",
        "keywords": ["k"],
        "roomPrefab": "https://u",
    });
    let response = app
        .oneshot(post("/room/create", &body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await["error"]
        .as_str()
        .expect("error")
        .to_owned();
    assert!(error.contains("uuid"), "error was: {error}");
}

#[tokio::test]
async fn test_s3_insecure_prefab_surfaces_as_failed_job() {
    let app = app();
    let mut body = creation_body();
    body["roomPrefab"] = json!("http://insecure");

    let response = app
        .clone()
        .oneshot(post("/room/create", &body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let ruid = body_json(response).await["ruid"]
        .as_str()
        .expect("ruid")
        .to_owned();

    let document = poll_until_document(&app, &ruid).await;
    assert_eq!(document["success"], false);
    assert!(document["error"].as_str().expect("error").contains("URL"));
}

#[tokio::test]
async fn test_s6_saturation_visible_in_queue_status() {
    let app = app_with_delay(Duration::from_millis(150));

    let first = submit(&app).await;
    let second = submit(&app).await;
    assert_ne!(first, second);

    // With one worker and a slow provider, the second job waits its turn.
    let mut saw_saturation = false;
    for _ in 0..20 {
        let response = app
            .clone()
            .oneshot(get("/queue/status"))
            .await
            .expect("response");
        let status = body_json(response).await;
        if status["active"] == 1 && status["queued"] == 1 {
            saw_saturation = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saw_saturation, "never observed queued=1 active=1");

    let doc_a = poll_until_document(&app, &first).await;
    let doc_b = poll_until_document(&app, &second).await;
    assert_eq!(doc_a["success"], true);
    assert_eq!(doc_b["success"], true);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = app();
    for uri in ["/queue/status", "/room/result?ruid=x"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "uri: {uri}");
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/room/create")
                .method("POST")
                .header("content-type", "application/json")
                .header("authorization", "wrong")
                .body(Body::from(creation_body().to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "인증 실패");
}
