//! End-to-end tests of the HTTP surface.
//!
//! The router is served on an ephemeral port with in-process collaborators:
//! an in-memory knowledge store, a letter-frequency embedder, an echoing
//! chat model, a fixed-HTML renderer and a deterministic shortener.

use async_trait::async_trait;
use grounded_chat::config::Config;
use grounded_chat::embedding::EmbeddingProvider;
use grounded_chat::llm::ChatModel;
use grounded_chat::models::{ChatMessage, Role};
use grounded_chat::pipeline::{ChatService, UPLOAD_SUCCESS_MESSAGE};
use grounded_chat::render::PageRenderer;
use grounded_chat::server::build_router;
use grounded_chat::shorten::UrlShortener;
use grounded_chat::store::InMemoryKnowledgeStore;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_ascii_lowercase().chars() {
                    if c.is_ascii_lowercase() {
                        v[(c as u8 - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Replies with the final prompt; remembers every message list it saw.
struct EchoModel {
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ChatModel for EchoModel {
    async fn invoke(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
    }
}

struct HtmlRenderer;

#[async_trait]
impl PageRenderer for HtmlRenderer {
    async fn render(&self, url: &str) -> anyhow::Result<String> {
        Ok(format!(
            "<html><body><style>p {{}}</style><p>Rendered  {}</p></body></html>",
            url.trim_start_matches("https://")
        ))
    }
}

struct PrefixShortener;

#[async_trait]
impl UrlShortener for PrefixShortener {
    async fn shorten(&self, _url: &str) -> anyhow::Result<String> {
        Ok("https://is.gd/e2e".to_string())
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    model: Arc<EchoModel>,
    _tmp: TempDir,
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let config: Config = toml::from_str(&format!(
        "[db]\npath = \"{0}/unused.sqlite\"\n\n[uploads]\ndir = \"{0}/uploads\"\n\n[server]\nbind = \"127.0.0.1:0\"\n",
        tmp.path().display()
    ))
    .unwrap();

    let model = Arc::new(EchoModel {
        calls: Mutex::new(Vec::new()),
    });
    let service = ChatService::new(
        &config,
        Arc::new(InMemoryKnowledgeStore::new(Arc::new(LetterEmbedder))),
        model.clone(),
        Arc::new(HtmlRenderer),
        Arc::new(PrefixShortener),
    )
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(Arc::new(service));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        model,
        _tmp: tmp,
    }
}

impl TestServer {
    async fn upload(&self, form: Form) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}/upload", self.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn chat(&self, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}/chat", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

fn text_file(name: &str, text: &str) -> Part {
    Part::bytes(text.as_bytes().to_vec())
        .file_name(name.to_string())
        .mime_str("text/plain")
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let server = start_server().await;
    let body: Value = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn upload_then_chat_answers_from_retrieved_chunks() {
    let server = start_server().await;

    let (status, body) = server
        .upload(Form::new().part("files", text_file("notes.txt", "no links here")))
        .await;
    assert_eq!(status, 200, "upload failed: {}", body);
    assert_eq!(body["message"], UPLOAD_SUCCESS_MESSAGE);

    let (status, body) = server
        .chat(json!({ "query": "what does the document say?" }))
        .await;
    assert_eq!(status, 200, "chat failed: {}", body);

    let response = body["response"].as_str().unwrap();
    assert!(!response.is_empty());
    assert!(response.contains("Context:\nno links here"));
}

#[tokio::test]
async fn chat_before_any_upload_is_rejected() {
    let server = start_server().await;

    let (status, body) = server.chat(json!({ "query": "anything in there?" })).await;
    assert_eq!(status, 400);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Knowledge base is not yet built."));
}

#[tokio::test]
async fn url_query_is_answered_without_upload() {
    let server = start_server().await;

    let (status, body) = server
        .chat(json!({ "query": "what is on https://example.com/news?" }))
        .await;
    assert_eq!(status, 200, "chat failed: {}", body);

    let response = body["response"].as_str().unwrap();
    assert!(response.contains("Rendered\nexample.com/news"));
    assert!(response.ends_with("Question:\nwhat is on"));
}

#[tokio::test]
async fn missing_query_is_bad_request() {
    let server = start_server().await;

    let (status, body) = server.chat(json!({ "history": [] })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid request: 'query' field is required.");

    let resp = server
        .client
        .post(format!("{}/chat", server.base))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn empty_upload_is_bad_request() {
    let server = start_server().await;

    let (status, body) = server.upload(Form::new().text("unrelated", "x")).await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().starts_with("No files"));
}

#[tokio::test]
async fn more_than_three_files_is_bad_request() {
    let server = start_server().await;

    let mut form = Form::new();
    for i in 0..4 {
        form = form.part("files", text_file(&format!("f{}.txt", i), "some text"));
    }
    let (status, body) = server.upload(form).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "You can upload a maximum of 3 documents.");
}

#[tokio::test]
async fn blank_upload_reports_no_content() {
    let server = start_server().await;

    let (status, body) = server
        .upload(Form::new().part("files", text_file("blank.txt", "   ")))
        .await;
    assert_eq!(status, 400);
    assert_eq!(
        body["error"],
        "Could not extract any text from the provided sources."
    );
}

#[tokio::test]
async fn history_is_truncated_and_roles_mapped() {
    let server = start_server().await;
    server
        .upload(Form::new().part("files", text_file("notes.txt", "alpacas hum")))
        .await;

    let mut history: Vec<Value> = (0..8)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "ai" };
            json!({ "role": role, "content": format!("turn {}", i) })
        })
        .collect();
    history.insert(0, json!({ "role": "tool", "content": "ignored" }));

    let (status, _) = server
        .chat(json!({ "query": "do alpacas hum?", "history": history }))
        .await;
    assert_eq!(status, 200);

    let calls = server.model.calls.lock().unwrap();
    let messages = &calls[0];
    assert_eq!(messages.len(), 8);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].content, "turn 2");
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[6].content, "turn 7");
    assert_eq!(messages[7].role, Role::User);
}

#[tokio::test]
async fn upload_fetches_links_found_in_documents() {
    let server = start_server().await;

    let (status, body) = server
        .upload(Form::new().part(
            "files",
            text_file("links.txt", "Read https://docs.example/guide for setup."),
        ))
        .await;
    assert_eq!(status, 200, "upload failed: {}", body);
    assert!(body["chunks"].as_u64().unwrap() >= 1);

    let (status, body) = server.chat(json!({ "query": "how do I set up?" })).await;
    assert_eq!(status, 200, "chat failed: {}", body);
    let response = body["response"].as_str().unwrap();
    assert!(response.contains("Rendered\ndocs.example/guide"), "{}", response);
    assert!(response.contains("https://is.gd/e2e"));
}

#[tokio::test]
async fn unknown_roles_still_occupy_the_history_window() {
    let server = start_server().await;
    server
        .upload(Form::new().part("files", text_file("notes.txt", "alpacas hum")))
        .await;

    let mut history: Vec<Value> = (0..8)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            json!({ "role": role, "content": format!("turn {}", i) })
        })
        .collect();
    history.push(json!({ "role": "tool", "content": "ignored" }));

    let (status, _) = server
        .chat(json!({ "query": "do alpacas hum?", "history": history }))
        .await;
    assert_eq!(status, 200);

    let calls = server.model.calls.lock().unwrap();
    let contents: Vec<&str> = calls[0][1..calls[0].len() - 1]
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["turn 3", "turn 4", "turn 5", "turn 6", "turn 7"]);
}

#[tokio::test]
async fn empty_file_parts_count_toward_the_limit() {
    let server = start_server().await;

    let mut form = Form::new().part("files", text_file("", ""));
    for i in 0..3 {
        form = form.part("files", text_file(&format!("f{}.txt", i), "some text"));
    }
    let (status, body) = server.upload(form).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "You can upload a maximum of 3 documents.");
}
