//! Gemini client and template fetch against a local stub server.

use alfa_funnel::error::{FunnelError, GenerationFailure};
use alfa_funnel::llm::{Generator, LlmClient};
use alfa_funnel::prompt::{FocusMode, PromptTemplate};
use alfa_funnel::service::{FunnelAnalyzer, Session};
use alfa_funnel::template::{resolve_template, HttpTemplateSource, TemplateSource};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const LEVELS: &str = "Level,Users,APS,Success Rate,FAR,Churn,ARPU\n1,1000,1.2,0.95,0.9,0.05,0.10\n";

struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

/// Answer every request with the same status and body.
async fn stub_server(status: u16, body: &str) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = requests.clone();
    let body = body.to_string();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let seen = seen.clone();
            let body = body.clone();
            tokio::spawn(async move {
                handle_connection(stream, status, &body, seen).await;
            });
        }
    });

    StubServer {
        base_url: format!("http://{}", addr),
        requests,
    }
}

async fn handle_connection(mut stream: TcpStream, status: u16, body: &str, seen: Arc<Mutex<Vec<String>>>) {
    let request = read_request(&mut stream).await;
    seen.lock().unwrap().push(request);

    let response = format!(
        "HTTP/1.1 {} Stub\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Read headers plus a `Content-Length` body.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(size) = stream.read(&mut chunk).await else {
            break;
        };
        if size == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..size]);

        let text = String::from_utf8_lossy(&buffer).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buffer).to_string()
}

fn client(server: &StubServer) -> LlmClient {
    LlmClient::new(
        "test-key".to_string(),
        "gemini-test".to_string(),
        format!("{}/", server.base_url),
    )
}

#[tokio::test]
async fn test_generate_returns_candidate_text() {
    let body = r#"{"candidates":[{"content":{"parts":[{"text":"1. Executive Summary\n"},{"text":"Fine."}]}}]}"#;
    let server = stub_server(200, body).await;

    let text = client(&server).generate("analyze this").await.unwrap();
    assert_eq!(text, "1. Executive Summary\nFine.");

    let requests = server.requests.lock().unwrap();
    let request = requests[0].to_lowercase();
    assert!(request.starts_with("post /models/gemini-test:generatecontent "));
    assert!(request.contains("x-goog-api-key: test-key"));
    assert!(request.contains("\"text\":\"analyze this\""));
}

#[tokio::test]
async fn test_status_codes_map_to_failures() {
    let server = stub_server(401, r#"{"error":{"message":"bad key"}}"#).await;
    assert_eq!(client(&server).generate("p").await, Err(GenerationFailure::Auth(401)));

    let server = stub_server(429, r#"{"error":{"message":"slow down"}}"#).await;
    assert_eq!(client(&server).generate("p").await, Err(GenerationFailure::Quota));

    let server = stub_server(500, "boom").await;
    assert_eq!(
        client(&server).generate("p").await,
        Err(GenerationFailure::Remote {
            status: 500,
            body: "boom".to_string()
        })
    );
}

#[tokio::test]
async fn test_error_body_and_empty_candidates() {
    let server = stub_server(200, r#"{"error":{"message":"blocked"}}"#).await;
    assert!(matches!(
        client(&server).generate("p").await,
        Err(GenerationFailure::Remote { status: 200, .. })
    ));

    let server = stub_server(200, r#"{"candidates":[]}"#).await;
    assert_eq!(client(&server).generate("p").await, Err(GenerationFailure::EmptyResponse));
}

#[tokio::test]
async fn test_unreachable_host_is_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = LlmClient::new("k".to_string(), "m".to_string(), format!("http://{}", addr));
    assert!(matches!(client.generate("p").await, Err(GenerationFailure::Network(_))));
}

#[tokio::test]
async fn test_template_fetch() {
    let server = stub_server(200, "Custom brief for {focusMode}\n{levelData}\n").await;
    let source = HttpTemplateSource::new(format!("{}/prompt.txt", server.base_url), Duration::from_secs(5)).unwrap();

    assert_eq!(
        source.fetch_template().await.unwrap(),
        "Custom brief for {focusMode}\n{levelData}\n"
    );
    let template = resolve_template(Some(&source as &dyn TemplateSource)).await;
    assert_eq!(template.as_str(), "Custom brief for {focusMode}\n{levelData}");
}

#[tokio::test]
async fn test_template_not_found_falls_back() {
    let server = stub_server(404, "missing").await;
    let source = HttpTemplateSource::new(format!("{}/prompt.txt", server.base_url), Duration::from_secs(5)).unwrap();

    assert!(matches!(source.fetch_template().await, Err(FunnelError::TemplateFetch(_))));
    let template = resolve_template(Some(&source as &dyn TemplateSource)).await;
    assert_eq!(template, PromptTemplate::default());
}

#[tokio::test]
async fn test_session_against_stub_gemini() {
    let body = serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": "1. Executive Summary\nSteady funnel.\n\n3. Optimization Recommendations\n- Raise ARPU on level 1\n"}]}}]
    })
    .to_string();
    let gemini = stub_server(200, &body).await;
    let templates = stub_server(200, "Focus {focusMode}\n{levelData}").await;

    let analyzer = FunnelAnalyzer::new(Arc::new(client(&gemini)))
        .with_template_source(Arc::new(
            HttpTemplateSource::new(format!("{}/t.txt", templates.base_url), Duration::from_secs(5)).unwrap(),
        ))
        .with_timeout(Duration::from_secs(10));
    let session = Session::new(analyzer);
    session.upload(LEVELS).unwrap();
    session.set_focus_mode(FocusMode::Retention);

    let run = session.run_analysis().await.unwrap();
    assert_eq!(run.result.executive_summary, "Steady funnel.");
    assert_eq!(run.result.recommendations, vec!["Raise ARPU on level 1"]);

    let requests = gemini.requests.lock().unwrap();
    assert!(requests[0].contains("Focus retention\\nLevel Number | Number of Users"));
}
