//! Full turns against local stubs of the Gemini streaming API and the weather provider.

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::TryStreamExt;
use serde_json::{Value, json};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc;
use weatherbot_core::{
    Agent, AgentError, AgentEvent, Config, GeminiModel, LanguageModel, ModelError, Session,
    llm::{Content, GenerateRequest, ModelPart},
    session::{APP_NAME, DEFAULT_USER_ID},
};

#[derive(Clone, Default)]
struct GeminiStub {
    replies: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    seen: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

impl GeminiStub {
    fn with_replies(replies: Vec<(StatusCode, String)>) -> Self {
        Self { replies: Arc::new(Mutex::new(replies.into())), ..Default::default() }
    }

    fn seen(&self) -> Vec<(String, Option<String>, Value)> {
        self.seen.lock().unwrap().clone()
    }
}

async fn gemini(State(stub): State<GeminiStub>, headers: HeaderMap, uri: Uri, body: Bytes) -> Response {
    let key = headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()).map(str::to_string);
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    stub.seen.lock().unwrap().push((uri.to_string(), key, body));

    let (status, text) = stub
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "no reply scripted".into()));
    (status, [(header::CONTENT_TYPE, "text/event-stream")], text).into_response()
}

async fn weather() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"location":{"name":"Tokyo","region":"Tokyo","country":"Japan"},"current":{"temp_c":22.1,"temp_f":71.8,"condition":{"text":"Sunny"},"humidity":40,"wind_mph":3.4,"wind_dir":"SE"}}"#,
    )
}

async fn serve(stub: GeminiStub) -> String {
    let app = Router::new()
        .route("/weather/current.json", get(weather))
        .fallback(gemini)
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn sse(chunks: &[Value]) -> String {
    chunks.iter().map(|c| format!("data: {c}\r\n\r\n")).collect()
}

fn config(base: &str) -> Config {
    let mut cfg = Config::default();
    cfg.model.api_key = Some("GEMINI_TEST".into());
    cfg.model.base_url = format!("{base}/v1beta");
    cfg.weather.api_key = Some("WEATHER_TEST".into());
    cfg.weather.base_url = format!("{base}/weather");
    cfg.timeout_secs = 5;
    cfg
}

#[tokio::test]
async fn model_stream_sends_key_header_and_yields_parts() {
    let stub = GeminiStub::with_replies(vec![(
        StatusCode::OK,
        sse(&[
            json!({"candidates":[{"content":{"role":"model","parts":[{"text":"Hi"}]}}]}),
            json!({"candidates":[{"content":{"role":"model","parts":[{"text":" you"}]}}],"usageMetadata":{"totalTokenCount":4}}),
        ]),
    )]);
    let base = serve(stub.clone()).await;
    let model = GeminiModel::from_config(&config(&base)).unwrap();

    let request = GenerateRequest { contents: vec![Content::user_text("hello")], ..Default::default() };
    let parts: Vec<ModelPart> = model.stream(&request).await.unwrap().try_collect().await.unwrap();

    assert_eq!(parts, vec![ModelPart::Text("Hi".into()), ModelPart::Text(" you".into())]);

    let seen = stub.seen();
    assert_eq!(seen[0].0, "/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse");
    assert_eq!(seen[0].1.as_deref(), Some("GEMINI_TEST"));
    assert_eq!(seen[0].2["contents"][0]["parts"][0]["text"], "hello");
}

#[tokio::test]
async fn model_error_status_is_reported_with_body() {
    let stub = GeminiStub::with_replies(vec![(StatusCode::BAD_REQUEST, "API key not valid".into())]);
    let base = serve(stub).await;
    let model = GeminiModel::from_config(&config(&base)).unwrap();

    let err = match model.stream(&GenerateRequest::default()).await {
        Ok(_) => panic!("expected an error"),
        Err(err) => err,
    };

    assert!(matches!(err, ModelError::Status { status: 400, ref body } if body == "API key not valid"));
}

#[tokio::test]
async fn weather_question_runs_the_tool_and_answers() {
    let stub = GeminiStub::with_replies(vec![
        (
            StatusCode::OK,
            sse(&[json!({"candidates":[{"content":{"role":"model","parts":[
                {"functionCall":{"name":"WeatherTool","args":{"location":"Tokyo"}}}
            ]}}]})]),
        ),
        (
            StatusCode::OK,
            sse(&[json!({"candidates":[{"content":{"role":"model","parts":[
                {"text":"It's sunny in Tokyo, 22.1°C."}
            ]}}]})]),
        ),
    ]);
    let base = serve(stub.clone()).await;
    let cfg = config(&base);
    let model = Arc::new(GeminiModel::from_config(&cfg).unwrap());
    let agent = Agent::weatherbot(&cfg, model).unwrap();
    let mut session = Session::new(APP_NAME, DEFAULT_USER_ID);

    let (tx, mut rx) = mpsc::unbounded_channel();
    agent.run_turn(&mut session, "How's Tokyo?", tx).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let report = json!({
        "location": "Tokyo", "region": "Tokyo", "country": "Japan",
        "temperature": "22.1°C / 71.8°F", "condition": "Sunny",
        "humidity": "40%", "wind": "3.4 mph SE"
    });
    assert_eq!(
        events,
        vec![
            AgentEvent::ToolCall { name: "WeatherTool".into(), args: json!({"location": "Tokyo"}) },
            AgentEvent::ToolResult { name: "WeatherTool".into(), response: report.clone() },
            AgentEvent::TextChunk("It's sunny in Tokyo, 22.1°C.".into()),
        ]
    );

    let seen = stub.seen();
    assert_eq!(seen.len(), 2);
    let follow_up = &seen[1].2;
    assert_eq!(follow_up["contents"][2]["parts"][0]["functionResponse"]["response"], report);
    assert_eq!(follow_up["tools"][0]["functionDeclarations"][0]["name"], "WeatherTool");
}

#[tokio::test]
async fn stream_error_chunk_abandons_the_turn() {
    let stub = GeminiStub::with_replies(vec![(
        StatusCode::OK,
        sse(&[
            json!({"candidates":[{"content":{"parts":[{"text":"Partial"}]}}]}),
            json!({"error":{"code":500,"message":"internal"}}),
        ]),
    )]);
    let base = serve(stub).await;
    let cfg = config(&base);
    let agent = Agent::weatherbot(&cfg, Arc::new(GeminiModel::from_config(&cfg).unwrap())).unwrap();
    let mut session = Session::new(APP_NAME, DEFAULT_USER_ID);

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = agent.run_turn(&mut session, "hi", tx).await.unwrap_err();

    assert!(matches!(err, AgentError::Model(ModelError::Stream(ref msg)) if msg == "internal"));
    assert!(session.history.is_empty());
}

/// Three chunks, each after a pause shorter than the timeout but longer in total.
async fn slow_stream() -> Response {
    let chunks = futures::stream::unfold(0, |i| async move {
        if i == 3 {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;
        let chunk = json!({"candidates":[{"content":{"parts":[{"text": format!("part{i} ")}]}}]});
        Some((Ok::<_, std::io::Error>(format!("data: {chunk}\n\n")), i + 1))
    });

    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(chunks)).into_response()
}

#[tokio::test]
async fn reply_streaming_longer_than_the_timeout_is_not_cut_off() {
    let app = Router::new().fallback(slow_stream);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut cfg = config(&format!("http://{addr}"));
    cfg.timeout_secs = 1;
    let model = GeminiModel::from_config(&cfg).unwrap();

    let request = GenerateRequest { contents: vec![Content::user_text("hi")], ..Default::default() };
    let parts: Vec<ModelPart> = model.stream(&request).await.unwrap().try_collect().await.unwrap();

    assert_eq!(
        parts,
        vec![
            ModelPart::Text("part0 ".into()),
            ModelPart::Text("part1 ".into()),
            ModelPart::Text("part2 ".into()),
        ]
    );
}
