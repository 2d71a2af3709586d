//! Google Gemini client using the streaming `generateContent` endpoint.

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{collections::VecDeque, time::Duration};

use super::{
    Content, GenerateRequest, LanguageModel, ModelError, ModelPart, ModelStream, Part, Role,
};
use crate::Config;

pub struct GeminiModel {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiModel {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        // Replies stream for as long as the model writes, so only connecting and
        // each gap between reads are bounded.
        let client =
            Client::builder().connect_timeout(timeout).read_timeout(timeout).build()?;

        Ok(Self { client, api_key, model, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn from_config(config: &Config) -> Result<Self, ModelError> {
        let api_key = config.model_api_key().ok_or(ModelError::MissingCredential)?;

        Self::new(
            api_key.to_owned(),
            config.model.name.clone(),
            config.model.base_url.clone(),
            config.timeout(),
        )
    }

    pub fn stream_url(&self) -> String {
        format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, self.model)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(name = "gemini.stream", skip_all, fields(model = %self.model))]
    async fn stream(&self, request: &GenerateRequest) -> Result<ModelStream, ModelError> {
        let body = GeminiRequest::from(request);
        tracing::debug!(contents = body.contents.len(), "Sending Gemini request");

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Status { status: status.as_u16(), body: truncate_body(&text) });
        }

        Ok(decode_sse(response.bytes_stream().boxed()))
    }
}

/// Turn a raw server-sent-events byte stream into model parts.
pub fn decode_sse<S, B>(bytes: S) -> ModelStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state =
        SseState { bytes, decoder: SseDecoder::default(), pending: VecDeque::new(), done: false };
    stream::try_unfold(state, next_part::<S, B>).boxed()
}

struct SseState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<ModelPart>,
    done: bool,
}

async fn next_part<S, B>(
    mut state: SseState<S>,
) -> Result<Option<(ModelPart, SseState<S>)>, ModelError>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    loop {
        if let Some(part) = state.pending.pop_front() {
            return Ok(Some((part, state)));
        }
        if state.done {
            return Ok(None);
        }

        match state.bytes.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                for payload in state.decoder.push(chunk.as_ref()) {
                    state.pending.extend(parse_chunk(&payload)?);
                }
            }
            None => {
                state.done = true;
                if let Some(payload) = state.decoder.finish() {
                    state.pending.extend(parse_chunk(&payload)?);
                }
            }
        }
    }
}

/// Splits a byte stream into `data:` payloads. Lines may span network chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim_start();
    (!data.is_empty()).then(|| data.to_string())
}

/// Parse one streamed JSON chunk into parts of the first candidate.
fn parse_chunk(payload: &str) -> Result<Vec<ModelPart>, ModelError> {
    let chunk: GeminiStreamChunk = serde_json::from_str(payload)?;

    if let Some(error) = chunk.error {
        return Err(ModelError::Stream(error.message));
    }

    let Some(content) = chunk.candidates.into_iter().next().and_then(|c| c.content) else {
        return Ok(Vec::new());
    };

    let parts = content
        .parts
        .into_iter()
        .filter_map(|part| match part {
            GeminiPart::Text { text } if !text.is_empty() => Some(ModelPart::Text(text)),
            GeminiPart::FunctionCall { function_call } => Some(ModelPart::FunctionCall {
                name: function_call.name,
                args: normalize_args(function_call.args),
            }),
            _ => None,
        })
        .collect();

    Ok(parts)
}

fn normalize_args(args: Value) -> Value {
    if args.is_null() { json!({}) } else { args }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTools>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

impl From<&GenerateRequest> for GeminiRequest {
    fn from(request: &GenerateRequest) -> Self {
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTools {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }]
        };

        Self {
            contents: request.contents.iter().map(GeminiContent::from).collect(),
            system_instruction: request.system_instruction.as_ref().map(|text| {
                GeminiInstruction { parts: vec![GeminiPart::Text { text: text.clone() }] }
            }),
            tools,
            generation_config: request
                .temperature
                .map(|temperature| GeminiGenerationConfig { temperature }),
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl From<&Content> for GeminiContent {
    fn from(content: &Content) -> Self {
        let role = match content.role {
            Role::User => "user",
            Role::Model => "model",
        };

        let parts = content
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => GeminiPart::Text { text: text.clone() },
                Part::FunctionCall { name, args } => GeminiPart::FunctionCall {
                    function_call: GeminiFunctionCall { name: name.clone(), args: args.clone() },
                },
                Part::FunctionResponse { name, response } => GeminiPart::FunctionResponse {
                    function_response: GeminiFunctionResponse {
                        name: name.clone(),
                        response: response.clone(),
                    },
                },
            })
            .collect();

        Self { role: role.to_string(), parts }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    error: Option<GeminiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
}
