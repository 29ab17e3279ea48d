//! Client for the hosted OpenAI Assistants API (v2).
//!
//! [`OpenAiClient`] wraps the raw endpoints; [`OpenAiAssistant`] drives one
//! user message through a run, answering function calls from a
//! [`ToolRegistry`] until the run reaches a terminal status.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::assistant::{AssistantBackend, AssistantError, AssistantReply, FunctionCall};
use super::tools::ToolRegistry;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used for new assistants unless configured otherwise.
pub const DEFAULT_MODEL: &str = "gpt-4o";

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

impl ThreadMessage {
    fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|part| part.kind == "text")
            .and_then(|part| part.text.as_ref())
            .map(|text| text.value.as_str())
    }
}

// ---------------------------------------------------------------------------
// Raw client
// ---------------------------------------------------------------------------

/// Authenticated access to the Assistants endpoints. Does not derive
/// `Debug` so the API key never lands in logs.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AssistantError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| AssistantError::Http {
                endpoint: "client setup".to_owned(),
                source,
            })?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        })
    }

    /// Point the client at another server (a proxy or a test double).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<T, AssistantError> {
        let http_err = |source| AssistantError::Http {
            endpoint: endpoint.to_owned(),
            source,
        };

        let resp = builder
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_VALUE)
            .send()
            .await
            .map_err(http_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    debug!(endpoint, status = status.as_u16(), error = %err, "failed to read error body");
                    String::new()
                }
            };
            return Err(AssistantError::Api {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        resp.json::<T>().await.map_err(http_err)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, AssistantError> {
        self.request(self.http.post(self.url(path)).json(body), path).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AssistantError> {
        self.request(self.http.get(self.url(path)), path).await
    }

    /// Create an assistant and return its id.
    pub async fn create_assistant(
        &self,
        name: &str,
        model: &str,
        instructions: &str,
        tools: &[serde_json::Value],
    ) -> Result<String, AssistantError> {
        let created: Created = self
            .post(
                "/assistants",
                &json!({
                    "name": name,
                    "model": model,
                    "instructions": instructions,
                    "tools": tools,
                }),
            )
            .await?;
        info!(assistant_id = %created.id, name, model, "assistant created");
        Ok(created.id)
    }

    pub async fn create_thread(&self) -> Result<String, AssistantError> {
        let created: Created = self.post("/threads", &json!({})).await?;
        debug!(thread_id = %created.id, "thread created");
        Ok(created.id)
    }

    pub async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), AssistantError> {
        let _: Created = self
            .post(
                &format!("/threads/{thread_id}/messages"),
                &json!({"role": "user", "content": text}),
            )
            .await?;
        Ok(())
    }

    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        self.post(
            &format!("/threads/{thread_id}/runs"),
            &json!({"assistant_id": assistant_id}),
        )
        .await
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        self.get(&format!("/threads/{thread_id}/runs/{run_id}")).await
    }

    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, AssistantError> {
        self.post(
            &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &json!({"tool_outputs": outputs}),
        )
        .await
    }

    /// Text of the newest message in the thread, if it came from the
    /// assistant.
    pub async fn latest_assistant_text(&self, thread_id: &str) -> Result<Option<String>, AssistantError> {
        let list: MessageList = self
            .get(&format!("/threads/{thread_id}/messages?order=desc&limit=1"))
            .await?;
        Ok(list
            .data
            .first()
            .filter(|m| m.role == "assistant")
            .and_then(ThreadMessage::first_text)
            .map(str::to_owned))
    }
}

// ---------------------------------------------------------------------------
// Assistant backend
// ---------------------------------------------------------------------------

/// Answer every tool call of a `requires_action` run from `tools`.
pub fn resolve_tool_calls(
    tools: &ToolRegistry,
    action: &RequiredAction,
) -> Result<(Vec<ToolOutput>, Vec<FunctionCall>), AssistantError> {
    let calls = &action.submit_tool_outputs.tool_calls;
    let mut outputs = Vec::with_capacity(calls.len());
    let mut details = Vec::with_capacity(calls.len());

    for call in calls {
        let name = &call.function.name;
        let raw = call.function.arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).map_err(|source| AssistantError::InvalidArguments {
                name: name.clone(),
                source,
            })?
        };

        let response = tools.call(name, &arguments)?;
        outputs.push(ToolOutput {
            tool_call_id: call.id.clone(),
            output: response.clone(),
        });
        details.push(FunctionCall {
            name: name.clone(),
            arguments,
            response,
        });
    }

    Ok((outputs, details))
}

/// [`AssistantBackend`] backed by one configured OpenAI assistant.
pub struct OpenAiAssistant {
    client: OpenAiClient,
    assistant_id: String,
    tools: ToolRegistry,
    poll_interval: Duration,
    run_timeout: Duration,
}

impl OpenAiAssistant {
    pub fn new(client: OpenAiClient, assistant_id: impl Into<String>, tools: ToolRegistry) -> Self {
        Self {
            client,
            assistant_id: assistant_id.into(),
            tools,
            poll_interval: DEFAULT_POLL_INTERVAL,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.run_timeout = timeout;
        self
    }

    /// Drive `run` to a terminal status, answering function calls on the
    /// way.
    async fn finish_run(
        &self,
        thread_id: &str,
        mut run: Run,
        started: Instant,
    ) -> Result<(Run, Vec<FunctionCall>), AssistantError> {
        let mut function_calls = Vec::new();

        loop {
            match run.status.as_str() {
                "completed" => return Ok((run, function_calls)),
                "queued" | "in_progress" | "cancelling" => {}
                "requires_action" => {
                    if let Some(action) = run.required_action.as_ref() {
                        let (outputs, calls) = resolve_tool_calls(&self.tools, action)?;
                        info!(thread_id, run_id = %run.id, calls = calls.len(), "submitting tool outputs");
                        function_calls.extend(calls);
                        run = self
                            .client
                            .submit_tool_outputs(thread_id, &run.id, &outputs)
                            .await?;
                        continue;
                    }
                }
                _ => {
                    return Err(AssistantError::RunFailed {
                        run_id: run.id,
                        status: run.status,
                    });
                }
            }

            let waited = started.elapsed();
            if waited >= self.run_timeout {
                return Err(AssistantError::Timeout {
                    run_id: run.id,
                    status: run.status,
                    waited,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            run = self.client.get_run(thread_id, &run.id).await?;
        }
    }
}

#[async_trait]
impl AssistantBackend for OpenAiAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        self.client.create_thread().await
    }

    async fn send(&self, thread_id: &str, text: &str) -> Result<AssistantReply, AssistantError> {
        if text.trim().is_empty() {
            return Err(AssistantError::EmptyMessage);
        }
        let started = Instant::now();

        self.client.add_user_message(thread_id, text).await?;
        let run = self.client.create_run(thread_id, &self.assistant_id).await?;
        let (run, function_calls) = self.finish_run(thread_id, run, started).await?;

        let content = self
            .client
            .latest_assistant_text(thread_id)
            .await?
            .ok_or_else(|| AssistantError::EmptyReply(thread_id.to_owned()))?;

        let duration = started.elapsed();
        info!(
            thread_id,
            status = %run.status,
            duration_ms = duration.as_millis() as u64,
            function_calls = function_calls.len(),
            "message processed"
        );

        Ok(AssistantReply {
            status: run.status,
            content,
            duration,
            thread_id: thread_id.to_owned(),
            function_calls,
        })
    }
}
