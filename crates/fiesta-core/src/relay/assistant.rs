//! The seam between the relay and a hosted assistant service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors from talking to the assistant service.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("message text is empty")]
    EmptyMessage,

    #[error("request to {endpoint} failed")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("invalid arguments for function {name:?}")]
    InvalidArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("run {run_id} ended with status {status:?}")]
    RunFailed { run_id: String, status: String },

    #[error("run {run_id} still {status:?} after {waited:?}")]
    Timeout {
        run_id: String,
        status: String,
        waited: Duration,
    },

    #[error("thread {0} has no assistant reply")]
    EmptyReply(String),
}

/// One tool invocation made while producing a reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
    pub response: String,
}

/// The assistant's answer to one user message.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    /// Terminal run status reported by the service.
    pub status: String,
    pub content: String,
    pub duration: Duration,
    pub thread_id: String,
    pub function_calls: Vec<FunctionCall>,
}

/// A hosted assistant holding conversation threads.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Open an empty conversation thread and return its handle.
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Post `text` to `thread_id` and wait for the assistant's answer.
    async fn send(&self, thread_id: &str, text: &str) -> Result<AssistantReply, AssistantError>;
}
