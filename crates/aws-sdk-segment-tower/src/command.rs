//! Request and response shapes of the wrapped SDK client.
//!
//! The interceptor only assumes a uniform `send(command) -> response` entry
//! point: a [`Command`] names the operation and carries its parameters as a
//! JSON object, and an [`SdkResponse`] carries the result body plus transport
//! metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A single SDK operation invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    operation: String,
    #[serde(default)]
    params: Value,
}

impl Command {
    /// Creates a command for an arbitrary operation.
    pub fn new(operation: impl Into<String>, params: Value) -> Self {
        Self {
            operation: operation.into(),
            params,
        }
    }

    /// `SendMessageCommand` for a single message.
    pub fn send_message(queue_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(
            "SendMessageCommand",
            json!({
                "QueueUrl": queue_url.into(),
                "MessageBody": body.into(),
            }),
        )
    }

    /// `SendMessageBatchCommand` with one entry per `(id, body)` pair.
    pub fn send_message_batch<I, K, B>(queue_url: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, B)>,
        K: Into<String>,
        B: Into<String>,
    {
        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(id, body)| json!({ "Id": id.into(), "MessageBody": body.into() }))
            .collect();

        Self::new(
            "SendMessageBatchCommand",
            json!({
                "QueueUrl": queue_url.into(),
                "Entries": entries,
            }),
        )
    }

    /// `ReceiveMessageCommand` asking for up to `max_messages` messages.
    pub fn receive_message(queue_url: impl Into<String>, max_messages: u32) -> Self {
        Self::new(
            "ReceiveMessageCommand",
            json!({
                "QueueUrl": queue_url.into(),
                "MaxNumberOfMessages": max_messages,
            }),
        )
    }

    /// SNS `PublishCommand` to a topic.
    pub fn publish(topic_arn: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            "PublishCommand",
            json!({
                "TopicArn": topic_arn.into(),
                "Message": message.into(),
            }),
        )
    }

    /// Operation identifier, e.g. `SendMessageCommand`.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Raw operation parameters.
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Looks up a top-level string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Number of entries in a batch request, if this is one.
    pub fn batch_len(&self) -> Option<usize> {
        self.params
            .get("Entries")
            .and_then(Value::as_array)
            .map(Vec::len)
    }
}

/// Transport metadata attached to every SDK response (`$metadata`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseMetadata {
    /// Service-assigned request identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// HTTP status of the final attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    /// Number of attempts the SDK made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

/// The settled result of a successful SDK call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkResponse {
    /// Operation-specific result body.
    #[serde(default)]
    pub body: Value,
    /// Transport metadata.
    #[serde(rename = "$metadata", default)]
    pub metadata: ResponseMetadata,
}

impl SdkResponse {
    /// Creates a response with empty metadata.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            metadata: ResponseMetadata::default(),
        }
    }

    /// Sets the request identifier.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.metadata.request_id = Some(request_id.into());
        self
    }

    /// Sets the HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.metadata.http_status_code = Some(status);
        self
    }

    /// Builds a response from a raw SDK output object.
    ///
    /// The `$metadata` member is split off into [`ResponseMetadata`]; every
    /// other member becomes the body. Metadata fields with unexpected types
    /// are ignored rather than rejected.
    pub fn from_raw(raw: Value) -> Self {
        let Value::Object(mut members) = raw else {
            return Self::new(raw);
        };

        let metadata = members
            .remove("$metadata")
            .map(lenient_metadata)
            .unwrap_or_default();

        Self {
            body: Value::Object(members),
            metadata,
        }
    }

    /// The request identifier, when the service returned one.
    pub fn request_id(&self) -> Option<&str> {
        self.metadata.request_id.as_deref()
    }
}

fn lenient_metadata(value: Value) -> ResponseMetadata {
    let empty = Map::new();
    let fields = value.as_object().unwrap_or(&empty);

    ResponseMetadata {
        request_id: fields
            .get("requestId")
            .and_then(Value::as_str)
            .map(str::to_owned),
        http_status_code: fields
            .get("httpStatusCode")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok()),
        attempts: fields
            .get("attempts")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
    }
}
