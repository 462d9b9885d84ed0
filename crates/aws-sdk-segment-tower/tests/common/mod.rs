//! Shared mock SQS client for integration tests.

#![allow(dead_code)]

use aws_sdk_segment_tower::{Command, SdkResponse};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Notify;
use tower::Service;

pub const QUEUE_A: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/queueA";
pub const QUEUE_B: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/queueB";

#[derive(Clone, Default)]
pub struct MockSqsClient {
    call_count: Arc<AtomicUsize>,
    should_error: bool,
    omit_request_id: bool,
    delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
}

impl MockSqsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error() -> Self {
        Self {
            should_error: true,
            ..Self::default()
        }
    }

    pub fn without_request_id(mut self) -> Self {
        self.omit_request_id = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls stay pending until the returned handle is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Service<Command> for MockSqsClient {
    type Response = SdkResponse;
    type Error = MockError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, command: Command) -> Self::Future {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let should_error = self.should_error;
        let omit_request_id = self.omit_request_id;
        let delay = self.delay;
        let gate = self.gate.clone();

        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if should_error {
                return Err(MockError(format!(
                    "AWS.SimpleQueueService.NonExistentQueue: {}",
                    command.operation()
                )));
            }

            let body = match command.operation() {
                "ReceiveMessageCommand" => json!({ "Messages": [] }),
                "SendMessageBatchCommand" => json!({
                    "Successful": command.batch_len().unwrap_or_default(),
                    "Failed": []
                }),
                _ => json!({ "MessageId": format!("msg-{n}") }),
            };

            let response = SdkResponse::new(body).with_status(200);
            if omit_request_id {
                Ok(response)
            } else {
                Ok(response.with_request_id(format!("req-{n}")))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}
