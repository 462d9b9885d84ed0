//! In-memory SQS and SNS clients instrumented with `aws-sdk-segment-tower`.
//!
//! This crate demonstrates wiring the segment tracing layer around SDK-shaped
//! clients and running a messaging workflow inside a transaction:
//!
//! - [`InMemorySqsClient`] - queues held in process memory
//! - [`InMemorySnsClient`] - topics that fan published messages out to
//!   subscribed queues through a (traced) SQS client
//!
//! ## Example
//!
//! ```ignore
//! use aws_sdk_segment_example::{init_tracing, run_demo};
//! use aws_sdk_segment_tower::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     init_tracing()?;
//!     let trace = run_demo(&Config::load()?).await?;
//!     println!("{}", serde_json::to_string_pretty(&trace)?);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use aws_sdk_segment_tower::extractors::sqs::queue_name_from_url;
use aws_sdk_segment_tower::{
    Command, Config, SdkResponse, SegmentTracingLayer, SegmentTracingService,
    SnsCommandExtractor, SqsCommandExtractor, TraceSnapshot, run_in_named_transaction,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tower::{Service, ServiceBuilder, ServiceExt};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const ACCOUNT_ID: &str = "000000000000";

/// Errors returned by the in-memory clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The target queue has not been created.
    #[error("AWS.SimpleQueueService.NonExistentQueue: queue `{0}` does not exist")]
    NonExistentQueue(String),

    /// A required request parameter is absent.
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    /// A batch request carried no entries.
    #[error("AWS.SimpleQueueService.EmptyBatchRequest: batch request contains no entries")]
    EmptyBatchRequest,

    /// The client does not implement the operation.
    #[error("unsupported operation `{0}`")]
    UnsupportedOperation(String),
}

/// Failed to install the global tracing subscriber.
#[derive(Debug, Error)]
#[error("failed to initialise tracing registry")]
pub struct TracingInitError(#[from] tracing_subscriber::util::TryInitError);

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Defaults to `info` with segment lifecycle logs at `debug`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), TracingInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sdk_segments=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).without_time())
        .with(filter)
        .try_init()?;

    Ok(())
}

type ClientFuture = Pin<Box<dyn Future<Output = Result<SdkResponse, ClientError>> + Send>>;

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
}

/// SQS client backed by in-process queues.
///
/// Clones share the same queues.
#[derive(Debug, Clone)]
pub struct InMemorySqsClient {
    region: String,
    queues: Arc<Mutex<HashMap<String, VecDeque<StoredMessage>>>>,
}

impl InMemorySqsClient {
    /// Creates a client with no queues.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// URL a queue of this name has in this client's region.
    pub fn queue_url(&self, name: &str) -> String {
        format!(
            "https://sqs.{}.amazonaws.com/{}/{}",
            self.region, ACCOUNT_ID, name
        )
    }

    /// Number of messages waiting in the named queue.
    pub fn depth(&self, name: &str) -> Option<usize> {
        self.queues.lock().get(name).map(VecDeque::len)
    }

    fn handle(&self, command: &Command) -> Result<Value, ClientError> {
        match command.operation() {
            "CreateQueueCommand" => {
                let name = command
                    .param_str("QueueName")
                    .ok_or(ClientError::MissingParameter("QueueName"))?;
                self.queues.lock().entry(name.to_owned()).or_default();
                Ok(json!({ "QueueUrl": self.queue_url(name) }))
            }
            "SendMessageCommand" => {
                let body = command.param_str("MessageBody").unwrap_or_default();
                let message_id = self
                    .enqueue(command, [body.to_owned()])?
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                Ok(json!({ "MessageId": message_id }))
            }
            "SendMessageBatchCommand" => {
                let entries = command
                    .params()
                    .get("Entries")
                    .and_then(Value::as_array)
                    .filter(|entries| !entries.is_empty())
                    .ok_or(ClientError::EmptyBatchRequest)?;

                let ids: Vec<&str> = entries
                    .iter()
                    .map(|entry| entry.get("Id").and_then(Value::as_str).unwrap_or_default())
                    .collect();
                let bodies = entries.iter().map(|entry| {
                    entry
                        .get("MessageBody")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned()
                });
                let message_ids = self.enqueue(command, bodies)?;

                let successful: Vec<Value> = ids
                    .into_iter()
                    .zip(message_ids)
                    .map(|(id, message_id)| json!({ "Id": id, "MessageId": message_id }))
                    .collect();
                Ok(json!({ "Successful": successful, "Failed": [] }))
            }
            "ReceiveMessageCommand" => {
                let max = command
                    .params()
                    .get("MaxNumberOfMessages")
                    .and_then(Value::as_u64)
                    .unwrap_or(1)
                    .clamp(1, 10) as usize;
                let name = Self::queue_name(command)?;

                let mut queues = self.queues.lock();
                let queue = queues
                    .get_mut(name)
                    .ok_or_else(|| ClientError::NonExistentQueue(name.to_owned()))?;
                let take = max.min(queue.len());
                let messages: Vec<Value> = queue
                    .drain(..take)
                    .map(|message| {
                        json!({
                            "MessageId": message.message_id,
                            "Body": message.body,
                            "ReceiptHandle": Uuid::new_v4().to_string(),
                        })
                    })
                    .collect();
                Ok(json!({ "Messages": messages }))
            }
            other => Err(ClientError::UnsupportedOperation(other.to_owned())),
        }
    }

    fn queue_name(command: &Command) -> Result<&str, ClientError> {
        let url = command
            .param_str("QueueUrl")
            .ok_or(ClientError::MissingParameter("QueueUrl"))?;
        queue_name_from_url(url).ok_or_else(|| ClientError::NonExistentQueue(url.to_owned()))
    }

    fn enqueue(
        &self,
        command: &Command,
        bodies: impl IntoIterator<Item = String>,
    ) -> Result<Vec<String>, ClientError> {
        let name = Self::queue_name(command)?;
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(name)
            .ok_or_else(|| ClientError::NonExistentQueue(name.to_owned()))?;

        Ok(bodies
            .into_iter()
            .map(|body| {
                let message_id = Uuid::new_v4().to_string();
                queue.push_back(StoredMessage {
                    message_id: message_id.clone(),
                    body,
                });
                message_id
            })
            .collect())
    }
}

impl Service<Command> for InMemorySqsClient {
    type Response = SdkResponse;
    type Error = ClientError;
    type Future = ClientFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, command: Command) -> Self::Future {
        let result = self.handle(&command).map(|body| {
            SdkResponse::new(body)
                .with_request_id(Uuid::new_v4().to_string())
                .with_status(200)
        });

        Box::pin(async move {
            tokio::task::yield_now().await;
            result
        })
    }
}

/// SNS client that delivers published messages to subscribed queues.
///
/// Delivery goes through the wrapped SQS client, so when that client is
/// traced each delivery is recorded beneath the publish segment.
#[derive(Debug, Clone)]
pub struct InMemorySnsClient<S> {
    region: String,
    sqs: S,
    subscriptions: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl<S> InMemorySnsClient<S> {
    /// Creates a client with no topics.
    pub fn new(region: impl Into<String>, sqs: S) -> Self {
        Self {
            region: region.into(),
            sqs,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// ARN a topic of this name has in this client's region.
    pub fn topic_arn(&self, name: &str) -> String {
        format!("arn:aws:sns:{}:{}:{}", self.region, ACCOUNT_ID, name)
    }

    /// Subscribes a queue to a topic, creating the topic if needed.
    pub fn subscribe(&self, topic_arn: impl Into<String>, queue_url: impl Into<String>) {
        self.subscriptions
            .write()
            .entry(topic_arn.into())
            .or_default()
            .push(queue_url.into());
    }
}

impl<S> Service<Command> for InMemorySnsClient<S>
where
    S: Service<Command, Response = SdkResponse, Error = ClientError> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = SdkResponse;
    type Error = ClientError;
    type Future = ClientFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, command: Command) -> Self::Future {
        if command.operation() != "PublishCommand" {
            let operation = command.operation().to_owned();
            return Box::pin(async move {
                Err::<SdkResponse, _>(ClientError::UnsupportedOperation(operation))
            });
        }

        let Some(topic_arn) = command.param_str("TopicArn") else {
            return Box::pin(async {
                Err::<SdkResponse, _>(ClientError::MissingParameter("TopicArn"))
            });
        };
        let message = command.param_str("Message").unwrap_or_default().to_owned();
        let queues = self
            .subscriptions
            .read()
            .get(topic_arn)
            .cloned()
            .unwrap_or_default();
        let mut sqs = self.sqs.clone();

        Box::pin(async move {
            for queue_url in queues {
                sqs.ready()
                    .await?
                    .call(Command::send_message(queue_url, message.clone()))
                    .await?;
            }

            Ok(SdkResponse::new(json!({ "MessageId": Uuid::new_v4().to_string() }))
                .with_request_id(Uuid::new_v4().to_string())
                .with_status(200))
        })
    }
}

/// Traced in-memory SQS client.
pub type TracedSqsClient = SegmentTracingService<InMemorySqsClient, SqsCommandExtractor>;

/// Traced in-memory SNS client delivering through a traced SQS client.
pub type TracedSnsClient =
    SegmentTracingService<InMemorySnsClient<TracedSqsClient>, SnsCommandExtractor>;

/// Wraps a fresh [`InMemorySqsClient`] in the segment tracing layer.
pub fn create_sqs_client(config: &Config) -> TracedSqsClient {
    ServiceBuilder::new()
        .layer(SegmentTracingLayer::from_config(SqsCommandExtractor::new(), config))
        .service(InMemorySqsClient::new(config.region.clone()))
}

/// Wraps a fresh [`InMemorySnsClient`] in the segment tracing layer.
pub fn create_sns_client(config: &Config, sqs: TracedSqsClient) -> TracedSnsClient {
    ServiceBuilder::new()
        .layer(SegmentTracingLayer::from_config(SnsCommandExtractor::new(), config))
        .service(InMemorySnsClient::new(config.region.clone(), sqs))
}

/// Sends one command through a client.
///
/// # Errors
///
/// Returns the client's error unchanged.
pub async fn send<S>(client: &mut S, command: Command) -> Result<SdkResponse, ClientError>
where
    S: Service<Command, Response = SdkResponse, Error = ClientError>,
{
    client.ready().await?.call(command).await
}

/// Runs an order-processing workflow inside a transaction named `sqs-demo`
/// and returns its trace.
///
/// The workflow sends one order, sends a batch, publishes a notification that
/// fans out to a second queue, and drains both queues.
///
/// # Errors
///
/// Returns the first client error; the transaction is still ended.
pub async fn run_demo(config: &Config) -> Result<TraceSnapshot, ClientError> {
    let mut sqs = create_sqs_client(config);
    let mut sns = create_sns_client(config, sqs.clone());

    let created = send(&mut sqs, create_queue("orders")).await?;
    let orders_url = response_str(&created, "QueueUrl");
    let created = send(&mut sqs, create_queue("order-audit")).await?;
    let audit_url = response_str(&created, "QueueUrl");

    let topic_arn = sns.get_ref().topic_arn("order-notifications");
    sns.get_ref().subscribe(topic_arn.as_str(), audit_url.as_str());

    run_in_named_transaction("sqs-demo", |tx| async move {
        let result = async {
            let sent = send(&mut sqs, Command::send_message(&orders_url, "order-1")).await?;
            tracing::info!(message_id = %response_str(&sent, "MessageId"), "Order queued");

            let batch = [("2", "order-2"), ("3", "order-3")];
            send(&mut sqs, Command::send_message_batch(&orders_url, batch)).await?;

            send(&mut sns, Command::publish(&topic_arn, "orders placed")).await?;

            let received = send(&mut sqs, Command::receive_message(&orders_url, 10)).await?;
            let audited = send(&mut sqs, Command::receive_message(&audit_url, 10)).await?;

            tracing::info!(
                orders = message_count(&received),
                audit = message_count(&audited),
                "Queues drained"
            );
            Ok::<(), ClientError>(())
        }
        .await;

        tx.end();
        result.map(|()| tx.trace())
    })
    .await
}

fn create_queue(name: &str) -> Command {
    Command::new("CreateQueueCommand", json!({ "QueueName": name }))
}

fn response_str(response: &SdkResponse, key: &str) -> String {
    response
        .body
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn message_count(response: &SdkResponse) -> usize {
    response
        .body
        .get("Messages")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}
