//! SQS command extractor.
//!
//! Queue-bound operations carry the destination as a `QueueUrl` of the form
//! `{endpoint}/{account}/{queue-name}`.

use crate::classifier::{OperationClassifier, OperationDescriptor};
use crate::command::Command;
use crate::extractor::CommandExtractor;

/// SDK service identifier for SQS.
pub const SQS_SERVICE_ID: &str = "SQS";

/// Extractor for SQS client commands.
///
/// Traces `SendMessageCommand` and `SendMessageBatchCommand` as `Produce`
/// and `ReceiveMessageCommand` as `Consume`. A batch send is one call and
/// therefore one segment regardless of its entry count.
///
/// # Example
///
/// ```ignore
/// use aws_sdk_segment_tower::{SegmentTracingLayer, SqsCommandExtractor};
///
/// let layer = SegmentTracingLayer::new(SqsCommandExtractor::new());
/// ```
#[derive(Clone, Debug, Default)]
pub struct SqsCommandExtractor;

impl SqsCommandExtractor {
    /// Creates a new SQS command extractor.
    pub fn new() -> Self {
        Self
    }
}

impl CommandExtractor for SqsCommandExtractor {
    fn service_id(&self) -> &str {
        SQS_SERVICE_ID
    }

    fn messaging_system(&self) -> &'static str {
        "aws_sqs"
    }

    fn operations(&self) -> OperationClassifier {
        OperationClassifier::sqs()
    }

    fn resource_name(
        &self,
        _descriptor: &OperationDescriptor,
        command: &Command,
    ) -> Option<String> {
        command
            .param_str("QueueUrl")
            .and_then(queue_name_from_url)
            .or_else(|| command.param_str("QueueName").filter(|name| !name.is_empty()))
            .map(str::to_owned)
    }
}

/// Extracts the queue name from a queue URL.
///
/// URL format: `https://sqs.{region}.amazonaws.com/{account}/{queue-name}`.
/// Query strings, fragments and trailing slashes are ignored.
///
/// # Example
///
/// ```
/// use aws_sdk_segment_tower::extractors::sqs::queue_name_from_url;
///
/// let url = "https://sqs.us-east-1.amazonaws.com/123456789012/my-queue";
/// assert_eq!(queue_name_from_url(url), Some("my-queue"));
/// ```
pub fn queue_name_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.trim_end_matches('/').rsplit('/').next()?;

    if name.is_empty() || name.contains(':') {
        return None;
    }
    Some(name)
}
