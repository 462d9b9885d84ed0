//! Trait definition for per-service command inspection.

use crate::classifier::{OperationClassifier, OperationDescriptor};
use crate::command::Command;

/// Resource name recorded when a command does not identify its destination.
pub const UNKNOWN_RESOURCE: &str = "Unknown";

/// Describes how calls to one SDK service are traced.
///
/// Different services identify their destination in different parameters:
/// - SQS: `QueueUrl` (or `QueueName`)
/// - SNS: `TopicArn` (or `TargetArn` / `PhoneNumber`)
///
/// Implementations supply the service's built-in operation table and the
/// logic for pulling the destination name out of a command.
///
/// # Example
///
/// ```ignore
/// use aws_sdk_segment_tower::{
///     Command, CommandExtractor, OperationClassifier, OperationDescriptor,
/// };
///
/// #[derive(Clone)]
/// struct EventBridgeExtractor;
///
/// impl CommandExtractor for EventBridgeExtractor {
///     fn service_id(&self) -> &str {
///         "EventBridge"
///     }
///
///     fn messaging_system(&self) -> &'static str {
///         "aws_eventbridge"
///     }
///
///     fn operations(&self) -> OperationClassifier {
///         OperationClassifier::empty()
///     }
///
///     fn resource_name(&self, _: &OperationDescriptor, command: &Command) -> Option<String> {
///         command.param_str("EventBusName").map(str::to_owned)
///     }
/// }
/// ```
pub trait CommandExtractor: Clone + Send + Sync + 'static {
    /// Service identifier as the SDK reports it, recorded as `aws.service`.
    fn service_id(&self) -> &str;

    /// Value for the `messaging.system` span field, e.g. `"aws_sqs"`.
    fn messaging_system(&self) -> &'static str;

    /// Built-in operations that are traced for this service.
    fn operations(&self) -> OperationClassifier;

    /// Destination name targeted by `command`.
    ///
    /// Returns `None` if the parameters do not name one; the call is then
    /// recorded against [`UNKNOWN_RESOURCE`].
    fn resource_name(
        &self,
        descriptor: &OperationDescriptor,
        command: &Command,
    ) -> Option<String>;
}
