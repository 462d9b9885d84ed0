//! SNS command extractor for publish operations.
//!
//! The destination is taken from, in order:
//! 1. `TopicArn` - the usual topic publish
//! 2. `TargetArn` - direct publish to a platform endpoint
//! 3. `PhoneNumber` - SMS publish, recorded as the literal `PhoneNumber`

use crate::classifier::{OperationClassifier, OperationDescriptor};
use crate::command::Command;
use crate::extractor::CommandExtractor;

/// SDK service identifier for SNS.
pub const SNS_SERVICE_ID: &str = "SNS";

/// Extractor for SNS client commands.
///
/// Traces `PublishCommand` and `PublishBatchCommand` as `Produce` against a
/// topic.
///
/// # Example
///
/// ```ignore
/// use aws_sdk_segment_tower::{SegmentTracingLayer, SnsCommandExtractor};
///
/// let layer = SegmentTracingLayer::new(SnsCommandExtractor::new());
/// ```
#[derive(Clone, Debug, Default)]
pub struct SnsCommandExtractor;

impl SnsCommandExtractor {
    /// Creates a new SNS command extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extracts the resource name from an SNS ARN.
    ///
    /// ARN format: `arn:aws:sns:{region}:{account}:{topic-name}`
    fn name_from_arn(arn: &str) -> Option<&str> {
        arn.rsplit(':').next().filter(|name| !name.is_empty())
    }
}

impl CommandExtractor for SnsCommandExtractor {
    fn service_id(&self) -> &str {
        SNS_SERVICE_ID
    }

    fn messaging_system(&self) -> &'static str {
        "aws_sns"
    }

    fn operations(&self) -> OperationClassifier {
        OperationClassifier::sns()
    }

    fn resource_name(
        &self,
        _descriptor: &OperationDescriptor,
        command: &Command,
    ) -> Option<String> {
        if let Some(name) = command.param_str("TopicArn").and_then(Self::name_from_arn) {
            return Some(name.to_owned());
        }

        if let Some(name) = command.param_str("TargetArn").and_then(Self::name_from_arn) {
            return Some(name.to_owned());
        }

        command
            .param_str("PhoneNumber")
            .map(|_| "PhoneNumber".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Action, ResourceKind};
    use serde_json::json;

    fn resource(command: &Command) -> Option<String> {
        let extractor = SnsCommandExtractor::new();
        let descriptor = extractor.operations().classify(command.operation()).unwrap();
        extractor.resource_name(&descriptor, command)
    }

    #[test]
    fn test_service_id() {
        let extractor = SnsCommandExtractor::new();

        assert_eq!(extractor.service_id(), "SNS");
        assert_eq!(extractor.messaging_system(), "aws_sns");
    }

    #[test]
    fn test_publish_classification() {
        let descriptor = SnsCommandExtractor::new()
            .operations()
            .classify("PublishCommand")
            .unwrap();

        assert_eq!(descriptor.action, Action::Produce);
        assert_eq!(descriptor.resource_kind, ResourceKind::Topic);
    }

    #[test]
    fn test_topic_name_from_arn() {
        let command = Command::publish("arn:aws:sns:us-east-1:123456789:my-topic", "hi");

        assert_eq!(resource(&command).as_deref(), Some("my-topic"));
    }

    #[test]
    fn test_target_arn() {
        let command = Command::new(
            "PublishCommand",
            json!({
                "TargetArn": "arn:aws:sns:us-east-1:123:endpoint/APNS/app/abc",
                "Message": "x",
            }),
        );

        assert_eq!(resource(&command).as_deref(), Some("endpoint/APNS/app/abc"));
    }

    #[test]
    fn test_phone_number() {
        let command = Command::new(
            "PublishCommand",
            json!({ "PhoneNumber": "+15555550100", "Message": "x" }),
        );

        assert_eq!(resource(&command).as_deref(), Some("PhoneNumber"));
    }

    #[test]
    fn test_missing_destination() {
        let command = Command::new("PublishCommand", json!({ "TopicArn": "", "Message": "x" }));

        assert!(resource(&command).is_none());
    }
}
