//! Maps SDK operation names to messaging actions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Semantic action of a messaging operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Produce,
    Consume,
    Other,
}

impl Action {
    /// Name used in segment names.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Produce => "Produce",
            Action::Consume => "Consume",
            Action::Other => "Other",
        }
    }

    /// Value for the `messaging.operation.type` span field.
    pub fn operation_type(self) -> &'static str {
        match self {
            Action::Produce => "send",
            Action::Consume => "receive",
            Action::Other => "other",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of destination an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Queue,
    Topic,
}

/// Classification of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub action: Action,
    pub resource_kind: ResourceKind,
}

impl OperationDescriptor {
    pub const fn new(action: Action, resource_kind: ResourceKind) -> Self {
        Self {
            action,
            resource_kind,
        }
    }

    /// Segment name for a call against `resource`: `/<action>/Named/<resource>`.
    pub fn segment_name(&self, resource: &str) -> String {
        format!("/{}/Named/{}", self.action, resource)
    }
}

const SQS_OPERATIONS: &[(&str, OperationDescriptor)] = &[
    (
        "SendMessageCommand",
        OperationDescriptor::new(Action::Produce, ResourceKind::Queue),
    ),
    (
        "SendMessageBatchCommand",
        OperationDescriptor::new(Action::Produce, ResourceKind::Queue),
    ),
    (
        "ReceiveMessageCommand",
        OperationDescriptor::new(Action::Consume, ResourceKind::Queue),
    ),
];

const SNS_OPERATIONS: &[(&str, OperationDescriptor)] = &[
    (
        "PublishCommand",
        OperationDescriptor::new(Action::Produce, ResourceKind::Topic),
    ),
    (
        "PublishBatchCommand",
        OperationDescriptor::new(Action::Produce, ResourceKind::Topic),
    ),
];

/// Lookup table from operation name to [`OperationDescriptor`].
///
/// Lookups are exact and case-sensitive; SDK operation names are fixed
/// identifiers.
#[derive(Debug, Clone, Default)]
pub struct OperationClassifier {
    table: HashMap<String, OperationDescriptor>,
}

impl OperationClassifier {
    /// An empty classifier that recognizes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in table for SQS.
    pub fn sqs() -> Self {
        Self::from_entries(SQS_OPERATIONS)
    }

    /// Built-in table for SNS.
    pub fn sns() -> Self {
        Self::from_entries(SNS_OPERATIONS)
    }

    fn from_entries(entries: &[(&str, OperationDescriptor)]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(name, descriptor)| ((*name).to_owned(), *descriptor))
                .collect(),
        }
    }

    /// Adds or replaces an entry.
    pub fn with_operation(
        mut self,
        name: impl Into<String>,
        descriptor: OperationDescriptor,
    ) -> Self {
        self.table.insert(name.into(), descriptor);
        self
    }

    /// Adds every entry of `extra`, replacing existing ones.
    pub fn extend<I, K>(&mut self, extra: I)
    where
        I: IntoIterator<Item = (K, OperationDescriptor)>,
        K: Into<String>,
    {
        self.table
            .extend(extra.into_iter().map(|(name, descriptor)| (name.into(), descriptor)));
    }

    /// Classifies an operation; `None` means the call is not traced.
    pub fn classify(&self, operation: &str) -> Option<OperationDescriptor> {
        self.table.get(operation).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqs_table() {
        let classifier = OperationClassifier::sqs();

        assert_eq!(
            classifier.classify("SendMessageCommand").map(|d| d.action),
            Some(Action::Produce)
        );
        assert_eq!(
            classifier.classify("SendMessageBatchCommand").map(|d| d.action),
            Some(Action::Produce)
        );
        assert_eq!(
            classifier.classify("ReceiveMessageCommand"),
            Some(OperationDescriptor::new(Action::Consume, ResourceKind::Queue))
        );
        assert_eq!(classifier.len(), 3);
    }

    #[test]
    fn test_unrecognized_operation() {
        let classifier = OperationClassifier::sqs();

        assert!(classifier.classify("DeleteMessageCommand").is_none());
        assert!(classifier.classify("sendmessagecommand").is_none());
        assert!(classifier.classify("").is_none());
        assert!(OperationClassifier::empty().classify("SendMessageCommand").is_none());
    }

    #[test]
    fn test_sns_table() {
        let classifier = OperationClassifier::sns();

        assert_eq!(
            classifier.classify("PublishCommand"),
            Some(OperationDescriptor::new(Action::Produce, ResourceKind::Topic))
        );
        assert!(classifier.classify("SendMessageCommand").is_none());
    }

    #[test]
    fn test_with_operation_overrides() {
        let classifier = OperationClassifier::sqs().with_operation(
            "SendMessageCommand",
            OperationDescriptor::new(Action::Other, ResourceKind::Queue),
        );

        assert_eq!(
            classifier.classify("SendMessageCommand").map(|d| d.action),
            Some(Action::Other)
        );
    }

    #[test]
    fn test_segment_name() {
        let produce = OperationDescriptor::new(Action::Produce, ResourceKind::Queue);
        let consume = OperationDescriptor::new(Action::Consume, ResourceKind::Queue);

        assert_eq!(produce.segment_name("queueA"), "/Produce/Named/queueA");
        assert_eq!(consume.segment_name("queueA"), "/Consume/Named/queueA");
    }

    #[test]
    fn test_descriptor_deserializes() {
        let descriptor: OperationDescriptor =
            serde_json::from_str(r#"{"action":"Consume","resource_kind":"Topic"}"#).unwrap();

        assert_eq!(descriptor.action, Action::Consume);
        assert_eq!(descriptor.resource_kind, ResourceKind::Topic);
    }
}
