//! Segment attributes and the extractor that derives them from SDK calls.

use crate::command::SdkResponse;
use opentelemetry_semantic_conventions::attribute::MESSAGING_BATCH_MESSAGE_COUNT;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::BitOr;

/// SDK operation name, e.g. `SendMessageCommand`.
pub const AWS_OPERATION: &str = "aws.operation";
/// SDK service identifier as reported by the client.
pub const AWS_SERVICE: &str = "aws.service";
/// Region the client is configured for.
pub const AWS_REGION: &str = "aws.region";
/// Request id from the response metadata.
pub const AWS_REQUEST_ID: &str = "aws.requestId";

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Returns the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(n) => write!(f, "{n}"),
            AttributeValue::Float(x) => write!(f, "{x}"),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Set of outputs an attribute is exported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Destinations(u8);

impl Destinations {
    pub const NONE: Self = Self(0);
    pub const SEGMENT: Self = Self(0b001);
    pub const SPAN_EVENT: Self = Self(0b010);
    pub const TRANSACTION_TRACE: Self = Self(0b100);
    pub const ALL: Self = Self(0b111);

    /// Returns `true` if every destination in `other` is also in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if `self` and `other` share at least one destination.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Destinations {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    value: AttributeValue,
    destinations: Destinations,
}

/// Destination-scoped attributes of a segment, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    entries: BTreeMap<String, Entry>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an attribute.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
        destinations: Destinations,
    ) {
        self.entries.insert(
            key.into(),
            Entry {
                value: value.into(),
                destinations,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Destinations an attribute is scoped to.
    pub fn destinations(&self, key: &str) -> Option<Destinations> {
        self.entries.get(key).map(|entry| entry.destinations)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.as_str(), &entry.value))
    }

    /// Attributes exported to the given destination.
    pub fn for_destination(
        &self,
        destination: Destinations,
    ) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries
            .iter()
            .filter(move |(_, entry)| entry.destinations.intersects(destination))
            .map(|(key, entry)| (key.as_str(), &entry.value))
    }

    /// Copies every attribute of `other` into `self`, overwriting duplicates.
    pub fn merge(&mut self, other: AttributeSet) {
        self.entries.extend(other.entries);
    }

    /// Returns `true` if `key` holds a string equal to `expected`, ignoring
    /// ASCII case.
    pub fn matches_ignore_case(&self, key: &str, expected: &str) -> bool {
        self.get(key)
            .and_then(AttributeValue::as_str)
            .is_some_and(|value| value.eq_ignore_ascii_case(expected))
    }
}

impl Serialize for AttributeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, entry) in &self.entries {
            map.serialize_entry(key, &entry.value)?;
        }
        map.end()
    }
}

/// Derives segment attributes from a settled SDK call.
///
/// Extraction never fails: anything missing or malformed is left out.
#[derive(Debug, Clone)]
pub struct AttributeExtractor {
    service: String,
    exclude: BTreeSet<String>,
}

impl AttributeExtractor {
    const DESTINATIONS: Destinations =
        Destinations(Destinations::SEGMENT.0 | Destinations::SPAN_EVENT.0);

    /// Creates an extractor for the given SDK service identifier.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            exclude: BTreeSet::new(),
        }
    }

    /// Drops the listed keys from every extracted set.
    pub fn with_excluded<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.exclude.extend(keys.into_iter().map(Into::into));
        self
    }

    /// The service identifier recorded as `aws.service`.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Builds the attribute set for one call.
    ///
    /// `response` is `None` when the call failed; only request-derived
    /// attributes are recorded in that case.
    pub fn extract(
        &self,
        operation: &str,
        params: &Value,
        response: Option<&SdkResponse>,
        region: &str,
    ) -> AttributeSet {
        let mut attributes = AttributeSet::new();

        attributes.insert(AWS_OPERATION, operation, Self::DESTINATIONS);
        attributes.insert(AWS_SERVICE, self.service.as_str(), Self::DESTINATIONS);
        attributes.insert(AWS_REGION, region, Self::DESTINATIONS);

        if let Some(request_id) = response.and_then(SdkResponse::request_id) {
            attributes.insert(AWS_REQUEST_ID, request_id, Self::DESTINATIONS);
        }

        if let Some(count) = params
            .get("Entries")
            .and_then(Value::as_array)
            .map(Vec::len)
            .and_then(|n| i64::try_from(n).ok())
        {
            attributes.insert(MESSAGING_BATCH_MESSAGE_COUNT, count, Self::DESTINATIONS);
        }

        for key in &self.exclude {
            attributes.remove(key);
        }

        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_success_sets_all_fields() {
        let extractor = AttributeExtractor::new("SQS");
        let response = SdkResponse::new(json!({ "MessageId": "m-1" })).with_request_id("req-9");

        let attrs = extractor.extract(
            "SendMessageCommand",
            &json!({ "QueueUrl": "http://q/queueA" }),
            Some(&response),
            "us-east-1",
        );

        assert_eq!(
            attrs.get(AWS_OPERATION),
            Some(&AttributeValue::from("SendMessageCommand"))
        );
        assert_eq!(attrs.get(AWS_REGION).and_then(|v| v.as_str()), Some("us-east-1"));
        assert_eq!(attrs.get(AWS_REQUEST_ID).and_then(|v| v.as_str()), Some("req-9"));
        assert!(attrs.matches_ignore_case(AWS_SERVICE, "sqs"));
        assert!(!attrs.contains_key(MESSAGING_BATCH_MESSAGE_COUNT));
    }

    #[test]
    fn test_extract_omits_request_id_when_missing() {
        let extractor = AttributeExtractor::new("sqs");
        let response = SdkResponse::new(json!({}));

        let attrs = extractor.extract(
            "ReceiveMessageCommand",
            &json!({}),
            Some(&response),
            "eu-west-1",
        );

        assert!(!attrs.contains_key(AWS_REQUEST_ID));
        assert_eq!(attrs.len(), 3);
    }

    #[test]
    fn test_extract_failure_keeps_request_fields() {
        let extractor = AttributeExtractor::new("SQS");

        let attrs = extractor.extract("SendMessageCommand", &Value::Null, None, "us-west-2");

        assert!(attrs.contains_key(AWS_OPERATION));
        assert!(attrs.contains_key(AWS_SERVICE));
        assert!(attrs.contains_key(AWS_REGION));
        assert!(!attrs.contains_key(AWS_REQUEST_ID));
    }

    #[test]
    fn test_extract_batch_count() {
        let extractor = AttributeExtractor::new("SQS");
        let params = json!({ "Entries": [{ "Id": "1" }, { "Id": "2" }] });

        let attrs = extractor.extract("SendMessageBatchCommand", &params, None, "us-east-1");

        assert_eq!(
            attrs.get(MESSAGING_BATCH_MESSAGE_COUNT).and_then(AttributeValue::as_i64),
            Some(2)
        );
    }

    #[test]
    fn test_excluded_keys_are_dropped() {
        let extractor = AttributeExtractor::new("SQS").with_excluded([AWS_REGION]);

        let attrs = extractor.extract("SendMessageCommand", &Value::Null, None, "us-east-1");

        assert!(!attrs.contains_key(AWS_REGION));
        assert!(attrs.contains_key(AWS_OPERATION));
    }

    #[test]
    fn test_destination_filtering() {
        let mut attrs = AttributeSet::new();
        attrs.insert("a", "1", Destinations::SEGMENT);
        attrs.insert("b", 2_i64, Destinations::TRANSACTION_TRACE);
        attrs.insert("c", true, Destinations::ALL);

        let segment_keys: Vec<_> = attrs
            .for_destination(Destinations::SEGMENT)
            .map(|(k, _)| k)
            .collect();
        assert_eq!(segment_keys, vec!["a", "c"]);

        assert!(Destinations::ALL.contains(Destinations::SPAN_EVENT));
        assert!(!Destinations::SEGMENT.contains(Destinations::ALL));
        assert_eq!(attrs.destinations("b"), Some(Destinations::TRANSACTION_TRACE));
    }

    #[test]
    fn test_attribute_set_serializes_as_map() {
        let mut attrs = AttributeSet::new();
        attrs.insert(AWS_OPERATION, "SendMessageCommand", Destinations::SEGMENT);
        attrs.insert("count", 3_i64, Destinations::SEGMENT);

        let value = serde_json::to_value(&attrs).unwrap();

        assert_eq!(value, json!({ "aws.operation": "SendMessageCommand", "count": 3 }));
    }
}
