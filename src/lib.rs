//! AWS SDK segments workspace - end-to-end tests for the segment tracing layer.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crates:
//!
//! - `aws-sdk-segment-tower`: Tower middleware that records trace segments for SDK calls
//! - `aws-sdk-segment-example`: In-memory SQS/SNS clients and a demo workflow
