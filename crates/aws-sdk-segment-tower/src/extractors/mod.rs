//! Service-specific command extractors.
//!
//! Each extractor is feature-gated:
//!
//! - `sqs` - Simple Queue Service (enabled by default)
//! - `sns` - Simple Notification Service
//!
//! Enable features via Cargo.toml:
//!
//! ```toml
//! [dependencies]
//! aws-sdk-segment-tower = { version = "0.1", features = ["sqs", "sns"] }
//! ```

#[cfg(feature = "sqs")]
pub mod sqs;

#[cfg(feature = "sns")]
pub mod sns;
