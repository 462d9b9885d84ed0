//! Tower middleware that records trace segments for AWS messaging SDK calls.
//!
//! This crate wraps an SDK client service (anything implementing
//! `Service<Command, Response = SdkResponse>`) with a layer that, whenever a
//! traced operation is sent inside an active transaction, opens a child
//! segment named after the operation's action and destination, records
//! `aws.*` attributes once the call settles, and closes the segment on
//! success and failure alike. The call's own result is never altered.
//!
//! # Architecture
//!
//! - [`Transaction`] owns a tree of [`Segment`]s rooted at a root segment.
//! - The transaction of the current logical flow is carried by
//!   [`ActiveContext`], which follows a future across `.await` points and
//!   worker threads via [`TransactionFutureExt`].
//! - [`SegmentTracingLayer`] classifies each command with an
//!   [`OperationClassifier`], resolves the destination through a
//!   [`CommandExtractor`], and delegates attribute derivation to an
//!   [`AttributeExtractor`].
//!
//! Segment lifecycle is also reported through `tracing`: every traced call
//! runs inside an `aws_sdk.call` span carrying messaging and RPC semantic
//! convention fields.
//!
//! # Usage
//!
//! ```ignore
//! use aws_sdk_segment_tower::{
//!     Command, SegmentTracingLayer, SqsCommandExtractor, run_in_transaction,
//! };
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! let mut client = ServiceBuilder::new()
//!     .layer(SegmentTracingLayer::new(SqsCommandExtractor::new()))
//!     .service(sqs_client);
//!
//! let trace = run_in_transaction(|tx| async move {
//!     let command = Command::send_message("https://sqs.us-east-1.amazonaws.com/123/queueA", "hi");
//!     client.ready().await?.call(command).await?;
//!     tx.end();
//!     Ok::<_, Error>(tx.trace())
//! })
//! .await?;
//!
//! assert!(trace.root().find("/Produce/Named/queueA").is_some());
//! ```
//!
//! # Features
//!
//! - `sqs` - SQS command extractor (enabled by default)
//! - `sns` - SNS command extractor
//! - `full` - All extractors

#![forbid(unsafe_code)]

mod attributes;
mod classifier;
mod command;
mod config;
mod context;
mod error;
mod extractor;
mod future;
mod layer;
mod service;
mod transaction;

pub mod extractors;

pub use attributes::{
    AWS_OPERATION, AWS_REGION, AWS_REQUEST_ID, AWS_SERVICE, AttributeExtractor, AttributeSet,
    AttributeValue, Destinations,
};
pub use classifier::{Action, OperationClassifier, OperationDescriptor, ResourceKind};
pub use command::{Command, ResponseMetadata, SdkResponse};
pub use config::{AttributesConfig, Config, ConfigBuilder};
pub use context::{
    ActiveContext, ContextGuard, TransactionFutureExt, WithActiveContext, active_transaction,
    run_in_named_transaction, run_in_transaction,
};
pub use error::{ConfigError, TraceError};
pub use extractor::{CommandExtractor, UNKNOWN_RESOURCE};
pub use future::SegmentTracingFuture;
pub use layer::{SegmentTracingLayer, SegmentTracingLayerBuilder};
pub use service::SegmentTracingService;
pub use transaction::{
    ROOT_SEGMENT_NAME, Segment, SegmentId, SegmentRecorder, SegmentSnapshot, TraceSnapshot,
    Transaction,
};

#[cfg(feature = "sqs")]
pub use extractors::sqs::SqsCommandExtractor;

#[cfg(feature = "sns")]
pub use extractors::sns::SnsCommandExtractor;
