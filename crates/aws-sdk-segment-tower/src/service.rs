//! Tower Service implementation that records call segments.

use crate::attributes::AttributeExtractor;
use crate::classifier::{Action, OperationClassifier};
use crate::command::{Command, SdkResponse};
use crate::context::ActiveContext;
use crate::extractor::{CommandExtractor, UNKNOWN_RESOURCE};
use crate::future::{SegmentTracingFuture, TracedCall};
use crate::transaction::SegmentRecorder;
use opentelemetry_semantic_conventions::attribute::{
    CLOUD_REGION, ERROR_MESSAGE, MESSAGING_DESTINATION_NAME, MESSAGING_OPERATION_TYPE,
    MESSAGING_SYSTEM, OTEL_STATUS_CODE, RPC_METHOD, RPC_SERVICE, RPC_SYSTEM,
};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::field::Empty;

/// Settings shared by every service produced from one layer.
#[derive(Debug)]
pub(crate) struct Interceptor<E> {
    pub(crate) extractor: E,
    pub(crate) classifier: OperationClassifier,
    pub(crate) recorder: Arc<CallRecorder>,
    pub(crate) enabled: bool,
}

/// The part of the settings needed once a call settles.
#[derive(Debug)]
pub(crate) struct CallRecorder {
    pub(crate) attributes: AttributeExtractor,
    pub(crate) region: String,
}

impl<E: CommandExtractor> Interceptor<E> {
    /// Opens a segment for `command`, or returns `None` if the call should
    /// pass through untraced.
    fn begin(&self, command: &Command) -> Option<TracedCall> {
        if !self.enabled {
            return None;
        }

        let Some(cx) = ActiveContext::current() else {
            tracing::trace!(
                target: "sdk_segments",
                operation = command.operation(),
                "No active transaction"
            );
            return None;
        };

        let Some(descriptor) = self.classifier.classify(command.operation()) else {
            tracing::trace!(
                target: "sdk_segments",
                operation = command.operation(),
                "Operation not traced"
            );
            return None;
        };

        let resource = self
            .extractor
            .resource_name(&descriptor, command)
            .unwrap_or_else(|| UNKNOWN_RESOURCE.to_owned());
        let segment_name = descriptor.segment_name(&resource);

        let segment = match SegmentRecorder::start_segment(Some(&cx), segment_name.as_str()) {
            Ok(segment) => segment,
            Err(err) => {
                tracing::debug!(
                    target: "sdk_segments",
                    error = %err,
                    segment = %segment_name,
                    "Segment not started, passing call through"
                );
                return None;
            }
        };

        let span = tracing::info_span!(
            "aws_sdk.call",
            otel.name = %segment_name,
            otel.kind = span_kind(descriptor.action),
            { MESSAGING_SYSTEM } = self.extractor.messaging_system(),
            { MESSAGING_DESTINATION_NAME } = %resource,
            { MESSAGING_OPERATION_TYPE } = descriptor.action.operation_type(),
            { RPC_SYSTEM } = "aws-api",
            { RPC_SERVICE } = self.extractor.service_id(),
            { RPC_METHOD } = command.operation(),
            { CLOUD_REGION } = self.recorder.region.as_str(),
            transaction.id = %cx.transaction().id(),
            aws.request_id = Empty,
            { OTEL_STATUS_CODE } = Empty,
            { ERROR_MESSAGE } = Empty,
        );

        Some(TracedCall {
            segment,
            span,
            operation: command.operation().to_owned(),
            params: command.params().clone(),
            recorder: Arc::clone(&self.recorder),
            settled: false,
        })
    }
}

fn span_kind(action: Action) -> &'static str {
    match action {
        Action::Produce => "producer",
        Action::Consume => "consumer",
        Action::Other => "client",
    }
}

/// Tower service that records a segment for each traced SDK call.
///
/// This service wraps an SDK client service and, for every call:
/// 1. Looks up the transaction bound to the calling flow
/// 2. Classifies the operation and resolves its destination
/// 3. Opens a `/<action>/Named/<resource>` segment
/// 4. Invokes the inner service with that segment as the innermost one
/// 5. Records attributes and closes the segment when the call settles
///
/// Calls outside a transaction, or for operations the classifier does not
/// know, are forwarded unchanged.
///
/// # Type Parameters
///
/// * `S` - The inner service type
/// * `E` - The command extractor type
pub struct SegmentTracingService<S, E> {
    inner: S,
    interceptor: Arc<Interceptor<E>>,
}

impl<S, E> SegmentTracingService<S, E> {
    /// Creates a new tracing service wrapping the given service.
    pub(crate) fn new(inner: S, interceptor: Arc<Interceptor<E>>) -> Self {
        Self { inner, interceptor }
    }

    /// Returns a reference to the wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: Clone, E> Clone for SegmentTracingService<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            interceptor: Arc::clone(&self.interceptor),
        }
    }
}

impl<S: fmt::Debug, E> fmt::Debug for SegmentTracingService<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentTracingService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S, E> Service<Command> for SegmentTracingService<S, E>
where
    S: Service<Command, Response = SdkResponse>,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    E: CommandExtractor,
{
    type Response = SdkResponse;
    type Error = S::Error;
    type Future = SegmentTracingFuture<S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, command: Command) -> Self::Future {
        let Some(call) = self.interceptor.begin(&command) else {
            return SegmentTracingFuture::passthrough(self.inner.call(command));
        };

        // Calls issued while the inner future is being built nest under the
        // new segment.
        let future = {
            let _cx = call.segment.context().attach();
            let _enter = call.span.enter();
            self.inner.call(command)
        };

        SegmentTracingFuture::traced(future, call)
    }
}
