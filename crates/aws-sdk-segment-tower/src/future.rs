//! Future implementation that manages segment lifecycle.

use crate::command::SdkResponse;
use crate::context::TransactionFutureExt;
use crate::service::CallRecorder;
use crate::transaction::{Segment, SegmentRecorder};
use opentelemetry_semantic_conventions::attribute::{ERROR_MESSAGE, OTEL_STATUS_CODE};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{Instrument, Span};

type BoxedCall<E> = Pin<Box<dyn Future<Output = Result<SdkResponse, E>> + Send>>;

/// Segment and request data held while a traced call is in flight.
///
/// Dropping an unsettled call closes its segment without response data.
pub(crate) struct TracedCall {
    pub(crate) segment: Segment,
    pub(crate) span: Span,
    pub(crate) operation: String,
    pub(crate) params: Value,
    pub(crate) recorder: Arc<CallRecorder>,
    pub(crate) settled: bool,
}

impl TracedCall {
    /// Records attributes and status, then closes the segment.
    fn finish<E: fmt::Display>(mut self, result: &Result<SdkResponse, E>) {
        self.close(result.as_ref().ok());

        match result {
            Ok(response) => {
                if let Some(request_id) = response.request_id() {
                    self.span.record("aws.request_id", request_id);
                }
                self.span.record(OTEL_STATUS_CODE, "OK");
            }
            Err(e) => {
                self.span.record(OTEL_STATUS_CODE, "ERROR");
                self.span.record(ERROR_MESSAGE, e.to_string().as_str());
            }
        }
    }

    fn close(&mut self, response: Option<&SdkResponse>) {
        let attributes = self.recorder.attributes.extract(
            &self.operation,
            &self.params,
            response,
            &self.recorder.region,
        );
        self.segment.add_attributes(attributes);
        SegmentRecorder::end_segment(&self.segment);
        self.settled = true;
    }
}

impl Drop for TracedCall {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(
                target: "sdk_segments",
                operation = %self.operation,
                "Closing segment of a call that never settled"
            );
            self.close(None);
        }
    }
}

/// Future returned by [`SegmentTracingService`](crate::SegmentTracingService).
///
/// This future:
/// 1. Polls the inner call with its segment bound as the innermost one
/// 2. Records attributes and status once the call settles
/// 3. Closes the segment and returns the call's result unchanged
///
/// Dropping the future before the call settles does not cancel the call:
/// the remainder is moved onto the current tokio runtime and the segment
/// closes when it settles. Outside a runtime, or if the runtime shuts down
/// first, the segment is closed on drop.
pub struct SegmentTracingFuture<E>
where
    E: fmt::Display + Send + 'static,
{
    inner: Option<BoxedCall<E>>,
    call: Option<TracedCall>,
}

impl<E> SegmentTracingFuture<E>
where
    E: fmt::Display + Send + 'static,
{
    pub(crate) fn passthrough<F>(inner: F) -> Self
    where
        F: Future<Output = Result<SdkResponse, E>> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(inner)),
            call: None,
        }
    }

    pub(crate) fn traced<F>(inner: F, call: TracedCall) -> Self
    where
        F: Future<Output = Result<SdkResponse, E>> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(inner)),
            call: Some(call),
        }
    }

    /// The segment recorded for this call, if it is traced.
    pub fn segment(&self) -> Option<&Segment> {
        self.call.as_ref().map(|call| &call.segment)
    }
}

impl<E> Future for SegmentTracingFuture<E>
where
    E: fmt::Display + Send + 'static,
{
    type Output = Result<SdkResponse, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let inner = this
            .inner
            .as_mut()
            .expect("SegmentTracingFuture polled after completion");

        let poll_result = match this.call.as_ref() {
            Some(call) => {
                let _cx = call.segment.context().attach();
                let _enter = call.span.enter();
                inner.as_mut().poll(cx)
            }
            None => inner.as_mut().poll(cx),
        };

        let Poll::Ready(result) = poll_result else {
            return Poll::Pending;
        };

        this.inner = None;
        if let Some(call) = this.call.take() {
            call.finish(&result);
        }

        Poll::Ready(result)
    }
}

impl<E> Drop for SegmentTracingFuture<E>
where
    E: fmt::Display + Send + 'static,
{
    fn drop(&mut self) {
        let Some(call) = self.call.take() else {
            return;
        };
        let Some(inner) = self.inner.take() else {
            return;
        };

        // an inner future that panicked must not be polled again
        if std::thread::panicking() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(
                    target: "sdk_segments",
                    operation = %call.operation,
                    "Caller dropped in-flight call, detaching until it settles"
                );
                let cx = call.segment.context();
                let span = call.span.clone();
                handle.spawn(
                    async move {
                        let result = inner.await;
                        call.finish(&result);
                    }
                    .with_active_context(cx)
                    .instrument(span),
                );
            }
            Err(_) => {
                tracing::warn!(
                    target: "sdk_segments",
                    operation = %call.operation,
                    "In-flight call dropped outside a tokio runtime, closing its segment"
                );
            }
        }
    }
}

impl<E> fmt::Debug for SegmentTracingFuture<E>
where
    E: fmt::Display + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentTracingFuture")
            .field("traced", &self.call.is_some())
            .field("settled", &self.inner.is_none())
            .finish()
    }
}
