//! Tower Layer implementation for segment tracing.

use crate::attributes::AttributeExtractor;
use crate::classifier::OperationDescriptor;
use crate::config::{Config, DEFAULT_REGION};
use crate::extractor::CommandExtractor;
use crate::service::{CallRecorder, Interceptor, SegmentTracingService};
use std::fmt;
use std::sync::Arc;
use tower::Layer;

/// Tower layer that records trace segments for SDK client calls.
///
/// This layer wraps an SDK client service with instrumentation that:
/// - Picks up the transaction bound to the calling flow
/// - Opens a segment named `/<action>/Named/<resource>` per traced call
/// - Records `aws.*` attributes once the call settles
/// - Closes the segment whether the call succeeds or fails
///
/// # Type Parameters
///
/// * `E` - The command extractor type
///
/// # Example
///
/// ```ignore
/// use aws_sdk_segment_tower::{SegmentTracingLayer, SqsCommandExtractor};
/// use tower::ServiceBuilder;
///
/// let layer = SegmentTracingLayer::new(SqsCommandExtractor::new());
///
/// let client = ServiceBuilder::new()
///     .layer(layer)
///     .service(sqs_client);
/// ```
pub struct SegmentTracingLayer<E> {
    interceptor: Arc<Interceptor<E>>,
}

impl<E: CommandExtractor> SegmentTracingLayer<E> {
    /// Creates a new tracing layer with the given extractor.
    ///
    /// Uses default settings:
    /// - Enabled
    /// - Region `us-east-1`
    /// - The extractor's built-in operation table
    /// - No excluded attributes
    pub fn new(extractor: E) -> Self {
        Self::builder(extractor).build()
    }

    /// Creates a layer configured from a loaded [`Config`].
    pub fn from_config(extractor: E, config: &Config) -> Self {
        Self::builder(extractor).config(config).build()
    }

    /// Creates a builder for more detailed configuration.
    pub fn builder(extractor: E) -> SegmentTracingLayerBuilder<E> {
        SegmentTracingLayerBuilder::new(extractor)
    }
}

impl<E> Clone for SegmentTracingLayer<E> {
    fn clone(&self) -> Self {
        Self {
            interceptor: Arc::clone(&self.interceptor),
        }
    }
}

impl<E> fmt::Debug for SegmentTracingLayer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentTracingLayer")
            .field("enabled", &self.interceptor.enabled)
            .field("region", &self.interceptor.recorder.region)
            .field("operations", &self.interceptor.classifier.len())
            .finish()
    }
}

impl<S, E> Layer<S> for SegmentTracingLayer<E> {
    type Service = SegmentTracingService<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        SegmentTracingService::new(inner, Arc::clone(&self.interceptor))
    }
}

/// Builder for configuring a [`SegmentTracingLayer`].
///
/// # Example
///
/// ```ignore
/// use aws_sdk_segment_tower::{SegmentTracingLayer, SqsCommandExtractor};
///
/// let layer = SegmentTracingLayer::builder(SqsCommandExtractor::new())
///     .region("eu-west-1")
///     .exclude_attribute("aws.requestId")
///     .build();
/// ```
#[must_use = "builders do nothing unless .build() is called"]
pub struct SegmentTracingLayerBuilder<E> {
    extractor: E,
    enabled: bool,
    region: String,
    exclude: Vec<String>,
    operations: Vec<(String, OperationDescriptor)>,
}

impl<E: CommandExtractor> SegmentTracingLayerBuilder<E> {
    /// Creates a new builder with the given extractor.
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            enabled: true,
            region: DEFAULT_REGION.to_string(),
            exclude: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Applies every setting from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.enabled = config.enabled;
        self.region = config.region.clone();
        self.exclude.extend(config.attributes.exclude.iter().cloned());
        self.operations.extend(
            config
                .operations
                .iter()
                .map(|(name, descriptor)| (name.clone(), *descriptor)),
        );
        self
    }

    /// Sets whether calls are traced at all.
    ///
    /// Default: `true`
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the region recorded as `aws.region`.
    ///
    /// Default: `us-east-1`
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Never records the given attribute key.
    pub fn exclude_attribute(mut self, key: impl Into<String>) -> Self {
        self.exclude.push(key.into());
        self
    }

    /// Traces an operation the extractor's built-in table does not know,
    /// or overrides the classification of one it does.
    pub fn operation(mut self, name: impl Into<String>, descriptor: OperationDescriptor) -> Self {
        self.operations.push((name.into(), descriptor));
        self
    }

    /// Builds the configured layer.
    pub fn build(self) -> SegmentTracingLayer<E> {
        let mut classifier = self.extractor.operations();
        classifier.extend(self.operations);

        let attributes =
            AttributeExtractor::new(self.extractor.service_id()).with_excluded(self.exclude);

        SegmentTracingLayer {
            interceptor: Arc::new(Interceptor {
                extractor: self.extractor,
                classifier,
                recorder: Arc::new(CallRecorder {
                    attributes,
                    region: self.region,
                }),
                enabled: self.enabled,
            }),
        }
    }
}
