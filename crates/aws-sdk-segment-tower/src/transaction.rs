//! Transactions and the timed segment tree recorded under them.
//!
//! A [`Transaction`] owns an arena of segment nodes. Segment handles and
//! parent links are arena indices, so the tree cannot contain cycles and a
//! parent reference never keeps anything alive on its own.

use crate::attributes::{AttributeSet, AttributeValue, Destinations};
use crate::context::{self, ActiveContext};
use crate::error::TraceError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Name given to transactions created without an explicit name.
pub const ROOT_SEGMENT_NAME: &str = "ROOT";

/// Index of a segment within its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

impl SegmentId {
    /// The root segment of every transaction.
    pub const ROOT: SegmentId = SegmentId(0);
}

#[derive(Debug)]
struct SegmentNode {
    name: String,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    parent: Option<SegmentId>,
    children: Vec<SegmentId>,
    attributes: AttributeSet,
}

impl SegmentNode {
    fn new(name: String, parent: Option<SegmentId>) -> Self {
        Self {
            name,
            start: Utc::now(),
            end: None,
            parent,
            children: Vec::new(),
            attributes: AttributeSet::new(),
        }
    }

    /// Records the end time once; later calls leave it untouched.
    fn close(&mut self) -> bool {
        if self.end.is_some() {
            return false;
        }
        self.end = Some(Utc::now().max(self.start));
        true
    }
}

#[derive(Debug)]
struct TraceState {
    segments: Vec<SegmentNode>,
    ended_at: Option<DateTime<Utc>>,
}

impl TraceState {
    fn node(&self, id: SegmentId) -> &SegmentNode {
        &self.segments[id.0]
    }

    fn node_mut(&mut self, id: SegmentId) -> &mut SegmentNode {
        &mut self.segments[id.0]
    }

    fn snapshot(&self, id: SegmentId) -> SegmentSnapshot {
        let node = self.node(id);
        SegmentSnapshot {
            name: node.name.clone(),
            start: node.start,
            end: node.end,
            duration_ms: node.end.map(|end| (end - node.start).num_milliseconds()),
            attributes: node.attributes.clone(),
            children: node
                .children
                .iter()
                .map(|child| self.snapshot(*child))
                .collect(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    id: Uuid,
    name: String,
    state: Mutex<TraceState>,
}

/// Root context for one logical unit of work.
///
/// Cloning is cheap and every clone refers to the same transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

impl Transaction {
    /// Starts a transaction whose root segment carries `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let id = Uuid::new_v4();

        tracing::debug!(
            target: "sdk_segments",
            transaction_id = %id,
            transaction_name = %name,
            "Transaction started"
        );

        Self {
            inner: Arc::new(Inner {
                id,
                state: Mutex::new(TraceState {
                    segments: vec![SegmentNode::new(name.clone(), None)],
                    ended_at: None,
                }),
                name,
            }),
        }
    }

    /// The transaction bound to the current flow, if any.
    pub fn current() -> Option<Transaction> {
        context::active_transaction()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Handle to the root segment.
    pub fn root(&self) -> Segment {
        self.segment(SegmentId::ROOT)
    }

    pub(crate) fn segment(&self, id: SegmentId) -> Segment {
        Segment {
            transaction: self.clone(),
            id,
        }
    }

    /// `true` until [`end`](Self::end) is called.
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().ended_at.is_none()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().ended_at
    }

    /// Ends the transaction and closes its root segment.
    ///
    /// Returns `false` if the transaction had already ended. Segments still
    /// in flight keep running and close when their calls settle.
    pub fn end(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.ended_at.is_some() {
            return false;
        }

        state.node_mut(SegmentId::ROOT).close();
        state.ended_at = state.node(SegmentId::ROOT).end;

        let open = state.segments.iter().filter(|s| s.end.is_none()).count();
        tracing::debug!(
            target: "sdk_segments",
            transaction_id = %self.inner.id,
            segments = state.segments.len(),
            open_segments = open,
            "Transaction ended"
        );
        true
    }

    /// Read-only view of the whole segment tree.
    pub fn trace(&self) -> TraceSnapshot {
        let state = self.inner.state.lock();
        TraceSnapshot {
            transaction_id: self.inner.id,
            name: self.inner.name.clone(),
            ended: state.ended_at.is_some(),
            root: state.snapshot(SegmentId::ROOT),
        }
    }

    /// Number of segments including the root.
    pub fn segment_count(&self) -> usize {
        self.inner.state.lock().segments.len()
    }

    /// Number of segments without an end time.
    pub fn open_segment_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .segments
            .iter()
            .filter(|segment| segment.end.is_none())
            .count()
    }

    fn start_child(&self, parent: SegmentId, name: String) -> Result<Segment, TraceError> {
        let mut state = self.inner.state.lock();

        if state.ended_at.is_some() {
            return Err(TraceError::TransactionEnded(self.inner.id));
        }

        let parent_node = state.node(parent);
        if parent_node.end.is_some() {
            return Err(TraceError::ParentEnded(parent_node.name.clone()));
        }

        let id = SegmentId(state.segments.len());
        state.segments.push(SegmentNode::new(name, Some(parent)));
        state.node_mut(parent).children.push(id);

        Ok(Segment {
            transaction: self.clone(),
            id,
        })
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Transaction {}

/// Handle to one segment of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    transaction: Transaction,
    id: SegmentId,
}

impl Segment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn name(&self) -> String {
        self.read(|node| node.name.clone())
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.read(|node| node.start)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.read(|node| node.end)
    }

    pub fn is_ended(&self) -> bool {
        self.end_time().is_some()
    }

    pub fn parent(&self) -> Option<Segment> {
        self.read(|node| node.parent)
            .map(|id| self.transaction.segment(id))
    }

    /// Children in start order.
    pub fn children(&self) -> Vec<Segment> {
        self.read(|node| node.children.clone())
            .into_iter()
            .map(|id| self.transaction.segment(id))
            .collect()
    }

    pub fn attributes(&self) -> AttributeSet {
        self.read(|node| node.attributes.clone())
    }

    pub fn add_attribute(
        &self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
        destinations: Destinations,
    ) {
        self.transaction
            .inner
            .state
            .lock()
            .node_mut(self.id)
            .attributes
            .insert(key, value, destinations);
    }

    pub fn add_attributes(&self, attributes: AttributeSet) {
        self.transaction
            .inner
            .state
            .lock()
            .node_mut(self.id)
            .attributes
            .merge(attributes);
    }

    /// Closes the segment; see [`SegmentRecorder::end_segment`].
    pub fn end(&self) -> bool {
        SegmentRecorder::end_segment(self)
    }

    /// Context that makes this segment the innermost open one.
    pub fn context(&self) -> ActiveContext {
        ActiveContext::new(self.transaction.clone(), self.id)
    }

    fn read<R>(&self, f: impl FnOnce(&SegmentNode) -> R) -> R {
        f(self.transaction.inner.state.lock().node(self.id))
    }
}

/// Opens and closes segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentRecorder;

impl SegmentRecorder {
    /// Opens a segment under the innermost segment of `cx`.
    ///
    /// # Errors
    ///
    /// - [`TraceError::NoActiveTransaction`] if `cx` is `None`
    /// - [`TraceError::TransactionEnded`] if the transaction has ended
    /// - [`TraceError::ParentEnded`] if the parent segment is closed
    pub fn start_segment(
        cx: Option<&ActiveContext>,
        name: impl Into<String>,
    ) -> Result<Segment, TraceError> {
        let cx = cx.ok_or(TraceError::NoActiveTransaction)?;
        cx.transaction().start_child(cx.segment_id(), name.into())
    }

    /// Records the end time of `segment`.
    ///
    /// Returns `false` without changing anything if it was already ended.
    pub fn end_segment(segment: &Segment) -> bool {
        segment
            .transaction
            .inner
            .state
            .lock()
            .node_mut(segment.id)
            .close()
    }
}

/// Serializable view of one segment and its descendants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSnapshot {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub attributes: AttributeSet,
    pub children: Vec<SegmentSnapshot>,
}

impl SegmentSnapshot {
    pub fn is_ended(&self) -> bool {
        self.end.is_some()
    }

    /// Depth-first iterator over this segment and all descendants.
    pub fn iter(&self) -> impl Iterator<Item = &SegmentSnapshot> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.children.iter().rev());
            Some(next)
        })
    }

    /// First segment (depth-first) with the given name.
    pub fn find(&self, name: &str) -> Option<&SegmentSnapshot> {
        self.iter().find(|segment| segment.name == name)
    }
}

/// Serializable view of a transaction's trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSnapshot {
    pub transaction_id: Uuid,
    pub name: String,
    pub ended: bool,
    pub root: SegmentSnapshot,
}

impl TraceSnapshot {
    pub fn root(&self) -> &SegmentSnapshot {
        &self.root
    }

    /// All segments with the given name, depth-first.
    pub fn segments_named(&self, name: &str) -> Vec<&SegmentSnapshot> {
        self.root
            .iter()
            .filter(|segment| segment.name == name)
            .collect()
    }
}
