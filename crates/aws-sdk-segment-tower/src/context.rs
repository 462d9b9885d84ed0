//! Ambient transaction binding for the current logical flow.
//!
//! The binding lives in a thread-local slot that is only populated while a
//! future carrying it is being polled (see [`WithActiveContext`]). Each poll
//! installs the flow's own context and restores whatever was there before,
//! so interleaved flows on one thread never observe each other's
//! transaction, and a flow that migrates between worker threads takes its
//! binding with it.

use crate::transaction::{ROOT_SEGMENT_NAME, Segment, SegmentId, Transaction};
use pin_project::pin_project;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

thread_local! {
    static CURRENT: RefCell<Option<ActiveContext>> = const { RefCell::new(None) };
}

/// The active transaction together with the innermost open segment of the
/// current flow. New segments become children of that segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveContext {
    transaction: Transaction,
    segment: SegmentId,
}

impl ActiveContext {
    pub(crate) fn new(transaction: Transaction, segment: SegmentId) -> Self {
        Self {
            transaction,
            segment,
        }
    }

    /// Context positioned at the transaction's root segment.
    pub fn for_transaction(transaction: &Transaction) -> Self {
        Self::new(transaction.clone(), SegmentId::ROOT)
    }

    /// Context bound to the current flow, if any.
    pub fn current() -> Option<Self> {
        CURRENT
            .try_with(|current| current.borrow().clone())
            .ok()
            .flatten()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Innermost open segment of this flow.
    pub fn segment(&self) -> Segment {
        self.transaction.segment(self.segment)
    }

    pub(crate) fn segment_id(&self) -> SegmentId {
        self.segment
    }

    /// Binds this context to the current thread until the guard drops.
    pub fn attach(self) -> ContextGuard {
        ContextGuard::enter(Some(self))
    }
}

/// The transaction bound to the current flow, if any.
pub fn active_transaction() -> Option<Transaction> {
    ActiveContext::current().map(|cx| cx.transaction)
}

/// Restores the previously bound context when dropped.
#[must_use = "the context is detached as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<Option<ActiveContext>>,
    // relies on a thread-local, must not cross threads
    _marker: PhantomData<*const ()>,
}

impl ContextGuard {
    fn enter(cx: Option<ActiveContext>) -> Self {
        let previous = CURRENT.try_with(|current| current.replace(cx)).ok();
        Self {
            previous,
            _marker: PhantomData,
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = CURRENT.try_with(|current| current.replace(previous));
        }
    }
}

impl std::fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard").finish_non_exhaustive()
    }
}

/// A future that runs with a fixed context bound on every poll.
///
/// `None` runs the future with no transaction bound at all.
#[pin_project]
#[derive(Debug, Clone)]
pub struct WithActiveContext<F> {
    #[pin]
    inner: F,
    cx: Option<ActiveContext>,
}

impl<F: Future> Future for WithActiveContext<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = ContextGuard::enter(this.cx.clone());
        this.inner.poll(task_cx)
    }
}

/// Extension methods for carrying a transaction across suspension points.
pub trait TransactionFutureExt: Sized {
    /// Runs `self` with `cx` bound.
    fn with_active_context(self, cx: ActiveContext) -> WithActiveContext<Self> {
        WithActiveContext {
            inner: self,
            cx: Some(cx),
        }
    }

    /// Runs `self` with `transaction` bound at its root segment.
    fn with_transaction(self, transaction: &Transaction) -> WithActiveContext<Self> {
        self.with_active_context(ActiveContext::for_transaction(transaction))
    }

    /// Captures the caller's binding, typically before `tokio::spawn`.
    fn in_current_transaction(self) -> WithActiveContext<Self> {
        WithActiveContext {
            inner: self,
            cx: ActiveContext::current(),
        }
    }

    /// Runs `self` with no transaction bound.
    fn without_transaction(self) -> WithActiveContext<Self> {
        WithActiveContext {
            inner: self,
            cx: None,
        }
    }
}

impl<F: Future> TransactionFutureExt for F {}

/// Runs `f` inside a new transaction named [`ROOT_SEGMENT_NAME`].
///
/// See [`run_in_named_transaction`].
pub async fn run_in_transaction<F, Fut>(f: F) -> Fut::Output
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future,
{
    run_in_named_transaction(ROOT_SEGMENT_NAME, f).await
}

/// Creates a transaction, hands it to `f`, and runs the returned future
/// with the transaction bound for its whole extent.
///
/// The caller's previous binding is back in place as soon as this returns,
/// whether `f`'s future succeeded, failed, or panicked. The transaction is
/// not ended automatically; call [`Transaction::end`] when the work is done.
pub async fn run_in_named_transaction<F, Fut>(name: impl Into<String>, f: F) -> Fut::Output
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future,
{
    let transaction = Transaction::new(name);
    let cx = ActiveContext::for_transaction(&transaction);

    let future = {
        let _guard = cx.clone().attach();
        f(transaction)
    };

    future.with_active_context(cx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_context_by_default() {
        assert!(ActiveContext::current().is_none());
        assert!(active_transaction().is_none());
    }

    #[test]
    fn test_attach_and_restore() {
        let outer = Transaction::new("outer");
        let inner = Transaction::new("inner");

        {
            let _outer_guard = ActiveContext::for_transaction(&outer).attach();
            assert_eq!(active_transaction(), Some(outer.clone()));

            {
                let _inner_guard = ActiveContext::for_transaction(&inner).attach();
                assert_eq!(active_transaction(), Some(inner.clone()));
            }

            assert_eq!(active_transaction(), Some(outer.clone()));
        }

        assert!(active_transaction().is_none());
    }

    #[tokio::test]
    async fn test_run_in_transaction_binds_across_await() {
        let seen = run_in_transaction(|transaction| async move {
            tokio::task::yield_now().await;
            let current = active_transaction();
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            (current == Some(transaction.clone()), active_transaction() == Some(transaction))
        })
        .await;

        assert_eq!(seen, (true, true));
        assert!(active_transaction().is_none());
    }

    #[tokio::test]
    async fn test_run_in_transaction_restores_previous() {
        let outer = Transaction::new("outer");
        let expected = outer.clone();

        async move {
            run_in_transaction(|inner| async move {
                assert_ne!(active_transaction(), Some(expected));
                assert_eq!(active_transaction(), Some(inner));
            })
            .await;

            assert_eq!(
                active_transaction().map(|t| t.name().to_string()),
                Some("outer".to_string())
            );
        }
        .with_transaction(&outer)
        .await;

        assert!(active_transaction().is_none());
    }

    #[tokio::test]
    async fn test_run_in_transaction_restores_after_error() {
        let result: Result<(), &str> = run_in_transaction(|_| async { Err("boom") }).await;

        assert_eq!(result, Err("boom"));
        assert!(active_transaction().is_none());
    }

    #[tokio::test]
    async fn test_without_transaction_clears_binding() {
        let transaction = Transaction::new("t");

        let seen = async { async { active_transaction() }.without_transaction().await }
            .with_transaction(&transaction)
            .await;

        assert!(seen.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_task_inherits_binding() {
        let (spawned, transaction) = run_in_transaction(|transaction| async move {
            let handle = tokio::spawn(async { active_transaction() }.in_current_transaction());
            (handle.await.unwrap(), transaction)
        })
        .await;

        assert_eq!(spawned, Some(transaction));
    }

    #[tokio::test]
    async fn test_interleaved_flows_do_not_cross() {
        let (a, b) = tokio::join!(
            run_in_named_transaction("a", |t| async move {
                for _ in 0..5 {
                    tokio::task::yield_now().await;
                    assert_eq!(active_transaction(), Some(t.clone()));
                }
                t
            }),
            run_in_named_transaction("b", |t| async move {
                for _ in 0..5 {
                    tokio::task::yield_now().await;
                    assert_eq!(active_transaction(), Some(t.clone()));
                }
                t
            }),
        );

        assert_ne!(a, b);
    }

    #[test]
    fn test_segment_context_points_at_segment() {
        let transaction = Transaction::new("t");
        let child = transaction.root().context();

        assert_eq!(child.segment(), transaction.root());
        assert_eq!(child.transaction(), &transaction);
    }
}
