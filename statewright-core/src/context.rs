//! Cancellation contexts.
//!
//! A [`Context`] carries a cancellation signal and a chain of key/value pairs.
//! Every transition attempt derives its own child context with
//! [`Context::with_cancel`], so canceling the caller's context reaches the
//! callbacks of the attempt while canceling the attempt leaves the caller alone.
//!
//! Deferred transitions outlive the call that started them. For those the
//! engine first detaches the context with [`Context::without_cancel`], which
//! keeps the values but never reports cancellation, and then derives a fresh
//! cancellable child from it.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Reason a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
}

/// Cancellation scope with inherited values.
///
/// Cloning is cheap and clones observe the same cancellation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// `None` for contexts that can never be canceled.
    token: Option<CancellationToken>,
    values: Option<Arc<ValueNode>>,
}

#[derive(Debug)]
struct ValueNode {
    key: String,
    value: Value,
    parent: Option<Arc<ValueNode>>,
}

impl Context {
    /// Returns an empty context that is never canceled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a child that is canceled with this context or through the
    /// returned handle, whichever comes first.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let token = match &self.token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let child = Context {
            token: Some(token.clone()),
            values: self.values.clone(),
        };
        (child, CancelHandle { token })
    }

    /// Returns a view with the same values that ignores this context's
    /// cancellation.
    pub fn without_cancel(&self) -> Context {
        Context {
            token: None,
            values: self.values.clone(),
        }
    }

    /// Returns a child carrying an extra key/value pair.
    ///
    /// The child shares this context's cancellation. A later value for the
    /// same key shadows earlier ones.
    pub fn with_value(&self, key: impl Into<String>, value: impl Into<Value>) -> Context {
        Context {
            token: self.token.clone(),
            values: Some(Arc::new(ValueNode {
                key: key.into(),
                value: value.into(),
                parent: self.values.clone(),
            })),
        }
    }

    /// Looks up a value, walking from the newest pair to the oldest.
    pub fn value(&self, key: &str) -> Option<&Value> {
        let mut node = self.values.as_deref();
        while let Some(n) = node {
            if n.key == key {
                return Some(&n.value);
            }
            node = n.parent.as_deref();
        }
        None
    }

    /// Returns true once the context has been canceled.
    pub fn is_done(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Returns why the context is done, or `None` while it is live.
    pub fn err(&self) -> Option<ContextError> {
        self.is_done().then_some(ContextError::Canceled)
    }

    /// Resolves when the context is canceled.
    ///
    /// Never resolves for a context that cannot be canceled.
    pub async fn done(&self) {
        match &self.token {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Blocks the current thread until the context is canceled.
    pub fn wait(&self) {
        futures::executor::block_on(self.done());
    }
}

/// Cancels the context it was created with and every context derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns a guard that cancels when dropped.
    pub fn drop_guard(self) -> DropGuard {
        self.token.drop_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_background_is_never_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert_eq!(ctx.err(), None);
    }

    #[test]
    fn test_cancel_child() {
        let parent = Context::background().with_value("key1", "value1");
        let (ctx, cancel) = parent.with_cancel();
        assert!(!ctx.is_done());

        cancel.cancel();
        assert!(ctx.is_done());
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
        assert!(cancel.is_canceled());
        assert!(!parent.is_done());
        assert_eq!(ctx.value("key1"), Some(&Value::from("value1")));
    }

    #[test]
    fn test_parent_cancel_reaches_child() {
        let (parent, cancel) = Context::background().with_cancel();
        let (child, _child_cancel) = parent.with_cancel();
        let grandchild = child.with_value("k", 1);

        cancel.cancel();
        assert!(child.is_done());
        assert!(grandchild.is_done());
    }

    #[test]
    fn test_without_cancel_ignores_canceled_parent() {
        let (ctx, cancel) = Context::background()
            .with_value("key1", "value1")
            .with_cancel();
        cancel.cancel();
        assert!(ctx.is_done());

        let detached = ctx.without_cancel();
        assert!(!detached.is_done());
        assert_eq!(detached.err(), None);
        assert_eq!(detached.value("key1"), Some(&Value::from("value1")));

        let (child, child_cancel) = detached.with_cancel();
        assert!(!child.is_done());
        assert_eq!(child.value("key1"), Some(&Value::from("value1")));

        child_cancel.cancel();
        assert!(child.is_done());
        assert_eq!(child.err(), Some(ContextError::Canceled));
    }

    #[test]
    fn test_detached_child_does_not_cancel_parent() {
        let (parent, _cancel) = Context::background().with_cancel();
        let (child, child_cancel) = parent.without_cancel().with_cancel();

        child_cancel.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[test]
    fn test_later_value_shadows_earlier() {
        let ctx = Context::background()
            .with_value("k", "old")
            .with_value("other", true)
            .with_value("k", "new");
        assert_eq!(ctx.value("k"), Some(&Value::from("new")));
        assert_eq!(ctx.value("other"), Some(&Value::Bool(true)));
        assert_eq!(ctx.value("missing"), None);
    }

    #[test]
    fn test_drop_guard_cancels() {
        let (ctx, cancel) = Context::background().with_cancel();
        {
            let _guard = cancel.drop_guard();
            assert!(!ctx.is_done());
        }
        assert!(ctx.is_done());
    }

    #[test]
    fn test_wait_unblocks_on_cancel() {
        let (ctx, cancel) = Context::background().with_cancel();
        let (tx, rx) = mpsc::channel();

        let waiter = thread::spawn(move || {
            ctx.wait();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
        cancel.cancel();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[tokio::test]
    async fn test_done_resolves_on_cancel() {
        let (ctx, cancel) = Context::background().with_cancel();
        let task = tokio::spawn(async move { ctx.done().await });
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
