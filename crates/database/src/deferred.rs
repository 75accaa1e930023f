//! Deferred values and cancellable chains.
//!
//! A [`Deferred`] is the handle every operation returns: it resolves or
//! rejects exactly once, and awaiting it drives the work. A [`Chain`]
//! sequences dependent steps so that no step starts before its predecessor
//! resolved, forwarding the first rejection to every later step that did not
//! recover from it.

use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use strata_core::{Error, Result};

/// A value that resolves or rejects once.
#[must_use = "a deferred value does nothing unless awaited"]
pub struct Deferred<T> {
    inner: LocalBoxFuture<'static, Result<T>>,
}

impl<T: 'static> Deferred<T> {
    /// Wraps a future.
    pub fn new(future: impl Future<Output = Result<T>> + 'static) -> Self {
        Self {
            inner: future.boxed_local(),
        }
    }

    /// Wraps a future and polls it once right away, so that whatever it
    /// issues before its first pending await is issued now.
    pub fn eager(future: impl Future<Output = Result<T>> + 'static) -> Self {
        let mut inner = future.boxed_local();
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match inner.poll_unpin(&mut cx) {
            Poll::Ready(Ok(value)) => Self::resolved(value),
            Poll::Ready(Err(error)) => Self::rejected(error),
            Poll::Pending => Self { inner },
        }
    }

    /// A deferred value that is already resolved.
    pub fn resolved(value: T) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// A deferred value that is already rejected.
    pub fn rejected(error: Error) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    /// Runs `f` with the resolved value. A rejection skips `f`.
    pub fn then<U, F, Fut>(self, f: F) -> Deferred<U>
    where
        U: 'static,
        F: FnOnce(T) -> Fut + 'static,
        Fut: Future<Output = Result<U>> + 'static,
    {
        Deferred::new(async move { f(self.await?).await })
    }

    /// Transforms the resolved value.
    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Deferred<U> {
        Deferred::new(async move { self.await.map(f) })
    }

    /// Recovers from a rejection. A resolved value skips `f`.
    pub fn catch(self, f: impl FnOnce(Error) -> Result<T> + 'static) -> Deferred<T> {
        Deferred::new(async move { self.await.or_else(f) })
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

/// Cancellation flag shared by the steps of one chain.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Rc<Cell<bool>>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every step that has not started yet.
    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// A sequence of dependent steps under one cancellation token.
///
/// Cancelling only stops steps that have not started; it never aborts a
/// transaction an earlier step opened.
#[must_use = "a chain does nothing unless awaited"]
pub struct Chain<T> {
    token: CancellationToken,
    value: Deferred<T>,
}

impl Chain<()> {
    /// Starts an empty chain.
    pub fn new(token: CancellationToken) -> Self {
        Self::start(token, Deferred::resolved(()))
    }
}

impl<T: 'static> Chain<T> {
    /// Starts a chain from a first deferred value.
    pub fn start(token: CancellationToken, first: Deferred<T>) -> Self {
        let guard = token.clone();
        Self {
            token,
            value: Deferred::new(async move {
                guard.check()?;
                first.await
            }),
        }
    }

    /// Returns the chain's token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Appends a step that runs once the previous one resolved.
    pub fn then<U, F, Fut>(self, f: F) -> Chain<U>
    where
        U: 'static,
        F: FnOnce(T) -> Fut + 'static,
        Fut: Future<Output = Result<U>> + 'static,
    {
        let guard = self.token.clone();
        let previous = self.value;
        Chain {
            token: self.token,
            value: Deferred::new(async move {
                let value = previous.await?;
                guard.check()?;
                f(value).await
            }),
        }
    }

    /// Appends a recovery step for a rejection of any earlier step.
    pub fn catch(self, f: impl FnOnce(Error) -> Result<T> + 'static) -> Chain<T> {
        Chain {
            token: self.token,
            value: self.value.catch(f),
        }
    }

    /// Returns the chain's final deferred value.
    pub fn into_deferred(self) -> Deferred<T> {
        self.value
    }
}

impl<T> Future for Chain<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        Pin::new(&mut self.value).poll(cx)
    }
}
