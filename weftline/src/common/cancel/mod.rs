use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
};

use futures_channel::oneshot;

struct CancelHandler {
    cancelled: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

#[derive(Clone)]
pub struct Canceller {
    handler: Rc<RefCell<CancelHandler>>,
}

impl Default for Canceller {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Canceller {
    pub fn new() -> Self {
        Self { handler: Rc::new(RefCell::new(CancelHandler { cancelled: false, waiters: Vec::new() })) }
    }

    pub fn waiter(&self) -> Waiter {
        new_waiter(Rc::downgrade(&self.handler))
    }

    pub fn cancel(&self) {
        let mut handler = self.handler.borrow_mut();
        if !handler.cancelled {
            handler.cancelled = true;
            for sender in handler.waiters.drain(..) {
                let _ = sender.send(());
            }
        }
    }

    pub const fn dropper(self) -> CancellerDropper {
        CancellerDropper(self)
    }
}

pub struct CancellerDropper(Canceller);

impl Drop for CancellerDropper {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Creates a fresh `Waiter` watching `handler`, firing it immediately if
/// cancellation has already happened (or the `Canceller` is already gone).
/// Compacts dropped-without-cancelling waiters out of `handler.waiters`
/// first, so a long-running server whose connections come and go doesn't
/// grow that list without bound.
fn new_waiter(handler: Weak<RefCell<CancelHandler>>) -> Waiter {
    let (tx, rx) = oneshot::channel();
    if let Some(h) = handler.upgrade() {
        let mut h = h.borrow_mut();
        if h.cancelled {
            let _ = tx.send(());
        } else {
            h.waiters.retain(|s| !s.is_canceled());
            h.waiters.push(tx);
        }
    } else {
        let _ = tx.send(());
    }
    Waiter { receiver: rx, handler }
}

/// A cheap, clonable observer of a [`Canceller`]'s cancellation: `cancelled()`
/// polls a flag directly for call sites that only want a non-blocking check
/// (the accept loops, between requests on a connection), and `Waiter` itself
/// is a `Future` that resolves once cancellation fires, for call sites that
/// want to race it against I/O with `monoio::select!`.
pub struct Waiter {
    receiver: oneshot::Receiver<()>,
    handler: Weak<RefCell<CancelHandler>>,
}

impl Clone for Waiter {
    fn clone(&self) -> Self {
        new_waiter(self.handler.clone())
    }
}

impl Waiter {
    pub fn cancelled(&self) -> bool {
        self.handler.upgrade().map_or(true, |handler| handler.borrow().cancelled)
    }
}

impl Future for Waiter {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[monoio::test]
    async fn cancelled_flag_flips_for_every_clone() {
        let canceller = Canceller::new();
        let a = canceller.waiter();
        let b = a.clone();
        assert!(!a.cancelled());
        assert!(!b.cancelled());
        canceller.cancel();
        assert!(a.cancelled());
        assert!(b.cancelled());
    }

    #[monoio::test]
    async fn waiter_future_resolves_on_cancel() {
        let canceller = Canceller::new();
        let waiter = canceller.waiter();
        canceller.cancel();
        waiter.await;
    }

    #[monoio::test]
    async fn waiter_created_after_cancel_resolves_immediately() {
        let canceller = Canceller::new();
        canceller.cancel();
        let waiter = canceller.waiter();
        assert!(waiter.cancelled());
        waiter.await;
    }

    #[monoio::test]
    async fn dropper_cancels_on_drop() {
        let canceller = Canceller::new();
        let waiter = canceller.waiter();
        {
            let _dropper = canceller.clone().dropper();
        }
        assert!(waiter.cancelled());
    }
}
