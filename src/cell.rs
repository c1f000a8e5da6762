//! The settle-once cell every promise in this crate is built on.
//!
//! A cell is created pending and settles at most once, either fulfilled
//! (`Ok`) or rejected (`Err`). The [`Producer`] holds the capability to
//! settle it; [`Consumer`]s observe it.
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::mem;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::Promise;

type Subscriber<T, E> = Box<dyn FnOnce(&Result<T, E>) + Send + 'static>;

/// This `Producer` settles the cell. It may be cloned; every clone is the
/// same capability and the first settlement through any of them wins.
///
/// # Examples
///
/// ```
/// use settle_out::{Promise, cell::Producer};
/// use futures::executor::block_on;
/// use std::thread;
/// let (promise, consumer) = Producer::<String, String>::new();
/// let consumer2 = consumer.clone();
/// let task1 = thread::spawn(move || block_on(async {
///     assert_eq!(*consumer.await, Ok("Hi".to_string()));
/// }));
/// let task2 = thread::spawn(move || block_on(async {
///     assert_eq!(*consumer2.await, Ok("Hi".to_string()));
/// }));
/// promise.fulfill("Hi".into());
/// promise.reject("too late".into());
/// task1.join().expect("The task1 thread has panicked.");
/// task2.join().expect("The task2 thread has panicked.");
/// ```
pub struct Producer<T, E> {
    promise: Arc<Mutex<Inner<T, E>>>,
}

/// The read side of a cell. It can subscribe to the outcome or be awaited,
/// but never settle it.
///
/// Each handle, clones included, keeps at most one waker in the cell: the
/// one from the task that polled it last.
pub struct Consumer<T, E> {
    promise: Arc<Mutex<Inner<T, E>>>,
    id: usize,
}

struct Inner<T, E> {
    state: State<T, E>,
    next_consumer: usize,
}

enum State<T, E> {
    Pending {
        subscribers: Vec<Subscriber<T, E>>,
        /// Keyed by consumer id.
        wakers: Vec<(usize, Waker)>,
    },
    Settled(Arc<Result<T, E>>),
}

/// Creates a pending cell.
pub fn new<T, E>() -> (Producer<T, E>, Consumer<T, E>) {
    let promise = Arc::new(Mutex::new(Inner {
        state: State::Pending {
            subscribers: Vec::new(),
            wakers: Vec::new(),
        },
        next_consumer: 1,
    }));
    (
        Producer {
            promise: promise.clone(),
        },
        Consumer { promise, id: 0 },
    )
}

impl<T, E> Producer<T, E> {
    /// Settles the cell with `outcome`. Returns `true` if this call settled
    /// it and `false` if it had already settled.
    ///
    /// Tasks awaiting the cell are woken first. Subscribers then run on the
    /// calling thread, in the order they subscribed, after the lock has been
    /// released. A panicking subscriber does not stop the ones after it; the
    /// first panic is resumed once every subscriber has run.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        let outcome = Arc::new(outcome);
        let (subscribers, wakers) = {
            let mut promise = self.promise.lock();
            let previous = mem::replace(&mut promise.state, State::Settled(outcome.clone()));
            match previous {
                State::Pending {
                    subscribers,
                    wakers,
                } => (subscribers, wakers),
                settled => {
                    // First settlement wins, put it back.
                    promise.state = settled;
                    tracing::trace!(
                        rejected = outcome.is_err(),
                        "settlement ignored, cell already settled"
                    );
                    return false;
                }
            }
        };
        for (_, waker) in wakers {
            waker.wake();
        }
        let mut first_panic = None;
        for (index, subscriber) in subscribers.into_iter().enumerate() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| subscriber(&outcome))) {
                tracing::warn!(subscriber = index, "subscriber panicked during settlement");
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }
        if let Some(payload) = first_panic {
            resume_unwind(payload);
        }
        true
    }

    /// Whether the cell has settled, through this producer or another clone.
    pub fn is_settled(&self) -> bool {
        matches!(self.promise.lock().state, State::Settled(_))
    }
}

impl<T, E> Promise for Producer<T, E> {
    type Output = T;
    type Error = E;
    type Waiter = Consumer<T, E>;

    fn new() -> (Self, Self::Waiter) {
        new()
    }

    fn fulfill(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    fn reject(&self, err: E) -> bool {
        self.settle(Err(err))
    }
}

impl<T, E> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Debug for Producer<T, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T, E> Consumer<T, E> {
    /// A consumer whose cell is already fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// A consumer whose cell is already rejected with `err`.
    pub fn rejected(err: E) -> Self {
        Self::settled(Err(err))
    }

    fn settled(outcome: Result<T, E>) -> Self {
        Consumer {
            promise: Arc::new(Mutex::new(Inner {
                state: State::Settled(Arc::new(outcome)),
                next_consumer: 1,
            })),
            id: 0,
        }
    }

    /// Registers `on_settled` to run exactly once with the outcome.
    ///
    /// If the cell is still pending the callback is queued behind every
    /// earlier subscriber. If it has settled the callback runs right away on
    /// the calling thread.
    pub fn subscribe<F>(&self, on_settled: F)
    where
        F: FnOnce(&Result<T, E>) + Send + 'static,
    {
        let outcome = {
            let mut promise = self.promise.lock();
            match promise.state {
                State::Pending {
                    ref mut subscribers,
                    ..
                } => {
                    subscribers.push(Box::new(on_settled));
                    return;
                }
                State::Settled(ref outcome) => outcome.clone(),
            }
        };
        on_settled(&outcome);
    }

    /// The outcome, if the cell has settled. Never blocks.
    pub fn try_get(&self) -> Option<Arc<Result<T, E>>> {
        match self.promise.lock().state {
            State::Settled(ref outcome) => Some(outcome.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Whether the cell has settled. Never blocks.
    pub fn is_settled(&self) -> bool {
        self.try_get().is_some()
    }
}

impl<T, E> Clone for Consumer<T, E> {
    fn clone(&self) -> Self {
        let id = {
            let mut promise = self.promise.lock();
            let id = promise.next_consumer;
            promise.next_consumer += 1;
            id
        };
        Self {
            promise: self.promise.clone(),
            id,
        }
    }
}

impl<T, E> Drop for Consumer<T, E> {
    /// A pending cell forgets the waker this handle registered.
    fn drop(&mut self) {
        let mut promise = self.promise.lock();
        if let State::Pending { ref mut wakers, .. } = promise.state {
            wakers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl<T, E> Debug for Consumer<T, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T, E> Future for Consumer<T, E> {
    type Output = Arc<Result<T, E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut promise = self.promise.lock();
        match promise.state {
            State::Settled(ref outcome) => Poll::Ready(outcome.clone()),
            State::Pending { ref mut wakers, .. } => {
                let id = self.id;
                match wakers.iter().position(|(owner, _)| *owner == id) {
                    Some(index) => {
                        let waker = &mut wakers[index].1;
                        if !waker.will_wake(cx.waker()) {
                            *waker = cx.waker().clone();
                        }
                    }
                    None => wakers.push((id, cx.waker().clone())),
                }
                Poll::Pending
            }
        }
    }
}
