//! Settle-once promises for rust.
//!
//! A [`cell::Producer`] settles a promise exactly once; any number of
//! [`cell::Consumer`]s observe it, either through [`cell::Consumer::subscribe`]
//! or by awaiting it. On top of that sit three combinators: [`promisify`],
//! [`all`] and [`race`].
//!
//! ```
//! use settle_out::{all, race, Promise, cell::Producer};
//! use futures::executor::block_on;
//!
//! let (a, a_out) = Producer::<u32, String>::new();
//! let (b, b_out) = Producer::<u32, String>::new();
//! let both = all([a_out.clone(), b_out.clone()]);
//! let first = race([a_out, b_out]);
//! b.fulfill(2);
//! a.fulfill(1);
//! assert_eq!(*block_on(both), Ok(vec![1, 2]));
//! assert_eq!(*block_on(first), Ok(2));
//! ```
pub mod all;
pub mod cell;
pub mod promisify;
pub mod race;

pub use all::all;
pub use promisify::{promisify, Callback};
pub use race::race;

/// Failures produced by the library itself rather than by the operations it
/// wraps.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A promisified operation panicked before it could complete.
    #[error("operation panicked: {0}")]
    Panicked(String),
}

/// The settling side of a promise.
pub trait Promise {
    type Output;
    type Error;
    type Waiter;

    /// Creates a pending promise, returning the settling side and the side
    /// that waits on it.
    fn new() -> (Self, Self::Waiter)
    where
        Self: Sized;

    /// Fulfills the promise. Returns `false` if it had already settled, in
    /// which case nothing changes.
    fn fulfill(&self, value: Self::Output) -> bool;

    /// Rejects the promise. Returns `false` if it had already settled, in
    /// which case nothing changes.
    fn reject(&self, err: Self::Error) -> bool;
}
