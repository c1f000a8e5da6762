//! Settles with whichever promise settles first.
use crate::cell::{Consumer, Producer};
use crate::Promise;

/// Returns a promise that takes the outcome, value or reason, of the first
/// of `promises` to settle.
///
/// Every input stays subscribed; settlements after the first are absorbed.
/// With no inputs nothing can ever settle the result, so it stays pending
/// forever.
///
/// # Examples
///
/// ```
/// use settle_out::{race, cell::{self, Consumer}};
/// use futures::executor::block_on;
///
/// let (_never, never_out) = cell::new::<&str, ()>();
/// let first = race([never_out, Consumer::fulfilled("fast")]);
/// assert_eq!(*block_on(first), Ok("fast"));
/// ```
pub fn race<T, E, I>(promises: I) -> Consumer<T, E>
where
    I: IntoIterator<Item = Consumer<T, E>>,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let (producer, consumer) = Producer::new();
    for promise in promises {
        let producer = producer.clone();
        promise.subscribe(move |outcome| {
            producer.settle(outcome.clone());
        });
    }
    consumer
}
