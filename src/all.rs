//! Joins promises, fulfilling only when every one of them fulfills.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{Consumer, Producer};
use crate::Promise;

struct Job<T> {
    slots: Vec<Option<T>>,
    pending: usize,
}

/// Returns a promise fulfilled with the values of `promises`, in the order
/// they were given, once all of them have fulfilled.
///
/// The first rejection observed rejects the result with that same reason;
/// whatever the other inputs do afterwards is ignored. An empty input
/// fulfills right away with an empty `Vec`.
///
/// # Examples
///
/// ```
/// use settle_out::{all, cell::Consumer};
/// use futures::executor::block_on;
///
/// let ok = all([
///     Consumer::<_, &str>::fulfilled(1),
///     Consumer::fulfilled(2),
///     Consumer::fulfilled(3),
/// ]);
/// assert_eq!(*block_on(ok), Ok(vec![1, 2, 3]));
///
/// let failed = all([
///     Consumer::fulfilled(1),
///     Consumer::rejected("x"),
///     Consumer::fulfilled(3),
/// ]);
/// assert_eq!(*block_on(failed), Err("x"));
/// ```
pub fn all<T, E, I>(promises: I) -> Consumer<Vec<T>, E>
where
    I: IntoIterator<Item = Consumer<T, E>>,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let promises: Vec<_> = promises.into_iter().collect();
    let (producer, consumer) = Producer::new();
    if promises.is_empty() {
        producer.fulfill(Vec::new());
        return consumer;
    }

    let job = Arc::new(Mutex::new(Job {
        slots: vec![None; promises.len()],
        pending: promises.len(),
    }));
    for (index, promise) in promises.into_iter().enumerate() {
        let producer = producer.clone();
        let job = job.clone();
        promise.subscribe(move |outcome| match outcome {
            Ok(value) => {
                let values = {
                    let mut job = job.lock();
                    job.slots[index] = Some(value.clone());
                    job.pending -= 1;
                    if job.pending > 0 {
                        return;
                    }
                    job.slots.drain(..).flatten().collect()
                };
                producer.fulfill(values);
            }
            Err(err) => {
                producer.reject(err.clone());
            }
        });
    }
    consumer
}
