//! Adapts callback-style operations into promise-returning ones.
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::cell::{Consumer, Producer};
use crate::{Error, Promise};

/// The completion handle handed to a promisified operation as its last
/// argument.
///
/// Only the first completion settles the promise; later ones are ignored.
pub struct Callback<T, E> {
    producer: Producer<T, E>,
}

impl<T, E> Callback<T, E> {
    /// Completes the operation: `Err` reports failure, `Ok` the result.
    pub fn call(&self, result: Result<T, E>) {
        self.producer.settle(result);
    }

    /// Completes the operation successfully with `value`.
    pub fn done(&self, value: T) {
        self.producer.fulfill(value);
    }

    /// Completes the operation with the failure `err`.
    pub fn fail(&self, err: E) {
        self.producer.reject(err);
    }
}

impl<T, E> Clone for Callback<T, E> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T, E> Debug for Callback<T, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("producer", &self.producer)
            .finish()
    }
}

/// Wraps `op`, which takes its arguments `A` plus a [`Callback`], into a
/// function that takes only `A` and returns a promise.
///
/// The promise is returned as soon as `op` returns, whether or not the
/// callback has run yet. `op` failing synchronously never reaches the
/// caller: an `Err` return rejects the promise with that error, and a panic
/// rejects it with [`Error::Panicked`] converted into `E`.
///
/// # Examples
///
/// ```
/// use settle_out::{promisify, Callback, Error};
/// use futures::executor::block_on;
/// use std::thread;
///
/// #[derive(Debug, PartialEq)]
/// enum ReadError {
///     Missing(String),
///     Crashed(Error),
/// }
///
/// impl From<Error> for ReadError {
///     fn from(err: Error) -> Self {
///         ReadError::Crashed(err)
///     }
/// }
///
/// let read = promisify(|(path, len): (String, usize), cb: Callback<String, ReadError>| {
///     thread::spawn(move || {
///         if path == "/etc/motd" {
///             cb.done("hello".chars().take(len).collect())
///         } else {
///             cb.fail(ReadError::Missing(path))
///         }
///     });
///     Ok(())
/// });
/// assert_eq!(*block_on(read(("/etc/motd".into(), 4))), Ok("hell".to_string()));
/// assert_eq!(
///     *block_on(read(("/nope".into(), 4))),
///     Err(ReadError::Missing("/nope".into()))
/// );
/// ```
pub fn promisify<A, T, E, F>(op: F) -> impl Fn(A) -> Consumer<T, E>
where
    F: Fn(A, Callback<T, E>) -> Result<(), E>,
    E: From<Error>,
{
    move |args| {
        let (producer, consumer) = Producer::new();
        let callback = Callback {
            producer: producer.clone(),
        };
        match catch_unwind(AssertUnwindSafe(|| op(args, callback))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(
                    settled = producer.is_settled(),
                    "operation failed synchronously"
                );
                producer.reject(err);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::debug!(
                    settled = producer.is_settled(),
                    panic = %message,
                    "operation panicked"
                );
                producer.reject(Error::Panicked(message).into());
            }
        }
        consumer
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{promisify, Callback};
    use crate::Error;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Upstream(&'static str),
        Lib(Error),
    }

    impl From<Error> for TestError {
        fn from(err: Error) -> Self {
            TestError::Lib(err)
        }
    }

    #[test]
    fn test_returns_before_callback_runs() {
        let slow = promisify(|value: u32, cb: Callback<u32, TestError>| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                cb.done(value * 2);
            });
            Ok(())
        });
        let promise = slow(21);
        assert!(!promise.is_settled());
        assert_eq!(*block_on(promise), Ok(42));
    }

    #[test]
    fn test_upstream_error_rejects() {
        let failing = promisify(|(): (), cb: Callback<u32, TestError>| {
            cb.call(Err(TestError::Upstream("ENOENT")));
            Ok(())
        });
        assert_eq!(*block_on(failing(())), Err(TestError::Upstream("ENOENT")));
    }

    #[test]
    fn test_callback_twice_settles_once() {
        let seen = Arc::new(AtomicUsize::new(0));
        let twice = promisify(|(a, b): (u32, u32), cb: Callback<u32, TestError>| {
            cb.done(a);
            cb.done(b);
            cb.fail(TestError::Upstream("late"));
            Ok(())
        });
        let promise = twice((1, 2));
        let seen2 = seen.clone();
        promise.subscribe(move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(*block_on(promise), Ok(1));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sync_error_rejects_instead_of_returning() {
        let refusing = promisify(|(): (), _cb: Callback<u32, TestError>| {
            Err(TestError::Upstream("bad arguments"))
        });
        assert_eq!(
            *block_on(refusing(())),
            Err(TestError::Upstream("bad arguments"))
        );
    }

    #[test]
    fn test_panic_rejects_instead_of_unwinding() {
        let exploding = promisify(
            |(): (), _cb: Callback<u32, TestError>| -> Result<(), TestError> { panic!("kaboom") },
        );
        let promise = exploding(());
        assert_eq!(
            *block_on(promise),
            Err(TestError::Lib(Error::Panicked("kaboom".into())))
        );
    }

    #[test]
    fn test_panic_after_callback_keeps_first_outcome() {
        let sloppy = promisify(
            |(): (), cb: Callback<u32, TestError>| -> Result<(), TestError> {
                cb.done(5);
                panic!("cleanup failed: {}", 17)
            },
        );
        assert_eq!(*block_on(sloppy(())), Ok(5));
    }

    #[test]
    fn test_wrapper_is_reusable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let counted = promisify(move |n: usize, cb: Callback<usize, TestError>| {
            calls2.fetch_add(1, Ordering::SeqCst);
            cb.done(n + 1);
            Ok(())
        });
        let outcomes: Vec<_> = (0..3).map(|n| (*block_on(counted(n))).clone()).collect();
        assert_eq!(outcomes, vec![Ok(1), Ok(2), Ok(3)]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
