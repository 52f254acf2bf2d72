// Host semaphore - CPU-side submission ordering
//
// Binary device semaphores require the signalling submission to reach the
// driver before the waiting one. Jobs are recorded on independent worker
// threads, so a producer/consumer pair is handshaked on the host: the
// consumer blocks right before its queue submit until the producer has
// submitted.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderingError {
    #[error("host semaphore `{name}` signaled again before signal #{signals} was consumed")]
    Unconsumed { name: String, signals: u64 },
}

/// Signal/wait counters of an ordering primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderingStats {
    pub signals: u64,
    pub waits: u64,
}

/// Cross-thread submission ordering between one producer and one consumer.
///
/// `HostSemaphore` is the portable implementation. A device with counting
/// (timeline) semaphores can provide an implementation whose `wait` returns
/// immediately.
pub trait SubmissionOrdering: Send + Sync + fmt::Debug {
    /// Called by the producer after its submission reached the queue.
    fn signal(&self) -> Result<(), OrderingError>;
    /// Called by the consumer before it submits. Blocks until signaled and
    /// consumes the signal.
    fn wait(&self);
    fn stats(&self) -> OrderingStats;
}

#[derive(Debug, Default)]
struct State {
    signaled: bool,
    stats: OrderingStats,
}

/// Flag + condition variable with single-consumer-per-signal semantics.
pub struct HostSemaphore {
    name: String,
    state: Mutex<State>,
    cv: Condvar,
}

impl HostSemaphore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
            cv: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }
}

impl SubmissionOrdering for HostSemaphore {
    fn signal(&self) -> Result<(), OrderingError> {
        {
            let mut state = self.state.lock();
            if state.signaled {
                return Err(OrderingError::Unconsumed {
                    name: self.name.clone(),
                    signals: state.stats.signals,
                });
            }
            state.signaled = true;
            state.stats.signals += 1;
        }
        self.cv.notify_all();
        Ok(())
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        while !state.signaled {
            self.cv.wait(&mut state);
        }
        state.signaled = false;
        state.stats.waits += 1;
    }

    fn stats(&self) -> OrderingStats {
        self.state.lock().stats
    }
}

impl fmt::Debug for HostSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HostSemaphore")
            .field("name", &self.name)
            .field("signaled", &state.signaled)
            .field("signals", &state.stats.signals)
            .field("waits", &state.stats.waits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn signal_then_wait_consumes_the_signal() {
        let semaphore = HostSemaphore::new("a");
        semaphore.signal().unwrap();
        assert!(semaphore.is_signaled());

        semaphore.wait();
        assert!(!semaphore.is_signaled());
        assert_eq!(semaphore.stats(), OrderingStats { signals: 1, waits: 1 });
    }

    #[test]
    fn second_signal_before_wait_is_rejected() {
        let semaphore = HostSemaphore::new("gbuffer[0]");
        semaphore.signal().unwrap();

        let err = semaphore.signal().unwrap_err();
        assert_eq!(
            err,
            OrderingError::Unconsumed {
                name: "gbuffer[0]".to_string(),
                signals: 1
            }
        );
        // The rejected signal is not counted.
        assert_eq!(semaphore.stats().signals, 1);
    }

    #[test]
    fn wait_blocks_until_signaled() {
        let semaphore = Arc::new(HostSemaphore::new("a"));
        let waiter = {
            let semaphore = Arc::clone(&semaphore);
            thread::spawn(move || semaphore.wait())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        semaphore.signal().unwrap();
        waiter.join().unwrap();
        assert_eq!(semaphore.stats().waits, 1);
    }

    #[test]
    fn producer_and_consumer_alternate_in_lock_step() {
        const ROUNDS: u64 = 500;
        // `ack` travels the other way so the producer never runs ahead.
        let forward = Arc::new(HostSemaphore::new("forward"));
        let ack = Arc::new(HostSemaphore::new("ack"));

        let consumer = {
            let forward = Arc::clone(&forward);
            let ack = Arc::clone(&ack);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    forward.wait();
                    ack.signal().unwrap();
                }
            })
        };

        for _ in 0..ROUNDS {
            forward.signal().unwrap();
            ack.wait();
        }
        consumer.join().unwrap();

        assert_eq!(forward.stats(), OrderingStats { signals: ROUNDS, waits: ROUNDS });
        assert_eq!(ack.stats(), OrderingStats { signals: ROUNDS, waits: ROUNDS });
    }
}
