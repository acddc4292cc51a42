//! Calls into slow collaborators bounded by a wall-clock budget.
//!
//! A [`DeadlineWorker`] owns a dedicated thread that runs one job at a time.
//! The caller waits at most the budget for the reply. A job that overruns
//! keeps running on the worker, and calls made while it is still in flight
//! return [`CallError::Busy`] without queueing behind it.

use std::fmt;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    /// An earlier call is still running.
    #[error("worker busy with an overrunning call")]
    Busy,
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("worker thread stopped")]
    Stopped,
}

pub struct DeadlineWorker<I, O> {
    jobs: Sender<(u64, I)>,
    replies: Receiver<(u64, O)>,
    next: u64,
    in_flight: Option<u64>,
}

impl<I, O> fmt::Debug for DeadlineWorker<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlineWorker")
            .field("next", &self.next)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl<I: Send + 'static, O: Send + 'static> DeadlineWorker<I, O> {
    /// Start the worker thread. It exits once the worker is dropped.
    pub fn spawn<F>(name: &str, mut job: F) -> io::Result<Self>
    where
        F: FnMut(I) -> O + Send + 'static,
    {
        let (jobs, job_rx) = mpsc::channel::<(u64, I)>();
        let (reply_tx, replies) = mpsc::channel();
        let _detached = thread::Builder::new().name(name.to_string()).spawn(move || {
            for (id, input) in job_rx {
                if reply_tx.send((id, job(input))).is_err() {
                    break;
                }
            }
        })?;
        Ok(Self {
            jobs,
            replies,
            next: 0,
            in_flight: None,
        })
    }

    pub fn is_busy(&mut self) -> bool {
        self.settle().is_err()
    }

    /// Discard the late reply of an overrun call if it has arrived.
    fn settle(&mut self) -> Result<(), CallError> {
        let Some(pending) = self.in_flight else {
            return Ok(());
        };
        loop {
            match self.replies.try_recv() {
                Ok((id, _)) if id == pending => {
                    self.in_flight = None;
                    return Ok(());
                }
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return Err(CallError::Busy),
                Err(TryRecvError::Disconnected) => return Err(CallError::Stopped),
            }
        }
    }

    /// Run `input` on the worker and wait at most `budget` for the result.
    pub fn call(&mut self, input: I, budget: Duration) -> Result<O, CallError> {
        self.settle()?;
        let id = self.next;
        self.next += 1;
        self.jobs.send((id, input)).map_err(|_| CallError::Stopped)?;
        let started = Instant::now();
        match self.replies.recv_timeout(budget) {
            Ok((_, out)) => Ok(out),
            Err(RecvTimeoutError::Timeout) => {
                self.in_flight = Some(id);
                Err(CallError::Timeout(started.elapsed()))
            }
            Err(RecvTimeoutError::Disconnected) => Err(CallError::Stopped),
        }
    }
}
