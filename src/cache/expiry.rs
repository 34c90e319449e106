//! One-shot expiry of cached jobs.
//!
//! A single worker thread owns a min-heap of `(deadline, job id)` pairs and
//! sleeps until the earliest deadline or the next command.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

enum Command {
    Schedule(Instant, String),
    Shutdown,
}

/// Schedules a callback per job id after an idle window.
///
/// The callback runs on the worker thread and must tolerate jobs that were
/// already removed. Dropping the scheduler stops the worker; pending expiries
/// are discarded.
pub struct ExpiryScheduler {
    sender: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl ExpiryScheduler {
    /// Start the worker thread.
    pub fn start<F>(on_expire: F) -> io::Result<Self>
    where
        F: Fn(&str) + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name("pdfjson-cache-expiry".to_string())
            .spawn(move || run(receiver, on_expire))?;
        Ok(Self {
            sender,
            worker: Some(worker),
        })
    }

    /// Expire `job_id` once `after` has elapsed. Never blocks. A delay too
    /// large to form a deadline means the job never expires.
    pub fn schedule(&self, job_id: &str, after: Duration) {
        let Some(deadline) = Instant::now().checked_add(after) else {
            log::debug!("Expiry delay for job {} is unbounded; not scheduling", job_id);
            return;
        };
        if self
            .sender
            .send(Command::Schedule(deadline, job_id.to_string()))
            .is_err()
        {
            log::warn!("Expiry worker stopped; job {} will not expire", job_id);
        }
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Expiry worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for ExpiryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryScheduler")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

fn run<F: Fn(&str)>(receiver: Receiver<Command>, on_expire: F) {
    let mut pending: BinaryHeap<Reverse<(Instant, u64, String)>> = BinaryHeap::new();
    let mut sequence = 0u64;

    loop {
        let now = Instant::now();
        while let Some(Reverse((deadline, _, _))) = pending.peek() {
            if *deadline > now {
                break;
            }
            if let Some(Reverse((_, _, job_id))) = pending.pop() {
                log::debug!("Cache entry for job {} expired", job_id);
                on_expire(&job_id);
            }
        }

        let command = match pending.peek() {
            Some(Reverse((deadline, _, _))) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match receiver.recv() {
                Ok(command) => command,
                Err(_) => return,
            },
        };

        match command {
            Command::Schedule(deadline, job_id) => {
                sequence += 1;
                pending.push(Reverse((deadline, sequence, job_id)));
            }
            Command::Shutdown => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_expires_in_deadline_order() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let scheduler = ExpiryScheduler::start(move |job| sink.lock().unwrap().push(job.to_string())).unwrap();

        scheduler.schedule("late", Duration::from_millis(80));
        scheduler.schedule("early", Duration::from_millis(10));

        let deadline = Instant::now() + Duration::from_secs(5);
        while fired.lock().unwrap().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*fired.lock().unwrap(), vec!["early".to_string(), "late".to_string()]);
    }

    #[test]
    fn test_unbounded_delay_never_fires() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let scheduler = ExpiryScheduler::start(move |job| sink.lock().unwrap().push(job.to_string())).unwrap();

        scheduler.schedule("forever", Duration::from_secs(u64::MAX));
        scheduler.schedule("soon", Duration::from_millis(10));

        let deadline = Instant::now() + Duration::from_secs(5);
        while fired.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(30));
        assert_eq!(*fired.lock().unwrap(), vec!["soon".to_string()]);
    }

    #[test]
    fn test_drop_discards_pending() {
        let fired = Arc::new(Mutex::new(0));
        let sink = fired.clone();
        let scheduler = ExpiryScheduler::start(move |_| *sink.lock().unwrap() += 1).unwrap();
        scheduler.schedule("job", Duration::from_secs(60));
        drop(scheduler);
        assert_eq!(*fired.lock().unwrap(), 0);
    }
}
