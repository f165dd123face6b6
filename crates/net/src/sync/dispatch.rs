use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::net::ConnectionId;

type Job<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

struct PendingJob<T> {
    owner: ConnectionId,
    job: Job<T>,
}

/// Hands work from network threads to the logic thread.
///
/// Jobs run in submission order when the logic thread calls
/// [`MainThreadQueue::drain`], each with exclusive access to the state `T`.
/// Jobs are tagged with the connection they came from so a torn-down
/// connection can drop whatever it still had queued.
pub struct MainThreadQueue<T> {
    jobs: Arc<Mutex<VecDeque<PendingJob<T>>>>,
}

impl<T> Clone for MainThreadQueue<T> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
        }
    }
}

impl<T> Default for MainThreadQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MainThreadQueue<T> {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Safe to call from any thread; never blocks on the logic thread's work.
    pub fn dispatch<F>(&self, owner: ConnectionId, job: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.jobs.lock().push_back(PendingJob {
            owner,
            job: Box::new(job),
        });
    }

    /// Runs every job queued so far. Jobs dispatched while draining wait for
    /// the next call.
    pub fn drain(&self, target: &mut T) -> usize {
        let jobs = std::mem::take(&mut *self.jobs.lock());
        let count = jobs.len();
        for pending in jobs {
            (pending.job)(target);
        }
        count
    }

    /// Drops pending jobs of `owner` without running them.
    pub fn discard(&self, owner: ConnectionId) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|pending| pending.owner != owner);
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn jobs_run_in_submission_order() {
        let queue = MainThreadQueue::<Vec<u32>>::new();
        let conn = ConnectionId(1);

        for i in 0..5 {
            queue.dispatch(conn, move |log| log.push(i));
        }

        let mut log = Vec::new();
        assert_eq!(queue.drain(&mut log), 5);
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn jobs_from_other_threads_run_on_drain() {
        let queue = MainThreadQueue::<u32>::new();
        let remote = queue.clone();

        thread::spawn(move || {
            for _ in 0..10 {
                remote.dispatch(ConnectionId(7), |count| *count += 1);
            }
        })
        .join()
        .unwrap();

        let mut count = 0;
        queue.drain(&mut count);
        assert_eq!(count, 10);
    }

    #[test]
    fn discard_drops_only_the_owners_jobs() {
        let queue = MainThreadQueue::<Vec<&'static str>>::new();

        queue.dispatch(ConnectionId(1), |log| log.push("a"));
        queue.dispatch(ConnectionId(2), |log| log.push("b"));
        queue.dispatch(ConnectionId(1), |log| log.push("c"));

        assert_eq!(queue.discard(ConnectionId(1)), 2);

        let mut log = Vec::new();
        queue.drain(&mut log);
        assert_eq!(log, vec!["b"]);
    }
}
