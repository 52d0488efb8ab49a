use std::{
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::Arc,
    thread,
};

use futures::{
    FutureExt,
    SinkExt,
    StreamExt,
    channel::{
        mpsc,
        oneshot,
    },
    future,
    select_biased,
    stream::FuturesUnordered,
};
use parking_lot::Mutex;

use crate::metrics::{
    log_pool_thread_busy,
    log_pool_thread_idle,
};

struct Config {
    name: &'static str,
    max_exec_threads: usize,
}

/// A bounded pool of OS threads that runs blocking closures on behalf of
/// async callers.
///
/// Threads are created lazily, one per concurrently outstanding request, up to
/// `num_threads`. Requests beyond that wait in a queue of `queue_size`. The
/// pool shuts down once every clone has been dropped; requests that are
/// already running are allowed to finish.
pub struct BoundedThreadPool {
    sender: mpsc::Sender<Request>,
    threads: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,
    name: &'static str,
}

impl Clone for BoundedThreadPool {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            threads: self.threads.clone(),
            name: self.name,
        }
    }
}

impl BoundedThreadPool {
    /// Must be called from within a tokio runtime.
    pub fn new(queue_size: usize, num_threads: usize, name: &'static str) -> Self {
        let (sender, receiver) = mpsc::channel(queue_size);
        let threads = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Scheduler {
            worker_senders: Vec::new(),
            available_workers: Vec::new(),
            threads: threads.clone(),
            config: Config {
                name,
                max_exec_threads: num_threads.max(1),
            },
        };
        tokio::spawn(scheduler.dispatch(receiver));
        Self {
            sender,
            threads,
            name,
        }
    }

    /// Number of OS threads started so far.
    pub fn num_threads(&self) -> usize {
        self.threads.lock().len()
    }

    /// Run `f` on one of the pool's threads. A panic in `f` is returned as an
    /// error instead of taking the thread down.
    pub async fn execute<T, R>(&self, f: T) -> anyhow::Result<R>
    where
        R: Send + 'static,
        T: FnOnce() -> R + Send + 'static,
    {
        let name = self.name;
        let (tx, rx) = oneshot::channel();
        let job = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|_| anyhow::anyhow!("Task panicked on the {name} thread pool"));
            let _ = tx.send(result);
        };
        let request = Request { job: Box::new(job) };
        self.sender
            .clone()
            .send(request)
            .await
            .map_err(|_| anyhow::anyhow!("The {name} thread pool has shut down"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("The {name} thread pool dropped a task"))?
    }
}

struct Scheduler {
    // Vec of channels for sending work to individual workers.
    worker_senders: Vec<mpsc::Sender<(Request, oneshot::Sender<usize>, usize)>>,

    // Stack of indexes into worker_senders, including exactly the workers
    // that are not running any request.
    available_workers: Vec<usize>,

    threads: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,

    config: Config,
}

impl Scheduler {
    async fn get_available_worker(&mut self) -> Option<usize> {
        match self.available_workers.pop() {
            Some(value) => Some(value),
            None => {
                // No available worker, create a new one if under the limit
                if self.worker_senders.len() < self.config.max_exec_threads {
                    return self.create_worker();
                }
                // otherwise block until a running request completes.
                future::pending().await
            },
        }
    }

    fn create_worker(&mut self) -> Option<usize> {
        let worker_index = self.worker_senders.len();
        let (work_sender, work_receiver) = mpsc::channel(1);
        let spawned = thread::Builder::new()
            .name(format!("{}-{worker_index}", self.config.name))
            .spawn(move || futures::executor::block_on(Self::service_requests(work_receiver)));
        match spawned {
            Ok(handle) => {
                self.worker_senders.push(work_sender);
                self.threads.lock().push(handle);
                Some(worker_index)
            },
            Err(e) => {
                tracing::error!(
                    "Failed to start a thread for the {} pool: {e}",
                    self.config.name
                );
                None
            },
        }
    }

    async fn service_requests(
        mut work_receiver: mpsc::Receiver<(Request, oneshot::Sender<usize>, usize)>,
    ) {
        // Wait for the next job from our sender.
        while let Some((request, done_sender, worker_index)) = work_receiver.next().await {
            log_pool_thread_busy();
            (request.job)();
            log_pool_thread_idle();
            // Then tell our sender that we're ready for another job
            let _ = done_sender.send(worker_index);
        }
    }

    async fn dispatch(mut self, mut receiver: mpsc::Receiver<Request>) {
        let mut in_progress_workers = FuturesUnordered::new();

        loop {
            let next_worker = loop {
                select_biased! {
                    completed_worker = in_progress_workers.select_next_some() => {
                        let Ok(completed_worker) = completed_worker else {
                            tracing::warn!(
                                "Worker shut down. Shutting down {} scheduler.",
                                self.config.name,
                            );
                            return;
                        };
                        self.available_workers.push(completed_worker);
                    },
                    next_worker = self.get_available_worker().fuse() => {
                        break next_worker;
                    },
                }
            };
            let Some(next_worker) = next_worker else {
                // Dropping the receiver fails every queued request.
                return;
            };
            // Wait for more work. The in-progress workers report back through
            // their oneshots, which we pick up on the next iteration.
            let Some(req) = receiver.next().await else {
                // Every pool handle is gone, shutting down.
                return;
            };
            let (done_sender, done_receiver) = oneshot::channel();
            if self.worker_senders[next_worker]
                .try_send((req, done_sender, next_worker))
                .is_err()
            {
                // Available worker should have an empty channel, so if we fail
                // here it must be shut down. We should shut down too.
                tracing::warn!(
                    "Worker sender dropped. Shutting down {} scheduler.",
                    self.config.name
                );
                return;
            }
            in_progress_workers.push(done_receiver);
        }
    }
}

struct Request {
    job: Box<dyn FnOnce() + Send + 'static>,
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{
                AtomicUsize,
                Ordering,
            },
        },
        thread,
        time::Duration,
    };

    use futures::future::try_join_all;

    use super::BoundedThreadPool;

    #[tokio::test]
    async fn test_execute_returns_result() -> anyhow::Result<()> {
        let pool = BoundedThreadPool::new(4, 2, "test_pool");
        assert_eq!(pool.execute(|| 21 * 2).await?, 42);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() -> anyhow::Result<()> {
        let pool = BoundedThreadPool::new(16, 3, "test_pool");
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let tasks = (0..12).map(|_| {
            let running = running.clone();
            let max_running = max_running.clone();
            pool.execute(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                running.fetch_sub(1, Ordering::SeqCst);
            })
        });
        try_join_all(tasks).await?;
        assert!(max_running.load(Ordering::SeqCst) <= 3);
        assert!(pool.num_threads() <= 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_panic_is_an_error() -> anyhow::Result<()> {
        let pool = BoundedThreadPool::new(4, 1, "test_pool");
        let result = pool.execute(|| -> usize { panic!("bad partition") }).await;
        assert!(result.is_err());
        // The worker survives the panic.
        assert_eq!(pool.execute(|| 7).await?, 7);
        Ok(())
    }
}
