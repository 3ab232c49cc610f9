//! Background worker threads sharing one cancellation signal.
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use tokio::sync::watch;

use crate::{Error, Result};

/// Cancellation signal handed to workers started by [`ExecutionContext::go`].
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&mut self) {
        // Error means the context was dropped, which cancels all workers as well.
        let _ = self.receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Owner of a group of background workers.
///
/// Each worker is a named thread driving its own current-thread tokio runtime. Workers observe
/// cancellation through [`Cancellation`] and are joined by [`ExecutionContext::wait`].
#[derive(Debug)]
pub struct ExecutionContext {
    cancel: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    panicked: Arc<AtomicBool>,
}

impl ExecutionContext {
    #[allow(missing_docs)]
    pub fn new() -> ExecutionContext {
        let (cancel, _) = watch::channel(false);
        ExecutionContext {
            cancel,
            workers: Mutex::new(Vec::new()),
            panicked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Return a cancellation signal bound to this context.
    pub fn cancellation(&self) -> Cancellation {
        Cancellation {
            receiver: self.cancel.subscribe(),
        }
    }

    /// Start a worker thread named `name` running the future returned by `task`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread could not be spawned.
    pub fn go<F, Fut>(&self, name: impl Into<String>, task: F) -> std::io::Result<()>
    where
        F: FnOnce(Cancellation) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let name = name.into();
        let cancellation = self.cancellation();
        let panicked = Arc::clone(&self.panicked);

        let join_handle = std::thread::Builder::new().name(name.clone()).spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        log::error!(target: "optimizely", worker = name.as_str();
                                    "failed to start worker runtime: {err}");
                        return;
                    }
                };
                runtime.block_on(task(cancellation));
            }));

            if result.is_err() {
                log::error!(target: "optimizely", worker = name.as_str(); "worker panicked");
                panicked.store(true, Ordering::SeqCst);
            }
        })?;

        self.workers
            .lock()
            .expect("thread holding workers lock should not panic")
            .push(join_handle);
        Ok(())
    }

    /// Request all workers to stop. Calling it more than once has no further effect.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    #[allow(missing_docs)]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Block until every worker started so far has exited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPanicked`] if any worker panicked.
    pub fn wait(&self) -> Result<()> {
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .expect("thread holding workers lock should not panic"),
        );
        for worker in workers {
            if worker.join().is_err() {
                self.panicked.store(true, Ordering::SeqCst);
            }
        }

        if self.panicked.load(Ordering::SeqCst) {
            Err(Error::WorkerPanicked)
        } else {
            Ok(())
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        ExecutionContext::new()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::ExecutionContext;
    use crate::Error;

    #[test]
    fn workers_stop_on_cancel() {
        let _ = env_logger::builder().is_test(true).try_init();
        let context = ExecutionContext::new();
        let stopped = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let stopped = stopped.clone();
            context
                .go(format!("worker-{i}"), move |mut cancellation| async move {
                    cancellation.cancelled().await;
                    stopped.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert!(!context.is_cancelled());
        context.cancel();
        context.cancel();
        assert!(context.is_cancelled());

        context.wait().unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn workers_can_sleep_until_cancelled() {
        let context = ExecutionContext::new();
        context
            .go("sleeper", |mut cancellation| async move {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                    _ = cancellation.cancelled() => {}
                }
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(10));
        context.cancel();
        context.wait().unwrap();
    }

    #[test]
    fn reports_panicked_worker() {
        let context = ExecutionContext::new();
        context
            .go("panicking", |_cancellation| async move {
                panic!("boom");
            })
            .unwrap();

        assert!(matches!(context.wait(), Err(Error::WorkerPanicked)));
    }

    #[test]
    fn wait_without_workers() {
        let context = ExecutionContext::new();
        context.cancel();
        context.wait().unwrap();
    }
}
