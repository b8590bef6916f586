use crate::pipeline::{Pipeline, RunError, RunResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

#[derive(Clone, Debug)]
pub struct RefreshOptions {
    /// Run the pipeline once before reporting ready.
    pub on_startup: bool,
    /// Periodic refresh. `None` means runs only happen on demand.
    pub interval: Option<Duration>,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        RefreshOptions {
            on_startup: true,
            interval: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RefreshError {
    #[error("the refresh worker is not running")]
    WorkerGone,

    #[error(transparent)]
    Run(#[from] RunError),
}

#[derive(Debug)]
pub enum Command {
    // Run the pipeline now. The worker replies with the run result once the
    // run has finished.
    Refresh(oneshot::Sender<Result<RunResult, RunError>>),
    // Stop the worker after the current run, if any.
    Shutdown,
}

struct AggregatorInner {
    pipeline: Pipeline,
    ready: Arc<AtomicBool>,
    tx: mpsc::Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the background worker that owns every pipeline run. All runs go
/// through the worker, so two runs never write the same chunk keys at once.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<AggregatorInner>,
}

impl Aggregator {
    pub fn new(pipeline: Pipeline, options: RefreshOptions) -> Self {
        // Channel to send commands to the worker.
        let (tx, rx) = mpsc::channel::<Command>(64);
        let ready = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            pipeline: pipeline.clone(),
            ready: ready.clone(),
            options,
        };
        let handle = tokio::spawn(worker.start(rx));

        Aggregator {
            inner: Arc::new(AggregatorInner {
                pipeline,
                ready,
                tx,
                handle: Mutex::new(Some(handle)),
            }),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Used by the readiness probe. False until the startup run attempt has
    /// finished.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Relaxed)
    }

    /// Queues a run behind any run in progress and waits for its result.
    pub async fn refresh(&self) -> Result<RunResult, RefreshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .tx
            .send(Command::Refresh(reply_tx))
            .await
            .map_err(|_| RefreshError::WorkerGone)?;

        let result = reply_rx.await.map_err(|_| RefreshError::WorkerGone)?;
        result.map_err(RefreshError::from)
    }

    /// Stops the worker and waits for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.inner.tx.send(Command::Shutdown).await;

        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!("Refresh worker panicked: {}", e);
        }
    }
}

struct Worker {
    pipeline: Pipeline,
    ready: Arc<AtomicBool>,
    options: RefreshOptions,
}

impl Worker {
    /// Runs the startup refresh if enabled, then serves commands and the
    /// optional interval until Shutdown is received or every handle is
    /// dropped. Run failures are logged by the pipeline and never stop the
    /// worker.
    async fn start(self, mut rx: mpsc::Receiver<Command>) {
        if self.options.on_startup {
            let _ = self.pipeline.run().await;
        }
        self.ready.store(true, Ordering::Relaxed);

        let mut ticker = self.options.interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Refresh(reply)) => {
                        let _ = reply.send(self.pipeline.run().await);
                    }
                    Some(Command::Shutdown) | None => break,
                },
                _ = next_tick(&mut ticker) => {
                    tracing::debug!("running scheduled refresh");
                    let _ = self.pipeline.run().await;
                }
            }
        }

        tracing::info!("refresh worker stopped");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchOptions, SourceFetcher};
    use crate::store::{KvStore, MemoryStore, keys};

    async fn pipeline_with(source: &str) -> Pipeline {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(store, SourceFetcher::new(FetchOptions::default()));
        pipeline.settings().add_source(source).await.unwrap();
        pipeline
    }

    async fn wait_until_ready(aggregator: &Aggregator) {
        for _ in 0..100 {
            if aggregator.is_ready() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("aggregator never became ready");
    }

    #[tokio::test]
    async fn test_startup_run_then_ready() {
        let pipeline = pipeline_with("inline:trojan://pw@h.test:443#t").await;
        let aggregator = Aggregator::new(pipeline, RefreshOptions::default());

        wait_until_ready(&aggregator).await;
        let store = aggregator.pipeline().store();
        assert_eq!(store.get(keys::CHUNKS_TOTAL).await.unwrap().as_deref(), Some("1"));

        // nothing changed since the startup run
        let result = aggregator.refresh().await.unwrap();
        assert!(!result.updated);
        assert_eq!(result.records, 1);

        aggregator.shutdown().await;
    }

    #[tokio::test]
    async fn test_ready_without_startup_run() {
        let pipeline = pipeline_with("inline:trojan://pw@h.test:443#t").await;
        let aggregator = Aggregator::new(
            pipeline,
            RefreshOptions {
                on_startup: false,
                interval: None,
            },
        );

        wait_until_ready(&aggregator).await;
        let store = aggregator.pipeline().store();
        assert_eq!(store.get(keys::CHUNKS_TOTAL).await.unwrap(), None);

        let result = aggregator.refresh().await.unwrap();
        assert!(result.updated);
        assert_eq!(result.changed, vec![1]);

        aggregator.shutdown().await;
    }

    #[tokio::test]
    async fn test_interval_refresh() {
        let pipeline = pipeline_with("inline:trojan://pw@h.test:443#t").await;
        let aggregator = Aggregator::new(
            pipeline,
            RefreshOptions {
                on_startup: false,
                interval: Some(Duration::from_millis(20)),
            },
        );

        let store = aggregator.pipeline().store().clone();
        for _ in 0..100 {
            if store.get(keys::CHUNKS_TOTAL).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.get(keys::CHUNKS_TOTAL).await.unwrap().as_deref(), Some("1"));

        aggregator.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_after_shutdown() {
        let pipeline = pipeline_with("inline:trojan://pw@h.test:443#t").await;
        let aggregator = Aggregator::new(pipeline, RefreshOptions::default());

        aggregator.shutdown().await;
        assert!(matches!(
            aggregator.refresh().await,
            Err(RefreshError::WorkerGone)
        ));
    }
}
