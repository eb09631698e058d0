//! Serialized access to the single browser page.
//!
//! A [`RendererPool`] runs two background tasks:
//!
//! - the supervisor launches a browser session through a [`BrowserLauncher`],
//!   publishes its page, waits for the session to disconnect and launches
//!   again. Launch failures are retried according to a [`RetryPolicy`].
//! - the worker drains the job queue one job at a time. Each job waits until a
//!   page is published whose session has not disconnected, then runs to
//!   completion before the next one starts.
//!
//! Callers only reach the page through [`RendererPool::submit`].

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::page::{BrowserLauncher, RendererSession};
use super::retry::RetryPolicy;
use crate::{RenderError, Result};

type Job<P> = Box<dyn FnOnce(Result<P>) -> BoxFuture<'static, ()> + Send>;

/// Resolves once the session behind a published page is gone.
pub type Disconnected = Shared<BoxFuture<'static, ()>>;

/// What the worker sees when it asks for the page.
#[derive(Clone)]
pub enum PageSlot<P> {
    Launching,
    Ready {
        page: P,
        disconnected: Disconnected,
    },
    Failed(String),
}

/// Counts a submitted job until it starts or is dropped unrun.
struct QueuedGuard(Arc<AtomicUsize>);

impl QueuedGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Launching,
    Ready,
    Failed,
}

/// Owns one browser page and runs submitted tasks against it in FIFO order.
///
/// Must be created inside a tokio runtime. Dropping the pool stops both
/// background tasks and closes the browser; queued tasks then fail with
/// [`RenderError::PoolShutdown`].
pub struct RendererPool<P> {
    jobs: mpsc::UnboundedSender<Job<P>>,
    slot: watch::Receiver<PageSlot<P>>,
    shutdown: CancellationToken,
    queued: Arc<AtomicUsize>,
    sessions: Arc<AtomicU64>,
}

impl<P> RendererPool<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Spawns the supervisor and the worker. The first launch happens in the background.
    pub fn start<L>(launcher: L, policy: RetryPolicy) -> Self
    where
        L: BrowserLauncher<Page = P>,
    {
        let (slot_tx, slot_rx) = watch::channel(PageSlot::Launching);
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let sessions = Arc::new(AtomicU64::new(0));

        tokio::spawn(supervise(
            launcher,
            policy,
            slot_tx,
            shutdown.clone(),
            Arc::clone(&sessions),
        ));
        tokio::spawn(drain(jobs_rx, slot_rx.clone(), shutdown.clone()));

        Self {
            jobs: jobs_tx,
            slot: slot_rx,
            shutdown,
            queued: Arc::new(AtomicUsize::new(0)),
            sessions,
        }
    }

    /// Queues `task` and resolves with its result once the worker has run it.
    ///
    /// A task that fails or panics only affects its own caller.
    pub async fn submit<T, F, Fut>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let queued = QueuedGuard::new(&self.queued);
        let job: Job<P> = Box::new(move |page: Result<P>| {
            async move {
                drop(queued);
                let result = match page {
                    Ok(page) => AssertUnwindSafe(async move { task(page).await })
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(RenderError::TaskPanicked)),
                    Err(err) => Err(err),
                };
                if let Err(err) = &result {
                    warn!(error = %err, "render task failed");
                }
                let _ = tx.send(result);
            }
            .boxed()
        });

        if self.jobs.send(job).is_err() {
            return Err(RenderError::PoolShutdown);
        }
        rx.await.map_err(|_| RenderError::PoolShutdown)?
    }

    pub fn status(&self) -> PoolStatus {
        match &*self.slot.borrow() {
            PageSlot::Launching => PoolStatus::Launching,
            PageSlot::Ready { .. } => PoolStatus::Ready,
            PageSlot::Failed(_) => PoolStatus::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == PoolStatus::Ready
    }

    /// Tasks submitted but neither started nor dropped.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Number of browser sessions launched so far, including relaunches.
    pub fn sessions_started(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Waits for the current launch attempt to settle.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let mut slot = self.slot.clone();
        current_page(&mut slot).await.map(|_| ())
    }

    /// Stops the background tasks. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl<P> Drop for RendererPool<P> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn current_page<P: Clone>(slot: &mut watch::Receiver<PageSlot<P>>) -> Result<P> {
    let stopped = || RenderError::Unavailable("renderer supervisor stopped".to_string());
    loop {
        let (page, disconnected) = {
            let state = slot
                .wait_for(|state| !matches!(state, PageSlot::Launching))
                .await
                .map_err(|_| stopped())?;
            match &*state {
                PageSlot::Ready { page, disconnected } => (page.clone(), disconnected.clone()),
                PageSlot::Failed(reason) => return Err(RenderError::Unavailable(reason.clone())),
                PageSlot::Launching => continue,
            }
        };
        if session_is_live(disconnected).await {
            return Ok(page);
        }
        // Disconnected before the supervisor republished; wait for its next update.
        debug!("published page is disconnected, waiting for relaunch");
        slot.changed().await.map_err(|_| stopped())?;
    }
}

/// False once the session's disconnect signal has fired, even if the
/// supervisor has not reacted to it yet.
async fn session_is_live(disconnected: Disconnected) -> bool {
    tokio::select! {
        biased;
        _ = disconnected => false,
        // A concurrent poll by the supervisor leaves this clone pending for
        // one round; the yield gives it that round to complete.
        _ = tokio::task::yield_now() => true,
    }
}

async fn supervise<L: BrowserLauncher>(
    launcher: L,
    policy: RetryPolicy,
    slot: watch::Sender<PageSlot<L::Page>>,
    shutdown: CancellationToken,
    sessions: Arc<AtomicU64>,
) {
    let mut failures = 0u32;
    loop {
        let launched = tokio::select! {
            _ = shutdown.cancelled() => return,
            launched = launcher.launch() => launched,
        };

        match launched {
            Ok(session) => {
                failures = 0;
                let RendererSession {
                    page,
                    disconnected,
                    keepalive,
                } = session;
                let disconnected = disconnected.shared();
                let generation = sessions.fetch_add(1, Ordering::SeqCst) + 1;
                info!(generation, "renderer initialized");
                slot.send_replace(PageSlot::Ready {
                    page,
                    disconnected: disconnected.clone(),
                });

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!(generation, "closing renderer");
                        drop(keepalive);
                        return;
                    }
                    _ = disconnected => {}
                }
                warn!(generation, "renderer disconnected, reinitializing");
                slot.send_replace(PageSlot::Launching);
                drop(keepalive);
            }
            Err(err) => {
                failures += 1;
                let Some(delay) = policy.delay_after(failures) else {
                    error!(error = %err, attempts = failures, "renderer initialization failed, giving up");
                    slot.send_replace(PageSlot::Failed(format!(
                        "browser failed to start after {failures} attempts: {err}"
                    )));
                    return;
                };
                error!(error = %err, attempt = failures, retry_in = ?delay, "renderer initialization failed");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn drain<P: Clone + Send + Sync + 'static>(
    mut jobs: mpsc::UnboundedReceiver<Job<P>>,
    mut slot: watch::Receiver<PageSlot<P>>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let page = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(RenderError::PoolShutdown),
            page = current_page(&mut slot) => page,
        };
        job(page).await;
    }
    debug!("render queue closed");
}
