//! Rate-limited, retrying dispatch of model requests.
//!
//! Requests go through an unbounded queue to a fixed pool of workers. Each
//! attempt (first try and every retry) takes a slot from the shared
//! [`RateBudget`] before it is sent.

mod budget;
mod retry;

pub use budget::RateBudget;
pub use retry::RetryPolicy;

use crate::config::DispatchSettings;
use crate::error::{AskvidError, Result};
use crate::generation::{GenerateRequest, Generator};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, warn};

/// Lifecycle of one dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    InFlight,
    Retrying,
    Succeeded,
    Failed,
}

struct Job {
    id: u64,
    request: GenerateRequest,
    state: watch::Sender<RequestState>,
    reply: oneshot::Sender<Result<String>>,
}

/// Pending result of [`Dispatcher::submit`]. Dropping it abandons the request.
pub struct DispatchHandle {
    id: u64,
    state: watch::Receiver<RequestState>,
    result: oneshot::Receiver<Result<String>>,
}

impl DispatchHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }
}

impl Future for DispatchHandle {
    type Output = Result<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(AskvidError::Cancelled("dispatcher shut down".to_string()))
            })
        })
    }
}

/// Shared pieces every worker needs.
struct WorkerContext {
    generator: Arc<dyn Generator>,
    budget: Arc<RateBudget>,
    policy: RetryPolicy,
}

/// Worker pool that sends model requests under a rate budget.
///
/// Must be created inside a Tokio runtime.
pub struct Dispatcher {
    queue: mpsc::UnboundedSender<Job>,
    budget: Arc<RateBudget>,
    next_id: AtomicU64,
    workers: usize,
}

impl Dispatcher {
    /// Start `max_concurrent` workers (never more than the per-window budget).
    pub fn new(
        generator: Arc<dyn Generator>,
        budget: Arc<RateBudget>,
        policy: RetryPolicy,
        max_concurrent: usize,
    ) -> Self {
        let workers = max_concurrent
            .min(budget.max_per_window() as usize)
            .max(1);

        let (queue, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let context = Arc::new(WorkerContext {
            generator,
            budget: Arc::clone(&budget),
            policy,
        });

        for worker in 0..workers {
            let receiver = Arc::clone(&receiver);
            let context = Arc::clone(&context);
            tokio::spawn(async move {
                loop {
                    let job = receiver.lock().await.recv().await;
                    let Some(job) = job else {
                        break;
                    };
                    context.run(job).await;
                }
                debug!("Dispatch worker {} stopped", worker);
            });
        }

        info!(
            "Dispatcher ready: {} workers, {} requests per {:?}",
            workers,
            budget.max_per_window(),
            budget.window_length()
        );

        Self {
            queue,
            budget,
            next_id: AtomicU64::new(1),
            workers,
        }
    }

    pub fn from_settings(generator: Arc<dyn Generator>, settings: &DispatchSettings) -> Self {
        let budget = Arc::new(RateBudget::new(
            settings.max_per_window,
            Duration::from_secs(settings.window_secs),
        ));
        Self::new(
            generator,
            budget,
            RetryPolicy::from_settings(settings),
            settings.max_concurrent,
        )
    }

    pub fn budget(&self) -> &Arc<RateBudget> {
        &self.budget
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue a request and return a handle to its result.
    pub fn submit(&self, request: GenerateRequest) -> DispatchHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (state_tx, state_rx) = watch::channel(RequestState::Pending);
        let (reply_tx, reply_rx) = oneshot::channel();

        let job = Job {
            id,
            request,
            state: state_tx,
            reply: reply_tx,
        };

        if let Err(mpsc::error::SendError(job)) = self.queue.send(job) {
            job.state.send_replace(RequestState::Failed);
            let _ = job.reply.send(Err(AskvidError::Cancelled(
                "dispatcher shut down".to_string(),
            )));
        }

        DispatchHandle {
            id,
            state: state_rx,
            result: reply_rx,
        }
    }

    /// Submit and wait for the result.
    pub async fn dispatch(&self, request: GenerateRequest) -> Result<String> {
        self.submit(request).await
    }
}

impl WorkerContext {
    async fn run(&self, mut job: Job) {
        if job.reply.is_closed() {
            debug!("Request {} abandoned before start", job.id);
            return;
        }

        let Some(result) = self.attempt_until_done(&mut job).await else {
            debug!("Request {} abandoned", job.id);
            return;
        };

        job.state.send_replace(if result.is_ok() {
            RequestState::Succeeded
        } else {
            RequestState::Failed
        });
        // The caller may have gone away meanwhile; its result is discarded.
        let _ = job.reply.send(result);
    }

    /// `None` when the caller abandoned the request.
    async fn attempt_until_done(&self, job: &mut Job) -> Option<Result<String>> {
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                _ = job.reply.closed() => return None,
                _ = self.budget.acquire() => {}
            }

            attempts += 1;
            job.state.send_replace(RequestState::InFlight);
            debug!("Request {} attempt {}", job.id, attempts);

            let outcome = tokio::select! {
                _ = job.reply.closed() => return None,
                outcome = self.generator.generate(&job.request) => outcome,
            };

            let err = match outcome {
                Ok(answer) => return Some(Ok(answer)),
                Err(e) => e,
            };

            if !err.is_retryable() {
                warn!("Request {} failed: {}", job.id, err);
                return Some(Err(err));
            }

            if attempts > self.policy.max_retries {
                warn!("Request {} gave up after {} attempts: {}", job.id, attempts, err);
                return Some(Err(AskvidError::DispatchFailed {
                    attempts,
                    last: Box::new(err),
                }));
            }

            let delay = self.policy.delay_for(attempts, &err);
            warn!(
                "Request {} attempt {} failed ({}), retrying in {:?}",
                job.id, attempts, err, delay
            );
            job.state.send_replace(RequestState::Retrying);

            tokio::select! {
                _ = job.reply.closed() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
