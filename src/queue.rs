//! Background page fetcher with a soft byte budget.
//!
//! One producer task per statement drains the continuation chain ahead of the
//! consumer. The queue stops fetching once queued bytes reach the budget; the
//! consumer restarts read-ahead after draining. Overshoot is at most one page.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{FetchedPage, QueryState, StatementClient};
use crate::wire::{QueryError, StatementStats};
use crate::{Result, TrinoError};

pub(crate) type StatusCallback = Box<dyn Fn(&StatementStats, Option<&QueryError>) + Send + Sync>;

pub(crate) struct PageQueue {
    client: Arc<StatementClient>,
    shared: Arc<QueueShared>,
    fetcher: Mutex<Option<JoinHandle<()>>>,
    discard_rows: bool,
    buffer_bytes: usize,
    cancel: CancellationToken,
}

struct QueueShared {
    pages: Mutex<VecDeque<FetchedPage>>,
    queued_bytes: AtomicUsize,
    errors: Mutex<Vec<TrinoError>>,
    new_page: Notify,
    columns_found: Notify,
    first_data: Notify,
    has_data: AtomicBool,
    canceled_recorded: AtomicBool,
    timeout_recorded: AtomicBool,
    status_published: AtomicBool,
    callbacks: Mutex<Vec<StatusCallback>>,
}

impl PageQueue {
    pub fn new(
        client: Arc<StatementClient>,
        discard_rows: bool,
        buffer_bytes: usize,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        if buffer_bytes == 0 {
            return Err(TrinoError::Usage(
                "page buffer budget must be positive".to_owned(),
            ));
        }
        Ok(Arc::new(Self {
            client,
            shared: Arc::new(QueueShared {
                pages: Mutex::new(VecDeque::new()),
                queued_bytes: AtomicUsize::new(0),
                errors: Mutex::new(Vec::new()),
                new_page: Notify::new(),
                columns_found: Notify::new(),
                first_data: Notify::new(),
                has_data: AtomicBool::new(false),
                canceled_recorded: AtomicBool::new(false),
                timeout_recorded: AtomicBool::new(false),
                status_published: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
            }),
            fetcher: Mutex::new(None),
            discard_rows,
            buffer_bytes,
            cancel,
        }))
    }

    /// Starts the fetch task if none is running. The lock guards the
    /// should-start check and handle swap; nothing under it does I/O.
    pub fn start_read_ahead(self: &Arc<Self>) {
        {
            let mut slot = self
                .fetcher
                .lock()
                .expect("fetcher mutex must not be poisoned");
            let running = slot.as_ref().is_some_and(|handle| !handle.is_finished());
            if !running && self.should_read_ahead() && !self.should_stop() {
                let queue = Arc::clone(self);
                *slot = Some(tokio::spawn(async move { queue.fetch_loop().await }));
                return;
            }
        }
        // A statement that completed on the submit response never enters the
        // fetch loop, so its final status is published here.
        self.publish_status();
    }

    async fn fetch_loop(self: Arc<Self>) {
        while self.should_read_ahead() && !self.should_stop() {
            match self.client.advance().await {
                Ok(Some(page)) => self.accept(page),
                Ok(None) => break,
                Err(err) => {
                    self.record_error(err);
                    break;
                }
            }
        }
        self.publish_status();
        self.wake_all();
    }

    /// Folds one page into the pipeline: signals schema discovery and, in
    /// row mode, queues any data. Also seeds the submit response, whose rows
    /// never pass through the fetch loop.
    pub fn accept(&self, page: FetchedPage) {
        if page.results.columns.is_some() {
            self.shared.columns_found.notify_waiters();
        }
        if !self.discard_rows && page.results.row_count() > 0 {
            self.enqueue(page);
        }
    }

    fn enqueue(&self, page: FetchedPage) {
        let mut pages = self
            .shared
            .pages
            .lock()
            .expect("page queue mutex must not be poisoned");
        self.shared
            .queued_bytes
            .fetch_add(page.encoded_bytes, Ordering::AcqRel);
        pages.push_back(page);
        drop(pages);
        self.shared.has_data.store(true, Ordering::Release);
        self.shared.first_data.notify_waiters();
        self.shared.new_page.notify_waiters();
    }

    /// True while more pages should be fetched: the statement is running,
    /// a continuation URI remains, and (in row mode) the budget has room.
    fn should_read_ahead(&self) -> bool {
        if self.client.state() != QueryState::Running || !self.client.has_continuation() {
            return false;
        }
        if self.discard_rows {
            return true;
        }
        self.shared.queued_bytes.load(Ordering::Acquire) < self.buffer_bytes
    }

    fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.shared.canceled_recorded.swap(true, Ordering::AcqRel) {
                self.record_error(TrinoError::Canceled);
            }
            return true;
        }
        if self.client.is_timed_out() {
            if !self.shared.timeout_recorded.swap(true, Ordering::AcqRel) {
                let limit = self.client.statement_timeout().unwrap_or_default();
                self.record_error(TrinoError::Timeout(limit));
            }
            return true;
        }
        !self
            .shared
            .errors
            .lock()
            .expect("error bag mutex must not be poisoned")
            .is_empty()
    }

    fn record_error(&self, err: TrinoError) {
        tracing::debug!(error = %err, "captured background fetch error");
        self.shared
            .errors
            .lock()
            .expect("error bag mutex must not be poisoned")
            .push(err);
    }

    /// Surfaces captured errors: one error directly, several as an aggregate.
    /// The bag keeps introspectable copies so later calls fail the same way.
    pub fn check_errors(&self) -> Result<()> {
        let errors = self
            .shared
            .errors
            .lock()
            .expect("error bag mutex must not be poisoned");
        if errors.is_empty() {
            return Ok(());
        }
        let mut copies: Vec<TrinoError> = errors.iter().map(clone_error).collect();
        drop(errors);
        if copies.len() == 1 {
            Err(copies.remove(0))
        } else {
            Err(TrinoError::Aggregate(copies))
        }
    }

    pub fn try_dequeue(&self) -> Option<FetchedPage> {
        let mut pages = self
            .shared
            .pages
            .lock()
            .expect("page queue mutex must not be poisoned");
        let page = pages.pop_front()?;
        self.shared
            .queued_bytes
            .fetch_sub(page.encoded_bytes, Ordering::AcqRel);
        Some(page)
    }

    /// Dequeues, waiting up to `wait` for the producer when the queue is empty.
    pub async fn dequeue(&self, wait: Duration) -> Option<FetchedPage> {
        if let Some(page) = self.try_dequeue() {
            return Some(page);
        }
        let _ = tokio::time::timeout(wait, self.shared.new_page.notified()).await;
        self.try_dequeue()
    }

    /// Bounded wait on the columns-discovered signal.
    pub async fn wait_columns_signal(&self, wait: Duration) {
        let _ = tokio::time::timeout(wait, self.shared.columns_found.notified()).await;
    }

    /// Bounded wait on the first-data signal.
    pub async fn wait_first_data_signal(&self, wait: Duration) {
        let _ = tokio::time::timeout(wait, self.shared.first_data.notified()).await;
    }

    pub fn has_data(&self) -> bool {
        self.shared.has_data.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.shared
            .pages
            .lock()
            .expect("page queue mutex must not be poisoned")
            .is_empty()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Registers a status callback; fires immediately when the final status
    /// was already published.
    pub fn on_status(&self, callback: StatusCallback) {
        if self.shared.status_published.load(Ordering::Acquire) {
            let current = self.client.current();
            let stats = current
                .as_ref()
                .map(|results| results.stats.clone())
                .unwrap_or_default();
            let error = current.as_ref().and_then(|results| results.error.clone());
            callback(&stats, error.as_ref());
            return;
        }
        self.shared
            .callbacks
            .lock()
            .expect("callback mutex must not be poisoned")
            .push(callback);
    }

    /// Emits one status notification with the final stats and error once the
    /// statement reaches FINISHED or fails with a server error.
    fn publish_status(&self) {
        let state = self.client.state();
        if state != QueryState::Finished && state != QueryState::ClientError {
            return;
        }
        if self.shared.status_published.swap(true, Ordering::AcqRel) {
            return;
        }
        let current = self.client.current();
        let stats = current
            .as_ref()
            .map(|results| results.stats.clone())
            .unwrap_or_default();
        let error = current.as_ref().and_then(|results| results.error.clone());
        let callbacks = self
            .shared
            .callbacks
            .lock()
            .expect("callback mutex must not be poisoned");
        for callback in callbacks.iter() {
            callback(&stats, error.as_ref());
        }
    }

    fn wake_all(&self) {
        self.shared.new_page.notify_waiters();
        self.shared.columns_found.notify_waiters();
        self.shared.first_data.notify_waiters();
    }

    /// Waits for the background fetcher to terminate.
    pub async fn join_fetcher(&self) {
        let handle = self
            .fetcher
            .lock()
            .expect("fetcher mutex must not be poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Copies an error for re-surfacing; non-clonable transport errors keep their
/// rendered message so `is_timeout`/`is_canceled` introspection still works.
fn clone_error(err: &TrinoError) -> TrinoError {
    match err {
        TrinoError::Transport(inner) => TrinoError::Protocol(format!("transport error: {inner}")),
        TrinoError::Http { status, body } => TrinoError::Http {
            status: *status,
            body: body.clone(),
        },
        TrinoError::Protocol(msg) => TrinoError::Protocol(msg.clone()),
        TrinoError::Server(error) => TrinoError::Server(error.clone()),
        TrinoError::Decode(msg) => TrinoError::Decode(msg.clone()),
        TrinoError::Timeout(limit) => TrinoError::Timeout(*limit),
        TrinoError::Canceled => TrinoError::Canceled,
        TrinoError::Usage(msg) => TrinoError::Usage(msg.clone()),
        TrinoError::Aggregate(inner) => {
            TrinoError::Aggregate(inner.iter().map(clone_error).collect())
        }
    }
}
