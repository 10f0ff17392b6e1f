//! Single-consumer iteration over the page pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{FetchedPage, QueryState, StatementClient};
use crate::decode::{decode_value, parse_type, TrinoType};
use crate::queue::{PageQueue, StatusCallback};
use crate::wire::{Column, QueryError, QueryResults, StatementStats};
use crate::{Result, TrinoError, Value};

const INITIAL_WAIT: Duration = Duration::from_millis(50);
const WAIT_STEP: Duration = Duration::from_millis(100);
const MAX_WAIT: Duration = Duration::from_secs(10);

/// Streaming result of one statement.
///
/// Exactly one consumer may advance the stream; a second concurrent
/// [`ResultStream::next_page`] call fails with a usage error instead of
/// corrupting iteration.
pub struct ResultStream {
    client: Arc<StatementClient>,
    queue: Arc<PageQueue>,
    cancel: CancellationToken,
    discard_rows: bool,
    advancing: AtomicBool,
    closed: AtomicBool,
    types: Mutex<Option<Arc<Vec<TrinoType>>>>,
}

impl std::fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream").finish_non_exhaustive()
    }
}

impl ResultStream {
    pub(crate) fn new(
        client: Arc<StatementClient>,
        queue: Arc<PageQueue>,
        cancel: CancellationToken,
        discard_rows: bool,
    ) -> Self {
        Self {
            client,
            queue,
            cancel,
            discard_rows,
            advancing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            types: Mutex::new(None),
        }
    }

    /// Advances to the next data page. `Ok(None)` once the statement finished
    /// and every queued page has been consumed.
    pub async fn next_page(&self) -> Result<Option<Page>> {
        let _guard = ExclusiveGuard::enter(&self.advancing)?;
        self.queue.check_errors()?;
        if self.is_finished() {
            return Ok(None);
        }
        self.check_aborted()?;

        let mut wait = INITIAL_WAIT;
        loop {
            self.queue.start_read_ahead();
            if let Some(page) = self.queue.dequeue(wait).await {
                return Ok(Some(self.decoded_page(page)?));
            }
            wait = grow_wait(wait);
            self.queue.check_errors()?;
            if self.is_finished() {
                return Ok(None);
            }
            self.check_aborted()?;
        }
    }

    /// Captured fetch errors surface first; an abort with an empty error bag
    /// still terminates iteration.
    fn check_aborted(&self) -> Result<()> {
        match self.client.state() {
            QueryState::ClientAborted if self.client.is_timed_out() => Err(TrinoError::Timeout(
                self.client.statement_timeout().unwrap_or_default(),
            )),
            QueryState::ClientAborted => Err(TrinoError::Canceled),
            QueryState::ClientError => {
                match self.client.current().and_then(|results| results.error.clone()) {
                    Some(error) => Err(TrinoError::server(error)),
                    None => Err(TrinoError::Protocol("statement failed".to_owned())),
                }
            }
            _ if self.queue.is_canceled() => Err(TrinoError::Canceled),
            _ => Ok(()),
        }
    }

    /// Drains the stream and returns the final stats.
    pub async fn read_to_end(&self) -> Result<StatementStats> {
        while self.next_page().await?.is_some() {}
        Ok(self.stats())
    }

    /// Waits for the result schema.
    ///
    /// Remains callable after cancellation: columns recorded on any earlier
    /// page are returned even once the statement is aborted.
    pub async fn columns(&self) -> Result<Vec<Column>> {
        let mut wait = INITIAL_WAIT;
        loop {
            if let Some(columns) = self.client.columns() {
                return Ok(columns.as_ref().clone());
            }
            match self.client.state() {
                QueryState::Running if !self.queue.is_canceled() => {}
                QueryState::Finished => {
                    return Err(TrinoError::Protocol(
                        "statement finished without column metadata".to_owned(),
                    ));
                }
                _ => {
                    self.queue.check_errors()?;
                    self.check_aborted()?;
                    return Err(TrinoError::Canceled);
                }
            }
            self.queue.start_read_ahead();
            self.queue.wait_columns_signal(wait).await;
            wait = grow_wait(wait);
        }
    }

    /// True once any data row has been observed. Always false in
    /// discard-result mode.
    pub async fn has_data(&self) -> bool {
        if self.discard_rows {
            return false;
        }
        let mut wait = INITIAL_WAIT;
        loop {
            if self.queue.has_data() {
                return true;
            }
            if self.client.state() != QueryState::Running
                || !self.client.has_continuation()
                || self.queue.is_canceled()
            {
                return self.queue.has_data();
            }
            self.queue.start_read_ahead();
            self.queue.wait_first_data_signal(wait).await;
            wait = grow_wait(wait);
        }
    }

    /// Stats from the most recent page.
    pub fn stats(&self) -> StatementStats {
        self.client
            .current()
            .map(|results| results.stats.clone())
            .unwrap_or_default()
    }

    /// Most recent raw page observed by the state machine.
    pub fn last_results(&self) -> Option<Arc<QueryResults>> {
        self.client.current()
    }

    pub fn query_id(&self) -> Option<String> {
        self.client.current().map(|results| results.id.clone())
    }

    pub fn update_count(&self) -> Option<u64> {
        self.client.current().and_then(|results| results.update_count)
    }

    pub fn state(&self) -> QueryState {
        self.client.state()
    }

    /// Registers a callback invoked once with the final stats and error.
    pub fn on_status(
        &self,
        callback: impl Fn(&StatementStats, Option<&QueryError>) + Send + Sync + 'static,
    ) {
        self.queue.on_status(Box::new(callback) as StatusCallback);
    }

    /// Aborts the statement; returns true when the state is now aborted.
    pub async fn cancel(&self) -> bool {
        self.cancel.cancel();
        self.client.cancel().await
    }

    /// Cancels if still running and waits for the background fetcher to stop.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if self.client.state() == QueryState::Running {
            self.client.cancel().await;
        }
        self.queue.join_fetcher().await;
    }

    fn is_finished(&self) -> bool {
        let state = self.client.state();
        if self.discard_rows {
            return state == QueryState::Finished;
        }
        state == QueryState::Finished
            && self.queue.is_empty()
            && !self.client.has_continuation()
    }

    fn decoded_page(&self, page: FetchedPage) -> Result<Page> {
        let columns = self.client.columns().ok_or_else(|| {
            TrinoError::Protocol("data page arrived before column metadata".to_owned())
        })?;
        let types = {
            let mut slot = self.types.lock().expect("type cache mutex must not be poisoned");
            match &*slot {
                Some(types) => Arc::clone(types),
                None => {
                    let parsed = columns
                        .iter()
                        .map(|column| parse_type(&column.data_type))
                        .collect::<Result<Vec<_>>>()?;
                    let parsed = Arc::new(parsed);
                    *slot = Some(Arc::clone(&parsed));
                    parsed
                }
            }
        };
        Ok(Page {
            columns,
            types,
            results: page.results,
        })
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.cancel.cancel();
        if self.client.state() == QueryState::Running {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let client = Arc::clone(&self.client);
                handle.spawn(async move {
                    client.cancel().await;
                });
            }
        }
    }
}

fn grow_wait(wait: Duration) -> Duration {
    (wait + WAIT_STEP).min(MAX_WAIT)
}

/// One data page with its schema; rows decode on demand.
#[derive(Debug)]
pub struct Page {
    columns: Arc<Vec<Column>>,
    types: Arc<Vec<TrinoType>>,
    results: Arc<QueryResults>,
}

impl Page {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn stats(&self) -> &StatementStats {
        &self.results.stats
    }

    pub fn raw(&self) -> &QueryResults {
        &self.results
    }

    pub fn row_count(&self) -> usize {
        self.results.row_count()
    }

    /// Decodes every row of this page into host values.
    pub fn rows(&self) -> Result<Vec<Vec<Value>>> {
        let Some(data) = &self.results.data else {
            return Ok(Vec::new());
        };
        data.iter()
            .map(|row| {
                if row.len() != self.types.len() {
                    return Err(TrinoError::Decode(format!(
                        "row has {} values for {} columns",
                        row.len(),
                        self.types.len()
                    )));
                }
                row.iter()
                    .zip(self.types.iter())
                    .map(|(raw, ty)| decode_value(raw, ty))
                    .collect()
            })
            .collect()
    }
}

/// Guard enforcing the single-consumer contract on `next_page`.
struct ExclusiveGuard<'a>(&'a AtomicBool);

impl<'a> ExclusiveGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Result<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(TrinoError::Usage(
                "next_page called while another advance is in flight".to_owned(),
            ));
        }
        Ok(Self(flag))
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::{grow_wait, ExclusiveGuard, INITIAL_WAIT, MAX_WAIT};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn wait_grows_linearly_and_caps() {
        let mut wait = INITIAL_WAIT;
        wait = grow_wait(wait);
        assert_eq!(wait, Duration::from_millis(150));
        for _ in 0..200 {
            wait = grow_wait(wait);
        }
        assert_eq!(wait, MAX_WAIT);
    }

    #[test]
    fn exclusive_guard_rejects_reentry_and_releases() {
        let flag = AtomicBool::new(false);
        let guard = ExclusiveGuard::enter(&flag).expect("first entry must succeed");
        assert!(ExclusiveGuard::enter(&flag).is_err());
        drop(guard);
        assert!(ExclusiveGuard::enter(&flag).is_ok());
    }
}
