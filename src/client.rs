//! Statement state machine driven by server continuation URIs.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use tokio::time::sleep;

use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::headers::HeaderNames;
use crate::http::{HttpTransport, RawResponse};
use crate::params::{build_execute_sql, fresh_statement_name, Params};
use crate::queue::PageQueue;
use crate::session::{Session, SessionDelta};
use crate::stream::ResultStream;
use crate::wire::{Column, QueryResults, ServerInfo, StatementStats};
use crate::{ClientOptions, Result, TrinoError};

const STATEMENT_PATH: &str = "/v1/statement";
const TARGET_RESULT_SIZE: &str = "targetResultSize=5MB";
const CLIENT_CAPABILITIES: &str = "PARAMETRIC_DATETIME,SESSION_AUTHORIZATION";
const USER_AGENT: &str = concat!("trino-http/", env!("CARGO_PKG_VERSION"));

const INITIAL_READ_DELAY_MS: u64 = 50;
const MAX_READ_DELAY_MS: u64 = 5_000;
const READ_DELAY_FACTOR: f64 = 1.2;
const READS_BEFORE_DELAY: u32 = 4;

/// Client for one engine connection.
///
/// Holds the shared [`Session`]; every statement snapshots it on submission
/// and merges its header-driven delta back when the statement finishes.
pub struct TrinoClient {
    http: Arc<HttpTransport>,
    names: HeaderNames,
    auth: Option<Arc<dyn Authenticator>>,
    session: Arc<Mutex<Session>>,
    options: ClientOptions,
}

impl std::fmt::Debug for TrinoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session();
        f.debug_struct("TrinoClient")
            .field("server", &session.server)
            .field("user", &session.user)
            .field("catalog", &session.catalog)
            .field("schema", &session.schema)
            .finish()
    }
}

impl TrinoClient {
    pub fn new(session: Session) -> Result<Self> {
        Self::with_options(session, ClientOptions::default())
    }

    pub fn with_options(session: Session, options: ClientOptions) -> Result<Self> {
        if options.buffer_bytes == 0 {
            return Err(TrinoError::Usage(
                "page buffer budget must be positive".to_owned(),
            ));
        }
        let http = Arc::new(HttpTransport::new(&options)?);
        let names = HeaderNames::new(&options.header_namespace);
        Ok(Self {
            http,
            names,
            auth: None,
            session: Arc::new(Mutex::new(session)),
            options,
        })
    }

    /// Attaches the authentication collaborator.
    ///
    /// The caller identity must come from exactly one place: a session user
    /// or the collaborator's principal.
    pub fn with_auth(mut self, auth: Arc<dyn Authenticator>) -> Result<Self> {
        let has_user = self.session().user.is_some();
        if has_user && auth.principal().is_some() {
            return Err(TrinoError::Usage(
                "both session user and authenticator principal are set".to_owned(),
            ));
        }
        self.auth = Some(auth);
        Ok(self)
    }

    /// Snapshot of the current session state.
    pub fn session(&self) -> Session {
        self.session
            .lock()
            .expect("session mutex must not be poisoned")
            .clone()
    }

    /// Submits a row-producing statement and returns its stream.
    pub async fn query(&self, sql: &str, params: impl Into<Params>) -> Result<ResultStream> {
        self.start(sql, params.into(), false, CancellationToken::new())
            .await
    }

    /// Like [`TrinoClient::query`], observing an external cancellation token.
    pub async fn query_with_cancel(
        &self,
        sql: &str,
        params: impl Into<Params>,
        cancel: CancellationToken,
    ) -> Result<ResultStream> {
        self.start(sql, params.into(), false, cancel).await
    }

    /// Runs a statement in discard-result mode: the continuation chain is
    /// drained to completion and rows are never buffered.
    pub async fn execute(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<StatementStats> {
        let stream = self
            .start(sql, params.into(), true, CancellationToken::new())
            .await?;
        let stats = stream.read_to_end().await?;
        stream.close().await;
        Ok(stats)
    }

    async fn start(
        &self,
        sql: &str,
        params: Params,
        discard_rows: bool,
        cancel: CancellationToken,
    ) -> Result<ResultStream> {
        let (client, first_page) = StatementClient::submit(
            Arc::clone(&self.http),
            self.names.clone(),
            self.auth.clone(),
            Arc::clone(&self.session),
            self.options.statement_timeout,
            sql,
            params,
        )
        .await?;
        let queue = PageQueue::new(
            Arc::clone(&client),
            discard_rows,
            self.options.buffer_bytes,
            cancel.clone(),
        )?;
        queue.accept(first_page);
        queue.start_read_ahead();
        Ok(ResultStream::new(client, queue, cancel, discard_rows))
    }

    /// Fetches coordinator status from `/v1/info`.
    pub async fn server_info(&self) -> Result<ServerInfo> {
        let server = self.session().server;
        let url = format!("{}/v1/info", server.trim_end_matches('/'));
        let mut request = self.http.client().get(url);
        if let Some(auth) = &self.auth {
            request = auth.attach(request);
        }
        let response = self.http.send(request, &[StatusCode::OK]).await?;
        serde_json::from_str(&response.body).map_err(|err| {
            TrinoError::Protocol(format!("malformed server info response: {err}"))
        })
    }
}

/// Statement lifecycle. `Running` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryState {
    Running = 0,
    ClientError = 1,
    ClientAborted = 2,
    Finished = 3,
}

/// Compare-and-set cell over [`QueryState`]; leaving `Running` is one-way.
pub(crate) struct StateCell(std::sync::atomic::AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(std::sync::atomic::AtomicU8::new(QueryState::Running as u8))
    }

    pub fn get(&self) -> QueryState {
        match self.0.load(Ordering::Acquire) {
            0 => QueryState::Running,
            1 => QueryState::ClientError,
            2 => QueryState::ClientAborted,
            _ => QueryState::Finished,
        }
    }

    /// Transitions `Running -> target`; false when already terminal.
    pub fn transition(&self, target: QueryState) -> bool {
        self.0
            .compare_exchange(
                QueryState::Running as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// One fetched page together with the byte length of its encoded form.
#[derive(Clone)]
pub(crate) struct FetchedPage {
    pub results: Arc<QueryResults>,
    pub encoded_bytes: usize,
}

/// Drives one statement: submission, continuation, cancellation, and the
/// header-driven session delta.
pub(crate) struct StatementClient {
    http: Arc<HttpTransport>,
    names: HeaderNames,
    auth: Option<Arc<dyn Authenticator>>,
    /// Session snapshot taken at submission; request headers never change
    /// mid-statement even if a concurrent statement mutates the shared state.
    snapshot: Session,
    shared_session: Arc<Mutex<Session>>,
    extra_prepared: Option<(String, String)>,
    statement_timeout: Option<Duration>,
    started: Instant,
    state: StateCell,
    timed_out: AtomicBool,
    current: Mutex<Option<Arc<QueryResults>>>,
    columns: Mutex<Option<Arc<Vec<Column>>>>,
    delta: Mutex<SessionDelta>,
    reads: AtomicU32,
    read_delay_ms: AtomicU64,
}

impl StatementClient {
    /// POSTs the statement and parses the first page.
    ///
    /// With parameters, the body is rewritten to `EXECUTE <name> USING …` and
    /// the original SQL travels in an extra prepared-statement header.
    pub async fn submit(
        http: Arc<HttpTransport>,
        names: HeaderNames,
        auth: Option<Arc<dyn Authenticator>>,
        shared_session: Arc<Mutex<Session>>,
        statement_timeout: Option<Duration>,
        sql: &str,
        params: Params,
    ) -> Result<(Arc<Self>, FetchedPage)> {
        if let Some(auth) = &auth {
            auth.validate()?;
        }
        let snapshot = shared_session
            .lock()
            .expect("session mutex must not be poisoned")
            .clone();

        let (body, extra_prepared) = if params.is_empty() {
            (sql.to_owned(), None)
        } else {
            let name = fresh_statement_name();
            let body = build_execute_sql(&name, &params);
            (body, Some((name, sql.to_owned())))
        };

        let client = Arc::new(Self {
            http,
            names,
            auth,
            snapshot,
            shared_session,
            extra_prepared,
            statement_timeout,
            started: Instant::now(),
            state: StateCell::new(),
            timed_out: AtomicBool::new(false),
            current: Mutex::new(None),
            columns: Mutex::new(None),
            delta: Mutex::new(SessionDelta::default()),
            reads: AtomicU32::new(0),
            read_delay_ms: AtomicU64::new(INITIAL_READ_DELAY_MS),
        });

        let url = format!(
            "{}{STATEMENT_PATH}",
            client.snapshot.server.trim_end_matches('/')
        );
        tracing::debug!(%url, "submitting statement");
        let request = client.attach_headers(client.http.client().post(url).body(body));
        let response = client.http.send(request, &[StatusCode::OK]).await?;
        let first_page = client.handle_response(response)?;
        Ok((client, first_page))
    }

    /// Fetches the next page of the continuation chain.
    ///
    /// `Ok(None)` means the chain is exhausted or the statement left
    /// `Running`. Empty responses grow an adaptive read delay so long-planning
    /// statements are not polled tightly.
    pub async fn advance(&self) -> Result<Option<FetchedPage>> {
        let next_uri = match self.continuation_uri() {
            Some(uri) if self.state.get() == QueryState::Running => uri,
            _ => return Ok(None),
        };

        if let Some(limit) = self.timeout_exceeded() {
            self.timed_out.store(true, Ordering::Release);
            self.cancel().await;
            return Err(TrinoError::Timeout(limit));
        }

        let uri = with_target_result_size(&next_uri);
        let request = self.attach_headers(self.http.client().get(uri));
        let response = self.http.send(request, &[StatusCode::OK]).await?;
        let page = self.handle_response(response)?;

        let reads = self.reads.fetch_add(1, Ordering::AcqRel) + 1;
        if page.results.row_count() == 0 && page.results.next_uri.is_some() {
            if reads > READS_BEFORE_DELAY {
                let delay = self.read_delay_ms.load(Ordering::Acquire);
                tracing::debug!(delay_ms = delay, "empty page, pacing next poll");
                sleep(Duration::from_millis(delay)).await;
                let grown = ((delay as f64 * READ_DELAY_FACTOR) as u64).min(MAX_READ_DELAY_MS);
                self.read_delay_ms.store(grown, Ordering::Release);
            }
        }

        Ok(Some(page))
    }

    /// Aborts the statement. The DELETE is issued from a spawned task so it
    /// reaches the server even when the caller's future is dropped mid-cancel.
    pub async fn cancel(&self) -> bool {
        if self.state.transition(QueryState::ClientAborted) {
            if let Some(uri) = self.continuation_uri() {
                tracing::debug!(%uri, "canceling statement");
                let request = self.attach_headers(self.http.client().delete(uri));
                let http = Arc::clone(&self.http);
                let task = tokio::spawn(async move {
                    let expected = [StatusCode::OK, StatusCode::NO_CONTENT];
                    if let Err(err) = http.send(request, &expected).await {
                        tracing::warn!(error = %err, "statement cancel request failed");
                    }
                });
                let _ = task.await;
            }
        }
        self.state.get() == QueryState::ClientAborted
    }

    /// Applies the accumulated session delta and leaves `Running`.
    fn finish(&self) {
        if self.state.transition(QueryState::Finished) {
            let delta = std::mem::take(
                &mut *self.delta.lock().expect("delta mutex must not be poisoned"),
            );
            let mut session = self
                .shared_session
                .lock()
                .expect("session mutex must not be poisoned");
            *session = session.merge(&delta);
        }
    }

    fn handle_response(&self, response: RawResponse) -> Result<FetchedPage> {
        {
            let mut delta = self.delta.lock().expect("delta mutex must not be poisoned");
            parse_response_headers(&self.names, &response.headers, &mut delta)?;
        }

        let results: QueryResults = serde_json::from_str(&response.body).map_err(|err| {
            TrinoError::Protocol(format!(
                "malformed statement response: {err}; body: {}",
                response.body
            ))
        })?;
        let results = Arc::new(results);

        if let Some(columns) = &results.columns {
            let mut slot = self.columns.lock().expect("columns mutex must not be poisoned");
            if slot.is_none() {
                *slot = Some(Arc::new(columns.clone()));
            }
        }
        *self.current.lock().expect("current mutex must not be poisoned") =
            Some(Arc::clone(&results));

        if let Some(error) = &results.error {
            self.state.transition(QueryState::ClientError);
            return Err(TrinoError::server(error.clone()));
        }

        if results.next_uri.is_none() {
            self.finish();
        }

        Ok(FetchedPage {
            encoded_bytes: response.body.len(),
            results,
        })
    }

    fn attach_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        let names = &self.names;
        let session = &self.snapshot;

        request = request
            .header(reqwest::header::USER_AGENT, self.user_agent())
            .header(names.user.as_str(), self.effective_user())
            .header(names.client_capabilities.as_str(), CLIENT_CAPABILITIES);

        let singles: [(&str, &Option<String>); 8] = [
            (&names.source, &session.source),
            (&names.client_info, &session.client_info),
            (&names.trace_token, &session.trace_token),
            (&names.catalog, &session.catalog),
            (&names.schema, &session.schema),
            (&names.path, &session.path),
            (&names.time_zone, &session.time_zone),
            (&names.language, &session.locale),
        ];
        for (name, value) in singles {
            if let Some(value) = value {
                request = request.header(name, value.as_str());
            }
        }

        if !session.client_tags.is_empty() {
            request = request.header(names.client_tags.as_str(), session.client_tags.join(","));
        }
        if let Some(id) = &session.transaction_id {
            request = request.header(names.transaction_id.as_str(), id.as_str());
        }

        for (key, value) in &session.properties {
            request = request.header(
                names.session.as_str(),
                format!("{key}={}", urlencoding::encode(value)),
            );
        }
        for (key, value) in &session.resource_estimates {
            request = request.header(
                names.resource_estimate.as_str(),
                format!("{key}={}", urlencoding::encode(value)),
            );
        }
        for (catalog, role) in &session.roles {
            request = request.header(
                names.role.as_str(),
                format!("{catalog}={}", urlencoding::encode(&role.to_string())),
            );
        }
        for (key, value) in &session.extra_credentials {
            request = request.header(
                names.extra_credential.as_str(),
                format!("{key}={}", urlencoding::encode(value)),
            );
        }

        let prepared = session
            .prepared_statements
            .iter()
            .map(|(name, sql)| (name.as_str(), sql.as_str()))
            .chain(
                self.extra_prepared
                    .iter()
                    .map(|(name, sql)| (name.as_str(), sql.as_str())),
            );
        for (name, sql) in prepared {
            request = request.header(
                names.prepared_statement.as_str(),
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(sql)
                ),
            );
        }

        for (name, value) in &session.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(auth) = &self.auth {
            request = auth.attach(request);
        }
        request
    }

    /// The caller identity: explicit user, else the auth collaborator's
    /// principal, else the default agent string.
    fn effective_user(&self) -> String {
        if let Some(user) = &self.snapshot.user {
            return user.clone();
        }
        if let Some(principal) = self.auth.as_deref().and_then(Authenticator::principal) {
            return principal.to_owned();
        }
        USER_AGENT.to_owned()
    }

    fn user_agent(&self) -> String {
        match &self.snapshot.source {
            Some(source) => format!("{USER_AGENT} {source}"),
            None => USER_AGENT.to_owned(),
        }
    }

    fn continuation_uri(&self) -> Option<String> {
        self.current
            .lock()
            .expect("current mutex must not be poisoned")
            .as_ref()
            .and_then(|results| results.next_uri.clone())
    }

    fn timeout_exceeded(&self) -> Option<Duration> {
        self.statement_timeout
            .filter(|limit| self.started.elapsed() >= *limit)
    }

    pub fn state(&self) -> QueryState {
        self.state.get()
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    pub fn current(&self) -> Option<Arc<QueryResults>> {
        self.current
            .lock()
            .expect("current mutex must not be poisoned")
            .clone()
    }

    pub fn columns(&self) -> Option<Arc<Vec<Column>>> {
        self.columns
            .lock()
            .expect("columns mutex must not be poisoned")
            .clone()
    }

    /// True while a continuation URI remains to be fetched.
    pub fn has_continuation(&self) -> bool {
        self.current()
            .map_or(true, |results| results.next_uri.is_some())
    }
}

/// Appends the result-size hint once the statement reaches its executing
/// phase, preserving any query string already present.
fn with_target_result_size(uri: &str) -> String {
    if !uri.contains("/executing") {
        return uri.to_owned();
    }
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{separator}{TARGET_RESULT_SIZE}")
}

/// Folds one response's session-mutation headers into the delta.
fn parse_response_headers(
    names: &HeaderNames,
    headers: &HeaderMap,
    delta: &mut SessionDelta,
) -> Result<()> {
    let single = |name: &str| -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };

    if let Some(catalog) = single(&names.set_catalog) {
        delta.set_catalog = Some(catalog);
    }
    if let Some(schema) = single(&names.set_schema) {
        delta.set_schema = Some(schema);
    }
    if let Some(path) = single(&names.set_path) {
        delta.set_path = Some(path);
    }
    if let Some(user) = single(&names.set_authorization_user) {
        delta.set_authorization_user = Some(user);
    }
    if single(&names.reset_authorization_user).as_deref() == Some("true") {
        delta.reset_authorization_user = true;
    }
    if let Some(id) = single(&names.started_transaction_id) {
        delta.started_transaction_id = Some(id);
    }
    if single(&names.clear_transaction_id).is_some() {
        delta.clear_transaction_id = true;
    }

    for value in headers.get_all(names.set_session.as_str()) {
        let Ok(text) = value.to_str() else { continue };
        match split_header_pair(text) {
            Some((key, value)) => {
                delta.set_properties.insert(key, value);
            }
            None => tracing::warn!(header = text, "ignoring malformed set-session header"),
        }
    }
    for value in headers.get_all(names.clear_session.as_str()) {
        if let Ok(text) = value.to_str() {
            delta.clear_properties.push(text.trim().to_owned());
        }
    }
    for value in headers.get_all(names.added_prepare.as_str()) {
        let text = value
            .to_str()
            .map_err(|_| TrinoError::Protocol("non-ascii added-prepare header".to_owned()))?;
        let (name, sql) = split_header_pair(text).ok_or_else(|| {
            TrinoError::Protocol(format!("malformed added-prepare header '{text}'"))
        })?;
        delta.added_prepared.insert(name, sql);
    }
    for value in headers.get_all(names.deallocated_prepare.as_str()) {
        let text = value.to_str().map_err(|_| {
            TrinoError::Protocol("non-ascii deallocated-prepare header".to_owned())
        })?;
        // Same name=url(sql) shape as added-prepare; only the name is retained.
        let (name, _sql) = split_header_pair(text).ok_or_else(|| {
            TrinoError::Protocol(format!("malformed deallocated-prepare header '{text}'"))
        })?;
        delta.deallocated_prepared.push(name);
    }
    Ok(())
}

/// Splits `key=url(value)`, decoding the value.
fn split_header_pair(text: &str) -> Option<(String, String)> {
    let (key, value) = text.split_once('=')?;
    let key = urlencoding::decode(key.trim()).ok()?;
    let value = urlencoding::decode(value.trim()).ok()?;
    Some((key.into_owned(), value.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::{parse_response_headers, with_target_result_size, QueryState, StateCell};
    use crate::headers::HeaderNames;
    use crate::session::SessionDelta;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

    #[test]
    fn state_transitions_are_one_way() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), QueryState::Running);
        assert!(cell.transition(QueryState::Finished));
        assert!(!cell.transition(QueryState::ClientAborted));
        assert_eq!(cell.get(), QueryState::Finished);
    }

    #[test]
    fn target_result_size_only_on_executing_uris() {
        assert_eq!(
            with_target_result_size("http://h/v1/statement/executing/q/1"),
            "http://h/v1/statement/executing/q/1?targetResultSize=5MB"
        );
        assert_eq!(
            with_target_result_size("http://h/v1/statement/executing/q/1?slug=s"),
            "http://h/v1/statement/executing/q/1?slug=s&targetResultSize=5MB"
        );
        assert_eq!(
            with_target_result_size("http://h/v1/statement/queued/q/1"),
            "http://h/v1/statement/queued/q/1"
        );
    }

    fn header_map(entries: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in entries {
            headers.append(
                name.parse::<HeaderName>().expect("valid header name"),
                HeaderValue::from_str(value).expect("valid header value"),
            );
        }
        headers
    }

    #[test]
    fn collects_session_delta_from_headers() {
        let names = HeaderNames::default();
        let headers = header_map(&[
            ("x-trino-set-catalog", "tpch"),
            ("x-trino-set-schema", "sf10"),
            ("x-trino-set-session", "writer_min_size=64MB"),
            ("x-trino-set-session", "scale=0%2E5"),
            ("x-trino-added-prepare", "q1=select%201"),
            ("x-trino-deallocated-prepare", "q0=select%200"),
            ("x-trino-set-authorization-user", "bob"),
            ("x-trino-reset-authorization-user", "true"),
        ]);

        let mut delta = SessionDelta::default();
        parse_response_headers(&names, &headers, &mut delta).expect("must parse");

        assert_eq!(delta.set_catalog.as_deref(), Some("tpch"));
        assert_eq!(delta.set_schema.as_deref(), Some("sf10"));
        assert_eq!(delta.set_properties["writer_min_size"], "64MB");
        assert_eq!(delta.set_properties["scale"], "0.5");
        assert_eq!(delta.added_prepared["q1"], "select 1");
        assert_eq!(delta.deallocated_prepared, vec!["q0".to_owned()]);
        assert_eq!(delta.set_authorization_user.as_deref(), Some("bob"));
        assert!(delta.reset_authorization_user);
    }

    #[test]
    fn malformed_added_prepare_is_fatal() {
        let names = HeaderNames::default();
        let headers = header_map(&[("x-trino-added-prepare", "no-separator")]);
        let mut delta = SessionDelta::default();
        assert!(parse_response_headers(&names, &headers, &mut delta).is_err());
    }

    #[test]
    fn malformed_deallocated_prepare_is_fatal() {
        let names = HeaderNames::default();
        let headers = header_map(&[("x-trino-deallocated-prepare", "no-separator")]);
        let mut delta = SessionDelta::default();
        assert!(parse_response_headers(&names, &headers, &mut delta).is_err());
    }

    #[test]
    fn malformed_set_session_is_skipped() {
        let names = HeaderNames::default();
        let headers = header_map(&[("x-trino-set-session", "no-separator")]);
        let mut delta = SessionDelta::default();
        parse_response_headers(&names, &headers, &mut delta).expect("must not fail");
        assert!(delta.set_properties.is_empty());
    }
}
