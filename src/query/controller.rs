use std::{sync::Arc, time::Duration};

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    executor::Executor,
    models::{Item, PageResult},
    protocol::{self, Action, Command, PAGE_LIMIT},
};

use super::{
    cache::{CachedPage, ResultCache},
    gate::Gate,
    EmptyPagePolicy, QueryState, SessionError, SessionStatus,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub limit: u32,
    /// Upper bound on a single store call.
    pub execute_timeout: Duration,
    pub empty_page_policy: EmptyPagePolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            limit: PAGE_LIMIT,
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
            empty_page_policy: EmptyPagePolicy::Stay,
        }
    }
}

/// Delivered to the listener after every completed transition. Superseded
/// intents produce no event.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub query: QueryState,
    pub outcome: Result<Arc<CachedPage>, SessionError>,
    pub pagination_label: String,
}

/// The UI side of the session. Called with the session lock held, so it must
/// not block on the session; copy what it needs and return.
pub trait QueryListener: Send + Sync + 'static {
    fn on_query_changed(&self, event: &QueryEvent);
}

impl<F> QueryListener for F
where
    F: Fn(&QueryEvent) + Send + Sync + 'static,
{
    fn on_query_changed(&self, event: &QueryEvent) {
        self(event)
    }
}

/// Everything a renderer needs, taken in one step.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub query: QueryState,
    pub page: Arc<CachedPage>,
    pub last_error: Option<SessionError>,
    pub pagination_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Select,
    Search,
    DeleteThenSearch(i64),
}

#[derive(Debug, Clone)]
struct Retry {
    target: QueryState,
    plan: Plan,
}

struct Ticket {
    generation: u64,
    token: CancellationToken,
    target: QueryState,
    plan: Plan,
}

struct SessionInner {
    status: SessionStatus,
    query: QueryState,
    cache: ResultCache,
    generation: u64,
    in_flight: Option<CancellationToken>,
    last_error: Option<SessionError>,
    failed: Option<Retry>,
}

impl SessionInner {
    fn new(limit: u32) -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            query: QueryState::new(limit),
            cache: ResultCache::new(),
            generation: 0,
            in_flight: None,
            last_error: None,
            failed: None,
        }
    }

    /// Status to fall back to when nothing is in flight.
    fn resting_status(&self) -> SessionStatus {
        if self.cache.is_loaded() {
            SessionStatus::Idle
        } else {
            SessionStatus::Uninitialized
        }
    }

    fn pagination_label(&self) -> String {
        self.query.pagination_label(self.cache.count())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            query: self.query.clone(),
            page: self.cache.snapshot(),
            last_error: self.last_error.clone(),
            pagination_label: self.pagination_label(),
        }
    }
}

/// Owns the query window and the result cache, turns user intents into store
/// commands and keeps the cache in step with the last successful response.
///
/// Cheap to clone; all clones drive the same session. `new_search` supersedes
/// whatever is in flight, and the superseded result is dropped when it
/// arrives. Paging, delete, refresh and retry need an idle session. Query
/// window changes are committed only together with the page they produced.
#[derive(Clone)]
pub struct QuerySession {
    inner: Arc<Mutex<SessionInner>>,
    executor: Arc<dyn Executor>,
    gate: Gate,
    options: SessionOptions,
    listener: Option<Arc<dyn QueryListener>>,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
}

impl QuerySession {
    pub fn new(executor: Arc<dyn Executor>, gate: Gate, options: SessionOptions) -> Self {
        let inner = SessionInner::new(options.limit);
        let (snapshots, _) = watch::channel(inner.snapshot());

        Self {
            inner: Arc::new(Mutex::new(inner)),
            executor,
            gate,
            options,
            listener: None,
            snapshots: Arc::new(snapshots),
        }
    }

    pub fn with_listener(mut self, listener: impl QueryListener) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Receives a fresh snapshot on every status change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    /// Passes the gate, then loads the first page of everything.
    pub async fn start(&self) -> Result<Arc<CachedPage>, SessionError> {
        self.authorize().await?;
        let ticket = self
            .begin("start", &[SessionStatus::Uninitialized], Plan::Select, |inner| {
                Ok(QueryState::new(inner.query.limit))
            })
            .await?;
        self.run(ticket).await
    }

    /// Searches for `text` from the first page, superseding any intent still
    /// in flight.
    pub async fn new_search(&self, text: &str) -> Result<Arc<CachedPage>, SessionError> {
        self.authorize().await?;
        let ticket = self
            .begin(
                "search",
                &[
                    SessionStatus::Uninitialized,
                    SessionStatus::Idle,
                    SessionStatus::Awaiting,
                ],
                Plan::Search,
                |inner| Ok(inner.query.with_search(text)),
            )
            .await?;
        self.run(ticket).await
    }

    pub async fn next_page(&self) -> Result<Arc<CachedPage>, SessionError> {
        let ticket = self
            .begin("go to the next page", &[SessionStatus::Idle], Plan::Search, |inner| {
                Ok(inner.query.advanced())
            })
            .await?;
        self.run(ticket).await
    }

    pub async fn prev_page(&self) -> Result<Arc<CachedPage>, SessionError> {
        let ticket = self
            .begin(
                "go to the previous page",
                &[SessionStatus::Idle],
                Plan::Search,
                |inner| Ok(inner.query.retreated()),
            )
            .await?;
        self.run(ticket).await
    }

    /// Deletes `row_id`, then re-runs the current search at the current offset
    /// so the cache and count reflect the deletion.
    pub async fn delete(&self, row_id: i64) -> Result<Arc<CachedPage>, SessionError> {
        let ticket = self
            .begin(
                "delete",
                &[SessionStatus::Idle],
                Plan::DeleteThenSearch(row_id),
                |inner| Ok(inner.query.clone()),
            )
            .await?;
        self.run(ticket).await
    }

    /// Re-runs the current search unchanged.
    pub async fn refresh(&self) -> Result<Arc<CachedPage>, SessionError> {
        let ticket = self
            .begin("refresh", &[SessionStatus::Idle], Plan::Search, |inner| {
                Ok(inner.query.clone())
            })
            .await?;
        self.run(ticket).await
    }

    /// Re-issues the intent that failed last, with the window it asked for.
    pub async fn retry(&self) -> Result<Arc<CachedPage>, SessionError> {
        self.authorize().await?;

        let mut plan = Plan::Search;
        {
            let inner = self.inner.lock().await;
            if let Some(failed) = &inner.failed {
                plan = failed.plan;
            }
        }

        let ticket = self
            .begin(
                "retry",
                &[SessionStatus::Uninitialized, SessionStatus::Idle],
                plan,
                |inner| match &inner.failed {
                    Some(failed) if failed.plan == plan => Ok(failed.target.clone()),
                    _ => Err(SessionError::InvalidTransition {
                        intent: "retry",
                        status: inner.status,
                    }),
                },
            )
            .await?;
        self.run(ticket).await
    }

    /// Abandons the intent in flight, if any. The session keeps its last page.
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(token) = inner.in_flight.take() {
            token.cancel();
            inner.generation += 1;
            inner.status = inner.resting_status();
            log_debug!("cancelled in-flight query");
            self.publish(&inner);
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.lock().await.status
    }

    pub async fn query_state(&self) -> QueryState {
        self.inner.lock().await.query.clone()
    }

    /// The current page; unchanged by failed or superseded intents.
    pub async fn page(&self) -> Arc<CachedPage> {
        self.inner.lock().await.cache.snapshot()
    }

    pub async fn count(&self) -> u64 {
        self.inner.lock().await.cache.count()
    }

    pub async fn get_by_row_id(&self, row_id: i64) -> Option<Item> {
        self.inner.lock().await.cache.get_by_row_id(row_id).cloned()
    }

    pub async fn last_error(&self) -> Option<SessionError> {
        self.inner.lock().await.last_error.clone()
    }

    pub async fn current_pagination_label(&self) -> String {
        self.inner.lock().await.pagination_label()
    }

    pub async fn has_next_page(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.query.has_next_page(inner.cache.count())
    }

    pub async fn has_previous_page(&self) -> bool {
        self.inner.lock().await.query.has_previous_page()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().await.snapshot()
    }

    async fn authorize(&self) -> Result<(), SessionError> {
        if let Err(err) = self.gate.authorize().await {
            let mut inner = self.inner.lock().await;
            inner.last_error = Some(err.clone());
            self.notify(&inner, Err(err.clone()));
            self.publish(&inner);
            return Err(err);
        }
        Ok(())
    }

    async fn begin<F>(
        &self,
        intent: &'static str,
        allowed: &[SessionStatus],
        plan: Plan,
        target: F,
    ) -> Result<Ticket, SessionError>
    where
        F: FnOnce(&SessionInner) -> Result<QueryState, SessionError>,
    {
        let mut inner = self.inner.lock().await;
        if !allowed.contains(&inner.status) {
            return Err(SessionError::InvalidTransition {
                intent,
                status: inner.status,
            });
        }

        let target = target(&*inner)?;

        if let Some(previous) = inner.in_flight.take() {
            log_debug!("generation {} superseded by {intent}", inner.generation);
            previous.cancel();
        }

        inner.generation += 1;
        let token = CancellationToken::new();
        inner.in_flight = Some(token.clone());
        inner.status = SessionStatus::Awaiting;
        self.publish(&inner);

        log_debug!(
            "{intent}: generation {} query {:?} offset {}",
            inner.generation,
            target.query_text,
            target.offset
        );

        Ok(Ticket {
            generation: inner.generation,
            token,
            target,
            plan,
        })
    }

    async fn run(&self, ticket: Ticket) -> Result<Arc<CachedPage>, SessionError> {
        let outcome = self.execute_plan(&ticket).await;
        self.settle(ticket, outcome).await
    }

    async fn execute_plan(&self, ticket: &Ticket) -> Result<(QueryState, PageResult), SessionError> {
        let mut target = ticket.target.clone();

        let action = match ticket.plan {
            Plan::Select => Action::Select,
            Plan::Search => Action::Search,
            Plan::DeleteThenSearch(row_id) => {
                let delete = protocol::build(
                    Action::Delete,
                    &target.query_text,
                    Some(row_id),
                    target.limit,
                    target.offset,
                )?;
                let reply = self.dispatch(&ticket.token, &delete).await?;
                protocol::check_ack(&reply)?;
                log_info!("deleted row {row_id}");
                Action::Search
            }
        };

        let mut page = self.fetch(&ticket.token, action, &target).await?;

        if self.options.empty_page_policy == EmptyPagePolicy::Retreat {
            while page.is_empty() && target.offset > 0 {
                target = target.retreated();
                log_debug!("empty page, retreating to offset {}", target.offset);
                page = self.fetch(&ticket.token, Action::Search, &target).await?;
            }
        }

        Ok((target, page))
    }

    async fn fetch(
        &self,
        token: &CancellationToken,
        action: Action,
        target: &QueryState,
    ) -> Result<PageResult, SessionError> {
        let command = protocol::build(action, &target.query_text, None, target.limit, target.offset)?;
        let reply = self.dispatch(token, &command).await?;
        Ok(protocol::parse_page(&reply, target.limit)?)
    }

    /// Runs one blocking store call off the async threads, bounded by the
    /// configured timeout and abandoned as soon as `token` is cancelled.
    async fn dispatch(
        &self,
        token: &CancellationToken,
        command: &Command,
    ) -> Result<String, SessionError> {
        let wire = command.encode()?;
        let executor = self.executor.clone();
        let call = tokio::task::spawn_blocking(move || executor.execute(&wire));
        let limit = self.options.execute_timeout;

        tokio::select! {
            _ = token.cancelled() => Err(SessionError::Superseded),
            result = tokio::time::timeout(limit, call) => match result {
                Ok(Ok(reply)) => {
                    log_debug!(
                        "{} answered with {} bytes",
                        command.action().as_str(),
                        reply.len()
                    );
                    Ok(reply)
                }
                Ok(Err(join_err)) => Err(SessionError::Executor(join_err.to_string())),
                Err(_) => Err(SessionError::Timeout(limit)),
            },
        }
    }

    async fn settle(
        &self,
        ticket: Ticket,
        outcome: Result<(QueryState, PageResult), SessionError>,
    ) -> Result<Arc<CachedPage>, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.generation != ticket.generation {
            log_debug!("dropping result of superseded generation {}", ticket.generation);
            return Err(SessionError::Superseded);
        }

        inner.in_flight = None;
        let result = match outcome {
            Ok((query, page)) => {
                inner.query = query;
                let page = inner.cache.replace(page);
                inner.status = SessionStatus::Idle;
                inner.last_error = None;
                inner.failed = None;
                Ok(page)
            }
            Err(err) => {
                log_warn!("query failed, keeping previous page: {err}");
                inner.status = inner.resting_status();
                inner.last_error = Some(err.clone());
                inner.failed = Some(Retry {
                    target: ticket.target,
                    plan: ticket.plan,
                });
                Err(err)
            }
        };

        self.notify(&inner, result.clone());
        self.publish(&inner);
        result
    }

    fn notify(&self, inner: &SessionInner, outcome: Result<Arc<CachedPage>, SessionError>) {
        if let Some(listener) = &self.listener {
            let event = QueryEvent {
                query: inner.query.clone(),
                outcome,
                pagination_label: inner.pagination_label(),
            };
            listener.on_query_changed(&event);
        }
    }

    fn publish(&self, inner: &SessionInner) {
        self.snapshots.send_replace(inner.snapshot());
    }
}
