use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::models::chat::{ChatMessage, SessionId};
use crate::services::report::{ReportFormat, ReportRenderer};
use crate::utils::error::{ApiError, LlmError};

use super::cache::SessionStore;
use super::context_builder::ContextBuilder;

/// Trait for the chat-completion backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Result of one successful exchange
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub request_id: String,
    pub reply: String,
    pub token_count: usize,
    pub history_included: usize,
    pub turns_trimmed: usize,
}

/// Runs queries end to end: context assembly, completion, history update.
///
/// Exchanges on the same session are serialized through a per-session gate
/// held from context assembly until the reply is recorded, so a request
/// never builds its context from history that another in-flight request is
/// about to change. Different sessions run concurrently.
pub struct ConversationManager {
    store: SessionStore,
    context_builder: ContextBuilder,
    llm_provider: Arc<dyn CompletionProvider>,
    logger: ActivityLogger,
    gates: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl ConversationManager {
    pub fn new(
        store: SessionStore,
        context_builder: ContextBuilder,
        llm_provider: Arc<dyn CompletionProvider>,
        logger: ActivityLogger,
    ) -> Self {
        Self {
            store,
            context_builder,
            llm_provider,
            logger,
            gates: DashMap::new(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn gate(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.gates
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn ask(&self, session_id: &str, query: &str) -> Result<AskOutcome, ApiError> {
        if query.trim().is_empty() {
            return Err(ApiError::BadRequest("query must not be empty".to_string()));
        }

        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();

        let gate = self.gate(session_id);
        let _guard = gate.lock().await;

        if !self.store.contains(session_id) {
            self.logger.log(
                ActivityLog::builder(session_id, ActivityType::SessionCreated)
                    .request_id(&request_id)
                    .build(),
            );
        }

        let history = self.store.get_or_create(session_id);
        let window = self.context_builder.build(&history, query);

        info!(
            "Ask: session={}, request={}, query_len={}, history={}, included={}, tokens={}",
            session_id,
            request_id,
            query.len(),
            history.len(),
            window.history_included,
            window.token_count
        );

        self.logger.log(
            ActivityLog::builder(session_id, ActivityType::RequestReceived)
                .request_id(&request_id)
                .token_count(window.token_count)
                .history_included(window.history_included)
                .build(),
        );

        if window.over_budget(self.context_builder.max_context_tokens()) {
            self.logger.log(
                ActivityLog::builder(session_id, ActivityType::TokenOverflow)
                    .request_id(&request_id)
                    .status(ActivityStatus::Warning)
                    .token_count(window.token_count)
                    .build(),
            );
        }

        let reply = match self.llm_provider.complete(&window.messages).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Completion failed for session {}: {}", session_id, e);
                self.logger.log(
                    ActivityLog::builder(session_id, ActivityType::LlmError)
                        .request_id(&request_id)
                        .processing_time_ms(start.elapsed().as_millis() as u64)
                        .error(e.to_string())
                        .build(),
                );
                return Err(ApiError::Upstream(e));
            }
        };

        let turns_trimmed = self.store.append_exchange(session_id, query, reply.clone());
        if turns_trimmed > 0 {
            self.logger.log(
                ActivityLog::builder(session_id, ActivityType::SlidingWindowEnforced)
                    .request_id(&request_id)
                    .status(ActivityStatus::Warning)
                    .turns_trimmed(turns_trimmed)
                    .build(),
            );
        }

        let processing_time_ms = start.elapsed().as_millis() as u64;
        self.logger.log(
            ActivityLog::builder(session_id, ActivityType::MessageSent)
                .request_id(&request_id)
                .status(ActivityStatus::Success)
                .token_count(window.token_count)
                .processing_time_ms(processing_time_ms)
                .build(),
        );

        debug!("Ask completed in {}ms", processing_time_ms);

        Ok(AskOutcome {
            request_id,
            reply,
            token_count: window.token_count,
            history_included: window.history_included,
            turns_trimmed,
        })
    }

    /// Render the stored history; `NotFound` for an unknown or empty session.
    /// An unrecognized format yields an empty document.
    pub fn report(&self, session_id: &str, format: Option<ReportFormat>) -> Result<String, ApiError> {
        let history = self
            .store
            .history(session_id)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ApiError::NotFound("No history found".to_string()))?;

        let Some(format) = format else {
            warn!("Unknown report format requested for session {}", session_id);
            return Ok(String::new());
        };

        self.logger.log(
            ActivityLog::builder(session_id, ActivityType::ReportGenerated)
                .status(ActivityStatus::Success)
                .build(),
        );

        Ok(ReportRenderer::render(&history, format))
    }

    fn gate_in_use(&self, session_id: &str) -> bool {
        self.gates
            .get(session_id)
            .is_some_and(|gate| Arc::strong_count(&gate) > 1)
    }

    /// Evict idle sessions and their unused gates. A session with a request
    /// in flight is never evicted.
    pub fn cleanup_expired(&self) -> usize {
        let evicted = self
            .store
            .cleanup_expired(tokio::time::Instant::now(), |id| self.gate_in_use(id));
        for session_id in &evicted {
            self.gates
                .remove_if(session_id, |_, gate| Arc::strong_count(gate) == 1);
            self.logger.log(
                ActivityLog::builder(session_id.as_str(), ActivityType::SessionExpired).build(),
            );
        }
        evicted.len()
    }
}

/// Periodically evict idle sessions. Does nothing when no TTL is configured.
pub fn spawn_session_sweeper(
    manager: Arc<ConversationManager>,
    interval: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    let ttl = manager.store().session_ttl()?;
    info!("Session sweeper started (ttl={:?}, interval={:?})", ttl, interval);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = manager.cleanup_expired();
            if evicted > 0 {
                info!("Session sweeper evicted {} sessions", evicted);
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;
    use crate::services::conversation::token_counter::TokenCounter;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_text(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn manager_with(provider: MockCompletionProvider, logger: ActivityLogger) -> ConversationManager {
        ConversationManager::new(
            SessionStore::default(),
            ContextBuilder::new("sys".to_string(), 8192, Arc::new(WordCounter)),
            Arc::new(provider),
            logger,
        )
    }

    /// Sleeps before echoing so a request stays in flight
    struct SlowProvider {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl CompletionProvider for SlowProvider {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            tokio::time::sleep(self.delay).await;
            Ok(format!("reply to {} messages", messages.len()))
        }
    }

    fn expiring_manager(ttl: Duration, delay: Duration) -> Arc<ConversationManager> {
        Arc::new(ConversationManager::new(
            SessionStore::new(20, Some(ttl)),
            ContextBuilder::new("sys".to_string(), 8192, Arc::new(WordCounter)),
            Arc::new(SlowProvider { delay }),
            ActivityLogger::disabled(),
        ))
    }

    #[tokio::test]
    async fn test_first_exchange_sends_system_and_query() {
        let mut provider = MockCompletionProvider::new();
        provider
            .expect_complete()
            .withf(|messages: &[ChatMessage]| {
                messages == [ChatMessage::system("sys"), ChatMessage::user("write a loop")]
            })
            .times(1)
            .returning(|_| Ok("here is code".to_string()));

        let manager = manager_with(provider, ActivityLogger::disabled());
        let outcome = manager.ask("s1", "write a loop").await.unwrap();

        assert_eq!(outcome.reply, "here is code");
        assert_eq!(outcome.history_included, 0);
        assert_eq!(
            manager.store().history("s1").unwrap(),
            vec![ChatMessage::user("write a loop"), ChatMessage::assistant("here is code")]
        );
    }

    #[tokio::test]
    async fn test_second_exchange_includes_history() {
        let mut provider = MockCompletionProvider::new();
        provider
            .expect_complete()
            .times(2)
            .returning(|messages| Ok(format!("reply to {} messages", messages.len())));

        let manager = manager_with(provider, ActivityLogger::disabled());
        manager.ask("s1", "first").await.unwrap();
        let outcome = manager.ask("s1", "second").await.unwrap();

        assert_eq!(outcome.history_included, 2);
        assert_eq!(outcome.reply, "reply to 4 messages");
    }

    #[tokio::test]
    async fn test_failed_completion_leaves_history_unchanged() {
        let mut provider = MockCompletionProvider::new();
        let mut calls = 0;
        provider.expect_complete().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok("ok".to_string())
            } else {
                Err(LlmError::Status { status: 500, body: "overloaded".to_string() })
            }
        });

        let (logger, events) = ActivityLogger::detached(64);
        let manager = manager_with(provider, logger);
        manager.ask("s1", "one").await.unwrap();
        let before = manager.store().history("s1").unwrap();

        let err = manager.ask("s1", "two").await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(LlmError::Status { status: 500, .. })));
        assert_eq!(manager.store().history("s1").unwrap(), before);

        let kinds: Vec<ActivityType> = events.drain().map(|e| e.activity_type).collect();
        assert!(kinds.contains(&ActivityType::LlmError));
        assert_eq!(kinds.iter().filter(|k| **k == ActivityType::MessageSent).count(), 1);
    }

    #[tokio::test]
    async fn test_failure_on_new_session_records_nothing() {
        let mut provider = MockCompletionProvider::new();
        provider
            .expect_complete()
            .returning(|_| Err(LlmError::Timeout));

        let manager = manager_with(provider, ActivityLogger::disabled());
        assert!(manager.ask("fresh", "hello").await.is_err());

        assert_eq!(manager.store().history("fresh"), Some(Vec::new()));
        assert!(matches!(
            manager.report("fresh", Some(ReportFormat::Markdown)),
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_without_calling_upstream() {
        let mut provider = MockCompletionProvider::new();
        provider.expect_complete().never();

        let manager = manager_with(provider, ActivityLogger::disabled());
        let err = manager.ask("s1", "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(manager.store().is_empty());
    }

    #[tokio::test]
    async fn test_eleven_exchanges_trim_to_twenty() {
        let mut provider = MockCompletionProvider::new();
        provider
            .expect_complete()
            .times(11)
            .returning(|_| Ok("here is code".to_string()));

        let (logger, events) = ActivityLogger::detached(256);
        let manager = manager_with(provider, logger);
        for i in 1..=11 {
            let outcome = manager.ask("s1", &format!("write a loop {i}")).await.unwrap();
            assert_eq!(outcome.turns_trimmed, if i == 11 { 2 } else { 0 });
        }

        let history = manager.store().history("s1").unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0], ChatMessage::user("write a loop 2"));
        assert_eq!(history[19].role, Role::Assistant);

        let trims = events
            .drain()
            .filter(|e| e.activity_type == ActivityType::SlidingWindowEnforced)
            .count();
        assert_eq!(trims, 1);
    }

    #[tokio::test]
    async fn test_report_for_unknown_session_is_not_found() {
        let manager = manager_with(MockCompletionProvider::new(), ActivityLogger::disabled());
        assert!(matches!(
            manager.report("ghost", Some(ReportFormat::Html)),
            Err(ApiError::NotFound(_))
        ));
        assert!(manager.store().is_empty());
    }

    #[tokio::test]
    async fn test_report_unknown_format_is_empty() {
        let mut provider = MockCompletionProvider::new();
        provider.expect_complete().returning(|_| Ok("a".to_string()));

        let manager = manager_with(provider, ActivityLogger::disabled());
        manager.ask("s1", "q").await.unwrap();

        assert_eq!(manager.report("s1", None).unwrap(), "");
        assert!(manager
            .report("s1", Some(ReportFormat::Markdown))
            .unwrap()
            .contains("## User\nq"));
    }

    #[test]
    fn test_cleanup_without_ttl_keeps_sessions() {
        let manager = manager_with(MockCompletionProvider::new(), ActivityLogger::disabled());
        manager.store().append_exchange("s1", "q", "a");
        assert_eq!(manager.cleanup_expired(), 0);
        assert_eq!(manager.store().len(), 1);
    }

    #[tokio::test]
    async fn test_oversize_query_sends_only_system_and_query() {
        let query = vec!["word"; 20].join(" ");
        let expected = vec![ChatMessage::system("sys"), ChatMessage::user(query.clone())];

        let mut provider = MockCompletionProvider::new();
        provider
            .expect_complete()
            .withf(move |messages: &[ChatMessage]| messages == expected.as_slice())
            .times(1)
            .returning(|_| Ok("too long, but answered".to_string()));

        let (logger, events) = ActivityLogger::detached(64);
        let manager = ConversationManager::new(
            SessionStore::default(),
            ContextBuilder::new("sys".to_string(), 10, Arc::new(WordCounter)),
            Arc::new(provider),
            logger,
        );
        manager.store().append_exchange("s1", "q1", "a1");

        let outcome = manager.ask("s1", &query).await.unwrap();
        assert_eq!(outcome.history_included, 0);
        assert_eq!(outcome.token_count, 21);

        let overflow: Vec<ActivityLog> = events
            .drain()
            .filter(|e| e.activity_type == ActivityType::TokenOverflow)
            .collect();
        assert_eq!(overflow.len(), 1);
        assert_eq!(overflow[0].activity_status, ActivityStatus::Warning);
        assert_eq!(manager.store().history("s1").unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_keeps_session_with_request_in_flight() {
        let manager = expiring_manager(Duration::from_millis(100), Duration::from_millis(300));
        manager.store().append_exchange("s", "q1", "a1");
        manager.store().append_exchange("s", "q2", "a2");

        let in_flight = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ask("s", "q3").await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.cleanup_expired(), 0);
        assert!(manager.store().contains("s"));

        in_flight.await.unwrap().unwrap();
        let history = manager.store().history("s").unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(history[0], ChatMessage::user("q1"));

        // Idle again once the reply is recorded
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(manager.cleanup_expired(), 1);
        assert!(!manager.store().contains("s"));
        assert!(!manager.gate_in_use("s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_sessions_on_its_timer() {
        let manager = expiring_manager(Duration::from_secs(60), Duration::ZERO);
        manager.store().append_exchange("s", "q", "a");

        let handle = spawn_session_sweeper(manager.clone(), Duration::from_secs(10))
            .expect("sweeper runs when a ttl is set");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(manager.store().contains("s"));

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(manager.store().is_empty());

        handle.abort();
    }

    #[test]
    fn test_sweeper_not_spawned_without_ttl() {
        let manager = Arc::new(manager_with(MockCompletionProvider::new(), ActivityLogger::disabled()));
        assert!(spawn_session_sweeper(manager, Duration::from_secs(1)).is_none());
    }
}
