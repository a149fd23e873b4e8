//! Conversation Manager
//!
//! Turns independent inbound chat messages into one coherent, stateful
//! planning conversation per session: it acknowledges receipt, serializes
//! turns per session, consults the planning oracle with the fixed directive
//! and the session history, and commits or discards the exchange.

use crate::{
    chat::{ChatAcknowledgement, ChatMessage, Inbound},
    oracle::{OracleError, PlanningOracle},
    phase::Phase,
    prompt,
    session::{Role, SessionKey, SessionStore, Turn},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Something the agent sends back to a sender.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Ack(ChatAcknowledgement),
    Reply(ChatMessage),
}

/// Delivery side of the transport.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn deliver(&self, recipient: &str, outbound: Outbound) -> anyhow::Result<()>;
}

/// An [`Outbox`] that keeps everything it is given, stamped with the time of
/// delivery.
#[derive(Default)]
pub struct CollectingOutbox {
    delivered: std::sync::Mutex<Vec<(String, Outbound, Instant)>>,
}

impl CollectingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in delivery order.
    pub fn take(&self) -> Vec<(String, Outbound, Instant)> {
        match self.delivered.lock() {
            Ok(mut delivered) => std::mem::take(&mut *delivered),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl Outbox for CollectingOutbox {
    async fn deliver(&self, recipient: &str, outbound: Outbound) -> anyhow::Result<()> {
        self.delivered
            .lock()
            .map_err(|_| anyhow::anyhow!("collecting outbox poisoned"))?
            .push((recipient.to_string(), outbound, Instant::now()));
        Ok(())
    }
}

/// One inbound message, already validated by the transport boundary.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub session: SessionKey,
    pub sender: String,
    pub msg_id: Uuid,
    pub ack_required: bool,
    pub body: Inbound,
}

impl Envelope {
    /// Builds an envelope for a chat message. Returns `None` when the message
    /// carries nothing the agent can act on.
    pub fn from_chat(
        session: SessionKey,
        sender: impl Into<String>,
        msg: &ChatMessage,
        ack_required: bool,
    ) -> Option<Self> {
        Some(Self {
            session,
            sender: sender.into(),
            msg_id: msg.msg_id,
            ack_required,
            body: Inbound::from_chat(msg)?,
        })
    }
}

/// Bounds on the context sent to the oracle. Stored history is never trimmed.
#[derive(Debug, Clone, Default)]
pub struct ConversationSettings {
    /// Keep only the last K turns of history in each request.
    pub history_window: Option<usize>,
    /// Truncate each history turn to this many characters.
    pub max_turn_chars: Option<usize>,
}

impl ConversationSettings {
    /// Applies the window and truncation to a history snapshot.
    pub fn context(&self, history: &[Turn]) -> Vec<Turn> {
        let start = self
            .history_window
            .map_or(0, |window| history.len().saturating_sub(window));
        history[start..]
            .iter()
            .map(|turn| match self.max_turn_chars {
                Some(limit) if turn.content.chars().count() > limit => Turn {
                    content: turn.content.chars().take(limit).collect(),
                    ..turn.clone()
                },
                _ => turn.clone(),
            })
            .collect()
    }
}

/// Why a planning turn produced no assistant reply.
#[derive(Debug, thiserror::Error)]
enum TurnError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Session(#[from] crate::session::SessionError),
}

pub struct ConversationManager {
    store: Arc<dyn SessionStore>,
    oracle: Arc<dyn PlanningOracle>,
    system_prompt: Arc<String>,
    settings: ConversationSettings,
    session_locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl ConversationManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        oracle: Arc<dyn PlanningOracle>,
        system_prompt: Arc<String>,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            system_prompt,
            settings,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Acknowledges (if required) and then processes one inbound message.
    ///
    /// Never fails: oracle and store errors become a reply to the sender.
    pub async fn handle_message(&self, envelope: Envelope, outbox: &dyn Outbox) {
        self.acknowledge(&envelope, outbox).await;
        self.process(envelope, outbox).await;
    }

    /// Emits the acknowledgement for `envelope` if the sender asked for one.
    pub async fn acknowledge(&self, envelope: &Envelope, outbox: &dyn Outbox) {
        if envelope.ack_required {
            let ack = ChatAcknowledgement::for_message(envelope.msg_id);
            send(outbox, &envelope.sender, Outbound::Ack(ack)).await;
        }
    }

    /// Processes an already-acknowledged message.
    #[instrument(skip_all, fields(session = %envelope.session, sender = %envelope.sender))]
    pub async fn process(&self, envelope: Envelope, outbox: &dyn Outbox) {
        let reply = match &envelope.body {
            Inbound::StartSession => {
                info!("Session started");
                self.store.get_or_create(&envelope.session).await;
                ChatMessage::text(prompt::WELCOME_MESSAGE)
            }
            Inbound::EndSession => {
                info!("Session ended");
                ChatMessage::closing(prompt::FAREWELL_MESSAGE)
            }
            Inbound::Text(text) => match self.converse(&envelope.session, text).await {
                Ok(answer) => ChatMessage::text(answer),
                Err(TurnError::Oracle(e)) => {
                    warn!(error = %e, "Planning oracle unavailable; history left unchanged");
                    ChatMessage::text(prompt::ORACLE_FAILURE_MESSAGE)
                }
                Err(TurnError::Session(e)) => {
                    error!(error = %e, "Session invariant violated");
                    ChatMessage::text(prompt::INTERNAL_FAILURE_MESSAGE)
                }
            },
        };
        send(outbox, &envelope.sender, Outbound::Reply(reply)).await;
    }

    /// Runs one planning exchange under the session's lock.
    ///
    /// The user turn and the assistant turn are committed together only after
    /// the oracle answers, so a failed attempt leaves the history untouched.
    async fn converse(&self, key: &SessionKey, text: &str) -> Result<String, TurnError> {
        let _turn_guard = self.lock_session(key).await;

        let history = self.store.get_or_create(key).await;
        let phase = Phase::detect(text);
        info!(
            phase = %phase.map_or_else(|| "general".to_string(), |p| p.to_string()),
            phase_ordinal = phase.map_or(0, Phase::ordinal),
            history_len = history.len(),
            "Planning turn"
        );

        let context = self.settings.context(&history);
        let reply = self.oracle.plan(&self.system_prompt, &context, text).await?;

        self.store.append(key, Role::User, text).await?;
        self.store.append(key, Role::Assistant, &reply.text).await?;
        info!(reply_len = reply.text.len(), "Planning turn committed");
        Ok(reply.text)
    }

    /// Serializes turns within one session; different sessions never contend.
    async fn lock_session(&self, key: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.session_locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

async fn send(outbox: &dyn Outbox, recipient: &str, outbound: Outbound) {
    if let Err(e) = outbox.deliver(recipient, outbound).await {
        error!(recipient, error = ?e, "Failed to deliver outbound message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatContent;
    use crate::oracle::{MockPlanningOracle, PlanReply};
    use crate::session::InMemorySessionStore;
    use std::time::Duration;

    /// Replies "OK: <n>" where n counts the prior turns plus the new message.
    struct CountingOracle;

    #[async_trait]
    impl PlanningOracle for CountingOracle {
        async fn plan(
            &self,
            _system_prompt: &str,
            history: &[Turn],
            _new_message: &str,
        ) -> Result<PlanReply, OracleError> {
            Ok(PlanReply {
                text: format!("OK: {}", history.len() + 1),
            })
        }
    }

    /// Answers after a fixed delay, echoing the message.
    struct SlowOracle(Duration);

    #[async_trait]
    impl PlanningOracle for SlowOracle {
        async fn plan(
            &self,
            _system_prompt: &str,
            _history: &[Turn],
            new_message: &str,
        ) -> Result<PlanReply, OracleError> {
            tokio::time::sleep(self.0).await;
            Ok(PlanReply {
                text: format!("re: {new_message}"),
            })
        }
    }

    fn manager(oracle: Arc<dyn PlanningOracle>) -> ConversationManager {
        ConversationManager::new(
            Arc::new(InMemorySessionStore::new()),
            oracle,
            Arc::new("directive".to_string()),
            ConversationSettings::default(),
        )
    }

    fn text_envelope(sender: &str, text: &str, ack_required: bool) -> Envelope {
        Envelope {
            session: SessionKey::for_sender(sender),
            sender: sender.to_string(),
            msg_id: Uuid::new_v4(),
            ack_required,
            body: Inbound::Text(text.to_string()),
        }
    }

    fn reply_texts(delivered: &[(String, Outbound, Instant)]) -> Vec<String> {
        delivered
            .iter()
            .filter_map(|(_, outbound, _)| match outbound {
                Outbound::Reply(msg) => msg.first_text().map(str::to_string),
                Outbound::Ack(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_counting_oracle_sequence() {
        let manager = manager(Arc::new(CountingOracle));
        let outbox = CollectingOutbox::new();

        for text in ["one", "two", "three"] {
            manager
                .handle_message(text_envelope("alice", text, false), &outbox)
                .await;
        }

        assert_eq!(
            reply_texts(&outbox.take()),
            vec!["OK: 1", "OK: 3", "OK: 5"]
        );
        let history = manager
            .store()
            .get(&SessionKey::for_sender("alice"))
            .await
            .unwrap();
        assert_eq!(history.len(), 6);
        let roles: Vec<Role> = history.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
        assert_eq!(history[4].content, "three");
        assert_eq!(history[5].content, "OK: 5");
    }

    #[tokio::test]
    async fn test_oracle_timeout_leaves_history_unchanged() {
        let mut mock = MockPlanningOracle::new();
        let mut calls = 0;
        mock.expect_plan().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Ok(PlanReply {
                    text: "first answer".to_string(),
                })
            } else {
                Err(OracleError::Timeout(Duration::from_secs(60)))
            }
        });
        let manager = manager(Arc::new(mock));
        let outbox = CollectingOutbox::new();
        let key = SessionKey::for_sender("alice");

        manager
            .handle_message(text_envelope("alice", "hello", false), &outbox)
            .await;
        let before = manager.store().get(&key).await.unwrap();
        outbox.take();

        manager
            .handle_message(text_envelope("alice", "next", false), &outbox)
            .await;

        let delivered = outbox.take();
        assert_eq!(delivered.len(), 1);
        assert_eq!(reply_texts(&delivered), vec![prompt::ORACLE_FAILURE_MESSAGE]);
        let after = manager.store().get(&key).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn test_oracle_receives_directive_and_prior_history() {
        let mut mock = MockPlanningOracle::new();
        mock.expect_plan()
            .withf(|system, history, new_message| {
                system.to_string() == "directive"
                    && history.is_empty()
                    && new_message.to_string() == "I'm new here"
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(PlanReply {
                    text: "Welcome".to_string(),
                })
            });
        let manager = manager(Arc::new(mock));
        let outbox = CollectingOutbox::new();

        manager
            .handle_message(text_envelope("alice", "I'm new here", false), &outbox)
            .await;

        assert_eq!(reply_texts(&outbox.take()), vec!["Welcome"]);
    }

    #[tokio::test]
    async fn test_agent_mention_is_stripped_before_planning() {
        let mut mock = MockPlanningOracle::new();
        mock.expect_plan()
            .withf(|_, _, new_message| new_message.to_string() == "build me a meal plan")
            .times(1)
            .returning(|_, _, _| {
                Ok(PlanReply {
                    text: "Here is your meal plan".to_string(),
                })
            });
        let manager = manager(Arc::new(mock));
        let outbox = CollectingOutbox::new();
        let envelope = Envelope::from_chat(
            SessionKey::for_sender("alice"),
            "alice",
            &ChatMessage::text("@agent1qxyz build me a meal plan"),
            false,
        )
        .unwrap();

        manager.handle_message(envelope, &outbox).await;

        assert_eq!(reply_texts(&outbox.take()), vec!["Here is your meal plan"]);
        let history = manager
            .store()
            .get(&SessionKey::for_sender("alice"))
            .await
            .unwrap();
        assert_eq!(history[0].content, "build me a meal plan");
    }

    #[tokio::test]
    async fn test_ack_precedes_slow_reply() {
        let manager = manager(Arc::new(SlowOracle(Duration::from_millis(50))));
        let outbox = CollectingOutbox::new();
        let envelope = text_envelope("alice", "plan my week", true);
        let msg_id = envelope.msg_id;

        manager.handle_message(envelope, &outbox).await;

        let delivered = outbox.take();
        assert_eq!(delivered.len(), 2);
        let (_, first, ack_at) = &delivered[0];
        let (_, second, reply_at) = &delivered[1];
        match first {
            Outbound::Ack(ack) => assert_eq!(ack.acknowledged_msg_id, msg_id),
            other => panic!("expected ack first, got {other:?}"),
        }
        assert!(matches!(second, Outbound::Reply(_)));
        assert!(ack_at < reply_at);
        assert!(reply_at.duration_since(*ack_at) >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_no_ack_when_not_required() {
        let manager = manager(Arc::new(CountingOracle));
        let outbox = CollectingOutbox::new();

        manager
            .handle_message(text_envelope("alice", "hi", false), &outbox)
            .await;

        let delivered = outbox.take();
        assert_eq!(delivered.len(), 1);
        assert!(matches!(delivered[0].1, Outbound::Reply(_)));
        assert_eq!(delivered[0].0, "alice");
    }

    #[tokio::test]
    async fn test_identical_text_creates_distinct_turns() {
        let manager = manager(Arc::new(CountingOracle));
        let outbox = CollectingOutbox::new();

        for _ in 0..2 {
            manager
                .handle_message(text_envelope("alice", "same question", false), &outbox)
                .await;
        }

        let history = manager
            .store()
            .get(&SessionKey::for_sender("alice"))
            .await
            .unwrap();
        let user_turns: Vec<&str> = history
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(user_turns, vec!["same question", "same question"]);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_history() {
        let manager = manager(Arc::new(CountingOracle));
        let outbox = CollectingOutbox::new();

        manager
            .handle_message(text_envelope("alice", "a1", false), &outbox)
            .await;
        manager
            .handle_message(text_envelope("bob", "b1", false), &outbox)
            .await;
        manager
            .handle_message(text_envelope("alice", "a2", false), &outbox)
            .await;

        let delivered = outbox.take();
        let recipients: Vec<&str> = delivered.iter().map(|(r, _, _)| r.as_str()).collect();
        assert_eq!(recipients, vec!["alice", "bob", "alice"]);
        // Bob's first turn sees no prior history even though Alice has some.
        assert_eq!(reply_texts(&delivered), vec!["OK: 1", "OK: 1", "OK: 3"]);

        let bob = manager
            .store()
            .get(&SessionKey::for_sender("bob"))
            .await
            .unwrap();
        assert!(bob.iter().all(|t| !t.content.starts_with('a')));
    }

    #[tokio::test]
    async fn test_same_session_turns_are_serialized() {
        let manager = Arc::new(manager(Arc::new(SlowOracle(Duration::from_millis(20)))));
        let outbox = Arc::new(CollectingOutbox::new());

        let mut handles = Vec::new();
        for i in 0..5 {
            let manager = manager.clone();
            let outbox = outbox.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .handle_message(text_envelope("alice", &format!("m{i}"), false), &*outbox)
                    .await;
            }));
            // Stagger arrivals so each task reaches the session lock in order.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = manager
            .store()
            .get(&SessionKey::for_sender("alice"))
            .await
            .unwrap();
        assert_eq!(history.len(), 10);
        for (i, pair) in history.chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].content, format!("m{i}"));
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("re: m{i}"));
        }
    }

    #[tokio::test]
    async fn test_different_sessions_run_concurrently() {
        let manager = Arc::new(manager(Arc::new(SlowOracle(Duration::from_millis(200)))));
        let outbox = Arc::new(CollectingOutbox::new());
        let started = Instant::now();

        let a = {
            let (manager, outbox) = (manager.clone(), outbox.clone());
            tokio::spawn(async move {
                manager
                    .handle_message(text_envelope("alice", "hi", false), &*outbox)
                    .await
            })
        };
        let b = {
            let (manager, outbox) = (manager.clone(), outbox.clone());
            tokio::spawn(async move {
                manager
                    .handle_message(text_envelope("bob", "hi", false), &*outbox)
                    .await
            })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(390));
        assert_eq!(outbox.take().len(), 2);
    }

    #[tokio::test]
    async fn test_start_session_sends_welcome_without_history() {
        let mut mock = MockPlanningOracle::new();
        mock.expect_plan().never();
        let manager = manager(Arc::new(mock));
        let outbox = CollectingOutbox::new();
        let mut envelope = text_envelope("alice", "", true);
        envelope.body = Inbound::StartSession;

        manager.handle_message(envelope, &outbox).await;

        let delivered = outbox.take();
        assert_eq!(delivered.len(), 2);
        assert!(matches!(delivered[0].1, Outbound::Ack(_)));
        assert_eq!(reply_texts(&delivered), vec![prompt::WELCOME_MESSAGE]);
        let history = manager
            .store()
            .get(&SessionKey::for_sender("alice"))
            .await;
        assert_eq!(history, Some(vec![]));
    }

    #[tokio::test]
    async fn test_end_session_sends_closing_message() {
        let manager = manager(Arc::new(CountingOracle));
        let outbox = CollectingOutbox::new();
        let mut envelope = text_envelope("alice", "", false);
        envelope.body = Inbound::EndSession;

        manager.handle_message(envelope, &outbox).await;

        let delivered = outbox.take();
        match &delivered[0].1 {
            Outbound::Reply(msg) => {
                assert!(msg.ends_session());
                assert_eq!(msg.first_text(), Some(prompt::FAREWELL_MESSAGE));
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_history_window_limits_oracle_context() {
        let manager = ConversationManager::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(CountingOracle),
            Arc::new("directive".to_string()),
            ConversationSettings {
                history_window: Some(2),
                max_turn_chars: None,
            },
        );
        let outbox = CollectingOutbox::new();

        for text in ["one", "two", "three"] {
            manager
                .handle_message(text_envelope("alice", text, false), &outbox)
                .await;
        }

        // Context is capped at two prior turns; stored history is not.
        assert_eq!(reply_texts(&outbox.take()), vec!["OK: 1", "OK: 3", "OK: 3"]);
        let history = manager
            .store()
            .get(&SessionKey::for_sender("alice"))
            .await
            .unwrap();
        assert_eq!(history.len(), 6);
    }

    #[test]
    fn test_context_truncates_long_turns() {
        let settings = ConversationSettings {
            history_window: None,
            max_turn_chars: Some(4),
        };
        let history = vec![Turn::new(Role::User, "ab"), Turn::new(Role::Assistant, "héllo world")];

        let context = settings.context(&history);

        assert_eq!(context[0].content, "ab");
        assert_eq!(context[1].content, "héll");
        assert_eq!(context[1].role, Role::Assistant);
    }

    #[test]
    fn test_envelope_rejects_malformed_chat() {
        let msg = ChatMessage {
            msg_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            content: vec![ChatContent::Text {
                text: String::new(),
            }],
        };
        assert!(Envelope::from_chat(SessionKey::for_sender("a"), "a", &msg, true).is_none());

        let ok = ChatMessage::text("hello");
        let envelope = Envelope::from_chat(SessionKey::for_sender("a"), "a", &ok, true).unwrap();
        assert_eq!(envelope.msg_id, ok.msg_id);
        assert_eq!(envelope.body, Inbound::Text("hello".to_string()));
    }

    struct FailingOutbox;

    #[async_trait]
    impl Outbox for FailingOutbox {
        async fn deliver(&self, _recipient: &str, _outbound: Outbound) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("peer unreachable"))
        }
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_lose_committed_turn() {
        let manager = manager(Arc::new(CountingOracle));

        manager
            .handle_message(text_envelope("alice", "hi", true), &FailingOutbox)
            .await;

        let history = manager
            .store()
            .get(&SessionKey::for_sender("alice"))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }
}
