//! Conversation controller
//!
//! Coordinates one conversation: appends user input, runs the extractor,
//! drives the responder, and delivers assistant output back to the session
//! store. Per-session states: Uninitialized → Active → (Typing ⇄ Active)
//! → Closed. While Typing, further `send_message` calls are rejected so at
//! most one responder invocation is in flight per session.
//!
//! Scheduled deliveries (welcome, reply, estimate stagger) are cancellable:
//! deleting a session aborts its pending tasks, and every delivery re-checks
//! session existence before writing, so a task that outruns the abort still
//! drops its write instead of appending to a deleted session.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::context::{self, TripContext};
use crate::responder::{MockResponder, Responder};
use crate::session::{Message, Session, SessionManager, SessionStore};
use crate::{Error, Result};

const WELCOME: &str = "Hi! I'm your travel planning assistant. Where would you like to go?";
const ESTIMATE_INTRO: &str = "Here is a first estimate based on what you've told me so far:";

/// Conversation state, per controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Uninitialized,
    Active,
    Typing,
    Closed,
}

/// Destructive operations routed through the confirmation hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestructiveAction {
    DeleteSession,
    ClearAll,
    NewSession,
}

type ConfirmHook = Arc<dyn Fn(DestructiveAction) -> bool + Send + Sync>;
type PendingTasks = Arc<Mutex<HashMap<String, Vec<JoinHandle<()>>>>>;

/// Top-level coordinator for the chat feature
pub struct ConversationController {
    sessions: Arc<Mutex<SessionManager>>,
    responder: Arc<dyn Responder>,
    state: Arc<Mutex<ChatState>>,
    typing: Arc<AtomicBool>,
    pending: PendingTasks,
    confirm: ConfirmHook,
    config: ChatConfig,
}

impl ConversationController {
    /// Create a controller with the mock responder
    pub fn new(config: ChatConfig) -> Self {
        let responder = Arc::new(MockResponder::new(&config));
        Self::with_responder(config, responder)
    }

    /// Create a controller with a custom responder
    pub fn with_responder(config: ChatConfig, responder: Arc<dyn Responder>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(SessionManager::new(config.max_sessions))),
            responder,
            state: Arc::new(Mutex::new(ChatState::Uninitialized)),
            typing: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            confirm: Arc::new(|_| true),
            config,
        }
    }

    /// Back the controller with a durable store, restoring persisted sessions
    pub fn with_store(mut self, store: SessionStore) -> Result<Self> {
        let manager = SessionManager::with_store(store, self.config.max_sessions)?;
        self.sessions = Arc::new(Mutex::new(manager));
        Ok(self)
    }

    /// Install a confirmation hook for destructive actions.
    /// The default hook confirms everything.
    pub fn on_confirm<F>(mut self, hook: F) -> Self
    where
        F: Fn(DestructiveAction) -> bool + Send + Sync + 'static,
    {
        self.confirm = Arc::new(hook);
        self
    }

    /// First open: ensure an active session exists and greet the user.
    /// The welcome message arrives after a short delay, not instantly.
    pub async fn open(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            ChatState::Closed => return Err(Error::SessionClosed),
            ChatState::Active | ChatState::Typing => return Ok(()),
            ChatState::Uninitialized => {}
        }

        let (session_id, fresh) = {
            let mut manager = self.sessions.lock().await;
            match manager.active() {
                Some(session) => (session.id.clone(), session.is_empty()),
                None => {
                    let session = manager.create_session()?;
                    (session.id, true)
                }
            }
        };

        *state = ChatState::Active;
        drop(state);

        if fresh {
            self.schedule_welcome(session_id).await;
        }
        Ok(())
    }

    /// Handle one user message.
    ///
    /// Appends the user message and merges extracted context synchronously,
    /// then resolves the assistant reply on a scheduled task. Rejected with
    /// `ResponsePending` while a previous reply is still being produced.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        // hold the state lock across the whole entry so two concurrent
        // calls cannot both pass the Typing check
        let mut state = self.state.lock().await;
        match *state {
            ChatState::Typing => return Err(Error::ResponsePending),
            ChatState::Closed => return Err(Error::SessionClosed),
            ChatState::Uninitialized => {
                return Err(Error::SessionNotFound("no active session".to_string()));
            }
            ChatState::Active => {}
        }

        let (session_id, history, context) = {
            let mut manager = self.sessions.lock().await;
            let session_id = manager
                .active()
                .map(|s| s.id.clone())
                .ok_or_else(|| Error::SessionNotFound("no active session".to_string()))?;
            manager.append_message(&session_id, Message::user(text))?;

            let delta = {
                let session = manager
                    .get(&session_id)
                    .ok_or_else(|| Error::SessionNotFound(session_id.clone()))?;
                context::extract(text, &session.context)
            };
            if !delta.is_empty() {
                manager.merge_context(&session_id, delta)?;
            }

            let session = manager
                .get(&session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.clone()))?;
            (session_id, session.messages.clone(), session.context.clone())
        };

        *state = ChatState::Typing;
        self.typing.store(true, Ordering::SeqCst);
        drop(state);

        let sessions = Arc::clone(&self.sessions);
        let state = Arc::clone(&self.state);
        let typing = Arc::clone(&self.typing);
        let responder = Arc::clone(&self.responder);
        let stagger = Duration::from_millis(self.config.estimate_stagger_ms);
        let utterance = text.to_string();
        let task_id = session_id.clone();

        let handle = tokio::spawn(async move {
            let reply = responder.respond(&utterance, &history, &context).await;
            let delivered =
                append_guarded(&sessions, &task_id, Message::assistant(reply.text)).await;

            if delivered {
                if let Some(preview) = reply.estimate {
                    // stagger the estimate so the two assistant messages
                    // visibly sequence instead of landing together
                    tokio::time::sleep(stagger).await;
                    append_guarded(
                        &sessions,
                        &task_id,
                        Message::estimate(ESTIMATE_INTRO, preview),
                    )
                    .await;
                }
            }

            typing.store(false, Ordering::SeqCst);
            let mut state = state.lock().await;
            if *state == ChatState::Typing {
                *state = ChatState::Active;
            }
        });
        self.track(session_id, handle).await;

        Ok(())
    }

    /// Start a fresh session, keeping the old one in the list.
    /// May fail with `SessionLimitExceeded` at the session cap.
    pub async fn start_new_session(&self) -> Result<()> {
        if *self.state.lock().await == ChatState::Closed {
            return Err(Error::SessionClosed);
        }

        let previous = {
            let manager = self.sessions.lock().await;
            manager.active().map(|s| (s.id.clone(), s.is_empty()))
        };
        if let Some((id, empty)) = &previous {
            if !empty && !(self.confirm)(DestructiveAction::NewSession) {
                debug!("new session not confirmed");
                return Ok(());
            }
            self.abort_pending(id).await;
        }

        let session_id = {
            let mut manager = self.sessions.lock().await;
            manager.create_session()?.id
        };

        self.typing.store(false, Ordering::SeqCst);
        *self.state.lock().await = ChatState::Active;
        self.schedule_welcome(session_id).await;
        Ok(())
    }

    /// Switch the active session. Not allowed while a reply is pending.
    pub async fn load_session(&self, id: &str) -> Result<()> {
        {
            let state = self.state.lock().await;
            match *state {
                ChatState::Closed => return Err(Error::SessionClosed),
                ChatState::Typing => return Err(Error::ResponsePending),
                _ => {}
            }
        }
        self.sessions.lock().await.load_session(id)?;
        *self.state.lock().await = ChatState::Active;
        Ok(())
    }

    /// Delete a session permanently, cancelling its scheduled deliveries
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        if !(self.confirm)(DestructiveAction::DeleteSession) {
            debug!(session = %id, "deletion not confirmed");
            return Ok(());
        }

        self.abort_pending(id).await;

        let was_active = {
            let mut manager = self.sessions.lock().await;
            let was_active = manager.active().map(|s| s.id == id).unwrap_or(false);
            manager.delete_session(id)?;
            was_active
        };

        if was_active {
            self.typing.store(false, Ordering::SeqCst);
            let mut state = self.state.lock().await;
            if *state == ChatState::Typing {
                *state = ChatState::Active;
            }
        }
        Ok(())
    }

    /// Delete every session; the controller returns to Uninitialized so the
    /// next `open` starts over
    pub async fn clear_all(&self) -> Result<()> {
        if !(self.confirm)(DestructiveAction::ClearAll) {
            debug!("clear-all not confirmed");
            return Ok(());
        }

        self.abort_all().await;
        self.sessions.lock().await.clear_all();
        self.typing.store(false, Ordering::SeqCst);

        let mut state = self.state.lock().await;
        if *state != ChatState::Closed {
            *state = ChatState::Uninitialized;
        }
        Ok(())
    }

    /// Close the conversation. Terminal: a fresh controller instance is
    /// required to resume.
    pub async fn close(&self) {
        self.abort_all().await;
        self.typing.store(false, Ordering::SeqCst);
        *self.state.lock().await = ChatState::Closed;
    }

    /// Whether an assistant reply is currently pending
    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::SeqCst)
    }

    /// Current conversation state
    pub async fn state(&self) -> ChatState {
        *self.state.lock().await
    }

    /// Snapshot of the active session, for rendering
    pub async fn snapshot(&self) -> Option<Session> {
        self.sessions.lock().await.active().cloned()
    }

    /// Read-only snapshot of the active session's trip context
    pub async fn context(&self) -> Option<TripContext> {
        self.sessions.lock().await.active().map(|s| s.context.clone())
    }

    /// All sessions, in creation order
    pub async fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().await.list().to_vec()
    }

    async fn schedule_welcome(&self, session_id: String) {
        let sessions = Arc::clone(&self.sessions);
        let delay = Duration::from_millis(self.config.welcome_delay_ms);
        let task_id = session_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            append_guarded(&sessions, &task_id, Message::assistant(WELCOME)).await;
        });
        self.track(session_id, handle).await;
    }

    async fn track(&self, session_id: String, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock().await;
        let entry = pending.entry(session_id).or_default();
        entry.retain(|h| !h.is_finished());
        entry.push(handle);
    }

    async fn abort_pending(&self, session_id: &str) {
        if let Some(handles) = self.pending.lock().await.remove(session_id) {
            for handle in handles {
                handle.abort();
            }
        }
    }

    async fn abort_all(&self) {
        for (_, handles) in self.pending.lock().await.drain() {
            for handle in handles {
                handle.abort();
            }
        }
    }
}

/// Append a message if the session still exists; a deleted session drops
/// the write instead of resurrecting it
async fn append_guarded(
    sessions: &Arc<Mutex<SessionManager>>,
    session_id: &str,
    message: Message,
) -> bool {
    let mut manager = sessions.lock().await;
    match manager.append_message(session_id, message) {
        Ok(()) => true,
        Err(Error::SessionNotFound(_)) => {
            debug!(session = %session_id, "session gone, dropping scheduled message");
            false
        }
        Err(e) => {
            warn!(session = %session_id, error = %e, "failed to deliver scheduled message");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MessageKind, Role};

    fn controller() -> ConversationController {
        ConversationController::new(ChatConfig::fast())
    }

    async fn wait_until_idle(controller: &ConversationController) {
        for _ in 0..400 {
            if !controller.is_typing() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("typing indicator never cleared");
    }

    #[tokio::test]
    async fn test_open_creates_session_and_welcomes() {
        let config = ChatConfig {
            welcome_delay_ms: 100,
            ..ChatConfig::fast()
        };
        let controller = ConversationController::new(config);
        controller.open().await.unwrap();

        assert_eq!(controller.state().await, ChatState::Active);
        let session = controller.snapshot().await.unwrap();
        assert!(session.is_empty()); // welcome is delayed, not instantaneous

        tokio::time::sleep(Duration::from_millis(300)).await;
        let session = controller.snapshot().await.unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_send_message_end_to_end() {
        let config = ChatConfig {
            typing_delay_ms: 100,
            ..ChatConfig::fast()
        };
        let controller = ConversationController::new(config);
        controller.open().await.unwrap();

        controller.send_message("서울 여행 3박4일 성인2").await.unwrap();
        // typing flips on synchronously with the call
        assert!(controller.is_typing());
        assert_eq!(controller.state().await, ChatState::Typing);

        wait_until_idle(&controller).await;

        let session = controller.snapshot().await.unwrap();
        let user_messages: Vec<_> = session
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .collect();
        let assistant_messages: Vec<_> = session
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(user_messages.len(), 1);
        assert!(!assistant_messages.is_empty());

        let context = controller.context().await.unwrap();
        assert_eq!(context.destination.as_deref(), Some("서울"));
        assert_eq!(context.party.adults, 2);
        assert_eq!(context.nights(), Some(3)); // 3박4일 = 4-day span
    }

    #[tokio::test]
    async fn test_send_rejected_while_typing() {
        let config = ChatConfig {
            typing_delay_ms: 200,
            ..ChatConfig::fast()
        };
        let controller = ConversationController::new(config);
        controller.open().await.unwrap();

        controller.send_message("first").await.unwrap();
        let err = controller.send_message("second").await.unwrap_err();
        assert!(matches!(err, Error::ResponsePending));

        wait_until_idle(&controller).await;

        // only one user message landed
        let session = controller.snapshot().await.unwrap();
        let user_count = session.messages.iter().filter(|m| m.role == Role::User).count();
        assert_eq!(user_count, 1);

        // idle again, sending works
        controller.send_message("second").await.unwrap();
        wait_until_idle(&controller).await;
    }

    #[tokio::test]
    async fn test_delete_mid_flight_drops_pending_reply() {
        let config = ChatConfig {
            typing_delay_ms: 150,
            ..ChatConfig::fast()
        };
        let controller = ConversationController::new(config);
        controller.open().await.unwrap();

        controller.send_message("부산 2박3일").await.unwrap();
        let session_id = controller.snapshot().await.unwrap().id;

        controller.delete_session(&session_id).await.unwrap();
        assert!(!controller.is_typing());

        // give the aborted task time to have fired if the guard failed
        tokio::time::sleep(Duration::from_millis(300)).await;

        let sessions = controller.sessions().await;
        assert!(sessions.iter().all(|s| s.id != session_id));
    }

    #[tokio::test]
    async fn test_estimate_arrives_as_second_staggered_message() {
        let controller = controller();
        controller.open().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await; // welcome

        controller.send_message("부산 2박3일 성인2").await.unwrap();
        wait_until_idle(&controller).await;
        controller.send_message("관광 위주로요").await.unwrap();
        wait_until_idle(&controller).await;

        let session = controller.snapshot().await.unwrap();
        let estimates: Vec<_> = session
            .messages
            .iter()
            .filter(|m| m.kind == MessageKind::Estimate)
            .collect();
        assert_eq!(estimates.len(), 1);
        let preview = estimates[0].estimate.as_ref().unwrap();
        assert_eq!(preview.destination, "부산");
        assert_eq!(preview.nights, 2);
        // estimate follows the text reply, never precedes it
        let estimate_pos = session
            .messages
            .iter()
            .position(|m| m.kind == MessageKind::Estimate)
            .unwrap();
        assert_eq!(session.messages[estimate_pos - 1].kind, MessageKind::Text);
        assert_eq!(session.messages[estimate_pos - 1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_confirmation_hook_blocks_deletion() {
        let controller = ConversationController::new(ChatConfig::fast()).on_confirm(|_| false);
        controller.open().await.unwrap();
        let session_id = controller.snapshot().await.unwrap().id;

        controller.delete_session(&session_id).await.unwrap();
        // hook declined, session survives
        assert!(controller.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_session_cap_via_new_session() {
        let controller = controller();
        controller.open().await.unwrap();
        controller.start_new_session().await.unwrap();
        controller.start_new_session().await.unwrap();

        let err = controller.start_new_session().await.unwrap_err();
        assert!(matches!(err, Error::SessionLimitExceeded { limit: 3 }));
    }

    #[tokio::test]
    async fn test_clear_all_then_reopen() {
        let controller = controller();
        controller.open().await.unwrap();
        controller.clear_all().await.unwrap();

        assert_eq!(controller.state().await, ChatState::Uninitialized);
        assert!(controller.snapshot().await.is_none());

        controller.open().await.unwrap();
        assert!(controller.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_is_terminal() {
        let controller = controller();
        controller.open().await.unwrap();
        controller.close().await;

        assert!(matches!(
            controller.send_message("hello").await,
            Err(Error::SessionClosed)
        ));
        assert!(matches!(controller.open().await, Err(Error::SessionClosed)));
        assert!(matches!(
            controller.start_new_session().await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_load_session_switches_active() {
        let controller = controller();
        controller.open().await.unwrap();
        let first = controller.snapshot().await.unwrap().id;
        controller.start_new_session().await.unwrap();
        let second = controller.snapshot().await.unwrap().id;
        assert_ne!(first, second);

        controller.load_session(&first).await.unwrap();
        assert_eq!(controller.snapshot().await.unwrap().id, first);

        assert!(matches!(
            controller.load_session("missing").await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_round_trip_through_controller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let path = path.to_str().unwrap();

        {
            let controller = ConversationController::new(ChatConfig::fast())
                .with_store(SessionStore::open(path).unwrap())
                .unwrap();
            controller.open().await.unwrap();
            controller.send_message("제주 2박3일").await.unwrap();
            wait_until_idle(&controller).await;
        }

        let controller = ConversationController::new(ChatConfig::fast())
            .with_store(SessionStore::open(path).unwrap())
            .unwrap();
        controller.open().await.unwrap();

        let session = controller.snapshot().await.unwrap();
        assert!(session.messages.iter().any(|m| m.content == "제주 2박3일"));
        let context = controller.context().await.unwrap();
        assert_eq!(context.destination.as_deref(), Some("제주"));
    }
}
