//! Chat view state: the current session, the visible messages, and the two ways of getting
//! a reply (streamed or in one response).
//!
//! Handlers never return errors. Failures are logged and shown to the user as an apology
//! message in place of the reply, matching what the conversation would otherwise display.

use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiClient, ApiError};
use crate::auth::AuthSession;
use crate::config::ChatConfig;
use crate::history::{self, HistoryMerge};
use crate::message::{parse_timestamp, Message, MessageId, MessageIds, Role};
use crate::session::{DeleteOutcome, Session, SessionDirectory, SessionId};
use crate::stream::{EventLineDecoder, StreamEvent};

/// Shown instead of a reply when sending fails.
pub const APOLOGY: &str = "Sorry, there was an error processing your message. Please try again.";

/// The session the view is pointed at. Not persisted until the first message is sent or
/// the user picks an existing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSession {
    pub id: SessionId,
    pub title: String,
    pub persisted: bool,
}

impl CurrentSession {
    /// A local-only session id (`session_<unix millis>`).
    pub fn fresh(title: impl Into<String>) -> Self {
        Self {
            id: format!("session_{}", Utc::now().timestamp_millis()),
            title: title.into(),
            persisted: false,
        }
    }

    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.session_id.clone(),
            title: session.display_title().to_string(),
            persisted: true,
        }
    }
}

/// Chat behavior switches, usually taken from [`ChatConfig`].
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub streaming: bool,
    pub history_merge: HistoryMerge,
    pub default_title: String,
}

impl From<&ChatConfig> for ChatOptions {
    fn from(c: &ChatConfig) -> Self {
        Self {
            streaming: c.streaming,
            history_merge: c.history_merge,
            default_title: c.default_title.clone(),
        }
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

/// How a call to [`ChatView::send_message`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, or a send was already in progress.
    Ignored,
    Completed,
    Cancelled,
    /// The apology message was shown.
    Failed,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    session_id: &'a str,
    message: &'a str,
    agent_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ai_message: AiMessage,
}

#[derive(Debug, Deserialize)]
struct AiMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_at: Option<String>,
}

/// Local view of one conversation plus the session directory behind it.
pub struct ChatView {
    api: ApiClient,
    auth: AuthSession,
    directory: SessionDirectory,
    options: ChatOptions,
    current: CurrentSession,
    messages: Vec<Message>,
    ids: MessageIds,
    loading: watch::Sender<bool>,
    loading_history: bool,
    initialized: bool,
    cancel: CancellationToken,
}

impl ChatView {
    pub fn new(api: ApiClient, auth: AuthSession, options: ChatOptions) -> Self {
        let directory = SessionDirectory::new(api.clone(), auth.clone());
        let (loading, _) = watch::channel(false);
        Self {
            current: CurrentSession::fresh(options.default_title.clone()),
            api,
            auth,
            directory,
            options,
            messages: Vec::new(),
            ids: MessageIds::default(),
            loading,
            loading_history: false,
            initialized: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn current(&self) -> &CurrentSession {
        &self.current
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut SessionDirectory {
        &mut self.directory
    }

    /// True while a send is in progress.
    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Watch the loading flag from elsewhere (e.g. a spinner task).
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn is_loading_history(&self) -> bool {
        self.loading_history
    }

    pub fn streaming(&self) -> bool {
        self.options.streaming
    }

    pub fn set_streaming(&mut self, on: bool) {
        self.options.streaming = on;
    }

    /// Token that aborts the send in progress. Take a fresh handle before each send; the
    /// view replaces its token once a cancellation has been consumed.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Rename the current session locally. Blank titles are ignored.
    pub fn set_title(&mut self, title: &str) {
        let title = title.trim();
        if !title.is_empty() {
            self.current.title = title.to_string();
        }
    }

    /// Point the view at the most recent session and load its history. Runs once.
    pub async fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        let latest = match self.directory.refresh().await {
            Ok(sessions) => sessions.first().cloned(),
            Err(e) => {
                log::error!("failed to initialize session: {}", e);
                return;
            }
        };
        if let Some(latest) = latest {
            log::info!("chat: resuming latest session {}", latest.session_id);
            self.current = CurrentSession::from_session(&latest);
            self.load_history(&latest.session_id).await;
        }
    }

    /// Make `session_id` current and clear the visible messages. No history is fetched.
    pub fn select_session(&mut self, session_id: &str) {
        let current = match self.directory.get(session_id) {
            Some(s) => CurrentSession::from_session(s),
            None => CurrentSession {
                id: session_id.to_string(),
                title: self.options.default_title.clone(),
                persisted: true,
            },
        };
        self.renew_cancel();
        self.current = current;
        self.messages.clear();
        self.directory.invalidate();
    }

    /// Switch to another session: clear messages, then load that session's history.
    /// An id missing from the mirror triggers a refresh first so its title is known.
    pub async fn switch_session(&mut self, session_id: &str) {
        if self.directory.get(session_id).is_none() {
            self.directory.refresh_if_stale().await;
        }
        self.select_session(session_id);
        self.load_history(session_id).await;
    }

    /// Fetch a session's history and merge it into the visible messages.
    pub async fn load_history(&mut self, session_id: &str) {
        self.loading_history = true;
        match history::fetch_history(&self.api, &self.auth, session_id).await {
            Ok(entries) => {
                let fetched = history::to_messages(entries, &mut self.ids);
                history::merge(&mut self.messages, fetched, self.options.history_merge);
            }
            Err(e) => log::error!("failed to load history: {}", e),
        }
        self.loading_history = false;
    }

    /// Create a session with the given title and switch to it. Blank titles are ignored.
    pub async fn create_session(&mut self, title: &str) -> Result<Option<Session>, ApiError> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }
        let session = self.directory.create(title).await?;
        self.renew_cancel();
        self.current = CurrentSession::from_session(&session);
        self.messages.clear();
        self.directory.invalidate();
        Ok(Some(session))
    }

    /// Delete a session after confirmation. Deleting the current one falls back to a fresh
    /// local session with no messages.
    pub async fn delete_session(
        &mut self,
        session_id: &str,
        confirm: impl FnOnce(&str) -> bool,
    ) -> DeleteOutcome {
        let outcome = self.directory.delete(session_id, confirm).await;
        if outcome == DeleteOutcome::Deleted && session_id == self.current.id {
            self.renew_cancel();
            self.current = CurrentSession::fresh(self.options.default_title.clone());
            self.messages.clear();
        }
        outcome
    }

    /// Return a persisted session id, creating a session on the backend if the current one
    /// is local-only. History is not fetched for a session created here. When creation
    /// fails the local id is used as-is.
    pub async fn ensure_session(&mut self) -> SessionId {
        if self.current.persisted {
            return self.current.id.clone();
        }
        match self.directory.create(&self.current.title).await {
            Ok(session) => {
                let title = session
                    .title
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| self.current.title.clone());
                self.current = CurrentSession {
                    id: session.session_id.clone(),
                    title,
                    persisted: true,
                };
                self.directory.invalidate();
                session.session_id
            }
            Err(e) => {
                log::error!("failed to create session: {}", e);
                self.current.id.clone()
            }
        }
    }

    /// Send user input and collect the reply. `on_update` sees the user message, the reply
    /// placeholder, and every change to the reply.
    pub async fn send_message(
        &mut self,
        input: &str,
        on_update: &mut (dyn FnMut(&Message) + Send),
    ) -> SendOutcome {
        if input.trim().is_empty() || self.is_loading() {
            return SendOutcome::Ignored;
        }
        let user = self.ids.user(input);
        on_update(&user);
        self.messages.push(user);
        self.loading.send_replace(true);

        let token = self.cancel.clone();
        let outcome = if self.options.streaming {
            self.send_streaming(input, &token, on_update).await
        } else {
            self.send_plain(input, &token, on_update).await
        };

        self.loading.send_replace(false);
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        outcome
    }

    async fn send_streaming(
        &mut self,
        text: &str,
        token: &CancellationToken,
        on_update: &mut (dyn FnMut(&Message) + Send),
    ) -> SendOutcome {
        let session_id = self.ensure_session().await;
        let placeholder = self.ids.assistant("");
        let reply_id = placeholder.id;
        on_update(&placeholder);
        self.messages.push(placeholder);

        match self
            .stream_reply(&session_id, text, reply_id, token, on_update)
            .await
        {
            Ok(SendOutcome::Cancelled) => {
                self.messages
                    .retain(|m| m.id != reply_id || !m.content.is_empty());
                SendOutcome::Cancelled
            }
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("streaming error: {}", e);
                self.apologize(Some(reply_id), on_update);
                SendOutcome::Failed
            }
        }
    }

    /// POST /api/v1/chat/stream and fold events into the reply message.
    async fn stream_reply(
        &mut self,
        session_id: &str,
        text: &str,
        reply_id: MessageId,
        token: &CancellationToken,
        on_update: &mut (dyn FnMut(&Message) + Send),
    ) -> Result<SendOutcome, ApiError> {
        let url = self.api.v1("/chat/stream");
        let body = SendMessageRequest {
            session_id,
            message: text,
            agent_type: &self.auth.agent_type,
        };
        let res = tokio::select! {
            _ = token.cancelled() => return Ok(SendOutcome::Cancelled),
            res = self.api.post(&url).json(&body).send() => res?,
        };
        let res = api::check_status(res).await?;
        let mut stream = res.bytes_stream();
        let mut decoder = EventLineDecoder::new();

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => {
                    log::info!("chat: stream cancelled for session {}", session_id);
                    return Ok(SendOutcome::Cancelled);
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                if self.apply_stream_event(reply_id, event, on_update) {
                    return Ok(SendOutcome::Completed);
                }
            }
        }
        if let Some(event) = decoder.finish() {
            self.apply_stream_event(reply_id, event, on_update);
        }
        Ok(SendOutcome::Completed)
    }

    /// Replace the reply's content with the event's text. Returns true on the done event.
    fn apply_stream_event(
        &mut self,
        reply_id: MessageId,
        event: StreamEvent,
        on_update: &mut (dyn FnMut(&Message) + Send),
    ) -> bool {
        let (content, done) = match event {
            StreamEvent::Content(c) => (Some(c), false),
            StreamEvent::Done(c) => (c, true),
        };
        if let Some(content) = content {
            if let Some(msg) = self.messages.iter_mut().find(|m| m.id == reply_id) {
                msg.content = content;
                on_update(&*msg);
            }
        }
        done
    }

    async fn send_plain(
        &mut self,
        text: &str,
        token: &CancellationToken,
        on_update: &mut (dyn FnMut(&Message) + Send),
    ) -> SendOutcome {
        let session_id = self.ensure_session().await;
        let reply = tokio::select! {
            _ = token.cancelled() => return SendOutcome::Cancelled,
            reply = self.request_reply(&session_id, text) => reply,
        };
        match reply {
            Ok(reply) => {
                let timestamp = reply
                    .created_at
                    .as_deref()
                    .and_then(parse_timestamp)
                    .unwrap_or_else(Utc::now);
                let msg = self.ids.build(Role::Assistant, reply.content, timestamp);
                on_update(&msg);
                self.messages.push(msg);
                SendOutcome::Completed
            }
            Err(e) => {
                log::error!("non-streaming error: {}", e);
                self.apologize(None, on_update);
                SendOutcome::Failed
            }
        }
    }

    /// POST /api/v1/chat/messages
    async fn request_reply(&self, session_id: &str, text: &str) -> Result<AiMessage, ApiError> {
        let url = self.api.v1("/chat/messages");
        let res = self
            .api
            .post(&url)
            .json(&SendMessageRequest {
                session_id,
                message: text,
                agent_type: &self.auth.agent_type,
            })
            .send()
            .await?;
        let data: SendMessageResponse = api::read_json(res).await?;
        Ok(data.ai_message)
    }

    /// Put the apology into the empty placeholder, or append it when there is none.
    fn apologize(
        &mut self,
        reply_id: Option<MessageId>,
        on_update: &mut (dyn FnMut(&Message) + Send),
    ) {
        let placeholder = reply_id.and_then(|id| {
            self.messages
                .iter_mut()
                .find(|m| m.id == id && m.content.is_empty())
        });
        match placeholder {
            Some(msg) => {
                msg.content = APOLOGY.to_string();
                on_update(&*msg);
            }
            None => {
                let msg = self.ids.assistant(APOLOGY);
                on_update(&msg);
                self.messages.push(msg);
            }
        }
    }

    fn renew_cancel(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
