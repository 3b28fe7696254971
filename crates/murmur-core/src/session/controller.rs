//! Chat Session Controller
//!
//! Owns the message list, the single active stream and the render state of
//! every message. Network consumption runs in a spawned task; its parts come
//! back through an inbox and are applied here, in order, by [`ChatSession::poll`],
//! [`ChatSession::step`] or [`ChatSession::drive`]. All mutation and every
//! render happens on the owner of the session, never in the network task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::backend::ChatBackend;
use crate::ai::client::{ClientConfig, LocalServerClient};
use crate::ai::streaming::StreamPart;
use crate::ai::types::{ChatMessage, ChatRequest, FinishReason, ModelInfo, Role};
use crate::config::ChatConfig;
use crate::constants::ai::FALLBACK_MODEL;
use crate::error::{ClientError, RenderError, SessionError};
use crate::markdown::{ClipboardSink, RenderConfig, RenderOutput, RenderPipeline};
use crate::session::events::{ConnectionStatus, SessionEvent};
use crate::session::message::{Message, MessageId};
use crate::session::stream::{SessionPhase, StreamSession, StreamUpdate};

/// How a stream ended
enum Outcome {
    Completed(FinishReason),
    Cancelled,
    Errored(String),
}

/// A chat with the local server, constructed and owned by the host
pub struct ChatSession {
    config: ChatConfig,
    backend: Arc<dyn ChatBackend>,
    messages: Vec<Message>,
    stream: Option<StreamSession>,
    generation: u64,
    phase: SessionPhase,
    last_outcome: Option<SessionPhase>,
    pipeline: RenderPipeline<MessageId>,
    connection: ConnectionStatus,
    models: Vec<ModelInfo>,
    selected_model: Option<String>,
    inbox_tx: mpsc::UnboundedSender<(u64, StreamUpdate)>,
    inbox_rx: mpsc::UnboundedReceiver<(u64, StreamUpdate)>,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl ChatSession {
    pub fn new(config: ChatConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let pipeline = RenderPipeline::new(config.render.clone());
        Self {
            selected_model: config.model.clone(),
            config,
            backend,
            messages: Vec::new(),
            stream: None,
            generation: 0,
            phase: SessionPhase::Idle,
            last_outcome: None,
            pipeline,
            connection: ConnectionStatus::Unknown,
            models: Vec::new(),
            inbox_tx,
            inbox_rx,
            subscribers: Vec::new(),
        }
    }

    /// Session backed by the HTTP client for `config.server_url`
    pub fn with_local_server(config: ChatConfig) -> Result<Self, ClientError> {
        let client = LocalServerClient::new(ClientConfig::from_chat_config(&config))?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Terminal phase of the most recent stream
    pub fn last_outcome(&self) -> Option<SessionPhase> {
        self.last_outcome
    }

    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    /// Current or most recent stream
    pub fn stream(&self) -> Option<&StreamSession> {
        self.stream.as_ref()
    }

    pub fn connection_status(&self) -> &ConnectionStatus {
        &self.connection
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    /// Model used for the next request
    pub fn model(&self) -> String {
        self.selected_model
            .clone()
            .unwrap_or_else(|| FALLBACK_MODEL.to_string())
    }

    pub fn pipeline(&self) -> &RenderPipeline<MessageId> {
        &self.pipeline
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase == phase {
            return;
        }
        debug!("ChatSession: {} -> {}", self.phase.name(), phase.name());
        self.phase = phase;
        self.emit(SessionEvent::PhaseChanged { phase });
    }

    fn set_connection(&mut self, status: ConnectionStatus) {
        if self.connection == status {
            return;
        }
        self.connection = status.clone();
        self.emit(SessionEvent::ConnectionChanged { status });
    }

    fn active_stream(&self) -> Option<&StreamSession> {
        self.stream.as_ref().filter(|s| s.is_active())
    }

    fn index_of(&self, id: MessageId) -> Result<usize, SessionError> {
        self.messages
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| SessionError::UnknownMessage(id.to_string()))
    }

    /// Query the server for its models and update the connection status.
    /// Failures degrade to an empty list.
    pub async fn refresh_models(&mut self) -> Vec<ModelInfo> {
        match self.backend.list_models().await {
            Ok(models) => {
                info!("ChatSession: server lists {} models", models.len());
                self.models = models.clone();
                let ids = models.iter().map(|m| m.id.clone()).collect();
                self.set_connection(ConnectionStatus::Connected { models: ids });
                if self.config.model.is_none() {
                    if let Some(first) = models.first() {
                        if self.selected_model.as_deref() != Some(first.id.as_str()) {
                            self.selected_model = Some(first.id.clone());
                            self.emit(SessionEvent::ModelSelected {
                                model: first.id.clone(),
                            });
                        }
                    }
                }
                models
            }
            Err(e) => {
                warn!("ChatSession: model listing failed: {}", e);
                self.models.clear();
                self.set_connection(ConnectionStatus::Failure {
                    message: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    /// Explicitly choose the model for subsequent requests
    pub fn select_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        self.selected_model = Some(model.clone());
        self.emit(SessionEvent::ModelSelected { model });
    }

    /// Start a turn: append the user message and an empty assistant reply,
    /// then open a stream into it. A running stream is cancelled first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_message(&mut self, text: &str) -> Result<MessageId, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        if self.active_stream().is_some() {
            self.cancel_generation();
        }

        let user = Message::user(text);
        let user_id = user.id();
        self.messages.push(user);
        self.emit(SessionEvent::MessageAdded { id: user_id });
        self.render_message(user_id, false);

        let assistant = Message::assistant();
        let assistant_id = assistant.id();
        self.messages.push(assistant);
        self.emit(SessionEvent::MessageAdded { id: assistant_id });

        let history = self.history_before(self.messages.len() - 1);
        self.open_stream(assistant_id, 0, history);
        Ok(assistant_id)
    }

    /// Stop the running stream, keeping whatever text arrived. Returns false
    /// if nothing was streaming.
    pub fn cancel_generation(&mut self) -> bool {
        let Some(stream) = self.stream.as_mut().filter(|s| s.is_active()) else {
            return false;
        };
        info!(
            "ChatSession: cancelling stream after {} bytes",
            stream.accumulated_text().len()
        );
        stream.cancel();
        self.finish_stream(Outcome::Cancelled);
        true
    }

    /// Generate a new version of a completed assistant message. The new
    /// version becomes current as soon as streaming starts.
    pub fn regenerate(&mut self, id: MessageId) -> Result<(), SessionError> {
        let index = self.index_of(id)?;
        if self.messages[index].role() != Role::Assistant {
            return Err(SessionError::NotRegenerable);
        }
        if self.active_stream().is_some_and(|s| s.target() == id) {
            return Err(SessionError::NotRegenerable);
        }
        if self.active_stream().is_some() {
            self.cancel_generation();
        }

        let message = &mut self.messages[index];
        let version = message.push_version();
        message.set_current_version(version)?;
        info!("ChatSession: regenerating {} as version {}", id, version);
        self.emit(SessionEvent::VersionChanged { id, index: version });

        let history = self.history_before(index);
        self.open_stream(id, version, history);
        Ok(())
    }

    /// Show another version of a message. No network traffic.
    pub fn navigate_to_version(&mut self, id: MessageId, index: usize) -> Result<(), SessionError> {
        let position = self.index_of(id)?;
        if self.active_stream().is_some_and(|s| s.target() == id) {
            return Err(SessionError::Busy);
        }
        let message = &mut self.messages[position];
        if message.current_version_index() == index {
            return Ok(());
        }
        message.set_current_version(index)?;
        self.emit(SessionEvent::VersionChanged { id, index });
        self.render_message(id, false);
        Ok(())
    }

    /// Drop every message and any running stream
    pub fn clear_session(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.cancel();
        }
        self.stream = None;
        self.messages.clear();
        self.pipeline.clear();
        self.last_outcome = None;
        info!("ChatSession: cleared");
        self.emit(SessionEvent::Cleared);
        self.set_phase(SessionPhase::Idle);
    }

    /// Change display settings; every message reloads on its next render
    pub fn set_render_config(&mut self, config: RenderConfig) {
        self.config.render = config.clone();
        self.pipeline.set_config(config);
    }

    /// Render the current content of a message outside a stream update
    pub fn render(&mut self, id: MessageId) -> Option<RenderOutput> {
        let streaming = self.active_stream().is_some_and(|s| s.target() == id);
        let content = self.message(id)?.display_content().to_string();
        Some(self.pipeline.render(&id, &content, streaming))
    }

    /// Copy a rendered code block of a message to the host clipboard
    pub fn copy_code(
        &self,
        id: MessageId,
        index: usize,
        sink: &mut dyn ClipboardSink,
    ) -> Result<(), RenderError> {
        self.pipeline.copy_code(&id, index, sink)
    }

    /// Apply every stream update already delivered; never waits.
    /// Returns the number applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok((generation, update)) = self.inbox_rx.try_recv() {
            if self.apply(generation, update) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for and apply the next update of the active stream. Returns
    /// false when no stream is active. Cancel-safe.
    pub async fn step(&mut self) -> bool {
        loop {
            if self.active_stream().is_none() {
                return false;
            }
            let Some((generation, update)) = self.inbox_rx.recv().await else {
                return false;
            };
            if self.apply(generation, update) {
                return true;
            }
        }
    }

    /// Apply updates until the active stream ends
    pub async fn drive(&mut self) {
        while self.step().await {}
    }

    /// Conversation sent to the server for a reply at `index`
    fn history_before(&self, index: usize) -> Vec<ChatMessage> {
        let mut history = Vec::new();
        if let Some(prompt) = self.config.system_prompt.as_deref() {
            if !prompt.trim().is_empty() {
                history.push(ChatMessage::new(Role::System, prompt));
            }
        }
        history.extend(
            self.messages[..index]
                .iter()
                .filter(|m| !m.is_failed() && !m.display_content().is_empty())
                .map(|m| ChatMessage::new(m.role(), m.display_content())),
        );
        history
    }

    fn open_stream(&mut self, target: MessageId, version: usize, history: Vec<ChatMessage>) {
        self.generation += 1;
        let stream = StreamSession::new(self.generation, target, version);
        let request = ChatRequest {
            model: self.model(),
            messages: history,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };
        info!(
            "ChatSession: opening stream #{} into {} v{} ({} messages)",
            self.generation,
            target,
            version,
            request.messages.len()
        );
        spawn_stream_task(
            Arc::clone(&self.backend),
            request,
            stream.token(),
            self.generation,
            self.inbox_tx.clone(),
        );
        self.stream = Some(stream);
        self.render_message(target, true);
        self.set_phase(SessionPhase::UserMessageSubmitted);
    }

    /// Apply one update; false if it belonged to a finished stream
    fn apply(&mut self, generation: u64, update: StreamUpdate) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        if stream.generation != generation || !stream.is_active() {
            return false;
        }

        match update {
            StreamUpdate::Part(StreamPart::TextDelta { delta }) => {
                let first = stream.push(&delta);
                let (target, version) = (stream.target(), stream.version_index());
                if let Ok(index) = self.index_of(target) {
                    self.messages[index].append_to_version(version, &delta);
                }
                if first {
                    if !self.connection.is_connected() {
                        let models = self.models.iter().map(|m| m.id.clone()).collect();
                        self.set_connection(ConnectionStatus::Connected { models });
                    }
                    self.set_phase(SessionPhase::Streaming);
                }
                self.render_message(target, true);
            }
            StreamUpdate::Part(StreamPart::Finish { reason }) => {
                self.finish_stream(Outcome::Completed(reason));
            }
            StreamUpdate::Part(StreamPart::Error { error }) => {
                self.finish_stream(Outcome::Errored(error));
            }
            StreamUpdate::OpenFailed(error) => {
                if matches!(
                    error,
                    ClientError::Connect(_) | ClientError::Timeout(_) | ClientError::Status { .. }
                ) {
                    self.set_connection(ConnectionStatus::Failure {
                        message: error.to_string(),
                    });
                }
                self.finish_stream(Outcome::Errored(error.to_string()));
            }
            StreamUpdate::Closed => {
                self.finish_stream(Outcome::Completed(FinishReason::Stop));
            }
        }
        true
    }

    /// Terminal transition shared by completion, cancellation and errors:
    /// deactivate, final non-streaming render, then back to idle.
    fn finish_stream(&mut self, outcome: Outcome) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        stream.deactivate();
        let (target, version) = (stream.target(), stream.version_index());

        let phase = match outcome {
            Outcome::Completed(reason) => {
                if reason != FinishReason::Stop {
                    info!("ChatSession: reply ended early: {:?}", reason);
                }
                SessionPhase::Completed
            }
            Outcome::Cancelled => SessionPhase::Cancelled,
            Outcome::Errored(error) => {
                warn!("ChatSession: stream failed: {}", error);
                if let Ok(index) = self.index_of(target) {
                    self.messages[index].fail_version(version, format!("Error: {}", error));
                }
                self.emit(SessionEvent::StreamFailed { id: target, error });
                SessionPhase::Errored
            }
        };

        self.render_message(target, false);
        self.last_outcome = Some(phase);
        self.set_phase(phase);
        self.set_phase(SessionPhase::Idle);
    }

    fn render_message(&mut self, id: MessageId, streaming: bool) {
        let Some(content) = self.message(id).map(|m| m.display_content().to_string()) else {
            return;
        };
        let output = self.pipeline.render(&id, &content, streaming);
        self.emit(SessionEvent::MessageRendered { id, output });
    }
}

/// Open the stream on the backend and forward its parts to the session.
/// Stops forwarding as soon as `cancel` fires.
fn spawn_stream_task(
    backend: Arc<dyn ChatBackend>,
    request: ChatRequest,
    cancel: CancellationToken,
    generation: u64,
    inbox: mpsc::UnboundedSender<(u64, StreamUpdate)>,
) {
    tokio::spawn(async move {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            opened = backend.stream_chat(request, cancel.clone()) => opened,
        };
        let mut rx = match opened {
            Ok(rx) => rx,
            Err(e) => {
                let _ = inbox.send((generation, StreamUpdate::OpenFailed(e)));
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                part = rx.recv() => match part {
                    Some(part) => {
                        if inbox.send((generation, StreamUpdate::Part(part))).is_err() {
                            return;
                        }
                    }
                    None => {
                        let _ = inbox.send((generation, StreamUpdate::Closed));
                        return;
                    }
                },
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies, one per stream request
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<Vec<StreamPart>, ClientError>>>,
        models: Vec<ModelInfo>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn with_replies(replies: Vec<Vec<StreamPart>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(Ok).collect()),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError> {
            if self.models.is_empty() {
                return Err(ClientError::Connect("connection refused".into()));
            }
            Ok(self.models.clone())
        }

        async fn stream_chat(
            &self,
            request: ChatRequest,
            _cancel: CancellationToken,
        ) -> Result<mpsc::UnboundedReceiver<StreamPart>, ClientError> {
            self.requests.lock().unwrap().push(request);
            let parts = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))?;
            let (tx, rx) = mpsc::unbounded_channel();
            for part in parts {
                tx.send(part).unwrap();
            }
            Ok(rx)
        }
    }

    fn delta(text: &str) -> StreamPart {
        StreamPart::TextDelta {
            delta: text.to_string(),
        }
    }

    fn finish() -> StreamPart {
        StreamPart::Finish {
            reason: FinishReason::Stop,
        }
    }

    fn session_with(backend: ScriptedBackend) -> (ChatSession, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let session = ChatSession::new(ChatConfig::default(), backend.clone());
        (session, backend)
    }

    #[tokio::test]
    async fn test_submit_streams_and_completes() {
        let (mut session, backend) = session_with(ScriptedBackend::with_replies(vec![vec![
            delta("Hello"),
            delta(", world"),
            finish(),
        ]]));
        let mut events = session.subscribe();

        let id = session.submit_message("hi").unwrap();
        assert_eq!(session.phase(), SessionPhase::UserMessageSubmitted);
        assert!(session.is_loading());

        session.drive().await;
        let message = session.message(id).unwrap();
        assert_eq!(message.display_content(), "Hello, world");
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.last_outcome(), Some(SessionPhase::Completed));
        assert!(!session.is_streaming());
        assert_eq!(session.stream().unwrap().accumulated_text(), "Hello, world");
        assert_eq!(session.messages().len(), 2);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, FALLBACK_MODEL);
        assert!(requests[0].stream);
        assert_eq!(
            requests[0].messages,
            vec![ChatMessage::new(Role::User, "hi")]
        );

        let mut phases = Vec::new();
        let mut last_render = None;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::PhaseChanged { phase } => phases.push(phase),
                SessionEvent::MessageRendered { id: rendered, output } if rendered == id => {
                    last_render = Some(output)
                }
                _ => {}
            }
        }
        assert_eq!(
            phases,
            vec![
                SessionPhase::UserMessageSubmitted,
                SessionPhase::Streaming,
                SessionPhase::Completed,
                SessionPhase::Idle,
            ]
        );
        let last_render = last_render.unwrap();
        assert!(last_render.html.contains("Hello, world"));
        assert!(!last_render.html.contains("streaming-cursor"));
    }

    #[tokio::test]
    async fn test_cancel_after_three_of_five_chunks() {
        let (mut session, _) = session_with(ScriptedBackend::with_replies(vec![vec![
            delta("one "),
            delta("two "),
            delta("three "),
            delta("four "),
            delta("five"),
            finish(),
        ]]));
        let id = session.submit_message("count").unwrap();

        for _ in 0..3 {
            assert!(session.step().await);
        }
        assert!(session.is_streaming());
        assert!(session.cancel_generation());

        assert_eq!(
            session.message(id).unwrap().display_content(),
            "one two three "
        );
        assert_eq!(session.last_outcome(), Some(SessionPhase::Cancelled));
        assert!(!session.is_streaming());
        assert!(session.stream().unwrap().is_cancelled());

        // Late parts of the cancelled stream are ignored.
        tokio::task::yield_now().await;
        session.poll();
        assert!(!session.step().await);
        assert_eq!(
            session.message(id).unwrap().display_content(),
            "one two three "
        );
        assert!(!session.cancel_generation());
    }

    #[tokio::test]
    async fn test_regenerate_and_navigate_versions() {
        let (mut session, backend) = session_with(ScriptedBackend::with_replies(vec![
            vec![delta("first answer"), finish()],
            vec![delta("second answer"), finish()],
        ]));
        let id = session.submit_message("question").unwrap();
        session.drive().await;
        assert_eq!(session.message(id).unwrap().version_count(), 1);

        session.regenerate(id).unwrap();
        // The version being generated is current immediately.
        assert_eq!(session.message(id).unwrap().current_version_index(), 1);
        session.drive().await;

        let message = session.message(id).unwrap();
        assert_eq!(message.version_count(), 2);
        assert_eq!(message.current_version_index(), message.version_count() - 1);
        assert_eq!(message.display_content(), "second answer");

        // The regenerated request does not include the reply being replaced.
        let requests = backend.requests();
        assert_eq!(
            requests[1].messages,
            vec![ChatMessage::new(Role::User, "question")]
        );

        session.navigate_to_version(id, 0).unwrap();
        assert_eq!(
            session.message(id).unwrap().display_content(),
            "first answer"
        );
        assert_eq!(
            session.navigate_to_version(id, 5),
            Err(SessionError::InvalidVersion { index: 5, count: 2 })
        );
    }

    #[tokio::test]
    async fn test_regenerate_rejects_user_and_streaming_messages() {
        let (mut session, _) = session_with(ScriptedBackend::with_replies(vec![vec![
            delta("partial"),
        ]]));
        let id = session.submit_message("q").unwrap();
        let user_id = session.messages()[0].id();
        assert_eq!(
            session.regenerate(user_id),
            Err(SessionError::NotRegenerable)
        );
        assert_eq!(session.regenerate(id), Err(SessionError::NotRegenerable));
        assert_eq!(session.navigate_to_version(id, 0), Err(SessionError::Busy));
        assert!(matches!(
            session.regenerate(MessageId::new()),
            Err(SessionError::UnknownMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_error_replaces_content() {
        let (mut session, _) = session_with(ScriptedBackend::with_replies(vec![vec![
            delta("half"),
            StreamPart::Error {
                error: "server went away".into(),
            },
        ]]));
        let mut events = session.subscribe();
        let id = session.submit_message("q").unwrap();
        session.drive().await;

        let message = session.message(id).unwrap();
        assert_eq!(message.display_content(), "Error: server went away");
        assert!(message.is_failed());
        assert_eq!(session.last_outcome(), Some(SessionPhase::Errored));

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::StreamFailed { id: failed_id, .. } = event {
                assert_eq!(failed_id, id);
                failed = true;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn test_open_failure_sets_connection_failure() {
        let backend = ScriptedBackend {
            replies: Mutex::new(VecDeque::from(vec![Err(ClientError::Connect(
                "connection refused".into(),
            ))])),
            ..ScriptedBackend::default()
        };
        let (mut session, _) = session_with(backend);
        let id = session.submit_message("q").unwrap();
        session.drive().await;

        assert!(matches!(
            session.connection_status(),
            ConnectionStatus::Failure { .. }
        ));
        assert!(session
            .message(id)
            .unwrap()
            .display_content()
            .starts_with("Error: server unreachable"));
    }

    #[tokio::test]
    async fn test_submit_while_streaming_cancels_previous() {
        let (mut session, _) = session_with(ScriptedBackend::with_replies(vec![
            vec![delta("slow "), delta("reply")],
            vec![delta("new reply"), finish()],
        ]));
        let first = session.submit_message("one").unwrap();
        assert!(session.step().await);
        let second = session.submit_message("two").unwrap();
        assert_eq!(session.message(first).unwrap().display_content(), "slow ");
        session.drive().await;
        assert_eq!(session.message(second).unwrap().display_content(), "new reply");
        assert_eq!(session.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_models_selects_first() {
        let backend = ScriptedBackend {
            models: vec![ModelInfo { id: "qwen".into() }, ModelInfo { id: "llama".into() }],
            ..ScriptedBackend::default()
        };
        let (mut session, _) = session_with(backend);
        let models = session.refresh_models().await;
        assert_eq!(models.len(), 2);
        assert_eq!(session.model(), "qwen");
        assert_eq!(
            session.connection_status(),
            &ConnectionStatus::Connected {
                models: vec!["qwen".into(), "llama".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_models_failure_falls_back() {
        let (mut session, _) = session_with(ScriptedBackend::default());
        assert!(session.refresh_models().await.is_empty());
        assert_eq!(session.model(), FALLBACK_MODEL);
        assert!(matches!(
            session.connection_status(),
            ConnectionStatus::Failure { .. }
        ));
    }

    #[tokio::test]
    async fn test_clear_session() {
        let (mut session, _) = session_with(ScriptedBackend::with_replies(vec![vec![
            delta("text"),
        ]]));
        let id = session.submit_message("q").unwrap();
        session.step().await;
        session.clear_session();
        assert!(session.messages().is_empty());
        assert!(session.stream().is_none());
        assert!(session.pipeline().state(&id).is_none());
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.step().await);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (mut session, _) = session_with(ScriptedBackend::default());
        assert_eq!(session.submit_message("   "), Err(SessionError::EmptyInput));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_system_prompt_leads_history() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![vec![finish()]]));
        let config = ChatConfig {
            system_prompt: Some("Be brief.".into()),
            model: Some("fixed".into()),
            ..ChatConfig::default()
        };
        let mut session = ChatSession::new(config, backend.clone());
        session.submit_message("hi").unwrap();
        session.drive().await;
        let request = &backend.requests()[0];
        assert_eq!(request.model, "fixed");
        assert_eq!(request.messages[0], ChatMessage::new(Role::System, "Be brief."));
    }
}
