//! Conversation orchestrator
//!
//! A single task owns the state machine and reacts to commands, capture
//! events, inference completions, playback completion and its own timers.
//! Inference runs in a spawned task and reports back tagged with the
//! session it belongs to, so replies that outlive their session are
//! discarded on arrival.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::events::{ConversationEvent, EndReason, NoticeKind};
use super::message::{Message, MessageLog};
use super::state::ConversationState;
use super::subject::SubjectContext;
use crate::config::ConversationConfig;
use crate::inference::{InferenceClient, InferenceReply, InferenceRequest, Turn};
use crate::tools::{Dispatch, ToolCallProcessor, UiEffect};
use crate::voice::{
    CaptureErrorKind, CaptureEvent, Playback, PlaybackOutcome, SpeechCaptureSession,
    SpeechSynthesizer,
};
use crate::{Error, Result};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Point-in-time view of the orchestrator
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: ConversationState,
    pub messages: Vec<Message>,
    /// Current assistant-facing display text
    pub display: String,
    pub subject: SubjectContext,
    /// Final transcripts dropped during the current session
    pub dropped_transcripts: u64,
    /// Identifier of the current or last session
    pub session: Option<Uuid>,
}

enum Command {
    Start {
        subject: SubjectContext,
        reply: oneshot::Sender<Result<()>>,
    },
    End {
        reply: oneshot::Sender<()>,
    },
    RetryCapture {
        reply: oneshot::Sender<Result<()>>,
    },
    SetSubject(SubjectContext),
    Snapshot(oneshot::Sender<Snapshot>),
}

struct Completion {
    session: Uuid,
    result: Result<InferenceReply>,
}

/// Cloneable handle to a running orchestrator
#[derive(Clone)]
pub struct ConversationHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ConversationEvent>,
}

impl ConversationHandle {
    /// Start a session about `subject`
    ///
    /// Returns once the greeting has been requested. Starting while a
    /// session is active is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no inference credential is configured,
    /// or `Error::Closed` if the orchestrator has stopped
    pub async fn start(&self, subject: SubjectContext) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { subject, reply }).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// End the current session
    ///
    /// Capture and synthesis are stopped before this returns; an in-flight
    /// inference request is abandoned.
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` if the orchestrator has stopped
    pub async fn end(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::End { reply }).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Restart capture after a non-retryable capture error
    ///
    /// # Errors
    ///
    /// Returns the capture engine's error if it cannot start
    pub async fn retry_capture(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RetryCapture { reply }).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Change the subject used for subsequent turns
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` if the orchestrator has stopped
    pub async fn set_subject(&self, subject: SubjectContext) -> Result<()> {
        self.send(Command::SetSubject(subject)).await
    }

    /// Current state, log and display text
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` if the orchestrator has stopped
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Subscribe to conversation events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| Error::Closed)
    }
}

/// Owner of the conversation state machine
pub struct ConversationOrchestrator {
    config: ConversationConfig,
    inference: std::result::Result<Arc<dyn InferenceClient>, String>,
    capture: SpeechCaptureSession,
    synthesizer: SpeechSynthesizer,
    tools: ToolCallProcessor,

    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    events: broadcast::Sender<ConversationEvent>,

    state: ConversationState,
    log: MessageLog,
    subject: SubjectContext,
    display: String,
    session: Option<Uuid>,
    in_flight: Option<JoinHandle<()>>,

    deadline: Option<Instant>,
    playback: Option<Playback>,
    resume_at: Option<Instant>,
    restart_at: Option<Instant>,
    restart_attempts: u32,

    last_accepted: Option<String>,
    restarted_at: Option<Instant>,
    dropped_transcripts: u64,
}

impl ConversationOrchestrator {
    /// Spawn the orchestrator task
    ///
    /// `inference` is the result of building the inference client; an
    /// error is held and reported as a configuration notice on every start
    /// attempt. Must be called within a Tokio runtime.
    pub fn spawn(
        config: ConversationConfig,
        inference: Result<Arc<dyn InferenceClient>>,
        capture: SpeechCaptureSession,
        synthesizer: SpeechSynthesizer,
    ) -> ConversationHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let inference = inference.map_err(|e| match e {
            Error::Config(message) => message,
            other => other.to_string(),
        });
        if let Err(message) = &inference {
            tracing::warn!(error = %message, "inference unavailable; conversations cannot start");
        }

        let orchestrator = Self {
            config,
            inference,
            capture,
            synthesizer,
            tools: ToolCallProcessor::new(),
            commands,
            completions_tx,
            completions,
            events: events.clone(),
            state: ConversationState::Idle,
            log: MessageLog::new(),
            subject: SubjectContext::default(),
            display: String::new(),
            session: None,
            in_flight: None,
            deadline: None,
            playback: None,
            resume_at: None,
            restart_at: None,
            restart_attempts: 0,
            last_accepted: None,
            restarted_at: None,
            dropped_transcripts: 0,
        };
        tokio::spawn(orchestrator.run());

        ConversationHandle {
            commands: commands_tx,
            events,
        }
    }

    async fn run(mut self) {
        tracing::debug!("conversation orchestrator running");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = self.completions.recv() => self.on_completion(completion),
                event = self.capture.next_event(), if self.capture.is_active() => match event {
                    Some(event) => self.on_capture(event),
                    None => self.on_capture_closed(),
                },
                outcome = wait_playback(&mut self.playback), if self.playback.is_some() => {
                    tracing::debug!(?outcome, "playback finished");
                    self.playback = None;
                    self.schedule_resume();
                }
                () = wait_until(self.deadline), if self.deadline.is_some() => {
                    self.end(EndReason::Timeout);
                }
                () = wait_until(self.resume_at), if self.resume_at.is_some() => {
                    self.resume_at = None;
                    self.resume_capture();
                }
                () = wait_until(self.restart_at), if self.restart_at.is_some() => {
                    self.restart_at = None;
                    self.restart_capture();
                }
            }
        }

        self.capture.stop();
        self.synthesizer.cancel();
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        tracing::debug!("conversation orchestrator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { subject, reply } => {
                let _ = reply.send(self.start(subject));
            }
            Command::End { reply } => {
                self.end(EndReason::User);
                let _ = reply.send(());
            }
            Command::RetryCapture { reply } => {
                let _ = reply.send(self.retry_capture());
            }
            Command::SetSubject(subject) => {
                tracing::debug!(title = %subject.title, "subject changed");
                self.subject = subject;
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn start(&mut self, subject: SubjectContext) -> Result<()> {
        if !self.state.can_start() {
            tracing::debug!(state = %self.state, "start ignored; session already active");
            return Ok(());
        }

        if let Err(message) = &self.inference {
            let message = message.clone();
            tracing::error!(error = %message, "cannot start conversation");
            self.notice(NoticeKind::Configuration, message.clone());
            return Err(Error::Config(message));
        }

        let session = Uuid::new_v4();
        tracing::info!(%session, title = %subject.title, "conversation started");

        self.session = Some(session);
        self.subject = subject;
        self.log.clear();
        self.display.clear();
        self.dropped_transcripts = 0;
        self.restart_attempts = 0;
        self.last_accepted = None;
        self.restarted_at = None;
        self.playback = None;
        self.resume_at = None;
        self.restart_at = None;
        self.deadline = Some(Instant::now() + self.config.session);

        self.capture.stop();
        self.capture.take_discarded_finals();
        self.set_state(ConversationState::Greeting);
        self.publish(ConversationEvent::History(Vec::new()));
        self.request_reply(Turn::Initial, Vec::new());
        Ok(())
    }

    fn end(&mut self, reason: EndReason) {
        if !self.state.is_active() {
            tracing::debug!(state = %self.state, "end ignored; no active session");
            return;
        }

        self.capture.stop();
        self.synthesizer.cancel();
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.deadline = None;
        self.playback = None;
        self.resume_at = None;
        self.restart_at = None;

        tracing::info!(?reason, turns = self.log.len(), "conversation ended");
        self.set_state(ConversationState::Ended);
        let notice = reason.notice();
        self.display = notice.to_string();
        self.notice(NoticeKind::Ended, notice.to_string());
        self.publish(ConversationEvent::Display(self.display.clone()));
        self.publish(ConversationEvent::Ended { reason });
    }

    fn retry_capture(&mut self) -> Result<()> {
        if self.state != ConversationState::Listening || self.capture.is_active() {
            tracing::debug!(state = %self.state, "capture retry ignored");
            return Ok(());
        }
        self.restart_attempts = 0;
        self.restart_at = None;
        self.restarted_at = Some(Instant::now());
        self.start_capture()
    }

    fn request_reply(&mut self, turn: Turn, history: Vec<Message>) {
        let Some(session) = self.session else {
            return;
        };
        let client = match &self.inference {
            Ok(client) => Arc::clone(client),
            Err(message) => {
                let result = Err(Error::Config(message.clone()));
                self.on_completion(Completion { session, result });
                return;
            }
        };

        let request = InferenceRequest {
            subject: self.subject.clone(),
            history,
            turn,
        };
        let tx = self.completions_tx.clone();

        tracing::debug!(initial = request.turn.is_initial(), "requesting reply");
        self.in_flight = Some(tokio::spawn(async move {
            let result = client.complete(request).await;
            let _ = tx.send(Completion { session, result });
        }));
    }

    fn on_completion(&mut self, completion: Completion) {
        if self.session != Some(completion.session) || !self.state.is_processing() {
            tracing::debug!(session = %completion.session, "discarding stale reply");
            return;
        }
        self.in_flight = None;

        match completion.result {
            Ok(reply) => self.apply_reply(reply),
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                let text = format!("Sorry, I couldn't answer that. {e}");
                self.display.clone_from(&text);
                self.notice(NoticeKind::Inference, text);
                self.publish(ConversationEvent::Display(self.display.clone()));
                self.resume_capture();
            }
        }
    }

    fn apply_reply(&mut self, reply: InferenceReply) {
        let InferenceReply { text, tool_calls } = reply;
        self.log.push_assistant(text.clone());
        self.publish(ConversationEvent::History(self.log.snapshot()));

        self.display.clone_from(&text);
        self.publish(ConversationEvent::Display(text.clone()));

        for dispatch in self.tools.process(&tool_calls) {
            match dispatch {
                Dispatch::Effect(UiEffect::Status(message)) => {
                    self.display.clone_from(&message);
                    self.publish(ConversationEvent::Display(message));
                }
                Dispatch::Effect(UiEffect::Background(emojis)) => {
                    self.publish(ConversationEvent::Background(emojis));
                }
                Dispatch::Ignored { kind } => {
                    self.publish(ConversationEvent::ToolIgnored { kind });
                }
            }
        }

        let playback = self.synthesizer.speak(&text);
        if self.config.wait_for_playback {
            self.playback = Some(playback);
        } else {
            self.schedule_resume();
        }
    }

    fn schedule_resume(&mut self) {
        if !self.state.is_processing() {
            return;
        }
        tracing::trace!(grace = ?self.config.resume_grace, "capture resume scheduled");
        self.resume_at = Some(Instant::now() + self.config.resume_grace);
    }

    fn resume_capture(&mut self) {
        if !self.state.is_processing() {
            return;
        }
        self.set_state(ConversationState::Listening);
        if let Err(e) = self.start_capture() {
            tracing::warn!(error = %e, "capture did not resume");
        }
    }

    fn restart_capture(&mut self) {
        if self.state != ConversationState::Listening {
            tracing::debug!(state = %self.state, "discarding capture restart");
            return;
        }
        self.restarted_at = Some(Instant::now());
        if let Err(e) = self.start_capture() {
            tracing::warn!(error = %e, "capture restart failed");
        }
    }

    fn start_capture(&mut self) -> Result<()> {
        let result = self.capture.start();
        let dropped = self.capture.take_discarded_finals();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped transcripts received while not listening");
            self.dropped_transcripts += dropped;
        }
        if let Err(e) = &result {
            self.notice(NoticeKind::Capture, format!("Couldn't start listening: {e}"));
        }
        result
    }

    fn on_capture(&mut self, event: CaptureEvent) {
        if self.state != ConversationState::Listening {
            if matches!(event, CaptureEvent::Final(_)) {
                self.dropped_transcripts += 1;
                tracing::debug!(state = %self.state, "dropping transcript outside listening");
            }
            self.capture.stop();
            return;
        }

        match event {
            CaptureEvent::Interim(text) => {
                self.publish(ConversationEvent::Transcript {
                    text,
                    is_final: false,
                });
            }
            CaptureEvent::Final(text) => self.on_final(text),
            CaptureEvent::Error(kind) => self.on_capture_error(&kind),
            CaptureEvent::Ended => {
                tracing::debug!("capture ended unexpectedly");
                self.schedule_restart(None);
            }
        }
    }

    fn on_final(&mut self, text: String) {
        self.publish(ConversationEvent::Transcript {
            text: text.clone(),
            is_final: true,
        });

        if self.is_duplicate(&text) {
            self.dropped_transcripts += 1;
            tracing::debug!("dropping duplicate transcript");
            return;
        }

        self.capture.stop();
        self.restart_attempts = 0;
        self.restart_at = None;
        self.last_accepted = Some(text.clone());
        self.restarted_at = None;

        let history = self.log.snapshot();
        self.log.push_user(text.clone());
        self.publish(ConversationEvent::History(self.log.snapshot()));
        self.set_state(ConversationState::Processing);
        self.request_reply(Turn::User(text), history);
    }

    /// The last accepted final replayed soon after a capture restart
    fn is_duplicate(&self, text: &str) -> bool {
        let (Some(previous), Some(since)) = (&self.last_accepted, self.restarted_at) else {
            return false;
        };
        previous == text && since.elapsed() < self.config.duplicate_window
    }

    fn on_capture_error(&mut self, kind: &CaptureErrorKind) {
        if kind.is_transient() {
            self.schedule_restart(Some(kind));
        } else {
            self.notice(
                NoticeKind::Capture,
                format!("Speech capture stopped ({kind}). Retry to keep talking."),
            );
        }
    }

    fn schedule_restart(&mut self, kind: Option<&CaptureErrorKind>) {
        if self.restart_attempts >= self.config.capture_retry_limit {
            let reason = kind.map_or("stream ended", CaptureErrorKind::as_str);
            tracing::warn!(attempts = self.restart_attempts, reason, "giving up on capture restarts");
            self.notice(
                NoticeKind::Capture,
                format!("Speech capture stopped ({reason}). Retry to keep talking."),
            );
            return;
        }

        let delay = self
            .config
            .capture_retry_base
            .saturating_mul(2u32.saturating_pow(self.restart_attempts));
        self.restart_attempts += 1;
        tracing::debug!(attempt = self.restart_attempts, ?delay, "capture restart scheduled");
        self.restart_at = Some(Instant::now() + delay);
    }

    fn on_capture_closed(&mut self) {
        tracing::error!("capture engine went away");
        self.capture.stop();
        self.notice(
            NoticeKind::Capture,
            format!("Speech capture unavailable ({}).", CaptureErrorKind::AudioCapture),
        );
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            messages: self.log.snapshot(),
            display: self.display.clone(),
            subject: self.subject.clone(),
            dropped_transcripts: self.dropped_transcripts,
            session: self.session,
        }
    }

    fn set_state(&mut self, next: ConversationState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.publish(ConversationEvent::StateChanged(next));
    }

    fn notice(&self, kind: NoticeKind, text: String) {
        self.publish(ConversationEvent::Notice { kind, text });
    }

    fn publish(&self, event: ConversationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_playback(playback: &mut Option<Playback>) -> PlaybackOutcome {
    match playback {
        Some(playback) => playback.await,
        None => std::future::pending().await,
    }
}
