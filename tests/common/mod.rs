//! Shared test utilities
//!
//! Scripted stand-ins for the recognition engine, the inference client and
//! the speech backend, plus a harness that wires them to an orchestrator.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use picturetalk::config::ConversationConfig;
use picturetalk::voice::{
    Fragment, RecognitionEngine, RecognitionEvent, RecognitionSender, SpeechBackend,
    SpeechCaptureSession, SpeechSynthesizer, Voice, VoiceCatalogue, VoicePreference,
    default_catalogue,
};
use picturetalk::{
    ConversationEvent, ConversationHandle, ConversationOrchestrator, ConversationState, Error,
    InferenceClient, InferenceReply, InferenceRequest, NoticeKind, SubjectContext,
};

/// Start/stop counters shared between a [`ScriptedEngine`] and its [`FakeMic`]
#[derive(Debug, Default)]
pub struct EngineProbe {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Recognition engine that only counts calls; results are pushed by the test
pub struct ScriptedEngine {
    probe: Arc<EngineProbe>,
}

impl RecognitionEngine for ScriptedEngine {
    fn start(&mut self) -> picturetalk::Result<()> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test side of a scripted engine
pub struct FakeMic {
    tx: RecognitionSender,
    probe: Arc<EngineProbe>,
}

impl FakeMic {
    /// Deliver one final utterance
    pub fn say(&self, text: &str) {
        self.send(RecognitionEvent::Results(vec![Fragment::final_text(text)]));
    }

    /// Deliver a live, uncommitted guess
    pub fn interim(&self, text: &str) {
        self.send(RecognitionEvent::Results(vec![Fragment::interim(text)]));
    }

    pub fn fail(&self, kind: &str) {
        self.send(RecognitionEvent::Error(kind.to_string()));
    }

    pub fn end_stream(&self) {
        self.send(RecognitionEvent::Ended);
    }

    pub fn send(&self, event: RecognitionEvent) {
        self.tx.send(event).expect("capture session dropped");
    }

    pub fn starts(&self) -> usize {
        self.probe.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.probe.stops.load(Ordering::SeqCst)
    }
}

/// Build a capture session over a scripted engine
pub fn scripted_capture() -> (SpeechCaptureSession, FakeMic) {
    let (tx, rx) = mpsc::unbounded_channel();
    let probe = Arc::new(EngineProbe::default());
    let engine = ScriptedEngine {
        probe: Arc::clone(&probe),
    };
    (
        SpeechCaptureSession::new(Box::new(engine), rx),
        FakeMic { tx, probe },
    )
}

enum Scripted {
    Reply(InferenceReply),
    Fail(String),
}

/// Inference client that answers from a queue, optionally waiting on a gate
#[derive(Default)]
pub struct ScriptedInference {
    script: Mutex<VecDeque<(Scripted, Option<oneshot::Receiver<()>>)>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn reply(&self, text: &str) {
        self.reply_with(InferenceReply {
            text: text.to_string(),
            tool_calls: Vec::new(),
        });
    }

    pub fn reply_with(&self, reply: InferenceReply) {
        self.push(Scripted::Reply(reply), None);
    }

    pub fn fail(&self, message: &str) {
        self.push(Scripted::Fail(message.to_string()), None);
    }

    /// Queue a reply that is held back until the returned sender fires
    pub fn gated_reply(&self, text: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            Scripted::Reply(InferenceReply {
                text: text.to_string(),
                tool_calls: Vec::new(),
            }),
            Some(rx),
        );
        tx
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, outcome: Scripted, gate: Option<oneshot::Receiver<()>>) {
        self.script.lock().unwrap().push_back((outcome, gate));
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn complete(&self, request: InferenceRequest) -> picturetalk::Result<InferenceReply> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        let Some((outcome, gate)) = next else {
            return Ok(InferenceReply {
                text: "Tell me more!".to_string(),
                tool_calls: Vec::new(),
            });
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match outcome {
            Scripted::Reply(reply) => Ok(reply),
            Scripted::Fail(message) => Err(Error::Inference(message)),
        }
    }
}

/// Speech backend that records what it was asked to say
pub struct RecordingSpeech {
    duration: Duration,
    spoken: Mutex<Vec<(String, Option<String>)>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl RecordingSpeech {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            spoken: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().iter().map(|(text, _)| text.clone()).collect()
    }

    /// Voice id used for each utterance
    pub fn voices(&self) -> Vec<Option<String>> {
        self.spoken.lock().unwrap().iter().map(|(_, voice)| voice.clone()).collect()
    }

    pub fn cancelled(&self) -> usize {
        self.tokens.lock().unwrap().iter().filter(|t| t.is_cancelled()).count()
    }
}

#[async_trait]
impl SpeechBackend for RecordingSpeech {
    async fn speak(
        &self,
        text: &str,
        voice: Option<&Voice>,
        cancel: CancellationToken,
    ) -> picturetalk::Result<()> {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), voice.map(|v| v.id.clone())));
        self.tokens.lock().unwrap().push(cancel.clone());
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(self.duration) => {}
        }
        Ok(())
    }
}

pub fn subject() -> SubjectContext {
    SubjectContext::new("Friendly Dog", "A happy golden retriever playing in the park")
}

/// Orchestrator wired to scripted collaborators
pub struct Harness {
    pub handle: ConversationHandle,
    pub events: broadcast::Receiver<ConversationEvent>,
    pub seen: Vec<ConversationEvent>,
    pub mic: FakeMic,
    pub inference: Arc<ScriptedInference>,
    pub speech: Arc<RecordingSpeech>,
    pub catalogue: VoiceCatalogue,
}

pub fn harness() -> Harness {
    harness_with(ConversationConfig::default(), Duration::from_millis(200))
}

pub fn harness_with(config: ConversationConfig, speech_duration: Duration) -> Harness {
    let inference = Arc::new(ScriptedInference::default());
    build(config, speech_duration, Ok(Arc::clone(&inference) as Arc<dyn InferenceClient>), inference)
}

/// Harness whose inference client could not be configured
pub fn harness_without_key() -> Harness {
    build(
        ConversationConfig::default(),
        Duration::from_millis(200),
        Err(Error::Config("inference API key is not set".to_string())),
        Arc::new(ScriptedInference::default()),
    )
}

fn build(
    config: ConversationConfig,
    speech_duration: Duration,
    client: picturetalk::Result<Arc<dyn InferenceClient>>,
    inference: Arc<ScriptedInference>,
) -> Harness {
    let (capture, mic) = scripted_capture();
    let speech = Arc::new(RecordingSpeech::new(speech_duration));
    let catalogue = VoiceCatalogue::loaded(default_catalogue());
    let synthesizer = SpeechSynthesizer::new(
        Arc::clone(&speech) as Arc<dyn SpeechBackend>,
        catalogue.selector(VoicePreference::default()),
    );
    let handle = ConversationOrchestrator::spawn(config, client, capture, synthesizer);
    let events = handle.subscribe();

    Harness {
        handle,
        events,
        seen: Vec::new(),
        mic,
        inference,
        speech,
        catalogue,
    }
}

impl Harness {
    /// Wait until the orchestrator publishes `state`
    pub async fn wait_for_state(&mut self, state: ConversationState) {
        let wait = async {
            loop {
                match self.events.recv().await {
                    Ok(event) => {
                        let reached = matches!(event, ConversationEvent::StateChanged(s) if s == state);
                        self.seen.push(event);
                        if reached {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("orchestrator stopped"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(600), wait)
            .await
            .unwrap_or_else(|_| panic!("never reached {state}"));
    }

    /// Collect everything published so far
    pub fn drain(&mut self) -> &[ConversationEvent] {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.seen.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        &self.seen
    }

    pub fn notices(&mut self, kind: NoticeKind) -> Vec<String> {
        self.drain()
            .iter()
            .filter_map(|event| match event {
                ConversationEvent::Notice { kind: k, text } if *k == kind => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}
