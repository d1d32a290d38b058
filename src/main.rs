use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use picturetalk::conversation::{PRESETS, preset};
use picturetalk::voice::{
    AudioPlayback, CloudSpeech, Microphone, MicrophoneRecognizer, PLAYBACK_SAMPLE_RATE,
    SilentSpeech, SpeechBackend, SpeechCaptureSession, SpeechSynthesizer, SpeechToText,
    TextToSpeech, VoiceCatalogue, rms, select_voice,
};
use picturetalk::{
    ChatCompletionsClient, Config, ConversationEvent, ConversationOrchestrator, InferenceClient,
    SubjectContext,
};

/// picturetalk - talk with an AI tutor about a picture
#[derive(Parser)]
#[command(name = "picturetalk", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Don't speak replies aloud
    #[arg(long)]
    mute: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Hold a conversation about a picture (default)
    Talk {
        /// Index of a built-in subject (see `subjects`)
        #[arg(short, long, default_value = "0")]
        subject: usize,
        /// Custom subject title (overrides --subject)
        #[arg(long)]
        title: Option<String>,
        /// Custom subject description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List the built-in subjects
    Subjects,
    /// List available voices and the one that will be used
    Voices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! Let's talk about this picture together.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,picturetalk=info",
        1 => "info,picturetalk=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if cli.mute {
        config.voice.enabled = false;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Talk {
        subject: 0,
        title: None,
        description: String::new(),
    }) {
        Command::Talk {
            subject,
            title,
            description,
        } => {
            let subject = match title {
                Some(title) => SubjectContext::new(title, description),
                None => preset(subject)
                    .with_context(|| format!("no subject {subject}; see `picturetalk subjects`"))?,
            };
            talk(config, subject).await
        }
        Command::Subjects => {
            list_subjects();
            Ok(())
        }
        Command::Voices => {
            list_voices(&config);
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

/// Run an interactive conversation
async fn talk(config: Config, subject: SubjectContext) -> anyhow::Result<()> {
    let inference = ChatCompletionsClient::from_config(&config).map(|client| {
        tracing::info!(model = client.model(), "inference ready");
        Arc::new(client) as Arc<dyn InferenceClient>
    });

    let openai_key = config
        .openai_key()
        .context("speech capture needs an OpenAI key (set OPENAI_API_KEY)")?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let stt = SpeechToText::new(openai_key.clone(), config.voice.stt_model.clone())?;
    let recognizer = MicrophoneRecognizer::spawn(stt, events_tx)?;
    let capture = SpeechCaptureSession::new(Box::new(recognizer), events_rx);

    let backend: Arc<dyn SpeechBackend> = if config.voice.enabled {
        let tts = TextToSpeech::new(openai_key, config.voice.tts_model.clone(), config.voice.speed)?;
        Arc::new(CloudSpeech::new(tts))
    } else {
        tracing::info!("replies will not be spoken");
        Arc::new(SilentSpeech)
    };
    let catalogue = VoiceCatalogue::loaded(config.voice.catalogue.clone());
    let mut synthesizer =
        SpeechSynthesizer::new(backend, catalogue.selector(config.voice.preference.clone()));
    if let Some(voice) = synthesizer.selected_voice() {
        tracing::info!(voice = %voice.id, locale = %voice.locale, "voice selected");
    }

    let handle =
        ConversationOrchestrator::spawn(config.conversation.clone(), inference, capture, synthesizer);
    let printer = tokio::spawn(print_events(handle.subscribe()));

    println!("Picture: {}", subject.visual_context());
    println!("Press Enter to start or end the conversation, 'q' to quit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }
        let snapshot = handle.snapshot().await?;
        if snapshot.state.is_active() {
            handle.end().await?;
        } else if let Err(e) = handle.start(subject.clone()).await {
            tracing::debug!(error = %e, "conversation did not start");
        }
    }

    handle.end().await?;
    drop(handle);
    printer.abort();
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<ConversationEvent>) {
    loop {
        match events.recv().await {
            Ok(ConversationEvent::StateChanged(state)) => println!("[{state}]"),
            Ok(ConversationEvent::Transcript { text, is_final }) => {
                if is_final {
                    println!("you: {text}");
                } else {
                    println!("  ... {text}");
                }
            }
            Ok(ConversationEvent::Display(text)) => println!("tutor: {text}"),
            Ok(ConversationEvent::Notice { text, .. }) => println!("! {text}"),
            Ok(ConversationEvent::Background(emojis)) => println!("background: {emojis}"),
            Ok(
                ConversationEvent::History(_)
                | ConversationEvent::ToolIgnored { .. }
                | ConversationEvent::Ended { .. },
            ) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn list_subjects() {
    for (index, (title, description)) in PRESETS.iter().enumerate() {
        println!("{index}: {title} - {description}");
    }
}

fn list_voices(config: &Config) {
    let preference = &config.voice.preference;
    let selected = select_voice(&config.voice.catalogue, preference);

    println!(
        "Preferred locale: {} (fallback {})",
        preference.preferred_locale, preference.fallback_locale
    );
    for voice in &config.voice.catalogue {
        let marker = if selected.is_some_and(|s| s.id == voice.id) { "*" } else { " " };
        println!("{marker} {:<10} {:<10} {}", voice.id, voice.name, voice.locale);
    }
    if selected.is_none() {
        println!("No voice matches; the platform default will be used.");
    }
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    // cpal streams stay on the thread that created them
    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = std::thread::spawn(move || -> picturetalk::Result<()> {
        let mut mic = Microphone::open()?;
        mic.start()?;
        for _ in 0..duration {
            std::thread::sleep(Duration::from_secs(1));
            if tx.send(mic.take_samples()).is_err() {
                break;
            }
        }
        mic.stop();
        Ok(())
    });

    let mut second = 0;
    while let Some(samples) = rx.recv().await {
        second += 1;
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{second:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");
    }

    worker
        .join()
        .map_err(|_| anyhow::anyhow!("microphone thread panicked"))??;

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let rate = PLAYBACK_SAMPLE_RATE as f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE * 2)
        .map(|i| {
            let t = i as f32 / rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    tokio::task::spawn_blocking(move || {
        AudioPlayback::new()?.play(samples, &CancellationToken::new())
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::new(
        config.openai_key()?,
        config.voice.tts_model.clone(),
        config.voice.speed,
    )?;
    let voice = select_voice(&config.voice.catalogue, &config.voice.preference);
    println!("Voice: {}", voice.map_or("default", |v| v.id.as_str()));

    println!("Synthesizing and playing...");
    CloudSpeech::new(tts)
        .speak(text, voice, CancellationToken::new())
        .await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
