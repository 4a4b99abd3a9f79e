//! callpilot terminal front end.
//!
//! Stands in for the embeddable browser widget: reads one command per line
//! from stdin, forwards it to the widget, and prints call state changes,
//! alerts and transcript turns as they happen. The voice side runs on the
//! loopback SDK since there is no audio stack here.

use callpilot_store::{ConsentStore, LocalStorage};
use callpilot_types::CallState;
use callpilot_voice::LoopbackSdk;
use callpilot_widget::{
    config, AccessGate, ApiClient, ButtonAppearance, CallSessionController, GuideConversation,
    GuideFetcher, Notice, Widget, WidgetError,
};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

const GREETING: &str = "Hi! How can I help you today?";

const HELP: &str = "\
commands:
  call          start or end a voice call
  mute          toggle the microphone
  end           end the call
  ask <q>       ask the agent a question (new conversation)
  more <q>      ask a follow-up question
  yes | no      answer the consent dialog
  back          dismiss the consent dialog
  share         toggle data sharing
  status        show widget state
  esc           end the call and close everything
  quit          exit";

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CALLPILOT_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "callpilot exited with an error");
            eprintln!("callpilot: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), WidgetError> {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("callpilot.toml"));

    let config = config::load_config(selected_config_path)?;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let agent_id = config.agent_id()?.to_string();
    let api = ApiClient::new(&config.api)?;

    let access = AccessGate::new(api.clone(), config.access.clone())
        .check()
        .await;
    if !access.allowed {
        tracing::info!("visitor is not allowed to use the widget");
        println!("The assistant is not available for this account.");
        return Ok(());
    }

    let storage = LocalStorage::open(&config.storage.path)?;
    let consent = ConsentStore::new(storage);

    let sdk = LoopbackSdk::new().with_greeting(GREETING);
    let controller = CallSessionController::new(Some(agent_id.clone()), api.clone(), sdk);
    let calls = controller.spawn();

    tokio::spawn(render_notices(calls.subscribe_notices()));

    let guide = GuideConversation::new(api, agent_id.as_str());
    let mut widget = Widget::new(calls.clone(), consent, guide, access.email)?;

    tracing::info!(base_url = %config.api.base_url, "callpilot ready");
    println!("{HELP}");
    print_status(&widget);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            () = shutdown_signal() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read stdin");
                break;
            }
        };

        match dispatch(&mut widget, line.trim()).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(WidgetError::ControllerClosed) => break,
            Err(e) => {
                tracing::warn!(error = %e, "command failed");
                println!("! {e}");
            }
        }
    }

    calls.shutdown().await.ok();
    tracing::info!("callpilot shut down");
    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

async fn dispatch<G: GuideFetcher>(
    widget: &mut Widget<G>,
    line: &str,
) -> Result<Flow, WidgetError> {
    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "call" => {
            widget.click_call().await?;
            if widget.consent_dialog_open() {
                print_consent_prompt();
            }
        }
        "mute" => widget.toggle_mute().await?,
        "end" => widget.calls().end_call().await?,
        "ask" => print_reply(widget.ask(argument).await, widget.guide().last_error()),
        "more" => print_reply(widget.follow_up(argument).await, widget.guide().last_error()),
        "yes" | "no" if widget.consent_dialog_open() => {
            widget.answer_consent(command == "yes").await?;
        }
        "back" => widget.consent_back(),
        "share" => {
            widget.toggle_data_sharing()?;
            if widget.consent_dialog_open() {
                print_consent_prompt();
            } else {
                println!("data sharing is off");
            }
        }
        "status" => print_status(widget),
        "esc" => widget.escape().await?,
        "quit" | "exit" => return Ok(Flow::Quit),
        "help" => println!("{HELP}"),
        other => println!("unknown command '{other}', type 'help'"),
    }
    Ok(Flow::Continue)
}

fn print_reply(
    reply: Result<Option<callpilot_types::TranscriptEntry>, WidgetError>,
    alert: Option<&str>,
) {
    match reply {
        Ok(Some(entry)) => println!("{}: {}", entry.role, entry.content),
        Ok(None) => {}
        Err(_) => println!("! {}", alert.unwrap_or("Failed to fetch response.")),
    }
}

fn print_consent_prompt() {
    println!(
        "We record conversations. The transcript and audio of your call are \
         stored to improve the service. Continue? (yes / no / back)"
    );
}

fn print_status<G: GuideFetcher>(widget: &Widget<G>) {
    let snapshot = widget.calls().snapshot();
    let button = widget.button();
    println!(
        "[{}] call={} muted={} consent={:?} text_modal={}",
        button.label,
        snapshot.state,
        snapshot.muted,
        widget.consent_status(),
        widget.text_modal_open()
    );
}

async fn render_notices(mut notices: broadcast::Receiver<Notice>) {
    let mut last_state = CallState::Idle;
    loop {
        match notices.recv().await {
            Ok(Notice::StateChanged(snapshot)) => {
                if snapshot.state != last_state {
                    last_state = snapshot.state;
                    let button = ButtonAppearance::for_snapshot(snapshot);
                    println!("[{}] call is {}", button.label, snapshot.state);
                } else if snapshot.state == CallState::Active {
                    println!("microphone {}", if snapshot.muted { "muted" } else { "live" });
                }
            }
            Ok(Notice::Failure(message)) => println!("! {message}"),
            Ok(Notice::Transcript(changes)) => {
                for change in changes {
                    println!("{}: {}", change.entry.role, change.entry.content);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notice renderer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
        () = terminate => { tracing::info!("received SIGTERM, shutting down"); }
    }
}
