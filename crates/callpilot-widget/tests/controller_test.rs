use callpilot_types::{CallCredentials, CallSnapshot, CallState, TranscriptEntry};
use callpilot_voice::{LoopbackRemote, LoopbackSdk, SdkEvent, SdkEventKind};
use callpilot_widget::{CallSessionController, CredentialFetcher, Notice, WidgetError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

const STEP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy)]
enum Outcome {
    Credentials,
    Network,
    Malformed,
}

/// Counts requests and can hold them until released.
#[derive(Clone)]
struct FakeFetcher {
    calls: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
    outcome: Outcome,
}

impl FakeFetcher {
    fn new(outcome: Outcome) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            outcome,
        }
    }

    fn held(outcome: Outcome) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            ..Self::new(outcome)
        }
    }

    fn release(&self, requests: usize) {
        self.gate.add_permits(requests);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialFetcher for FakeFetcher {
    async fn register_call(&self, agent_id: &str) -> Result<CallCredentials, WidgetError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(agent_id, "agent_1");
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        match self.outcome {
            Outcome::Credentials => Ok(CallCredentials::new(format!("c{n}"), format!("t{n}"))),
            Outcome::Network => Err(WidgetError::Network("connection refused".to_string())),
            Outcome::Malformed => Err(WidgetError::Credential("response has no call_id".to_string())),
        }
    }
}

type Controller = CallSessionController<FakeFetcher, LoopbackSdk>;

fn controller(fetcher: &FakeFetcher) -> (Controller, LoopbackRemote) {
    let sdk = LoopbackSdk::new().with_connect_delay(Duration::ZERO);
    let remote = sdk.remote();
    let controller = CallSessionController::new(Some("agent_1".to_string()), fetcher.clone(), sdk);
    (controller, remote)
}

async fn step(controller: &mut Controller) {
    tokio::time::timeout(STEP_TIMEOUT, controller.process_next())
        .await
        .expect("controller made no progress");
}

async fn wait_for_calls(fetcher: &FakeFetcher, expected: usize) {
    tokio::time::timeout(STEP_TIMEOUT, async {
        while fetcher.calls() < expected {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("credential request was never made");
}

fn drain(notices: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}

fn snapshot(state: CallState, muted: bool) -> Notice {
    Notice::StateChanged(CallSnapshot { state, muted })
}

fn failures(notices: &[Notice]) -> usize {
    notices
        .iter()
        .filter(|n| matches!(n, Notice::Failure(_)))
        .count()
}

async fn connect(controller: &mut Controller) {
    controller.start_call();
    step(controller).await;
    step(controller).await;
    assert_eq!(controller.state(), CallState::Active);
}

#[tokio::test]
async fn full_call_lifecycle() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);
    let mut notices = controller.subscribe_notices();

    controller.start_call();
    assert_eq!(controller.state(), CallState::Connecting);

    step(&mut controller).await;
    assert_eq!(remote.stats().last_token.as_deref(), Some("t1"));
    step(&mut controller).await;
    assert_eq!(controller.state(), CallState::Active);

    controller.toggle_mute();
    assert!(controller.is_muted());
    assert!(remote.is_muted());
    controller.toggle_mute();
    assert!(!controller.is_muted());
    assert!(!remote.is_muted());

    controller.end_call();
    assert_eq!(controller.state(), CallState::Idle);
    assert!(!remote.is_active());

    let stats = remote.stats();
    assert_eq!(stats.starts, 1);
    assert_eq!(stats.mutes, 1);
    assert_eq!(stats.unmutes, 1);
    assert_eq!(stats.stops, 1);
    assert_eq!(
        drain(&mut notices),
        vec![
            snapshot(CallState::Connecting, false),
            snapshot(CallState::Active, false),
            snapshot(CallState::Active, true),
            snapshot(CallState::Active, false),
            snapshot(CallState::Idle, false),
        ]
    );
}

#[tokio::test]
async fn repeated_start_makes_one_request() {
    let fetcher = FakeFetcher::held(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);

    controller.start_call();
    controller.start_call();
    wait_for_calls(&fetcher, 1).await;
    controller.start_call();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(controller.state(), CallState::Connecting);

    fetcher.release(1);
    step(&mut controller).await;
    step(&mut controller).await;
    assert_eq!(controller.state(), CallState::Active);
    assert_eq!(remote.stats().starts, 1);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn end_call_when_idle_does_nothing() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);
    let mut notices = controller.subscribe_notices();

    controller.end_call();
    controller.end_call();

    assert_eq!(controller.state(), CallState::Idle);
    assert!(drain(&mut notices).is_empty());
    assert_eq!(remote.stats(), Default::default());
}

#[tokio::test]
async fn mute_outside_active_call_is_not_forwarded() {
    let fetcher = FakeFetcher::held(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);

    controller.toggle_mute();
    assert!(!controller.is_muted());

    controller.start_call();
    controller.toggle_mute();
    assert!(!controller.is_muted());

    let stats = remote.stats();
    assert_eq!(stats.mutes + stats.unmutes, 0);
}

#[tokio::test]
async fn missing_agent_id_refuses_to_start() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let sdk = LoopbackSdk::new();
    let mut controller = CallSessionController::new(None, fetcher.clone(), sdk);

    controller.start_call();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(controller.state(), CallState::Idle);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn result_after_end_call_is_discarded() {
    let fetcher = FakeFetcher::held(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);
    let mut notices = controller.subscribe_notices();

    controller.start_call();
    wait_for_calls(&fetcher, 1).await;
    controller.end_call();
    assert_eq!(controller.state(), CallState::Idle);

    fetcher.release(1);
    step(&mut controller).await;
    assert_eq!(controller.state(), CallState::Idle);
    assert_eq!(remote.stats().starts, 0);
    assert_eq!(
        drain(&mut notices),
        vec![
            snapshot(CallState::Connecting, false),
            snapshot(CallState::Idle, false),
        ]
    );
}

#[tokio::test]
async fn result_of_abandoned_attempt_does_not_start_second_session() {
    let fetcher = FakeFetcher::held(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);

    controller.start_call();
    wait_for_calls(&fetcher, 1).await;
    controller.end_call();
    controller.start_call();
    wait_for_calls(&fetcher, 2).await;

    fetcher.release(2);
    for _ in 0..3 {
        step(&mut controller).await;
    }
    assert_eq!(controller.state(), CallState::Active);
    assert_eq!(remote.stats().starts, 1);
}

#[tokio::test]
async fn credential_failure_returns_to_idle_with_one_alert() {
    for outcome in [Outcome::Network, Outcome::Malformed] {
        let fetcher = FakeFetcher::new(outcome);
        let (mut controller, remote) = controller(&fetcher);
        let mut notices = controller.subscribe_notices();

        controller.start_call();
        step(&mut controller).await;

        assert_eq!(controller.state(), CallState::Idle);
        assert_eq!(remote.stats().starts, 0);
        assert_eq!(
            drain(&mut notices),
            vec![
                snapshot(CallState::Connecting, false),
                snapshot(CallState::Error, false),
                Notice::Failure("An error occurred while starting the call.".to_string()),
                snapshot(CallState::Idle, false),
            ]
        );
    }
}

#[tokio::test]
async fn sdk_rejecting_start_returns_to_idle() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);
    let mut notices = controller.subscribe_notices();
    remote.fail_next_start("microphone permission denied");

    controller.start_call();
    step(&mut controller).await;

    assert_eq!(controller.state(), CallState::Idle);
    let seen = drain(&mut notices);
    assert_eq!(failures(&seen), 1);
    assert!(seen.contains(&snapshot(CallState::Error, false)));

    // The widget stays usable after a failed attempt.
    connect(&mut controller).await;
    assert_eq!(remote.stats().starts, 2);
}

#[tokio::test]
async fn sdk_error_during_call_stops_session() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);
    connect(&mut controller).await;
    let mut notices = controller.subscribe_notices();

    remote.fail("media transport lost");
    step(&mut controller).await;

    assert_eq!(controller.state(), CallState::Idle);
    assert!(!remote.is_active());
    let seen = drain(&mut notices);
    assert_eq!(
        seen,
        vec![
            snapshot(CallState::Error, false),
            Notice::Failure("An error occurred during the conversation.".to_string()),
            snapshot(CallState::Idle, false),
        ]
    );
}

#[tokio::test]
async fn remote_hang_up_returns_to_idle_without_alert() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);
    connect(&mut controller).await;
    controller.toggle_mute();
    let mut notices = controller.subscribe_notices();

    remote.hang_up();
    step(&mut controller).await;

    assert_eq!(controller.state(), CallState::Idle);
    assert!(!controller.is_muted());
    assert_eq!(drain(&mut notices), vec![snapshot(CallState::Idle, false)]);
}

#[tokio::test]
async fn events_from_ended_session_are_ignored() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);
    connect(&mut controller).await;
    controller.end_call();

    remote.emit(SdkEvent::CallStarted);
    remote.emit(SdkEvent::Error("late".to_string()));
    let idle = tokio::time::timeout(Duration::from_millis(100), controller.process_next()).await;
    assert!(idle.is_err(), "stale events should not reach the controller");
    assert_eq!(controller.state(), CallState::Idle);
}

#[tokio::test]
async fn listeners_do_not_accumulate_across_calls() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);

    for _ in 0..3 {
        connect(&mut controller).await;
        controller.end_call();
    }
    for kind in SdkEventKind::ALL {
        assert_eq!(remote.listener_count(kind), 1, "{kind}");
    }
    assert_eq!(remote.stats().last_token.as_deref(), Some("t3"));
}

#[tokio::test]
async fn transcript_updates_carry_only_changes() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (mut controller, remote) = controller(&fetcher);
    connect(&mut controller).await;
    let mut notices = controller.subscribe_notices();

    remote.say(TranscriptEntry::user("hi"));
    step(&mut controller).await;
    remote.update(vec![
        TranscriptEntry::user("hello"),
        TranscriptEntry::assistant("Hi there!"),
    ]);
    step(&mut controller).await;

    let updates: Vec<_> = drain(&mut notices)
        .into_iter()
        .filter_map(|n| match n {
            Notice::Transcript(changes) => Some(changes),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].len(), 1);
    assert_eq!(updates[0][0].entry.content, "hi");
    assert_eq!(updates[1].len(), 2);
    assert_eq!(updates[1][0].index, 0);
    assert_eq!(updates[1][0].entry.content, "hello");
    assert_eq!(
        controller.transcript(),
        &[
            TranscriptEntry::user("hello"),
            TranscriptEntry::assistant("Hi there!"),
        ]
    );

    controller.end_call();
    assert!(controller.transcript().is_empty());
}

#[tokio::test]
async fn transcript_spoken_before_call_started_is_kept() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let sdk = LoopbackSdk::new()
        .with_connect_delay(Duration::ZERO)
        .manual_connect();
    let remote = sdk.remote();
    let mut controller = CallSessionController::new(Some("agent_1".to_string()), fetcher, sdk);

    controller.start_call();
    step(&mut controller).await;
    assert_eq!(controller.state(), CallState::Connecting);

    remote.say(TranscriptEntry::assistant("greeting"));
    remote.connect();
    remote.say(TranscriptEntry::user("hi"));
    for _ in 0..3 {
        step(&mut controller).await;
    }

    assert_eq!(controller.state(), CallState::Active);
    assert_eq!(
        controller.transcript(),
        &[
            TranscriptEntry::assistant("greeting"),
            TranscriptEntry::user("hi"),
        ]
    );
    assert_eq!(controller.transcript(), controller.adapter().transcript());

    remote.update(vec![
        TranscriptEntry::assistant("greeting"),
        TranscriptEntry::user("hi there"),
    ]);
    step(&mut controller).await;
    assert_eq!(controller.transcript().len(), 2);
    assert_eq!(controller.transcript()[1].content, "hi there");
    assert_eq!(controller.transcript(), controller.adapter().transcript());
}

#[tokio::test]
async fn spawned_controller_follows_commands() {
    let fetcher = FakeFetcher::new(Outcome::Credentials);
    let (controller, remote) = controller(&fetcher);
    let handle = controller.spawn();
    let mut state = handle.watch_state();

    handle.start_call().await.unwrap();
    tokio::time::timeout(STEP_TIMEOUT, state.wait_for(|s| s.state == CallState::Active))
        .await
        .expect("call never became active")
        .unwrap();

    handle.toggle_mute().await.unwrap();
    tokio::time::timeout(STEP_TIMEOUT, state.wait_for(|s| s.muted))
        .await
        .expect("mute never applied")
        .unwrap();
    assert!(remote.is_muted());

    handle.shutdown().await.unwrap();
    tokio::time::timeout(STEP_TIMEOUT, async {
        while state.changed().await.is_ok() {}
    })
    .await
    .expect("controller never stopped");

    assert!(!remote.is_active());
    assert!(matches!(
        handle.start_call().await,
        Err(WidgetError::ControllerClosed)
    ));
}
