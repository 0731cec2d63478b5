#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use procvisor::{
    ConfigError, Event, EventKind, HealthCheckConfig, HealthStatus, LogStream,
    MAX_RESTARTS_EXCEEDED, ProcessConfig, ProcessState, Probe, Subscribe, Supervisor,
    SupervisorConfig, SupervisorError,
};
use tokio::sync::broadcast;
use tokio::time;

fn sh(name: &str, script: &str) -> ProcessConfig {
    ProcessConfig::new(name, "sh").with_args(["-c", script])
}

fn long_running(name: &str) -> ProcessConfig {
    sh(name, "sleep 30")
}

fn cfg() -> SupervisorConfig {
    SupervisorConfig {
        grace: Duration::from_secs(5),
        stop_grace: Duration::from_secs(2),
        ..SupervisorConfig::default()
    }
}

/// Polls until the state of `name` satisfies `pred`.
async fn wait_state(
    sup: &Supervisor,
    name: &str,
    within: Duration,
    pred: impl Fn(&ProcessState) -> bool,
) {
    let deadline = Instant::now() + within;
    loop {
        let state = sup.get_state(name).unwrap();
        if pred(&state) {
            return;
        }
        assert!(Instant::now() < deadline, "{name} stuck in {state:?}");
        time::sleep(Duration::from_millis(20)).await;
    }
}

/// Receives events until one satisfies `pred`, returning everything seen.
async fn collect_until(
    rx: &mut broadcast::Receiver<Event>,
    within: Duration,
    mut pred: impl FnMut(&Event) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    time::timeout(within, async {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let done = pred(&ev);
                    seen.push(ev);
                    if done {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("bus closed"),
            }
        }
    })
    .await
    .expect("event not observed in time");
    seen
}

fn transitions(events: &[Event], process: &str) -> Vec<ProcessState> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::StateChanged && e.is_for(process))
        .filter_map(|e| e.new_state.clone())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn start_all_follows_dependency_order() {
    let sup = Supervisor::load(
        cfg(),
        vec![
            long_running("web").with_depends_on(["api"]),
            long_running("api").with_depends_on(["db"]),
            long_running("db"),
        ],
    )
    .unwrap();
    assert_eq!(sup.start_order(), vec!["db", "api", "web"]);

    let mut rx = sup.subscribe();
    sup.start_all().await.unwrap();

    let mut running = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if ev.kind == EventKind::StateChanged && ev.new_state == Some(ProcessState::Running) {
            running.push(ev.process.unwrap().to_string());
        }
    }
    assert_eq!(running, vec!["db", "api", "web"]);

    for info in sup.list() {
        assert_eq!(info.state, ProcessState::Running);
        assert_eq!(info.health, HealthStatus::Healthy);
        assert!(info.pid.is_some());
    }
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unready_dependency_fails_dependents() {
    let check = HealthCheckConfig::new(Probe::command("false", Vec::<String>::new()))
        .with_interval(Duration::from_millis(50))
        .with_retries(1);
    let sup = Supervisor::load(
        cfg(),
        vec![
            long_running("db").with_health_check(check),
            long_running("api")
                .with_depends_on(["db"])
                .with_start_timeout(Duration::from_millis(300)),
            long_running("web").with_depends_on(["api"]),
        ],
    )
    .unwrap();

    let started = Instant::now();
    let err = sup.start_all().await.unwrap_err();
    assert_eq!(
        err,
        SupervisorError::StartAllFailed {
            failed: vec!["api".into(), "web".into()]
        }
    );
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(sup.get_state("db").unwrap(), ProcessState::Running);
    assert_eq!(sup.info("db").unwrap().health, HealthStatus::Unhealthy);
    for name in ["api", "web"] {
        assert_eq!(
            sup.get_state(name).unwrap(),
            ProcessState::Failed {
                reason: "dependency not ready".into()
            }
        );
        assert!(sup.info(name).unwrap().pid.is_none());
    }
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_loop_gives_up_after_budget() {
    let sup = Supervisor::load(
        cfg(),
        vec![
            sh("flaky", "exit 1")
                .with_auto_restart(true)
                .with_max_restarts(2)
                .with_restart_delay(Duration::from_millis(500)),
        ],
    )
    .unwrap();
    let mut rx = sup.subscribe();

    sup.start("flaky").await.unwrap();
    let events = collect_until(&mut rx, Duration::from_secs(5), |e| {
        e.is_for("flaky") && matches!(e.new_state, Some(ProcessState::Failed { .. }))
    })
    .await;

    let first_crash = events
        .iter()
        .find(|e| matches!(e.new_state, Some(ProcessState::Crashed { .. })))
        .unwrap();
    let failed = events.last().unwrap();
    let crash_to_failed = failed.at.duration_since(first_crash.at).unwrap();
    assert!(crash_to_failed >= Duration::from_millis(1000), "{crash_to_failed:?}");

    let crashed = ProcessState::Crashed { exit_code: Some(1) };
    assert_eq!(
        transitions(&events, "flaky"),
        vec![
            ProcessState::Starting,
            ProcessState::Running,
            crashed.clone(),
            ProcessState::Starting,
            ProcessState::Running,
            crashed.clone(),
            ProcessState::Starting,
            ProcessState::Running,
            crashed,
            ProcessState::Failed {
                reason: MAX_RESTARTS_EXCEEDED.into()
            },
        ]
    );

    let scheduled: Vec<u32> = events
        .iter()
        .filter(|e| e.kind == EventKind::RestartScheduled)
        .filter_map(|e| e.attempt)
        .collect();
    assert_eq!(scheduled, vec![1, 2]);

    let info = sup.info("flaky").unwrap();
    assert_eq!(info.restart_count, 2);
    assert_eq!(info.restart_history.len(), 2);
    assert!(!info.restart_scheduled);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn no_restart_beyond_max() {
    let sup = Supervisor::load(
        cfg(),
        vec![
            sh("flaky", "exit 3")
                .with_auto_restart(true)
                .with_max_restarts(3)
                .with_restart_delay(Duration::from_millis(50)),
        ],
    )
    .unwrap();
    let mut rx = sup.subscribe();

    sup.start("flaky").await.unwrap();
    wait_state(&sup, "flaky", Duration::from_secs(5), |s| {
        matches!(s, ProcessState::Failed { .. })
    })
    .await;
    time::sleep(Duration::from_millis(300)).await;

    let mut restarts = 0;
    let mut spawns = 0;
    while let Ok(ev) = rx.try_recv() {
        match ev.kind {
            EventKind::RestartScheduled => restarts += 1,
            EventKind::StateChanged if ev.new_state == Some(ProcessState::Starting) => spawns += 1,
            _ => {}
        }
    }
    assert_eq!(restarts, 3);
    assert_eq!(spawns, 4);
    assert_eq!(sup.info("flaky").unwrap().restart_count, 3);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_without_auto_restart_stays_crashed() {
    let sup = Supervisor::load(cfg(), vec![sh("once", "exit 2")]).unwrap();

    sup.start("once").await.unwrap();
    wait_state(&sup, "once", Duration::from_secs(2), |s| {
        matches!(s, ProcessState::Crashed { .. })
    })
    .await;
    time::sleep(Duration::from_millis(200)).await;

    let info = sup.info("once").unwrap();
    assert_eq!(info.state, ProcessState::Crashed { exit_code: Some(2) });
    assert_eq!(info.restart_count, 0);
    assert!(!info.restart_scheduled);
    assert_eq!(info.last_exit.and_then(|s| s.code), Some(2));
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stable_run_resets_restart_counter() {
    let marker = std::env::temp_dir().join(format!("procvisor-stable-{}", std::process::id()));
    let _ = std::fs::remove_file(&marker);

    // first run crashes, every later run stays up
    let script = r#"if [ -f "$MARKER" ]; then exec sleep 30; fi; touch "$MARKER"; exit 1"#;
    let sup = Supervisor::load(
        cfg(),
        vec![
            sh("worker", script)
                .with_env("MARKER", marker.to_string_lossy())
                .with_auto_restart(true)
                .with_max_restarts(5)
                .with_restart_delay(Duration::from_millis(50))
                .with_stability_window(Duration::from_millis(400)),
        ],
    )
    .unwrap();
    let mut rx = sup.subscribe();

    sup.start("worker").await.unwrap();
    let mut runs = 0;
    let events = collect_until(&mut rx, Duration::from_secs(3), |e| {
        if e.is_for("worker") && e.new_state == Some(ProcessState::Running) {
            runs += 1;
        }
        runs == 2
    })
    .await;
    assert!(events.iter().any(|e| e.kind == EventKind::RestartScheduled && e.attempt == Some(1)));
    let running_again = events.last().unwrap().at;
    let info = sup.info("worker").unwrap();
    assert_eq!(info.restart_count, 1);
    assert_eq!(info.restart_history.len(), 1);

    let reset = collect_until(&mut rx, Duration::from_secs(3), |e| {
        e.kind == EventKind::RestartCounterReset
    })
    .await;
    let reset = reset.last().unwrap();
    assert_eq!(reset.attempt, Some(1));
    assert!(reset.at.duration_since(running_again).unwrap() >= Duration::from_millis(400));

    let info = sup.info("worker").unwrap();
    assert_eq!(info.state, ProcessState::Running);
    assert_eq!(info.restart_count, 0);
    assert!(info.restart_history.is_empty());

    sup.shutdown().await.unwrap();
    let _ = std::fs::remove_file(&marker);
}

#[tokio::test(flavor = "multi_thread")]
async fn unhealthy_past_grace_counts_as_crash() {
    let check = HealthCheckConfig::new(Probe::command("false", Vec::<String>::new()))
        .with_interval(Duration::from_millis(50))
        .with_retries(1)
        .with_unhealthy_grace(Duration::from_millis(200));
    let sup = Supervisor::load(
        cfg(),
        vec![
            long_running("api")
                .with_health_check(check)
                .with_auto_restart(true)
                .with_max_restarts(1)
                .with_restart_delay(Duration::from_millis(50)),
        ],
    )
    .unwrap();
    let mut rx = sup.subscribe();

    sup.start("api").await.unwrap();
    let events = collect_until(&mut rx, Duration::from_secs(5), |e| {
        e.is_for("api") && matches!(e.new_state, Some(ProcessState::Failed { .. }))
    })
    .await;

    let killed = ProcessState::Crashed { exit_code: None };
    assert_eq!(
        transitions(&events, "api"),
        vec![
            ProcessState::Starting,
            ProcessState::Running,
            ProcessState::Stopping,
            killed.clone(),
            ProcessState::Starting,
            ProcessState::Running,
            ProcessState::Stopping,
            killed,
            ProcessState::Failed {
                reason: MAX_RESTARTS_EXCEEDED.into()
            },
        ]
    );
    let info = sup.info("api").unwrap();
    assert!(info.pid.is_none());
    assert_eq!(info.last_exit.and_then(|s| s.signal), Some(15));
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_cancels_pending_restart() {
    let sup = Supervisor::load(
        cfg(),
        vec![
            sh("flaky", "exit 1")
                .with_auto_restart(true)
                .with_restart_delay(Duration::from_millis(500)),
        ],
    )
    .unwrap();

    sup.start("flaky").await.unwrap();
    wait_state(&sup, "flaky", Duration::from_secs(2), |s| {
        matches!(s, ProcessState::Crashed { .. })
    })
    .await;
    assert!(sup.info("flaky").unwrap().restart_scheduled);

    let mut rx = sup.subscribe();
    sup.stop("flaky").await.unwrap();
    time::sleep(Duration::from_millis(800)).await;

    let info = sup.info("flaky").unwrap();
    assert_eq!(info.state, ProcessState::Stopped);
    assert!(!info.restart_scheduled);
    assert!(info.pid.is_none());
    while let Ok(ev) = rx.try_recv() {
        assert_ne!(ev.new_state, Some(ProcessState::Starting), "restarted after stop");
    }
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_all_stops_dependents_first() {
    let sup = Supervisor::load(
        cfg(),
        vec![
            long_running("db"),
            long_running("api").with_depends_on(["db"]),
            long_running("web").with_depends_on(["api"]),
        ],
    )
    .unwrap();
    sup.start_all().await.unwrap();

    let mut rx = sup.subscribe();
    sup.stop_all().await.unwrap();

    let mut stopped = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if ev.kind == EventKind::StateChanged && ev.new_state == Some(ProcessState::Stopped) {
            stopped.push(ev.process.unwrap().to_string());
        }
    }
    assert_eq!(stopped, vec!["web", "api", "db"]);
    assert!(sup.list().iter().all(|i| i.state == ProcessState::Stopped && i.pid.is_none()));
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_idempotent() {
    let sup = Supervisor::load(cfg(), vec![long_running("svc")]).unwrap();

    sup.stop("svc").await.unwrap();
    assert_eq!(sup.get_state("svc").unwrap(), ProcessState::Stopped);

    sup.start("svc").await.unwrap();
    sup.stop("svc").await.unwrap();
    sup.stop("svc").await.unwrap();
    let info = sup.info("svc").unwrap();
    assert_eq!(info.state, ProcessState::Stopped);
    assert!(info.pid.is_none());
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_replaces_the_process() {
    let sup = Supervisor::load(cfg(), vec![long_running("svc")]).unwrap();
    sup.start("svc").await.unwrap();
    let first = sup.info("svc").unwrap().pid;

    sup.restart("svc").await.unwrap();
    let info = sup.info("svc").unwrap();
    assert_eq!(info.state, ProcessState::Running);
    assert!(info.pid.is_some());
    assert_ne!(info.pid, first);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn cycle_is_rejected_at_load() {
    let res = Supervisor::load(
        cfg(),
        vec![
            long_running("a").with_depends_on(["b"]),
            long_running("b").with_depends_on(["a"]),
        ],
    );
    assert!(matches!(res, Err(ConfigError::CycleDetected { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn spawn_failure_marks_failed() {
    let sup = Supervisor::load(
        cfg(),
        vec![
            ProcessConfig::new("ghost", "procvisor-definitely-missing-binary")
                .with_auto_restart(true),
        ],
    )
    .unwrap();

    let err = sup.start("ghost").await.unwrap_err();
    assert!(matches!(err, SupervisorError::StartFailed { ref process, .. } if process == "ghost"));
    match sup.get_state("ghost").unwrap() {
        ProcessState::Failed { reason } => assert!(reason.starts_with("spawn failed"), "{reason}"),
        other => panic!("unexpected state {other:?}"),
    }
    assert!(!sup.info("ghost").unwrap().restart_scheduled);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn output_lines_are_published() {
    let chatty = sh("chatty", "echo hello; echo oops >&2; sleep 5");
    let sup = Supervisor::load(cfg(), vec![chatty]).unwrap();
    let mut rx = sup.subscribe();
    sup.start("chatty").await.unwrap();

    let mut stdout = None;
    let mut stderr = None;
    let _ = collect_until(&mut rx, Duration::from_secs(3), |e| {
        if e.kind == EventKind::LogLine {
            match e.stream {
                Some(LogStream::Stdout) => stdout = e.line.clone(),
                Some(LogStream::Stderr) => stderr = e.line.clone(),
                None => {}
            }
        }
        stdout.is_some() && stderr.is_some()
    })
    .await;
    assert_eq!(stdout.as_deref(), Some("hello"));
    assert_eq!(stderr.as_deref(), Some("oops"));
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_process_is_rejected() {
    let sup = Supervisor::load(cfg(), vec![long_running("svc")]).unwrap();
    let unknown = SupervisorError::UnknownProcess { name: "nope".into() };

    assert_eq!(sup.get_state("nope").unwrap_err(), unknown);
    assert_eq!(sup.start("nope").await.unwrap_err(), unknown);
    assert_eq!(sup.stop("nope").await.unwrap_err(), unknown);
    assert_eq!(sup.get_state("svc").unwrap(), ProcessState::Stopped);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn start_requires_started_dependencies() {
    let sup = Supervisor::load(
        cfg(),
        vec![long_running("db"), long_running("api").with_depends_on(["db"])],
    )
    .unwrap();

    let err = sup.start("api").await.unwrap_err();
    assert_eq!(
        err,
        SupervisorError::DependencyNotStarted {
            process: "api".into(),
            dependency: "db".into()
        }
    );
    assert!(err.is_rejected());
    assert_eq!(sup.get_state("api").unwrap(), ProcessState::Stopped);

    sup.start("db").await.unwrap();
    sup.start("api").await.unwrap();
    assert_eq!(sup.get_state("api").unwrap(), ProcessState::Running);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_rejects_new_starts() {
    let sup = Supervisor::load(cfg(), vec![long_running("svc")]).unwrap();
    sup.start("svc").await.unwrap();
    let mut rx = sup.subscribe();

    sup.shutdown().await.unwrap();
    assert!(sup.is_shutting_down());
    assert_eq!(sup.start("svc").await.unwrap_err(), SupervisorError::ShuttingDown);
    assert_eq!(sup.start_all().await.unwrap_err(), SupervisorError::ShuttingDown);
    assert_eq!(sup.get_state("svc").unwrap(), ProcessState::Stopped);

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        kinds.push(ev.kind);
    }
    let requested = kinds.iter().position(|k| *k == EventKind::ShutdownRequested);
    let stopped = kinds.iter().position(|k| *k == EventKind::AllStoppedWithin);
    assert!(requested.is_some() && stopped.is_some());
    assert!(requested < stopped);

    // second call is a no-op
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stubborn_process_exceeds_grace() {
    let mut config = cfg();
    config.grace = Duration::from_millis(300);
    config.stop_grace = Duration::from_secs(10);
    let sup = Supervisor::load(config, vec![sh("stubborn", "trap '' TERM; sleep 30")]).unwrap();

    sup.start("stubborn").await.unwrap();
    time::sleep(Duration::from_millis(200)).await;
    let mut rx = sup.subscribe();

    let started = Instant::now();
    let err = sup.shutdown().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        err,
        SupervisorError::GraceExceeded {
            grace: Duration::from_millis(300),
            stuck: vec!["stubborn".into()]
        }
    );
    assert_eq!(sup.get_state("stubborn").unwrap(), ProcessState::Stopped);
    assert!(sup.info("stubborn").unwrap().pid.is_none());

    let events = collect_until(&mut rx, Duration::from_secs(1), |e| {
        e.kind == EventKind::GraceExceeded
    })
    .await;
    let grace = events.last().unwrap();
    assert_eq!(grace.reason.as_deref(), Some("stubborn"));
}

struct Recorder {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.kinds.lock().unwrap().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribers_receive_events() {
    let recorder = Arc::new(Recorder {
        kinds: Mutex::new(Vec::new()),
    });
    let sup = Supervisor::builder(cfg())
        .with_subscriber(recorder.clone())
        .build(vec![long_running("svc")])
        .unwrap();

    sup.start("svc").await.unwrap();
    sup.shutdown().await.unwrap();

    let kinds = recorder.kinds.lock().unwrap().clone();
    assert!(kinds.contains(&EventKind::StateChanged));
    assert!(kinds.contains(&EventKind::HealthChanged));
    assert!(kinds.contains(&EventKind::ShutdownRequested));
    assert!(kinds.contains(&EventKind::AllStoppedWithin));
}
