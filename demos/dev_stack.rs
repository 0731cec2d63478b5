//! A small local stack: `db` → `api` → `web`, plus a flaky `worker`.
//!
//! ```text
//! RUST_LOG=info cargo run --example dev_stack --features logging
//! ```
//! Press Ctrl-C to stop everything in reverse dependency order.

use std::sync::Arc;
use std::time::Duration;

use procvisor::{
    HealthCheckConfig, JitterPolicy, LogWriter, ProcessConfig, Probe, Subscribe, Supervisor,
    SupervisorConfig,
};
use tracing_subscriber::EnvFilter;

fn sh(name: &str, script: &str) -> ProcessConfig {
    ProcessConfig::new(name, "sh").with_args(["-c", script])
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut cfg = SupervisorConfig::default();
    cfg.grace = Duration::from_secs(10);
    cfg.stop_grace = Duration::from_secs(3);
    cfg.stability_window = Duration::from_secs(20);

    let processes = vec![
        sh("db", "echo 'db: ready'; while true; do sleep 5; echo 'db: checkpoint'; done")
            .with_health_check(
                HealthCheckConfig::new(Probe::command("sh", ["-c", "exit 0"]))
                    .with_interval(Duration::from_secs(2))
                    .with_success_threshold(2),
            ),
        sh("api", "echo 'api: listening'; while true; do sleep 3; echo 'api: GET /'; done")
            .with_depends_on(["db"])
            .with_start_timeout(Duration::from_secs(15)),
        sh("web", "echo 'web: compiled'; exec sleep 3600").with_depends_on(["api"]),
        sh("worker", "echo 'worker: up'; sleep 4; echo 'worker: lost connection' >&2; exit 1")
            .with_depends_on(["db"])
            .with_auto_restart(true)
            .with_max_restarts(5)
            .with_restart_delay(Duration::from_millis(500))
            .with_backoff(2.0, Duration::from_secs(8))
            .with_jitter(JitterPolicy::Equal),
    ];

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(cfg).with_subscribers(subs).build(processes)?;
    println!("start order: {:?}", sup.start_order());

    match sup.run_until_signal().await {
        Ok(()) => println!("stack stopped gracefully"),
        Err(e) => println!("stack stopped with error: {e}"),
    }
    for info in sup.list() {
        println!("{:>8}: {} (restarts: {})", info.name, info.state, info.restart_count);
    }
    Ok(())
}
