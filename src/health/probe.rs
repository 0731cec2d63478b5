//! # Probe execution.
//!
//! Runs one attempt of a [`Probe`] with a timeout. Every failure mode (timeout,
//! refused connection, non-zero exit, non-2xx status, spawn error) is reported as
//! a [`ProbeError`]; the caller treats all of them as "unhealthy".

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time;

use crate::error::ProbeError;
use crate::process::{ProcessConfig, Probe};

/// Execution context of command probes: they run where the process runs.
#[derive(Clone, Debug, Default)]
pub struct ProbeContext {
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl ProbeContext {
    pub fn from_config(cfg: &ProcessConfig) -> Self {
        Self {
            working_dir: cfg.working_dir.clone(),
            env: cfg.env.clone(),
        }
    }
}

/// Runs a single probe attempt bounded by `timeout`.
pub async fn run_probe(
    probe: &Probe,
    ctx: &ProbeContext,
    timeout: Duration,
) -> Result<(), ProbeError> {
    match time::timeout(timeout, attempt(probe, ctx, timeout)).await {
        Ok(res) => res,
        Err(_elapsed) => Err(ProbeError::Timeout { timeout }),
    }
}

async fn attempt(
    probe: &Probe,
    ctx: &ProbeContext,
    timeout: Duration,
) -> Result<(), ProbeError> {
    match probe {
        Probe::Command { command, args } => {
            let mut cmd = Command::new(command);
            cmd.args(args)
                .envs(&ctx.env)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);
            if let Some(dir) = &ctx.working_dir {
                cmd.current_dir(dir);
            }
            let status = cmd.status().await?;
            if status.success() {
                Ok(())
            } else {
                Err(ProbeError::Exit {
                    code: status.code(),
                })
            }
        }
        Probe::Tcp { host, port } => {
            TcpStream::connect((host.as_str(), *port)).await?;
            Ok(())
        }
        Probe::Http { url } => {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ProbeError::Http(e.to_string()))?;
            let resp = client
                .get(url)
                .send()
                .await
                .map_err(|e| ProbeError::Http(e.to_string()))?;
            if resp.status().is_success() {
                Ok(())
            } else {
                Err(ProbeError::Http(format!("status {}", resp.status())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const T: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn tcp_probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let res = run_probe(&Probe::tcp("127.0.0.1", port), &ProbeContext::default(), T).await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn tcp_probe_fails_when_nothing_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let res = run_probe(&Probe::tcp("127.0.0.1", port), &ProbeContext::default(), T).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn http_probe_checks_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            for status in ["200 OK", "503 Service Unavailable"] {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                sock.write_all(resp.as_bytes()).await.unwrap();
            }
        });

        let probe = Probe::http(format!("http://127.0.0.1:{port}/health"));
        let ctx = ProbeContext::default();
        assert!(run_probe(&probe, &ctx, T).await.is_ok());

        let err = run_probe(&probe, &ctx, T).await.unwrap_err();
        assert_eq!(err.as_label(), "probe_http");
    }

    #[tokio::test]
    async fn https_check_opens_a_tls_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // plain TCP server: records the first byte the client sends, then hangs up
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut first = [0u8; 1];
            sock.read_exact(&mut first).await.unwrap();
            first[0]
        });

        let probe = Probe::http(format!("https://127.0.0.1:{port}/health"));
        let err = run_probe(&probe, &ProbeContext::default(), T).await.unwrap_err();
        assert_eq!(err.as_label(), "probe_http");

        // 0x16 = TLS handshake record (ClientHello)
        let first = time::timeout(T, server).await.unwrap().unwrap();
        assert_eq!(first, 0x16);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_probe_maps_exit_code() {
        let ctx = ProbeContext::default();
        assert!(run_probe(&Probe::command("true", Vec::<String>::new()), &ctx, T).await.is_ok());

        let err = run_probe(&Probe::command("sh", ["-c", "exit 7"]), &ctx, T)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Exit { code: Some(7) }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_probe_times_out() {
        let err = run_probe(
            &Probe::command("sleep", ["5"]),
            &ProbeContext::default(),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert_eq!(err.as_label(), "probe_timeout");
    }

    #[tokio::test]
    async fn missing_probe_binary_is_an_io_error() {
        let err = run_probe(
            &Probe::command("procvisor-definitely-missing-binary", Vec::<String>::new()),
            &ProbeContext::default(),
            T,
        )
        .await
        .unwrap_err();
        assert_eq!(err.as_label(), "probe_io");
    }
}
