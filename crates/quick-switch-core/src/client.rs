use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::{Request, Response, METHOD_PING};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
const PING_RETRY_INTERVAL: Duration = Duration::from_millis(100);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Sends one request line and waits for the matching response line.
pub fn request(socket_path: &Path, method: &str, params: Value) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .with_context(|| format!("failed to connect to socket {}", socket_path.display()))?;
    stream
        .set_read_timeout(Some(RESPONSE_TIMEOUT))
        .context("failed to set socket read timeout")?;
    let mut writer = BufWriter::new(
        stream
            .try_clone()
            .context("failed to clone socket stream")?,
    );
    let mut reader = BufReader::new(stream);

    let id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let req = Request {
        id,
        method: method.to_string(),
        params,
    };
    serde_json::to_writer(&mut writer, &req)
        .with_context(|| format!("failed to serialize {method} request"))?;
    writer.write_all(b"\n").context("failed to write request")?;
    writer.flush().context("failed to flush request")?;

    let mut line = String::new();
    reader
        .read_line(&mut line)
        .with_context(|| format!("no response to {method} from quick-switchd"))?;
    if line.trim().is_empty() {
        bail!("quick-switchd closed the connection without answering {method}");
    }

    let response: Response =
        serde_json::from_str(&line).context("failed to parse daemon response")?;
    if response.id != id {
        bail!(
            "response id {} does not match {method} request id {id}",
            response.id
        );
    }
    Ok(response)
}

pub fn parse_ok_response<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    if !response.ok {
        let message = response.error.unwrap_or_else(|| "unknown".to_string());
        match response.code {
            Some(code) => bail!("daemon rejected request ({code:?}): {message}"),
            None => bail!("daemon returned error: {message}"),
        }
    }
    serde_json::from_value(response.result.unwrap_or(Value::Null))
        .context("failed to parse daemon response body")
}

/// Sends a request, starting the daemon first when it is unreachable and
/// `autostart` is set. `daemon_args` are passed through to a spawned daemon.
pub fn request_with_autostart(
    socket_path: &Path,
    method: &str,
    params: Value,
    autostart: bool,
    daemon_args: &[String],
) -> Result<Response> {
    match request(socket_path, method, params.clone()) {
        Ok(response) => Ok(response),
        Err(_) if autostart => {
            eprintln!("daemon unavailable, starting quick-switchd...");
            start_daemon(socket_path, daemon_args)?;
            wait_for_ping(socket_path, Duration::from_secs(3))?;
            request(socket_path, method, params)
        }
        Err(err) => Err(err),
    }
}

/// Polls `ping` until the daemon answers or `timeout` passes.
pub fn wait_for_ping(socket_path: &Path, timeout: Duration) -> Result<Response> {
    let deadline = Instant::now() + timeout;
    loop {
        match request(socket_path, METHOD_PING, Value::Null) {
            Ok(response) => return Ok(response),
            Err(err) if Instant::now() >= deadline => {
                return Err(err.context(format!(
                    "quick-switchd did not answer within {}ms",
                    timeout.as_millis()
                )))
            }
            Err(_) => thread::sleep(PING_RETRY_INTERVAL),
        }
    }
}

pub fn start_daemon(socket_path: &Path, daemon_args: &[String]) -> Result<()> {
    let spawn = daemon_command(Path::new(daemon_binary_name()), socket_path, daemon_args).spawn();

    match spawn {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let local = detect_local_daemon_binary()
                .context("quick-switchd not found on PATH or next to this executable")?;
            daemon_command(&local, socket_path, daemon_args)
                .spawn()
                .with_context(|| format!("failed to spawn {}", local.display()))?;
            Ok(())
        }
        Err(err) => Err(err).context("failed to spawn quick-switchd"),
    }
}

fn daemon_command(program: &Path, socket_path: &Path, daemon_args: &[String]) -> Command {
    let mut command = Command::new(program);
    command
        .arg("--socket")
        .arg(socket_path)
        .args(daemon_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    command
}

pub fn detect_local_daemon_binary() -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let mut candidates = Vec::new();

    if let Some(bin_dir) = current_exe.parent() {
        candidates.push(bin_dir.join(daemon_binary_name()));
        if let Some(debug_dir) = bin_dir.parent() {
            candidates.push(debug_dir.join(daemon_binary_name()));
        }
    }

    candidates.into_iter().find(|candidate| candidate.is_file())
}

#[cfg(unix)]
pub const fn daemon_binary_name() -> &'static str {
    "quick-switchd"
}

#[cfg(windows)]
pub const fn daemon_binary_name() -> &'static str {
    "quick-switchd.exe"
}
