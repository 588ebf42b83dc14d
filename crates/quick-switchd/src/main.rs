use anyhow::{bail, Context, Result};
use clap::Parser;
use quick_switch_core::refresh::RefreshTimer;
use quick_switch_core::store::ConfigStore;
use quick_switch_core::{
    default_config_path, default_socket_path, AppContext, Request, Response,
    DEFAULT_REFRESH_SECS, METHOD_PING, METHOD_RELOAD,
};
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(30);

static SHUTDOWN_SIGNALLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Parser)]
#[command(name = "quick-switchd", version, about = "Session daemon for the qs project switcher")]
struct Args {
    #[arg(long)]
    socket: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seconds between unconditional config reloads.
    #[arg(long)]
    refresh_secs: Option<u64>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let socket_path = args
        .socket
        .or_else(|| std::env::var_os("QUICK_SWITCH_SOCKET").map(PathBuf::from))
        .unwrap_or_else(default_socket_path);
    let config_path = args
        .config
        .or_else(|| std::env::var_os("QUICK_SWITCH_CONFIG").map(PathBuf::from))
        .unwrap_or_else(default_config_path);
    let refresh_interval = Duration::from_secs(
        args.refresh_secs
            .or_else(refresh_secs_from_env)
            .unwrap_or(DEFAULT_REFRESH_SECS)
            .max(1),
    );

    let mut context = AppContext::load(ConfigStore::new(config_path));
    info!("using config {}", context.store().path().display());

    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create socket directory: {}", parent.display()))?;
    }
    let listener = bind_daemon_socket(&socket_path)?;
    listener
        .set_nonblocking(true)
        .context("failed to set listener as non-blocking")?;

    let mut timer = RefreshTimer::new(refresh_interval, Instant::now());
    info!(
        "quick-switchd listening on {} (refresh every {}s)",
        socket_path.display(),
        timer.interval().as_secs()
    );
    install_signal_handler();

    let mut running = true;
    while running && !SHUTDOWN_SIGNALLED.load(Ordering::SeqCst) {
        if timer.poll(Instant::now()) {
            context.reload();
        }
        match listener.accept() {
            Ok((stream, _)) => match handle_client(stream, &mut context, &mut timer) {
                Ok(keep_running) => running = keep_running,
                Err(err) => error!("client handling failed: {err:#}"),
            },
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL.min(timer.time_until_due(Instant::now())));
            }
            Err(err) => {
                warn!("accept error: {err}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }

    context.flush();
    if socket_path.exists() {
        let _ = fs::remove_file(&socket_path);
    }
    info!("quick-switchd shutdown complete");
    Ok(())
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("QUICK_SWITCH_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
        )
        .try_init();
}

fn install_signal_handler() {
    extern "C" fn handler(_sig: libc::c_int) {
        SHUTDOWN_SIGNALLED.store(true, Ordering::SeqCst);
    }

    // The handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
    }
}

fn refresh_secs_from_env() -> Option<u64> {
    parse_refresh_secs(&std::env::var("QUICK_SWITCH_REFRESH_SECS").ok()?)
}

fn parse_refresh_secs(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|secs| *secs > 0)
}

fn bind_daemon_socket(socket_path: &Path) -> Result<UnixListener> {
    match UnixListener::bind(socket_path) {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
            if daemon_is_reachable(socket_path) {
                bail!(
                    "failed to bind socket: {} (another quick-switchd instance is already running)",
                    socket_path.display()
                );
            }
            if socket_path.exists() {
                fs::remove_file(socket_path).with_context(|| {
                    format!("failed to remove stale socket: {}", socket_path.display())
                })?;
            }
            UnixListener::bind(socket_path)
                .with_context(|| format!("failed to bind socket: {}", socket_path.display()))
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind socket: {}", socket_path.display()))
        }
    }
}

fn daemon_is_reachable(socket_path: &Path) -> bool {
    quick_switch_core::client::request(socket_path, METHOD_PING, Value::Null)
        .map(|response| response.ok)
        .unwrap_or(false)
}

/// Serves every request line of one connection. Returns false once a
/// request asked the session to stop.
fn handle_client(
    stream: UnixStream,
    context: &mut AppContext,
    timer: &mut RefreshTimer,
) -> Result<bool> {
    stream
        .set_nonblocking(false)
        .context("failed to set client stream as blocking")?;
    stream
        .set_read_timeout(Some(CLIENT_READ_TIMEOUT))
        .context("failed to set client read timeout")?;
    let reader = BufReader::new(
        stream
            .try_clone()
            .context("failed to clone client stream")?,
    );
    let mut writer = BufWriter::new(stream);

    for line in reader.lines() {
        let line = line.context("failed reading client request")?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(err) => {
                let response = Response::err(0, format!("invalid request JSON: {err}"));
                write_response(&mut writer, &response)?;
                continue;
            }
        };

        let (response, should_shutdown) = context.handle_request(&request);
        if request.method == METHOD_RELOAD {
            timer.reset(Instant::now());
        }
        write_response(&mut writer, &response)?;

        if should_shutdown {
            info!("shutdown requested by client");
            return Ok(false);
        }
    }

    Ok(true)
}

fn write_response(writer: &mut BufWriter<UnixStream>, response: &Response) -> Result<()> {
    serde_json::to_writer(&mut *writer, response).context("failed to serialize response")?;
    writer.write_all(b"\n").context("failed to write newline")?;
    writer.flush().context("failed to flush response")?;
    Ok(())
}
