use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;

pub const LOG_FILE: &str = "logs.txt";
pub const ARCHIVES_DIR: &str = "archives";
pub const STAGING_DIR: &str = "staging";

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the cache directory. Uses GWSUP_CACHE_DIR if set; otherwise $HOME/.gwsup-cache
pub fn get_cache_dir() -> PathBuf {
    if let Ok(dir) = env::var("GWSUP_CACHE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    home_dir().join(".gwsup-cache")
}

/// Default install target: $HOME/.local/bin
pub fn default_bin_dir() -> PathBuf {
    home_dir().join(".local").join("bin")
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home_dir().join(rest);
    }
    PathBuf::from(path)
}

pub fn init_cache(cache_dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(cache_dir.join(ARCHIVES_DIR))?;
    fs::create_dir_all(cache_dir.join(STAGING_DIR))?;

    let log_path = cache_dir.join(LOG_FILE);
    if !log_path.exists() {
        File::create(&log_path)?;
    }
    Ok(())
}

pub fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn is_quiet() -> bool {
    if env_flag("GWSUP_QUIET") {
        return true;
    }
    env::var("GWSUP_LOG")
        .map(|v| v.eq_ignore_ascii_case("quiet") || v.eq_ignore_ascii_case("error"))
        .unwrap_or(false)
}

/// Timestamped log line: echoed to stdout unless quiet, always appended to `<cache_dir>/logs.txt`.
pub fn log(cache_dir: &Path, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let log_message = format!("[{}] {}", timestamp, message);

    if !is_quiet() {
        println!("{}", log_message);
    }

    let log_path = cache_dir.join(LOG_FILE);
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = writeln!(file, "{}", log_message);
    }
}

/// Output of a command run under a deadline.
#[derive(Debug)]
pub struct TimedOutput {
    /// `None` when the process was killed at the deadline.
    pub status: Option<ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Spawn with piped output. A freshly written executable can briefly fail with
/// ETXTBSY while another thread's fork still holds its write handle; retry that.
fn spawn_piped(program: &Path, args: &[&str]) -> std::io::Result<std::process::Child> {
    const ETXTBSY: i32 = 26;
    let mut attempts = 0;
    loop {
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match spawned {
            Err(e) if cfg!(unix) && e.raw_os_error() == Some(ETXTBSY) && attempts < 10 => {
                attempts += 1;
                thread::sleep(Duration::from_millis(50));
            }
            other => return other,
        }
    }
}

/// How long pipe readers may keep draining once the direct child has exited or been killed.
/// A grandchild that inherited stdout/stderr can hold the pipes open indefinitely.
const READ_GRACE: Duration = Duration::from_millis(500);

/// Drain `source` into a shared buffer on a detached thread; `done` fires at EOF.
fn drain<R: Read + Send + 'static>(source: Option<R>) -> (Arc<Mutex<Vec<u8>>>, mpsc::Receiver<()>) {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();
    let sink = Arc::clone(&buf);
    thread::spawn(move || {
        if let Some(mut s) = source {
            let mut chunk = [0u8; 8192];
            loop {
                match s.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(&chunk[..n]),
                }
            }
        }
        let _ = tx.send(());
    });
    (buf, rx)
}

fn take(buf: &Mutex<Vec<u8>>) -> Vec<u8> {
    std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()))
}

/// Run `program args...`, killing it if it is still running after `timeout`.
/// Returns within `timeout` plus a short grace period even if descendants keep the output pipes open;
/// whatever was read by then is returned.
pub fn run_command_timeout(program: &Path, args: &[&str], timeout: Duration) -> std::io::Result<TimedOutput> {
    let mut child = spawn_piped(program, args)?;
    let (out_buf, out_done) = drain(child.stdout.take());
    let (err_buf, err_done) = drain(child.stderr.take());

    let started = Instant::now();
    let tick = Duration::from_millis(20);
    let (status, timed_out) = loop {
        if let Some(status) = child.try_wait()? {
            break (Some(status), false);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            break (None, true);
        }
        thread::sleep(tick);
    };

    let deadline = Instant::now() + READ_GRACE;
    for done in [&out_done, &err_done] {
        let _ = done.recv_timeout(deadline.saturating_duration_since(Instant::now()));
    }
    Ok(TimedOutput {
        status,
        stdout: take(&out_buf),
        stderr: take(&err_buf),
        timed_out,
    })
}

/// Whether `dir` is listed in the PATH environment variable.
pub fn dir_on_path(dir: &Path) -> bool {
    let Some(path) = env::var_os("PATH") else {
        return false;
    };
    let want = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    env::split_paths(&path).any(|p| {
        let p = fs::canonicalize(&p).unwrap_or(p);
        p == want
    })
}
