use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL_LINES: usize = 20;
#[cfg(target_os = "linux")]
const ETXTBSY: i32 = 26;
const SPAWN_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{0} pipe of the child process is unavailable")]
    MissingPipe(&'static str),
    #[error("io error while running tool: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    running: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.requested.load(Ordering::SeqCst)
    }

    /// Cancels the tool that is currently running. Returns `false` without
    /// cancelling anything when no tool is running.
    pub fn interrupt(&self) -> bool {
        if self.0.running.load(Ordering::SeqCst) {
            self.cancel();
            true
        } else {
            false
        }
    }

    fn set_running(&self, running: bool) {
        self.0.running.store(running, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub lines_echoed: usize,
    pub stderr_tail: Vec<String>,
    pub elapsed: Duration,
}

/// Runs `program`, echoing its stdout line by line into `echo` until the
/// stream ends, then waits for the process to exit. The exit code is only
/// reported; callers decide success from the files the tool left behind.
pub fn run_tool<W>(
    program: &Path,
    args: &[OsString],
    work_dir: &Path,
    echo: &mut W,
    limits: &RunLimits,
) -> Result<RunOutcome, RunError>
where
    W: Write + ?Sized,
{
    let started = Instant::now();
    let deadline = limits.timeout.map(|timeout| started + timeout);
    let child = spawn(program, args, work_dir)?;
    tracing::info!(program = %program.display(), pid = child.id(), "started tool");
    let mut child = Reaper::new(child, &limits.cancel);

    let stdout = child.stdout.take().ok_or(RunError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(RunError::MissingPipe("stderr"))?;
    let stderr_tail = drain_stderr(stderr);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || forward_lines(stdout, tx));

    let mut lines_echoed = 0;
    loop {
        if let Some(status) = interrupted(&limits.cancel, deadline) {
            return Ok(terminate(child, status, lines_echoed, &stderr_tail, started));
        }
        match rx.recv_timeout(next_wait(deadline)) {
            Ok(line) => {
                writeln!(echo, "{line}")?;
                echo.flush()?;
                lines_echoed += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let exit = loop {
        if let Some(status) = interrupted(&limits.cancel, deadline) {
            return Ok(terminate(child, status, lines_echoed, &stderr_tail, started));
        }
        if let Some(exit) = child.wait_timeout(next_wait(deadline))? {
            break exit;
        }
    };
    child.reaped = true;
    drop(child);

    let code = exit.code();
    tracing::info!(
        program = %program.display(),
        exit_code = ?code,
        lines = lines_echoed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tool finished"
    );
    Ok(RunOutcome {
        status: RunStatus::Exited(code),
        lines_echoed,
        stderr_tail: snapshot(&stderr_tail),
        elapsed: started.elapsed(),
    })
}

fn spawn(program: &Path, args: &[OsString], work_dir: &Path) -> Result<Child, RunError> {
    let mut attempt = 1;
    loop {
        let result = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match result {
            Ok(child) => return Ok(child),
            Err(err) if is_text_busy(&err) && attempt < SPAWN_ATTEMPTS => {
                tracing::debug!(
                    program = %program.display(),
                    attempt,
                    "executable busy, retrying"
                );
                thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
                attempt += 1;
            }
            Err(source) => {
                return Err(RunError::Spawn {
                    program: program.display().to_string(),
                    source,
                })
            }
        }
    }
}

// A freshly written executable can still be held open for writing by a
// concurrent fork; the kernel then refuses to exec it for a short while.
#[cfg(target_os = "linux")]
fn is_text_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ETXTBSY)
}

#[cfg(not(target_os = "linux"))]
fn is_text_busy(_err: &io::Error) -> bool {
    false
}

fn forward_lines<R: Read>(stream: R, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if tx.send(trim_line(&buf)).is_err() {
                    break;
                }
            }
        }
    }
}

fn drain_stderr<R: Read + Send + 'static>(stream: R) -> Arc<Mutex<VecDeque<String>>> {
    let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let sink = Arc::clone(&tail);
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = trim_line(&buf);
                    tracing::debug!(target: "evrepair::tool", "{line}");
                    if let Ok(mut tail) = sink.lock() {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            }
        }
    });
    tail
}

fn trim_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn interrupted(cancel: &CancelToken, deadline: Option<Instant>) -> Option<RunStatus> {
    if cancel.is_cancelled() {
        return Some(RunStatus::Cancelled);
    }
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Some(RunStatus::TimedOut),
        _ => None,
    }
}

fn next_wait(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => deadline
            .saturating_duration_since(Instant::now())
            .min(POLL_INTERVAL),
        None => POLL_INTERVAL,
    }
}

/// Owns a started tool until it has been waited for. Any early return kills
/// and reaps the process so it cannot keep writing files behind our back.
struct Reaper<'a> {
    child: Child,
    cancel: &'a CancelToken,
    reaped: bool,
}

impl<'a> Reaper<'a> {
    fn new(child: Child, cancel: &'a CancelToken) -> Self {
        cancel.set_running(true);
        Self {
            child,
            cancel,
            reaped: false,
        }
    }

    fn stop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.reaped = true;
    }
}

impl Deref for Reaper<'_> {
    type Target = Child;

    fn deref(&self) -> &Child {
        &self.child
    }
}

impl DerefMut for Reaper<'_> {
    fn deref_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

impl Drop for Reaper<'_> {
    fn drop(&mut self) {
        if !self.reaped {
            tracing::warn!(pid = self.child.id(), "run aborted, stopping tool");
            self.stop();
        }
        self.cancel.set_running(false);
    }
}

fn terminate(
    mut child: Reaper<'_>,
    status: RunStatus,
    lines_echoed: usize,
    stderr_tail: &Arc<Mutex<VecDeque<String>>>,
    started: Instant,
) -> RunOutcome {
    tracing::warn!(pid = child.id(), ?status, "stopping tool");
    child.stop();
    RunOutcome {
        status,
        lines_echoed,
        stderr_tail: snapshot(stderr_tail),
        elapsed: started.elapsed(),
    }
}

fn snapshot(tail: &Arc<Mutex<VecDeque<String>>>) -> Vec<String> {
    tail.lock()
        .map(|lines| lines.iter().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_line_strips_crlf_and_replaces_invalid_utf8() {
        assert_eq!(trim_line(b"frame=1\r\n"), "frame=1");
        assert_eq!(trim_line(b"no newline"), "no newline");
        assert_eq!(trim_line(b"\xffok\n"), "\u{fffd}ok");
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let cancel = CancelToken::new();
        assert_eq!(interrupted(&cancel, None), None);
        cancel.cancel();
        assert_eq!(
            interrupted(&cancel, Some(Instant::now())),
            Some(RunStatus::Cancelled)
        );
    }

    #[test]
    fn expired_deadline_times_out() {
        let cancel = CancelToken::new();
        assert_eq!(
            interrupted(&cancel, Some(Instant::now())),
            Some(RunStatus::TimedOut)
        );
        assert_eq!(next_wait(Some(Instant::now())), Duration::ZERO);
        assert_eq!(next_wait(None), POLL_INTERVAL);
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("tool.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "console closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn interrupt_is_ignored_while_idle() {
        let cancel = CancelToken::new();
        assert!(!cancel.interrupt());
        assert!(!cancel.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn failed_echo_stops_the_tool() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(temp.path(), "echo hi\nsleep 1\n: > marker\n");
        let limits = RunLimits::default();

        let err = run_tool(&script, &[], temp.path(), &mut ClosedPipe, &limits).unwrap_err();
        assert!(matches!(err, RunError::Io(_)));
        assert!(!limits.cancel.interrupt());

        thread::sleep(Duration::from_millis(1500));
        assert!(!temp.path().join("marker").exists());
    }

    #[cfg(unix)]
    #[test]
    fn interrupt_cancels_the_running_tool() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(temp.path(), "sleep 5\n");
        let limits = RunLimits::default();
        let interrupter = limits.cancel.clone();
        let handle = thread::spawn(move || {
            while !interrupter.interrupt() {
                thread::sleep(Duration::from_millis(10));
            }
        });

        let mut echo = Vec::new();
        let outcome = run_tool(&script, &[], temp.path(), &mut echo, &limits).unwrap();
        handle.join().unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(outcome.elapsed < Duration::from_secs(5));
        assert!(!limits.cancel.interrupt());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut echo = Vec::new();
        let err = run_tool(
            &temp.path().join("no-such-tool"),
            &[],
            temp.path(),
            &mut echo,
            &RunLimits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }
}
