//! Run chains of external processes.
//!
//! A [`Chain`] is one or more [`Command`]s executed as a single logical step.
//! When the chain is piped, the stdout of each stage feeds the stdin of the
//! next. Every stage is spawned before any is waited on, and every stream the
//! parent holds is drained on its own thread, so no child can block on a full
//! pipe.

use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{self, Child, ChildStdout, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{Error, StageFailure};

/// Number of stderr lines kept per stage when output is streamed.
const STDERR_TAIL: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A program name followed by its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Command {
            tokens: vec![program.into()],
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.tokens.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path<P: AsRef<Path>>(self, path: P) -> Self {
        let arg = path.as_ref().to_string_lossy().into_owned();
        self.arg(arg)
    }

    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn arguments(&self) -> &[String] {
        &self.tokens[1..]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

/// Which stream of a child process a line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Receives tool output line by line while a chain runs.
pub trait LineSink: Send + Sync {
    fn line(&self, program: &str, stream: StreamKind, line: &str);
}

/// Forward tool output to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl LineSink for LogSink {
    fn line(&self, program: &str, _stream: StreamKind, line: &str) {
        info!("[{program}] {line}");
    }
}

/// Whether tool output goes to the sink as it arrives or is buffered and
/// handed back in the [`ChainResult`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Stream,
    Capture,
}

/// A command plus its position in a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub command: Command,
    pub pipe_in: bool,
    pub pipe_out: bool,
}

/// An ordered set of stages run as one step.
#[derive(Clone, Debug)]
pub struct Chain {
    stages: Vec<Stage>,
    mode: OutputMode,
    stdout_file: Option<PathBuf>,
}

impl Chain {
    /// Build a chain. With `pipe` set, every adjacent pair of stages is
    /// connected stdout to stdin; otherwise all stages run independently.
    pub fn new(commands: Vec<Command>, pipe: bool) -> Self {
        let last = commands.len().saturating_sub(1);
        let stages = commands
            .into_iter()
            .enumerate()
            .map(|(index, command)| Stage {
                command,
                pipe_in: pipe && index > 0,
                pipe_out: pipe && index < last,
            })
            .collect();
        Chain {
            stages,
            mode: OutputMode::Stream,
            stdout_file: None,
        }
    }

    pub fn single(command: Command) -> Self {
        Chain::new(vec![command], false)
    }

    pub fn capture(mut self) -> Self {
        self.mode = OutputMode::Capture;
        self
    }

    /// Send stdout of the final stage to a file instead of the sink.
    pub fn stdout_to<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.stdout_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// Text collected from one stage. In stream mode `stdout` is empty and
/// `stderr` keeps only the last few lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Exit codes of a finished chain, one per stage in stage order.
#[derive(Clone, Debug)]
pub struct ChainResult {
    programs: Vec<String>,
    codes: Vec<i32>,
    outputs: Vec<StageOutput>,
}

impl ChainResult {
    pub fn codes(&self) -> &[i32] {
        &self.codes
    }

    /// Captured stdout of `stage`, or `None` past the last stage.
    pub fn stdout(&self, stage: usize) -> Option<&str> {
        self.outputs.get(stage).map(|output| output.stdout.as_str())
    }

    pub fn stderr(&self, stage: usize) -> Option<&str> {
        self.outputs.get(stage).map(|output| output.stderr.as_str())
    }

    pub fn success(&self) -> bool {
        self.codes.iter().all(|&code| code == 0)
    }

    pub fn failures(&self) -> Vec<StageFailure> {
        self.codes
            .iter()
            .enumerate()
            .filter(|(_, &code)| code != 0)
            .map(|(stage, &code)| StageFailure {
                stage,
                program: self.programs[stage].clone(),
                code,
                stderr: self.outputs[stage].stderr.clone(),
            })
            .collect()
    }

    /// Treat a non-zero code from any stage as failure of the whole chain.
    pub fn check(self) -> Result<Self, Error> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::ChainFailed(failures))
        }
    }
}

struct Running {
    program: String,
    child: Child,
    stdout_reader: Option<JoinHandle<String>>,
    stderr_reader: Option<JoinHandle<String>>,
}

impl Running {
    fn finish(self) -> StageOutput {
        let join = |handle: Option<JoinHandle<String>>| {
            handle
                .map(|h| h.join().unwrap_or_default())
                .unwrap_or_default()
        };
        StageOutput {
            stdout: join(self.stdout_reader),
            stderr: join(self.stderr_reader),
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn kill_all(running: &mut [Running]) {
    for stage in running.iter_mut() {
        let _ = stage.child.kill();
        let _ = stage.child.wait();
    }
}

/// Wait on each stage in turn. If waiting fails, every stage is killed
/// before the error is returned.
fn wait_in_order<F>(running: &mut [Running], mut wait: F) -> Result<Vec<i32>, Error>
where
    F: FnMut(&mut Child) -> io::Result<ExitStatus>,
{
    let mut codes = Vec::with_capacity(running.len());
    for index in 0..running.len() {
        match wait(&mut running[index].child) {
            Ok(status) => codes.push(exit_code(status)),
            Err(err) => {
                kill_all(running);
                return Err(err.into());
            }
        }
    }
    Ok(codes)
}

/// Spawns chains and reports their exit codes.
///
/// The executor owns the sink that streamed output is written to, so callers
/// choose where tool output ends up when they build it.
#[derive(Clone)]
pub struct Executor {
    sink: Arc<dyn LineSink>,
    timeout: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Default for Executor {
    fn default() -> Self {
        Executor::new(Arc::new(LogSink))
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("timeout", &self.timeout)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl Executor {
    pub fn new(sink: Arc<dyn LineSink>) -> Self {
        Executor {
            sink,
            timeout: None,
            cancel: None,
        }
    }

    /// Kill every stage still running once `timeout` has elapsed. Without a
    /// timeout the executor waits as long as the tools take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Kill every running stage once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run every stage of `chain` and wait for all of them to exit.
    ///
    /// A program that cannot be started is reported as [`Error::Spawn`];
    /// stages already running are killed. Non-zero exit codes are not errors
    /// here: inspect the result or call [`ChainResult::check`].
    pub fn run(&self, chain: &Chain) -> Result<ChainResult, Error> {
        if chain.stages.is_empty() {
            return Err(Error::Config(
                "a chain needs at least one command".to_string(),
            ));
        }
        let last = chain.stages.len() - 1;
        let mut running: Vec<Running> = Vec::with_capacity(chain.stages.len());
        let mut upstream: Option<ChildStdout> = None;

        for (index, stage) in chain.stages.iter().enumerate() {
            debug!("Command {}/{}: {}", index + 1, last + 1, stage.command);
            let program = stage.command.program().to_string();
            let mut command = process::Command::new(&program);
            command.args(stage.command.arguments());

            match upstream.take() {
                Some(stdout) if stage.pipe_in => command.stdin(Stdio::from(stdout)),
                _ => command.stdin(Stdio::null()),
            };

            match (&chain.stdout_file, index == last && !stage.pipe_out) {
                (Some(path), true) => {
                    debug!("stdout output file: {}", path.display());
                    match File::create(path) {
                        Ok(file) => command.stdout(Stdio::from(file)),
                        Err(err) => {
                            kill_all(&mut running);
                            return Err(err.into());
                        }
                    }
                }
                _ => command.stdout(Stdio::piped()),
            };
            command.stderr(Stdio::piped());

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(err) => {
                    kill_all(&mut running);
                    return Err(Error::Spawn {
                        program,
                        reason: err.to_string(),
                    });
                }
            };

            let stderr_reader = child
                .stderr
                .take()
                .map(|stderr| self.drain(&program, StreamKind::Stderr, stderr, chain.mode));
            let stdout_reader = if stage.pipe_out {
                upstream = child.stdout.take();
                None
            } else {
                child
                    .stdout
                    .take()
                    .map(|stdout| self.drain(&program, StreamKind::Stdout, stdout, chain.mode))
            };
            running.push(Running {
                program,
                child,
                stdout_reader,
                stderr_reader,
            });
        }

        let codes = self.wait_all(&mut running)?;
        debug!("Return codes: {:?}", codes);
        let programs = running.iter().map(|stage| stage.program.clone()).collect();
        let outputs = running.into_iter().map(Running::finish).collect();
        Ok(ChainResult {
            programs,
            codes,
            outputs,
        })
    }

    fn wait_all(&self, running: &mut [Running]) -> Result<Vec<i32>, Error> {
        if self.timeout.is_none() && self.cancel.is_none() {
            return wait_in_order(running, Child::wait);
        }

        let started = Instant::now();
        let mut codes: Vec<Option<i32>> = vec![None; running.len()];
        loop {
            let mut failed = None;
            for (code, stage) in codes.iter_mut().zip(running.iter_mut()) {
                if code.is_none() {
                    match stage.child.try_wait() {
                        Ok(Some(status)) => *code = Some(exit_code(status)),
                        Ok(None) => (),
                        Err(err) => {
                            failed = Some(err);
                            break;
                        }
                    }
                }
            }
            if let Some(err) = failed {
                kill_all(running);
                return Err(err.into());
            }
            if codes.iter().all(Option::is_some) {
                return Ok(codes.into_iter().flatten().collect());
            }

            let pending = running
                .iter()
                .zip(&codes)
                .find(|(_, code)| code.is_none())
                .map(|(stage, _)| stage.program.clone())
                .unwrap_or_default();
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    kill_all(running);
                    return Err(Error::Timeout(timeout, pending));
                }
            }
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    kill_all(running);
                    return Err(Error::Cancelled(pending));
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn drain<R: Read + Send + 'static>(
        &self,
        program: &str,
        stream: StreamKind,
        source: R,
        mode: OutputMode,
    ) -> JoinHandle<String> {
        let sink = Arc::clone(&self.sink);
        let program = program.to_string();
        thread::spawn(move || {
            let mut reader = BufReader::new(source);
            let mut buffer = Vec::new();
            let mut captured = String::new();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
            loop {
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => (),
                }
                let text = String::from_utf8_lossy(&buffer);
                match mode {
                    OutputMode::Capture => captured.push_str(&text),
                    OutputMode::Stream => {
                        let line = text.trim_end_matches(|c: char| c == '\n' || c == '\r');
                        sink.line(&program, stream, line);
                        if stream == StreamKind::Stderr {
                            if tail.len() == STDERR_TAIL {
                                tail.pop_front();
                            }
                            tail.push_back(line.to_string());
                        }
                    }
                }
            }
            match mode {
                OutputMode::Capture => captured,
                OutputMode::Stream => tail.into_iter().map(|line| line + "\n").collect(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<(String, StreamKind, String)>>,
    }

    impl LineSink for CollectingSink {
        fn line(&self, program: &str, stream: StreamKind, line: &str) {
            self.lines
                .lock()
                .unwrap()
                .push((program.to_string(), stream, line.to_string()));
        }
    }

    fn sh(script: &str) -> Command {
        Command::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn piped_stage_flags_follow_position() {
        let chain = Chain::new(
            vec![Command::new("a"), Command::new("b"), Command::new("c")],
            true,
        );
        let flags: Vec<_> = chain
            .stages()
            .iter()
            .map(|stage| (stage.pipe_in, stage.pipe_out))
            .collect();
        assert_eq!(flags, vec![(false, true), (true, true), (true, false)]);

        let chain = Chain::new(vec![Command::new("a"), Command::new("b")], false);
        assert!(chain
            .stages()
            .iter()
            .all(|stage| !stage.pipe_in && !stage.pipe_out));
    }

    #[test]
    fn command_display_joins_tokens() {
        let command = Command::new("samtools")
            .args(["view", "-b"])
            .arg_path(Path::new("/tmp/out.bam"));
        assert_eq!(command.to_string(), "samtools view -b /tmp/out.bam");
        assert_eq!(command.program(), "samtools");
        assert_eq!(command.arguments().len(), 3);
    }

    #[test]
    fn captures_stdout_of_single_command() {
        let result = Executor::default()
            .run(&Chain::single(Command::new("printf").arg("alpha\\nbeta\\n")).capture())
            .unwrap();
        assert_eq!(result.codes(), &[0]);
        assert_eq!(result.stdout(0), Some("alpha\nbeta\n"));
        assert!(result.success());
    }

    #[test]
    fn non_zero_exit_is_reported_per_stage() {
        let result = Executor::default()
            .run(&Chain::single(sh("echo broken >&2; exit 3")).capture())
            .unwrap();
        assert_eq!(result.codes(), &[3]);
        match result.check() {
            Err(Error::ChainFailed(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].code, 3);
                assert_eq!(failures[0].program, "sh");
                assert_eq!(failures[0].stderr, "broken\n");
            }
            other => panic!("expected chain failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = Executor::default()
            .run(&Chain::single(Command::new("dehost-no-such-program")))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Spawn { ref program, .. } if program == "dehost-no-such-program"
        ));
    }

    #[test]
    fn spawn_error_mid_chain_stops_started_stages() {
        let started = Instant::now();
        let err = Executor::default()
            .run(&Chain::new(
                vec![Command::new("yes"), Command::new("dehost-no-such-program")],
                true,
            ))
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn empty_chain_is_rejected() {
        let err = Executor::default().run(&Chain::new(vec![], false)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn piped_chain_connects_stages() {
        let result = Executor::default()
            .run(
                &Chain::new(
                    vec![
                        Command::new("printf").arg("a\\nb\\nc\\n"),
                        Command::new("wc").arg("-l"),
                    ],
                    true,
                )
                .capture(),
            )
            .unwrap();
        assert_eq!(result.codes(), &[0, 0]);
        assert_eq!(result.stdout(0), Some(""));
        assert_eq!(result.stdout(1).map(str::trim), Some("3"));
        assert_eq!(result.stdout(2), None);
        assert_eq!(result.stderr(2), None);
    }

    #[test]
    fn failed_upstream_still_feeds_partial_output() {
        let result = Executor::default()
            .run(
                &Chain::new(
                    vec![sh("printf 'x\\ny\\n'; exit 4"), Command::new("wc").arg("-l")],
                    true,
                )
                .capture(),
            )
            .unwrap();
        assert_eq!(result.codes(), &[4, 0]);
        assert_eq!(result.stdout(1).map(str::trim), Some("2"));
        assert!(!result.success());
    }

    #[test]
    fn large_piped_output_does_not_deadlock() {
        let bytes = 8 * 1024 * 1024;
        let result = Executor::default()
            .run(
                &Chain::new(
                    vec![
                        Command::new("head").arg("-c").arg(bytes.to_string()).arg("/dev/zero"),
                        Command::new("cat"),
                        Command::new("wc").arg("-c"),
                    ],
                    true,
                )
                .capture(),
            )
            .unwrap();
        assert_eq!(result.codes(), &[0, 0, 0]);
        assert_eq!(result.stdout(2).map(str::trim), Some(bytes.to_string().as_str()));
    }

    #[test]
    fn large_stdout_and_stderr_are_drained_together() {
        let result = Executor::default()
            .run(
                &Chain::single(sh(
                    "head -c 4000000 /dev/zero; head -c 4000000 /dev/zero >&2",
                ))
                .capture(),
            )
            .unwrap();
        assert_eq!(result.codes(), &[0]);
        assert_eq!(result.stdout(0).map(str::len), Some(4_000_000));
        assert_eq!(result.stderr(0).map(str::len), Some(4_000_000));
    }

    #[test]
    fn final_stdout_can_go_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let result = Executor::default()
            .run(
                &Chain::new(vec![Command::new("printf").arg("hello"), Command::new("cat")], true)
                    .stdout_to(&path),
            )
            .unwrap();
        assert!(result.success());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn streamed_lines_reach_the_sink_in_order() {
        let sink = Arc::new(CollectingSink::default());
        let executor = Executor::new(sink.clone());
        let result = executor
            .run(&Chain::single(sh("echo one >&2; echo two >&2; echo three")))
            .unwrap();
        assert!(result.success());

        let lines = sink.lines.lock().unwrap();
        let stderr: Vec<_> = lines
            .iter()
            .filter(|(_, stream, _)| *stream == StreamKind::Stderr)
            .map(|(_, _, line)| line.as_str())
            .collect();
        assert_eq!(stderr, vec!["one", "two"]);
        assert!(lines.iter().any(|(program, stream, line)| {
            program == "sh" && *stream == StreamKind::Stdout && line == "three"
        }));
        assert_eq!(result.stderr(0), Some("one\ntwo\n"));
        assert_eq!(result.stdout(0), Some(""));
    }

    #[test]
    fn streamed_stderr_keeps_a_bounded_tail() {
        let result = Executor::new(Arc::new(CollectingSink::default()))
            .run(&Chain::single(sh(
                "i=0; while [ $i -lt 50 ]; do echo line$i >&2; i=$((i+1)); done",
            )))
            .unwrap();
        let tail: Vec<_> = result.stderr(0).unwrap_or_default().lines().collect();
        assert_eq!(tail.len(), STDERR_TAIL);
        assert_eq!(tail.last(), Some(&"line49"));
    }

    #[test]
    fn timeout_kills_running_stages() {
        let started = Instant::now();
        let err = Executor::default()
            .with_timeout(Duration::from_millis(200))
            .run(&Chain::single(Command::new("sleep").arg("10")))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_, ref program) if program == "sleep"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn failed_wait_kills_every_stage() {
        let mut running: Vec<Running> = (0..2)
            .map(|_| Running {
                program: "sleep".to_string(),
                child: process::Command::new("sleep")
                    .arg("30")
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .unwrap(),
                stdout_reader: None,
                stderr_reader: None,
            })
            .collect();
        let started = Instant::now();
        let err = wait_in_order(&mut running, |_| {
            Err(io::Error::new(io::ErrorKind::Interrupted, "wait failed"))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        for stage in running.iter_mut() {
            let status = stage.child.try_wait().unwrap();
            assert!(status.is_some_and(|status| !status.success()));
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancel_flag_stops_the_chain() {
        let flag = Arc::new(AtomicBool::new(true));
        let err = Executor::default()
            .with_cancel_flag(flag)
            .run(&Chain::single(Command::new("sleep").arg("10")))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[test]
    fn timeout_does_not_fire_for_quick_chains() {
        let result = Executor::default()
            .with_timeout(Duration::from_secs(30))
            .run(&Chain::single(sh("exit 0")))
            .unwrap();
        assert_eq!(result.codes(), &[0]);
    }
}
