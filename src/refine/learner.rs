//! Running the external tree learner on one exported leaf.

use super::export::JobFiles;
use crate::config::LearnerConfig;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

/// Number of trailing stderr lines attached to a failure.
const STDERR_TAIL_LINES: usize = 20;

/// Builds and runs learner command lines. Arguments are passed as a list, so
/// paths are never reinterpreted by a shell.
#[derive(Debug, Clone)]
pub struct Learner<'a> {
    config: &'a LearnerConfig,
    description: &'a Path,
    min_split_size: usize,
}

impl<'a> Learner<'a> {
    pub fn new(config: &'a LearnerConfig, description: &'a Path, min_split_size: usize) -> Self {
        Learner {
            config,
            description,
            min_split_size,
        }
    }

    /// `<leading args> -desc D -data F -balance B -distmatrix M -stop S -output O`
    pub fn command(&self, files: &JobFiles) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.leading_args)
            .arg("-desc")
            .arg(self.description)
            .arg("-data")
            .arg(&files.data)
            .arg("-balance")
            .arg(self.config.balance.to_string())
            .arg("-distmatrix")
            .arg(&files.distances)
            .arg("-stop")
            .arg(self.min_split_size.to_string())
            .arg("-output")
            .arg(&files.tree);
        cmd
    }

    /// Runs the learner to completion, forwarding its output to the log.
    ///
    /// Both pipes are drained on their own threads while the process runs.
    pub fn run(&self, files: &JobFiles) -> Result<()> {
        let job = files.job;
        let mut cmd = self.command(files);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        tracing::debug!(job, "running {cmd:?}");

        let mut child = cmd.spawn().map_err(|e| Error::ExternalProcess {
            job,
            status: format!("could not start {}: {e}", self.config.program.display()),
            stderr: String::new(),
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, tail) = thread::scope(|s| {
            let out = s.spawn(move || forward_lines(stdout, job, "stdout", 0));
            let err = s.spawn(move || forward_lines(stderr, job, "stderr", STDERR_TAIL_LINES));
            let status = child.wait();
            let _ = out.join();
            let tail = err.join().unwrap_or_default();
            (status, tail)
        });

        let status = status.map_err(|e| Error::ExternalProcess {
            job,
            status: format!("wait failed: {e}"),
            stderr: tail.join("\n"),
        })?;
        if !status.success() {
            return Err(Error::ExternalProcess {
                job,
                status: status.to_string(),
                stderr: tail.join("\n"),
            });
        }
        Ok(())
    }
}

/// Logs every line of `stream` at debug level and returns the last `keep`.
fn forward_lines<R: Read>(stream: Option<R>, job: usize, name: &'static str, keep: usize) -> Vec<String> {
    let Some(stream) = stream else {
        return Vec::new();
    };
    let mut reader = BufReader::new(stream);
    let mut tail = VecDeque::with_capacity(keep);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                tracing::debug!(job, stream = name, "{line}");
                if keep > 0 {
                    if tail.len() == keep {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                }
            }
            Err(e) => {
                tracing::debug!(job, stream = name, "stopped reading learner output: {e}");
                break;
            }
        }
    }
    tail.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn command_line_is_structured() {
        let config = LearnerConfig {
            program: PathBuf::from("/opt/bin/wagon"),
            leading_args: vec!["-verbose".into()],
            balance: 0,
        };
        let files = JobFiles::new(Path::new("work dir"), 2);
        let desc = PathBuf::from("work dir/learner.desc");
        let learner = Learner::new(&config, &desc, 50);
        let cmd = learner.command(&files);
        assert_eq!(cmd.get_program(), "/opt/bin/wagon");
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "-verbose",
                "-desc",
                "work dir/learner.desc",
                "-data",
                "work dir/learner.data.2",
                "-balance",
                "0",
                "-distmatrix",
                "work dir/learner.dist.2",
                "-stop",
                "50",
                "-output",
                "work dir/learner.tree.2",
            ]
        );
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = "one\ntwo\nthree\n";
        let tail = forward_lines(Some(text.as_bytes()), 1, "stderr", 2);
        assert_eq!(tail, ["two", "three"]);
        assert!(forward_lines(Some(text.as_bytes()), 1, "stdout", 0).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let config = LearnerConfig {
            program: PathBuf::from("sh"),
            leading_args: vec!["-c".into(), "echo broken data >&2; exit 3".into(), "learner".into()],
            balance: 0,
        };
        let desc = dir.path().join("learner.desc");
        let learner = Learner::new(&config, &desc, 50);
        let err = learner.run(&JobFiles::new(dir.path(), 4)).unwrap_err();
        match err {
            Error::ExternalProcess { job, status, stderr } => {
                assert_eq!(job, 4);
                assert!(status.contains('3'));
                assert_eq!(stderr, "broken data");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_program_is_external_process_error() {
        let config = LearnerConfig {
            program: PathBuf::from("/nonexistent/learner-binary"),
            leading_args: vec![],
            balance: 0,
        };
        let desc = PathBuf::from("learner.desc");
        let learner = Learner::new(&config, &desc, 50);
        let err = learner.run(&JobFiles::new(Path::new("."), 1)).unwrap_err();
        assert!(matches!(err, Error::ExternalProcess { job: 1, .. }));
    }
}
