use crate::core::progress::{ProgressAdapter, Transcript};
use crate::domain::model::ProtocolLine;
use crate::domain::ports::EventSender;
use crate::utils::error::Result;
use crate::utils::monitor::ProcessMonitor;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Interpreter variables that would leak the caller's Python into the conda env.
pub const STRIPPED_ENV_VARS: [&str; 2] = ["PYTHONHOME", "PYTHONPATH"];

pub fn clean_environment<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(key, _)| !STRIPPED_ENV_VARS.contains(&key.as_str()))
        .collect()
}

/// Runs shell scripts that speak the `[PROGRESS]` / `[INFO]` / `[ERROR]` line protocol.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    shell: String,
    env: HashMap<String, String>,
    monitor: bool,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRunner {
    pub fn new() -> Self {
        Self {
            shell: "bash".to_string(),
            env: clean_environment(std::env::vars()),
            monitor: false,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled;
        self
    }

    /// Blocks (asynchronously) until the script exits. No timeout, no cancellation.
    pub async fn run(
        &self,
        context: &str,
        script: &str,
        events: Option<EventSender>,
    ) -> Result<Transcript> {
        tracing::debug!("Running {} script:\n{}", context, script);

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(script)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut monitor = ProcessMonitor::new(self.monitor);
        if let Some(pid) = child.id() {
            monitor.attach(pid);
        }

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut collected = Vec::new();
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                while let Ok(Some(line)) = read_lossy_line(&mut reader, &mut buf).await {
                    tracing::debug!("stderr: {}", line);
                    collected.push(line);
                }
                collected
            })
        });

        let mut adapter = ProgressAdapter::new(context, events);
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                match read_lossy_line(&mut reader, &mut buf).await {
                    Ok(Some(line)) => {
                        if let ProtocolLine::Progress(event) = adapter.feed_line(&line) {
                            monitor.log_stats(&event.message);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // 讀取失敗仍需等待子程序結束
                        tracing::warn!("⚠️ Stopped reading {} output: {}", context, e);
                        break;
                    }
                }
            }
        }

        let status = child.wait().await?;
        let stderr_lines = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        monitor.log_final_stats();

        tracing::debug!("{} exited with {:?}", context, status.code());
        adapter.finish(status.code(), stderr_lines)
    }
}

/// One line without its terminator; invalid UTF-8 is replaced rather than rejected.
async fn read_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{JobEvent, ProgressEvent};
    use crate::utils::error::FtwError;
    use tokio::sync::mpsc;

    #[test]
    fn test_clean_environment_strips_python_vars() {
        let vars = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("PYTHONHOME".to_string(), "/opt/qgis/python".to_string()),
            ("PYTHONPATH".to_string(), "/opt/qgis/lib".to_string()),
            ("HOME".to_string(), "/home/user".to_string()),
        ];
        let env = clean_environment(vars);
        assert_eq!(env.len(), 2);
        assert!(!env.contains_key("PYTHONHOME"));
        assert!(!env.contains_key("PYTHONPATH"));
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin"));
    }

    #[tokio::test]
    async fn test_run_streams_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = ScriptRunner::new();
        let transcript = runner
            .run(
                "Test",
                "echo '[PROGRESS] 25 Creating environment'; echo 'noise'; echo '[PROGRESS] 100 Done'",
                Some(tx),
            )
            .await
            .unwrap();

        assert_eq!(transcript.exit_code, Some(0));
        assert_eq!(transcript.stdout_lines.len(), 3);
        assert_eq!(
            rx.recv().await.unwrap(),
            JobEvent::Progress(ProgressEvent {
                percent: 25,
                message: "Creating environment".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_run_failure_collects_errors_and_stderr() {
        let runner = ScriptRunner::new();
        let err = runner
            .run("Process", "echo '[ERROR] boom'; echo 'trace' >&2; exit 3", None)
            .await
            .unwrap_err();
        match err {
            FtwError::Subprocess {
                exit_code, message, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(message.contains("boom"));
                assert!(message.contains("trace"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_child_does_not_see_python_vars() {
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());
        env.insert("PYTHONPATH".to_string(), "/leak".to_string());
        let runner = ScriptRunner::new().with_env(clean_environment(env));

        let transcript = runner
            .run("Env", "echo \"pp=${PYTHONPATH:-unset}\"", None)
            .await
            .unwrap();
        assert_eq!(transcript.stdout_lines, vec!["pp=unset".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_stop_the_run() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transcript = ScriptRunner::new()
            .run(
                "Test",
                "printf 'caf\\xe9 log\\n'; printf '\\xff\\n' >&2; echo '[PROGRESS] 100 done'",
                Some(tx),
            )
            .await
            .unwrap();

        assert_eq!(transcript.exit_code, Some(0));
        assert_eq!(transcript.stdout_lines[0], "caf\u{FFFD} log");
        assert_eq!(transcript.stderr_lines, vec!["\u{FFFD}".to_string()]);
        assert_eq!(
            rx.recv().await.unwrap(),
            JobEvent::Progress(ProgressEvent {
                percent: 100,
                message: "done".to_string()
            })
        );
    }
}
