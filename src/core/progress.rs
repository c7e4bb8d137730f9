use crate::domain::model::{JobEvent, ProgressEvent, ProtocolLine};
use crate::domain::ports::EventSender;
use crate::utils::error::{FtwError, Result};

pub const PROGRESS_TAG: &str = "[PROGRESS]";
pub const INFO_TAG: &str = "[INFO]";
pub const ERROR_TAG: &str = "[ERROR]";

/// Classifies one stdout line of the tagged line protocol.
pub fn parse_line(line: &str) -> ProtocolLine {
    let line = line.trim();

    if let Some(rest) = after_tag(line, PROGRESS_TAG) {
        let (number, message) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        return match number.parse::<u32>() {
            Ok(percent) => ProtocolLine::Progress(ProgressEvent {
                percent: percent.min(100) as u8,
                message: message.trim().to_string(),
            }),
            Err(_) => ProtocolLine::Other(line.to_string()),
        };
    }
    if let Some(rest) = after_tag(line, INFO_TAG) {
        return ProtocolLine::Info(rest.to_string());
    }
    if let Some(rest) = after_tag(line, ERROR_TAG) {
        return ProtocolLine::Error(rest.to_string());
    }
    ProtocolLine::Other(line.to_string())
}

fn after_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.find(tag).map(|idx| line[idx + tag.len()..].trim())
}

/// Everything a finished subprocess produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub stdout_lines: Vec<String>,
    pub error_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
    pub exit_code: Option<i32>,
}

impl Transcript {
    /// Last non-protocol stdout line, used by scripts that print their output path.
    pub fn last_plain_line(&self) -> Option<&str> {
        self.stdout_lines
            .iter()
            .rev()
            .map(String::as_str)
            .find(|l| !l.is_empty() && matches!(parse_line(l), ProtocolLine::Other(_)))
    }
}

/// Turns subprocess stdout into [`JobEvent`]s and collects error output.
pub struct ProgressAdapter {
    context: String,
    events: Option<EventSender>,
    stdout_lines: Vec<String>,
    error_lines: Vec<String>,
    last_percent: Option<u8>,
}

impl ProgressAdapter {
    pub fn new(context: impl Into<String>, events: Option<EventSender>) -> Self {
        Self {
            context: context.into(),
            events,
            stdout_lines: Vec::new(),
            error_lines: Vec::new(),
            last_percent: None,
        }
    }

    pub fn feed_line(&mut self, line: &str) -> ProtocolLine {
        let parsed = parse_line(line);
        self.stdout_lines.push(line.trim().to_string());

        match &parsed {
            ProtocolLine::Progress(event) => {
                if self.last_percent.is_some_and(|last| event.percent < last) {
                    tracing::debug!(
                        "Progress went backwards: {:?} -> {}",
                        self.last_percent,
                        event.percent
                    );
                }
                self.last_percent = Some(event.percent);
                self.emit(JobEvent::Progress(event.clone()));
            }
            ProtocolLine::Info(message) => {
                tracing::info!("{}", message);
                self.emit(JobEvent::Info(message.clone()));
            }
            ProtocolLine::Error(message) => {
                tracing::warn!("Error: {}", message);
                self.error_lines.push(message.clone());
                self.emit(JobEvent::Error(message.clone()));
            }
            ProtocolLine::Other(text) => {
                if !text.is_empty() {
                    tracing::debug!("{}", text);
                }
            }
        }

        parsed
    }

    fn emit(&self, event: JobEvent) {
        if let Some(tx) = &self.events {
            // 接收端已關閉時，事件直接丟棄
            let _ = tx.send(event);
        }
    }

    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }

    /// Exit code 0 yields the transcript; anything else becomes [`FtwError::Subprocess`].
    pub fn finish(self, exit_code: Option<i32>, stderr_lines: Vec<String>) -> Result<Transcript> {
        let transcript = Transcript {
            stdout_lines: self.stdout_lines,
            error_lines: self.error_lines,
            stderr_lines,
            exit_code,
        };

        if exit_code == Some(0) {
            return Ok(transcript);
        }

        let mut lines: Vec<&str> = transcript.error_lines.iter().map(String::as_str).collect();
        lines.extend(
            transcript
                .stderr_lines
                .iter()
                .map(String::as_str)
                .filter(|l| !l.trim().is_empty()),
        );
        let message = if lines.is_empty() {
            match exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        } else {
            lines.join("\n")
        };

        Err(FtwError::Subprocess {
            context: self.context,
            exit_code,
            message,
        })
    }
}
