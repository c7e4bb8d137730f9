use crate::domain::model::JobEvent;
use crate::domain::ports::Job;
use crate::utils::error::{FtwError, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

/// Runs one background job at a time; a second start while busy is rejected.
#[derive(Clone, Default)]
pub struct JobEngine {
    running: Arc<Mutex<Option<String>>>,
}

/// Clears the engine's running slot when the worker task ends.
struct SlotGuard {
    running: Arc<Mutex<Option<String>>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.running.lock() {
            *slot = None;
        }
    }
}

pub struct JobHandle {
    pub events: UnboundedReceiver<JobEvent>,
    task: JoinHandle<Result<String>>,
}

impl JobEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> Option<String> {
        self.running.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn is_busy(&self) -> bool {
        self.running().is_some()
    }

    pub fn start(&self, job: Arc<dyn Job>) -> Result<JobHandle> {
        let guard = {
            let mut slot = self.running.lock().map_err(|_| FtwError::Busy {
                running: "unknown (lock poisoned)".to_string(),
            })?;
            if let Some(running) = slot.as_ref() {
                return Err(FtwError::Busy {
                    running: running.clone(),
                });
            }
            *slot = Some(job.name().to_string());
            SlotGuard {
                running: Arc::clone(&self.running),
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tracing::info!("🚀 Starting {}", job.name());

        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = job.execute(&tx).await;
            let summary = match &result {
                Ok(message) => Ok(message.clone()),
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send(JobEvent::Finished(summary));
            result
        });

        Ok(JobHandle { events: rx, task })
    }
}

impl JobHandle {
    /// Drains events on the caller's task until the worker finishes.
    pub async fn wait<F>(mut self, mut on_event: F) -> Result<String>
    where
        F: FnMut(&JobEvent),
    {
        while let Some(event) = self.events.recv().await {
            on_event(&event);
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(FtwError::IoError(std::io::Error::other(format!(
                "worker task failed: {}",
                e
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ProgressEvent;
    use crate::domain::ports::EventSender;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct GatedJob {
        gate: Arc<Notify>,
        fail: bool,
    }

    #[async_trait]
    impl Job for GatedJob {
        fn name(&self) -> &str {
            "gated job"
        }

        async fn execute(&self, events: &EventSender) -> Result<String> {
            let _ = events.send(JobEvent::Progress(ProgressEvent {
                percent: 10,
                message: "waiting".to_string(),
            }));
            self.gate.notified().await;
            if self.fail {
                Err(FtwError::MissingInput {
                    field: "roi".to_string(),
                })
            } else {
                Ok("done".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let engine = JobEngine::new();
        let gate = Arc::new(Notify::new());
        let handle = engine
            .start(Arc::new(GatedJob {
                gate: Arc::clone(&gate),
                fail: false,
            }))
            .unwrap();
        assert!(engine.is_busy());

        let second = engine.start(Arc::new(GatedJob {
            gate: Arc::clone(&gate),
            fail: false,
        }));
        assert!(matches!(second, Err(FtwError::Busy { .. })));

        gate.notify_one();
        let mut seen = Vec::new();
        let result = handle.wait(|e| seen.push(e.clone())).await.unwrap();
        assert_eq!(result, "done");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], JobEvent::Finished(Ok("done".to_string())));
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_failure_releases_slot() {
        let engine = JobEngine::new();
        let gate = Arc::new(Notify::new());
        gate.notify_one();
        let handle = engine
            .start(Arc::new(GatedJob { gate, fail: true }))
            .unwrap();

        let err = handle.wait(|_| {}).await.unwrap_err();
        assert!(matches!(err, FtwError::MissingInput { .. }));
        assert!(!engine.is_busy());
    }
}
