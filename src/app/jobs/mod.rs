pub mod download_job;
pub mod inference_job;
pub mod setup_job;

pub use download_job::DownloadJob;
pub use inference_job::{InferenceJob, ModelSource};
pub use setup_job::SetupJob;

use crate::domain::model::{JobEvent, ProgressEvent};
use crate::domain::ports::EventSender;

pub(crate) fn report(events: &EventSender, percent: u8, message: &str) {
    let _ = events.send(JobEvent::Progress(ProgressEvent {
        percent,
        message: message.to_string(),
    }));
}

pub(crate) fn info(events: &EventSender, message: String) {
    let _ = events.send(JobEvent::Info(message));
}
