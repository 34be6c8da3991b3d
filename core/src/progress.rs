use std::{
	fmt,
	sync::atomic::{AtomicUsize, Ordering},
};

use tokio::sync::RwLock;

pub enum ProgressUpdate {
	TaskCount(usize),
	CompletedTaskCount(usize),
	Message(String),
	Phase(String),
}

pub trait ProgressReporter: Send + Sync + fmt::Debug + 'static {
	fn progress(&self, updates: Vec<ProgressUpdate>);

	fn progress_msg(&self, msg: impl Into<String>)
	where
		Self: Sized,
	{
		self.progress(vec![ProgressUpdate::Message(msg.into())]);
	}
}

/// Reporter for callers that don't poll progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
	fn progress(&self, _updates: Vec<ProgressUpdate>) {}
}

/// Progress state a job runner can poll from another task
#[derive(Debug, Default)]
pub struct SharedProgress {
	task_count: AtomicUsize,
	completed: AtomicUsize,
	phase: RwLock<String>,
	message: RwLock<String>,
}

impl SharedProgress {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Percent of top level records exported so far, 0 until the task count is known
	#[must_use]
	#[allow(clippy::cast_precision_loss)]
	pub fn percent_complete(&self) -> f32 {
		let total = self.task_count.load(Ordering::Acquire);
		if total == 0 {
			return 0.0;
		}
		let completed = self.completed.load(Ordering::Acquire).min(total);
		(completed as f32 / total as f32) * 100.0
	}

	#[must_use]
	pub fn completed(&self) -> usize {
		self.completed.load(Ordering::Acquire)
	}

	pub async fn phase(&self) -> String {
		self.phase.read().await.clone()
	}

	pub async fn message(&self) -> String {
		self.message.read().await.clone()
	}
}

impl ProgressReporter for SharedProgress {
	fn progress(&self, updates: Vec<ProgressUpdate>) {
		for update in updates {
			match update {
				ProgressUpdate::TaskCount(count) => self.task_count.store(count, Ordering::Release),
				ProgressUpdate::CompletedTaskCount(count) => {
					self.completed.store(count, Ordering::Release);
				}
				// Readers only ever hold the lock for a clone, a contended write just
				// drops an intermediate label
				ProgressUpdate::Message(msg) => {
					if let Ok(mut message) = self.message.try_write() {
						*message = msg;
					}
				}
				ProgressUpdate::Phase(name) => {
					if let Ok(mut phase) = self.phase.try_write() {
						*phase = name;
					}
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn tracks_percentage() {
		let progress = SharedProgress::new();
		assert!(progress.percent_complete().abs() < f32::EPSILON);

		progress.progress(vec![
			ProgressUpdate::TaskCount(4),
			ProgressUpdate::Phase("records".into()),
		]);
		progress.progress(vec![ProgressUpdate::CompletedTaskCount(1)]);
		progress.progress_msg("exporting SD1");

		assert!((progress.percent_complete() - 25.0).abs() < f32::EPSILON);
		assert_eq!(progress.phase().await, "records");
		assert_eq!(progress.message().await, "exporting SD1");
	}
}
