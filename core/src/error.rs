use crate::identifier::GlobalIdentifier;

use labex_utils::error::{FileIOError, NonUtf8PathError};

use std::path::Path;

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while planning or assembling an archive.
///
/// Only [`Error::Permission`] and [`Error::DiskSpace`] abort a whole run, everything
/// else is recovered at the element or record boundary, see [`Error::is_fatal`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("user is not permitted to read record: <id='{id}', user='{user}'>")]
	Permission { id: GlobalIdentifier, user: String },
	#[error(
		"not enough disk space to continue the export: <required={required}, available={available}, path='{}'>",
		.path.display()
	)]
	DiskSpace {
		required: u64,
		available: u64,
		path: Box<Path>,
	},
	#[error("record not found: <id='{0}'>")]
	NotFound(GlobalIdentifier),
	#[error("user not found: <username='{0}'>")]
	UserNotFound(String),
	#[error("group not found: <id='{0}'>")]
	GroupNotFound(u64),
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error(transparent)]
	NonUtf8Path(#[from] NonUtf8PathError),
	#[error("failed to convert image: {0}")]
	Image(#[from] labex_images::Error),
	#[error("failed to write zip archive: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("failed to serialize to json: {0}")]
	Json(#[from] serde_json::Error),
	#[error("failed to serialize to xml: {0}")]
	Xml(String),
	#[error("background task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
	#[error("collaborator failure: {0}")]
	Collaborator(String),
	#[error("export failed: {0}")]
	Export(String),
}

impl Error {
	/// Fatal errors unwind the entire run, anything else only drops the current item
	#[must_use]
	pub const fn is_fatal(&self) -> bool {
		matches!(self, Self::Permission { .. } | Self::DiskSpace { .. })
	}

	/// I/O failures caused by a full volume are promoted to [`Error::DiskSpace`] so
	/// they abort the run like a failed space pre-check would.
	#[must_use]
	pub fn from_io(err: FileIOError) -> Self {
		if err.is_storage_full() {
			Self::DiskSpace {
				required: 0,
				available: 0,
				path: err.path,
			}
		} else {
			Self::FileIO(err)
		}
	}
}

/// A single item that could not be exported, the run carried on without it
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonCriticalExportError {
	#[error("record was skipped: <id='{id}', reason='{reason}'>")]
	Record { id: String, reason: String },
	#[error("field element was dropped: <field_id={field_id}, element='{element}', reason='{reason}'>")]
	Element {
		field_id: u64,
		element: String,
		reason: String,
	},
	#[error("revision could not be resolved: <id='{id}', reason='{reason}'>")]
	Revision { id: String, reason: String },
}
