//! Interfaces of the systems the exporter reads from and reports to.
//!
//! Persistence, permissions, audit history, the rich-text parser, the file store,
//! remote filesystems, checksum bookkeeping and notifications all live outside this
//! crate; an export run only ever talks to them through these traits.

use crate::{
	disk::DiskSpaceChecker,
	error::Result,
	fields::element::{
		ChemElement, CommentElement, ExternalWorkflowData, FieldContents, MathElement, NfsTarget,
		SketchElement, StoichiometryTable,
	},
	finalizer::ArchiveChecksum,
	identifier::GlobalIdentifier,
	model::{Document, Entity, FileProperty, Group, MediaFile, Permission, User},
	nfs::NfsFileInfo,
};

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait RecordStore: Send + Sync {
	/// Any folder, document or media file, `None` if it doesn't exist
	async fn get(&self, id: &GlobalIdentifier) -> Result<Option<Entity>>;

	/// Direct children of a folder or notebook
	async fn children(&self, folder_id: u64) -> Result<Vec<Entity>>;

	async fn user(&self, username: &str) -> Result<Option<User>>;

	async fn group(&self, group_id: u64) -> Result<Option<Group>>;

	/// Id of the user's home folder
	async fn root_folder_id(&self, username: &str) -> Result<Option<u64>>;
}

/// Typed payloads of field elements, optionally at a given revision
#[async_trait]
pub trait ElementStore: Send + Sync {
	async fn chem(&self, id: &GlobalIdentifier, revision: Option<u64>)
		-> Result<Option<ChemElement>>;

	async fn math(&self, id: &GlobalIdentifier, revision: Option<u64>)
		-> Result<Option<MathElement>>;

	async fn comment(
		&self,
		id: &GlobalIdentifier,
		revision: Option<u64>,
	) -> Result<Option<CommentElement>>;

	async fn sketch(
		&self,
		id: &GlobalIdentifier,
		revision: Option<u64>,
	) -> Result<Option<SketchElement>>;

	async fn external_workflow(&self, id: &GlobalIdentifier)
		-> Result<Option<ExternalWorkflowData>>;

	async fn stoichiometry(
		&self,
		id: &GlobalIdentifier,
		revision: Option<u64>,
	) -> Result<Option<StoichiometryTable>>;
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
	async fn is_permitted(&self, record: &Entity, permission: Permission, user: &User) -> bool;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
	/// Every audited revision of a document, oldest first, paired with its revision number
	async fn document_history(&self, document_id: u64) -> Result<Vec<(u64, Document)>>;

	/// A document as it was at a user visible version
	async fn document_version(&self, document_id: u64, version: u64)
		-> Result<Option<(u64, Document)>>;

	/// Every audited revision of a media file, oldest first
	async fn media_history(&self, media_id: u64) -> Result<Vec<(u64, MediaFile)>>;

	async fn media_version(&self, media_id: u64, version: u64) -> Result<Option<(u64, MediaFile)>>;

	/// The media file as it was at a point in time, used to pair an old document
	/// revision with the image it displayed back then
	async fn media_at(&self, media_id: u64, at: DateTime<Utc>) -> Result<Option<MediaFile>>;
}

/// Turns raw field markup into typed element references
pub trait FieldParser: Send + Sync {
	fn parse(&self, html: &str) -> FieldContents;
}

#[async_trait]
pub trait FileStore: Send + Sync {
	/// Local path of a stored binary
	async fn find_file(&self, file: &FileProperty) -> Result<PathBuf>;
}

#[async_trait]
pub trait NfsClient: Send + Sync {
	async fn has_session(&self, username: &str, filesystem_id: u64) -> bool;

	async fn query_file(&self, target: &NfsTarget) -> Result<NfsFileInfo>;

	/// Immediate children of a remote folder
	async fn query_folder(&self, target: &NfsTarget) -> Result<Vec<NfsFileInfo>>;

	/// Downloads a remote file to `destination`, returning the number of bytes written
	async fn download(&self, target: &NfsTarget, destination: &Path) -> Result<u64>;
}

#[async_trait]
pub trait ChecksumStore: Send + Sync {
	async fn save(&self, checksum: &ArchiveChecksum) -> Result<()>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
	async fn notify(&self, user: &User, subject: &str, message: &str) -> Result<()>;
}

/// Every collaborator an export run needs, cheap to clone
#[derive(Clone)]
pub struct Collaborators {
	pub records: Arc<dyn RecordStore>,
	pub elements: Arc<dyn ElementStore>,
	pub permissions: Arc<dyn PermissionChecker>,
	pub audit: Arc<dyn AuditStore>,
	pub parser: Arc<dyn FieldParser>,
	pub files: Arc<dyn FileStore>,
	pub nfs: Arc<dyn NfsClient>,
	pub checksums: Arc<dyn ChecksumStore>,
	pub notifier: Arc<dyn Notifier>,
	pub disk: Arc<dyn DiskSpaceChecker>,
}
