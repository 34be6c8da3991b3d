//! In-memory collaborators, for running exports without a backing system.
//!
//! Everything lives behind one lock and is cloned out on every read. Stored binaries
//! are referenced by path, remote filesystem files are held as bytes and written out
//! on download.

use crate::{
	collaborators::{
		AuditStore, ChecksumStore, Collaborators, ElementStore, FileStore, NfsClient, Notifier,
		PermissionChecker, RecordStore,
	},
	disk::{DiskSpaceChecker, FixedDiskSpace},
	error::{Error, Result},
	fields::{
		element::{
			ChemElement, CommentElement, ExternalWorkflowData, MathElement, NfsTarget,
			SketchElement, StoichiometryTable,
		},
		markup::MarkupFieldParser,
	},
	finalizer::ArchiveChecksum,
	identifier::{GlobalIdPrefix, GlobalIdentifier},
	model::{
		Document, Entity, Field, FieldType, FileProperty, Folder, FolderType, Group, MediaFile,
		MediaType, Permission, User,
	},
	nfs::NfsFileInfo,
};

use labex_utils::error::FileIOError;

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	path::{Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::{fs, sync::RwLock};

/// A notification handed to the [`Notifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
	pub username: String,
	pub subject: String,
	pub message: String,
}

#[derive(Default)]
struct State {
	users: BTreeMap<String, User>,
	groups: BTreeMap<u64, Group>,
	folders: BTreeMap<u64, Folder>,
	documents: BTreeMap<u64, Document>,
	media: BTreeMap<u64, MediaFile>,
	files: HashMap<FileProperty, PathBuf>,
	denied: HashSet<(String, GlobalIdentifier)>,

	document_history: HashMap<u64, Vec<(u64, Document)>>,
	media_history: HashMap<u64, Vec<(u64, MediaFile)>>,

	chems: HashMap<GlobalIdentifier, ChemElement>,
	maths: HashMap<GlobalIdentifier, MathElement>,
	comments: HashMap<GlobalIdentifier, CommentElement>,
	sketches: HashMap<GlobalIdentifier, SketchElement>,
	workflows: HashMap<GlobalIdentifier, ExternalWorkflowData>,
	stoichiometries: HashMap<GlobalIdentifier, StoichiometryTable>,

	nfs_sessions: HashSet<(String, u64)>,
	nfs_files: BTreeMap<NfsTarget, Vec<u8>>,
	nfs_downloads: usize,

	checksums: Vec<ArchiveChecksum>,
	notifications: Vec<SentNotification>,
}

/// Implements every collaborator trait over shared in-memory state, cheap to clone
#[derive(Clone)]
pub struct MemoryCollaborators {
	state: Arc<RwLock<State>>,
	disk: Arc<dyn DiskSpaceChecker>,
}

impl Default for MemoryCollaborators {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryCollaborators {
	/// Empty stores on a volume that never fills up
	#[must_use]
	pub fn new() -> Self {
		Self {
			state: Arc::default(),
			disk: Arc::new(FixedDiskSpace::new(u64::MAX)),
		}
	}

	#[must_use]
	pub fn with_disk(mut self, disk: Arc<dyn DiskSpaceChecker>) -> Self {
		self.disk = disk;
		self
	}

	/// The collaborator set an [`crate::ArchiveExporter`] runs against
	#[must_use]
	pub fn collaborators(&self) -> Collaborators {
		let shared = Arc::new(self.clone());
		Collaborators {
			records: shared.clone(),
			elements: shared.clone(),
			permissions: shared.clone(),
			audit: shared.clone(),
			parser: Arc::new(MarkupFieldParser),
			files: shared.clone(),
			nfs: shared.clone(),
			checksums: shared.clone(),
			notifier: shared,
			disk: Arc::clone(&self.disk),
		}
	}

	pub async fn add_user(&self, user: User) {
		self.state
			.write()
			.await
			.users
			.insert(user.username.clone(), user);
	}

	pub async fn add_group(&self, group: Group) {
		self.state.write().await.groups.insert(group.id, group);
	}

	pub async fn add_folder(&self, folder: Folder) {
		self.state.write().await.folders.insert(folder.id, folder);
	}

	pub async fn add_document(&self, document: Document) {
		self.state
			.write()
			.await
			.documents
			.insert(document.id, document);
	}

	/// Stores a media file whose binary lives at `source`
	pub async fn add_media(&self, media: MediaFile, source: impl Into<PathBuf>) {
		let mut state = self.state.write().await;
		state.files.insert(media.file.clone(), source.into());
		state.media.insert(media.id, media);
	}

	/// Makes `id` unreadable for `username`, everything else is readable
	pub async fn deny(&self, username: &str, id: GlobalIdentifier) {
		self.state
			.write()
			.await
			.denied
			.insert((username.to_string(), id.unversioned()));
	}

	/// Appends an audited revision, revisions must be added oldest first
	pub async fn add_document_revision(&self, revision: u64, document: Document) {
		self.state
			.write()
			.await
			.document_history
			.entry(document.id)
			.or_default()
			.push((revision, document));
	}

	pub async fn add_media_revision(
		&self,
		revision: u64,
		media: MediaFile,
		source: impl Into<PathBuf>,
	) {
		let mut state = self.state.write().await;
		state.files.insert(media.file.clone(), source.into());
		state
			.media_history
			.entry(media.id)
			.or_default()
			.push((revision, media));
	}

	/// Element payloads are stored under their unversioned id unless `revision` is set
	pub async fn add_chem(&self, chem: ChemElement, revision: Option<u64>) {
		let key = element_key(chem.id, revision);
		self.state.write().await.chems.insert(key, chem);
	}

	pub async fn add_math(&self, math: MathElement, revision: Option<u64>) {
		let key = element_key(math.id, revision);
		self.state.write().await.maths.insert(key, math);
	}

	pub async fn add_comment(&self, comment: CommentElement, revision: Option<u64>) {
		let key = element_key(comment.id, revision);
		self.state.write().await.comments.insert(key, comment);
	}

	pub async fn add_sketch(&self, sketch: SketchElement, revision: Option<u64>) {
		let key = element_key(sketch.id, revision);
		self.state.write().await.sketches.insert(key, sketch);
	}

	pub async fn add_external_workflow(&self, workflow: ExternalWorkflowData) {
		let key = workflow.id.unversioned();
		self.state.write().await.workflows.insert(key, workflow);
	}

	pub async fn add_stoichiometry(&self, table: StoichiometryTable, revision: Option<u64>) {
		let key = element_key(table.id, revision);
		self.state.write().await.stoichiometries.insert(key, table);
	}

	pub async fn nfs_session(&self, username: &str, filesystem_id: u64) {
		self.state
			.write()
			.await
			.nfs_sessions
			.insert((username.to_string(), filesystem_id));
	}

	/// A file on a remote filesystem, its parent folders exist implicitly
	pub async fn nfs_file(&self, filesystem_id: u64, path: &str, bytes: &[u8]) {
		self.state.write().await.nfs_files.insert(
			NfsTarget {
				filesystem_id,
				path: path.to_string(),
			},
			bytes.to_vec(),
		);
	}

	pub async fn nfs_download_count(&self) -> usize {
		self.state.read().await.nfs_downloads
	}

	pub async fn saved_checksums(&self) -> Vec<ArchiveChecksum> {
		self.state.read().await.checksums.clone()
	}

	pub async fn notifications(&self) -> Vec<SentNotification> {
		self.state.read().await.notifications.clone()
	}
}

fn element_key(id: GlobalIdentifier, revision: Option<u64>) -> GlobalIdentifier {
	match revision {
		Some(revision) => id.unversioned().with_version(revision),
		None => id.unversioned(),
	}
}

/// A revision specific payload if there is one, the current one otherwise
fn element_at<T: Clone>(
	map: &HashMap<GlobalIdentifier, T>,
	id: &GlobalIdentifier,
	revision: Option<u64>,
) -> Option<T> {
	revision
		.and_then(|revision| map.get(&id.unversioned().with_version(revision)))
		.or_else(|| map.get(&id.unversioned()))
		.cloned()
}

fn file_name_of(path: &str) -> String {
	path.rsplit('/').next().unwrap_or(path).to_string()
}

#[async_trait]
impl RecordStore for MemoryCollaborators {
	async fn get(&self, id: &GlobalIdentifier) -> Result<Option<Entity>> {
		let state = self.state.read().await;
		Ok(match id.prefix {
			GlobalIdPrefix::FL | GlobalIdPrefix::NB => {
				state.folders.get(&id.db_id).cloned().map(Entity::Folder)
			}
			GlobalIdPrefix::SD => state.documents.get(&id.db_id).cloned().map(Entity::Document),
			GlobalIdPrefix::GL => state.media.get(&id.db_id).cloned().map(Entity::Media),
			_ => None,
		})
	}

	async fn children(&self, folder_id: u64) -> Result<Vec<Entity>> {
		let state = self.state.read().await;
		let parent = Some(folder_id);

		Ok(state
			.folders
			.values()
			.filter(|folder| folder.parent_id == parent)
			.cloned()
			.map(Entity::Folder)
			.chain(
				state
					.documents
					.values()
					.filter(|document| document.parent_id == parent)
					.cloned()
					.map(Entity::Document),
			)
			.chain(
				state
					.media
					.values()
					.filter(|media| media.parent_id == parent)
					.cloned()
					.map(Entity::Media),
			)
			.collect())
	}

	async fn user(&self, username: &str) -> Result<Option<User>> {
		Ok(self.state.read().await.users.get(username).cloned())
	}

	async fn group(&self, group_id: u64) -> Result<Option<Group>> {
		Ok(self.state.read().await.groups.get(&group_id).cloned())
	}

	async fn root_folder_id(&self, username: &str) -> Result<Option<u64>> {
		Ok(self
			.state
			.read()
			.await
			.folders
			.values()
			.find(|folder| folder.folder_type == FolderType::Root && folder.owner == username)
			.map(|folder| folder.id))
	}
}

#[async_trait]
impl ElementStore for MemoryCollaborators {
	async fn chem(
		&self,
		id: &GlobalIdentifier,
		revision: Option<u64>,
	) -> Result<Option<ChemElement>> {
		Ok(element_at(&self.state.read().await.chems, id, revision))
	}

	async fn math(
		&self,
		id: &GlobalIdentifier,
		revision: Option<u64>,
	) -> Result<Option<MathElement>> {
		Ok(element_at(&self.state.read().await.maths, id, revision))
	}

	async fn comment(
		&self,
		id: &GlobalIdentifier,
		revision: Option<u64>,
	) -> Result<Option<CommentElement>> {
		Ok(element_at(&self.state.read().await.comments, id, revision))
	}

	async fn sketch(
		&self,
		id: &GlobalIdentifier,
		revision: Option<u64>,
	) -> Result<Option<SketchElement>> {
		Ok(element_at(&self.state.read().await.sketches, id, revision))
	}

	async fn external_workflow(
		&self,
		id: &GlobalIdentifier,
	) -> Result<Option<ExternalWorkflowData>> {
		Ok(element_at(&self.state.read().await.workflows, id, None))
	}

	async fn stoichiometry(
		&self,
		id: &GlobalIdentifier,
		revision: Option<u64>,
	) -> Result<Option<StoichiometryTable>> {
		Ok(element_at(
			&self.state.read().await.stoichiometries,
			id,
			revision,
		))
	}
}

#[async_trait]
impl PermissionChecker for MemoryCollaborators {
	async fn is_permitted(&self, record: &Entity, _permission: Permission, user: &User) -> bool {
		!self
			.state
			.read()
			.await
			.denied
			.contains(&(user.username.clone(), record.global_id().unversioned()))
	}
}

#[async_trait]
impl AuditStore for MemoryCollaborators {
	async fn document_history(&self, document_id: u64) -> Result<Vec<(u64, Document)>> {
		Ok(self
			.state
			.read()
			.await
			.document_history
			.get(&document_id)
			.cloned()
			.unwrap_or_default())
	}

	async fn document_version(
		&self,
		document_id: u64,
		version: u64,
	) -> Result<Option<(u64, Document)>> {
		Ok(self
			.state
			.read()
			.await
			.document_history
			.get(&document_id)
			.and_then(|history| {
				history
					.iter()
					.rev()
					.find(|(_, document)| document.version == version)
					.cloned()
			}))
	}

	async fn media_history(&self, media_id: u64) -> Result<Vec<(u64, MediaFile)>> {
		Ok(self
			.state
			.read()
			.await
			.media_history
			.get(&media_id)
			.cloned()
			.unwrap_or_default())
	}

	async fn media_version(&self, media_id: u64, version: u64) -> Result<Option<(u64, MediaFile)>> {
		Ok(self
			.state
			.read()
			.await
			.media_history
			.get(&media_id)
			.and_then(|history| {
				history
					.iter()
					.rev()
					.find(|(_, media)| media.version == version)
					.cloned()
			}))
	}

	async fn media_at(&self, media_id: u64, at: DateTime<Utc>) -> Result<Option<MediaFile>> {
		let state = self.state.read().await;
		Ok(state
			.media_history
			.get(&media_id)
			.and_then(|history| {
				history
					.iter()
					.rev()
					.find(|(_, media)| media.modified <= at)
					.map(|(_, media)| media.clone())
			})
			.or_else(|| state.media.get(&media_id).cloned()))
	}
}

#[async_trait]
impl FileStore for MemoryCollaborators {
	async fn find_file(&self, file: &FileProperty) -> Result<PathBuf> {
		self.state
			.read()
			.await
			.files
			.get(file)
			.cloned()
			.ok_or_else(|| {
				Error::Collaborator(format!(
					"file not in store: <path='{}/{}'>",
					file.relative_path, file.file_name
				))
			})
	}
}

#[async_trait]
impl NfsClient for MemoryCollaborators {
	async fn has_session(&self, username: &str, filesystem_id: u64) -> bool {
		self.state
			.read()
			.await
			.nfs_sessions
			.contains(&(username.to_string(), filesystem_id))
	}

	async fn query_file(&self, target: &NfsTarget) -> Result<NfsFileInfo> {
		self.state
			.read()
			.await
			.nfs_files
			.get(target)
			.map(|bytes| NfsFileInfo {
				name: file_name_of(&target.path),
				path: target.path.clone(),
				size: bytes.len() as u64,
				is_folder: false,
			})
			.ok_or_else(|| {
				Error::Collaborator(format!("remote file not found: <target='{target}'>"))
			})
	}

	async fn query_folder(&self, target: &NfsTarget) -> Result<Vec<NfsFileInfo>> {
		let prefix = format!("{}/", target.path.trim_end_matches('/'));
		let state = self.state.read().await;

		let mut entries = BTreeMap::new();
		for (file, bytes) in &state.nfs_files {
			if file.filesystem_id != target.filesystem_id {
				continue;
			}
			let Some(rest) = file.path.strip_prefix(&prefix) else {
				continue;
			};

			let info = match rest.split_once('/') {
				Some((folder, _)) => NfsFileInfo {
					name: folder.to_string(),
					path: format!("{prefix}{folder}"),
					size: 0,
					is_folder: true,
				},
				None => NfsFileInfo {
					name: rest.to_string(),
					path: file.path.clone(),
					size: bytes.len() as u64,
					is_folder: false,
				},
			};
			entries.entry(info.path.clone()).or_insert(info);
		}

		if entries.is_empty() {
			return Err(Error::Collaborator(format!(
				"remote folder not found: <target='{target}'>"
			)));
		}

		Ok(entries.into_values().collect())
	}

	async fn download(&self, target: &NfsTarget, destination: &Path) -> Result<u64> {
		let bytes = self
			.state
			.read()
			.await
			.nfs_files
			.get(target)
			.cloned()
			.ok_or_else(|| {
				Error::Collaborator(format!("remote file not found: <target='{target}'>"))
			})?;

		fs::write(destination, &bytes)
			.await
			.map_err(|e| Error::from_io(FileIOError::from((destination, e))))?;

		self.state.write().await.nfs_downloads += 1;
		Ok(bytes.len() as u64)
	}
}

#[async_trait]
impl ChecksumStore for MemoryCollaborators {
	async fn save(&self, checksum: &ArchiveChecksum) -> Result<()> {
		self.state.write().await.checksums.push(checksum.clone());
		Ok(())
	}
}

#[async_trait]
impl Notifier for MemoryCollaborators {
	async fn notify(&self, user: &User, subject: &str, message: &str) -> Result<()> {
		self.state.write().await.notifications.push(SentNotification {
			username: user.username.clone(),
			subject: subject.to_string(),
			message: message.to_string(),
		});
		Ok(())
	}
}

// Record builders with sensible defaults, all timestamps derive from one fixed instant

/// 2024-01-01T00:00:00Z
#[must_use]
pub fn base_time() -> DateTime<Utc> {
	DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default()
}

#[must_use]
pub fn user(username: &str) -> User {
	User {
		id: username.bytes().map(u64::from).sum(),
		username: username.to_string(),
		full_name: format!("{username} Tester"),
		email: format!("{username}@example.org"),
	}
}

#[must_use]
pub fn folder(
	id: u64,
	name: &str,
	owner: &str,
	parent_id: Option<u64>,
	folder_type: FolderType,
) -> Folder {
	Folder {
		id,
		name: name.to_string(),
		owner: owner.to_string(),
		parent_id,
		folder_type,
		deleted: false,
	}
}

#[must_use]
pub fn text_field(id: u64, content: &str) -> Field {
	Field {
		id,
		name: format!("Field {id}"),
		field_type: FieldType::Text,
		content: content.to_string(),
		modified: base_time(),
	}
}

#[must_use]
pub fn document(
	id: u64,
	name: &str,
	owner: &str,
	parent_id: Option<u64>,
	fields: Vec<Field>,
) -> Document {
	Document {
		id,
		name: name.to_string(),
		owner: owner.to_string(),
		parent_id,
		form_name: "Basic Document".to_string(),
		tags: Vec::new(),
		created: base_time(),
		modified: base_time() + Duration::hours(1),
		version: 1,
		deleted: false,
		fields,
	}
}

#[must_use]
pub fn media(id: u64, name: &str, owner: &str, parent_id: Option<u64>, size: u64) -> MediaFile {
	let extension = labex_utils::split_extension(name)
		.1
		.unwrap_or_default()
		.to_ascii_lowercase();
	let media_type = match extension.as_str() {
		"png" | "jpg" | "jpeg" | "gif" | "tif" | "tiff" => MediaType::Image,
		_ => MediaType::Document,
	};

	MediaFile {
		id,
		name: name.to_string(),
		owner: owner.to_string(),
		parent_id,
		media_type,
		extension,
		description: None,
		created: base_time(),
		modified: base_time(),
		version: 1,
		deleted: false,
		file: FileProperty {
			relative_path: format!("{owner}/{id}"),
			file_name: name.to_string(),
			size,
		},
		original_image_id: None,
	}
}
