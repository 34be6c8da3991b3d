use crate::{
	archival::{ArchivedPayload, ExportedRecord},
	config::ExportScope,
	error::{Error, Result},
};

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, trace};

use super::{write_manifest, ArchiveIndex, ArchiveWriter, OutputFiles};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const DOCUMENT_SCHEMA: &str = include_str!("../../resources/documentSchema.xsd");
const FOLDER_SCHEMA: &str = include_str!("../../resources/folderSchema.xsd");

pub const FOLDER_TREE_FILE: &str = "folderTree.xml";
pub const USERS_FILE: &str = "users.xml";
pub const NFS_FILE: &str = "nfs.xml";

/// One XML file per record plus the folder tree, users, remote files and schemas
pub struct XmlWriter {
	files: OutputFiles,
}

impl XmlWriter {
	#[must_use]
	pub const fn new(files: OutputFiles) -> Self {
		Self { files }
	}
}

#[derive(Serialize)]
#[serde(rename = "folderTree")]
struct FolderTree<'a> {
	#[serde(rename = "folder")]
	folders: Vec<FolderEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FolderEntry<'a> {
	id: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	parent_id: Option<u64>,
	name: &'a str,
	#[serde(rename = "type")]
	folder_type: String,
	owner: &'a str,
}

#[derive(Serialize)]
#[serde(rename = "users")]
struct Users<'a> {
	#[serde(rename = "user")]
	users: Vec<UserEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserEntry<'a> {
	username: &'a str,
	full_name: &'a str,
	email: &'a str,
}

#[derive(Serialize)]
#[serde(rename = "nfsElements")]
struct NfsElements<'a> {
	#[serde(rename = "nfsElement")]
	elements: Vec<NfsEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NfsEntry<'a> {
	filesystem_id: u64,
	path: &'a str,
	name: &'a str,
	is_folder: bool,
	added_to_archive: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	archive_path: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	skip_reason: Option<String>,
}

fn to_xml<T: Serialize>(value: &T) -> Result<String> {
	quick_xml::se::to_string(value)
		.map(|xml| format!("{XML_DECLARATION}{xml}\n"))
		.map_err(|e| Error::Xml(e.to_string()))
}

#[async_trait]
impl ArchiveWriter for XmlWriter {
	async fn write_record(&self, assembly_dir: &Path, record: &ExportedRecord) -> Result<()> {
		let xml = match &record.payload {
			ArchivedPayload::Document(document) => to_xml(document)?,
			ArchivedPayload::Media(media) => to_xml(media)?,
		};

		let path = assembly_dir.join(&record.folder).join(&record.page);
		self.files.write(&path, xml.as_bytes()).await?;

		trace!(id = %record.id, path = %path.display(), "Wrote record xml;");
		Ok(())
	}

	async fn write_indexes(&self, index: &ArchiveIndex<'_>) -> Result<()> {
		let metadata_dir = index.metadata_dir();

		let folder_tree = FolderTree {
			folders: index
				.closure
				.folders()
				.map(|folder| FolderEntry {
					id: folder.id,
					parent_id: folder.parent_id,
					name: &folder.name,
					folder_type: folder.folder_type.to_string(),
					owner: &folder.owner,
				})
				.collect(),
		};
		self.files
			.write(
				&metadata_dir.join(FOLDER_TREE_FILE),
				to_xml(&folder_tree)?.as_bytes(),
			)
			.await?;

		if matches!(index.config.scope, ExportScope::User | ExportScope::Group) {
			let users = Users {
				users: index
					.users
					.iter()
					.map(|user| UserEntry {
						username: &user.username,
						full_name: &user.full_name,
						email: &user.email,
					})
					.collect(),
			};
			self.files
				.write(&metadata_dir.join(USERS_FILE), to_xml(&users)?.as_bytes())
				.await?;
		}

		if !index.nfs.is_empty() {
			let elements = NfsElements {
				elements: index
					.nfs
					.outcomes()
					.map(|outcome| NfsEntry {
						filesystem_id: outcome.target.filesystem_id,
						path: &outcome.target.path,
						name: &outcome.name,
						is_folder: outcome.is_folder,
						added_to_archive: outcome.is_included(),
						archive_path: outcome.archive_path.as_deref(),
						skip_reason: outcome.skip_reason.as_ref().map(ToString::to_string),
					})
					.collect(),
			};
			self.files
				.write(&metadata_dir.join(NFS_FILE), to_xml(&elements)?.as_bytes())
				.await?;
		}

		self.files
			.write(
				&metadata_dir.join("documentSchema.xsd"),
				DOCUMENT_SCHEMA.as_bytes(),
			)
			.await?;
		self.files
			.write(&metadata_dir.join("folderSchema.xsd"), FOLDER_SCHEMA.as_bytes())
			.await?;

		write_manifest(&self.files, index).await?;

		debug!(dir = %metadata_dir.display(), "Wrote xml archive metadata;");
		Ok(())
	}
}
