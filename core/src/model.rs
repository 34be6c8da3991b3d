//! Snapshots of the records the persistence layer hands to the exporter.
//!
//! These are plain data: the exporter never mutates them and never writes them back.

use crate::identifier::{GlobalIdPrefix, GlobalIdentifier};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: u64,
	pub username: String,
	pub full_name: String,
	pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
	pub id: u64,
	pub name: String,
	pub members: Vec<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FolderType {
	/// A user's home folder
	Root,
	Folder,
	Notebook,
	/// System folder holding records other people shared with the owner
	Shared,
	Templates,
	Examples,
	/// Top level gallery folders (images, documents, ...)
	Gallery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
	pub id: u64,
	pub name: String,
	pub owner: String,
	pub parent_id: Option<u64>,
	pub folder_type: FolderType,
	pub deleted: bool,
}

impl Folder {
	#[must_use]
	pub const fn global_id(&self) -> GlobalIdentifier {
		GlobalIdentifier::new(
			match self.folder_type {
				FolderType::Notebook => GlobalIdPrefix::NB,
				_ => GlobalIdPrefix::FL,
			},
			self.id,
		)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
	Text,
	String,
	Number,
	Date,
	Time,
	Choice,
	Radio,
	Reference,
	Attachment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
	pub id: u64,
	pub name: String,
	pub field_type: FieldType,
	/// Raw field markup, for text fields this is rich-text HTML
	pub content: String,
	pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
	pub id: u64,
	pub name: String,
	pub owner: String,
	pub parent_id: Option<u64>,
	pub form_name: String,
	pub tags: Vec<String>,
	pub created: DateTime<Utc>,
	pub modified: DateTime<Utc>,
	/// User visible version counter, increases on every save
	pub version: u64,
	pub deleted: bool,
	pub fields: Vec<Field>,
}

impl Document {
	#[must_use]
	pub const fn global_id(&self) -> GlobalIdentifier {
		GlobalIdentifier::new(GlobalIdPrefix::SD, self.id)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
	Image,
	Document,
	Video,
	Audio,
	Chemistry,
	Miscellaneous,
}

/// Where the binary of a media file lives in the file store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileProperty {
	pub relative_path: String,
	pub file_name: String,
	pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
	pub id: u64,
	pub name: String,
	pub owner: String,
	pub parent_id: Option<u64>,
	pub media_type: MediaType,
	pub extension: String,
	pub description: Option<String>,
	pub created: DateTime<Utc>,
	pub modified: DateTime<Utc>,
	pub version: u64,
	pub deleted: bool,
	pub file: FileProperty,
	/// Edited images keep a link to the image they were derived from
	pub original_image_id: Option<u64>,
}

impl MediaFile {
	#[must_use]
	pub const fn global_id(&self) -> GlobalIdentifier {
		GlobalIdentifier::new(GlobalIdPrefix::GL, self.id)
	}

	/// The name the binary gets inside the archive, keeping the stored extension
	#[must_use]
	pub fn archive_file_name(&self) -> String {
		let (_, extension) = labex_utils::split_extension(&self.name);
		if extension.is_some() || self.extension.is_empty() {
			labex_utils::sanitize_file_name(&self.name)
		} else {
			labex_utils::sanitize_file_name(&format!("{}.{}", self.name, self.extension))
		}
	}
}

/// Anything the record store can hand back for an id
#[derive(Debug, Clone)]
pub enum Entity {
	Folder(Folder),
	Document(Document),
	Media(MediaFile),
}

impl Entity {
	#[must_use]
	pub fn global_id(&self) -> GlobalIdentifier {
		match self {
			Self::Folder(folder) => folder.global_id(),
			Self::Document(document) => document.global_id(),
			Self::Media(media) => media.global_id(),
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		match self {
			Self::Folder(Folder { name, .. })
			| Self::Document(Document { name, .. })
			| Self::Media(MediaFile { name, .. }) => name,
		}
	}

	#[must_use]
	pub fn owner(&self) -> &str {
		match self {
			Self::Folder(Folder { owner, .. })
			| Self::Document(Document { owner, .. })
			| Self::Media(MediaFile { owner, .. }) => owner,
		}
	}

	#[must_use]
	pub const fn is_deleted(&self) -> bool {
		match self {
			Self::Folder(Folder { deleted, .. })
			| Self::Document(Document { deleted, .. })
			| Self::Media(MediaFile { deleted, .. }) => *deleted,
		}
	}
}

/// A record that can be turned into an export folder, as opposed to a folder itself
#[derive(Debug, Clone)]
pub enum ExportableRecord {
	Document(Document),
	Media(MediaFile),
}

impl ExportableRecord {
	#[must_use]
	pub const fn global_id(&self) -> GlobalIdentifier {
		match self {
			Self::Document(document) => document.global_id(),
			Self::Media(media) => media.global_id(),
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		match self {
			Self::Document(Document { name, .. }) | Self::Media(MediaFile { name, .. }) => name,
		}
	}

	#[must_use]
	pub const fn version(&self) -> u64 {
		match self {
			Self::Document(Document { version, .. }) | Self::Media(MediaFile { version, .. }) => {
				*version
			}
		}
	}

	#[must_use]
	pub const fn parent_id(&self) -> Option<u64> {
		match self {
			Self::Document(Document { parent_id, .. })
			| Self::Media(MediaFile { parent_id, .. }) => *parent_id,
		}
	}
}

impl TryFrom<Entity> for ExportableRecord {
	type Error = Entity;

	fn try_from(entity: Entity) -> Result<Self, Self::Error> {
		match entity {
			Entity::Document(document) => Ok(Self::Document(document)),
			Entity::Media(media) => Ok(Self::Media(media)),
			folder @ Entity::Folder(_) => Err(folder),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Permission {
	Read,
	Write,
}
