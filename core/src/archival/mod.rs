//! Serialization neutral export model.
//!
//! A record is converted into these types once, then handed to whichever writer is
//! active. Field HTML has already been rewritten to point inside the archive by then.

use crate::{
	fields::element::{CommentItem, NfsTarget},
	identifier::GlobalIdentifier,
	nfs::NfsSkipReason,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "document", rename_all = "camelCase")]
pub struct ArchivalDocument {
	pub id: String,
	pub name: String,
	pub owner: String,
	pub form_name: String,
	pub tags: Vec<String>,
	pub version: u64,
	/// Audit revision the document was exported at, absent for the current state
	#[serde(skip_serializing_if = "Option::is_none")]
	pub revision: Option<u64>,
	pub created: String,
	pub last_modified: String,
	#[serde(rename = "field", default)]
	pub fields: Vec<ArchivalField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalField {
	pub id: u64,
	pub name: String,
	#[serde(rename = "type")]
	pub field_type: String,
	pub last_modified: String,
	/// Field content with embedded links pointing inside the archive
	pub content: String,
	#[serde(rename = "image", default)]
	pub images: Vec<ArchivalImage>,
	#[serde(rename = "chemElement", default)]
	pub chems: Vec<ArchivalChem>,
	#[serde(rename = "mathElement", default)]
	pub maths: Vec<ArchivalMath>,
	#[serde(rename = "comment", default)]
	pub comments: Vec<ArchivalComment>,
	#[serde(rename = "sketch", default)]
	pub sketches: Vec<ArchivalSketch>,
	#[serde(rename = "attachment", default)]
	pub attachments: Vec<ArchivalAttachment>,
	#[serde(rename = "link", default)]
	pub links: Vec<ArchivalLink>,
	#[serde(rename = "nfsElement", default)]
	pub nfs_elements: Vec<ArchivalNfsFile>,
	#[serde(rename = "externalWorkflow", default)]
	pub external_workflows: Vec<ArchivalExternalWorkflow>,
	#[serde(rename = "stoichiometry", default)]
	pub stoichiometries: Vec<ArchivalStoichiometry>,
}

impl ArchivalField {
	/// Number of sidecar records, i.e. elements that made it into the export
	#[must_use]
	pub fn element_count(&self) -> usize {
		self.images.len()
			+ self.chems.len()
			+ self.maths.len()
			+ self.comments.len()
			+ self.sketches.len()
			+ self.attachments.len()
			+ self.links.len()
			+ self.nfs_elements.len()
			+ self.external_workflows.len()
			+ self.stoichiometries.len()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalImage {
	pub id: String,
	pub name: String,
	/// Archive relative link as written into the field
	pub link: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub png_link: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub width: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalChem {
	pub id: String,
	pub format: String,
	pub chem_string: String,
	pub image_link: String,
	pub data_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalMath {
	pub id: String,
	pub latex: String,
	pub svg_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalCommentItem {
	pub author: String,
	pub text: String,
	pub created: String,
}

impl From<&CommentItem> for ArchivalCommentItem {
	fn from(item: &CommentItem) -> Self {
		Self {
			author: item.author.clone(),
			text: item.text.clone(),
			created: item.created.to_rfc3339(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalComment {
	pub id: String,
	#[serde(rename = "item", default)]
	pub items: Vec<ArchivalCommentItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalSketch {
	pub id: String,
	pub image_link: String,
	pub annotations: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalAttachment {
	pub id: String,
	pub name: String,
	pub link: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub png_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalLink {
	/// Global id of the linked record
	pub target: String,
	pub name: String,
	pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalNfsFile {
	pub filesystem_id: u64,
	pub path: String,
	pub name: String,
	pub is_folder: bool,
	pub added_to_archive: bool,
	/// Archive relative location of the downloaded file
	#[serde(skip_serializing_if = "Option::is_none")]
	pub archive_path: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub skip_reason: Option<String>,
	/// Included/skipped overview of a linked folder
	#[serde(skip_serializing_if = "Option::is_none")]
	pub summary: Option<String>,
}

impl ArchivalNfsFile {
	#[must_use]
	pub fn skipped(target: &NfsTarget, is_folder: bool, reason: Option<&NfsSkipReason>) -> Self {
		Self {
			filesystem_id: target.filesystem_id,
			path: target.path.clone(),
			name: target
				.path
				.trim_end_matches('/')
				.rsplit('/')
				.next()
				.unwrap_or_default()
				.to_string(),
			is_folder,
			added_to_archive: false,
			archive_path: None,
			skip_reason: reason.map(ToString::to_string),
			summary: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalExternalWorkflow {
	pub id: String,
	pub workflow_id: String,
	pub name: String,
	pub status: String,
	pub server_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalStoichiometry {
	pub id: String,
	/// Table rows as JSON text
	pub rows: String,
}

/// Metadata of an exported gallery file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "galleryFile", rename_all = "camelCase")]
pub struct ArchivalGalleryMetadata {
	pub id: String,
	pub name: String,
	pub owner: String,
	pub media_type: String,
	pub extension: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub version: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub revision: Option<u64>,
	pub created: String,
	pub last_modified: String,
	/// Name of the binary next to the metadata file
	pub file_name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub png_file_name: Option<String>,
	pub size: u64,
	/// Global id of the image this one was edited from
	#[serde(skip_serializing_if = "Option::is_none")]
	pub original_image: Option<String>,
}

/// The two kinds of archived payload, never both at once
#[derive(Debug, Clone, PartialEq)]
pub enum ArchivedPayload {
	Document(ArchivalDocument),
	Media(ArchivalGalleryMetadata),
}

/// One exported `(record, revision)` and where it ended up
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedRecord {
	pub id: GlobalIdentifier,
	pub revision: Option<u64>,
	pub payload: ArchivedPayload,
	/// Record folder name, relative to the assembly root
	pub folder: String,
	/// Main file inside [`Self::folder`], the rendered document or the media binary
	pub file: String,
	/// File the writer produced for the record, what indexes link to
	pub page: String,
	/// Closure folder the record is indexed under
	pub parent_folder_id: Option<u64>,
	pub modified: DateTime<Utc>,
}

impl ExportedRecord {
	#[must_use]
	pub fn name(&self) -> &str {
		match &self.payload {
			ArchivedPayload::Document(document) => &document.name,
			ArchivedPayload::Media(media) => &media.name,
		}
	}

	/// Archive relative path of the written page
	#[must_use]
	pub fn page_path(&self) -> String {
		format!("{}/{}", self.folder, self.page)
	}

	#[must_use]
	pub const fn document(&self) -> Option<&ArchivalDocument> {
		match &self.payload {
			ArchivedPayload::Document(document) => Some(document),
			ArchivedPayload::Media(_) => None,
		}
	}

	#[must_use]
	pub const fn media(&self) -> Option<&ArchivalGalleryMetadata> {
		match &self.payload {
			ArchivedPayload::Media(media) => Some(media),
			ArchivedPayload::Document(_) => None,
		}
	}
}
