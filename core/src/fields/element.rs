use crate::identifier::GlobalIdentifier;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Every kind of object a rich-text field can embed.
///
/// The order of the variants is the order elements are exported within a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ElementKind {
	Image,
	Chemistry,
	Math,
	Comment,
	Sketch,
	Attachment,
	LinkedRecord,
	NfsLink,
	ExternalWorkflow,
	Stoichiometry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
	/// Gallery id of the image (`GL`)
	pub media_id: GlobalIdentifier,
	pub width: Option<u32>,
	pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedChem {
	pub id: GlobalIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedMath {
	pub id: GlobalIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedComment {
	pub id: GlobalIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedSketch {
	pub id: GlobalIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedAttachment {
	/// Gallery id of the attached file (`GL`)
	pub media_id: GlobalIdentifier,
	pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedRecord {
	pub target: GlobalIdentifier,
	pub name: String,
}

/// Reference to a file or folder living on an external network filesystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NfsTarget {
	pub filesystem_id: u64,
	pub path: String,
}

impl fmt::Display for NfsTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.filesystem_id, self.path)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsLink {
	pub target: NfsTarget,
	pub is_folder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalWorkflowRef {
	pub id: GlobalIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoichiometryRef {
	pub id: GlobalIdentifier,
}

/// An element together with the exact markup it was parsed from, the markup is what
/// gets rewritten once the element has a home inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linked<T> {
	pub element: T,
	pub original_link: String,
}

impl<T> Linked<T> {
	pub fn new(element: T, original_link: impl Into<String>) -> Self {
		Self {
			element,
			original_link: original_link.into(),
		}
	}
}

/// Typed view over one field's markup, as produced by a [`crate::FieldParser`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldContents {
	pub images: Vec<Linked<EmbeddedImage>>,
	pub chems: Vec<Linked<EmbeddedChem>>,
	pub maths: Vec<Linked<EmbeddedMath>>,
	pub comments: Vec<Linked<EmbeddedComment>>,
	pub sketches: Vec<Linked<EmbeddedSketch>>,
	pub attachments: Vec<Linked<EmbeddedAttachment>>,
	pub linked_records: Vec<Linked<LinkedRecord>>,
	pub nfs_links: Vec<Linked<NfsLink>>,
	pub external_workflows: Vec<Linked<ExternalWorkflowRef>>,
	pub stoichiometries: Vec<Linked<StoichiometryRef>>,
}

impl FieldContents {
	/// Identifiers of everything embedded in the field that is stored with the
	/// record, i.e. all elements except links to other records and to remote
	/// filesystems.
	pub fn attachment_ids(&self) -> impl Iterator<Item = GlobalIdentifier> + '_ {
		self.images
			.iter()
			.map(|l| l.element.media_id)
			.chain(self.chems.iter().map(|l| l.element.id))
			.chain(self.maths.iter().map(|l| l.element.id))
			.chain(self.comments.iter().map(|l| l.element.id))
			.chain(self.sketches.iter().map(|l| l.element.id))
			.chain(self.attachments.iter().map(|l| l.element.media_id))
			.chain(self.external_workflows.iter().map(|l| l.element.id))
			.chain(self.stoichiometries.iter().map(|l| l.element.id))
	}

	pub fn linked_record_ids(&self) -> impl Iterator<Item = GlobalIdentifier> + '_ {
		self.linked_records.iter().map(|l| l.element.target)
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.images.len()
			+ self.chems.len()
			+ self.maths.len()
			+ self.comments.len()
			+ self.sketches.len()
			+ self.attachments.len()
			+ self.linked_records.len()
			+ self.nfs_links.len()
			+ self.external_workflows.len()
			+ self.stoichiometries.len()
	}
}

// Element payloads, fetched from the element store while exporting

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChemElement {
	pub id: GlobalIdentifier,
	/// Structure in its native notation (molfile, SMILES, ...)
	pub chem_string: String,
	/// File extension of the native notation
	pub format: String,
	/// Rendered preview
	pub image_png: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathElement {
	pub id: GlobalIdentifier,
	pub latex: String,
	pub svg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentItem {
	pub author: String,
	pub text: String,
	pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentElement {
	pub id: GlobalIdentifier,
	pub items: Vec<CommentItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SketchElement {
	pub id: GlobalIdentifier,
	pub image_png: Vec<u8>,
	/// Serialized drawing layers, kept so the sketch can be edited after import
	pub annotations: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalWorkflowData {
	pub id: GlobalIdentifier,
	pub workflow_id: String,
	pub name: String,
	pub status: String,
	pub server_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoichiometryTable {
	pub id: GlobalIdentifier,
	/// Table rows as JSON, exported verbatim
	pub rows: serde_json::Value,
}
