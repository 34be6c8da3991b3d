//! The working set of an export: which records, folders and embedded items it holds.

mod planner;

pub use planner::ExportClosurePlanner;

use crate::{
	identifier::GlobalIdentifier,
	model::{Folder, FolderType},
};

use std::collections::{HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDescriptor {
	pub id: u64,
	pub parent_id: Option<u64>,
	pub name: String,
	pub folder_type: FolderType,
	pub owner: String,
}

impl From<&Folder> for FolderDescriptor {
	fn from(folder: &Folder) -> Self {
		Self {
			id: folder.id,
			parent_id: folder.parent_id,
			name: folder.name.clone(),
			folder_type: folder.folder_type,
			owner: folder.owner.clone(),
		}
	}
}

/// Records, folders and field attachments an export has to contain.
///
/// A record is held at most once, whatever version it was selected at. Media files are
/// ordered ahead of documents so they exist in the archive before anything links to them.
#[derive(Debug, Clone, Default)]
pub struct ExportClosure {
	order: VecDeque<GlobalIdentifier>,
	entities: HashSet<GlobalIdentifier>,
	folders: IndexMap<u64, FolderDescriptor>,
	field_attachments: IndexSet<GlobalIdentifier>,
}

impl ExportClosure {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a record to the export order, `false` if it was already present
	pub fn add_record(&mut self, id: GlobalIdentifier) -> bool {
		if !self.entities.insert(id.unversioned()) {
			return false;
		}

		if id.prefix.is_media() {
			self.order.push_front(id);
		} else {
			self.order.push_back(id);
		}
		true
	}

	#[must_use]
	pub fn contains_record(&self, id: &GlobalIdentifier) -> bool {
		self.entities.contains(&id.unversioned())
	}

	/// Records in export order, carrying the version they were selected at
	pub fn records(&self) -> impl Iterator<Item = &GlobalIdentifier> {
		self.order.iter()
	}

	#[must_use]
	pub fn record_count(&self) -> usize {
		self.order.len()
	}

	pub fn add_folder(&mut self, folder: FolderDescriptor) {
		self.folders.entry(folder.id).or_insert(folder);
	}

	#[must_use]
	pub fn folder(&self, id: u64) -> Option<&FolderDescriptor> {
		self.folders.get(&id)
	}

	/// Folders in the order they were discovered, parents before children
	pub fn folders(&self) -> impl Iterator<Item = &FolderDescriptor> {
		self.folders.values()
	}

	pub fn add_field_attachment(&mut self, id: GlobalIdentifier) {
		self.field_attachments.insert(id.unversioned());
	}

	/// Whether an embedded item was vetted while planning
	#[must_use]
	pub fn is_field_attachment(&self, id: &GlobalIdentifier) -> bool {
		self.field_attachments.contains(&id.unversioned())
	}

	pub fn field_attachments(&self) -> impl Iterator<Item = &GlobalIdentifier> {
		self.field_attachments.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identifier::GlobalIdPrefix;

	#[test]
	fn media_goes_first_and_versions_collapse() {
		let mut closure = ExportClosure::new();
		let doc = GlobalIdentifier::new(GlobalIdPrefix::SD, 1);
		let image = GlobalIdentifier::new(GlobalIdPrefix::GL, 2);

		assert!(closure.add_record(doc));
		assert!(closure.add_record(image));
		assert!(!closure.add_record(doc.with_version(3)));

		assert_eq!(closure.records().copied().collect::<Vec<_>>(), [image, doc]);
		assert!(closure.contains_record(&doc.with_version(7)));
	}
}
