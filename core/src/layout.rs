//! Stable folder and file names of every record in an archive.
//!
//! A name is handed out the first time anything asks for a `(record, revision)`, which
//! may be a field linking to a record that is only exported later on.

use crate::{
	config::ArchiveFormat,
	identifier::GlobalIdentifier,
	model::{Entity, ExportableRecord, MediaFile},
};

use labex_utils::{sanitize_file_name, split_extension};

use std::collections::{HashMap, HashSet};

use rand::{distributions::Alphanumeric, Rng};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordLocation {
	/// Folder name below the assembly root
	pub folder: String,
	/// Main file of the record, the rendered document or the media binary
	pub file: String,
}

impl RecordLocation {
	/// Link to the main file from inside another record folder
	#[must_use]
	pub fn link_from_sibling(&self) -> String {
		format!("../{}/{}", self.folder, self.file)
	}
}

#[derive(Debug)]
pub struct ExportLayout {
	format: ArchiveFormat,
	suffix_len: usize,
	locations: HashMap<(GlobalIdentifier, Option<u64>), RecordLocation>,
	used_folders: HashSet<String>,
}

impl ExportLayout {
	#[must_use]
	pub fn new(format: ArchiveFormat, suffix_len: usize) -> Self {
		Self {
			format,
			suffix_len: suffix_len.max(1),
			locations: HashMap::new(),
			used_folders: HashSet::new(),
		}
	}

	#[must_use]
	pub fn get(&self, id: &GlobalIdentifier, revision: Option<u64>) -> Option<&RecordLocation> {
		self.locations.get(&(id.unversioned(), revision))
	}

	pub fn locate_record(&mut self, record: &ExportableRecord, revision: Option<u64>) -> RecordLocation {
		match record {
			ExportableRecord::Document(document) => {
				self.locate(document.global_id(), revision, &document.name, None)
			}
			ExportableRecord::Media(media) => self.locate_media(media, revision),
		}
	}

	/// Location of a link target, `None` for folders which have no page of their own
	pub fn locate_entity(&mut self, entity: &Entity) -> Option<RecordLocation> {
		match entity {
			Entity::Document(document) => {
				Some(self.locate(document.global_id(), None, &document.name, None))
			}
			Entity::Media(media) => Some(self.locate_media(media, None)),
			Entity::Folder(_) => None,
		}
	}

	pub fn locate_media(&mut self, media: &MediaFile, revision: Option<u64>) -> RecordLocation {
		self.locate(
			media.global_id(),
			revision,
			&media.name,
			Some(media.archive_file_name()),
		)
	}

	fn locate(
		&mut self,
		id: GlobalIdentifier,
		revision: Option<u64>,
		name: &str,
		file: Option<String>,
	) -> RecordLocation {
		let key = (id.unversioned(), revision);
		if let Some(location) = self.locations.get(&key) {
			return location.clone();
		}

		let stem = folder_stem(name, revision);
		let folder = loop {
			let candidate = format!("{stem}-{}", random_suffix(self.suffix_len));
			if self.used_folders.insert(candidate.clone()) {
				break candidate;
			}
		};

		let file = file.unwrap_or_else(|| {
			let (stem, _) = split_extension(name);
			let stem = if stem.is_empty() { name } else { stem };
			format!("{}.{}", sanitize_file_name(stem).replace('.', "_"), self.format)
		});

		let location = RecordLocation { folder, file };
		self.locations.insert(key, location.clone());
		location
	}
}

fn folder_stem(name: &str, revision: Option<u64>) -> String {
	let stem = sanitize_file_name(name).replace('.', "_");
	match revision {
		Some(revision) => format!("{stem}-rev{revision}"),
		None => stem,
	}
}

fn random_suffix(len: usize) -> String {
	rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(len)
		.map(|byte| char::from(byte).to_ascii_lowercase())
		.collect()
}
