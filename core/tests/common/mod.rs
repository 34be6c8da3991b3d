#![allow(dead_code)]

use labex_core::{
	model::{Document, FolderType, MediaFile},
	testing::{self, MemoryCollaborators},
	ArchiveExporter, ArchiveSettings,
};

use std::{
	fs::File,
	io::Read,
	path::{Path, PathBuf},
};

use tempfile::TempDir;

pub const ALICE: &str = "alice";
pub const ALICE_ROOT: u64 = 1;
pub const EXPERIMENTS: u64 = 2;

/// A user with a home folder holding an `Experiments` folder, and a scratch directory
/// for stored binaries and archives
pub struct Lab {
	pub kit: MemoryCollaborators,
	pub dir: TempDir,
}

impl Lab {
	pub async fn new() -> Self {
		let kit = MemoryCollaborators::new();
		kit.add_user(testing::user(ALICE)).await;
		kit.add_folder(testing::folder(
			ALICE_ROOT,
			"Home",
			ALICE,
			None,
			FolderType::Root,
		))
		.await;
		kit.add_folder(testing::folder(
			EXPERIMENTS,
			"Experiments",
			ALICE,
			Some(ALICE_ROOT),
			FolderType::Folder,
		))
		.await;

		Self {
			kit,
			dir: TempDir::new().unwrap(),
		}
	}

	pub fn archive_root(&self) -> PathBuf {
		self.dir.path().join("archives")
	}

	pub fn exporter(&self) -> ArchiveExporter {
		ArchiveExporter::new(
			self.kit.collaborators(),
			ArchiveSettings::default_with_root(self.archive_root()),
		)
	}

	pub async fn document(&self, document: Document) {
		self.kit.add_document(document).await;
	}

	/// Stores a gallery file with `bytes` as its binary
	pub async fn media(&self, media: MediaFile, bytes: &[u8]) {
		let source = self
			.dir
			.path()
			.join("filestore")
			.join(media.id.to_string())
			.join(&media.file.file_name);
		std::fs::create_dir_all(source.parent().unwrap()).unwrap();
		std::fs::write(&source, bytes).unwrap();
		self.kit.add_media(media, source).await;
	}
}

/// Entry names of a zip, in archive order
pub fn zip_entries(path: &Path) -> Vec<String> {
	let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
	archive.file_names().map(str::to_string).collect()
}

pub fn zip_entry(path: &Path, suffix: &str) -> String {
	let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
	let name = archive
		.file_names()
		.find(|name| name.ends_with(suffix))
		.unwrap_or_else(|| panic!("no entry ending with {suffix}"))
		.to_string();

	let mut contents = String::new();
	archive
		.by_name(&name)
		.unwrap()
		.read_to_string(&mut contents)
		.unwrap();
	contents
}
