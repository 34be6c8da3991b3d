//! Output encodings of the archival model.

mod html;
mod rocrate;
mod xml;

pub use html::HtmlWriter;
pub use rocrate::{RoCrateBuilder, RO_CRATE_METADATA};
pub use xml::XmlWriter;

use crate::{
	archival::ExportedRecord,
	closure::ExportClosure,
	config::ExportConfig,
	disk::DiskSpaceChecker,
	error::{Error, Result},
	model::User,
	nfs::NfsExportContext,
};

use labex_utils::error::FileIOError;

use std::{
	fmt::Write as _,
	path::{Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

/// Folder holding schemas and archive level metadata in ELN archives
pub const SCHEMAS_FOLDER: &str = "schemas";
pub const MANIFEST_FILE: &str = "manifest.txt";

/// Everything an index or manifest may describe, available once all records are written
pub struct ArchiveIndex<'a> {
	pub assembly_dir: &'a Path,
	pub config: &'a ExportConfig,
	pub closure: &'a ExportClosure,
	pub records: &'a [ExportedRecord],
	/// Owners of the exported records
	pub users: &'a [User],
	pub nfs: &'a NfsExportContext,
	pub export_date: DateTime<Utc>,
}

impl ArchiveIndex<'_> {
	/// Where archive level files go, `schemas/` for ELN archives
	#[must_use]
	pub fn metadata_dir(&self) -> PathBuf {
		if self.config.is_eln() {
			self.assembly_dir.join(SCHEMAS_FOLDER)
		} else {
			self.assembly_dir.to_path_buf()
		}
	}
}

#[async_trait]
pub trait ArchiveWriter: Send + Sync {
	/// Writes the page or metadata file of one record into its folder
	async fn write_record(&self, assembly_dir: &Path, record: &ExportedRecord) -> Result<()>;

	/// Writes navigation and description files once every record is in place
	async fn write_indexes(&self, index: &ArchiveIndex<'_>) -> Result<()>;
}

/// Disk checked write of a generated file, shared by all writers
#[derive(Clone)]
pub struct OutputFiles {
	disk: Arc<dyn DiskSpaceChecker>,
	volume: PathBuf,
}

impl OutputFiles {
	pub fn new(disk: Arc<dyn DiskSpaceChecker>, volume: impl Into<PathBuf>) -> Self {
		Self {
			disk,
			volume: volume.into(),
		}
	}

	pub async fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
		self.disk.assert_space(
			u64::try_from(contents.len()).unwrap_or(u64::MAX),
			&self.volume,
		)?;

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| Error::from_io(FileIOError::from((parent, e))))?;
		}

		fs::write(path, contents)
			.await
			.map_err(|e| Error::from_io(FileIOError::from((path, e))))
	}
}

/// `manifest.txt`, plain `key: value` lines describing the run
pub async fn write_manifest(files: &OutputFiles, index: &ArchiveIndex<'_>) -> Result<()> {
	let config = index.config;
	let mut manifest = String::new();

	let _ = writeln!(manifest, "Archive type: {}", config.format);
	let _ = writeln!(manifest, "ELN archive: {}", config.is_eln());
	let _ = writeln!(manifest, "Exported by: {}", config.exporter);
	let _ = writeln!(manifest, "Export date: {}", index.export_date.to_rfc3339());
	let _ = writeln!(manifest, "Scope: {}", config.scope);
	let _ = writeln!(manifest, "Number of records: {}", index.records.len());
	let _ = writeln!(manifest, "Number of folders: {}", index.closure.folders().count());
	let _ = writeln!(manifest, "Link depth: {}", config.max_link_level);
	let _ = writeln!(manifest, "All versions: {}", config.all_versions);
	let _ = writeln!(manifest, "Remote files included: {}", config.include_nfs_links);
	if let Some(description) = &config.description {
		let _ = writeln!(manifest, "Description: {description}");
	}
	let _ = writeln!(manifest, "Application version: {}", env!("CARGO_PKG_VERSION"));

	files
		.write(&index.metadata_dir().join(MANIFEST_FILE), manifest.as_bytes())
		.await
}
