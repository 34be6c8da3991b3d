//! Run configuration and process-wide archive settings

use crate::{
	error::{Error, Result},
	identifier::GlobalIdentifier,
};

use labex_utils::error::FileIOError;

use std::{
	collections::BTreeSet,
	fs,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{info, warn};

pub const SETTINGS_FILE_NAME: &str = "archive_settings.json";

/// Which records an export starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportSelection {
	/// Everything under a user's home folder
	User { username: String },
	/// Everything under every readable member's home folder
	Group { group_id: u64 },
	/// An explicit list of folders, notebooks, documents and media files
	Selection { ids: Vec<GlobalIdentifier> },
}

impl ExportSelection {
	#[must_use]
	pub const fn scope(&self) -> ExportScope {
		match self {
			Self::User { .. } => ExportScope::User,
			Self::Group { .. } => ExportScope::Group,
			Self::Selection { .. } => ExportScope::Selection,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ExportScope {
	User,
	Group,
	Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ArchiveFormat {
	#[strum(serialize = "xml")]
	Xml,
	#[strum(serialize = "html")]
	Html,
}

/// Output packaging, an ELN archive is an XML export wrapped as an RO-Crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFlavor {
	Plain,
	Eln,
}

/// Options for a single export run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
	pub scope: ExportScope,
	pub format: ArchiveFormat,
	pub flavor: ArchiveFlavor,
	/// Export every audited revision instead of the latest one
	pub all_versions: bool,
	/// How many hops of record links are followed from the selection, 0 disables
	/// link following entirely
	pub max_link_level: u32,
	pub include_nfs_links: bool,
	/// Remote files above this size are not downloaded, in bytes
	pub max_nfs_file_size: u64,
	/// Lowercase extensions, without the dot, never downloaded from remote filesystems
	pub excluded_nfs_file_extensions: BTreeSet<String>,
	pub description: Option<String>,
	/// Username of the person running the export
	pub exporter: String,
}

impl ExportConfig {
	pub fn new(scope: ExportScope, format: ArchiveFormat, exporter: impl Into<String>) -> Self {
		Self {
			scope,
			format,
			flavor: ArchiveFlavor::Plain,
			all_versions: false,
			max_link_level: 1,
			include_nfs_links: false,
			max_nfs_file_size: 50 * 1024 * 1024,
			excluded_nfs_file_extensions: BTreeSet::new(),
			description: None,
			exporter: exporter.into(),
		}
	}

	/// An ELN (RO-Crate) archive, always XML based
	pub fn eln(scope: ExportScope, exporter: impl Into<String>) -> Self {
		Self {
			flavor: ArchiveFlavor::Eln,
			..Self::new(scope, ArchiveFormat::Xml, exporter)
		}
	}

	#[must_use]
	pub const fn with_max_link_level(mut self, max_link_level: u32) -> Self {
		self.max_link_level = max_link_level;
		self
	}

	#[must_use]
	pub const fn with_all_versions(mut self, all_versions: bool) -> Self {
		self.all_versions = all_versions;
		self
	}

	#[must_use]
	pub fn with_nfs_links(mut self, max_file_size: u64, excluded: &[&str]) -> Self {
		self.include_nfs_links = true;
		self.max_nfs_file_size = max_file_size;
		self.excluded_nfs_file_extensions = excluded
			.iter()
			.map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
			.collect();
		self
	}

	#[must_use]
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	#[must_use]
	pub const fn is_eln(&self) -> bool {
		matches!(self.flavor, ArchiveFlavor::Eln)
	}

	/// Extension of the final artifact
	#[must_use]
	pub const fn archive_extension(&self) -> &'static str {
		match self.flavor {
			ArchiveFlavor::Eln => "eln",
			ArchiveFlavor::Plain => "zip",
		}
	}

	/// An ELN archive must be XML, the combination is rejected up front
	pub fn validate(&self) -> Result<()> {
		if self.is_eln() && self.format != ArchiveFormat::Xml {
			return Err(Error::Export(
				"ELN archives can only be produced from XML exports".into(),
			));
		}
		if self.exporter.is_empty() {
			return Err(Error::Export("export has no exporting user".into()));
		}
		Ok(())
	}
}

/// Process-wide settings, persisted as JSON in the data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSettings {
	/// Settings schema version
	pub version: u32,

	/// Where assembly folders and finished archives are created
	pub archive_root: PathBuf,

	/// Space that must stay free on the archive volume after every copy, in bytes
	pub min_free_space_bytes: u64,

	/// Logging level used by [`crate::init_tracing`]
	pub log_level: String,

	/// Deflate level for archive entries (0-9)
	pub zip_compression_level: i64,

	/// Length of the random suffix appended to record folder names
	pub folder_suffix_len: usize,
}

impl ArchiveSettings {
	#[must_use]
	pub fn default_with_root(archive_root: impl Into<PathBuf>) -> Self {
		Self {
			version: Self::target_version(),
			archive_root: archive_root.into(),
			min_free_space_bytes: 100 * 1024 * 1024,
			log_level: "debug".to_string(),
			zip_compression_level: 6,
			folder_suffix_len: 6,
		}
	}

	const fn target_version() -> u32 {
		1
	}

	/// Load settings from a data directory, creating defaults if none exist yet
	pub fn load_from(data_dir: impl AsRef<Path>) -> Result<Self> {
		let data_dir = data_dir.as_ref();
		let settings_path = data_dir.join(SETTINGS_FILE_NAME);

		if settings_path.exists() {
			info!(path = %settings_path.display(), "Loading archive settings;");
			let json = fs::read_to_string(&settings_path)
				.map_err(|e| FileIOError::from((&settings_path, e)))?;
			let mut settings = serde_json::from_str::<Self>(&json)?;

			if settings.version < Self::target_version() {
				info!(
					from = settings.version,
					to = Self::target_version(),
					"Migrating archive settings;"
				);
				settings.version = Self::target_version();
				settings.save(data_dir)?;
			}

			Ok(settings)
		} else {
			warn!(
				path = %settings_path.display(),
				"No archive settings found, creating defaults;"
			);
			let settings = Self::default_with_root(data_dir.join("archives"));
			settings.save(data_dir)?;
			Ok(settings)
		}
	}

	pub fn save(&self, data_dir: impl AsRef<Path>) -> Result<()> {
		let data_dir = data_dir.as_ref();
		fs::create_dir_all(data_dir).map_err(|e| FileIOError::from((data_dir, e)))?;

		let settings_path = data_dir.join(SETTINGS_FILE_NAME);
		fs::write(&settings_path, serde_json::to_string_pretty(self)?)
			.map_err(|e| FileIOError::from((&settings_path, e)))?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use tempfile::TempDir;

	#[test]
	fn creates_and_reloads_default_settings() {
		let dir = TempDir::new().unwrap();

		let created = ArchiveSettings::load_from(dir.path()).unwrap();
		assert!(dir.path().join(SETTINGS_FILE_NAME).exists());
		assert_eq!(created.archive_root, dir.path().join("archives"));

		let mut changed = created.clone();
		changed.folder_suffix_len = 10;
		changed.save(dir.path()).unwrap();

		let reloaded = ArchiveSettings::load_from(dir.path()).unwrap();
		assert_eq!(reloaded.folder_suffix_len, 10);
	}

	#[test]
	fn eln_requires_xml() {
		let mut config = ExportConfig::eln(ExportScope::Selection, "alice");
		assert!(config.validate().is_ok());
		assert_eq!(config.archive_extension(), "eln");

		config.format = ArchiveFormat::Html;
		assert!(config.validate().is_err());
	}

	#[test]
	fn normalizes_excluded_extensions() {
		let config = ExportConfig::new(ExportScope::User, ArchiveFormat::Html, "bob")
			.with_nfs_links(1024, &[".EXE", "iso"]);
		assert!(config.include_nfs_links);
		assert!(config.excluded_nfs_file_extensions.contains("exe"));
		assert!(config.excluded_nfs_file_extensions.contains("iso"));
	}
}
