//! Pulls files referenced on external network filesystems into the archive.
//!
//! Lookups are memoized per `(filesystem, path)` for the lifetime of one run, so a file
//! linked from many fields costs a single download. Nothing here is audited, remote
//! links always resolve against the current state of the filesystem.

use crate::{
	collaborators::Collaborators,
	config::ExportConfig,
	error::{Error, Result},
	fields::element::NfsTarget,
	stager::unique_destination,
};

use labex_utils::{error::FileIOError, sanitize_file_name, split_extension};

use std::{
	collections::HashMap,
	fmt::Write as _,
	path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument, trace, warn};

/// Folder, relative to the assembly root, downloads are stored in
pub const NFS_FOLDER: &str = "nfs";

/// What a remote filesystem reports about a file or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsFileInfo {
	pub name: String,
	pub path: String,
	pub size: u64,
	pub is_folder: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NfsSkipReason {
	#[error("no active session for filesystem {0}")]
	NoSession(u64),
	#[error("file is larger than the export limit: <size={size}, limit={limit}>")]
	TooLarge { size: u64, limit: u64 },
	#[error("file extension is excluded from exports: <extension='{0}'>")]
	ExcludedExtension(String),
	#[error("sub-folders of linked folders are not exported")]
	SubFolder,
	#[error("remote lookup failed: {0}")]
	QueryFailed(String),
	#[error("download failed: {0}")]
	DownloadFailed(String),
}

/// A remote file or folder as it ended up in the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsResourceDetails {
	pub target: NfsTarget,
	pub name: String,
	pub size: u64,
	pub is_folder: bool,
	/// Location relative to the assembly root, set for downloaded files
	pub archive_path: Option<String>,
	/// Downloaded children, folders only
	pub children: Vec<NfsResourceDetails>,
	/// Included/skipped overview, folders only
	pub summary: Option<String>,
}

/// Outcome of every remote item touched during a run, surfaced in `nfs.xml` and in
/// the completion notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsItemOutcome {
	pub target: NfsTarget,
	pub name: String,
	pub is_folder: bool,
	pub archive_path: Option<String>,
	pub skip_reason: Option<NfsSkipReason>,
}

impl NfsItemOutcome {
	#[must_use]
	pub const fn is_included(&self) -> bool {
		self.skip_reason.is_none()
	}
}

/// Run scoped cache and bookkeeping of remote resources
#[derive(Debug)]
pub struct NfsExportContext {
	assembly_dir: PathBuf,
	cache: HashMap<NfsTarget, Option<NfsResourceDetails>>,
	outcomes: IndexMap<NfsTarget, NfsItemOutcome>,
}

impl NfsExportContext {
	pub fn new(assembly_dir: impl Into<PathBuf>) -> Self {
		Self {
			assembly_dir: assembly_dir.into(),
			cache: HashMap::new(),
			outcomes: IndexMap::new(),
		}
	}

	/// Resolves a remote link, `Ok(None)` when it was skipped for a recorded reason.
	///
	/// Only running out of disk space is an error.
	#[instrument(skip_all, fields(%target, is_folder), err)]
	pub async fn resolve(
		&mut self,
		services: &Collaborators,
		config: &ExportConfig,
		target: &NfsTarget,
		is_folder: bool,
	) -> Result<Option<NfsResourceDetails>> {
		if let Some(cached) = self.cache.get(target) {
			trace!("Remote resource already resolved;");
			return Ok(cached.clone());
		}

		let resolved = if services
			.nfs
			.has_session(&config.exporter, target.filesystem_id)
			.await
		{
			if is_folder {
				self.resolve_folder(services, config, target).await?
			} else {
				self.resolve_file(services, config, target).await?
			}
		} else {
			self.skip(
				target,
				display_name(&target.path),
				is_folder,
				NfsSkipReason::NoSession(target.filesystem_id),
			);
			None
		};

		self.cache.insert(target.clone(), resolved.clone());
		Ok(resolved)
	}

	async fn resolve_file(
		&mut self,
		services: &Collaborators,
		config: &ExportConfig,
		target: &NfsTarget,
	) -> Result<Option<NfsResourceDetails>> {
		match services.nfs.query_file(target).await {
			Ok(info) => self.download(services, config, target, info).await,
			Err(e) => {
				self.skip(
					target,
					display_name(&target.path),
					false,
					NfsSkipReason::QueryFailed(e.to_string()),
				);
				Ok(None)
			}
		}
	}

	async fn resolve_folder(
		&mut self,
		services: &Collaborators,
		config: &ExportConfig,
		target: &NfsTarget,
	) -> Result<Option<NfsResourceDetails>> {
		let name = display_name(&target.path);
		let entries = match services.nfs.query_folder(target).await {
			Ok(entries) => entries,
			Err(e) => {
				self.skip(target, name, true, NfsSkipReason::QueryFailed(e.to_string()));
				return Ok(None);
			}
		};

		let mut children = Vec::new();
		let mut skipped = Vec::new();

		for entry in entries {
			let child_target = NfsTarget {
				filesystem_id: target.filesystem_id,
				path: entry.path.clone(),
			};

			if entry.is_folder {
				skipped.push((entry.name.clone(), NfsSkipReason::SubFolder));
				self.skip(&child_target, entry.name, true, NfsSkipReason::SubFolder);
				continue;
			}

			let child_name = entry.name.clone();
			let details = match self.cache.get(&child_target).cloned() {
				Some(cached) => cached,
				None => {
					let details = self.download(services, config, &child_target, entry).await?;
					self.cache.insert(child_target.clone(), details.clone());
					details
				}
			};

			match details {
				Some(details) => children.push(details),
				None => {
					if let Some(reason) = self.skip_reason(&child_target) {
						skipped.push((child_name, reason.clone()));
					}
				}
			}
		}

		let summary = folder_summary(&children, &skipped);
		debug!(
			included = children.len(),
			skipped = skipped.len(),
			"Resolved remote folder;"
		);

		self.outcomes.insert(
			target.clone(),
			NfsItemOutcome {
				target: target.clone(),
				name: name.clone(),
				is_folder: true,
				archive_path: None,
				skip_reason: None,
			},
		);

		Ok(Some(NfsResourceDetails {
			target: target.clone(),
			name,
			size: children.iter().map(|child| child.size).sum(),
			is_folder: true,
			archive_path: None,
			children,
			summary: Some(summary),
		}))
	}

	async fn download(
		&mut self,
		services: &Collaborators,
		config: &ExportConfig,
		target: &NfsTarget,
		info: NfsFileInfo,
	) -> Result<Option<NfsResourceDetails>> {
		if let Some(reason) = filter(config, &info) {
			self.skip(target, info.name, false, reason);
			return Ok(None);
		}

		let nfs_dir = self.assembly_dir.join(NFS_FOLDER);
		services.disk.assert_space(info.size, &self.assembly_dir)?;
		fs::create_dir_all(&nfs_dir)
			.await
			.map_err(|e| Error::from_io(FileIOError::from((&nfs_dir, e))))?;

		let file_name = format!(
			"{}-{}",
			target.filesystem_id,
			sanitize_file_name(&info.name)
		);
		let destination = unique_destination(&nfs_dir, &file_name).await;

		let size = match services.nfs.download(target, &destination).await {
			Ok(size) => size,
			Err(e) if e.is_fatal() => return Err(e),
			Err(e) => {
				warn!(%target, ?e, "Failed to download remote file;");
				self.skip(
					target,
					info.name,
					false,
					NfsSkipReason::DownloadFailed(e.to_string()),
				);
				return Ok(None);
			}
		};

		let archive_path = relative_archive_path(&self.assembly_dir, &destination);
		trace!(%target, size, archive_path, "Downloaded remote file;");

		self.outcomes.insert(
			target.clone(),
			NfsItemOutcome {
				target: target.clone(),
				name: info.name.clone(),
				is_folder: false,
				archive_path: Some(archive_path.clone()),
				skip_reason: None,
			},
		);

		Ok(Some(NfsResourceDetails {
			target: target.clone(),
			name: info.name,
			size,
			is_folder: false,
			archive_path: Some(archive_path),
			children: Vec::new(),
			summary: None,
		}))
	}

	fn skip(&mut self, target: &NfsTarget, name: String, is_folder: bool, reason: NfsSkipReason) {
		debug!(%target, %reason, "Remote resource not added to archive;");
		self.outcomes.insert(
			target.clone(),
			NfsItemOutcome {
				target: target.clone(),
				name,
				is_folder,
				archive_path: None,
				skip_reason: Some(reason),
			},
		);
	}

	/// Why a target was left out, if it was
	#[must_use]
	pub fn skip_reason(&self, target: &NfsTarget) -> Option<&NfsSkipReason> {
		self.outcomes
			.get(target)
			.and_then(|outcome| outcome.skip_reason.as_ref())
	}

	pub fn outcomes(&self) -> impl Iterator<Item = &NfsItemOutcome> {
		self.outcomes.values()
	}

	/// Remote files that made it into the archive
	pub fn included_files(&self) -> impl Iterator<Item = &NfsItemOutcome> {
		self.outcomes
			.values()
			.filter(|outcome| !outcome.is_folder && outcome.is_included())
	}

	#[must_use]
	pub fn skipped_count(&self) -> usize {
		self.outcomes
			.values()
			.filter(|outcome| !outcome.is_included())
			.count()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.outcomes.is_empty()
	}
}

fn filter(config: &ExportConfig, info: &NfsFileInfo) -> Option<NfsSkipReason> {
	if info.size > config.max_nfs_file_size {
		return Some(NfsSkipReason::TooLarge {
			size: info.size,
			limit: config.max_nfs_file_size,
		});
	}

	match split_extension(&info.name) {
		(_, Some(ext)) if config
			.excluded_nfs_file_extensions
			.contains(&ext.to_ascii_lowercase()) =>
		{
			Some(NfsSkipReason::ExcludedExtension(ext.to_ascii_lowercase()))
		}
		_ => None,
	}
}

fn folder_summary(children: &[NfsResourceDetails], skipped: &[(String, NfsSkipReason)]) -> String {
	let mut summary = format!(
		"{} file(s) included, {} item(s) skipped",
		children.len(),
		skipped.len()
	);
	for (name, reason) in skipped {
		let _ = write!(summary, "\n{name}: {reason}");
	}
	summary
}

fn display_name(path: &str) -> String {
	path.trim_end_matches('/')
		.rsplit('/')
		.next()
		.filter(|name| !name.is_empty())
		.unwrap_or(path)
		.to_string()
}

fn relative_archive_path(root: &Path, path: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.components()
		.map(|component| component.as_os_str().to_string_lossy())
		.collect::<Vec<_>>()
		.join("/")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::{ArchiveFormat, ExportScope},
		testing::MemoryCollaborators,
	};

	use tempfile::TempDir;
	use tracing_test::traced_test;

	fn config() -> ExportConfig {
		ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, "alice")
			.with_nfs_links(10, &["exe"])
	}

	fn target(path: &str) -> NfsTarget {
		NfsTarget {
			filesystem_id: 3,
			path: path.to_string(),
		}
	}

	#[tokio::test]
	async fn downloads_once_and_filters() {
		let dir = TempDir::new().unwrap();
		let kit = MemoryCollaborators::new();
		kit.nfs_session("alice", 3).await;
		kit.nfs_file(3, "/data/run.csv", b"a,b,c").await;
		kit.nfs_file(3, "/data/huge.bin", &[0; 32]).await;
		kit.nfs_file(3, "/data/tool.exe", b"MZ").await;
		let services = kit.collaborators();

		let mut nfs = NfsExportContext::new(dir.path());
		let config = config();

		let run = nfs
			.resolve(&services, &config, &target("/data/run.csv"), false)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(run.archive_path.as_deref(), Some("nfs/3-run.csv"));
		assert!(dir.path().join("nfs/3-run.csv").exists());

		// Second lookup is served from the cache
		nfs.resolve(&services, &config, &target("/data/run.csv"), false)
			.await
			.unwrap();
		assert_eq!(kit.nfs_download_count().await, 1);

		assert!(nfs
			.resolve(&services, &config, &target("/data/huge.bin"), false)
			.await
			.unwrap()
			.is_none());
		assert_eq!(
			nfs.skip_reason(&target("/data/huge.bin")),
			Some(&NfsSkipReason::TooLarge { size: 32, limit: 10 })
		);

		assert!(nfs
			.resolve(&services, &config, &target("/data/tool.exe"), false)
			.await
			.unwrap()
			.is_none());
		assert_eq!(nfs.included_files().count(), 1);
		assert_eq!(nfs.skipped_count(), 2);
	}

	#[tokio::test]
	async fn folder_lists_immediate_children_only() {
		let dir = TempDir::new().unwrap();
		let kit = MemoryCollaborators::new();
		kit.nfs_session("alice", 3).await;
		kit.nfs_file(3, "/data/a.txt", b"a").await;
		kit.nfs_file(3, "/data/b.txt", b"b").await;
		kit.nfs_file(3, "/data/nested/c.txt", b"c").await;
		let services = kit.collaborators();

		let mut nfs = NfsExportContext::new(dir.path());
		let folder = nfs
			.resolve(&services, &config(), &target("/data"), true)
			.await
			.unwrap()
			.unwrap();

		assert_eq!(folder.children.len(), 2);
		let summary = folder.summary.unwrap();
		assert!(summary.starts_with("2 file(s) included, 1 item(s) skipped"));
		assert!(summary.contains("nested"));
		assert_eq!(
			nfs.skip_reason(&target("/data/nested")),
			Some(&NfsSkipReason::SubFolder)
		);
	}

	#[tokio::test]
	async fn folder_summary_counts_children_skipped_earlier() {
		let dir = TempDir::new().unwrap();
		let kit = MemoryCollaborators::new();
		kit.nfs_session("alice", 3).await;
		kit.nfs_file(3, "/data/run.csv", b"a,b,c").await;
		kit.nfs_file(3, "/data/huge.bin", &[0; 32]).await;
		let services = kit.collaborators();

		let mut nfs = NfsExportContext::new(dir.path());
		let config = config();

		// Linked on its own first, over the size limit
		assert!(nfs
			.resolve(&services, &config, &target("/data/huge.bin"), false)
			.await
			.unwrap()
			.is_none());

		let folder = nfs
			.resolve(&services, &config, &target("/data"), true)
			.await
			.unwrap()
			.unwrap();

		assert_eq!(folder.children.len(), 1);
		let summary = folder.summary.unwrap();
		assert!(summary.starts_with("1 file(s) included, 1 item(s) skipped"));
		assert!(summary.contains("huge.bin"));
		assert_eq!(kit.nfs_download_count().await, 1);
	}

	#[tokio::test]
	#[traced_test]
	async fn missing_session_is_recorded() {
		let dir = TempDir::new().unwrap();
		let kit = MemoryCollaborators::new();
		kit.nfs_file(3, "/data/a.txt", b"a").await;
		let services = kit.collaborators();

		let mut nfs = NfsExportContext::new(dir.path());
		let resolved = nfs
			.resolve(&services, &config(), &target("/data/a.txt"), false)
			.await
			.unwrap();

		assert!(resolved.is_none());
		assert_eq!(
			nfs.skip_reason(&target("/data/a.txt")),
			Some(&NfsSkipReason::NoSession(3))
		);
		assert!(logs_contain("Remote resource not added to archive;"));
	}
}
