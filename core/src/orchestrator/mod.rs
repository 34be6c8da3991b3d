//! Drives an export run from selection to checksummed zip.

mod record;

use crate::{
	archival::ExportedRecord,
	closure::{ExportClosure, ExportClosurePlanner, FolderDescriptor},
	collaborators::Collaborators,
	config::{ArchiveFormat, ArchiveSettings, ExportConfig, ExportSelection},
	context::ExportContext,
	error::{Error, NonCriticalExportError, Result},
	finalizer::{self, ArchiveChecksum, ZipLayout},
	identifier::GlobalIdentifier,
	model::{ExportableRecord, User},
	nfs::NfsItemOutcome,
	notify,
	progress::{NoProgress, ProgressReporter, ProgressUpdate},
	revision::resolve_versions,
	writer::{
		ArchiveIndex, ArchiveWriter, HtmlWriter, OutputFiles, XmlWriter, RO_CRATE_METADATA,
		SCHEMAS_FOLDER,
	},
};

use labex_utils::error::FileIOError;

use std::{
	collections::{BTreeSet, HashSet},
	path::PathBuf,
	sync::Arc,
};

use tokio::fs;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct ArchiveResult {
	pub export_file: PathBuf,
	pub checksum: ArchiveChecksum,
	pub archived_records: Vec<ExportedRecord>,
	pub archived_folders: Vec<FolderDescriptor>,
	/// Remote files downloaded into the archive
	pub archived_nfs_files: Vec<NfsItemOutcome>,
	/// Remote files and folders that were left out, with their reasons
	pub skipped_nfs_items: Vec<NfsItemOutcome>,
	pub warnings: Vec<NonCriticalExportError>,
}

/// `(record, revision)` pairs already exported in a run
pub(crate) type SeenRecords = HashSet<(GlobalIdentifier, Option<u64>)>;

/// What stays fixed for the whole assembly phase of a run
pub(crate) struct Run<'a> {
	pub closure: &'a ExportClosure,
	pub config: &'a ExportConfig,
	pub writer: &'a dyn ArchiveWriter,
	pub exporter: &'a User,
}

/// Runs exports against a set of collaborators.
///
/// One run at a time per archive root, see [`crate::disk`].
pub struct ArchiveExporter {
	services: Collaborators,
	settings: ArchiveSettings,
	progress: Arc<dyn ProgressReporter>,
}

impl ArchiveExporter {
	#[must_use]
	pub fn new(services: Collaborators, settings: ArchiveSettings) -> Self {
		Self {
			services,
			settings,
			progress: Arc::new(NoProgress),
		}
	}

	#[must_use]
	pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
		self.progress = progress;
		self
	}

	#[must_use]
	pub const fn settings(&self) -> &ArchiveSettings {
		&self.settings
	}

	#[instrument(
		skip_all,
		fields(scope = %config.scope, format = %config.format, exporter = %config.exporter),
		err
	)]
	pub async fn export(
		&self,
		selection: &ExportSelection,
		config: &ExportConfig,
	) -> Result<ArchiveResult> {
		config.validate()?;
		if selection.scope() != config.scope {
			return Err(Error::Export(format!(
				"selection doesn't match the configured scope: <selection='{}', config='{}'>",
				selection.scope(),
				config.scope
			)));
		}

		let exporter = self
			.services
			.records
			.user(&config.exporter)
			.await?
			.ok_or_else(|| Error::UserNotFound(config.exporter.clone()))?;

		self.progress
			.progress(vec![ProgressUpdate::Phase("planning".to_string())]);
		let closure = ExportClosurePlanner::new(&self.services, config, &exporter)
			.plan(selection)
			.await?;

		let mut ctx = ExportContext::create(&self.settings, config).await?;
		info!(
			archive = %ctx.archive_name,
			records = closure.record_count(),
			"Starting archive assembly;"
		);

		match self.assemble(&mut ctx, &closure, config, &exporter).await {
			Ok(result) => Ok(result),
			Err(e) => {
				// Partial output stays for inspection
				error!(
					?e,
					assembly_dir = %ctx.assembly_dir.display(),
					"Export aborted;"
				);
				Err(e)
			}
		}
	}

	async fn assemble(
		&self,
		ctx: &mut ExportContext,
		closure: &ExportClosure,
		config: &ExportConfig,
		exporter: &User,
	) -> Result<ArchiveResult> {
		let files = OutputFiles::new(
			Arc::clone(&self.services.disk),
			self.settings.archive_root.clone(),
		);
		let writer: Box<dyn ArchiveWriter> = match config.format {
			ArchiveFormat::Xml => Box::new(XmlWriter::new(files.clone())),
			ArchiveFormat::Html => Box::new(HtmlWriter::new(files.clone())),
		};

		let run = Run {
			closure,
			config,
			writer: writer.as_ref(),
			exporter,
		};

		let roots = closure.records().copied().collect::<Vec<_>>();
		self.progress.progress(vec![
			ProgressUpdate::Phase("exporting records".to_string()),
			ProgressUpdate::TaskCount(roots.len()),
		]);

		let mut seen = SeenRecords::new();
		for (done, root) in roots.iter().enumerate() {
			self.progress
				.progress(vec![ProgressUpdate::Message(format!("Exporting {root}"))]);

			if let Err(e) = self.export_root(ctx, &run, root, &mut seen).await {
				if e.is_fatal() {
					return Err(e);
				}
				warn!(%root, ?e, "Failed to export record, skipping it;");
				ctx.warnings.push(NonCriticalExportError::Record {
					id: root.to_string(),
					reason: e.to_string(),
				});
			}

			self.progress
				.progress(vec![ProgressUpdate::CompletedTaskCount(done + 1)]);
		}

		self.progress
			.progress(vec![ProgressUpdate::Phase("writing indexes".to_string())]);
		let users = self.owners(&ctx.archived).await;
		self.write_indexes(ctx, closure, config, writer.as_ref(), &files, &users)
			.await?;

		self.progress
			.progress(vec![ProgressUpdate::Phase("compressing".to_string())]);
		let result = self.finalize(ctx, closure, config).await?;

		self.notify(exporter, config, &result).await;
		Ok(result)
	}

	/// Exports every requested revision of one closure record
	async fn export_root(
		&self,
		ctx: &mut ExportContext,
		run: &Run<'_>,
		root: &GlobalIdentifier,
		seen: &mut SeenRecords,
	) -> Result<()> {
		let entity = self
			.services
			.records
			.get(&root.unversioned())
			.await?
			.ok_or(Error::NotFound(*root))?;

		let Ok(latest) = ExportableRecord::try_from(entity) else {
			debug!(%root, "Folders are exported through their records;");
			return Ok(());
		};

		let revisions = resolve_versions(self.services.audit.as_ref(), run.config, root, latest).await;
		if revisions.is_empty() {
			ctx.warnings.push(NonCriticalExportError::Revision {
				id: root.to_string(),
				reason: "no revision to export".to_string(),
			});
		}

		for audited in revisions {
			let (id, revision) = (audited.global_id(), audited.revision);
			if let Err(e) = self
				.export_record(ctx, run, audited, seen)
				.await
			{
				if e.is_fatal() {
					return Err(e);
				}
				warn!(%id, ?revision, ?e, "Failed to export record revision, skipping it;");
				ctx.warnings.push(NonCriticalExportError::Record {
					id: revision.map_or_else(
						|| id.to_string(),
						|revision| id.with_version(revision).to_string(),
					),
					reason: e.to_string(),
				});
			}
		}

		Ok(())
	}

	/// Users owning any exported record, for `users.xml` and the RO-Crate authors
	async fn owners(&self, archived: &[ExportedRecord]) -> Vec<User> {
		let usernames = archived
			.iter()
			.map(|record| match record.document() {
				Some(document) => document.owner.as_str(),
				None => record.media().map_or("", |media| media.owner.as_str()),
			})
			.filter(|owner| !owner.is_empty())
			.collect::<BTreeSet<_>>();

		let mut users = Vec::with_capacity(usernames.len());
		for username in usernames {
			match self.services.records.user(username).await {
				Ok(Some(user)) => users.push(user),
				Ok(None) => warn!(%username, "Owner of an exported record not found;"),
				Err(e) => warn!(%username, ?e, "Failed to look up record owner;"),
			}
		}
		users
	}

	async fn write_indexes(
		&self,
		ctx: &mut ExportContext,
		closure: &ExportClosure,
		config: &ExportConfig,
		writer: &dyn ArchiveWriter,
		files: &OutputFiles,
		users: &[User],
	) -> Result<()> {
		let index = ArchiveIndex {
			assembly_dir: &ctx.assembly_dir,
			config,
			closure,
			records: &ctx.archived,
			users,
			nfs: &ctx.nfs,
			export_date: ctx.export_date,
		};
		writer.write_indexes(&index).await?;

		if let Some(ro_crate) = ctx.ro_crate.take() {
			let metadata_files = list_files(&ctx.assembly_dir.join(SCHEMAS_FOLDER), SCHEMAS_FOLDER);
			let graph = ro_crate.finalize(users, &metadata_files);
			let json = serde_json::to_string_pretty(&graph)?;
			files
				.write(&ctx.assembly_dir.join(RO_CRATE_METADATA), json.as_bytes())
				.await?;
		}

		Ok(())
	}

	async fn finalize(
		&self,
		ctx: &ExportContext,
		closure: &ExportClosure,
		config: &ExportConfig,
	) -> Result<ArchiveResult> {
		// The zip won't be larger than what it packs
		let assembled_size = WalkDir::new(&ctx.assembly_dir)
			.into_iter()
			.filter_map(std::result::Result::ok)
			.filter_map(|entry| entry.metadata().ok())
			.filter(std::fs::Metadata::is_file)
			.map(|metadata| metadata.len())
			.sum::<u64>();
		self.services
			.disk
			.assert_space(assembled_size, &self.settings.archive_root)?;

		let layout = if ctx.archived.len() == 1 && !config.is_eln() {
			ZipLayout::Flat
		} else {
			ZipLayout::Nested
		};

		let finalized = finalizer::finalize(
			&ctx.assembly_dir,
			&ctx.zip_path,
			layout,
			self.settings.zip_compression_level,
		)
		.await?;

		let checksum = ArchiveChecksum {
			archive_id: Uuid::new_v4(),
			zip_name: ctx
				.zip_path
				.file_name()
				.map(|name| name.to_string_lossy().into_owned())
				.unwrap_or_default(),
			zip_size: finalized.zip_size,
			checksum: finalized.checksum,
			content_checksum: finalized.content_checksum,
			exporter: config.exporter.clone(),
			creation_date: ctx.export_date,
		};
		self.services.checksums.save(&checksum).await?;

		if let Err(e) = fs::remove_dir_all(&ctx.assembly_dir).await {
			warn!(
				e = ?FileIOError::from((&ctx.assembly_dir, e)),
				"Failed to remove assembly folder after zipping;"
			);
		}

		info!(
			zip = %finalized.zip_path.display(),
			size = checksum.zip_size,
			records = ctx.archived.len(),
			warnings = ctx.warnings.len(),
			"Archive complete;"
		);

		Ok(ArchiveResult {
			export_file: finalized.zip_path,
			checksum,
			archived_records: ctx.archived.clone(),
			archived_folders: closure.folders().cloned().collect(),
			archived_nfs_files: ctx.nfs.included_files().cloned().collect(),
			skipped_nfs_items: ctx
				.nfs
				.outcomes()
				.filter(|outcome| !outcome.is_included())
				.cloned()
				.collect(),
			warnings: ctx.warnings.clone(),
		})
	}

	/// A failed notification doesn't fail the export
	async fn notify(&self, exporter: &User, config: &ExportConfig, result: &ArchiveResult) {
		let (subject, message) = notify::completion_message(config, result);
		if let Err(e) = self
			.services
			.notifier
			.notify(exporter, &subject, &message)
			.await
		{
			warn!(?e, "Failed to send export completion notification;");
		}
	}
}

/// Archive relative paths of the files below `dir`, sorted
fn list_files(dir: &std::path::Path, prefix: &str) -> Vec<String> {
	let mut files = WalkDir::new(dir)
		.min_depth(1)
		.into_iter()
		.filter_map(std::result::Result::ok)
		.filter(|entry| entry.file_type().is_file())
		.filter_map(|entry| {
			entry
				.path()
				.strip_prefix(dir)
				.ok()
				.map(|relative| format!("{prefix}/{}", relative.to_string_lossy().replace('\\', "/")))
		})
		.collect::<Vec<_>>();
	files.sort_unstable();
	files
}
