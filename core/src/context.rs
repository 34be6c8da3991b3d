use crate::{
	archival::ExportedRecord,
	config::{ArchiveSettings, ExportConfig},
	error::{Error, NonCriticalExportError, Result},
	layout::ExportLayout,
	nfs::NfsExportContext,
	writer::RoCrateBuilder,
};

use labex_utils::error::FileIOError;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::fs;

/// State of one export run, created when the run starts and dropped once the zip exists
pub struct ExportContext {
	/// `<exporter>-<yyyy-MM-dd-HH-mm-ss>-<format>`
	pub archive_name: String,
	pub assembly_dir: PathBuf,
	pub zip_path: PathBuf,
	pub export_date: DateTime<Utc>,
	pub layout: ExportLayout,
	pub nfs: NfsExportContext,
	pub archived: Vec<ExportedRecord>,
	pub warnings: Vec<NonCriticalExportError>,
	pub ro_crate: Option<RoCrateBuilder>,
}

impl ExportContext {
	/// Creates a fresh assembly folder below the archive root
	pub async fn create(settings: &ArchiveSettings, config: &ExportConfig) -> Result<Self> {
		let export_date = Utc::now();
		let base = archive_name(config, export_date);

		let mut stem = base.clone();
		let mut attempt = 1;
		// Two runs by the same user within a second, the first one may already be zipped
		loop {
			let taken = fs::try_exists(settings.archive_root.join(&stem))
				.await
				.unwrap_or(false)
				|| fs::try_exists(zip_path(settings, config, &stem))
					.await
					.unwrap_or(false);
			if !taken {
				break;
			}
			stem = format!("{base}-{attempt}");
			attempt += 1;
		}

		let assembly_dir = settings.archive_root.join(&stem);
		fs::create_dir_all(&assembly_dir)
			.await
			.map_err(|e| Error::from_io(FileIOError::from((&assembly_dir, e))))?;
		let zip_path = zip_path(settings, config, &stem);

		Ok(Self {
			ro_crate: config
				.is_eln()
				.then(|| RoCrateBuilder::new(&stem, config, export_date)),
			archive_name: stem,
			nfs: NfsExportContext::new(&assembly_dir),
			layout: ExportLayout::new(config.format, settings.folder_suffix_len),
			assembly_dir,
			zip_path,
			export_date,
			archived: Vec::new(),
			warnings: Vec::new(),
		})
	}
}

fn zip_path(settings: &ArchiveSettings, config: &ExportConfig, stem: &str) -> PathBuf {
	settings
		.archive_root
		.join(format!("{stem}.{}", config.archive_extension()))
}

#[must_use]
pub fn archive_name(config: &ExportConfig, export_date: DateTime<Utc>) -> String {
	format!(
		"{}-{}-{}",
		labex_utils::sanitize_file_name(&config.exporter),
		export_date.format("%Y-%m-%d-%H-%M-%S"),
		config.format
	)
}
