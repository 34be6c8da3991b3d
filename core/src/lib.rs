#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	clippy::expect_used,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::dbg_macro
)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! Packages lab notebook records into self-contained archives.
//!
//! An export plans the closure of a selection (folders, records, linked records and
//! embedded items), writes every record revision as an XML, HTML or RO-Crate page with
//! its resources next to it, and seals the result in a checksummed zip.

use labex_utils::error::FileIOError;

use std::path::Path;

use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
	filter::{Directive, LevelFilter},
	fmt::{self, Layer},
	prelude::*,
	EnvFilter,
};

pub mod archival;
pub mod closure;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod disk;
pub mod error;
pub mod fields;
pub mod finalizer;
pub mod identifier;
pub mod layout;
pub mod model;
pub mod nfs;
pub mod notify;
pub mod orchestrator;
pub mod progress;
pub mod revision;
pub mod stager;
pub mod testing;
pub mod writer;

pub use collaborators::{
	AuditStore, ChecksumStore, Collaborators, ElementStore, FieldParser, FileStore, NfsClient,
	Notifier, PermissionChecker, RecordStore,
};
pub use config::{
	ArchiveFlavor, ArchiveFormat, ArchiveSettings, ExportConfig, ExportScope, ExportSelection,
};
pub use disk::{DiskSpaceChecker, FixedDiskSpace, SystemDiskSpace};
pub use error::{Error, NonCriticalExportError, Result};
pub use identifier::{GlobalIdPrefix, GlobalIdentifier};
pub use orchestrator::{ArchiveExporter, ArchiveResult};
pub use progress::{NoProgress, ProgressReporter, ProgressUpdate, SharedProgress};

/// Installs the global subscriber: console output plus a daily rolling file in `log_dir`.
///
/// `log_level` applies to this crate, everything else logs warnings only unless
/// `RUST_LOG` says otherwise. Keep the returned guard alive to flush the file writer.
pub fn init_tracing(log_dir: impl AsRef<Path>, log_level: &str) -> Result<WorkerGuard> {
	let log_dir = log_dir.as_ref();
	std::fs::create_dir_all(log_dir).map_err(|e| FileIOError::from((log_dir, e)))?;

	let (non_blocking, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "labex.log"));

	let directive = |raw: &str| {
		raw.parse::<Directive>().map_err(|e| {
			Error::Export(format!("invalid tracing directive: <directive='{raw}'>: {e}"))
		})
	};

	tracing_subscriber::registry()
		.with(
			EnvFilter::from_default_env()
				.add_directive(directive("warn")?)
				.add_directive(directive(&format!("labex_core={log_level}"))?),
		)
		.with(fmt::layer().with_filter(LevelFilter::INFO))
		.with(
			Layer::default()
				.with_writer(non_blocking)
				.with_ansi(false)
				.with_filter(LevelFilter::DEBUG),
		)
		.try_init()
		.map_err(|e| Error::Export(format!("failed to install tracing subscriber: {e}")))?;

	Ok(guard)
}
