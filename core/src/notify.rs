//! Text of the message sent to the exporter once an archive is ready

use crate::{config::ExportConfig, orchestrator::ArchiveResult};

use std::fmt::Write as _;

/// Subject and body of the completion notification.
///
/// Sent on every successful run, partial ones included, so the body always states how
/// many remote files made it in and why the others did not.
#[must_use]
pub fn completion_message(config: &ExportConfig, result: &ArchiveResult) -> (String, String) {
	let zip_name = &result.checksum.zip_name;
	let subject = if result.warnings.is_empty() && result.skipped_nfs_items.is_empty() {
		format!("Export {zip_name} is ready")
	} else {
		format!("Export {zip_name} is ready, some items were skipped")
	};

	let mut body = String::new();
	// Writing into a String never fails
	let _ = writeln!(
		body,
		"Your {} export of scope {} has completed.",
		config.format, config.scope
	);
	let _ = writeln!(body, "Archive: {zip_name} ({} bytes)", result.checksum.zip_size);
	let _ = writeln!(body, "Records exported: {}", result.archived_records.len());
	let _ = writeln!(body, "Folders exported: {}", result.archived_folders.len());

	if config.include_nfs_links {
		let _ = writeln!(
			body,
			"Linked filesystem files included: {}, skipped: {}",
			result.archived_nfs_files.len(),
			result.skipped_nfs_items.len()
		);
		for skipped in &result.skipped_nfs_items {
			if let Some(reason) = &skipped.skip_reason {
				let _ = writeln!(body, "  - {} ({}): {reason}", skipped.name, skipped.target);
			}
		}
	}

	if !result.warnings.is_empty() {
		let _ = writeln!(body, "Items left out of the archive: {}", result.warnings.len());
		for warning in &result.warnings {
			let _ = writeln!(body, "  - {warning}");
		}
	}

	(subject, body)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::{ArchiveFormat, ExportScope},
		error::NonCriticalExportError,
		fields::element::NfsTarget,
		finalizer::ArchiveChecksum,
		nfs::{NfsItemOutcome, NfsSkipReason},
	};

	use std::path::PathBuf;

	use chrono::Utc;
	use uuid::Uuid;

	fn result() -> ArchiveResult {
		ArchiveResult {
			export_file: PathBuf::from("/archives/alice.zip"),
			checksum: ArchiveChecksum {
				archive_id: Uuid::new_v4(),
				zip_name: "alice.zip".to_string(),
				zip_size: 1234,
				checksum: "abc".to_string(),
				content_checksum: "def".to_string(),
				exporter: "alice".to_string(),
				creation_date: Utc::now(),
			},
			archived_records: Vec::new(),
			archived_folders: Vec::new(),
			archived_nfs_files: Vec::new(),
			skipped_nfs_items: vec![NfsItemOutcome {
				target: NfsTarget {
					filesystem_id: 3,
					path: "/big.bin".to_string(),
				},
				name: "big.bin".to_string(),
				is_folder: false,
				archive_path: None,
				skip_reason: Some(NfsSkipReason::TooLarge {
					size: 100,
					limit: 10,
				}),
			}],
			warnings: vec![NonCriticalExportError::Record {
				id: "SD4".to_string(),
				reason: "gone".to_string(),
			}],
		}
	}

	#[test]
	fn lists_skipped_items() {
		let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, "alice")
			.with_nfs_links(10, &[]);

		let (subject, body) = completion_message(&config, &result());
		assert!(subject.contains("some items were skipped"));
		assert!(body.contains("included: 0, skipped: 1"));
		assert!(body.contains("big.bin (3:/big.bin)"));
		assert!(body.contains("SD4"));
	}

	#[test]
	fn nfs_counts_only_when_enabled() {
		let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Xml, "alice");
		let (_, body) = completion_message(&config, &result());
		assert!(!body.contains("Linked filesystem"));
	}
}
