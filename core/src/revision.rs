//! Decides which historical revisions of a record get exported.

use crate::{
	collaborators::AuditStore,
	config::ExportConfig,
	error::Result,
	identifier::GlobalIdentifier,
	model::{Document, ExportableRecord, MediaFile},
};

use tracing::{debug, warn};

/// A record snapshot and the audit revision it was taken at, `None` for the current head
#[derive(Debug, Clone)]
pub struct AuditedRecord {
	pub record: ExportableRecord,
	pub revision: Option<u64>,
}

impl AuditedRecord {
	#[must_use]
	pub const fn latest(record: ExportableRecord) -> Self {
		Self {
			record,
			revision: None,
		}
	}

	#[must_use]
	pub const fn global_id(&self) -> GlobalIdentifier {
		self.record.global_id()
	}
}

/// Revisions of `latest` to export for the selected `target`.
///
/// An unresolvable pinned version yields no revisions at all, the caller skips the record.
pub async fn resolve_versions(
	audit: &dyn AuditStore,
	config: &ExportConfig,
	target: &GlobalIdentifier,
	latest: ExportableRecord,
) -> Vec<AuditedRecord> {
	let resolved = if config.all_versions {
		full_history(audit, latest).await
	} else {
		match target.version {
			Some(version) if version != latest.version() => {
				pinned_version(audit, &latest, version).await
			}
			_ => Ok(vec![AuditedRecord::latest(latest)]),
		}
	};

	match resolved {
		Ok(revisions) => {
			debug!(%target, count = revisions.len(), "Resolved revisions to export;");
			revisions
		}
		Err(e) => {
			warn!(%target, ?e, "Failed to resolve record revisions, skipping record;");
			Vec::new()
		}
	}
}

/// Older audited revisions followed by the current state.
///
/// The revision matching the head's version is the head itself, it is exported once
/// as the current state so links from other records resolve to it.
async fn full_history(
	audit: &dyn AuditStore,
	latest: ExportableRecord,
) -> Result<Vec<AuditedRecord>> {
	let head_version = latest.version();
	let mut revisions = match &latest {
		ExportableRecord::Document(head) => audit
			.document_history(head.id)
			.await?
			.into_iter()
			.filter(|(_, document)| document.version != head_version)
			.map(|(revision, document)| AuditedRecord {
				record: ExportableRecord::Document(Document {
					// Old revisions are placed where the record lives now
					parent_id: head.parent_id,
					..document
				}),
				revision: Some(revision),
			})
			.collect::<Vec<_>>(),

		ExportableRecord::Media(head) => audit
			.media_history(head.id)
			.await?
			.into_iter()
			.filter(|(_, media)| media.version != head_version)
			.map(|(revision, media)| AuditedRecord {
				record: ExportableRecord::Media(MediaFile {
					parent_id: head.parent_id,
					..media
				}),
				revision: Some(revision),
			})
			.collect(),
	};

	revisions.push(AuditedRecord::latest(latest));
	Ok(revisions)
}

async fn pinned_version(
	audit: &dyn AuditStore,
	latest: &ExportableRecord,
	version: u64,
) -> Result<Vec<AuditedRecord>> {
	let found = match latest {
		ExportableRecord::Document(head) => audit
			.document_version(head.id, version)
			.await?
			.map(|(revision, document)| (revision, ExportableRecord::Document(document))),
		ExportableRecord::Media(head) => audit
			.media_version(head.id, version)
			.await?
			.map(|(revision, media)| (revision, ExportableRecord::Media(media))),
	};

	Ok(found
		.map(|(revision, record)| {
			vec![AuditedRecord {
				record,
				revision: Some(revision),
			}]
		})
		.unwrap_or_else(|| {
			warn!(
				id = %latest.global_id(),
				version,
				"Pinned version not found in audit history;"
			);
			Vec::new()
		}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::{ArchiveFormat, ExportScope},
		testing::{document, MemoryCollaborators},
	};

	fn config() -> ExportConfig {
		ExportConfig::new(ExportScope::Selection, ArchiveFormat::Xml, "alice")
	}

	async fn kit_with_history() -> (MemoryCollaborators, Document) {
		let kit = MemoryCollaborators::new();
		let mut draft = document(10, "Draft", "alice", Some(1), Vec::new());
		draft.version = 1;
		let mut review = document(10, "Review", "alice", Some(1), Vec::new());
		review.version = 2;
		let mut head = document(10, "Final", "alice", Some(1), Vec::new());
		head.version = 3;

		kit.add_document_revision(4, draft).await;
		kit.add_document_revision(6, review).await;
		kit.add_document_revision(9, head.clone()).await;
		kit.add_document(head.clone()).await;
		(kit, head)
	}

	#[tokio::test]
	async fn pinned_version_is_returned_instead_of_head() {
		let (kit, head) = kit_with_history().await;
		let services = kit.collaborators();
		let target = head.global_id().with_version(2);

		let revisions = resolve_versions(
			services.audit.as_ref(),
			&config(),
			&target,
			ExportableRecord::Document(head),
		)
		.await;

		assert_eq!(revisions.len(), 1);
		assert_eq!(revisions[0].revision, Some(6));
		assert_eq!(revisions[0].record.version(), 2);
	}

	#[tokio::test]
	async fn head_version_pin_exports_latest() {
		let (kit, head) = kit_with_history().await;
		let services = kit.collaborators();
		let target = head.global_id().with_version(3);

		let revisions = resolve_versions(
			services.audit.as_ref(),
			&config(),
			&target,
			ExportableRecord::Document(head),
		)
		.await;

		assert_eq!(revisions.len(), 1);
		assert_eq!(revisions[0].revision, None);
	}

	#[tokio::test]
	async fn all_versions_ends_with_current_state() {
		let (kit, mut head) = kit_with_history().await;
		head.parent_id = Some(2);
		let services = kit.collaborators();
		let target = head.global_id();

		let revisions = resolve_versions(
			services.audit.as_ref(),
			&config().with_all_versions(true),
			&target,
			ExportableRecord::Document(head),
		)
		.await;

		assert_eq!(
			revisions.iter().map(|r| r.revision).collect::<Vec<_>>(),
			vec![Some(4), Some(6), None]
		);
		assert!(revisions.iter().all(|r| matches!(
			&r.record,
			ExportableRecord::Document(document) if document.parent_id == Some(2)
		)));
	}

	#[tokio::test]
	async fn unknown_pinned_version_yields_nothing() {
		let (kit, head) = kit_with_history().await;
		let services = kit.collaborators();
		let target = head.global_id().with_version(42);

		let revisions = resolve_versions(
			services.audit.as_ref(),
			&config(),
			&target,
			ExportableRecord::Document(head),
		)
		.await;

		assert!(revisions.is_empty());
	}
}
