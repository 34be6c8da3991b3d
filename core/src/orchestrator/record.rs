use crate::{
	archival::{
		ArchivalDocument, ArchivalField, ArchivalGalleryMetadata, ArchivedPayload, ExportedRecord,
	},
	context::ExportContext,
	error::{Error, NonCriticalExportError, Result},
	fields::{export_field_elements, FieldExportContext},
	identifier::{GlobalIdPrefix, GlobalIdentifier},
	layout::RecordLocation,
	model::{Document, Entity, ExportableRecord, FieldType, MediaFile, Permission},
	revision::AuditedRecord,
	stager::ResourceStager,
};

use labex_utils::{error::FileIOError, split_extension};

use std::path::Path;

use tokio::fs;
use tracing::{debug, trace, warn};

use super::{ArchiveExporter, Run, SeenRecords};

impl ArchiveExporter {
	/// Exports one `(record, revision)` into its own folder, then anything it pulls in.
	///
	/// Pairs already in `seen` are skipped, whichever path reached them first wins.
	pub(super) async fn export_record(
		&self,
		ctx: &mut ExportContext,
		run: &Run<'_>,
		audited: AuditedRecord,
		seen: &mut SeenRecords,
	) -> Result<()> {
		let id = audited.global_id();
		if !seen.insert((id.unversioned(), audited.revision)) {
			trace!(%id, revision = ?audited.revision, "Record revision already exported;");
			return Ok(());
		}

		let location = ctx.layout.locate_record(&audited.record, audited.revision);
		let record_dir = ctx.assembly_dir.join(&location.folder);
		fs::create_dir_all(&record_dir)
			.await
			.map_err(|e| Error::from_io(FileIOError::from((&record_dir, e))))?;

		let (exported, original_image_id) = match audited.record {
			ExportableRecord::Document(document) => (
				self.export_document(ctx, run, &document, audited.revision, location, &record_dir)
					.await?,
				None,
			),
			ExportableRecord::Media(media) => {
				let original = media.original_image_id;
				(
					self.export_media(run, &media, audited.revision, location, &record_dir)
						.await?,
					original,
				)
			}
		};

		run.writer.write_record(&ctx.assembly_dir, &exported).await?;
		if let Some(ro_crate) = ctx.ro_crate.as_mut() {
			ro_crate.add_record(&exported);
		}
		debug!(%id, revision = ?exported.revision, folder = %exported.folder, "Exported record;");
		ctx.archived.push(exported);

		if let Some(original_id) = original_image_id {
			let original_id = GlobalIdentifier::new(GlobalIdPrefix::GL, original_id);
			if let Err(e) = self.export_original_image(ctx, run, original_id, seen).await {
				if e.is_fatal() {
					return Err(e);
				}
				warn!(%id, original = %original_id, ?e, "Failed to export original of edited image;");
				ctx.warnings.push(NonCriticalExportError::Record {
					id: original_id.to_string(),
					reason: e.to_string(),
				});
			}
		}

		Ok(())
	}

	/// Edited images carry the image they were made from along
	async fn export_original_image(
		&self,
		ctx: &mut ExportContext,
		run: &Run<'_>,
		original_id: GlobalIdentifier,
		seen: &mut SeenRecords,
	) -> Result<()> {
		let Some(Entity::Media(original)) = self.services.records.get(&original_id).await? else {
			return Err(Error::NotFound(original_id));
		};

		if original.deleted {
			debug!(%original_id, "Original image was deleted, leaving it out;");
			return Ok(());
		}

		if !self
			.services
			.permissions
			.is_permitted(&Entity::Media(original.clone()), Permission::Read, run.exporter)
			.await
		{
			debug!(%original_id, "Exporter can't read original image, leaving it out;");
			return Ok(());
		}

		Box::pin(self.export_record(
			ctx,
			run,
			AuditedRecord::latest(ExportableRecord::Media(original)),
			seen,
		))
		.await
	}

	async fn export_document(
		&self,
		ctx: &mut ExportContext,
		run: &Run<'_>,
		document: &Document,
		revision: Option<u64>,
		location: RecordLocation,
		record_dir: &Path,
	) -> Result<ExportedRecord> {
		let mut archived = ArchivalDocument {
			id: document.global_id().to_string(),
			name: document.name.clone(),
			owner: document.owner.clone(),
			form_name: document.form_name.clone(),
			tags: document.tags.clone(),
			version: document.version,
			revision,
			created: document.created.to_rfc3339(),
			last_modified: document.modified.to_rfc3339(),
			fields: Vec::with_capacity(document.fields.len()),
		};

		for field in &document.fields {
			let mut archival_field = ArchivalField {
				id: field.id,
				name: field.name.clone(),
				field_type: field.field_type.to_string(),
				last_modified: field.modified.to_rfc3339(),
				content: field.content.clone(),
				..ArchivalField::default()
			};

			if field.field_type == FieldType::Text {
				let contents = self.services.parser.parse(&field.content);
				if !contents.is_empty() {
					let mut field_ctx = FieldExportContext::new(
						&self.services,
						run.config,
						run.closure,
						&mut ctx.layout,
						&mut ctx.nfs,
						&self.settings.archive_root,
						record_dir,
						revision,
						document.modified,
						&mut archival_field,
						&mut ctx.warnings,
					);
					let exported = export_field_elements(&mut field_ctx, &contents).await?;
					trace!(
						field_id = field.id,
						found = contents.len(),
						exported,
						"Exported field elements;"
					);
				}
			}

			archived.fields.push(archival_field);
		}

		Ok(ExportedRecord {
			id: document.global_id(),
			revision,
			payload: ArchivedPayload::Document(archived),
			page: location.file.clone(),
			file: location.file,
			folder: location.folder,
			parent_folder_id: document.parent_id,
			modified: document.modified,
		})
	}

	async fn export_media(
		&self,
		run: &Run<'_>,
		media: &MediaFile,
		revision: Option<u64>,
		location: RecordLocation,
		record_dir: &Path,
	) -> Result<ExportedRecord> {
		let source = self.services.files.find_file(&media.file).await?;
		let staged = ResourceStager::new(self.services.disk.as_ref(), &self.settings.archive_root)
			.stage_file(&source, record_dir, &location.file)
			.await?;

		let (stem, _) = split_extension(&staged.file_name);
		let page = format!("{stem}_metadata.{}", run.config.format);

		let metadata = ArchivalGalleryMetadata {
			id: media.global_id().to_string(),
			name: media.name.clone(),
			owner: media.owner.clone(),
			media_type: media.media_type.to_string(),
			extension: media.extension.clone(),
			description: media.description.clone(),
			version: media.version,
			revision,
			created: media.created.to_rfc3339(),
			last_modified: media.modified.to_rfc3339(),
			file_name: staged.file_name.clone(),
			png_file_name: staged.converted_png,
			size: staged.size,
			original_image: media
				.original_image_id
				.map(|id| GlobalIdentifier::new(GlobalIdPrefix::GL, id).to_string()),
		};

		Ok(ExportedRecord {
			id: media.global_id(),
			revision,
			payload: ArchivedPayload::Media(metadata),
			folder: location.folder,
			file: staged.file_name,
			page,
			parent_folder_id: media.parent_id,
			modified: media.modified,
		})
	}
}
