//! Exports the elements embedded in rich-text fields.
//!
//! Every element kind has an [`ElementExporter`] and all of them run through the same
//! template in [`export_element`]: pick the audited variant, check it against the
//! planned whitelist, stage its resources, rewrite the field markup and record sidecar
//! metadata. A failing element is dropped on its own, only fatal errors escape.

pub mod element;
pub mod markup;

mod attachment;
mod chem;
mod comment;
mod image;
mod link;
mod math;
mod nfs;
mod sketch;
mod stoichiometry;
mod workflow;

use crate::{
	archival::ArchivalField,
	closure::ExportClosure,
	collaborators::Collaborators,
	config::ExportConfig,
	error::{Error, NonCriticalExportError, Result},
	identifier::GlobalIdentifier,
	layout::ExportLayout,
	model::{ExportableRecord, MediaFile},
	nfs::NfsExportContext,
	stager::ResourceStager,
};

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use element::{ElementKind, FieldContents, Linked};

/// Everything an element exporter may read or touch while exporting one field
pub struct FieldExportContext<'a> {
	pub services: &'a Collaborators,
	pub config: &'a ExportConfig,
	pub closure: &'a ExportClosure,
	pub layout: &'a mut ExportLayout,
	pub nfs: &'a mut NfsExportContext,
	/// Any path on the archive volume, for disk space checks
	pub volume: &'a Path,
	/// Folder of the record being exported
	pub record_dir: &'a Path,
	/// Audit revision of the record, `None` for the current state
	pub revision: Option<u64>,
	/// Last modification of the record at [`Self::revision`]
	pub revision_date: DateTime<Utc>,
	pub field: &'a mut ArchivalField,
	pub warnings: &'a mut Vec<NonCriticalExportError>,
	/// Outcome of every element markup already handled in this field
	exported_links: HashMap<String, bool>,
}

impl<'a> FieldExportContext<'a> {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		services: &'a Collaborators,
		config: &'a ExportConfig,
		closure: &'a ExportClosure,
		layout: &'a mut ExportLayout,
		nfs: &'a mut NfsExportContext,
		volume: &'a Path,
		record_dir: &'a Path,
		revision: Option<u64>,
		revision_date: DateTime<Utc>,
		field: &'a mut ArchivalField,
		warnings: &'a mut Vec<NonCriticalExportError>,
	) -> Self {
		Self {
			services,
			config,
			closure,
			layout,
			nfs,
			volume,
			record_dir,
			revision,
			revision_date,
			field,
			warnings,
			exported_links: HashMap::new(),
		}
	}

	pub(crate) fn stager(&self) -> ResourceStager<'_> {
		ResourceStager::new(self.services.disk.as_ref(), self.volume)
	}

	/// Whether the media the field shows has to live inside the record's own folder
	/// instead of linking to its independent export.
	///
	/// Only media in the closure gets an independent export, in any scope.
	pub(crate) fn copies_media_into_record(&self, media: &MediaFile, head_version: u64) -> bool {
		!self.closure.contains_record(&media.global_id())
			|| media.deleted
			|| media.version != head_version
	}

	/// Fetches a gallery file, at the version the id pins if there is one
	pub(crate) async fn media(&self, id: &GlobalIdentifier) -> Result<(MediaFile, u64)> {
		let head = match self.services.records.get(&id.unversioned()).await? {
			Some(entity) => match ExportableRecord::try_from(entity) {
				Ok(ExportableRecord::Media(media)) => media,
				_ => return Err(Error::Export(format!("not a gallery file: <id='{id}'>"))),
			},
			None => return Err(Error::NotFound(*id)),
		};
		let head_version = head.version;

		match id.version {
			Some(version) if version != head_version => self
				.services
				.audit
				.media_version(head.id, version)
				.await?
				.map(|(_, media)| (media, head_version))
				.ok_or(Error::NotFound(*id)),
			_ => Ok((head, head_version)),
		}
	}
}

/// One exporter per [`ElementKind`], the framework drives its steps in order
#[async_trait]
pub trait ElementExporter: Send + Sync {
	type Element: Send + Sync;
	type Staged: Send;

	const KIND: ElementKind;

	/// Identifier used in logs and warnings
	fn describe(element: &Self::Element) -> String;

	/// Disabled kinds are skipped without a warning
	fn is_enabled(&self, _ctx: &FieldExportContext<'_>) -> bool {
		true
	}

	/// The element as it was at the record's revision, the current one when the audit
	/// trail has nothing older
	async fn audited(
		&self,
		_ctx: &FieldExportContext<'_>,
		element: &Self::Element,
	) -> Result<Option<Self::Element>> {
		let _ = element;
		Ok(None)
	}

	/// Only elements vetted while planning make it into the archive
	fn is_permitted(&self, ctx: &FieldExportContext<'_>, element: &Self::Element) -> bool;

	/// Copies, renders or downloads whatever the element needs inside the archive
	async fn stage(
		&self,
		ctx: &mut FieldExportContext<'_>,
		element: &Self::Element,
	) -> Result<Self::Staged>;

	/// Replacement for the element's opening tag, `None` leaves the markup alone
	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String>;

	/// Appends the sidecar record to the field
	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged);
}

/// Runs the template over a single element, `Ok(false)` when it was dropped
pub async fn export_element<E>(
	exporter: &E,
	ctx: &mut FieldExportContext<'_>,
	linked: &Linked<E::Element>,
) -> Result<bool>
where
	E: ElementExporter,
{
	let description = E::describe(&linked.element);

	if !exporter.is_enabled(ctx) {
		trace!(kind = %E::KIND, element = %description, "Element kind disabled for this export;");
		return Ok(false);
	}

	if let Some(&exported) = ctx.exported_links.get(&linked.original_link) {
		trace!(
			kind = %E::KIND,
			element = %description,
			exported,
			"Element markup already handled;"
		);
		return Ok(exported);
	}

	let exported = match run_steps(exporter, ctx, linked).await {
		Ok(()) => {
			trace!(kind = %E::KIND, element = %description, "Exported field element;");
			true
		}
		Err(e) if e.is_fatal() => return Err(e),
		Err(e) => {
			warn!(
				kind = %E::KIND,
				element = %description,
				field_id = ctx.field.id,
				?e,
				"Failed to export field element, dropping it;"
			);
			ctx.warnings.push(NonCriticalExportError::Element {
				field_id: ctx.field.id,
				element: description,
				reason: e.to_string(),
			});
			false
		}
	};

	ctx.exported_links.insert(linked.original_link.clone(), exported);
	Ok(exported)
}

async fn run_steps<E: ElementExporter>(
	exporter: &E,
	ctx: &mut FieldExportContext<'_>,
	linked: &Linked<E::Element>,
) -> Result<()> {
	let audited = if ctx.revision.is_some() {
		exporter.audited(ctx, &linked.element).await?
	} else {
		None
	};
	let element = audited.as_ref().unwrap_or(&linked.element);

	if !exporter.is_permitted(ctx, element) {
		return Err(Error::Export(format!(
			"{} wasn't cleared for export while planning: <element='{}'>",
			E::KIND,
			E::describe(element)
		)));
	}

	let staged = exporter.stage(ctx, element).await?;

	if let Some(replacement) = exporter.rewrite(&linked.original_link, &staged) {
		ctx.field.content = ctx.field.content.replace(&linked.original_link, &replacement);
	}

	exporter.record(ctx, element, staged);

	Ok(())
}

/// Exports every element of a field in [`ElementKind`] order, returns how many made it
pub async fn export_field_elements(
	ctx: &mut FieldExportContext<'_>,
	contents: &FieldContents,
) -> Result<usize> {
	let mut exported = 0;

	for linked in &contents.images {
		exported += usize::from(export_element(&image::ImageExporter, ctx, linked).await?);
	}
	for linked in &contents.chems {
		exported += usize::from(export_element(&chem::ChemExporter, ctx, linked).await?);
	}
	for linked in &contents.maths {
		exported += usize::from(export_element(&math::MathExporter, ctx, linked).await?);
	}
	for linked in &contents.comments {
		exported += usize::from(export_element(&comment::CommentExporter, ctx, linked).await?);
	}
	for linked in &contents.sketches {
		exported += usize::from(export_element(&sketch::SketchExporter, ctx, linked).await?);
	}
	for linked in &contents.attachments {
		exported +=
			usize::from(export_element(&attachment::AttachmentExporter, ctx, linked).await?);
	}
	for linked in &contents.linked_records {
		exported += usize::from(export_element(&link::LinkExporter, ctx, linked).await?);
	}
	for linked in &contents.nfs_links {
		exported += usize::from(export_element(&nfs::NfsLinkExporter, ctx, linked).await?);
	}
	for linked in &contents.external_workflows {
		exported +=
			usize::from(export_element(&workflow::ExternalWorkflowExporter, ctx, linked).await?);
	}
	for linked in &contents.stoichiometries {
		exported += usize::from(
			export_element(&stoichiometry::StoichiometryExporter, ctx, linked).await?,
		);
	}

	Ok(exported)
}

/// Payload lookup shared by the element kinds stored with revisions: the revision first,
/// then the current state
pub(crate) async fn with_revision_fallback<T, F, Fut>(
	revision: Option<u64>,
	id: &GlobalIdentifier,
	fetch: F,
) -> Result<T>
where
	F: Fn(Option<u64>) -> Fut + Send + Sync,
	Fut: std::future::Future<Output = Result<Option<T>>> + Send,
	T: Send,
{
	if let Some(revision) = revision {
		if let Some(found) = fetch(Some(revision)).await? {
			return Ok(found);
		}
		trace!(%id, revision, "No audited payload at revision, using the current one;");
	}

	fetch(None).await?.ok_or(Error::NotFound(*id))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		collaborators::FieldParser,
		config::{ArchiveFormat, ExportScope},
		identifier::GlobalIdPrefix,
		testing::{base_time, MemoryCollaborators},
	};

	use tempfile::TempDir;

	#[tokio::test]
	async fn repeated_markup_shares_the_first_outcome() {
		let dir = TempDir::new().unwrap();
		let services = MemoryCollaborators::new().collaborators();
		let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, "alice");

		let missing = GlobalIdentifier::new(GlobalIdPrefix::GL, 99);
		let mut closure = ExportClosure::new();
		closure.add_field_attachment(missing);

		let markup = r#"<img class="imageDropped" data-id="GL99" src="/image/99">"#;
		let contents = services.parser.parse(&format!("{markup}<p>again</p>{markup}"));
		assert_eq!(contents.images.len(), 2);

		let mut layout = ExportLayout::new(ArchiveFormat::Html, 6);
		let mut nfs = NfsExportContext::new(dir.path());
		let mut field = ArchivalField {
			id: 1,
			content: format!("{markup}<p>again</p>{markup}"),
			..ArchivalField::default()
		};
		let mut warnings = Vec::new();

		let exported = {
			let mut ctx = FieldExportContext::new(
				&services,
				&config,
				&closure,
				&mut layout,
				&mut nfs,
				dir.path(),
				dir.path(),
				None,
				base_time(),
				&mut field,
				&mut warnings,
			);
			export_field_elements(&mut ctx, &contents).await.unwrap()
		};

		assert_eq!(exported, 0);
		assert_eq!(warnings.len(), 1);
		assert!(field.images.is_empty());
		assert_eq!(field.content.matches("/image/99").count(), 2);
	}
}
