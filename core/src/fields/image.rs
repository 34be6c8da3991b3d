use crate::{
	archival::ArchivalImage,
	error::Result,
	identifier::GlobalIdentifier,
	model::MediaFile,
};

use labex_utils::split_extension;

use async_trait::async_trait;
use tracing::trace;

use super::{
	element::{ElementKind, EmbeddedImage},
	markup::set_attribute,
	ElementExporter, FieldExportContext,
};

pub struct ImageExporter;

/// A gallery file placed in the archive for a field
pub struct StagedMedia {
	pub media: MediaFile,
	pub link: String,
	pub png_link: Option<String>,
}

impl StagedMedia {
	/// Browsers can't show TIFF, fields point at the PNG copy when there is one
	pub fn display_link(&self) -> &str {
		self.png_link.as_deref().unwrap_or(&self.link)
	}
}

/// Copies a gallery file into the record folder, or links to where its own export lives
pub(super) async fn stage_media(
	ctx: &mut FieldExportContext<'_>,
	media_id: &GlobalIdentifier,
) -> Result<StagedMedia> {
	let (media, head_version) = ctx.media(media_id).await?;

	if ctx.copies_media_into_record(&media, head_version) {
		let source = ctx.services.files.find_file(&media.file).await?;
		let staged = ctx
			.stager()
			.stage_file(&source, ctx.record_dir, &media.archive_file_name())
			.await?;

		trace!(media_id = %media.global_id(), file = staged.file_name, "Copied media into record folder;");

		return Ok(StagedMedia {
			media,
			link: staged.file_name,
			png_link: staged.converted_png,
		});
	}

	let location = ctx.layout.locate_media(&media, None);
	let png_link = labex_images::needs_png_conversion(&location.file).then(|| {
		let (stem, _) = split_extension(&location.file);
		format!("../{}/{stem}.png", location.folder)
	});

	Ok(StagedMedia {
		link: location.link_from_sibling(),
		png_link,
		media,
	})
}

#[async_trait]
impl ElementExporter for ImageExporter {
	type Element = EmbeddedImage;
	type Staged = StagedMedia;

	const KIND: ElementKind = ElementKind::Image;

	fn describe(element: &Self::Element) -> String {
		element.media_id.to_string()
	}

	/// The image as it looked when the record revision was saved
	async fn audited(
		&self,
		ctx: &FieldExportContext<'_>,
		element: &Self::Element,
	) -> Result<Option<Self::Element>> {
		Ok(ctx
			.services
			.audit
			.media_at(element.media_id.db_id, ctx.revision_date)
			.await?
			.map(|media| EmbeddedImage {
				media_id: element.media_id.with_version(media.version),
				..element.clone()
			}))
	}

	fn is_permitted(&self, ctx: &FieldExportContext<'_>, element: &Self::Element) -> bool {
		ctx.closure.is_field_attachment(&element.media_id)
	}

	async fn stage(
		&self,
		ctx: &mut FieldExportContext<'_>,
		element: &Self::Element,
	) -> Result<Self::Staged> {
		stage_media(ctx, &element.media_id).await
	}

	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String> {
		Some(set_attribute(original_link, "src", staged.display_link()))
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		ctx.field.images.push(ArchivalImage {
			id: staged.media.global_id().to_string(),
			name: staged.media.name,
			link: staged.link,
			png_link: staged.png_link,
			width: element.width,
			height: element.height,
		});
	}
}
