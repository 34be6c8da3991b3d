use crate::{archival::ArchivalAttachment, error::Result};

use async_trait::async_trait;

use super::{
	element::{ElementKind, EmbeddedAttachment},
	image::{stage_media, StagedMedia},
	markup::set_attribute,
	ElementExporter, FieldExportContext,
};

pub struct AttachmentExporter;

#[async_trait]
impl ElementExporter for AttachmentExporter {
	type Element = EmbeddedAttachment;
	type Staged = StagedMedia;

	const KIND: ElementKind = ElementKind::Attachment;

	fn describe(element: &Self::Element) -> String {
		element.media_id.to_string()
	}

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
			.map(|media| EmbeddedAttachment {
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

	/// Attachments are downloads, the link keeps pointing at the original file
	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String> {
		Some(set_attribute(original_link, "href", &staged.link))
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		let id = staged.media.global_id().to_string();
		let name = if element.name.is_empty() {
			staged.media.name
		} else {
			element.name.clone()
		};

		ctx.field.attachments.push(ArchivalAttachment {
			id,
			name,
			link: staged.link,
			png_link: staged.png_link,
		});
	}
}
