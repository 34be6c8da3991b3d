use crate::{
	archival::{ArchivalComment, ArchivalCommentItem},
	error::Result,
};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use super::{
	element::{CommentElement, ElementKind, EmbeddedComment},
	markup::set_attribute,
	with_revision_fallback, ElementExporter, FieldExportContext,
};

const COMMENT_ICON_NAME: &str = "commentIcon.svg";
const COMMENT_ICON: &[u8] = include_bytes!("../../resources/commentIcon.svg");

pub struct CommentExporter;

pub struct StagedComment {
	comment: CommentElement,
	/// `None` when the icon couldn't be written, the markup is then left as it was
	icon_link: Option<String>,
}

#[async_trait]
impl ElementExporter for CommentExporter {
	type Element = EmbeddedComment;
	type Staged = StagedComment;

	const KIND: ElementKind = ElementKind::Comment;

	fn describe(element: &Self::Element) -> String {
		element.id.to_string()
	}

	fn is_permitted(&self, ctx: &FieldExportContext<'_>, element: &Self::Element) -> bool {
		ctx.closure.is_field_attachment(&element.id)
	}

	async fn stage(
		&self,
		ctx: &mut FieldExportContext<'_>,
		element: &Self::Element,
	) -> Result<Self::Staged> {
		let services = ctx.services;
		let comment = with_revision_fallback(ctx.revision, &element.id, |revision| {
			services.elements.comment(&element.id, revision)
		})
		.await?;

		Ok(StagedComment {
			comment,
			icon_link: stage_icon(ctx).await?,
		})
	}

	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String> {
		staged
			.icon_link
			.as_deref()
			.map(|icon| set_attribute(original_link, "src", icon))
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		ctx.field.comments.push(ArchivalComment {
			id: element.id.unversioned().to_string(),
			items: staged
				.comment
				.items
				.iter()
				.map(ArchivalCommentItem::from)
				.collect(),
		});
	}
}

/// One icon per record folder, shared by all its comments
async fn stage_icon(ctx: &FieldExportContext<'_>) -> Result<Option<String>> {
	let icon_path = ctx.record_dir.join(COMMENT_ICON_NAME);
	if fs::try_exists(&icon_path).await.unwrap_or(false) {
		return Ok(Some(COMMENT_ICON_NAME.to_string()));
	}

	match ctx
		.stager()
		.stage_bytes(COMMENT_ICON, ctx.record_dir, COMMENT_ICON_NAME)
		.await
	{
		Ok(staged) => Ok(Some(staged.file_name)),
		Err(e) if e.is_fatal() => Err(e),
		Err(e) => {
			warn!(?e, "Failed to write comment icon, leaving comment markup unchanged;");
			Ok(None)
		}
	}
}
