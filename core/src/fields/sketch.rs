use crate::{archival::ArchivalSketch, error::Result};

use async_trait::async_trait;

use super::{
	element::{ElementKind, EmbeddedSketch},
	markup::set_attribute,
	with_revision_fallback, ElementExporter, FieldExportContext,
};

pub struct SketchExporter;

pub struct StagedSketch {
	image_link: String,
	annotations: String,
}

#[async_trait]
impl ElementExporter for SketchExporter {
	type Element = EmbeddedSketch;
	type Staged = StagedSketch;

	const KIND: ElementKind = ElementKind::Sketch;

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
		let sketch = with_revision_fallback(ctx.revision, &element.id, |revision| {
			services.elements.sketch(&element.id, revision)
		})
		.await?;

		let image = ctx
			.stager()
			.stage_bytes(
				&sketch.image_png,
				ctx.record_dir,
				&format!("sketch_{}.png", element.id.unversioned()),
			)
			.await?;

		Ok(StagedSketch {
			image_link: image.file_name,
			annotations: sketch.annotations,
		})
	}

	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String> {
		Some(set_attribute(original_link, "src", &staged.image_link))
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		ctx.field.sketches.push(ArchivalSketch {
			id: element.id.unversioned().to_string(),
			image_link: staged.image_link,
			annotations: staged.annotations,
		});
	}
}
