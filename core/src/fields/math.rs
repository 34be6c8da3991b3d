use crate::{archival::ArchivalMath, error::Result};

use async_trait::async_trait;

use super::{
	element::{ElementKind, EmbeddedMath},
	markup::set_attribute,
	with_revision_fallback, ElementExporter, FieldExportContext,
};

pub struct MathExporter;

pub struct StagedMath {
	latex: String,
	svg_link: String,
}

#[async_trait]
impl ElementExporter for MathExporter {
	type Element = EmbeddedMath;
	type Staged = StagedMath;

	const KIND: ElementKind = ElementKind::Math;

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
		let math = with_revision_fallback(ctx.revision, &element.id, |revision| {
			services.elements.math(&element.id, revision)
		})
		.await?;

		let svg = ctx
			.stager()
			.stage_bytes(
				math.svg.as_bytes(),
				ctx.record_dir,
				&format!("math_{}.svg", element.id.unversioned()),
			)
			.await?;

		Ok(StagedMath {
			latex: math.latex,
			svg_link: svg.file_name,
		})
	}

	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String> {
		Some(set_attribute(original_link, "src", &staged.svg_link))
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		ctx.field.maths.push(ArchivalMath {
			id: element.id.unversioned().to_string(),
			latex: staged.latex,
			svg_link: staged.svg_link,
		});
	}
}
