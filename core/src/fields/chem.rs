use crate::{archival::ArchivalChem, error::Result};

use async_trait::async_trait;

use super::{
	element::{ChemElement, ElementKind, EmbeddedChem},
	markup::set_attribute,
	with_revision_fallback, ElementExporter, FieldExportContext,
};

pub struct ChemExporter;

pub struct StagedChem {
	chem: ChemElement,
	image_link: String,
	data_link: String,
}

#[async_trait]
impl ElementExporter for ChemExporter {
	type Element = EmbeddedChem;
	type Staged = StagedChem;

	const KIND: ElementKind = ElementKind::Chemistry;

	fn describe(element: &Self::Element) -> String {
		element.id.to_string()
	}

	fn is_permitted(&self, ctx: &FieldExportContext<'_>, element: &Self::Element) -> bool {
		ctx.closure.is_field_attachment(&element.id)
	}

	/// Writes the rendered preview and the structure in its native notation
	async fn stage(
		&self,
		ctx: &mut FieldExportContext<'_>,
		element: &Self::Element,
	) -> Result<Self::Staged> {
		let services = ctx.services;
		let chem = with_revision_fallback(ctx.revision, &element.id, |revision| {
			services.elements.chem(&element.id, revision)
		})
		.await?;

		let id = element.id.unversioned();
		let stager = ctx.stager();
		let image = stager
			.stage_bytes(&chem.image_png, ctx.record_dir, &format!("chem_{id}.png"))
			.await?;
		let data = stager
			.stage_bytes(
				chem.chem_string.as_bytes(),
				ctx.record_dir,
				&format!("chem_{id}.{}", chem.format),
			)
			.await?;

		Ok(StagedChem {
			chem,
			image_link: image.file_name,
			data_link: data.file_name,
		})
	}

	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String> {
		Some(set_attribute(original_link, "src", &staged.image_link))
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		ctx.field.chems.push(ArchivalChem {
			id: element.id.unversioned().to_string(),
			format: staged.chem.format,
			chem_string: staged.chem.chem_string,
			image_link: staged.image_link,
			data_link: staged.data_link,
		});
	}
}
