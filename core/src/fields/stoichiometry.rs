use crate::{archival::ArchivalStoichiometry, error::Result};

use async_trait::async_trait;

use super::{
	element::{ElementKind, StoichiometryRef, StoichiometryTable},
	with_revision_fallback, ElementExporter, FieldExportContext,
};

pub struct StoichiometryExporter;

#[async_trait]
impl ElementExporter for StoichiometryExporter {
	type Element = StoichiometryRef;
	type Staged = StoichiometryTable;

	const KIND: ElementKind = ElementKind::Stoichiometry;

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
		with_revision_fallback(ctx.revision, &element.id, |revision| {
			services.elements.stoichiometry(&element.id, revision)
		})
		.await
	}

	fn rewrite(&self, _original_link: &str, _staged: &Self::Staged) -> Option<String> {
		None
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		ctx.field.stoichiometries.push(ArchivalStoichiometry {
			id: element.id.unversioned().to_string(),
			rows: staged.rows.to_string(),
		});
	}
}
