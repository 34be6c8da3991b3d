use crate::{
	archival::ArchivalLink,
	error::{Error, Result},
};

use async_trait::async_trait;

use super::{
	element::{ElementKind, LinkedRecord},
	markup::set_attribute,
	ElementExporter, FieldExportContext,
};

pub struct LinkExporter;

pub struct StagedLink {
	name: String,
	link: String,
}

#[async_trait]
impl ElementExporter for LinkExporter {
	type Element = LinkedRecord;
	type Staged = StagedLink;

	const KIND: ElementKind = ElementKind::LinkedRecord;

	fn describe(element: &Self::Element) -> String {
		element.target.to_string()
	}

	/// Links survive only when their target is part of the same archive
	fn is_permitted(&self, ctx: &FieldExportContext<'_>, element: &Self::Element) -> bool {
		ctx.closure.contains_record(&element.target)
	}

	async fn stage(
		&self,
		ctx: &mut FieldExportContext<'_>,
		element: &Self::Element,
	) -> Result<Self::Staged> {
		let entity = ctx
			.services
			.records
			.get(&element.target.unversioned())
			.await?
			.ok_or(Error::NotFound(element.target))?;

		let location = ctx.layout.locate_entity(&entity).ok_or_else(|| {
			Error::Export(format!(
				"linked record has no page of its own: <id='{}'>",
				element.target
			))
		})?;

		Ok(StagedLink {
			name: entity.name().to_string(),
			link: location.link_from_sibling(),
		})
	}

	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String> {
		Some(set_attribute(original_link, "href", &staged.link))
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		ctx.field.links.push(ArchivalLink {
			target: element.target.unversioned().to_string(),
			name: staged.name,
			link: staged.link,
		});
	}
}
