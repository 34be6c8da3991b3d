use crate::{archival::ArchivalNfsFile, error::Result, nfs::NfsResourceDetails};

use async_trait::async_trait;

use super::{
	element::{ElementKind, NfsLink},
	markup::set_attribute,
	ElementExporter, FieldExportContext,
};

pub struct NfsLinkExporter;

pub struct StagedNfs {
	details: Option<NfsResourceDetails>,
	skip_reason: Option<String>,
}

#[async_trait]
impl ElementExporter for NfsLinkExporter {
	type Element = NfsLink;
	type Staged = StagedNfs;

	const KIND: ElementKind = ElementKind::NfsLink;

	fn describe(element: &Self::Element) -> String {
		element.target.to_string()
	}

	fn is_enabled(&self, ctx: &FieldExportContext<'_>) -> bool {
		ctx.config.include_nfs_links
	}

	/// Remote files aren't stored with records, there is nothing to vet while planning
	fn is_permitted(&self, _ctx: &FieldExportContext<'_>, _element: &Self::Element) -> bool {
		true
	}

	/// Remote links are never audited, the revision is ignored
	async fn stage(
		&self,
		ctx: &mut FieldExportContext<'_>,
		element: &Self::Element,
	) -> Result<Self::Staged> {
		let (services, config) = (ctx.services, ctx.config);
		let details = ctx
			.nfs
			.resolve(services, config, &element.target, element.is_folder)
			.await?;

		let skip_reason = ctx
			.nfs
			.skip_reason(&element.target)
			.map(ToString::to_string);

		Ok(StagedNfs {
			details,
			skip_reason,
		})
	}

	/// Only downloaded files get an archive link, skipped files and folders keep
	/// pointing at the remote filesystem
	fn rewrite(&self, original_link: &str, staged: &Self::Staged) -> Option<String> {
		staged
			.details
			.as_ref()
			.and_then(|details| details.archive_path.as_deref())
			.map(|path| set_attribute(original_link, "href", &format!("../{path}")))
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		let file = match staged.details {
			Some(details) => ArchivalNfsFile {
				filesystem_id: details.target.filesystem_id,
				path: details.target.path,
				name: details.name,
				is_folder: details.is_folder,
				added_to_archive: true,
				archive_path: details.archive_path,
				skip_reason: None,
				summary: details.summary,
			},
			None => ArchivalNfsFile {
				skip_reason: staged.skip_reason,
				..ArchivalNfsFile::skipped(&element.target, element.is_folder, None)
			},
		};

		ctx.field.nfs_elements.push(file);
	}
}
