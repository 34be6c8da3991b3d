use crate::{
	archival::ArchivalExternalWorkflow,
	error::{Error, Result},
};

use async_trait::async_trait;

use super::{
	element::{ElementKind, ExternalWorkflowData, ExternalWorkflowRef},
	ElementExporter, FieldExportContext,
};

/// Workflow results live on an external server, only their metadata is exported
pub struct ExternalWorkflowExporter;

#[async_trait]
impl ElementExporter for ExternalWorkflowExporter {
	type Element = ExternalWorkflowRef;
	type Staged = ExternalWorkflowData;

	const KIND: ElementKind = ElementKind::ExternalWorkflow;

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
		ctx.services
			.elements
			.external_workflow(&element.id)
			.await?
			.ok_or(Error::NotFound(element.id))
	}

	fn rewrite(&self, _original_link: &str, _staged: &Self::Staged) -> Option<String> {
		None
	}

	fn record(&self, ctx: &mut FieldExportContext<'_>, element: &Self::Element, staged: Self::Staged) {
		ctx.field.external_workflows.push(ArchivalExternalWorkflow {
			id: element.id.unversioned().to_string(),
			workflow_id: staged.workflow_id,
			name: staged.name,
			status: staged.status,
			server_url: staged.server_url,
		});
	}
}
