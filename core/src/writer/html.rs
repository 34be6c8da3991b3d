//! Browsable HTML rendition: a page per record plus `index.html` and `a-zIndex.html`.
//!
//! Record pages carry no export date so identical content renders identically.

use crate::{
	archival::{
		ArchivalDocument, ArchivalField, ArchivalGalleryMetadata, ArchivedPayload, ExportedRecord,
	},
	error::Result,
	model::{FieldType, MediaType},
};

use std::{fmt::Write as _, path::Path};

use async_trait::async_trait;
use quick_xml::escape::escape;
use tracing::{debug, trace};

use super::{write_manifest, ArchiveIndex, ArchiveWriter, OutputFiles};

pub const INDEX_FILE: &str = "index.html";
pub const A_Z_INDEX_FILE: &str = "a-zIndex.html";

const STYLE: &str = "body{font-family:sans-serif;margin:2em;max-width:60em}\
table.metadata th{text-align:left;padding-right:1em}\
section.field{border-top:1px solid #ccc;margin-top:1em}\
.skipped{color:#a33}";

pub struct HtmlWriter {
	files: OutputFiles,
}

impl HtmlWriter {
	#[must_use]
	pub const fn new(files: OutputFiles) -> Self {
		Self { files }
	}
}

#[async_trait]
impl ArchiveWriter for HtmlWriter {
	async fn write_record(&self, assembly_dir: &Path, record: &ExportedRecord) -> Result<()> {
		let html = match &record.payload {
			ArchivedPayload::Document(document) => document_page(document),
			ArchivedPayload::Media(media) => media_page(media),
		};

		let path = assembly_dir.join(&record.folder).join(&record.page);
		self.files.write(&path, html.as_bytes()).await?;

		trace!(id = %record.id, path = %path.display(), "Wrote record page;");
		Ok(())
	}

	async fn write_indexes(&self, index: &ArchiveIndex<'_>) -> Result<()> {
		self.files
			.write(
				&index.assembly_dir.join(INDEX_FILE),
				folder_index(index).as_bytes(),
			)
			.await?;
		self.files
			.write(
				&index.assembly_dir.join(A_Z_INDEX_FILE),
				a_z_index(index.records).as_bytes(),
			)
			.await?;

		write_manifest(&self.files, index).await?;

		debug!(records = index.records.len(), "Wrote html indexes;");
		Ok(())
	}
}

fn page(title: &str, body: &str) -> String {
	format!(
		"<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
		<title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
		escape(title)
	)
}

fn metadata_table(rows: &[(&str, String)]) -> String {
	let mut table = String::from("<table class=\"metadata\">\n");
	for (label, value) in rows {
		let _ = writeln!(table, "<tr><th>{label}</th><td>{}</td></tr>", escape(value.as_str()));
	}
	table.push_str("</table>\n");
	table
}

fn document_page(document: &ArchivalDocument) -> String {
	let mut rows = vec![
		("Global ID", document.id.clone()),
		("Owner", document.owner.clone()),
		("Form", document.form_name.clone()),
		("Version", document.version.to_string()),
	];
	if let Some(revision) = document.revision {
		rows.push(("Revision", revision.to_string()));
	}
	rows.push(("Created", document.created.clone()));
	rows.push(("Last modified", document.last_modified.clone()));
	if !document.tags.is_empty() {
		rows.push(("Tags", document.tags.join(", ")));
	}

	let mut body = format!("<h1>{}</h1>\n", escape(document.name.as_str()));
	body.push_str(&metadata_table(&rows));
	for field in &document.fields {
		body.push_str(&field_section(field));
	}
	body.push_str("<p><a href=\"../index.html\">Back to index</a></p>\n");

	page(&document.name, &body)
}

fn field_section(field: &ArchivalField) -> String {
	let mut section = format!(
		"<section class=\"field\">\n<h2>{}</h2>\n<div class=\"fieldContent\">",
		escape(field.name.as_str())
	);

	// Rich text was rewritten to archive links already, anything else is plain text
	if field.field_type == FieldType::Text.to_string() {
		section.push_str(&field.content);
	} else {
		section.push_str(&escape(field.content.as_str()));
	}
	section.push_str("</div>\n");

	if !field.comments.is_empty() {
		section.push_str("<h3>Comments</h3>\n<ul class=\"comments\">\n");
		for item in field.comments.iter().flat_map(|comment| &comment.items) {
			let _ = writeln!(
				section,
				"<li><strong>{}</strong> ({}): {}</li>",
				escape(item.author.as_str()),
				escape(item.created.as_str()),
				escape(item.text.as_str())
			);
		}
		section.push_str("</ul>\n");
	}

	if !field.nfs_elements.is_empty() {
		section.push_str("<h3>Linked remote files</h3>\n<ul class=\"nfs\">\n");
		for nfs in &field.nfs_elements {
			match (&nfs.archive_path, &nfs.skip_reason) {
				(Some(path), _) => {
					let _ = writeln!(
						section,
						"<li><a href=\"../{}\">{}</a></li>",
						escape(path.as_str()),
						escape(nfs.name.as_str())
					);
				}
				(None, Some(reason)) => {
					let _ = writeln!(
						section,
						"<li class=\"skipped\">{} ({}): not added to archive, {}</li>",
						escape(nfs.name.as_str()),
						escape(nfs.path.as_str()),
						escape(reason.as_str())
					);
				}
				(None, None) => {
					let _ = writeln!(section, "<li>{}</li>", escape(nfs.name.as_str()));
				}
			}
			if let Some(summary) = &nfs.summary {
				let _ = writeln!(section, "<pre>{}</pre>", escape(summary.as_str()));
			}
		}
		section.push_str("</ul>\n");
	}

	section.push_str("</section>\n");
	section
}

fn media_page(media: &ArchivalGalleryMetadata) -> String {
	let mut rows = vec![
		("Global ID", media.id.clone()),
		("Owner", media.owner.clone()),
		("Type", media.media_type.clone()),
		("Version", media.version.to_string()),
	];
	if let Some(revision) = media.revision {
		rows.push(("Revision", revision.to_string()));
	}
	rows.push(("Created", media.created.clone()));
	rows.push(("Last modified", media.last_modified.clone()));
	rows.push(("Size", format!("{} bytes", media.size)));
	if let Some(description) = &media.description {
		rows.push(("Description", description.clone()));
	}
	if let Some(original) = &media.original_image {
		rows.push(("Edited from", original.clone()));
	}

	let mut body = format!("<h1>{}</h1>\n", escape(media.name.as_str()));
	body.push_str(&metadata_table(&rows));

	if media.media_type == MediaType::Image.to_string() {
		let shown = media.png_file_name.as_deref().unwrap_or(&media.file_name);
		let _ = writeln!(
			body,
			"<p><img src=\"{}\" alt=\"{}\"></p>",
			escape(shown),
			escape(media.name.as_str())
		);
	}
	let _ = writeln!(
		body,
		"<p><a href=\"{}\">Download {}</a></p>",
		escape(media.file_name.as_str()),
		escape(media.file_name.as_str())
	);
	body.push_str("<p><a href=\"../index.html\">Back to index</a></p>\n");

	page(&media.name, &body)
}

fn record_item(record: &ExportedRecord) -> String {
	let revision = record
		.revision
		.map(|revision| format!(", revision {revision}"))
		.unwrap_or_default();

	format!(
		"<li><a href=\"{}\">{}</a> ({}{revision})</li>\n",
		escape(record.page_path().as_str()),
		escape(record.name()),
		record.id
	)
}

/// Records grouped under their folders, folders in tree order
fn folder_index(index: &ArchiveIndex<'_>) -> String {
	let mut body = String::from("<h1>Exported records</h1>\n");
	if let Some(description) = &index.config.description {
		let _ = writeln!(body, "<p>{}</p>", escape(description.as_str()));
	}
	let _ = writeln!(
		body,
		"<p>Exported by {} on {}. <a href=\"{A_Z_INDEX_FILE}\">A-Z index</a></p>",
		escape(index.config.exporter.as_str()),
		index.export_date.format("%Y-%m-%d %H:%M:%S UTC")
	);

	for folder in index.closure.folders() {
		let items = index
			.records
			.iter()
			.filter(|record| record.parent_folder_id == Some(folder.id))
			.map(record_item)
			.collect::<String>();
		if items.is_empty() {
			continue;
		}
		let _ = write!(
			body,
			"<h2>{}</h2>\n<ul>\n{items}</ul>\n",
			escape(folder.name.as_str())
		);
	}

	let unfiled = index
		.records
		.iter()
		.filter(|record| {
			record
				.parent_folder_id
				.map_or(true, |id| index.closure.folder(id).is_none())
		})
		.map(record_item)
		.collect::<String>();
	if !unfiled.is_empty() {
		let _ = write!(body, "<h2>Other records</h2>\n<ul>\n{unfiled}</ul>\n");
	}

	page("Exported records", &body)
}

fn a_z_index(records: &[ExportedRecord]) -> String {
	let mut sorted = records.iter().collect::<Vec<_>>();
	sorted.sort_by_cached_key(|record| (record.name().to_lowercase(), record.id, record.revision));

	let mut body = String::from("<h1>Records A-Z</h1>\n<ul>\n");
	for record in sorted {
		body.push_str(&record_item(record));
	}
	body.push_str("</ul>\n<p><a href=\"index.html\">Folder index</a></p>\n");

	page("Records A-Z", &body)
}
