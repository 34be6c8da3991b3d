//! RO-Crate graph of an ELN archive.
//!
//! Records are added while they are exported, so a record may link to one that has no
//! dataset yet. Such edges are kept by global id and only resolved in
//! [`RoCrateBuilder::finalize`]; targets that never got exported are dropped.

use crate::{
	archival::{ArchivedPayload, ExportedRecord},
	config::ExportConfig,
	identifier::GlobalIdentifier,
	model::User,
};

use labex_utils::chain_optional_iter;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, trace};

pub const RO_CRATE_METADATA: &str = "ro-crate-metadata.json";

const RO_CRATE_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";
const RO_CRATE_SPEC: &str = "https://w3id.org/ro/crate/1.1";
const ROOT_ID: &str = "./";
const PUBLISHER_ID: &str = "#publisher";

#[derive(Debug)]
pub struct RoCrateBuilder {
	entities: IndexMap<String, Value>,
	root_parts: Vec<String>,
	/// Dataset of the current state of every exported record
	datasets: HashMap<GlobalIdentifier, String>,
	/// `(source dataset, target record)` edges waiting for their target
	pending_mentions: Vec<(String, GlobalIdentifier)>,
}

impl RoCrateBuilder {
	#[must_use]
	pub fn new(archive_name: &str, config: &ExportConfig, export_date: DateTime<Utc>) -> Self {
		let mut entities = IndexMap::new();

		entities.insert(
			RO_CRATE_METADATA.to_string(),
			json!({
				"@id": RO_CRATE_METADATA,
				"@type": "CreativeWork",
				"conformsTo": { "@id": RO_CRATE_SPEC },
				"about": { "@id": ROOT_ID },
				"dateCreated": export_date.to_rfc3339(),
				"sdPublisher": { "@id": PUBLISHER_ID },
				"version": "1.0",
			}),
		);

		entities.insert(
			PUBLISHER_ID.to_string(),
			json!({
				"@id": PUBLISHER_ID,
				"@type": "Organization",
				"name": "labex",
				"version": env!("CARGO_PKG_VERSION"),
			}),
		);

		entities.insert(
			ROOT_ID.to_string(),
			json!({
				"@id": ROOT_ID,
				"@type": "Dataset",
				"name": archive_name,
				"description": config.description.clone().unwrap_or_default(),
				"datePublished": export_date.to_rfc3339(),
				"author": { "@id": person_id(&config.exporter) },
			}),
		);

		Self {
			entities,
			root_parts: Vec::new(),
			datasets: HashMap::new(),
			pending_mentions: Vec::new(),
		}
	}

	/// Registers a record's dataset and the files of its folder
	pub fn add_record(&mut self, record: &ExportedRecord) {
		let dataset_id = format!("./{}/", record.folder);
		let mut parts = vec![self.add_file(&record.folder, &record.page, "application/xml")];

		let (kind, owner) = match &record.payload {
			ArchivedPayload::Document(document) => {
				for field in &document.fields {
					let local_files = field
						.images
						.iter()
						.flat_map(|image| std::iter::once(&image.link).chain(&image.png_link))
						.chain(field.attachments.iter().flat_map(|attachment| {
							std::iter::once(&attachment.link).chain(&attachment.png_link)
						}))
						.chain(field.chems.iter().flat_map(|chem| [&chem.image_link, &chem.data_link]))
						.chain(field.maths.iter().map(|math| &math.svg_link))
						.chain(field.sketches.iter().map(|sketch| &sketch.image_link))
						// Links leaving the folder belong to another dataset
						.filter(|link| !link.starts_with("../"))
						.cloned()
						.collect::<Vec<_>>();

					for file in local_files {
						parts.push(self.add_file(&record.folder, &file, media_type_of(&file)));
					}

					for link in &field.links {
						if let Ok(target) = link.target.parse::<GlobalIdentifier>() {
							self.pending_mentions.push((dataset_id.clone(), target));
						}
					}
					for image in &field.images {
						if let Ok(target) = image.id.parse::<GlobalIdentifier>() {
							self.pending_mentions.push((dataset_id.clone(), target));
						}
					}
				}
				("Document", document.owner.clone())
			}
			ArchivedPayload::Media(media) => {
				for file in chain_optional_iter([&media.file_name], [media.png_file_name.as_ref()]) {
					parts.push(self.add_file(&record.folder, file, media_type_of(file)));
				}
				("GalleryFile", media.owner.clone())
			}
		};

		let person = person_id(&owner);
		self.entities
			.entry(person.clone())
			.or_insert_with(|| json!({ "@id": person, "@type": "Person", "name": owner }));

		let mut dataset = json!({
			"@id": dataset_id,
			"@type": "Dataset",
			"name": record.name(),
			"identifier": record.id.unversioned().to_string(),
			"genre": kind,
			"dateModified": record.modified.to_rfc3339(),
			"author": { "@id": person },
			"hasPart": parts.iter().map(|id| json!({ "@id": id })).collect::<Vec<_>>(),
		});
		if let Some(revision) = record.revision {
			dataset["version"] = json!(revision.to_string());
		}

		if record.revision.is_none() {
			self.datasets.insert(record.id.unversioned(), dataset_id.clone());
		}
		self.entities.insert(dataset_id.clone(), dataset);
		self.root_parts.push(dataset_id);

		trace!(id = %record.id, "Added record to RO-Crate;");
	}

	fn add_file(&mut self, folder: &str, file: &str, encoding: &str) -> String {
		let id = format!("./{folder}/{file}");
		self.entities.entry(id.clone()).or_insert_with(|| {
			json!({
				"@id": id,
				"@type": "File",
				"name": file,
				"encodingFormat": encoding,
			})
		});
		id
	}

	/// Resolves pending mentions and renders the `ro-crate-metadata.json` document.
	///
	/// `metadata_files` are archive relative paths of the schema and manifest files.
	#[must_use]
	pub fn finalize(mut self, users: &[User], metadata_files: &[String]) -> Value {
		let mut resolved = 0;
		let mut dropped = 0;

		for (source, target) in std::mem::take(&mut self.pending_mentions) {
			let Some(target_dataset) = self.datasets.get(&target.unversioned()).cloned() else {
				dropped += 1;
				continue;
			};
			if target_dataset == source {
				continue;
			}

			if let Some(Value::Object(entity)) = self.entities.get_mut(&source) {
				let mentions = entity
					.entry("mentions")
					.or_insert_with(|| Value::Array(Vec::new()));
				if let Value::Array(mentions) = mentions {
					let edge = json!({ "@id": target_dataset });
					if !mentions.contains(&edge) {
						mentions.push(edge);
						resolved += 1;
					}
				}
			}
		}

		for user in users {
			if let Some(Value::Object(person)) = self.entities.get_mut(&person_id(&user.username)) {
				person.insert("name".into(), json!(user.full_name));
				person.insert("email".into(), json!(user.email));
				person.insert("alternateName".into(), json!(user.username));
			}
		}

		let mut root_parts = self
			.root_parts
			.iter()
			.map(|id| json!({ "@id": id }))
			.collect::<Vec<_>>();
		for path in metadata_files {
			let id = format!("./{path}");
			self.entities.entry(id.clone()).or_insert_with(|| {
				json!({ "@id": id, "@type": "File", "name": path, "encodingFormat": media_type_of(path) })
			});
			root_parts.push(json!({ "@id": id }));
		}
		if let Some(root) = self.entities.get_mut(ROOT_ID) {
			root["hasPart"] = Value::Array(root_parts);
		}

		debug!(resolved, dropped, entities = self.entities.len(), "Finalized RO-Crate graph;");

		json!({
			"@context": RO_CRATE_CONTEXT,
			"@graph": self.entities.into_values().collect::<Vec<_>>(),
		})
	}
}

fn person_id(username: &str) -> String {
	format!("#person-{username}")
}

fn media_type_of(file: &str) -> &'static str {
	match labex_utils::split_extension(file).1.map(str::to_ascii_lowercase).as_deref() {
		Some("xml" | "xsd") => "application/xml",
		Some("html") => "text/html",
		Some("txt") => "text/plain",
		Some("json") => "application/json",
		Some("png") => "image/png",
		Some("jpg" | "jpeg") => "image/jpeg",
		Some("gif") => "image/gif",
		Some("svg") => "image/svg+xml",
		Some("tif" | "tiff") => "image/tiff",
		Some("pdf") => "application/pdf",
		Some("csv") => "text/csv",
		_ => "application/octet-stream",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		archival::{ArchivalDocument, ArchivalField, ArchivalLink},
		config::ExportScope,
		identifier::GlobalIdPrefix,
	};

	fn document(id: u64, links: &[u64]) -> ExportedRecord {
		ExportedRecord {
			id: GlobalIdentifier::new(GlobalIdPrefix::SD, id),
			revision: None,
			payload: ArchivedPayload::Document(ArchivalDocument {
				id: format!("SD{id}"),
				name: format!("doc {id}"),
				owner: "alice".into(),
				fields: vec![ArchivalField {
					links: links
						.iter()
						.map(|target| ArchivalLink {
							target: format!("SD{target}"),
							name: String::new(),
							link: String::new(),
						})
						.collect(),
					..ArchivalField::default()
				}],
				..ArchivalDocument::default()
			}),
			folder: format!("doc_{id}-aaaaaa"),
			file: format!("doc_{id}.xml"),
			page: format!("doc_{id}.xml"),
			parent_folder_id: None,
			modified: Utc::now(),
		}
	}

	#[test]
	fn resolves_forward_links_and_drops_missing_targets() {
		let config = ExportConfig::eln(ExportScope::Selection, "alice");
		let mut builder = RoCrateBuilder::new("archive", &config, Utc::now());

		// SD1 links to SD2, exported after it, and to SD3, never exported
		builder.add_record(&document(1, &[2, 3]));
		builder.add_record(&document(2, &[]));

		let graph = builder.finalize(&[], &["schemas/manifest.txt".to_string()]);
		let entities = graph["@graph"].as_array().unwrap();
		let first = entities
			.iter()
			.find(|entity| entity["@id"] == "./doc_1-aaaaaa/")
			.unwrap();

		assert_eq!(first["mentions"], json!([{ "@id": "./doc_2-aaaaaa/" }]));

		let root = entities.iter().find(|entity| entity["@id"] == "./").unwrap();
		assert_eq!(root["hasPart"].as_array().unwrap().len(), 3);
	}
}
