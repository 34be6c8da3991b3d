mod common;

use common::{zip_entries, zip_entry, Lab, ALICE, EXPERIMENTS};

use labex_core::{
	archival::ArchivedPayload,
	fields::element::MathElement,
	nfs::NfsSkipReason,
	testing, ArchiveFormat, Error, ExportConfig, ExportScope, ExportSelection, FixedDiskSpace,
	GlobalIdPrefix, GlobalIdentifier, NonCriticalExportError, SharedProgress,
};

use std::sync::Arc;

use serde_json::Value;

fn sd(id: u64) -> GlobalIdentifier {
	GlobalIdentifier::new(GlobalIdPrefix::SD, id)
}

fn selection(ids: &[GlobalIdentifier]) -> ExportSelection {
	ExportSelection::Selection { ids: ids.to_vec() }
}

async fn lab_with_imaged_document() -> Lab {
	let lab = Lab::new().await;
	lab.media(
		testing::media(30, "plate.png", ALICE, Some(EXPERIMENTS), 9),
		b"not a png",
	)
	.await;
	lab.document(testing::document(
		10,
		"Assay",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(
			1,
			r#"<p>Result:</p><img class="imageDropped" data-id="GL30" src="/image/30">"#,
		)],
	))
	.await;
	lab
}

#[tokio::test]
async fn html_export_of_a_single_document() {
	let lab = lab_with_imaged_document().await;
	let progress = Arc::new(SharedProgress::new());
	let exporter = lab.exporter().with_progress(progress.clone());
	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, ALICE);

	let result = exporter.export(&selection(&[sd(10)]), &config).await.unwrap();

	assert!(result.export_file.exists());
	assert_eq!(result.export_file.extension().unwrap(), "zip");
	assert_eq!(result.archived_records.len(), 1);
	assert!(result.warnings.is_empty());
	assert!((progress.percent_complete() - 100.0).abs() < f32::EPSILON);

	let record = &result.archived_records[0];
	let entries = zip_entries(&result.export_file);
	// A lone record is zipped without the enclosing folder
	assert!(entries.contains(&"index.html".to_string()));
	assert!(entries.contains(&"a-zIndex.html".to_string()));
	assert!(entries.contains(&"manifest.txt".to_string()));
	assert!(entries.contains(&format!("{}/Assay.html", record.folder)));
	// Not selected on its own, so it travels inside the document's folder
	assert!(entries.contains(&format!("{}/plate.png", record.folder)));

	let page = zip_entry(&result.export_file, "Assay.html");
	assert!(page.contains(r#"src="plate.png""#));
	assert!(!page.contains("/image/30"));

	let index = zip_entry(&result.export_file, "index.html");
	assert!(index.contains(&format!("{}/Assay.html", record.folder)));

	// Assembly folder is gone, only the zip is left
	let leftovers = std::fs::read_dir(lab.archive_root()).unwrap().count();
	assert_eq!(leftovers, 1);

	assert_eq!(lab.kit.saved_checksums().await, vec![result.checksum.clone()]);
	let notifications = lab.kit.notifications().await;
	assert_eq!(notifications.len(), 1);
	assert_eq!(notifications[0].username, ALICE);
}

#[tokio::test]
async fn unreadable_embedded_media_travels_with_the_document() {
	let lab = Lab::new().await;
	lab.media(testing::media(30, "plate.png", "bob", None, 9), b"not a png")
		.await;
	lab.document(testing::document(
		10,
		"Assay",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(
			1,
			r#"<img class="imageDropped" data-id="GL30" src="/image/30">"#,
		)],
	))
	.await;
	lab.kit
		.deny(ALICE, GlobalIdentifier::new(GlobalIdPrefix::GL, 30))
		.await;

	let config = ExportConfig::new(ExportScope::User, ArchiveFormat::Html, ALICE);
	let result = lab
		.exporter()
		.export(
			&ExportSelection::User {
				username: ALICE.to_string(),
			},
			&config,
		)
		.await
		.unwrap();

	// Only the document gets its own folder, the image is copied next to it
	assert_eq!(result.archived_records.len(), 1);
	let record = &result.archived_records[0];
	let entries = zip_entries(&result.export_file);
	assert!(entries.contains(&format!("{}/plate.png", record.folder)));
	assert!(!entries.iter().any(|entry| entry.starts_with("plate")));

	let page = zip_entry(&result.export_file, "Assay.html");
	assert!(page.contains(r#"src="plate.png""#));
	assert!(!page.contains(r#"src="../"#));
}

#[tokio::test]
async fn vanished_embedded_media_keeps_its_markup() {
	let lab = Lab::new().await;
	lab.document(testing::document(
		10,
		"Assay",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(
			1,
			r#"<img class="imageDropped" data-id="GL99" src="/image/99">"#,
		)],
	))
	.await;

	let config = ExportConfig::new(ExportScope::User, ArchiveFormat::Html, ALICE);
	let result = lab
		.exporter()
		.export(
			&ExportSelection::User {
				username: ALICE.to_string(),
			},
			&config,
		)
		.await
		.unwrap();

	assert!(matches!(
		result.warnings.as_slice(),
		[NonCriticalExportError::Element { element, .. }] if element == "GL99"
	));
	let page = zip_entry(&result.export_file, "Assay.html");
	assert!(page.contains(r#"src="/image/99""#));
}

#[tokio::test]
async fn content_checksum_is_stable_across_runs() {
	let lab = lab_with_imaged_document().await;
	let exporter = lab.exporter();
	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, ALICE);

	let first = exporter.export(&selection(&[sd(10)]), &config).await.unwrap();
	let second = exporter.export(&selection(&[sd(10)]), &config).await.unwrap();

	assert_ne!(first.export_file, second.export_file);
	assert_ne!(first.checksum.archive_id, second.checksum.archive_id);
	assert_eq!(
		first.checksum.content_checksum,
		second.checksum.content_checksum
	);
}

#[tokio::test]
async fn oversized_remote_file_is_skipped_and_its_link_kept() {
	let lab = Lab::new().await;
	lab.kit.nfs_session(ALICE, 2).await;
	lab.kit.nfs_file(2, "/data/big.bin", &[0; 64]).await;
	lab.kit.nfs_file(2, "/data/small.csv", b"a,b").await;
	lab.document(testing::document(
		10,
		"Run log",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(
			1,
			concat!(
				r#"<a class="nfs_file" data-fsid="2" data-path="/data/big.bin" href="/nfs/big">big</a>"#,
				r#" <a class="nfs_file" data-fsid="2" data-path="/data/small.csv" href="/nfs/small">small</a>"#,
			),
		)],
	))
	.await;

	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Xml, ALICE)
		.with_nfs_links(10, &[]);
	let result = lab
		.exporter()
		.export(&selection(&[sd(10)]), &config)
		.await
		.unwrap();

	assert_eq!(result.archived_nfs_files.len(), 1);
	assert_eq!(
		result.archived_nfs_files[0].archive_path.as_deref(),
		Some("nfs/2-small.csv")
	);
	assert_eq!(result.skipped_nfs_items.len(), 1);
	assert_eq!(
		result.skipped_nfs_items[0].skip_reason,
		Some(NfsSkipReason::TooLarge {
			size: 64,
			limit: 10
		})
	);

	let entries = zip_entries(&result.export_file);
	assert!(entries.contains(&"nfs/2-small.csv".to_string()));
	assert!(entries.contains(&"nfs.xml".to_string()));
	assert!(!entries.iter().any(|entry| entry.contains("big.bin")));

	let page = zip_entry(&result.export_file, "Run_log.xml");
	assert!(page.contains("/nfs/big"));
	assert!(page.contains("../nfs/2-small.csv"));

	let notification = &lab.kit.notifications().await[0];
	assert!(notification.message.contains("included: 1, skipped: 1"));
}

#[tokio::test]
async fn eln_archive_is_an_ro_crate() {
	let lab = Lab::new().await;
	lab.document(testing::document(
		10,
		"Protocol",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(
			1,
			r##"<a class="linkedRecord" data-globalid="SD11" data-name="Buffers" href="#">Buffers</a>"##,
		)],
	))
	.await;
	lab.document(testing::document(11, "Buffers", ALICE, Some(EXPERIMENTS), vec![]))
		.await;

	let config = ExportConfig::eln(ExportScope::Selection, ALICE);
	let result = lab
		.exporter()
		.export(&selection(&[sd(10)]), &config)
		.await
		.unwrap();

	assert_eq!(result.export_file.extension().unwrap(), "eln");
	assert_eq!(result.archived_records.len(), 2);

	let stem = result
		.export_file
		.file_stem()
		.unwrap()
		.to_string_lossy()
		.into_owned();
	let entries = zip_entries(&result.export_file);
	for expected in [
		"ro-crate-metadata.json",
		"schemas/manifest.txt",
		"schemas/folderTree.xml",
		"schemas/documentSchema.xsd",
	] {
		assert!(
			entries.contains(&format!("{stem}/{expected}")),
			"missing {expected}"
		);
	}

	let crate_json =
		serde_json::from_str::<Value>(&zip_entry(&result.export_file, "ro-crate-metadata.json"))
			.unwrap();
	let graph = crate_json["@graph"].as_array().unwrap();
	let dataset_of = |id: GlobalIdentifier| {
		let folder = &result
			.archived_records
			.iter()
			.find(|record| record.id == id)
			.unwrap()
			.folder;
		format!("./{folder}/")
	};

	let protocol = graph
		.iter()
		.find(|entity| entity["@id"] == dataset_of(sd(10)).as_str())
		.unwrap();
	assert_eq!(
		protocol["mentions"],
		serde_json::json!([{ "@id": dataset_of(sd(11)) }])
	);

	let root = graph.iter().find(|entity| entity["@id"] == "./").unwrap();
	assert!(root["hasPart"]
		.as_array()
		.unwrap()
		.iter()
		.any(|part| part["@id"] == "./schemas/manifest.txt"));
}

#[tokio::test]
async fn every_revision_gets_its_own_folder() {
	let lab = Lab::new().await;
	let mut draft = testing::document(10, "Draft", ALICE, Some(EXPERIMENTS), vec![]);
	draft.version = 1;
	let mut head = testing::document(10, "Final", ALICE, Some(EXPERIMENTS), vec![]);
	head.version = 2;
	lab.kit.add_document_revision(1, draft).await;
	lab.kit.add_document_revision(2, head.clone()).await;
	lab.document(head).await;

	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Xml, ALICE)
		.with_all_versions(true);
	let result = lab
		.exporter()
		.export(&selection(&[sd(10)]), &config)
		.await
		.unwrap();

	let mut revisions = result
		.archived_records
		.iter()
		.map(|record| (record.revision, record.name().to_string()))
		.collect::<Vec<_>>();
	revisions.sort();
	// The newest revision is the current state, exported once
	assert_eq!(
		revisions,
		vec![(None, "Final".to_string()), (Some(1), "Draft".to_string())]
	);

	for record in &result.archived_records {
		assert_eq!(
			record.folder.contains("-rev1-"),
			record.revision == Some(1),
			"{}",
			record.folder
		);
	}
}

#[tokio::test]
async fn pinned_version_exports_that_revision_only() {
	let lab = Lab::new().await;
	let mut draft = testing::document(10, "Draft", ALICE, Some(EXPERIMENTS), vec![]);
	draft.version = 1;
	let mut head = testing::document(10, "Final", ALICE, Some(EXPERIMENTS), vec![]);
	head.version = 2;
	lab.kit.add_document_revision(4, draft).await;
	lab.document(head).await;

	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Xml, ALICE);
	let result = lab
		.exporter()
		.export(&selection(&[sd(10).with_version(1)]), &config)
		.await
		.unwrap();

	assert_eq!(result.archived_records.len(), 1);
	assert_eq!(result.archived_records[0].revision, Some(4));
	assert_eq!(result.archived_records[0].name(), "Draft");

	// A version the audit trail doesn't know is reported, not exported
	let result = lab
		.exporter()
		.export(&selection(&[sd(10).with_version(7)]), &config)
		.await
		.unwrap();
	assert!(result.archived_records.is_empty());
	assert!(matches!(
		result.warnings.as_slice(),
		[NonCriticalExportError::Revision { .. }]
	));
}

#[tokio::test]
async fn records_reached_twice_are_exported_once() {
	let lab = Lab::new().await;
	lab.media(
		testing::media(30, "gel.png", ALICE, Some(EXPERIMENTS), 3),
		b"gel",
	)
	.await;
	let image = r#"<img class="imageDropped" data-id="GL30" src="/image/30">"#;
	lab.document(testing::document(
		10,
		"Ping",
		ALICE,
		Some(EXPERIMENTS),
		vec![
			testing::text_field(
				1,
				&format!(r##"{image}<a class="linkedRecord" data-globalid="SD11" href="#">x</a>"##),
			),
			testing::text_field(2, image),
		],
	))
	.await;
	lab.document(testing::document(
		11,
		"Pong",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(
			1,
			&format!(r##"{image}<a class="linkedRecord" data-globalid="SD10" href="#">x</a>"##),
		)],
	))
	.await;

	let config = ExportConfig::new(ExportScope::User, ArchiveFormat::Html, ALICE)
		.with_max_link_level(3);
	let result = lab
		.exporter()
		.export(
			&ExportSelection::User {
				username: ALICE.to_string(),
			},
			&config,
		)
		.await
		.unwrap();

	let mut ids = result
		.archived_records
		.iter()
		.map(|record| record.id.to_string())
		.collect::<Vec<_>>();
	ids.sort();
	assert_eq!(ids, vec!["GL30", "SD10", "SD11"]);

	// Fields link to the image's own folder instead of carrying copies
	let entries = zip_entries(&result.export_file);
	assert_eq!(
		entries.iter().filter(|entry| entry.ends_with("gel.png")).count(),
		1
	);

	let ping = result
		.archived_records
		.iter()
		.find_map(|record| match &record.payload {
			ArchivedPayload::Document(document) if document.name == "Ping" => Some(document),
			_ => None,
		})
		.unwrap();
	let gallery = &result
		.archived_records
		.iter()
		.find(|record| record.id.prefix == GlobalIdPrefix::GL)
		.unwrap()
		.folder;
	assert!(ping.fields[0]
		.content
		.contains(&format!(r#"src="../{gallery}/gel.png""#)));
}

#[tokio::test]
async fn missing_field_element_is_dropped_with_a_warning() {
	let lab = Lab::new().await;
	lab.kit
		.add_math(
			MathElement {
				id: GlobalIdentifier::new(GlobalIdPrefix::MA, 4),
				latex: "E = mc^2".to_string(),
				svg: "<svg/>".to_string(),
			},
			None,
		)
		.await;
	lab.document(testing::document(
		10,
		"Notes",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(
			1,
			concat!(
				r#"<img class="rsEquation" data-id="MA4" src="/math/4">"#,
				r#"<img class="rsEquation" data-id="MA5" src="/math/5">"#,
			),
		)],
	))
	.await;

	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Xml, ALICE);
	let result = lab
		.exporter()
		.export(&selection(&[sd(10)]), &config)
		.await
		.unwrap();

	let document = result.archived_records[0].document().unwrap();
	assert_eq!(document.fields[0].maths.len(), 1);
	assert!(document.fields[0].content.contains(r#"src="math_MA4.svg""#));
	assert!(document.fields[0].content.contains("/math/5"));

	assert!(matches!(
		result.warnings.as_slice(),
		[NonCriticalExportError::Element { element, .. }] if element == "MA5"
	));
	assert!(lab.kit.notifications().await[0].message.contains("MA5"));
}

#[tokio::test]
async fn full_volume_aborts_the_run() {
	let lab = lab_with_imaged_document().await;
	let kit = lab.kit.clone().with_disk(Arc::new(FixedDiskSpace::new(0)));
	let exporter = labex_core::ArchiveExporter::new(
		kit.collaborators(),
		labex_core::ArchiveSettings::default_with_root(lab.archive_root()),
	);
	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, ALICE);

	let err = exporter
		.export(&selection(&[sd(10)]), &config)
		.await
		.unwrap_err();

	assert!(matches!(err, Error::DiskSpace { .. }));
	assert!(lab.kit.notifications().await.is_empty());
	assert!(lab.kit.saved_checksums().await.is_empty());
}
