mod common;

use common::{Lab, ALICE, ALICE_ROOT, EXPERIMENTS};

use labex_core::{
	closure::ExportClosurePlanner,
	model::{FolderType, Group},
	testing, ArchiveFormat, Error, ExportConfig, ExportScope, ExportSelection, GlobalIdPrefix,
	GlobalIdentifier,
};

fn sd(id: u64) -> GlobalIdentifier {
	GlobalIdentifier::new(GlobalIdPrefix::SD, id)
}

fn link_to(id: u64) -> String {
	format!(r##"<p>see <a class="linkedRecord" data-globalid="SD{id}" data-name="Doc {id}" href="#">Doc {id}</a></p>"##)
}

/// Three documents linking in a chain: 10 -> 11 -> 12
async fn chained_lab() -> Lab {
	let lab = Lab::new().await;
	lab.document(testing::document(
		10,
		"First",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(1, &link_to(11))],
	))
	.await;
	lab.document(testing::document(
		11,
		"Second",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(2, &link_to(12))],
	))
	.await;
	lab.document(testing::document(12, "Third", ALICE, Some(EXPERIMENTS), vec![]))
		.await;
	lab
}

fn selection(ids: &[GlobalIdentifier]) -> ExportSelection {
	ExportSelection::Selection { ids: ids.to_vec() }
}

#[tokio::test]
async fn user_scope_skips_system_and_deleted_content() {
	let lab = Lab::new().await;
	lab.kit
		.add_folder(testing::folder(3, "Shared", ALICE, Some(ALICE_ROOT), FolderType::Shared))
		.await;
	lab.kit
		.add_folder(testing::folder(
			4,
			"Templates",
			ALICE,
			Some(ALICE_ROOT),
			FolderType::Templates,
		))
		.await;

	lab.document(testing::document(10, "Kept", ALICE, Some(EXPERIMENTS), vec![]))
		.await;
	lab.document(testing::document(11, "Shared copy", ALICE, Some(3), vec![]))
		.await;
	lab.document(testing::document(12, "Template", ALICE, Some(4), vec![]))
		.await;
	let mut deleted = testing::document(13, "Gone", ALICE, Some(EXPERIMENTS), vec![]);
	deleted.deleted = true;
	lab.document(deleted).await;

	let services = lab.kit.collaborators();
	let config = ExportConfig::new(ExportScope::User, ArchiveFormat::Xml, ALICE);
	let alice = testing::user(ALICE);

	let closure = ExportClosurePlanner::new(&services, &config, &alice)
		.plan(&ExportSelection::User {
			username: ALICE.to_string(),
		})
		.await
		.unwrap();

	assert_eq!(closure.records().copied().collect::<Vec<_>>(), vec![sd(10)]);
	assert_eq!(
		closure.folders().map(|folder| folder.id).collect::<Vec<_>>(),
		vec![ALICE_ROOT, EXPERIMENTS]
	);
}

#[tokio::test]
async fn planning_is_idempotent() {
	let lab = chained_lab().await;
	let services = lab.kit.collaborators();
	let config = ExportConfig::new(ExportScope::User, ArchiveFormat::Html, ALICE);
	let alice = testing::user(ALICE);
	let planner = ExportClosurePlanner::new(&services, &config, &alice);
	let user = ExportSelection::User {
		username: ALICE.to_string(),
	};

	let first = planner.plan(&user).await.unwrap();
	let second = planner.plan(&user).await.unwrap();

	assert_eq!(
		first.records().collect::<Vec<_>>(),
		second.records().collect::<Vec<_>>()
	);
	assert_eq!(
		first.folders().collect::<Vec<_>>(),
		second.folders().collect::<Vec<_>>()
	);
	assert_eq!(first.record_count(), 3);
}

#[tokio::test]
async fn link_depth_bounds_followed_records() {
	let lab = chained_lab().await;
	let services = lab.kit.collaborators();
	let alice = testing::user(ALICE);

	for (depth, expected) in [(0, vec![10]), (1, vec![10, 11]), (2, vec![10, 11, 12])] {
		let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, ALICE)
			.with_max_link_level(depth);
		let closure = ExportClosurePlanner::new(&services, &config, &alice)
			.plan(&selection(&[sd(10)]))
			.await
			.unwrap();

		assert_eq!(
			closure.records().map(|id| id.db_id).collect::<Vec<_>>(),
			expected,
			"link depth {depth}"
		);
	}
}

#[tokio::test]
async fn unreadable_selection_aborts_planning() {
	let lab = chained_lab().await;
	lab.kit.deny(ALICE, sd(10)).await;
	let services = lab.kit.collaborators();
	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, ALICE);
	let alice = testing::user(ALICE);

	let err = ExportClosurePlanner::new(&services, &config, &alice)
		.plan(&selection(&[sd(10)]))
		.await
		.unwrap_err();

	assert!(matches!(err, Error::Permission { id, .. } if id == sd(10)));
	assert!(err.is_fatal());
}

#[tokio::test]
async fn unreadable_link_target_is_left_out() {
	let lab = chained_lab().await;
	lab.kit.deny(ALICE, sd(11)).await;
	let services = lab.kit.collaborators();
	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Html, ALICE)
		.with_max_link_level(5);
	let alice = testing::user(ALICE);

	let closure = ExportClosurePlanner::new(&services, &config, &alice)
		.plan(&selection(&[sd(10)]))
		.await
		.unwrap();

	assert!(closure.contains_record(&sd(10)));
	assert!(!closure.contains_record(&sd(11)));
	// Only reachable through the unreadable record
	assert!(!closure.contains_record(&sd(12)));
}

#[tokio::test]
async fn deleted_selected_document_is_skipped() {
	let lab = Lab::new().await;
	let mut deleted = testing::document(20, "Gone", ALICE, Some(EXPERIMENTS), vec![]);
	deleted.deleted = true;
	lab.document(deleted).await;
	lab.document(testing::document(21, "Here", ALICE, Some(EXPERIMENTS), vec![]))
		.await;

	let services = lab.kit.collaborators();
	let config = ExportConfig::new(ExportScope::Selection, ArchiveFormat::Xml, ALICE);
	let alice = testing::user(ALICE);

	let closure = ExportClosurePlanner::new(&services, &config, &alice)
		.plan(&selection(&[sd(20), sd(21), sd(99)]))
		.await
		.unwrap();

	assert_eq!(closure.records().copied().collect::<Vec<_>>(), vec![sd(21)]);
	// The parent folder of a picked record is kept for the indexes
	assert!(closure.folder(EXPERIMENTS).is_some());
}

#[tokio::test]
async fn group_scope_skips_unreadable_members() {
	let lab = Lab::new().await;
	lab.kit.add_user(testing::user("bob")).await;
	lab.kit
		.add_folder(testing::folder(50, "Bob's home", "bob", None, FolderType::Root))
		.await;
	lab.document(testing::document(10, "Mine", ALICE, Some(EXPERIMENTS), vec![]))
		.await;
	lab.document(testing::document(51, "Bob's", "bob", Some(50), vec![]))
		.await;
	lab.kit
		.add_group(Group {
			id: 7,
			name: "Lab".to_string(),
			members: vec![testing::user(ALICE), testing::user("bob")],
		})
		.await;
	lab.kit
		.deny(ALICE, GlobalIdentifier::new(GlobalIdPrefix::FL, 50))
		.await;

	let services = lab.kit.collaborators();
	let config = ExportConfig::new(ExportScope::Group, ArchiveFormat::Xml, ALICE);
	let alice = testing::user(ALICE);

	let closure = ExportClosurePlanner::new(&services, &config, &alice)
		.plan(&ExportSelection::Group { group_id: 7 })
		.await
		.unwrap();

	assert_eq!(closure.records().copied().collect::<Vec<_>>(), vec![sd(10)]);
}

#[tokio::test]
async fn group_scope_skips_members_without_a_home_folder() {
	let lab = Lab::new().await;
	lab.kit.add_user(testing::user("carol")).await;
	lab.document(testing::document(10, "Mine", ALICE, Some(EXPERIMENTS), vec![]))
		.await;
	lab.kit
		.add_group(Group {
			id: 7,
			name: "Lab".to_string(),
			members: vec![testing::user("carol"), testing::user(ALICE)],
		})
		.await;

	let services = lab.kit.collaborators();
	let config = ExportConfig::new(ExportScope::Group, ArchiveFormat::Xml, ALICE);
	let alice = testing::user(ALICE);

	let closure = ExportClosurePlanner::new(&services, &config, &alice)
		.plan(&ExportSelection::Group { group_id: 7 })
		.await
		.unwrap();

	assert_eq!(closure.records().copied().collect::<Vec<_>>(), vec![sd(10)]);
}

#[tokio::test]
async fn embedded_media_joins_full_exports() {
	let lab = Lab::new().await;
	lab.kit
		.add_folder(testing::folder(60, "Gallery", "bob", None, FolderType::Gallery))
		.await;
	lab.media(testing::media(61, "plate.png", "bob", Some(60), 3), b"png")
		.await;
	lab.document(testing::document(
		10,
		"Assay",
		ALICE,
		Some(EXPERIMENTS),
		vec![testing::text_field(
			1,
			r#"<img class="imageDropped" data-id="GL61" src="/image/61">"#,
		)],
	))
	.await;

	let services = lab.kit.collaborators();
	let config = ExportConfig::new(ExportScope::User, ArchiveFormat::Xml, ALICE);
	let alice = testing::user(ALICE);

	let closure = ExportClosurePlanner::new(&services, &config, &alice)
		.plan(&ExportSelection::User {
			username: ALICE.to_string(),
		})
		.await
		.unwrap();

	let gl = GlobalIdentifier::new(GlobalIdPrefix::GL, 61);
	assert!(closure.is_field_attachment(&gl));
	// Media goes first so documents can link to it
	assert_eq!(closure.records().next(), Some(&gl));
}
