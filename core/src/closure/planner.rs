use crate::{
	collaborators::Collaborators,
	config::{ExportConfig, ExportScope, ExportSelection},
	error::{Error, Result},
	identifier::{GlobalIdPrefix, GlobalIdentifier},
	model::{Entity, FieldType, Folder, FolderType, Permission, User},
};

use std::collections::VecDeque;

use tracing::{debug, info, instrument, trace, warn};

use super::{ExportClosure, FolderDescriptor};

/// Computes the [`ExportClosure`] of a selection.
///
/// Any record the exporter can't read aborts planning with [`Error::Permission`],
/// except for records only reachable through links or group membership, those are
/// left out with a warning.
pub struct ExportClosurePlanner<'a> {
	services: &'a Collaborators,
	config: &'a ExportConfig,
	exporter: &'a User,
}

impl<'a> ExportClosurePlanner<'a> {
	#[must_use]
	pub const fn new(services: &'a Collaborators, config: &'a ExportConfig, exporter: &'a User) -> Self {
		Self {
			services,
			config,
			exporter,
		}
	}

	#[instrument(skip_all, fields(scope = %selection.scope(), exporter = %self.exporter.username), err)]
	pub async fn plan(&self, selection: &ExportSelection) -> Result<ExportClosure> {
		let mut closure = ExportClosure::new();

		for root in self.roots(selection).await? {
			self.add_root(&mut closure, root).await?;
		}

		self.follow_links(&mut closure).await?;

		if matches!(self.config.scope, ExportScope::User | ExportScope::Group) {
			self.add_missing_media(&mut closure).await?;
		}

		info!(
			records = closure.record_count(),
			folders = closure.folders().count(),
			field_attachments = closure.field_attachments().count(),
			"Export closure planned;"
		);

		Ok(closure)
	}

	async fn roots(&self, selection: &ExportSelection) -> Result<Vec<GlobalIdentifier>> {
		match selection {
			ExportSelection::User { username } => Ok(vec![self.root_folder(username).await?]),

			ExportSelection::Group { group_id } => {
				let group = self
					.services
					.records
					.group(*group_id)
					.await?
					.ok_or(Error::GroupNotFound(*group_id))?;

				let mut roots = Vec::with_capacity(group.members.len());
				for member in &group.members {
					let root = match self.root_folder(&member.username).await {
						Ok(root) => root,
						Err(Error::UserNotFound(_)) => {
							warn!(
								member = %member.username,
								group = %group.name,
								"Skipping group member without a home folder;"
							);
							continue;
						}
						Err(e) => return Err(e),
					};
					match self.services.records.get(&root).await? {
						Some(folder) if self.can_read(&folder).await => roots.push(root),
						_ => warn!(
							member = %member.username,
							group = %group.name,
							"Skipping group member whose records the exporter can't read;"
						),
					}
				}
				Ok(roots)
			}

			ExportSelection::Selection { ids } => Ok(ids.clone()),
		}
	}

	async fn root_folder(&self, username: &str) -> Result<GlobalIdentifier> {
		self.services
			.records
			.root_folder_id(username)
			.await?
			.map(|id| GlobalIdentifier::new(GlobalIdPrefix::FL, id))
			.ok_or_else(|| Error::UserNotFound(username.to_string()))
	}

	async fn add_root(&self, closure: &mut ExportClosure, id: GlobalIdentifier) -> Result<()> {
		let Some(entity) = self.services.records.get(&id).await? else {
			warn!(%id, "Selected record doesn't exist, skipping;");
			return Ok(());
		};

		match entity {
			Entity::Folder(folder) => self.traverse(closure, folder).await,
			Entity::Document(ref document) if document.deleted => {
				debug!(%id, "Selected document is deleted, skipping;");
				Ok(())
			}
			Entity::Document(_) | Entity::Media(_) => {
				self.ensure_readable(&entity).await?;
				self.add_parent_folder(closure, &entity).await?;
				// Keep a pinned version from the selection
				closure.add_record(match id.version {
					Some(version) => entity.global_id().with_version(version),
					None => entity.global_id(),
				});
				Ok(())
			}
		}
	}

	/// Depth first walk of a folder tree, deleted folders hide their whole subtree
	async fn traverse(&self, closure: &mut ExportClosure, root: Folder) -> Result<()> {
		let mut stack = vec![root];

		while let Some(folder) = stack.pop() {
			if !self.includes_folder(&folder) {
				trace!(folder_id = folder.id, name = %folder.name, "Folder excluded from export;");
				continue;
			}

			self.ensure_readable(&Entity::Folder(folder.clone())).await?;
			closure.add_folder(FolderDescriptor::from(&folder));

			let mut subfolders = Vec::new();
			for child in self.services.records.children(folder.id).await? {
				match child {
					Entity::Folder(subfolder) => subfolders.push(subfolder),
					Entity::Document(ref document) if document.deleted => {
						trace!(document_id = document.id, "Deleted document left out;");
					}
					Entity::Document(_) | Entity::Media(_) => {
						self.ensure_readable(&child).await?;
						closure.add_record(child.global_id());
					}
				}
			}

			// Reversed so siblings are visited in listing order
			stack.extend(subfolders.into_iter().rev());
		}

		Ok(())
	}

	fn includes_folder(&self, folder: &Folder) -> bool {
		if folder.deleted {
			return false;
		}

		match folder.folder_type {
			FolderType::Shared => false,
			FolderType::Templates | FolderType::Examples => {
				matches!(self.config.scope, ExportScope::Selection)
			}
			FolderType::Root | FolderType::Folder | FolderType::Notebook | FolderType::Gallery => {
				true
			}
		}
	}

	/// Records picked out of their folder still need the folder for indexes
	async fn add_parent_folder(&self, closure: &mut ExportClosure, entity: &Entity) -> Result<()> {
		let parent_id = match entity {
			Entity::Document(document) => document.parent_id,
			Entity::Media(media) => media.parent_id,
			Entity::Folder(_) => None,
		};

		let Some(parent_id) = parent_id else {
			return Ok(());
		};
		if closure.folder(parent_id).is_some() {
			return Ok(());
		}

		if let Some(Entity::Folder(parent)) = self
			.services
			.records
			.get(&GlobalIdentifier::new(GlobalIdPrefix::FL, parent_id))
			.await?
		{
			closure.add_folder(FolderDescriptor::from(&parent));
		}

		Ok(())
	}

	/// Breadth first scan of text fields, adding embedded items and, within the link
	/// depth, the records they link to
	async fn follow_links(&self, closure: &mut ExportClosure) -> Result<()> {
		let mut queue = closure
			.records()
			.map(|id| (id.unversioned(), 0_u32))
			.collect::<VecDeque<_>>();

		while let Some((id, depth)) = queue.pop_front() {
			let Some(Entity::Document(document)) = self.services.records.get(&id).await? else {
				continue;
			};

			for field in document.fields.iter().filter(|f| f.field_type == FieldType::Text) {
				let contents = self.services.parser.parse(&field.content);

				for attachment in contents.attachment_ids() {
					closure.add_field_attachment(attachment);
				}

				if depth >= self.config.max_link_level {
					continue;
				}

				for target in contents.linked_record_ids() {
					if closure.contains_record(&target) {
						continue;
					}

					if let Some(linked) = self.linkable(&target).await? {
						trace!(from = %id, to = %target, depth = depth + 1, "Following record link;");
						self.add_parent_folder(closure, &linked).await?;
						closure.add_record(linked.global_id());
						queue.push_back((linked.global_id(), depth + 1));
					}
				}
			}

			if self.config.all_versions {
				self.add_historical_attachments(closure, document.id).await;
			}
		}

		Ok(())
	}

	/// Older revisions may embed items the current one no longer does
	async fn add_historical_attachments(&self, closure: &mut ExportClosure, document_id: u64) {
		let history = match self.services.audit.document_history(document_id).await {
			Ok(history) => history,
			Err(e) => {
				warn!(document_id, ?e, "Failed to read document history for embedded items;");
				return;
			}
		};

		for (_, revision) in history {
			for field in revision
				.fields
				.iter()
				.filter(|f| f.field_type == FieldType::Text)
			{
				for attachment in self.services.parser.parse(&field.content).attachment_ids() {
					closure.add_field_attachment(attachment);
				}
			}
		}
	}

	/// The link target if it may join the export
	async fn linkable(&self, target: &GlobalIdentifier) -> Result<Option<Entity>> {
		let Some(entity) = self.services.records.get(target).await? else {
			warn!(%target, "Linked record doesn't exist;");
			return Ok(None);
		};

		if matches!(entity, Entity::Folder(_)) || entity.is_deleted() {
			return Ok(None);
		}

		if !self.can_read(&entity).await {
			warn!(%target, "Exporter can't read linked record, leaving it out;");
			return Ok(None);
		}

		Ok(Some(entity))
	}

	/// Gallery items embedded in exported documents are exported on their own in full
	/// exports, fields then link to that copy
	async fn add_missing_media(&self, closure: &mut ExportClosure) -> Result<()> {
		let missing = closure
			.field_attachments()
			.filter(|id| id.prefix == GlobalIdPrefix::GL && !closure.contains_record(id))
			.copied()
			.collect::<Vec<_>>();

		for id in missing {
			match self.services.records.get(&id).await? {
				Some(media @ Entity::Media(_)) if self.can_read(&media).await => {
					debug!(%id, "Adding embedded media from outside the exported folders;");
					closure.add_record(id);
				}
				// Fields carry their own copy of it, or drop it when it's gone
				_ => warn!(%id, "Embedded media is missing or unreadable on its own;"),
			}
		}

		Ok(())
	}

	async fn can_read(&self, entity: &Entity) -> bool {
		self.services
			.permissions
			.is_permitted(entity, Permission::Read, self.exporter)
			.await
	}

	async fn ensure_readable(&self, entity: &Entity) -> Result<()> {
		if self.can_read(entity).await {
			Ok(())
		} else {
			Err(Error::Permission {
				id: entity.global_id(),
				user: self.exporter.username.clone(),
			})
		}
	}
}
