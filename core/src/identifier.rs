//! Typed, versionable references to every exportable entity.
//!
//! The textual form is `<PREFIX><dbId>[v<version>]`, e.g. `SD123`, `GL45v2` or `FL7`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
pub enum GlobalIdPrefix {
	/// Structured document
	SD,
	/// Media file stored in the gallery
	GL,
	/// Folder
	FL,
	/// Notebook, a folder with journal semantics
	NB,
	/// Document field
	FD,
	/// Sketch drawn into a field
	SK,
	/// Comment thread attached to a field
	CM,
	/// Math equation
	MA,
	/// Chemistry structure
	CH,
	/// External workflow result
	EW,
	/// Stoichiometry table
	ST,
	/// User
	US,
	/// Group
	GP,
}

impl GlobalIdPrefix {
	#[must_use]
	pub const fn is_folder_like(self) -> bool {
		matches!(self, Self::FL | Self::NB)
	}

	#[must_use]
	pub const fn is_media(self) -> bool {
		matches!(self, Self::GL)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GlobalIdentifier {
	pub prefix: GlobalIdPrefix,
	pub db_id: u64,
	pub version: Option<u64>,
}

impl GlobalIdentifier {
	#[must_use]
	pub const fn new(prefix: GlobalIdPrefix, db_id: u64) -> Self {
		Self {
			prefix,
			db_id,
			version: None,
		}
	}

	#[must_use]
	pub const fn with_version(self, version: u64) -> Self {
		Self {
			version: Some(version),
			..self
		}
	}

	/// The same entity, without pinning any particular version
	#[must_use]
	pub const fn unversioned(self) -> Self {
		Self {
			version: None,
			..self
		}
	}

	#[must_use]
	pub fn same_entity(&self, other: &Self) -> bool {
		self.prefix == other.prefix && self.db_id == other.db_id
	}
}

impl fmt::Display for GlobalIdentifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{}", self.prefix, self.db_id)?;
		if let Some(version) = self.version {
			write!(f, "v{version}")?;
		}
		Ok(())
	}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GlobalIdParseError {
	#[error("global id is too short: <raw='{0}'>")]
	TooShort(String),
	#[error("unknown global id prefix: <raw='{0}'>")]
	UnknownPrefix(String),
	#[error("invalid numeric part in global id: <raw='{0}'>")]
	InvalidNumber(String),
}

impl FromStr for GlobalIdentifier {
	type Err = GlobalIdParseError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		let raw = raw.trim();
		if raw.len() < 3 || !raw.is_char_boundary(2) {
			return Err(GlobalIdParseError::TooShort(raw.to_owned()));
		}

		let (prefix, rest) = raw.split_at(2);
		let prefix = prefix
			.parse::<GlobalIdPrefix>()
			.map_err(|_| GlobalIdParseError::UnknownPrefix(raw.to_owned()))?;

		let (db_id, version) = match rest.split_once('v') {
			Some((id, version)) => (id, Some(version)),
			None => (rest, None),
		};

		let parse = |s: &str| {
			s.parse::<u64>()
				.map_err(|_| GlobalIdParseError::InvalidNumber(raw.to_owned()))
		};

		Ok(Self {
			prefix,
			db_id: parse(db_id)?,
			version: version.map(parse).transpose()?,
		})
	}
}

impl TryFrom<String> for GlobalIdentifier {
	type Error = GlobalIdParseError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<GlobalIdentifier> for String {
	fn from(id: GlobalIdentifier) -> Self {
		id.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_and_prints() {
		let id = "GL45v2".parse::<GlobalIdentifier>().unwrap();
		assert_eq!(id.prefix, GlobalIdPrefix::GL);
		assert_eq!(id.db_id, 45);
		assert_eq!(id.version, Some(2));
		assert_eq!(id.to_string(), "GL45v2");

		let id = "SD123".parse::<GlobalIdentifier>().unwrap();
		assert_eq!(id, GlobalIdentifier::new(GlobalIdPrefix::SD, 123));
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!(
			"XX12".parse::<GlobalIdentifier>(),
			Err(GlobalIdParseError::UnknownPrefix(_))
		));
		assert!(matches!(
			"SD".parse::<GlobalIdentifier>(),
			Err(GlobalIdParseError::TooShort(_))
		));
		assert!(matches!(
			"SD12vx".parse::<GlobalIdentifier>(),
			Err(GlobalIdParseError::InvalidNumber(_))
		));
	}

	#[test]
	fn version_does_not_change_entity() {
		let head = GlobalIdentifier::new(GlobalIdPrefix::SD, 9);
		let pinned = head.with_version(3);
		assert_ne!(head, pinned);
		assert!(head.same_entity(&pinned));
		assert_eq!(pinned.unversioned(), head);
	}

	#[test]
	fn serde_uses_textual_form() {
		let id = GlobalIdentifier::new(GlobalIdPrefix::NB, 7);
		assert_eq!(serde_json::to_string(&id).unwrap(), "\"NB7\"");
		let back: GlobalIdentifier = serde_json::from_str("\"NB7\"").unwrap();
		assert_eq!(back, id);
	}
}
