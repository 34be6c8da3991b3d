//! Element markup of rich-text fields.
//!
//! Embedded elements are recognised by the class of their opening tag:
//!
//! | element            | markup                                                                       |
//! |--------------------|------------------------------------------------------------------------------|
//! | image              | `<img class="imageDropped" data-id="GL12" data-width="300" data-height="200" src="…">` |
//! | chemistry          | `<img class="chem" data-id="CH3" src="…">`                                   |
//! | math               | `<img class="rsEquation" data-id="MA4" src="…">`                             |
//! | comment            | `<img class="commentIcon" data-id="CM6" src="…">`                            |
//! | sketch             | `<img class="sketch" data-id="SK5" src="…">`                                 |
//! | attachment         | `<a class="attachmentLinked" data-id="GL8" data-name="run.csv" href="…">`    |
//! | linked record      | `<a class="linkedRecord" data-globalid="SD9" data-name="Buffers" href="…">`  |
//! | remote file/folder | `<a class="nfs_file" data-fsid="2" data-path="/data/run.csv" href="…">`      |
//! | external workflow  | `<span class="externalWorkflow" data-id="EW1">`                              |
//! | stoichiometry      | `<div class="stoichiometry" data-id="ST2">`                                  |
//!
//! The opening tag is kept verbatim as the element's original link, exporters rewrite
//! it in place.

use crate::{collaborators::FieldParser, identifier::GlobalIdentifier};

use std::{borrow::Cow, collections::HashMap, str::FromStr};

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, unescape};
use regex::Regex;
use tracing::trace;

use super::element::{
	EmbeddedAttachment, EmbeddedChem, EmbeddedComment, EmbeddedImage, EmbeddedMath,
	EmbeddedSketch, ExternalWorkflowRef, FieldContents, Linked, LinkedRecord, NfsLink, NfsTarget,
	StoichiometryRef,
};

#[allow(clippy::unwrap_used)]
static OPENING_TAG: Lazy<Regex> =
	Lazy::new(|| Regex::new(r#"<(?:img|a|span|div)\b(?:[^>"]|"[^"]*")*>"#).unwrap());

#[allow(clippy::unwrap_used)]
static ATTRIBUTE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*"([^"]*)""#).unwrap());

/// Parser over the markup conventions listed in the module docs
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupFieldParser;

impl FieldParser for MarkupFieldParser {
	fn parse(&self, html: &str) -> FieldContents {
		let mut contents = FieldContents::default();

		for tag in OPENING_TAG.find_iter(html) {
			let tag = tag.as_str();
			let attributes = attributes(tag);
			let Some(class) = attributes.get("class") else {
				continue;
			};

			if let Err(reason) = collect(&mut contents, tag, class, &attributes) {
				trace!(%tag, reason, "Ignoring malformed field element;");
			}
		}

		contents
	}
}

fn collect(
	contents: &mut FieldContents,
	tag: &str,
	class: &str,
	attributes: &HashMap<String, String>,
) -> Result<(), &'static str> {
	let id = || -> Result<GlobalIdentifier, &'static str> {
		attributes
			.get("data-id")
			.ok_or("missing data-id")?
			.parse()
			.map_err(|_| "invalid data-id")
	};
	let text = |name: &str| attributes.get(name).cloned().unwrap_or_default();

	for class in class.split_whitespace() {
		match class {
			"imageDropped" => contents.images.push(Linked::new(
				EmbeddedImage {
					media_id: id()?,
					width: number(attributes, "data-width"),
					height: number(attributes, "data-height"),
				},
				tag,
			)),
			"chem" => contents
				.chems
				.push(Linked::new(EmbeddedChem { id: id()? }, tag)),
			"rsEquation" => contents
				.maths
				.push(Linked::new(EmbeddedMath { id: id()? }, tag)),
			"commentIcon" => contents
				.comments
				.push(Linked::new(EmbeddedComment { id: id()? }, tag)),
			"sketch" => contents
				.sketches
				.push(Linked::new(EmbeddedSketch { id: id()? }, tag)),
			"attachmentLinked" => contents.attachments.push(Linked::new(
				EmbeddedAttachment {
					media_id: id()?,
					name: text("data-name"),
				},
				tag,
			)),
			"linkedRecord" => contents.linked_records.push(Linked::new(
				LinkedRecord {
					target: attributes
						.get("data-globalid")
						.ok_or("missing data-globalid")?
						.parse()
						.map_err(|_| "invalid data-globalid")?,
					name: text("data-name"),
				},
				tag,
			)),
			"nfs_file" | "nfs_folder" => contents.nfs_links.push(Linked::new(
				NfsLink {
					target: NfsTarget {
						filesystem_id: number(attributes, "data-fsid").ok_or("missing data-fsid")?,
						path: attributes
							.get("data-path")
							.filter(|path| !path.is_empty())
							.ok_or("missing data-path")?
							.clone(),
					},
					is_folder: class == "nfs_folder",
				},
				tag,
			)),
			"externalWorkflow" => contents
				.external_workflows
				.push(Linked::new(ExternalWorkflowRef { id: id()? }, tag)),
			"stoichiometry" => contents
				.stoichiometries
				.push(Linked::new(StoichiometryRef { id: id()? }, tag)),
			_ => continue,
		}

		// One element per tag
		break;
	}

	Ok(())
}

fn number<T: FromStr>(attributes: &HashMap<String, String>, name: &str) -> Option<T> {
	attributes.get(name).and_then(|value| value.trim().parse().ok())
}

fn attributes(tag: &str) -> HashMap<String, String> {
	ATTRIBUTE
		.captures_iter(tag)
		.map(|captures| {
			let value = &captures[2];
			let value = unescape(value).unwrap_or(Cow::Borrowed(value));
			(captures[1].to_ascii_lowercase(), value.into_owned())
		})
		.collect()
}

/// Rewrites `attribute` of an opening tag, appending it when the tag doesn't carry it
#[must_use]
pub fn set_attribute(tag: &str, attribute: &str, value: &str) -> String {
	let value = escape(value);

	if let Some(captures) = ATTRIBUTE
		.captures_iter(tag)
		.find(|captures| captures[1].eq_ignore_ascii_case(attribute))
	{
		if let Some(whole) = captures.get(0) {
			return format!(
				"{}{attribute}=\"{value}\"{}",
				&tag[..whole.start()],
				&tag[whole.end()..]
			);
		}
	}

	let (head, tail) = if let Some(head) = tag.strip_suffix("/>") {
		(head.trim_end(), "/>")
	} else {
		(tag.strip_suffix('>').unwrap_or(tag).trim_end(), ">")
	};
	format!("{head} {attribute}=\"{value}\"{tail}")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identifier::GlobalIdPrefix;

	const FIELD: &str = concat!(
		r#"<p>Run <img class="imageDropped" data-id="GL12" data-width="300" data-height="200" src="/image/12">"#,
		r#" and <a class="linkedRecord" data-globalid="SD9" data-name="Buffers &amp; salts" href="/globalId/SD9">SD9</a>"#,
		r##" <a class="nfs_folder" data-fsid="2" data-path="/data/runs" href="#">runs</a>"##,
		r#" <img class="chem" src="/chem/3"></p>"#,
		r#"<div class="stoichiometry" data-id="ST2"></div>"#,
	);

	#[test]
	fn parses_known_elements() {
		let contents = MarkupFieldParser.parse(FIELD);

		assert_eq!(contents.images.len(), 1);
		let image = &contents.images[0];
		assert_eq!(
			image.element.media_id,
			GlobalIdentifier::new(GlobalIdPrefix::GL, 12)
		);
		assert_eq!(image.element.width, Some(300));
		assert!(image.original_link.ends_with(r#"src="/image/12">"#));

		assert_eq!(contents.linked_records[0].element.name, "Buffers & salts");
		assert!(contents.nfs_links[0].element.is_folder);
		assert_eq!(contents.nfs_links[0].element.target.path, "/data/runs");
		assert_eq!(contents.stoichiometries.len(), 1);

		// The chem tag has no data-id and is ignored
		assert!(contents.chems.is_empty());
		assert_eq!(contents.len(), 4);
	}

	#[test]
	fn rewrites_attributes() {
		let tag = r#"<img class="chem" data-id="CH3" src="/chem/3">"#;
		assert_eq!(
			set_attribute(tag, "src", "chem_CH3.png"),
			r#"<img class="chem" data-id="CH3" src="chem_CH3.png">"#
		);

		let tag = r#"<span class="externalWorkflow" data-id="EW1">"#;
		assert_eq!(
			set_attribute(tag, "title", "a < b"),
			r#"<span class="externalWorkflow" data-id="EW1" title="a &lt; b">"#
		);
	}
}
