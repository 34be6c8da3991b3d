#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	clippy::expect_used,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::dbg_macro
)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod error;

/// Longest stem kept by [`sanitize_file_name`], extensions are kept whole on top of it
pub const MAX_FILE_STEM_LEN: usize = 30;

/// Combines an iterator of `T` and an iterator of `Option<T>`,
/// removing any `None` values in the process
pub fn chain_optional_iter<T>(
	required: impl IntoIterator<Item = T>,
	optional: impl IntoIterator<Item = Option<T>>,
) -> Vec<T> {
	required
		.into_iter()
		.map(Some)
		.chain(optional)
		.flatten()
		.collect()
}

/// Turns a user supplied record or file name into something safe to use as a single
/// path component on every platform we write archives for.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`, leading dots are dropped so we never
/// produce hidden files, and the stem is capped at [`MAX_FILE_STEM_LEN`] characters.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
	let name = name.trim();
	let (stem, extension) = match split_extension(name) {
		(stem, Some(ext)) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => (stem, Some(ext)),
		_ => (name, None),
	};

	let mut stem = stem
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
				c
			} else {
				'_'
			}
		})
		.skip_while(|c| *c == '.')
		.take(MAX_FILE_STEM_LEN)
		.collect::<String>();

	if stem.is_empty() {
		stem.push_str("unnamed");
	}

	match extension {
		Some(ext) => format!("{stem}.{ext}"),
		None => stem,
	}
}

/// Splits `name` into stem and extension, `None` when there is no extension or the
/// name is a dotfile.
#[must_use]
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
	match name.rfind('.') {
		Some(0) | None => (name, None),
		Some(idx) if idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
		Some(idx) => (&name[..idx], None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sanitizes_unsafe_characters() {
		assert_eq!(sanitize_file_name("My Experiment #1.txt"), "My_Experiment__1.txt");
		assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
		assert_eq!(sanitize_file_name(".hidden"), "hidden");
		assert_eq!(sanitize_file_name("   "), "unnamed");
	}

	#[test]
	fn caps_stem_but_keeps_extension() {
		let long = format!("{}.tiff", "a".repeat(80));
		let sanitized = sanitize_file_name(&long);
		assert_eq!(sanitized, format!("{}.tiff", "a".repeat(MAX_FILE_STEM_LEN)));
	}

	#[test]
	fn splits_extensions() {
		assert_eq!(split_extension("image.TIF"), ("image", Some("TIF")));
		assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", Some("gz")));
		assert_eq!(split_extension("README"), ("README", None));
		assert_eq!(split_extension("trailing."), ("trailing", None));
	}

	#[test]
	fn chains_optionals() {
		assert_eq!(
			chain_optional_iter([1, 2], [None, Some(3), None]),
			vec![1, 2, 3]
		);
	}
}
