//! Content checksum, zip packaging and zip checksum of an assembled archive folder.

use crate::error::{Error, Result};

use labex_utils::error::FileIOError;

use std::{
	fs::{self, File},
	io::{self, Read},
	path::{Path, PathBuf},
};

use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::spawn_blocking;
use tracing::{debug, instrument, trace};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Top level entries describing the archive rather than the exported records, they
/// embed dates and random folder names so they stay out of the content checksum
const ARCHIVE_METADATA: [&str; 10] = [
	"manifest.txt",
	"index.html",
	"a-zIndex.html",
	"ro-crate-metadata.json",
	"folderTree.xml",
	"users.xml",
	"nfs.xml",
	"documentSchema.xsd",
	"folderSchema.xsd",
	"schemas",
];

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Persisted once per finished archive, later drives retention of the zip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveChecksum {
	pub archive_id: Uuid,
	pub zip_name: String,
	pub zip_size: u64,
	/// sha256 of the zip bytes
	pub checksum: String,
	/// blake3 over the exported files' contents
	pub content_checksum: String,
	pub exporter: String,
	pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FinalizedArchive {
	pub zip_path: PathBuf,
	pub zip_size: u64,
	pub checksum: String,
	pub content_checksum: String,
}

#[derive(Debug, Clone, Copy)]
pub enum ZipLayout {
	/// Entries are prefixed with the assembly folder name
	Nested,
	/// Entries are the assembly folder's contents, used when a single record was exported
	Flat,
}

/// Checksums, then zips `assembly_dir` into `zip_path`
#[instrument(skip_all, fields(assembly_dir = %assembly_dir.display()), err)]
pub async fn finalize(
	assembly_dir: &Path,
	zip_path: &Path,
	layout: ZipLayout,
	compression_level: i64,
) -> Result<FinalizedArchive> {
	let (assembly_dir, zip_path) = (assembly_dir.to_path_buf(), zip_path.to_path_buf());

	spawn_blocking(move || -> Result<FinalizedArchive> {
		let content_checksum = content_checksum(&assembly_dir)?;
		let zip_size = zip_directory(&assembly_dir, &zip_path, layout, compression_level)?;
		let checksum = sha256_file(&zip_path)?;

		debug!(
			zip = %zip_path.display(),
			zip_size,
			%checksum,
			%content_checksum,
			"Archive finalized;"
		);

		Ok(FinalizedArchive {
			zip_path,
			zip_size,
			checksum,
			content_checksum,
		})
	})
	.await?
}

/// Order independent digest of every exported file's bytes.
///
/// Relative paths are left out, record folders carry random suffixes and the same
/// logical content must hash the same on every run.
pub fn content_checksum(root: &Path) -> Result<String> {
	let mut file_hashes = Vec::new();

	for entry in WalkDir::new(root)
		.min_depth(1)
		.into_iter()
		.filter_entry(|entry| entry.depth() != 1 || !is_archive_metadata(entry.file_name()))
	{
		let entry = entry.map_err(|e| walk_error(root, e))?;
		if !entry.file_type().is_file() {
			continue;
		}

		let hash = blake3_file(entry.path())?;
		trace!(path = %entry.path().display(), %hash, "Hashed archive file;");
		file_hashes.push(hash);
	}

	file_hashes.sort_unstable();

	let mut hasher = Hasher::new();
	for hash in &file_hashes {
		hasher.update(hash.as_bytes());
	}

	Ok(hasher.finalize().to_hex().to_string())
}

/// Writes a reproducible zip: sorted entries, fixed timestamps. Returns the zip size.
pub fn zip_directory(
	source: &Path,
	destination: &Path,
	layout: ZipLayout,
	compression_level: i64,
) -> Result<u64> {
	let prefix = match layout {
		ZipLayout::Flat => None,
		ZipLayout::Nested => source
			.file_name()
			.map(|name| name.to_string_lossy().into_owned()),
	};

	let mut entries = Vec::new();
	for entry in WalkDir::new(source).min_depth(1) {
		let entry = entry.map_err(|e| walk_error(source, e))?;
		if !entry.file_type().is_file() {
			continue;
		}
		let relative = entry
			.path()
			.strip_prefix(source)
			.map_err(|e| Error::Export(e.to_string()))?;
		let mut name = relative
			.components()
			.map(|component| component.as_os_str().to_string_lossy())
			.collect::<Vec<_>>()
			.join("/");
		if let Some(prefix) = &prefix {
			name = format!("{prefix}/{name}");
		}
		entries.push((name, entry.into_path()));
	}
	entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

	let file = File::create(destination).map_err(|e| FileIOError::from((destination, e)))?;
	let mut zip = ZipWriter::new(file);
	let fixed_time = zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
		.map_err(|e| Error::Export(format!("invalid zip timestamp: {e}")))?;
	let options = SimpleFileOptions::default()
		.compression_method(CompressionMethod::Deflated)
		.compression_level(Some(compression_level.clamp(0, 9)))
		.last_modified_time(fixed_time);

	for (name, path) in &entries {
		zip.start_file(name.as_str(), options)?;
		let mut source_file =
			File::open(path).map_err(|e| Error::from_io(FileIOError::from((path, e))))?;
		io::copy(&mut source_file, &mut zip)
			.map_err(|e| Error::from_io(FileIOError::from((destination, e))))?;
	}

	zip.finish()?;

	fs::metadata(destination)
		.map(|metadata| metadata.len())
		.map_err(|e| FileIOError::from((destination, e)).into())
}

pub fn sha256_file(path: &Path) -> Result<String> {
	let mut hasher = Sha256::new();
	read_chunks(path, |chunk| hasher.update(chunk))?;
	Ok(hex::encode(hasher.finalize()))
}

fn blake3_file(path: &Path) -> Result<String> {
	let mut hasher = Hasher::new();
	read_chunks(path, |chunk| {
		hasher.update(chunk);
	})?;
	Ok(hasher.finalize().to_hex().to_string())
}

fn read_chunks(path: &Path, mut consume: impl FnMut(&[u8])) -> Result<()> {
	let mut file = File::open(path).map_err(|e| FileIOError::from((path, e)))?;
	let mut buf = vec![0; READ_BUFFER_SIZE];
	loop {
		let read = file
			.read(&mut buf)
			.map_err(|e| FileIOError::from((path, e)))?;
		if read == 0 {
			return Ok(());
		}
		consume(&buf[..read]);
	}
}

fn is_archive_metadata(name: &std::ffi::OsStr) -> bool {
	name.to_str()
		.is_some_and(|name| ARCHIVE_METADATA.contains(&name))
}

fn walk_error(root: &Path, e: walkdir::Error) -> Error {
	let path = e.path().unwrap_or(root).to_path_buf();
	match e.into_io_error() {
		Some(io_err) => FileIOError::from((path, io_err)).into(),
		None => Error::Export(format!(
			"filesystem loop while walking archive: <path='{}'>",
			path.display()
		)),
	}
}
