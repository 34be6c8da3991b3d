//! Copies binaries into the assembly tree.
//!
//! Every copy is preceded by a disk space check against the archive volume, names are
//! sanitized and made unique within their target folder, and TIFF images get a PNG copy
//! next to the untouched original.

use crate::{
	disk::DiskSpaceChecker,
	error::{Error, Result},
};

use labex_utils::{
	error::{FileIOError, NonUtf8PathError},
	sanitize_file_name, split_extension,
};

use std::path::{Path, PathBuf};

use tokio::{fs, task::spawn_blocking};
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedResource {
	/// Final name inside the target folder
	pub file_name: String,
	pub path: PathBuf,
	pub size: u64,
	/// Name of the PNG rendition, for TIFF sources that converted successfully
	pub converted_png: Option<String>,
}

pub struct ResourceStager<'a> {
	disk: &'a dyn DiskSpaceChecker,
	volume: &'a Path,
}

impl<'a> ResourceStager<'a> {
	/// `volume` is any path on the archive volume, usually the archive root
	pub fn new(disk: &'a dyn DiskSpaceChecker, volume: &'a Path) -> Self {
		Self { disk, volume }
	}

	/// Copies `source` into `target_dir` as `file_name`
	pub async fn stage_file(
		&self,
		source: &Path,
		target_dir: &Path,
		file_name: &str,
	) -> Result<StagedResource> {
		let size = fs::metadata(source)
			.await
			.map_err(|e| FileIOError::from((source, e, "Failed to read resource metadata")))?
			.len();

		self.disk.assert_space(size, self.volume)?;

		let destination = prepare_destination(target_dir, file_name).await?;
		fs::copy(source, &destination)
			.await
			.map_err(|e| Error::from_io(FileIOError::from((&destination, e))))?;

		trace!(
			source = %source.display(),
			destination = %destination.display(),
			size,
			"Staged resource;"
		);

		self.finish(destination, size).await
	}

	/// Writes generated content (renders, extracted data) into `target_dir`
	pub async fn stage_bytes(
		&self,
		bytes: &[u8],
		target_dir: &Path,
		file_name: &str,
	) -> Result<StagedResource> {
		let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
		self.disk.assert_space(size, self.volume)?;

		let destination = prepare_destination(target_dir, file_name).await?;
		fs::write(&destination, bytes)
			.await
			.map_err(|e| Error::from_io(FileIOError::from((&destination, e))))?;

		self.finish(destination, size).await
	}

	async fn finish(&self, path: PathBuf, size: u64) -> Result<StagedResource> {
		let file_name = path
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_default();

		let converted_png = if labex_images::needs_png_conversion(&path) {
			self.convert_to_png(&path, size).await?
		} else {
			None
		};

		Ok(StagedResource {
			file_name,
			path,
			size,
			converted_png,
		})
	}

	/// A failed conversion keeps the original only, running out of space is still fatal
	async fn convert_to_png(&self, source: &Path, source_size: u64) -> Result<Option<String>> {
		self.disk.assert_space(source_size, self.volume)?;

		let Some(dir) = source.parent() else {
			return Ok(None);
		};
		let file_name = source
			.file_name()
			.and_then(|name| name.to_str())
			.ok_or_else(|| NonUtf8PathError(source.into()))?;
		let (stem, _) = split_extension(file_name);
		let target = unique_destination(dir, &format!("{stem}.png")).await;

		let (from, to) = (source.to_path_buf(), target.clone());
		match spawn_blocking(move || labex_images::convert_to_png(from, to)).await? {
			Ok(()) => {
				trace!(target = %target.display(), "Added PNG copy of TIFF resource;");
				Ok(target
					.file_name()
					.map(|name| name.to_string_lossy().into_owned()))
			}
			Err(e) => {
				warn!(
					source = %source.display(),
					?e,
					"Failed to convert TIFF resource to PNG, keeping the original only;"
				);
				Ok(None)
			}
		}
	}
}

async fn prepare_destination(target_dir: &Path, file_name: &str) -> Result<PathBuf> {
	fs::create_dir_all(target_dir)
		.await
		.map_err(|e| Error::from_io(FileIOError::from((target_dir, e))))?;

	Ok(unique_destination(target_dir, &sanitize_file_name(file_name)).await)
}

/// `dir/file_name`, or `dir/<stem>_<n>.<ext>` with the first free `n` when taken
pub async fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
	let candidate = dir.join(file_name);
	if !fs::try_exists(&candidate).await.unwrap_or(false) {
		return candidate;
	}

	let (stem, extension) = split_extension(file_name);
	let mut counter = 1_u32;
	loop {
		let name = extension.map_or_else(
			|| format!("{stem}_{counter}"),
			|ext| format!("{stem}_{counter}.{ext}"),
		);
		let candidate = dir.join(name);
		if !fs::try_exists(&candidate).await.unwrap_or(false) {
			return candidate;
		}
		counter += 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::disk::FixedDiskSpace;

	use image::{ImageBuffer, Rgb};
	use tempfile::TempDir;

	#[tokio::test]
	async fn renames_on_collision() {
		let dir = TempDir::new().unwrap();
		let disk = FixedDiskSpace::new(u64::MAX);
		let stager = ResourceStager::new(&disk, dir.path());
		let target = dir.path().join("record");

		let first = stager.stage_bytes(b"one", &target, "data.csv").await.unwrap();
		let second = stager.stage_bytes(b"two", &target, "data.csv").await.unwrap();

		assert_eq!(first.file_name, "data.csv");
		assert_eq!(second.file_name, "data_1.csv");
		assert_eq!(std::fs::read(second.path).unwrap(), b"two");
	}

	#[tokio::test]
	async fn refuses_when_volume_is_full() {
		let dir = TempDir::new().unwrap();
		let disk = FixedDiskSpace::new(2);
		let stager = ResourceStager::new(&disk, dir.path());

		let err = stager
			.stage_bytes(b"too big", dir.path(), "big.bin")
			.await
			.unwrap_err();
		assert!(err.is_fatal());
		assert!(!dir.path().join("big.bin").exists());
	}

	#[tokio::test]
	async fn tiff_gets_png_copy() {
		let dir = TempDir::new().unwrap();
		let source = dir.path().join("scan.tiff");
		ImageBuffer::from_pixel(4, 4, Rgb([10_u8, 200, 30]))
			.save(&source)
			.unwrap();

		let disk = FixedDiskSpace::new(u64::MAX);
		let stager = ResourceStager::new(&disk, dir.path());
		let staged = stager
			.stage_file(&source, &dir.path().join("out"), "Scan 01.tiff")
			.await
			.unwrap();

		assert_eq!(staged.file_name, "Scan_01.tiff");
		assert_eq!(staged.converted_png.as_deref(), Some("Scan_01.png"));
		assert!(dir.path().join("out/Scan_01.png").exists());
	}
}
