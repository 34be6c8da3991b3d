//! Free space probing for the archive volume.
//!
//! Space is probed right before each copy, never reserved. Runs are assumed to execute
//! one at a time, two concurrent runs could both pass the check and overrun the margin.

use crate::error::{Error, Result};

use std::{
	path::Path,
	sync::atomic::{AtomicU64, Ordering},
};

use sysinfo::Disks;
use tracing::{debug, error};

pub trait DiskSpaceChecker: Send + Sync {
	/// Bytes currently available on the volume holding `path`
	fn available_space(&self, path: &Path) -> Result<u64>;

	/// Bytes that must remain free after any write
	fn margin(&self) -> u64 {
		0
	}

	/// Fails with [`Error::DiskSpace`] unless `required` bytes fit on the volume
	/// holding `path` without eating into the margin
	fn assert_space(&self, required: u64, path: &Path) -> Result<()> {
		let available = self.available_space(path)?;
		if available < required.saturating_add(self.margin()) {
			error!(
				required,
				available,
				margin = self.margin(),
				path = %path.display(),
				"Archive volume is out of space;"
			);
			return Err(Error::DiskSpace {
				required,
				available,
				path: path.into(),
			});
		}

		debug!(required, available, "Disk space check passed;");
		Ok(())
	}
}

/// Probes the real volume through `sysinfo`
#[derive(Debug, Clone, Copy)]
pub struct SystemDiskSpace {
	margin: u64,
}

impl SystemDiskSpace {
	#[must_use]
	pub const fn new(margin: u64) -> Self {
		Self { margin }
	}
}

impl DiskSpaceChecker for SystemDiskSpace {
	fn available_space(&self, path: &Path) -> Result<u64> {
		let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
		let disks = Disks::new_with_refreshed_list();

		// The volume is the mount point with the longest prefix of our path
		disks
			.list()
			.iter()
			.filter(|disk| path.starts_with(disk.mount_point()))
			.max_by_key(|disk| disk.mount_point().as_os_str().len())
			.map(sysinfo::Disk::available_space)
			.ok_or_else(|| {
				Error::Export(format!(
					"no mounted volume found for archive path: <path='{}'>",
					path.display()
				))
			})
	}

	fn margin(&self) -> u64 {
		self.margin
	}
}

/// A volume with a fixed amount of free space that shrinks as [`Self::consume`] is
/// called, for exercising space exhaustion deterministically
#[derive(Debug, Default)]
pub struct FixedDiskSpace {
	available: AtomicU64,
}

impl FixedDiskSpace {
	#[must_use]
	pub const fn new(available: u64) -> Self {
		Self {
			available: AtomicU64::new(available),
		}
	}

	pub fn consume(&self, bytes: u64) {
		// Saturating, a volume can't go below empty
		let _ = self
			.available
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |available| {
				Some(available.saturating_sub(bytes))
			});
	}
}

impl DiskSpaceChecker for FixedDiskSpace {
	fn available_space(&self, _path: &Path) -> Result<u64> {
		Ok(self.available.load(Ordering::SeqCst))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fixed_space_runs_out() {
		let disk = FixedDiskSpace::new(100);
		let root = Path::new("/archives");

		assert!(disk.assert_space(60, root).is_ok());
		disk.consume(60);
		assert!(disk.assert_space(40, root).is_ok());

		let err = disk.assert_space(41, root).unwrap_err();
		assert!(err.is_fatal());
		assert!(matches!(
			err,
			Error::DiskSpace {
				required: 41,
				available: 40,
				..
			}
		));
	}
}
