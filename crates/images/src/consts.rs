/// TIFF is stored untouched in archives but browsers can't display it, so every TIFF
/// gets a PNG copy next to the original.
pub const TIFF_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// The maximum size of a PNG we read back.
///
/// This value is in MiB.
pub(crate) const PNG_MAXIMUM_FILE_SIZE: u64 = MIB * 64;

/// Scientific TIFF stacks are routinely much larger than photos.
///
/// This value is in MiB.
pub(crate) const TIFF_MAXIMUM_FILE_SIZE: u64 = MIB * 256;

/// The size of 1MiB in bytes
const MIB: u64 = 1_048_576;
