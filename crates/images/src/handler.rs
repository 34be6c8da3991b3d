use crate::{
	consts,
	error::{Error, Result},
	generic::{PngHandler, TiffHandler},
	ImageHandler,
};

use std::{
	ffi::{OsStr, OsString},
	path::Path,
};

use tracing::trace;

/// Writes a browser friendly PNG copy of the TIFF at `source` to `target`.
pub fn convert_to_png(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<()> {
	let (source, target) = (source.as_ref(), target.as_ref());
	let ext = extension_of(source)?;
	if !is_tiff(&ext) {
		return Err(Error::Unsupported);
	}

	let image = TiffHandler {}.handle_image(source)?;
	PngHandler {}.write_image(&image, target)?;

	trace!(
		source = %source.display(),
		target = %target.display(),
		"Converted image;",
	);

	Ok(())
}

/// Whether a file with this name should get a PNG copy alongside the original.
#[must_use]
pub fn needs_png_conversion(path: impl AsRef<Path>) -> bool {
	extension_of(path.as_ref()).is_ok_and(|ext| is_tiff(&ext))
}

fn is_tiff(ext: &OsStr) -> bool {
	consts::TIFF_EXTENSIONS
		.iter()
		.map(OsString::from)
		.any(|x| x == ext)
}

fn extension_of(path: &Path) -> Result<OsString> {
	path.extension()
		.map_or_else(|| Err(Error::NoExtension), |e| Ok(e.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
	use super::*;

	use image::{ImageFormat, Rgb, RgbImage};
	use tempfile::TempDir;

	fn write_tiff(path: &Path) {
		let mut img = RgbImage::new(8, 4);
		img.put_pixel(1, 1, Rgb([200, 10, 10]));
		img.save_with_format(path, ImageFormat::Tiff).unwrap();
	}

	#[test]
	fn converts_tiff_to_png() {
		let dir = TempDir::new().unwrap();
		let source = dir.path().join("scan.TIF");
		let target = dir.path().join("converted").join("scan.png");
		write_tiff(&source);

		convert_to_png(&source, &target).unwrap();

		let converted = PngHandler {}.handle_image(&target).unwrap();
		assert_eq!((converted.width(), converted.height()), (8, 4));
		assert_eq!(converted.to_rgb8().get_pixel(1, 1).0, [200, 10, 10]);
	}

	#[test]
	fn only_tiff_needs_conversion() {
		assert!(needs_png_conversion("a/b/scan.tiff"));
		assert!(needs_png_conversion("scan.TIF"));
		assert!(!needs_png_conversion("photo.jpg"));
		assert!(!needs_png_conversion("no_extension"));
	}

	#[test]
	fn rejects_everything_but_tiff() {
		let dir = TempDir::new().unwrap();
		let target = dir.path().join("out.png");

		let png = dir.path().join("photo.png");
		RgbImage::new(2, 2)
			.save_with_format(&png, ImageFormat::Png)
			.unwrap();
		assert!(matches!(convert_to_png(&png, &target), Err(Error::Unsupported)));

		assert!(matches!(
			convert_to_png(dir.path().join("nothing"), &target),
			Err(Error::NoExtension)
		));
		assert!(!target.exists());
	}
}
