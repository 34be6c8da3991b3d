use crate::{
	consts::{PNG_MAXIMUM_FILE_SIZE, TIFF_MAXIMUM_FILE_SIZE},
	error::Result,
	ImageHandler,
};

use std::{fs, path::Path};

use image::{DynamicImage, ImageFormat};

pub struct TiffHandler {}

impl ImageHandler for TiffHandler {
	fn maximum_size(&self) -> u64 {
		TIFF_MAXIMUM_FILE_SIZE
	}

	fn handle_image(&self, path: &Path) -> Result<DynamicImage> {
		let data = self.get_data(path)?; // this also makes sure the file isn't above the maximum size
		Ok(image::load_from_memory_with_format(&data, ImageFormat::Tiff)?)
	}
}

pub struct PngHandler {}

impl ImageHandler for PngHandler {
	fn maximum_size(&self) -> u64 {
		PNG_MAXIMUM_FILE_SIZE
	}

	fn handle_image(&self, path: &Path) -> Result<DynamicImage> {
		let data = self.get_data(path)?;
		Ok(image::load_from_memory_with_format(&data, ImageFormat::Png)?)
	}

	fn write_image(&self, image: &DynamicImage, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		image.save_with_format(path, ImageFormat::Png)?;
		Ok(())
	}
}
