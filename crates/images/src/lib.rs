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
	clippy::as_conversions,
	clippy::dbg_macro
)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod consts;
mod error;
mod generic;
mod handler;

pub use consts::TIFF_EXTENSIONS;
pub use error::{Error, Result};
pub use handler::{convert_to_png, needs_png_conversion};

use std::{fs, io::Read, path::Path};

use image::DynamicImage;

pub trait ImageHandler {
	fn maximum_size(&self) -> u64;

	fn get_data(&self, path: &Path) -> Result<Vec<u8>> {
		let mut file = fs::File::open(path)?;
		let size = file.metadata()?.len();
		if size > self.maximum_size() {
			Err(Error::TooLarge {
				size,
				maximum: self.maximum_size(),
			})
		} else {
			let mut data = vec![];
			file.read_to_end(&mut data)?;
			Ok(data)
		}
	}

	fn handle_image(&self, path: &Path) -> Result<DynamicImage>;

	fn write_image(&self, _image: &DynamicImage, _path: &Path) -> Result<()> {
		Err(Error::Unsupported)
	}
}
