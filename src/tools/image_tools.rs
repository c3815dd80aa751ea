use std::io::{Seek, Write};
use std::num::ParseIntError;
use std::str::FromStr;

use image::{DynamicImage, ImageFormat, ImageResult};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Display)]
#[serde(rename_all = "camelCase")]
pub enum ImageSize {
    Thumb,
    Small,
    Large,
    Custom(u32),
}

impl FromStr for ImageSize {
    type Err = ();
    fn from_str(input: &str) -> Result<ImageSize, Self::Err> {
        let int_size: core::result::Result<u32, ParseIntError> = input.parse();
        match int_size {
            Ok(size) => Ok(ImageSize::Custom(size)),
            Err(_) => match input {
                "thumb" => Ok(ImageSize::Thumb),
                "small" => Ok(ImageSize::Small),
                "large" => Ok(ImageSize::Large),
                _ => Err(()),
            },
        }
    }
}

impl ImageSize {
    pub fn to_size(&self) -> u32 {
        match self {
            ImageSize::Thumb => 258,
            ImageSize::Small => 512,
            ImageSize::Large => 1024,
            ImageSize::Custom(width) => *width,
        }
    }

    pub fn to_filename_element(&self) -> String {
        format!(".{}", self)
    }
    pub fn optional_to_filename_element(optional: &Option<Self>) -> String {
        match optional {
            Some(size) => size.to_filename_element(),
            None => "".to_string(),
        }
    }
}

pub fn resize_image<T: Write + Seek>(buffer: &[u8], to: &mut T, size: u32, format: ImageFormat) -> ImageResult<()> {
    let img = image::load_from_memory(buffer)?;
    let thumb = resize(img, size);
    thumb.write_to(to, format)?;
    Ok(())
}

fn resize(image: DynamicImage, size: u32) -> DynamicImage {
    image.thumbnail(size, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sizes() {
        assert_eq!(ImageSize::from_str("thumb"), Ok(ImageSize::Thumb));
        assert_eq!(ImageSize::from_str("640"), Ok(ImageSize::Custom(640)));
        assert!(ImageSize::from_str("giant").is_err());
    }

    #[test]
    fn size_filename_element() {
        assert_eq!(ImageSize::Thumb.to_filename_element(), ".thumb");
        assert_eq!(ImageSize::optional_to_filename_element(&None), "");
    }
}
