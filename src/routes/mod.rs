use serde::{Deserialize, Serialize};

use crate::tools::image_tools::ImageSize;

pub mod ping;
pub mod users;
pub mod mw_auth;

pub mod photos;
pub mod people;
pub mod faces;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageRequestOptions {
    pub size: Option<ImageSize>,
}
