use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod auth;
pub mod image_tools;
pub mod log;
pub mod recognition;
pub mod face_inference;
pub mod scheduler;
pub mod text_tools;


pub fn get_time() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
}
