pub mod photo;
pub mod people;
pub mod face;
