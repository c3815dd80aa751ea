use derive_more::From;
use hyper::StatusCode;
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::error::ClientError;

use super::users::{ConnectedUser, UserRole};


pub type Result<T> = core::result::Result<T, Error>;

#[serde_as]
#[derive(Debug, Serialize, From, strum_macros::AsRefStr)]
pub enum Error {
	Other(String),

	NotFound(String),
	UserNotFound(String),
	PhotoNotFound(String),
	PersonNotFound(String),
	FaceNotFound(String),

	Duplicate(String),
	InvalidName(String),

	CannotOpenDatabase,

	NotServerConnected,
	InsufficientUserRole { user: ConnectedUser, role: UserRole },
	UserGetNotAuth { user: ConnectedUser, requested_user: String },
	UserListNotAuth { user: ConnectedUser },
	NotOwnerOfElement { user: ConnectedUser, element: String },

	// -- Externals
	#[from]
	TokioRusqlite(#[serde_as(as = "DisplayFromStr")] tokio_rusqlite::Error),

	#[from]
	TokioIo(#[serde_as(as = "DisplayFromStr")] tokio::io::Error),
	#[from]
	Rusqlite(#[serde_as(as = "DisplayFromStr")] rusqlite::Error),
	#[from]
	Serde(#[serde_as(as = "DisplayFromStr")] serde_json::Error),

	#[from]
	Image(#[serde_as(as = "DisplayFromStr")] image::ImageError),
}

// region:    --- Error Boilerplate

impl core::fmt::Display for Error {
	fn fmt(
		&self,
		fmt: &mut core::fmt::Formatter,
	) -> core::result::Result<(), core::fmt::Error> {
		write!(fmt, "{self:?}")
	}
}

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate


impl Error {
	pub fn client_status_and_error(&self) -> (StatusCode, ClientError) {
		#[allow(unreachable_patterns)]
		match self {
			Error::NotFound(_) => (StatusCode::NOT_FOUND, ClientError::NOT_FOUND),
			Error::UserNotFound(_) => (StatusCode::NOT_FOUND, ClientError::NOT_FOUND),
			Error::PhotoNotFound(_) => (StatusCode::NOT_FOUND, ClientError::NOT_FOUND),
			Error::PersonNotFound(_) => (StatusCode::NOT_FOUND, ClientError::NOT_FOUND),
			Error::FaceNotFound(_) => (StatusCode::NOT_FOUND, ClientError::NOT_FOUND),

			Error::Duplicate(id) => (StatusCode::CONFLICT, ClientError::Custom(format!("Duplicate element {}", id))),
			Error::InvalidName(name) => (StatusCode::BAD_REQUEST, ClientError::Custom(format!("Invalid name {}", name))),

			Error::NotServerConnected => (StatusCode::FORBIDDEN, ClientError::FORBIDDEN),
			Error::InsufficientUserRole { user: _, role: _ } => (StatusCode::FORBIDDEN, ClientError::FORBIDDEN),
			Error::UserGetNotAuth { user: _, requested_user: _ } => (StatusCode::FORBIDDEN, ClientError::FORBIDDEN),
			Error::UserListNotAuth { user: _ } => (StatusCode::FORBIDDEN, ClientError::FORBIDDEN),
			Error::NotOwnerOfElement { user: _, element: _ } => (StatusCode::FORBIDDEN, ClientError::FORBIDDEN),

			Error::CannotOpenDatabase => (StatusCode::INTERNAL_SERVER_ERROR, ClientError::SERVICE_ERROR),
			Error::Rusqlite(_) | Error::TokioRusqlite(_) => (StatusCode::INTERNAL_SERVER_ERROR, ClientError::SERVICE_ERROR),
			Error::Serde(_) => (StatusCode::INTERNAL_SERVER_ERROR, ClientError::SERVICE_ERROR),
			Error::Image(_) => (StatusCode::INTERNAL_SERVER_ERROR, ClientError::SERVICE_ERROR),

			_ => (StatusCode::INTERNAL_SERVER_ERROR, ClientError::SERVICE_ERROR),
		}
	}
}
