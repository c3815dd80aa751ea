use std::sync::Arc;

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use derive_more::From;
use serde_json::json;
use serde_with::{serde_as, DisplayFromStr};
use nanoid::nanoid;

use crate::tools::log::{log_error, LogServiceType};

pub type Result<T> = core::result::Result<T, Error>;
pub type SvResult<T> = Result<T>;

#[serde_as]
#[derive(Debug, Serialize, From, strum_macros::AsRefStr)]
#[serde(tag = "type", content = "data")]
pub enum Error {
	Error { message: String },
	LoginFail,
	NotFound,
	Forbidden,

	// -- Recognition errors.

	NoModelFound,
	FaceAnalysisTimeout(String),

	// -- Auth errors.

	AuthFail,
	AuthFailTokenWrongFormat,
	AuthFailInvalidToken,
	AuthFailExpiredToken,
	AuthFailNotForThisServer,

	// -- Server errors.
	ServerMalformatedConfigFile,
	ServerUnableToAccessServerLocalFolder,

	// -- Externals

	#[from]
	Model(#[serde_as(as = "DisplayFromStr")] crate::model::error::Error),

	#[from]
	Io(#[serde_as(as = "DisplayFromStr")] std::io::Error),

	#[from]
	Serde(#[serde_as(as = "DisplayFromStr")] serde_json::Error),

	#[from]
	ORT(#[serde_as(as = "DisplayFromStr")] ort::Error),

	#[from]
	Shape(#[serde_as(as = "DisplayFromStr")] ndarray::ShapeError),

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

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let nanoid = nanoid!();
		log_error(LogServiceType::Other, format!("{:?}", self));
		let (status_code, client_error) = self.client_status_and_error();

		// -- If client error, build the new response.
		let error_json = json!({
						"error": {
							"type": client_error.as_ref(),
							"req_uuid": nanoid.to_string(),
						}
					});

		let mut error_response = (status_code, Json(error_json)).into_response();

		// Insert the Error into the response.
		error_response.extensions_mut().insert(Arc::new(self));

		error_response
	}
}

impl Error {
	pub fn client_status_and_error(&self) -> (StatusCode, ClientError) {
		#[allow(unreachable_patterns)]
		match self {
			Self::NotFound => (StatusCode::NOT_FOUND, ClientError::NOT_FOUND),

			Self::LoginFail => (StatusCode::FORBIDDEN, ClientError::LOGIN_FAIL),
			Self::Model(err) => err.client_status_and_error(),
			// -- Auth.
			Self::Forbidden => (StatusCode::FORBIDDEN, ClientError::FORBIDDEN),
			Self::AuthFail
			| Self::AuthFailTokenWrongFormat
			| Self::AuthFailInvalidToken
			| Self::AuthFailNotForThisServer => {
				(StatusCode::UNAUTHORIZED, ClientError::NO_AUTH)
			},
			Self::AuthFailExpiredToken => {
				(StatusCode::UNAUTHORIZED, ClientError::TOKEN_EXPIRED)
			}

			// -- Recognition.
			Self::NoModelFound => (StatusCode::SERVICE_UNAVAILABLE, ClientError::SERVICE_ERROR),
			Self::FaceAnalysisTimeout(_) => (StatusCode::INTERNAL_SERVER_ERROR, ClientError::SERVICE_ERROR),

			// -- Fallback.
			_ => (
				StatusCode::INTERNAL_SERVER_ERROR,
				ClientError::SERVICE_ERROR,
			),
		}
	}
}


#[derive(Debug, strum_macros::AsRefStr)]
#[allow(non_camel_case_types)]
pub enum ClientError {
	LOGIN_FAIL,
	NO_AUTH,
	TOKEN_EXPIRED,
	FORBIDDEN,
	NOT_FOUND,
	INVALID_PARAMS,
	SERVICE_ERROR,
	Custom(String),
}
