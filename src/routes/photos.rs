use axum::{body::Body, extract::{Multipart, Path, Query, State}, http::{header, StatusCode}, response::{IntoResponse, Response}, routing::{delete, get, post}, Json, Router};
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use crate::domain::face::FaceForRead;
use crate::model::{photos::{PhotoForAdd, PhotoQuery}, users::ConnectedUser, ModelController};
use crate::tools::scheduler::{face_processing::FaceProcessingTask, SvSchedulerWhen, SvTaskType};
use crate::{Error, Result};

use super::ImageRequestOptions;


pub fn routes(mc: ModelController) -> Router {
	Router::new()
		.route("/", get(handler_list))
		.route("/", post(handler_upload))
		.route("/:id", get(handler_get))
		.route("/:id", delete(handler_delete))
		.route("/:id/file", get(handler_file))
		.route("/:id/faces", get(handler_faces))
		.route("/:id/detect", post(handler_detect))
		.with_state(mc)
}

async fn handler_list(State(mc): State<ModelController>, user: ConnectedUser, Query(query): Query<PhotoQuery>) -> Result<Json<Value>> {
	let photos = mc.get_photos(query, &user).await?;
	let body = Json(json!(photos));
	Ok(body)
}

async fn handler_get(Path(photo_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let photo = mc.get_photo(&photo_id, &user).await?;
	let body = Json(json!(photo));
	Ok(body)
}

async fn handler_delete(Path(photo_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let photo = mc.remove_photo(&photo_id, &user).await?;
	let body = Json(json!(photo));
	Ok(body)
}

/// Accepts the upload, stores it and replies 202 immediately; face matching
/// results become available asynchronously through `/:id/faces`.
async fn handler_upload(State(mc): State<ModelController>, user: ConnectedUser, mut multipart: Multipart) -> Result<Response> {
	while let Some(field) = multipart.next_field().await.map_err(|e| Error::Error { message: format!("Invalid multipart request: {}", e) })? {
		let name = field.file_name().unwrap_or("photo").to_string();
		let mimetype = field.content_type().map(|m| m.to_string());
		let data = field.bytes().await.map_err(|e| Error::Error { message: format!("Unable to read upload: {}", e) })?;
		let photo = mc.upload_photo(PhotoForAdd { name, mimetype }, data.to_vec(), &user).await?;
		let body = Json(json!({ "photo": photo, "status": "processing" }));
		return Ok((StatusCode::ACCEPTED, body).into_response());
	}
	Err(Error::Error { message: "No file provided".to_string() })
}

async fn handler_file(Path(photo_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser, Query(query): Query<ImageRequestOptions>) -> Result<Response> {
	let (file, mimetype) = mc.photo_file(&photo_id, query.size, &user).await?;
	let stream = ReaderStream::new(file);
	let body = Body::from_stream(stream);
	Ok(([(header::CONTENT_TYPE, mimetype)], body).into_response())
}

async fn handler_faces(Path(photo_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let faces: Vec<FaceForRead> = mc.get_photo_faces(&photo_id, &user).await?.into_iter().map(FaceForRead::from).collect();
	Ok(Json(json!(faces)))
}

/// Queue a fresh pipeline run for an already stored photo.
async fn handler_detect(Path(photo_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Response> {
	// access check up front so a foreign photo id is rejected synchronously
	let photo = mc.get_photo(&photo_id, &user).await?;
	mc.scheduler.add(SvTaskType::FaceProcessing, SvSchedulerWhen::At(0), FaceProcessingTask { photo: photo.id.clone() }).await?;
	let body = Json(json!({ "photo_id": photo.id, "status": "processing" }));
	Ok((StatusCode::ACCEPTED, body).into_response())
}
