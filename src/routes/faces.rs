use axum::{extract::{Multipart, Path, State}, routing::{delete, get, post}, Json, Router};
use serde_json::{json, Value};

use crate::domain::face::FaceForRead;
use crate::model::{recognition::DetectFacesRequest, users::ConnectedUser, ModelController};
use crate::{Error, Result};


pub fn routes(mc: ModelController) -> Router {
	Router::new()
		.route("/search", post(handler_search))
		.route("/stats", get(handler_stats))
		.route("/batch-detect", post(handler_batch_detect))
		.route("/:id", delete(handler_delete))
		.with_state(mc)
}

/// Upload a query image and find photos containing matching faces.
async fn handler_search(State(mc): State<ModelController>, user: ConnectedUser, mut multipart: Multipart) -> Result<Json<Value>> {
	while let Some(field) = multipart.next_field().await.map_err(|e| Error::Error { message: format!("Invalid multipart request: {}", e) })? {
		let data = field.bytes().await.map_err(|e| Error::Error { message: format!("Unable to read upload: {}", e) })?;
		let result = mc.search_photos_by_face(data.to_vec(), &user).await?;
		return Ok(Json(json!(result)));
	}
	Err(Error::Error { message: "No file provided".to_string() })
}

async fn handler_stats(State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let stats = mc.recognition_stats(&user).await?;
	Ok(Json(json!(stats)))
}

/// Run the pipeline over a list of stored photos with the bounded worker
/// pool; failed photos come back with empty face lists.
async fn handler_batch_detect(State(mc): State<ModelController>, user: ConnectedUser, Json(request): Json<DetectFacesRequest>) -> Result<Json<Value>> {
	let results = mc.process_photos_batch(request.photo_ids, &user).await;
	let results: Vec<Value> = results
		.into_iter()
		.map(|r| json!({ "photo": r.photo, "faces": r.faces.into_iter().map(FaceForRead::from).collect::<Vec<_>>() }))
		.collect();
	Ok(Json(json!(results)))
}

async fn handler_delete(Path(face_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let face = mc.remove_face(&face_id, &user).await?;
	Ok(Json(json!(FaceForRead::from(face))))
}
