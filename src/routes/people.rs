use axum::{extract::{Path, Query, State}, routing::{delete, get, patch, post}, Json, Router};
use serde_json::{json, Value};

use crate::domain::face::FaceForRead;
use crate::model::{people::{PeopleMerge, PeopleQuery, PersonForAdd, PersonForUpdate}, users::ConnectedUser, ModelController};
use crate::Result;


pub fn routes(mc: ModelController) -> Router {
	Router::new()
		.route("/", get(handler_list))
		.route("/", post(handler_post))
		.route("/merge", post(handler_merge))
		.route("/:id", get(handler_get))
		.route("/:id", patch(handler_patch))
		.route("/:id", delete(handler_delete))
		.route("/:id/photos", get(handler_photos))
		.route("/:id/faces", get(handler_faces))
		.with_state(mc)
}

async fn handler_list(State(mc): State<ModelController>, user: ConnectedUser, Query(query): Query<PeopleQuery>) -> Result<Json<Value>> {
	let people = mc.get_people(query, &user).await?;
	let body = Json(json!(people));
	Ok(body)
}

async fn handler_get(Path(person_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let person = mc.get_person(&person_id, &user).await?;
	let body = Json(json!(person));
	Ok(body)
}

async fn handler_post(State(mc): State<ModelController>, user: ConnectedUser, Json(new_person): Json<PersonForAdd>) -> Result<Json<Value>> {
	let person = mc.add_person(new_person, &user).await?;
	let body = Json(json!(person));
	Ok(body)
}

/// Rename and/or confirm an identity. The identity-management layer's side of
/// the cache contract: the model drops the user's embedding snapshot here.
async fn handler_patch(Path(person_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser, Json(update): Json<PersonForUpdate>) -> Result<Json<Value>> {
	let person = mc.update_person(&person_id, update, &user).await?;
	Ok(Json(json!(person)))
}

async fn handler_delete(Path(person_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let person = mc.remove_person(&person_id, &user).await?;
	let body = Json(json!(person));
	Ok(body)
}

async fn handler_merge(State(mc): State<ModelController>, user: ConnectedUser, Json(merge): Json<PeopleMerge>) -> Result<Json<Value>> {
	let person = mc.merge_people(merge, &user).await?;
	Ok(Json(json!(person)))
}

/// "All photos of X".
async fn handler_photos(Path(person_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let photos = mc.get_person_photos(&person_id, &user).await?;
	Ok(Json(json!(photos)))
}

async fn handler_faces(Path(person_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let faces: Vec<FaceForRead> = mc.get_person_faces(&person_id, &user).await?.into_iter().map(FaceForRead::from).collect();
	Ok(Json(json!(faces)))
}
