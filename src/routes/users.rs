use axum::{extract::{Path, State}, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::model::{users::{ConnectedUser, ServerUserForAdd}, ModelController};
use crate::Result;


pub fn routes(mc: ModelController) -> Router {
	Router::new()
		.route("/", get(handler_list))
		.route("/", post(handler_register))
		.route("/login", post(handler_login))
		.route("/me", get(handler_me))
		.route("/:id", get(handler_get))
		.with_state(mc)
}

async fn handler_list(State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let users = mc.get_users(&user).await?;
	let body = Json(json!(users));
	Ok(body)
}

async fn handler_get(Path(user_id): Path<String>, State(mc): State<ModelController>, user: ConnectedUser) -> Result<Json<Value>> {
	let requested = mc.get_user(&user_id, &user).await?;
	let body = Json(json!(requested));
	Ok(body)
}

async fn handler_me(user: ConnectedUser) -> Result<Json<Value>> {
	let user = user.check_registered()?;
	Ok(Json(json!(user)))
}

async fn handler_register(State(mc): State<ModelController>, user: ConnectedUser, Json(new_user): Json<ServerUserForAdd>) -> Result<Json<Value>> {
	let created = mc.add_user(new_user, &user).await?;
	Ok(Json(json!(created)))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoginRequest {
	pub name: String,
	pub password: String,
}

async fn handler_login(State(mc): State<ModelController>, Json(login): Json<LoginRequest>) -> Result<Json<Value>> {
	let (user, token) = mc.login(&login.name, &login.password).await?;
	Ok(Json(json!({ "user": user, "token": token })))
}
