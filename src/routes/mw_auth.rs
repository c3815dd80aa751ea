use axum::async_trait;
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::model::users::{ConnectedUser, UserRole};
use crate::model::ModelController;
use crate::server::get_server_id;
use crate::tools::auth::verify;
use crate::{error::Error, Result};

const BEARER: &str = "Bearer ";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenParams {
    token: Option<String>
}


pub async fn mw_must_be_admin(user: ConnectedUser, req: Request, next: Next) -> Result<Response> {
    match user {
        ConnectedUser::Server(user) => if user.role != UserRole::Admin {
            return Err(Error::Forbidden)
        },
        ConnectedUser::ServerAdmin => {},
        ConnectedUser::Anonymous => return Err(Error::Forbidden),
    }
    Ok(next.run(req).await)
}


pub async fn mw_token_resolver(mc: State<ModelController>, headers: HeaderMap, query: Query<TokenParams>, mut req: Request, next: Next) -> Result<Response> {
    let token: Option<String> = match headers.get("AUTHORIZATION").and_then(|t| t.to_str().ok()) {
        Some(token) => Some(token.replace(BEARER, "")),
        None => query.token.clone(),
    };
    let connected_user = parse_token(token, &mc.0).await?;
    req.extensions_mut().insert(connected_user);

    Ok(next.run(req).await)
}

pub async fn parse_token(token: Option<String>, mc: &ModelController) -> Result<ConnectedUser> {
    if let Some(token) = &token {
        let server_id = get_server_id().await.unwrap_or_default();
        let claims = verify(token, &server_id).await?;
        let user = mc.get_user_unchecked(&claims.sub).await?;

        Ok(ConnectedUser::Server(user))
    } else {
        Ok(ConnectedUser::Anonymous)
    }
}


#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ConnectedUser {
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
		let server_user = parts
			.extensions
			.get::<ConnectedUser>().ok_or(Error::AuthFail)?
            .clone();

        Ok(server_user)
    }
}
