pub mod store;
pub mod error;
pub mod users;

pub mod photos;
pub mod people;
pub mod recognition;

use std::{sync::Arc, time::Duration};

use nanoid::nanoid;

use crate::{error::SvResult, server::{get_server_id, RecognitionConfig}, tools::{auth::{sign, Claims}, face_inference::FaceAnalyzer, get_time, recognition::cache::EmbeddingCache, scheduler::SvScheduler}};

use self::{store::SqliteStore, users::{ConnectedUser, ServerUser, ServerUserForAdd, UserRole}};
use error::{Error, Result};


const TOKEN_VALIDITY_SECONDS: u64 = 60 * 60 * 24 * 30;

#[derive(Clone)]
pub struct ModelController {
	store: Arc<SqliteStore>,
	analyzer: Arc<dyn FaceAnalyzer>,
	face_cache: Arc<EmbeddingCache>,
	pub scheduler: Arc<SvScheduler>,
	recognition: RecognitionConfig,
}


// Constructor
impl ModelController {
	pub async fn new(store: SqliteStore, analyzer: Arc<dyn FaceAnalyzer>, recognition: RecognitionConfig) -> SvResult<Self> {
		let mc = Self::assemble(store, analyzer, recognition);
		mc.scheduler.start(mc.clone()).await?;
		Ok(mc)
	}

	fn assemble(store: SqliteStore, analyzer: Arc<dyn FaceAnalyzer>, recognition: RecognitionConfig) -> Self {
		let scheduler = SvScheduler::new(recognition.max_retries);
		Self {
			store: Arc::new(store),
			analyzer,
			face_cache: Arc::new(EmbeddingCache::new(Duration::from_secs(recognition.cache_ttl_secs))),
			scheduler: Arc::new(scheduler),
			recognition,
		}
	}
}

impl ModelController {

	pub async fn get_user_unchecked(&self, user_id: &str) -> Result<ServerUser> {
		self.store.get_user(user_id).await?.ok_or_else(|| Error::UserNotFound(user_id.to_string()))
	}

	pub async fn get_user(&self, user_id: &str, requesting_user: &ConnectedUser) -> Result<ServerUser> {
		let id = user_id.to_string();
		if let ConnectedUser::Anonymous = requesting_user {
			return Err(Error::UserGetNotAuth { user: requesting_user.clone(), requested_user: id })
		} else if let ConnectedUser::Server(user) = &requesting_user {
			if user.id != id && user.role != UserRole::Admin {
				return Err(Error::UserGetNotAuth { user: requesting_user.clone(), requested_user: id })
			}
		}

		self.get_user_unchecked(&id).await
	}

	pub async fn get_users(&self, requesting_user: &ConnectedUser) -> Result<Vec<ServerUser>> {
		if requesting_user.is_admin() {
			self.store.get_users().await
		} else {
			Err(Error::UserListNotAuth { user: requesting_user.clone() })
		}
	}

	/// Register a user. The first registered user becomes the server admin;
	/// everyone after that gets the requested (or read) role only when an
	/// admin does the registration.
	pub async fn add_user(&self, new_user: ServerUserForAdd, requesting_user: &ConnectedUser) -> Result<ServerUser> {
		let existing = self.store.get_users().await?;
		let role = if existing.is_empty() {
			UserRole::Admin
		} else {
			requesting_user.check_role(&UserRole::Admin)?;
			new_user.role
		};
		if new_user.name.trim().is_empty() {
			return Err(Error::InvalidName(new_user.name));
		}
		if self.store.get_user_by_name(&new_user.name).await?.is_some() {
			return Err(Error::Duplicate(new_user.name));
		}
		let user = ServerUser {
			id: nanoid!(),
			name: new_user.name,
			role,
			password: Some(sha256::digest(new_user.password)),
			added: None,
		};
		self.store.add_user(user.clone()).await?;
		self.get_user_unchecked(&user.id).await
	}

	pub async fn login(&self, name: &str, password: &str) -> SvResult<(ServerUser, String)> {
		let user = self.store.get_user_by_name(name).await?.ok_or(crate::error::Error::LoginFail)?;
		let digest = sha256::digest(password);
		if user.password.as_deref() != Some(digest.as_str()) {
			return Err(crate::error::Error::LoginFail);
		}
		let server_id = get_server_id().await.unwrap_or_default();
		let claims = Claims {
			sub: user.id.clone(),
			name: user.name.clone(),
			aud: server_id,
			exp: get_time().as_secs() + TOKEN_VALIDITY_SECONDS,
		};
		let token = sign(&claims).await?;
		Ok((user, token))
	}
}


#[cfg(test)]
pub(crate) mod test_support {
	use std::sync::Arc;

	use crate::error::SvResult;
	use crate::server::RecognitionConfig;
	use crate::tools::face_inference::test_analyzer::ScriptedAnalyzer;

	use super::store::SqliteStore;
	use super::users::{ConnectedUser, ServerUser, UserRole};
	use super::ModelController;

	impl ModelController {
		/// In-memory controller without a running scheduler; ticks are driven
		/// manually by tests.
		pub(crate) async fn new_for_tests() -> SvResult<Self> {
			Self::new_for_tests_with(Arc::new(ScriptedAnalyzer::new()), RecognitionConfig::default()).await
		}

		pub(crate) async fn new_for_tests_with(analyzer: Arc<ScriptedAnalyzer>, recognition: RecognitionConfig) -> SvResult<Self> {
			let store = SqliteStore::new_memory().await?;
			Ok(Self::assemble(store, analyzer, recognition))
		}

		pub(crate) fn test_store(&self) -> &SqliteStore {
			&self.store
		}
	}

	pub(crate) async fn seed_user(mc: &ModelController, id: &str) -> ConnectedUser {
		let user = ServerUser {
			id: id.to_string(),
			name: format!("user-{}", id),
			role: UserRole::Read,
			password: None,
			added: None,
		};
		mc.test_store().add_user(user.clone()).await.unwrap();
		ConnectedUser::Server(user)
	}
}
