use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use crate::{domain::{people::Person, photo::Photo}, error::SvResult, tools::log::{log_info, LogServiceType}};

use super::{error::{Error, Result}, users::ConnectedUser, ModelController};


#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersonForAdd {
	pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PersonForInsert {
    pub id: String,
    pub user: String,
	pub name: String,
    pub auto_created: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PeopleQuery {
    pub after: Option<i64>,
    pub name: Option<String>,
    pub auto_created: Option<bool>,
}

/// Rename and/or confirm a person. Confirming a match flips `auto_created`
/// back to false so the identity stops being offered as "unknown".
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersonForUpdate {
	pub name: Option<String>,
    pub auto_created: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PeopleMerge {
    pub source_person: String,
    pub target_person: String,
}


impl ModelController {

	pub async fn get_people(&self, query: PeopleQuery, requesting_user: &ConnectedUser) -> Result<Vec<Person>> {
        let user_id = requesting_user.user_id()?;
		let people = self.store.get_people(&user_id, query).await?;
		Ok(people)
	}

    pub async fn get_person(&self, person_id: &str, requesting_user: &ConnectedUser) -> Result<Person> {
		let person = self.store.get_person(person_id).await?.ok_or_else(|| Error::PersonNotFound(person_id.to_string()))?;
        requesting_user.check_owner(&person.user)?;
		Ok(person)
	}

    /// Explicit person creation by a user action; never auto-created.
    pub async fn add_person(&self, new_person: PersonForAdd, requesting_user: &ConnectedUser) -> Result<Person> {
        let user_id = requesting_user.user_id()?;
        let name = new_person.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidName(new_person.name));
        }
        let person = PersonForInsert {
            id: nanoid!(),
            user: user_id,
            name,
            auto_created: false,
        };
		self.store.add_person(person.clone()).await?;
        self.get_person(&person.id, requesting_user).await
	}

    /// Rename or confirm. Mutating an identity makes the cached snapshot
    /// stale, so it is dropped before returning.
    pub async fn update_person(&self, person_id: &str, update: PersonForUpdate, requesting_user: &ConnectedUser) -> Result<Person> {
        let person = self.get_person(person_id, requesting_user).await?;
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidName(name.clone()));
            }
        }
		self.store.update_person(&person.id, update).await?;
        self.invalidate_face_cache(&person.user).await;
        self.get_person(person_id, requesting_user).await
	}

    /// Delete a person and, by cascade, every face record attributed to them.
    pub async fn remove_person(&self, person_id: &str, requesting_user: &ConnectedUser) -> Result<Person> {
        let person = self.get_person(person_id, requesting_user).await?;
        self.store.remove_person(person.id.clone()).await?;
        self.invalidate_face_cache(&person.user).await;
        log_info(LogServiceType::Recognition, format!("Removed person '{}' ({}) and their face records", person.name, person.id));
        Ok(person)
	}

    /// Merge two identities of the same user: every face of the source moves
    /// to the target, then the source is deleted.
    pub async fn merge_people(&self, merge: PeopleMerge, requesting_user: &ConnectedUser) -> SvResult<Person> {
        let source = self.get_person(&merge.source_person, requesting_user).await?;
        let target = self.get_person(&merge.target_person, requesting_user).await?;
        if source.user != target.user {
            return Err(Error::NotOwnerOfElement { user: requesting_user.clone(), element: source.id }.into());
        }
        if source.id == target.id {
            return Err(Error::Duplicate(source.id).into());
        }
        let moved = self.store.move_faces(&source.id, &target.id).await?;
        self.store.remove_person(source.id.clone()).await?;
        self.invalidate_face_cache(&target.user).await;
        log_info(LogServiceType::Recognition, format!("Merged person '{}' into '{}' ({} face(s) moved)", source.name, target.name, moved));
        self.get_person(&target.id, requesting_user).await.map_err(Into::into)
    }

    /// All photos containing this person ("find all photos of X").
    pub async fn get_person_photos(&self, person_id: &str, requesting_user: &ConnectedUser) -> Result<Vec<Photo>> {
        let person = self.get_person(person_id, requesting_user).await?;
        let photos = self.store.get_photos_for_person(&person.id).await?;
        Ok(photos)
    }
}
