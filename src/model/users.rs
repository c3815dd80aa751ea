use std::{cmp::Ordering, str::FromStr};

use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ValueRef},
    ToSql,
};
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

use super::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ConnectedUser {
    Server(ServerUser),
    Anonymous,
    ServerAdmin
}

impl ConnectedUser {
    pub fn is_registered(&self) -> bool {
        matches!(&self, ConnectedUser::Server(_))
    }
    pub fn check_registered(&self) -> Result<ServerUser> {
        if let ConnectedUser::Server(user) = &self {
            Ok(user.clone())
        } else {
            Err(Error::NotServerConnected)
        }
    }

    pub fn is_admin(&self) -> bool {
        if self == &ConnectedUser::ServerAdmin {
            true
        } else if let ConnectedUser::Server(user) = &self {
            user.is_admin()
        } else {
            false
        }
    }

    pub fn user_id(&self) -> Result<String> {
        if let ConnectedUser::Server(user) = &self {
            Ok(user.id.clone())
        } else if let ConnectedUser::ServerAdmin = &self {
            Ok("admin".to_string())
        } else {
            Err(Error::NotServerConnected)
        }
    }

    pub fn user_name(&self) -> Result<String> {
        if let ConnectedUser::Server(user) = &self {
            Ok(user.name.clone())
        } else {
            Err(Error::NotServerConnected)
        }
    }

    pub fn check_role(&self, role: &UserRole) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else if let ConnectedUser::Server(user) = &self {
            if user.has_role(role) {
                Ok(())
            } else {
                Err(Error::InsufficientUserRole { user: self.clone(), role: role.clone() })
            }
        } else {
            Err(Error::InsufficientUserRole { user: self.clone(), role: role.clone() })
        }
    }

    /// All per-user data (photos, people, faces) is private to its owner;
    /// only the owner or an admin may touch it.
    pub fn check_owner(&self, owner_user_id: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else if let ConnectedUser::Server(user) = &self {
            if user.id == owner_user_id {
                Ok(())
            } else {
                Err(Error::NotOwnerOfElement { user: self.clone(), element: owner_user_id.to_string() })
            }
        } else {
            Err(Error::NotServerConnected)
        }
    }
}

// region:    --- User Role
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, EnumString, Default)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum UserRole {
    Admin,
    Read,
    #[default]
    None,
}
impl From<&UserRole> for u8 {
    fn from(role: &UserRole) -> Self {
        match role {
            UserRole::Admin => 254,
            UserRole::Read => 10,
            UserRole::None => 0,
        }
    }
}

impl PartialOrd for UserRole {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let a = u8::from(self);
        let b = u8::from(other);
        Some(a.cmp(&b))
    }
}

impl FromSql for UserRole {
    fn column_result(value: ValueRef) -> FromSqlResult<Self> {
        String::column_result(value).and_then(|as_string| {
            UserRole::from_str(&as_string).map_err(|_| FromSqlError::InvalidType)
        })
    }
}

impl ToSql for UserRole {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            UserRole::Admin => "admin".to_sql(),
            UserRole::Read => "read".to_sql(),
            UserRole::None => "none".to_sql(),
        }
    }
}
// endregion: --- User Role

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerUser {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password: Option<String>,
    pub added: Option<i64>,
}

impl ServerUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
    pub fn has_role(&self, role: &UserRole) -> bool {
        &self.role >= role
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerUserForAdd {
    pub name: String,
    pub role: UserRole,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering() {
        assert!(UserRole::Admin > UserRole::Read);
        assert!(UserRole::Read > UserRole::None);
    }

    #[test]
    fn owner_check() {
        let user = ConnectedUser::Server(ServerUser {
            id: "u1".to_string(),
            name: "user".to_string(),
            role: UserRole::Read,
            password: None,
            added: None,
        });
        assert!(user.check_owner("u1").is_ok());
        assert!(user.check_owner("u2").is_err());
        assert!(ConnectedUser::ServerAdmin.check_owner("u2").is_ok());
        assert!(ConnectedUser::Anonymous.check_owner("u1").is_err());
    }
}
