use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::Result;
use crate::model::{
    db::{admin::Admin, voter::Voter},
    mongodb::Id,
};
use crate::store::Store;

/// A user of our application, having defined rights.
#[rocket::async_trait]
pub trait User: Sized {
    /// The rights of this user type.
    const RIGHTS: Rights;

    /// Get the user's ID.
    fn id(&self) -> Id;

    /// Look the user up by ID.
    async fn find(store: &dyn Store, id: Id) -> Result<Option<Self>>;
}

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Admin = 1,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Self::Voter => "voter",
            Self::Admin => "admin",
        })
    }
}

#[rocket::async_trait]
impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;

    fn id(&self) -> Id {
        self.id
    }

    async fn find(store: &dyn Store, id: Id) -> Result<Option<Self>> {
        store.voter(id).await
    }
}

#[rocket::async_trait]
impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;

    fn id(&self) -> Id {
        self.id
    }

    async fn find(store: &dyn Store, id: Id) -> Result<Option<Self>> {
        store.admin(id).await
    }
}
