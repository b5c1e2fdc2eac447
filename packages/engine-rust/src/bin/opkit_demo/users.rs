//! In-memory user directory exposed as three operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use opkit::dispatch::{Group, GroupHooks, Handler, Operation, RegistryBuilder};
use opkit_core::{describe_struct, ExecutionContext};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

describe_struct! {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct User {
        pub id: String,
        pub name: String,
        pub authority: String => "enum:admin,user",
        #[serde(default)]
        pub groups: Vec<String> => "optional:true",
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }
}

describe_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SaveUserInput {
        /// Existing user to update; a new id is generated when absent.
        #[serde(default)]
        pub id: Option<String> => "optional:true",
        pub name: String,
        pub authority: String => "enum:admin,user",
        #[serde(default)]
        pub groups: Vec<String> => "optional:true",
    }
}

describe_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SaveUserOutput {
        pub user: User,
    }
}

describe_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GetUserInput {
        pub id: String,
    }
}

describe_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GetUserOutput {
        pub user: User,
    }
}

describe_struct! {
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct FindUsersInput {
        #[serde(default)]
        pub authority: Option<String> => "optional:true;enum:admin,user",
        #[serde(default)]
        pub name_prefix: Option<String> => "optional:true",
    }
}

describe_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FindUsersOutput {
        pub users: Vec<User> => "optional:true",
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Users keyed by id.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: RwLock<BTreeMap<String, User>>,
}

impl UserDirectory {
    /// A directory holding two well-known accounts.
    pub fn seeded() -> Self {
        let epoch = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        let seed = |id: &str, name: &str, authority: &str, groups: &[&str]| User {
            id: id.to_string(),
            name: name.to_string(),
            authority: authority.to_string(),
            groups: groups.iter().map(ToString::to_string).collect(),
            created_at: epoch,
            updated_at: epoch,
        };

        let dir = Self::default();
        {
            let mut users = dir.users.write();
            for user in [
                seed("u-admin", "Ada", "admin", &["ops"]),
                seed("u-guest", "Grace", "user", &[]),
            ] {
                users.insert(user.id.clone(), user);
            }
        }
        dir
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub struct SaveUser {
    dir: Arc<UserDirectory>,
}

impl Handler<SaveUserInput, SaveUserOutput> for SaveUser {
    fn execute(&self, ctx: &ExecutionContext, input: &SaveUserInput) -> anyhow::Result<SaveUserOutput> {
        let now = ctx.execute_time();
        let mut users = self.dir.users.write();

        let user = match input.id.as_deref().and_then(|id| users.get(id)) {
            Some(existing) => User {
                name: input.name.clone(),
                authority: input.authority.clone(),
                groups: input.groups.clone(),
                updated_at: now,
                ..existing.clone()
            },
            None => User {
                id: input
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                name: input.name.clone(),
                authority: input.authority.clone(),
                groups: input.groups.clone(),
                created_at: now,
                updated_at: now,
            },
        };

        users.insert(user.id.clone(), user.clone());
        Ok(SaveUserOutput { user })
    }
}

pub struct GetUser {
    dir: Arc<UserDirectory>,
}

impl Handler<GetUserInput, GetUserOutput> for GetUser {
    fn execute(&self, _ctx: &ExecutionContext, input: &GetUserInput) -> anyhow::Result<GetUserOutput> {
        self.dir
            .users
            .read()
            .get(&input.id)
            .cloned()
            .map(|user| GetUserOutput { user })
            .ok_or_else(|| anyhow!("user {} not found", input.id))
    }
}

pub struct FindUsers {
    dir: Arc<UserDirectory>,
}

impl Handler<FindUsersInput, FindUsersOutput> for FindUsers {
    fn execute(&self, _ctx: &ExecutionContext, input: &FindUsersInput) -> anyhow::Result<FindUsersOutput> {
        let users = self
            .dir
            .users
            .read()
            .values()
            .filter(|u| input.authority.as_ref().is_none_or(|a| &u.authority == a))
            .filter(|u| {
                input
                    .name_prefix
                    .as_ref()
                    .is_none_or(|p| u.name.starts_with(p.as_str()))
            })
            .cloned()
            .collect();
        Ok(FindUsersOutput { users })
    }
}

/// Registers the user operations. Writes belong to the `writes` group.
pub fn register(builder: RegistryBuilder, dir: &Arc<UserDirectory>, writes: GroupHooks) -> RegistryBuilder {
    let writes = Arc::new(Group::with_hooks("writes", writes));

    builder
        .register(
            Operation::builder(SaveUser {
                dir: Arc::clone(dir),
            })
            .with_description("Create or update a user")
            .with_group(writes)
            .build(),
        )
        .register(
            Operation::builder(GetUser {
                dir: Arc::clone(dir),
            })
            .with_description("Fetch a user by id")
            .build(),
        )
        .register(
            Operation::builder(FindUsers {
                dir: Arc::clone(dir),
            })
            .with_description("List users, optionally filtered by authority or name prefix")
            .build(),
        )
}
