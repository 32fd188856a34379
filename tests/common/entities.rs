use std::cell::Cell;

use sluice::core::{
    Action, ActiveRecord, Connection, Entity, EntityMeta, HookOutcome, Model, Relation,
    SluiceError, Value,
};
use sluice::Result;

pub struct User;
pub struct Profile;
pub struct Post;
pub struct Comment;
pub struct Role;
pub struct UserRole;
pub struct Membership;

impl Entity for User {
    fn meta(&self) -> &EntityMeta {
        static META: EntityMeta = EntityMeta::new("User", "users").columns(&[
            "id",
            "name",
            "email",
            "active",
            "deleted_at",
            "created_at",
        ]);
        &META
    }

    fn scope(&self, name: &str, query: &mut ActiveRecord<'_>, args: &[Value]) -> Result<()> {
        match name {
            "active" => {
                query.r#where("active", 1);
            }
            "named" => {
                let value = args.first().cloned().unwrap_or_default();
                query.r#where("name", value);
            }
            // Queues another scope while being applied.
            "active_named" => {
                query.add_scope("active", Vec::<Value>::new());
                query.add_scope("named", args.to_vec());
            }
            other => {
                return Err(SluiceError::composition(format!("User has no scope '{other}'")));
            }
        }
        Ok(())
    }

    fn default_scope(&self, query: &mut ActiveRecord<'_>) -> Result<()> {
        query.where_null("deleted_at");
        Ok(())
    }

    fn relation<'c>(
        &self,
        name: &str,
        owner: &Model,
        conn: &'c dyn Connection,
    ) -> Option<Relation<'c>> {
        Some(match name {
            "posts" => Relation::has_many(conn, &Post, owner, "user_id", "id"),
            "profile" => Relation::has_one(conn, &Profile, owner, "user_id", "id"),
            "roles" => Relation::has_many(conn, &Role, owner, "id", "id")
                .through_table("user_roles", "role_id", "user_id")
                .pivot_key(["id"])
                .with_pivot(["granted_by"]),
            "root_roles" => Relation::has_many(conn, &Role, owner, "id", "id")
                .through_table("user_roles", "role_id", "user_id")
                .where_pivot("granted_by", "root"),
            "grants" => Relation::has_many(conn, &Role, owner, "id", "id").through_model(
                &UserRole,
                "role_id",
                "user_id",
            ),
            _ => return None,
        })
    }

    fn saving(&self, model: &Model, _action: Action) -> HookOutcome {
        if model.get_str("name").ok().flatten() == Some("blocked") {
            HookOutcome::Cancel
        } else {
            HookOutcome::Continue
        }
    }
}

impl Entity for Profile {
    fn meta(&self) -> &EntityMeta {
        static META: EntityMeta = EntityMeta::new("Profile", "profiles");
        &META
    }

    fn relation<'c>(
        &self,
        name: &str,
        owner: &Model,
        conn: &'c dyn Connection,
    ) -> Option<Relation<'c>> {
        match name {
            "user" => Some(Relation::belongs_to(conn, &User, owner, "user_id", "id")),
            _ => None,
        }
    }
}

impl Entity for Post {
    fn meta(&self) -> &EntityMeta {
        static META: EntityMeta = EntityMeta::new("Post", "posts");
        &META
    }

    fn scope(&self, name: &str, query: &mut ActiveRecord<'_>, _args: &[Value]) -> Result<()> {
        match name {
            "published" => {
                query.r#where("published", 1);
                Ok(())
            }
            other => Err(SluiceError::composition(format!("Post has no scope '{other}'"))),
        }
    }

    fn relation<'c>(
        &self,
        name: &str,
        owner: &Model,
        conn: &'c dyn Connection,
    ) -> Option<Relation<'c>> {
        match name {
            "author" => Some(Relation::belongs_to(conn, &User, owner, "user_id", "id")),
            "comments" => Some(Relation::has_many(conn, &Comment, owner, "post_id", "id")),
            _ => None,
        }
    }
}

impl Entity for Comment {
    fn meta(&self) -> &EntityMeta {
        static META: EntityMeta = EntityMeta::new("Comment", "comments");
        &META
    }

    fn relation<'c>(
        &self,
        name: &str,
        owner: &Model,
        conn: &'c dyn Connection,
    ) -> Option<Relation<'c>> {
        match name {
            "post" => Some(Relation::belongs_to(conn, &Post, owner, "post_id", "id")),
            _ => None,
        }
    }
}

impl Entity for Role {
    fn meta(&self) -> &EntityMeta {
        static META: EntityMeta = EntityMeta::new("Role", "roles");
        &META
    }

    fn relation<'c>(
        &self,
        name: &str,
        owner: &Model,
        conn: &'c dyn Connection,
    ) -> Option<Relation<'c>> {
        match name {
            "users" => Some(
                Relation::has_many(conn, &User, owner, "id", "id")
                    .through_table("user_roles", "user_id", "role_id"),
            ),
            _ => None,
        }
    }
}

impl Entity for UserRole {
    fn meta(&self) -> &EntityMeta {
        static META: EntityMeta = EntityMeta::new("UserRole", "user_roles")
            .columns(&["id", "user_id", "role_id", "granted_by"]);
        &META
    }
}

impl Entity for Membership {
    fn meta(&self) -> &EntityMeta {
        static META: EntityMeta =
            EntityMeta::new("Membership", "memberships").primary(&["org_id", "user_id"]);
        &META
    }
}

thread_local! {
    static AUDITED: Cell<usize> = const { Cell::new(0) };
}

/// A user mapping whose save hook counts every call.
pub struct AuditedUser;

impl AuditedUser {
    pub fn calls() -> usize {
        AUDITED.with(Cell::get)
    }
}

impl Entity for AuditedUser {
    fn meta(&self) -> &EntityMeta {
        static META: EntityMeta = EntityMeta::new("User", "users");
        &META
    }

    fn saving(&self, _model: &Model, _action: Action) -> HookOutcome {
        AUDITED.with(|calls| calls.set(calls.get() + 1));
        HookOutcome::Continue
    }
}
