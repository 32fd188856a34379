use crate::common::{Counting, Post, Role, User, setup};
use pretty_assertions::assert_eq;
use sluice::core::{ActiveRecord, Attributes, Model, Outcome, SluiceError, Value};

fn user(conn: &Counting, id: i64) -> Model {
    ActiveRecord::new(conn, &User).find_or_throw(id).unwrap()
}

fn post(conn: &Counting, id: i64) -> Model {
    ActiveRecord::new(conn, &Post).find_or_throw(id).unwrap()
}

fn author_of(conn: &Counting, post: i64) -> Value {
    conn.scalar(&format!("SELECT user_id FROM posts WHERE id = {post}"))
}

/// `(user_id, role_id)` link pairs, ordered.
fn links(conn: &Counting) -> Vec<(i64, i64)> {
    let mut stmt = conn
        .inner()
        .inner()
        .prepare("SELECT user_id, role_id FROM user_roles ORDER BY user_id, role_id")
        .unwrap();
    let pairs = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap();
    pairs
}

// ==================== direct relations ====================

#[test]
fn test_associate_moves_target_foreign_key() {
    let conn = setup();
    let mut bob = user(&conn, 2);
    let outcome = bob
        .relation("posts", &conn)
        .unwrap()
        .associate(&mut bob, 4)
        .unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(author_of(&conn, 4), Value::from(2));
}

#[test]
fn test_belongs_to_associate_saves_the_owner() {
    let conn = setup();
    let mut orphan = post(&conn, 4);
    orphan
        .relation("author", &conn)
        .unwrap()
        .associate(&mut orphan, 3)
        .unwrap();
    assert_eq!(orphan.get_i64("user_id").unwrap(), Some(3));
    assert!(!orphan.is_dirty());
    assert_eq!(author_of(&conn, 4), Value::from(3));
}

#[test]
fn test_belongs_to_associate_on_unsaved_owner() {
    let conn = setup();
    let mut draft = Model::with_attributes(&Post, Attributes::from([("title", "Later")]));
    conn.reset();
    draft
        .relation("author", &conn)
        .unwrap()
        .associate(&mut draft, 1)
        .unwrap();
    assert_eq!(conn.count(), 0);
    assert_eq!(draft.get_i64("user_id").unwrap(), Some(1));
}

#[test]
fn test_belongs_to_dissociate() {
    let conn = setup();
    let mut hello = post(&conn, 1);
    hello
        .relation("author", &conn)
        .unwrap()
        .dissociate(&mut hello)
        .unwrap();
    assert_eq!(hello.get("user_id"), Some(&Value::Null));
    assert_eq!(author_of(&conn, 1), Value::Null);
}

#[test]
fn test_has_many_dissociate_releases_every_target() {
    let conn = setup();
    let mut ada = user(&conn, 1);
    ada.relation("posts", &conn)
        .unwrap()
        .dissociate(&mut ada)
        .unwrap();
    assert_eq!(author_of(&conn, 1), Value::Null);
    assert_eq!(author_of(&conn, 2), Value::Null);
    assert_eq!(author_of(&conn, 3), Value::from(2));
}

#[test]
fn test_add_model_sets_foreign_key_and_saves() {
    let conn = setup();
    let bob = user(&conn, 2);
    let mut draft = Model::with_attributes(&Post, Attributes::from([("title", "Second")]));
    let outcome = bob
        .relation("posts", &conn)
        .unwrap()
        .add_model(&mut draft)
        .unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(draft.exists());
    assert_eq!(draft.get_i64("id").unwrap(), Some(5));
    assert_eq!(author_of(&conn, 5), Value::from(2));
}

#[test]
fn test_hold_takes_targets_from_other_owners() {
    let conn = setup();
    let bob = user(&conn, 2);
    let moved = bob.relation("posts", &conn).unwrap().hold([1, 4]).unwrap();
    assert_eq!(moved, 2);
    assert_eq!(author_of(&conn, 1), Value::from(2));
    assert_eq!(author_of(&conn, 4), Value::from(2));
    assert_eq!(author_of(&conn, 2), Value::from(1));
}

#[test]
fn test_hold_shared_only_claims_free_targets() {
    let conn = setup();
    let bob = user(&conn, 2);
    let moved = bob
        .relation("posts", &conn)
        .unwrap()
        .hold_shared([1, 3, 4])
        .unwrap();
    // Post 3 is already bob's and is rewritten in place.
    assert_eq!(moved, 2);
    assert_eq!(author_of(&conn, 1), Value::from(1));
    assert_eq!(author_of(&conn, 4), Value::from(2));
}

#[test]
fn test_freed_only_touches_own_targets() {
    let conn = setup();
    let ada = user(&conn, 1);
    let freed = ada.relation("posts", &conn).unwrap().freed([1, 3]).unwrap();
    assert_eq!(freed, 1);
    assert_eq!(author_of(&conn, 1), Value::Null);
    assert_eq!(author_of(&conn, 3), Value::from(2));
}

#[test]
fn test_free_value_replaces_null() {
    let conn = setup();
    let ada = user(&conn, 1);
    let mut posts = ada.relation("posts", &conn).unwrap().free_value(0);
    assert_eq!(posts.freed_all().unwrap(), 2);
    assert_eq!(author_of(&conn, 2), Value::from(0));
}

#[test]
fn test_remove_deletes_own_targets() {
    let conn = setup();
    let ada = user(&conn, 1);
    assert_eq!(ada.relation("posts", &conn).unwrap().remove([2, 3]).unwrap(), 1);
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM posts"), Value::from(3));

    let bob = user(&conn, 2);
    assert_eq!(bob.relation("posts", &conn).unwrap().remove_all().unwrap(), 1);
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM posts"), Value::from(2));
}

#[test]
fn test_set_operations_need_a_has_relation() {
    let conn = setup();
    let hello = post(&conn, 1);
    let err = hello.relation("author", &conn).unwrap().hold([2]).unwrap_err();
    assert!(matches!(err, SluiceError::Composition(_)));
}

#[test]
fn test_set_operations_need_a_saved_owner() {
    let conn = setup();
    let ghost = Model::new(&User);
    let err = ghost.relation("posts", &conn).unwrap().hold([1]).unwrap_err();
    assert!(matches!(err, SluiceError::Composition(_)));
}

#[test]
fn test_empty_id_lists_do_nothing() {
    let conn = setup();
    let ada = user(&conn, 1);
    conn.reset();
    let mut posts = ada.relation("posts", &conn).unwrap();
    assert_eq!(posts.hold(Vec::<i64>::new()).unwrap(), 0);
    assert_eq!(posts.freed(Vec::<i64>::new()).unwrap(), 0);
    assert_eq!(posts.remove(Vec::<i64>::new()).unwrap(), 0);
    assert_eq!(conn.count(), 0);
}

// ==================== through relations ====================

#[test]
fn test_associate_inserts_link_once() {
    let conn = setup();
    let mut bob = user(&conn, 2);
    let mut roles = bob.relation("roles", &conn).unwrap();
    roles.associate(&mut bob, 3).unwrap();
    roles.associate(&mut bob, 3).unwrap();
    assert_eq!(links(&conn), vec![(1, 1), (1, 2), (2, 2), (2, 3)]);
}

#[test]
fn test_associate_with_writes_extra_columns() {
    let conn = setup();
    let mut bob = user(&conn, 2);
    bob.relation("roles", &conn)
        .unwrap()
        .associate_with(&mut bob, 3, &Attributes::from([("granted_by", "ada")]))
        .unwrap();
    assert_eq!(
        conn.scalar("SELECT granted_by FROM user_roles WHERE user_id = 2 AND role_id = 3"),
        Value::from("ada")
    );

    // An existing link only has its extras updated.
    bob.relation("roles", &conn)
        .unwrap()
        .associate_with(&mut bob, 3, &Attributes::from([("granted_by", "root")]))
        .unwrap();
    assert_eq!(
        conn.scalar("SELECT COUNT(*) FROM user_roles WHERE user_id = 2 AND role_id = 3"),
        Value::from(1)
    );
    assert_eq!(
        conn.scalar("SELECT granted_by FROM user_roles WHERE user_id = 2 AND role_id = 3"),
        Value::from("root")
    );
}

#[test]
fn test_pinned_pivot_values_are_written() {
    let conn = setup();
    let mut bob = user(&conn, 2);
    bob.relation("root_roles", &conn)
        .unwrap()
        .associate(&mut bob, 1)
        .unwrap();
    assert_eq!(
        conn.scalar("SELECT granted_by FROM user_roles WHERE user_id = 2 AND role_id = 1"),
        Value::from("root")
    );
    assert_eq!(bob.relation("root_roles", &conn).unwrap().count().unwrap(), 1);
}

#[test]
fn test_associate_rejects_many_keys() {
    let conn = setup();
    let mut bob = user(&conn, 2);
    let err = bob
        .relation("roles", &conn)
        .unwrap()
        .associate(&mut bob, sluice::core::PrimaryKey::many([1, 2]))
        .unwrap_err();
    assert!(matches!(err, SluiceError::Composition(_)));
}

#[test]
fn test_dissociate_deletes_owner_links() {
    let conn = setup();
    let mut ada = user(&conn, 1);
    ada.relation("roles", &conn)
        .unwrap()
        .dissociate(&mut ada)
        .unwrap();
    assert_eq!(links(&conn), vec![(2, 2)]);
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM roles"), Value::from(3));
}

#[test]
fn test_add_collection_saves_and_links() {
    let conn = setup();
    let viewer = ActiveRecord::new(&conn, &Role).find_or_throw(3).unwrap();
    let mut users = vec![
        Model::with_attributes(&User, Attributes::from([("name", "zed")])),
        Model::with_attributes(&User, Attributes::from([("name", "blocked")])),
    ];
    let outcomes = viewer
        .relation("users", &conn)
        .unwrap()
        .add_collection(&mut users)
        .unwrap();
    assert_eq!(outcomes, vec![Outcome::Done, Outcome::Cancelled]);
    assert!(users[0].exists());
    assert!(!users[1].exists());
    assert_eq!(links(&conn).last(), Some(&(5, 3)));
    assert_eq!(links(&conn).len(), 4);
}

#[test]
fn test_hold_is_exclusive_for_links() {
    let conn = setup();
    let bob = user(&conn, 2);
    let added = bob.relation("roles", &conn).unwrap().hold([2, 3]).unwrap();
    assert_eq!(added, 1);
    // Ada loses editor; bob keeps editor and gains viewer.
    assert_eq!(links(&conn), vec![(1, 1), (2, 2), (2, 3)]);
}

#[test]
fn test_hold_shared_only_adds_links() {
    let conn = setup();
    let bob = user(&conn, 2);
    let added = bob
        .relation("roles", &conn)
        .unwrap()
        .hold_shared([1, 2])
        .unwrap();
    assert_eq!(added, 1);
    assert_eq!(links(&conn), vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
}

#[test]
fn test_freed_deletes_only_named_links() {
    let conn = setup();
    let ada = user(&conn, 1);
    let freed = ada.relation("roles", &conn).unwrap().freed([2, 3]).unwrap();
    assert_eq!(freed, 1);
    assert_eq!(links(&conn), vec![(1, 1), (2, 2)]);
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM roles"), Value::from(3));
}

#[test]
fn test_remove_deletes_links_and_targets() {
    let conn = setup();
    let ada = user(&conn, 1);
    let removed = ada.relation("roles", &conn).unwrap().remove([1]).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(links(&conn), vec![(1, 2), (2, 2)]);
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM roles"), Value::from(2));

    let bob = user(&conn, 2);
    assert_eq!(bob.relation("roles", &conn).unwrap().remove_all().unwrap(), 0);
    assert_eq!(links(&conn), vec![(1, 2)]);
    // Ada still links the editor role, so it survives.
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM roles"), Value::from(2));
}

#[test]
fn test_remove_keeps_targets_shared_with_other_owners() {
    let conn = setup();
    let ada = user(&conn, 1);
    let bob = user(&conn, 2);
    let removed = ada.relation("roles", &conn).unwrap().remove([2]).unwrap();
    assert_eq!(removed, 0);
    assert_eq!(links(&conn), vec![(1, 1), (2, 2)]);
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM roles"), Value::from(3));

    let editor = bob.relation("roles", &conn).unwrap().find_many().unwrap();
    assert_eq!(editor.len(), 1);
    assert_eq!(editor[0].get_str("name").unwrap(), Some("editor"));

    // Once the last link goes, the target goes with it.
    assert_eq!(bob.relation("roles", &conn).unwrap().remove([2]).unwrap(), 1);
    assert_eq!(links(&conn), vec![(1, 1)]);
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM roles"), Value::from(2));
}

#[test]
fn test_freed_leaves_other_owners_intact() {
    let conn = setup();
    let ada = user(&conn, 1);
    let bob = user(&conn, 2);
    assert_eq!(ada.relation("roles", &conn).unwrap().freed([2]).unwrap(), 1);
    assert_eq!(links(&conn), vec![(1, 1), (2, 2)]);
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM roles"), Value::from(3));
    assert_eq!(bob.relation("roles", &conn).unwrap().count().unwrap(), 1);
}

#[test]
fn test_direct_freed_and_remove_leave_other_owners_intact() {
    let conn = setup();
    let ada = user(&conn, 1);
    // Post 3 belongs to bob; neither call may touch it.
    let mut posts = ada.relation("posts", &conn).unwrap();
    assert_eq!(posts.freed([3]).unwrap(), 0);
    let mut posts = ada.relation("posts", &conn).unwrap();
    assert_eq!(posts.remove([3]).unwrap(), 0);
    assert_eq!(author_of(&conn, 3), Value::from(2));
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM posts"), Value::from(4));
}

#[test]
fn test_freed_all_through_where_pivot_keeps_other_links() {
    let conn = setup();
    conn.inner()
        .execute_batch("INSERT INTO user_roles (user_id, role_id, granted_by) VALUES (1, 3, 'bob')")
        .unwrap();
    let ada = user(&conn, 1);
    let freed = ada.relation("root_roles", &conn).unwrap().freed_all().unwrap();
    assert_eq!(freed, 2);
    assert_eq!(links(&conn), vec![(1, 3), (2, 2)]);
}
