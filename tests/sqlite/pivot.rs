use crate::common::{Role, User, setup};
use pretty_assertions::assert_eq;
use sluice::core::{ActiveRecord, FetchMode, Model, Value};

fn user(conn: &crate::common::Counting, id: i64) -> Model {
    ActiveRecord::new(conn, &User).find_or_throw(id).unwrap()
}

fn role_names(models: &[Model]) -> Vec<String> {
    models
        .iter()
        .map(|m| m.get_str("name").unwrap().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_through_table_carries_pivot_record() {
    let conn = setup();
    let ada = user(&conn, 1);
    let roles = ada.relation("roles", &conn).unwrap().find_many().unwrap();
    assert_eq!(role_names(&roles), vec!["admin", "editor"]);

    let pivot = roles[0].pivot().expect("pivot record");
    assert_eq!(pivot.table, "user_roles");
    assert!(pivot.entity.is_none());
    assert_eq!(pivot.get("user_id"), Some(&Value::from(1)));
    assert_eq!(pivot.get("role_id"), Some(&Value::from(1)));
    assert_eq!(pivot.get("granted_by"), Some(&Value::from("root")));

    // Pivot columns stay out of the model's own attributes.
    assert_eq!(roles[0].get("granted_by"), None);
    assert_eq!(roles[0].get("pivot_granted_by"), None);
    assert_eq!(roles[0].get("id"), Some(&Value::from(1)));
}

#[test]
fn test_row_output_keeps_prefixed_pivot_columns() {
    let conn = setup();
    let bob = user(&conn, 2);
    let rows = bob
        .relation("roles", &conn)
        .unwrap()
        .fetch_as(FetchMode::Assoc)
        .unwrap()
        .into_rows()
        .unwrap();
    assert_eq!(rows.len(), 1);
    let columns: Vec<&str> = rows[0].columns().iter().map(|c| c.as_str()).collect();
    assert_eq!(
        columns,
        vec!["id", "name", "pivot_role_id", "pivot_user_id", "pivot_granted_by"]
    );
    assert_eq!(rows[0].get("pivot_granted_by"), Some(&Value::from("ada")));
}

#[test]
fn test_json_output_nests_pivot() {
    let conn = setup();
    let bob = user(&conn, 2);
    let json = bob
        .relation("roles", &conn)
        .unwrap()
        .fetch_as(FetchMode::Json)
        .unwrap()
        .into_json()
        .unwrap();
    assert_eq!(json[0]["name"], "editor");
    assert_eq!(json[0]["pivot"]["granted_by"], "ada");
    assert!(json[0].get("pivot_granted_by").is_none());

    let roles = bob.relation("roles", &conn).unwrap().find_many().unwrap();
    assert_eq!(roles.to_json(), serde_json::Value::Array(json));
}

#[test]
fn test_through_model_selects_declared_columns() {
    let conn = setup();
    let ada = user(&conn, 1);
    let grants = ada.relation("grants", &conn).unwrap().find_many().unwrap();
    assert_eq!(grants.len(), 2);

    let pivot = grants[1].pivot().unwrap();
    assert_eq!(pivot.table, "user_roles");
    assert_eq!(pivot.entity.map(|e| e.meta().name), Some("UserRole"));
    assert_eq!(pivot.get("id"), Some(&Value::from(2)));
    assert_eq!(pivot.get("role_id"), Some(&Value::from(2)));
    assert_eq!(pivot.get("granted_by"), Some(&Value::from("root")));
}

#[test]
fn test_where_pivot_filters_link_rows() {
    let conn = setup();
    let ada = user(&conn, 1);
    let bob = user(&conn, 2);
    assert_eq!(ada.relation("root_roles", &conn).unwrap().count().unwrap(), 2);
    assert!(!bob.relation("root_roles", &conn).unwrap().exists().unwrap());
}

#[test]
fn test_inverse_through_relation() {
    let conn = setup();
    let editor = ActiveRecord::new(&conn, &Role).find_or_throw(2).unwrap();
    let users = editor.relation("users", &conn).unwrap().find_many().unwrap();
    assert_eq!(role_names(&users), vec!["ada", "bob"]);
    assert_eq!(users[1].pivot().and_then(|p| p.get("role_id")), Some(&Value::from(2)));

    let viewer = ActiveRecord::new(&conn, &Role).find_or_throw(3).unwrap();
    assert_eq!(viewer.relation("users", &conn).unwrap().count().unwrap(), 0);
}

#[test]
fn test_relation_query_can_be_narrowed() {
    let conn = setup();
    let ada = user(&conn, 1);
    let mut roles = ada.relation("roles", &conn).unwrap();
    roles.r#where("name", "editor");
    let first = roles.first().unwrap().unwrap();
    assert_eq!(first.get_str("name").unwrap(), Some("editor"));
    assert_eq!(first.pivot().and_then(|p| p.get("id")), None);
}

#[test]
fn test_fetch_map_sees_decoded_models() {
    let conn = setup();
    let ada = user(&conn, 1);
    let granted: Vec<String> = ada
        .relation("roles", &conn)
        .unwrap()
        .fetch_map(|role| {
            let by = role
                .pivot()
                .and_then(|p| p.get("granted_by"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(format!("{}:{by}", role.get_str("name")?.unwrap_or_default()))
        })
        .unwrap();
    assert_eq!(granted, vec!["admin:root", "editor:root"]);
}

#[test]
fn test_eager_through_relation_groups_by_pivot() {
    let conn = setup();
    conn.reset();
    let users = ActiveRecord::new(&conn, &User)
        .with("roles")
        .find_many()
        .unwrap();
    assert_eq!(conn.count(), 2);

    let roles_of = |index: usize| {
        users[index]
            .related("roles")
            .and_then(|r| r.as_many())
            .map(|roles| role_names(roles))
            .unwrap_or_default()
    };
    assert_eq!(roles_of(0), vec!["admin", "editor"]);
    assert_eq!(roles_of(1), vec!["editor"]);
    assert_eq!(roles_of(2), Vec::<String>::new());

    let json = users[1].to_json();
    assert_eq!(json["roles"][0]["pivot"]["user_id"], 2);
}

#[test]
fn test_unsaved_owner_has_no_related_rows() {
    let conn = setup();
    let ghost = Model::new(&User);
    conn.reset();
    let roles = ghost.relation("roles", &conn).unwrap().find_many().unwrap();
    assert!(roles.is_empty());
    assert!(conn.log()[0].contains("0 = 1"));
}
