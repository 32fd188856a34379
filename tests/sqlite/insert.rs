use crate::common::{Counting, Membership, User, setup, setup_with};
use pretty_assertions::assert_eq;
use sluice::core::{ActiveRecord, Attributes, Builder, InsertIdMode, SluiceError, Value};
use sluice::sqlite::SQLiteConfig;

fn name_of(conn: &Counting, id: &Value) -> Value {
    conn.scalar(&format!("SELECT name FROM users WHERE id = {id}"))
}

fn user_rows() -> Vec<Attributes> {
    vec![
        Attributes::from([("name", "eve")]),
        Attributes::from([("name", "fay"), ("email", "fay@example.com")]),
        Attributes::from([("name", "gus")]),
    ]
}

#[test]
fn test_ids_follow_input_order_across_shapes() {
    let conn = setup();
    let rows = user_rows();
    let result = ActiveRecord::new(&conn, &User).insert(&rows).unwrap();
    assert_eq!(result.affected, 3);
    assert_eq!(result.ids.len(), 3);
    for (row, id) in rows.iter().zip(&result.ids) {
        assert_eq!(&name_of(&conn, id), row.get("name").unwrap());
    }
}

#[test]
fn test_rows_carrying_their_key_report_it() {
    let conn = setup();
    let rows = vec![
        Attributes::from([("id", Value::from(40)), ("name", Value::from("x"))]),
        Attributes::from([("id", Value::from(30)), ("name", Value::from("y"))]),
    ];
    let result = ActiveRecord::new(&conn, &User).insert(&rows).unwrap();
    assert_eq!(result.ids, vec![Value::from(40), Value::from(30)]);
}

#[test]
fn test_null_key_falls_back_to_generated_ids() {
    let conn = setup();
    let rows = vec![
        Attributes::from([("id", Value::from(20)), ("name", Value::from("x"))]),
        Attributes::from([("id", Value::Null), ("name", Value::from("y"))]),
    ];
    let result = ActiveRecord::new(&conn, &User).insert(&rows).unwrap();
    assert_eq!(result.ids, vec![Value::from(20), Value::from(21)]);
    assert_eq!(name_of(&conn, &Value::from(21)), Value::from("y"));
}

#[test]
fn test_null_key_before_explicit_key() {
    let conn = setup();
    let rows = vec![
        Attributes::from([("id", Value::Null), ("name", Value::from("y"))]),
        Attributes::from([("id", Value::from(20)), ("name", Value::from("x"))]),
    ];
    let result = ActiveRecord::new(&conn, &User).insert(&rows).unwrap();
    assert_eq!(result.ids, vec![Value::from(21), Value::from(20)]);
    assert_eq!(name_of(&conn, &result.ids[0]), Value::from("y"));
    assert_eq!(name_of(&conn, &result.ids[1]), Value::from("x"));
}

#[test]
fn test_interleaved_null_and_explicit_keys() {
    let conn = setup();
    let rows: Vec<Attributes> = [(None, "a"), (Some(30), "b"), (None, "c"), (Some(10), "d")]
        .into_iter()
        .map(|(id, name)| Attributes::from([("id", Value::from(id)), ("name", Value::from(name))]))
        .collect();
    conn.reset();
    let result = ActiveRecord::new(&conn, &User).insert(&rows).unwrap();
    // One statement for the explicit keys, one for the generated ones.
    assert_eq!(conn.count(), 2);
    assert_eq!(
        result.ids,
        vec![Value::from(31), Value::from(30), Value::from(32), Value::from(10)]
    );
    for (row, id) in rows.iter().zip(&result.ids) {
        assert_eq!(&name_of(&conn, id), row.get("name").unwrap());
    }
}

#[test]
fn test_one_statement_per_shape() {
    let conn = setup();
    conn.reset();
    ActiveRecord::new(&conn, &User).insert(&user_rows()).unwrap();
    assert_eq!(conn.count(), 2);
}

#[test]
fn test_binding_limit_splits_batches() {
    let conn = setup_with(SQLiteConfig::memory().max_bindings(3));
    let rows: Vec<Attributes> = (0..5)
        .map(|i| Attributes::from([("name", format!("n{i}"))]))
        .collect();
    conn.reset();
    let result = ActiveRecord::new(&conn, &User).insert(&rows).unwrap();
    // Batches of 3 and 2.
    assert_eq!(conn.count(), 2);
    assert_eq!(result.affected, 5);
    for (row, id) in rows.iter().zip(&result.ids) {
        assert_eq!(&name_of(&conn, id), row.get("name").unwrap());
    }
}

#[test]
fn test_single_row_mode_inserts_one_at_a_time() {
    let conn = setup_with(SQLiteConfig::memory().insert_id_mode(InsertIdMode::SingleRowOnly));
    let rows: Vec<Attributes> = (0..3)
        .map(|i| Attributes::from([("name", format!("n{i}"))]))
        .collect();
    conn.reset();
    let result = ActiveRecord::new(&conn, &User).insert(&rows).unwrap();
    assert_eq!(conn.count(), 3);
    assert_eq!(result.ids, vec![Value::from(5), Value::from(6), Value::from(7)]);
}

#[test]
fn test_default_values_rows() {
    let conn = setup();
    conn.inner()
        .execute_batch("CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT DEFAULT 'none')")
        .unwrap();
    let result = Builder::table("tags")
        .insert(&conn, &[Attributes::new(), Attributes::new()], false)
        .unwrap();
    assert_eq!(result.ids, vec![Value::from(1), Value::from(2)]);
    assert_eq!(
        conn.scalar("SELECT label FROM tags WHERE id = 2"),
        Value::from("none")
    );
}

#[test]
fn test_replace_overwrites_conflicting_rows() {
    let conn = setup();
    Builder::table("roles")
        .insert(
            &conn,
            &[Attributes::from([("id", Value::from(1)), ("name", Value::from("owner"))])],
            true,
        )
        .unwrap();
    assert_eq!(
        conn.scalar("SELECT name FROM roles WHERE id = 1"),
        Value::from("owner")
    );
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM roles"), Value::from(3));
}

#[test]
fn test_failed_batch_rolls_back_every_shape() {
    let conn = setup();
    // The two-column shape is written first and succeeds.
    let rows = vec![
        Attributes::new().with("name", Value::Null),
        Attributes::from([("name", "ok"), ("email", "ok@example.com")]),
    ];
    let err = ActiveRecord::new(&conn, &User).insert(&rows).unwrap_err();
    assert!(matches!(err, SluiceError::Execution { .. }));
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM users"), Value::from(4));
}

#[test]
fn test_empty_insert_is_a_no_op() {
    let conn = setup();
    conn.reset();
    let result = ActiveRecord::new(&conn, &User).insert(&[]).unwrap();
    assert!(result.ids.is_empty());
    assert_eq!(result.affected, 0);
    assert_eq!(conn.count(), 0);
}

// ==================== upsert ====================

#[test]
fn test_upsert_updates_existing_and_inserts_new() {
    let conn = setup();
    let rows = vec![
        Attributes::from([("email", "ada@example.com"), ("name", "Ada")]),
        Attributes::from([("email", "hal@example.com"), ("name", "hal")]),
    ];
    conn.reset();
    let affected = ActiveRecord::new(&conn, &User)
        .upsert(&rows, &["email"])
        .unwrap();
    assert_eq!(affected, 2);
    // Lookup, update, insert.
    assert_eq!(conn.count(), 3);
    assert_eq!(name_of(&conn, &Value::from(1)), Value::from("Ada"));
    assert_eq!(
        conn.scalar("SELECT name FROM users WHERE email = 'hal@example.com'"),
        Value::from("hal")
    );
}

#[test]
fn test_upsert_on_composite_search_columns() {
    let conn = setup();
    let rows = vec![
        Attributes::from([
            ("org_id", Value::from(10)),
            ("user_id", Value::from(1)),
            ("level", Value::from("admin")),
        ]),
        Attributes::from([
            ("org_id", Value::from(30)),
            ("user_id", Value::from(1)),
            ("level", Value::from("member")),
        ]),
    ];
    let affected = ActiveRecord::new(&conn, &Membership)
        .upsert(&rows, &["org_id", "user_id"])
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(
        conn.scalar("SELECT level FROM memberships WHERE org_id = 10 AND user_id = 1"),
        Value::from("admin")
    );
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM memberships"), Value::from(4));
}

#[test]
fn test_upsert_requires_search_values() {
    let conn = setup();
    let rows = vec![Attributes::from([("name", "nobody")])];
    let err = ActiveRecord::new(&conn, &User)
        .upsert(&rows, &["email"])
        .unwrap_err();
    assert!(matches!(err, SluiceError::Composition(_)));

    let err = ActiveRecord::new(&conn, &User).upsert(&rows, &[]).unwrap_err();
    assert!(matches!(err, SluiceError::Composition(_)));
}

#[test]
fn test_upsert_failure_rolls_back_updates() {
    let conn = setup();
    let rows = vec![
        Attributes::from([("email", "ada@example.com"), ("name", "changed")]),
        Attributes::new()
            .with("email", "ivy@example.com")
            .with("name", Value::Null),
    ];
    let err = ActiveRecord::new(&conn, &User)
        .upsert(&rows, &["email"])
        .unwrap_err();
    assert!(err.sql().is_some());
    assert_eq!(name_of(&conn, &Value::from(1)), Value::from("ada"));
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM users"), Value::from(4));
}
