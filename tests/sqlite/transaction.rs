use crate::common::{Counting, User, setup, setup_with};
use pretty_assertions::assert_eq;
use sluice::core::{ActiveRecord, Attributes, Builder, SluiceError, Value, transaction};
use sluice::sqlite::{SQLiteConfig, SQLiteTransactionType};

fn user_count(conn: &Counting) -> Value {
    conn.scalar("SELECT COUNT(*) FROM users")
}

fn add(conn: &Counting, name: &str) -> sluice::Result<()> {
    ActiveRecord::new(conn, &User)
        .create(Attributes::from([("name", name)]))
        .map(|_| ())
}

#[test]
fn test_transaction_commit() {
    let conn = setup();
    let id = transaction(&conn, || {
        add(&conn, "eve")?;
        add(&conn, "fay")?;
        Ok(42)
    })
    .unwrap();
    assert_eq!(id, 42);
    assert_eq!(user_count(&conn), Value::from(6));
}

#[test]
fn test_transaction_rollback() {
    let conn = setup();
    let result: sluice::Result<()> = transaction(&conn, || {
        add(&conn, "eve")?;
        Err(SluiceError::composition("intentional rollback"))
    });
    assert!(matches!(result, Err(SluiceError::Composition(_))));
    assert_eq!(user_count(&conn), Value::from(4));
}

#[test]
fn test_failed_statement_rolls_back_earlier_work() {
    let conn = setup();
    let result = transaction(&conn, || {
        Builder::table("posts").delete(&conn)?;
        // Duplicate email violates the unique index.
        ActiveRecord::new(&conn, &User)
            .create(Attributes::from([("name", "dup"), ("email", "ada@example.com")]))
    });
    assert!(result.unwrap_err().sql().is_some());
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM posts"), Value::from(4));
}

#[test]
fn test_nested_failure_is_contained() {
    let conn = setup();
    transaction(&conn, || {
        add(&conn, "outer")?;
        let inner = transaction(&conn, || {
            add(&conn, "inner")?;
            Err::<(), _>(SluiceError::composition("undo inner"))
        });
        assert!(inner.is_err());
        add(&conn, "after")
    })
    .unwrap();

    let mut names = Builder::table("users");
    names.where_in("name", ["outer", "inner", "after"]);
    assert_eq!(names.count(&conn).unwrap(), 2);
}

#[test]
fn test_outer_failure_undoes_committed_inner_work() {
    let conn = setup();
    let result: sluice::Result<()> = transaction(&conn, || {
        transaction(&conn, || add(&conn, "inner"))?;
        Err(SluiceError::composition("undo all"))
    });
    assert!(result.is_err());
    assert_eq!(user_count(&conn), Value::from(4));
}

#[test]
fn test_panic_rolls_back_and_resumes() {
    let conn = setup();
    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = transaction(&conn, || -> sluice::Result<()> {
            add(&conn, "eve")?;
            panic!("boom");
        });
    }));
    assert!(caught.is_err());
    assert_eq!(user_count(&conn), Value::from(4));

    // The session is usable again afterwards.
    transaction(&conn, || add(&conn, "fay")).unwrap();
    assert_eq!(user_count(&conn), Value::from(5));
}

#[test]
fn test_transaction_types() {
    for kind in [
        SQLiteTransactionType::Deferred,
        SQLiteTransactionType::Immediate,
        SQLiteTransactionType::Exclusive,
    ] {
        let conn = setup_with(SQLiteConfig::memory().transaction_type(kind));
        transaction(&conn, || add(&conn, &format!("user_{kind:?}"))).unwrap();
        assert_eq!(user_count(&conn), Value::from(5), "{kind:?}");
    }
}

#[test]
fn test_upsert_joins_an_outer_transaction() {
    let conn = setup();
    let result: sluice::Result<()> = transaction(&conn, || {
        ActiveRecord::new(&conn, &User).upsert(
            &[Attributes::from([("email", "ada@example.com"), ("name", "Ada")])],
            &["email"],
        )?;
        Err(SluiceError::composition("abandon"))
    });
    assert!(result.is_err());
    assert_eq!(
        conn.scalar("SELECT name FROM users WHERE id = 1"),
        Value::from("ada")
    );
}
