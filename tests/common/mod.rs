//! Shared fixture: an in-memory database with a fixed schema and seed data,
//! the entities mapped onto it, and a statement-counting connection.

pub mod counting;
pub mod entities;

pub use counting::Counting;
pub use entities::*;

use sluice::sqlite::{SQLiteConfig, SQLiteConnection};

pub const SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT UNIQUE,
        active INTEGER NOT NULL DEFAULT 1,
        deleted_at TEXT,
        created_at TEXT
    );
    CREATE TABLE profiles (id INTEGER PRIMARY KEY, user_id INTEGER, bio TEXT);
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY,
        user_id INTEGER,
        title TEXT NOT NULL,
        published INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER, body TEXT NOT NULL);
    CREATE TABLE roles (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE user_roles (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        role_id INTEGER NOT NULL,
        granted_by TEXT
    );
    CREATE TABLE memberships (
        org_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        level TEXT,
        PRIMARY KEY (org_id, user_id)
    );
";

pub const SEED: &str = "
    INSERT INTO users (id, name, email, active, deleted_at, created_at) VALUES
        (1, 'ada', 'ada@example.com', 1, NULL, '2024-01-10 09:00:00'),
        (2, 'bob', 'bob@example.com', 1, NULL, '2024-02-10 09:00:00'),
        (3, 'cy', NULL, 0, NULL, '2024-03-10 09:00:00'),
        (4, 'dee', 'dee@example.com', 1, '2024-04-01 00:00:00', '2024-04-10 09:00:00');
    INSERT INTO profiles (id, user_id, bio) VALUES (1, 1, 'mathematician');
    INSERT INTO posts (id, user_id, title, published) VALUES
        (1, 1, 'Hello', 1),
        (2, 1, 'Draft', 0),
        (3, 2, 'Bob writes', 1),
        (4, NULL, 'Orphan', 0);
    INSERT INTO comments (id, post_id, body) VALUES
        (1, 1, 'nice'),
        (2, 1, 'great'),
        (3, 3, 'ok');
    INSERT INTO roles (id, name) VALUES (1, 'admin'), (2, 'editor'), (3, 'viewer');
    INSERT INTO user_roles (id, user_id, role_id, granted_by) VALUES
        (1, 1, 1, 'root'),
        (2, 1, 2, 'root'),
        (3, 2, 2, 'ada');
    INSERT INTO memberships (org_id, user_id, level) VALUES
        (10, 1, 'owner'),
        (10, 2, 'member'),
        (20, 2, 'owner');
";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

/// A seeded database behind a counting connection.
pub fn setup() -> Counting {
    setup_with(SQLiteConfig::memory())
}

pub fn setup_with(config: SQLiteConfig) -> Counting {
    init_tracing();
    let conn = SQLiteConnection::open(config).expect("open in-memory database");
    conn.execute_batch(SCHEMA).expect("create schema");
    conn.execute_batch(SEED).expect("seed data");
    Counting::new(conn)
}
