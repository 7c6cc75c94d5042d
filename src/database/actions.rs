//! SQL for the PostgreSQL store.
//!
//! Functions that take a `&Pool<Postgres>` run on their own connection.
//! Functions that take a `&mut PgConnection` are meant to run inside the
//! caller's transaction.

pub mod attributes;
pub mod recipes;
pub mod users;
