use std::collections::HashMap;

use crate::{
    error::{field_error, Error, HtmlError, QueryError},
    schema::{Attribute, AttributeKind, Uuid},
};

use sqlx::{PgConnection, Pool, Postgres};

pub async fn find_attribute(
    conn: &mut PgConnection,
    kind: AttributeKind,
    user_id: Uuid,
    name: &str,
) -> Result<Option<Attribute>, Error> {
    let table = kind.table();
    let row: Option<Attribute> = sqlx::query_as(&format!(
        "SELECT id, user_id, name FROM {table} WHERE user_id = $1 AND name = $2"
    ))
    .bind(user_id)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

/// Inserts `(user_id, name)`; when a concurrent request inserted the same
/// pair first, the row it created is returned instead.
pub async fn create_attribute(
    conn: &mut PgConnection,
    kind: AttributeKind,
    user_id: Uuid,
    name: &str,
) -> Result<Attribute, Error> {
    let table = kind.table();
    let row: Option<Attribute> = sqlx::query_as(&format!(
        "
        INSERT INTO {table} (user_id, name) VALUES ($1, $2)
        ON CONFLICT (user_id, name) DO NOTHING
        RETURNING id, user_id, name
    "
    ))
    .bind(user_id)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    if let Some(row) = row {
        return Ok(row);
    }

    log::debug!("Concurrent insert of {kind:?} {name:?} for user {user_id}, re-fetching");
    find_attribute(conn, kind, user_id, name)
        .await?
        .ok_or_else(|| HtmlError::InternalServerError.new("Conflicting row vanished"))
}

pub async fn add_link(
    conn: &mut PgConnection,
    recipe_id: Uuid,
    kind: AttributeKind,
    attribute_id: Uuid,
) -> Result<(), Error> {
    let (table, column) = (kind.link_table(), kind.link_column());
    sqlx::query(&format!(
        "INSERT INTO {table} (recipe_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING"
    ))
    .bind(recipe_id)
    .bind(attribute_id)
    .execute(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(())
}

pub async fn clear_links(
    conn: &mut PgConnection,
    recipe_id: Uuid,
    kind: AttributeKind,
) -> Result<(), Error> {
    let table = kind.link_table();
    sqlx::query(&format!("DELETE FROM {table} WHERE recipe_id = $1"))
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

pub async fn linked_attributes(
    conn: &mut PgConnection,
    recipe_id: Uuid,
    kind: AttributeKind,
) -> Result<Vec<Attribute>, Error> {
    let (table, link_table, column) = (kind.table(), kind.link_table(), kind.link_column());
    let rows: Vec<Attribute> = sqlx::query_as(&format!(
        "
        SELECT a.id, a.user_id, a.name
        FROM {link_table} l
        INNER JOIN {table} a ON a.id = l.{column}
        WHERE l.recipe_id = $1
        ORDER BY a.id
    "
    ))
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

#[derive(sqlx::FromRow)]
struct LinkedAttribute {
    recipe_id: Uuid,
    id: Uuid,
    user_id: Uuid,
    name: String,
}

/// Linked rows of `kind` for every recipe in `recipe_ids`, grouped by recipe.
pub async fn list_linked_attributes(
    pool: &Pool<Postgres>,
    recipe_ids: &[Uuid],
    kind: AttributeKind,
) -> Result<HashMap<Uuid, Vec<Attribute>>, Error> {
    let (table, link_table, column) = (kind.table(), kind.link_table(), kind.link_column());
    let rows: Vec<LinkedAttribute> = sqlx::query_as(&format!(
        "
        SELECT l.recipe_id, a.id, a.user_id, a.name
        FROM {link_table} l
        INNER JOIN {table} a ON a.id = l.{column}
        WHERE l.recipe_id = ANY($1)
        ORDER BY a.id
    "
    ))
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut hashmap: HashMap<Uuid, Vec<Attribute>> = HashMap::new();
    rows.into_iter().for_each(|row| {
        hashmap.entry(row.recipe_id).or_default().push(Attribute {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
        })
    });

    Ok(hashmap)
}

pub async fn list_attributes(
    pool: &Pool<Postgres>,
    kind: AttributeKind,
    user_id: Uuid,
    assigned_only: bool,
) -> Result<Vec<Attribute>, Error> {
    let (table, link_table, column) = (kind.table(), kind.link_table(), kind.link_column());
    let assigned = if assigned_only {
        format!("AND EXISTS (SELECT 1 FROM {link_table} l WHERE l.{column} = a.id)")
    } else {
        String::new()
    };

    let rows: Vec<Attribute> = sqlx::query_as(&format!(
        "SELECT a.id, a.user_id, a.name FROM {table} a WHERE a.user_id = $1 {assigned} ORDER BY a.name DESC, a.id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_attribute(
    pool: &Pool<Postgres>,
    kind: AttributeKind,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<Attribute>, Error> {
    let table = kind.table();
    let row: Option<Attribute> = sqlx::query_as(&format!(
        "SELECT id, user_id, name FROM {table} WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

/// Returns `None` when the row does not exist or is not owned by `user_id`.
pub async fn rename_attribute(
    pool: &Pool<Postgres>,
    kind: AttributeKind,
    user_id: Uuid,
    id: Uuid,
    name: &str,
) -> Result<Option<Attribute>, Error> {
    let table = kind.table();
    let result: Result<Option<Attribute>, sqlx::Error> = sqlx::query_as(&format!(
        "UPDATE {table} SET name = $3 WHERE id = $1 AND user_id = $2 RETURNING id, user_id, name"
    ))
    .bind(id)
    .bind(user_id)
    .bind(name)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(row) => Ok(row),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(field_error(
            "name",
            "An entry with this name already exists.",
        )),
        Err(e) => Err(QueryError::from(e).into()),
    }
}

pub async fn delete_attribute(
    pool: &Pool<Postgres>,
    kind: AttributeKind,
    user_id: Uuid,
    id: Uuid,
) -> Result<bool, Error> {
    let table = kind.table();
    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1 AND user_id = $2"))
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(result.rows_affected() > 0)
}
