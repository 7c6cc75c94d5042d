use crate::{
    error::{Error, HtmlError, QueryError},
    schema::{AttributeKind, NewRecipe, Recipe, RecipeChanges, RecipeFilter, Uuid},
};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

pub async fn insert_recipe(
    conn: &mut PgConnection,
    user_id: Uuid,
    recipe: &NewRecipe,
) -> Result<Recipe, Error> {
    let row: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (user_id, title, description, time_minutes, cost, link)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
    ",
    )
    .bind(user_id)
    .bind(&recipe.title)
    .bind(&recipe.description)
    .bind(recipe.time_minutes)
    .bind(recipe.cost)
    .bind(&recipe.link)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn find_recipe(
    conn: &mut PgConnection,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn update_recipe(
    conn: &mut PgConnection,
    id: Uuid,
    changes: &RecipeChanges,
) -> Result<Recipe, Error> {
    let row: Option<Recipe> = sqlx::query_as(
        "
        UPDATE recipes SET
        title = COALESCE($2, title),
        description = COALESCE($3, description),
        time_minutes = COALESCE($4, time_minutes),
        cost = COALESCE($5, cost),
        link = COALESCE($6, link)
        WHERE id = $1
        RETURNING *
    ",
    )
    .bind(id)
    .bind(&changes.title)
    .bind(&changes.description)
    .bind(changes.time_minutes)
    .bind(changes.cost)
    .bind(&changes.link)
    .fetch_optional(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| HtmlError::NotFound.default())
}

/// Recipes of `user_id`, newest first. Each present filter keeps recipes
/// linked to at least one of its ids.
pub async fn fetch_recipes(
    pool: &Pool<Postgres>,
    user_id: Uuid,
    filter: &RecipeFilter,
) -> Result<Vec<Recipe>, Error> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT r.* FROM recipes r WHERE r.user_id = ");
    query.push_bind(user_id);

    for kind in AttributeKind::ALL {
        if let Some(ids) = filter.ids(kind) {
            let (table, column) = (kind.link_table(), kind.link_column());
            query
                .push(format!(
                    " AND EXISTS (SELECT 1 FROM {table} l WHERE l.recipe_id = r.id AND l.{column} = ANY("
                ))
                .push_bind(ids.to_vec())
                .push("))");
        }
    }
    query.push(" ORDER BY r.id DESC");

    let rows: Vec<Recipe> = query
        .build_query_as::<Recipe>()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn delete_recipe(pool: &Pool<Postgres>, user_id: Uuid, id: Uuid) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(result.rows_affected() > 0)
}

pub async fn set_recipe_image(
    pool: &Pool<Postgres>,
    user_id: Uuid,
    id: Uuid,
    image: &str,
) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> =
        sqlx::query_as("UPDATE recipes SET image = $3 WHERE id = $1 AND user_id = $2 RETURNING *")
            .bind(id)
            .bind(user_id)
            .bind(image)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}
