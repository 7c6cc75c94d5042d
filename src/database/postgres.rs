use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgConnection, Pool, Postgres};

use super::{
    actions::{attributes, recipes, users},
    error::{Error, QueryError},
    form::RecipePayload,
    schema::{
        Attribute, AttributeKind, FullRecipe, NewRecipe, NewUser, Recipe, RecipeChanges,
        RecipeFilter, User, UserChanges, Uuid,
    },
    store::{load_full_recipe, write_new_recipe, write_recipe_update, LinkStore, RecipeWriter, Store},
};

#[async_trait]
impl LinkStore for PgConnection {
    async fn find_attribute(
        &mut self,
        kind: AttributeKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, Error> {
        attributes::find_attribute(self, kind, user_id, name).await
    }

    async fn create_attribute(
        &mut self,
        kind: AttributeKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<Attribute, Error> {
        attributes::create_attribute(self, kind, user_id, name).await
    }

    async fn add_link(
        &mut self,
        recipe_id: Uuid,
        kind: AttributeKind,
        attribute_id: Uuid,
    ) -> Result<(), Error> {
        attributes::add_link(self, recipe_id, kind, attribute_id).await
    }

    async fn clear_links(&mut self, recipe_id: Uuid, kind: AttributeKind) -> Result<(), Error> {
        attributes::clear_links(self, recipe_id, kind).await
    }
}

#[async_trait]
impl RecipeWriter for PgConnection {
    async fn insert_recipe(&mut self, user_id: Uuid, recipe: &NewRecipe) -> Result<Recipe, Error> {
        recipes::insert_recipe(self, user_id, recipe).await
    }

    async fn find_recipe(&mut self, user_id: Uuid, id: Uuid) -> Result<Option<Recipe>, Error> {
        recipes::find_recipe(self, user_id, id).await
    }

    async fn update_recipe(&mut self, id: Uuid, changes: &RecipeChanges) -> Result<Recipe, Error> {
        recipes::update_recipe(self, id, changes).await
    }

    async fn linked_attributes(
        &mut self,
        recipe_id: Uuid,
        kind: AttributeKind,
    ) -> Result<Vec<Attribute>, Error> {
        attributes::linked_attributes(self, recipe_id, kind).await
    }
}

/// [`Store`] on a PostgreSQL pool. Recipe writes run in one transaction each.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    /// Opens a pool and applies pending migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(QueryError::from)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| QueryError::new(e.to_string()))?;
        log::info!("Database migrations applied");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<Option<User>, Error> {
        users::register_user(&self.pool, &user).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        users::get_user_by_id(&self.pool, id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        users::get_user(&self.pool, email).await
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, Error> {
        users::update_user(&self.pool, id, &changes).await
    }

    async fn list_recipes(
        &self,
        user: &User,
        filter: &RecipeFilter,
    ) -> Result<Vec<FullRecipe>, Error> {
        let rows = recipes::fetch_recipes(&self.pool, user.id, filter).await?;
        let ids: Vec<Uuid> = rows.iter().map(|recipe| recipe.id).collect();

        let mut tags = attributes::list_linked_attributes(&self.pool, &ids, AttributeKind::Tag).await?;
        let mut ingredients =
            attributes::list_linked_attributes(&self.pool, &ids, AttributeKind::Ingredient).await?;

        Ok(rows
            .into_iter()
            .map(|recipe| FullRecipe {
                tags: tags.remove(&recipe.id).unwrap_or_default(),
                ingredients: ingredients.remove(&recipe.id).unwrap_or_default(),
                recipe,
            })
            .collect())
    }

    async fn get_recipe(&self, user: &User, id: Uuid) -> Result<Option<FullRecipe>, Error> {
        let mut conn = self.pool.acquire().await.map_err(QueryError::from)?;

        match recipes::find_recipe(&mut *conn, user.id, id).await? {
            Some(recipe) => Ok(Some(load_full_recipe(&mut *conn, recipe).await?)),
            None => Ok(None),
        }
    }

    async fn create_recipe(&self, user: &User, payload: &RecipePayload) -> Result<FullRecipe, Error> {
        let mut tx = self.pool.begin().await.map_err(QueryError::from)?;
        let recipe = write_new_recipe(&mut *tx, user, payload).await?;
        tx.commit().await.map_err(QueryError::from)?;

        Ok(recipe)
    }

    async fn update_recipe(
        &self,
        user: &User,
        id: Uuid,
        payload: &RecipePayload,
        partial: bool,
    ) -> Result<FullRecipe, Error> {
        let mut tx = self.pool.begin().await.map_err(QueryError::from)?;
        let recipe = write_recipe_update(&mut *tx, user, id, payload, partial).await?;
        tx.commit().await.map_err(QueryError::from)?;

        Ok(recipe)
    }

    async fn delete_recipe(&self, user: &User, id: Uuid) -> Result<bool, Error> {
        recipes::delete_recipe(&self.pool, user.id, id).await
    }

    async fn set_recipe_image(
        &self,
        user: &User,
        id: Uuid,
        image: &str,
    ) -> Result<Option<Recipe>, Error> {
        recipes::set_recipe_image(&self.pool, user.id, id, image).await
    }

    async fn list_attributes(
        &self,
        kind: AttributeKind,
        user: &User,
        assigned_only: bool,
    ) -> Result<Vec<Attribute>, Error> {
        attributes::list_attributes(&self.pool, kind, user.id, assigned_only).await
    }

    async fn get_attribute(
        &self,
        kind: AttributeKind,
        user: &User,
        id: Uuid,
    ) -> Result<Option<Attribute>, Error> {
        attributes::get_attribute(&self.pool, kind, user.id, id).await
    }

    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        user: &User,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, Error> {
        attributes::rename_attribute(&self.pool, kind, user.id, id, name).await
    }

    async fn delete_attribute(
        &self,
        kind: AttributeKind,
        user: &User,
        id: Uuid,
    ) -> Result<bool, Error> {
        attributes::delete_attribute(&self.pool, kind, user.id, id).await
    }
}
