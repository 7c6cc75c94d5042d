use async_trait::async_trait;

use super::{
    error::{Error, HtmlError},
    form::{Patch, RecipePayload},
    reconcile::{reconcile_create, reconcile_update},
    schema::{
        Attribute, AttributeKind, FullRecipe, NewRecipe, NewUser, Recipe, RecipeChanges,
        RecipeFilter, User, UserChanges, Uuid,
    },
};

/// Primitives the reconciler needs from persistent storage.
///
/// Every call is scoped by the caller; implementations never widen a lookup
/// beyond the `user_id` they are given.
#[async_trait]
pub trait LinkStore: Send {
    async fn find_attribute(
        &mut self,
        kind: AttributeKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, Error>;

    async fn create_attribute(
        &mut self,
        kind: AttributeKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<Attribute, Error>;

    /// Links `attribute_id` to the recipe. Linking an already linked row is a no-op.
    async fn add_link(
        &mut self,
        recipe_id: Uuid,
        kind: AttributeKind,
        attribute_id: Uuid,
    ) -> Result<(), Error>;

    async fn clear_links(&mut self, recipe_id: Uuid, kind: AttributeKind) -> Result<(), Error>;
}

/// Recipe row access inside one unit of work.
#[async_trait]
pub trait RecipeWriter: LinkStore {
    async fn insert_recipe(&mut self, user_id: Uuid, recipe: &NewRecipe) -> Result<Recipe, Error>;

    async fn find_recipe(&mut self, user_id: Uuid, id: Uuid) -> Result<Option<Recipe>, Error>;

    async fn update_recipe(&mut self, id: Uuid, changes: &RecipeChanges) -> Result<Recipe, Error>;

    async fn linked_attributes(
        &mut self,
        recipe_id: Uuid,
        kind: AttributeKind,
    ) -> Result<Vec<Attribute>, Error>;
}

/// Everything the HTTP layer needs. Each method is one atomic unit of work.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns `Ok(None)` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> Result<Option<User>, Error>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Error>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    /// Returns `Ok(None)` when the new email belongs to another user.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, Error>;

    async fn list_recipes(&self, user: &User, filter: &RecipeFilter)
        -> Result<Vec<FullRecipe>, Error>;

    async fn get_recipe(&self, user: &User, id: Uuid) -> Result<Option<FullRecipe>, Error>;

    async fn create_recipe(&self, user: &User, payload: &RecipePayload) -> Result<FullRecipe, Error>;

    async fn update_recipe(
        &self,
        user: &User,
        id: Uuid,
        payload: &RecipePayload,
        partial: bool,
    ) -> Result<FullRecipe, Error>;

    /// Returns whether a recipe was deleted.
    async fn delete_recipe(&self, user: &User, id: Uuid) -> Result<bool, Error>;

    async fn set_recipe_image(
        &self,
        user: &User,
        id: Uuid,
        image: &str,
    ) -> Result<Option<Recipe>, Error>;

    async fn list_attributes(
        &self,
        kind: AttributeKind,
        user: &User,
        assigned_only: bool,
    ) -> Result<Vec<Attribute>, Error>;

    /// Returns `Ok(None)` when no such attribute belongs to `user`.
    async fn get_attribute(
        &self,
        kind: AttributeKind,
        user: &User,
        id: Uuid,
    ) -> Result<Option<Attribute>, Error>;

    /// Returns `Ok(None)` when no such attribute belongs to `user`.
    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        user: &User,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, Error>;

    async fn delete_attribute(&self, kind: AttributeKind, user: &User, id: Uuid)
        -> Result<bool, Error>;
}

/// Inserts a recipe owned by `user` and links the requested tags and ingredients.
pub async fn write_new_recipe<W>(
    writer: &mut W,
    user: &User,
    payload: &RecipePayload,
) -> Result<FullRecipe, Error>
where
    W: RecipeWriter + ?Sized,
{
    let new = payload.validate_create()?;
    let recipe = writer.insert_recipe(user.id, &new).await?;

    for kind in AttributeKind::ALL {
        let items = match payload.attributes(kind) {
            Patch::Provided(items) => items.as_slice(),
            Patch::Absent => &[],
        };
        reconcile_create(&mut *writer, &recipe, user, items, kind).await?;
    }

    load_full_recipe(writer, recipe).await
}

/// Applies a full or partial update to one of `user`'s recipes.
pub async fn write_recipe_update<W>(
    writer: &mut W,
    user: &User,
    id: Uuid,
    payload: &RecipePayload,
    partial: bool,
) -> Result<FullRecipe, Error>
where
    W: RecipeWriter + ?Sized,
{
    let changes = payload.validate_update(partial)?;
    let recipe = match writer.find_recipe(user.id, id).await? {
        Some(recipe) => recipe,
        None => return Err(HtmlError::NotFound.default()),
    };

    let recipe = if changes == RecipeChanges::default() {
        recipe
    } else {
        writer.update_recipe(recipe.id, &changes).await?
    };

    for kind in AttributeKind::ALL {
        reconcile_update(&mut *writer, &recipe, user, payload.attributes(kind), kind).await?;
    }

    load_full_recipe(writer, recipe).await
}

pub async fn load_full_recipe<W>(writer: &mut W, recipe: Recipe) -> Result<FullRecipe, Error>
where
    W: RecipeWriter + ?Sized,
{
    let tags = writer.linked_attributes(recipe.id, AttributeKind::Tag).await?;
    let ingredients = writer
        .linked_attributes(recipe.id, AttributeKind::Ingredient)
        .await?;

    Ok(FullRecipe {
        recipe,
        tags,
        ingredients,
    })
}
