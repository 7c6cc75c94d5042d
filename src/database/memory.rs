//! In-process store with the same semantics as the PostgreSQL one.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    error::{field_error, Error, HtmlError},
    form::RecipePayload,
    schema::{
        Attribute, AttributeKind, FullRecipe, NewRecipe, NewUser, Recipe, RecipeChanges,
        RecipeFilter, User, UserChanges, Uuid,
    },
    store::{load_full_recipe, write_new_recipe, write_recipe_update, LinkStore, RecipeWriter, Store},
};

#[derive(Debug, Default)]
pub struct MemoryState {
    users: BTreeMap<Uuid, User>,
    recipes: BTreeMap<Uuid, Recipe>,
    tags: BTreeMap<Uuid, Attribute>,
    ingredients: BTreeMap<Uuid, Attribute>,
    recipe_tags: BTreeSet<(Uuid, Uuid)>,
    recipe_ingredients: BTreeSet<(Uuid, Uuid)>,
    sequence: Uuid,
}

impl MemoryState {
    fn next_id(&mut self) -> Uuid {
        self.sequence += 1;
        self.sequence
    }

    fn table(&self, kind: AttributeKind) -> &BTreeMap<Uuid, Attribute> {
        match kind {
            AttributeKind::Tag => &self.tags,
            AttributeKind::Ingredient => &self.ingredients,
        }
    }

    fn table_mut(&mut self, kind: AttributeKind) -> &mut BTreeMap<Uuid, Attribute> {
        match kind {
            AttributeKind::Tag => &mut self.tags,
            AttributeKind::Ingredient => &mut self.ingredients,
        }
    }

    fn links(&self, kind: AttributeKind) -> &BTreeSet<(Uuid, Uuid)> {
        match kind {
            AttributeKind::Tag => &self.recipe_tags,
            AttributeKind::Ingredient => &self.recipe_ingredients,
        }
    }

    fn links_mut(&mut self, kind: AttributeKind) -> &mut BTreeSet<(Uuid, Uuid)> {
        match kind {
            AttributeKind::Tag => &mut self.recipe_tags,
            AttributeKind::Ingredient => &mut self.recipe_ingredients,
        }
    }

    /// Inserts a user unless the email is taken.
    pub fn insert_user(&mut self, user: NewUser) -> Option<User> {
        if self.users.values().any(|u| u.email == user.email) {
            return None;
        }

        let row = User {
            id: self.next_id(),
            email: user.email,
            name: user.name,
            password: user.password,
            is_active: true,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        };
        self.users.insert(row.id, row.clone());

        Some(row)
    }

    /// All rows of `kind` owned by `user_id`, ordered by id.
    pub fn attributes_of(&self, kind: AttributeKind, user_id: Uuid) -> Vec<Attribute> {
        self.table(kind)
            .values()
            .filter(|attribute| attribute.user_id == user_id)
            .cloned()
            .collect()
    }

    fn linked_ids(&self, recipe_id: Uuid, kind: AttributeKind) -> Vec<Uuid> {
        self.links(kind)
            .range((recipe_id, Uuid::MIN)..=(recipe_id, Uuid::MAX))
            .map(|(_, attribute_id)| *attribute_id)
            .collect()
    }

    fn matches(&self, recipe: &Recipe, filter: &RecipeFilter) -> bool {
        AttributeKind::ALL.iter().all(|kind| match filter.ids(*kind) {
            None => true,
            Some(ids) => self
                .linked_ids(recipe.id, *kind)
                .iter()
                .any(|id| ids.contains(id)),
        })
    }
}

#[async_trait]
impl LinkStore for MemoryState {
    async fn find_attribute(
        &mut self,
        kind: AttributeKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, Error> {
        Ok(self
            .table(kind)
            .values()
            .find(|attribute| attribute.user_id == user_id && attribute.name == name)
            .cloned())
    }

    async fn create_attribute(
        &mut self,
        kind: AttributeKind,
        user_id: Uuid,
        name: &str,
    ) -> Result<Attribute, Error> {
        if let Some(existing) = self.find_attribute(kind, user_id, name).await? {
            return Ok(existing);
        }

        let attribute = Attribute {
            id: self.next_id(),
            user_id,
            name: name.to_string(),
        };
        self.table_mut(kind).insert(attribute.id, attribute.clone());

        Ok(attribute)
    }

    async fn add_link(
        &mut self,
        recipe_id: Uuid,
        kind: AttributeKind,
        attribute_id: Uuid,
    ) -> Result<(), Error> {
        if !self.recipes.contains_key(&recipe_id) || !self.table(kind).contains_key(&attribute_id) {
            return Err(HtmlError::InternalServerError.new("Link target does not exist"));
        }

        self.links_mut(kind).insert((recipe_id, attribute_id));
        Ok(())
    }

    async fn clear_links(&mut self, recipe_id: Uuid, kind: AttributeKind) -> Result<(), Error> {
        self.links_mut(kind)
            .retain(|(linked_recipe, _)| *linked_recipe != recipe_id);
        Ok(())
    }
}

#[async_trait]
impl RecipeWriter for MemoryState {
    async fn insert_recipe(&mut self, user_id: Uuid, recipe: &NewRecipe) -> Result<Recipe, Error> {
        let row = Recipe {
            id: self.next_id(),
            user_id,
            title: recipe.title.to_owned(),
            description: recipe.description.to_owned(),
            time_minutes: recipe.time_minutes,
            cost: recipe.cost,
            link: recipe.link.to_owned(),
            image: None,
        };
        self.recipes.insert(row.id, row.clone());

        Ok(row)
    }

    async fn find_recipe(&mut self, user_id: Uuid, id: Uuid) -> Result<Option<Recipe>, Error> {
        Ok(self
            .recipes
            .get(&id)
            .filter(|recipe| recipe.user_id == user_id)
            .cloned())
    }

    async fn update_recipe(&mut self, id: Uuid, changes: &RecipeChanges) -> Result<Recipe, Error> {
        let recipe = self
            .recipes
            .get_mut(&id)
            .ok_or_else(|| HtmlError::NotFound.default())?;
        changes.apply(recipe);

        Ok(recipe.clone())
    }

    async fn linked_attributes(
        &mut self,
        recipe_id: Uuid,
        kind: AttributeKind,
    ) -> Result<Vec<Attribute>, Error> {
        let ids = self.linked_ids(recipe_id, kind);
        Ok(ids
            .iter()
            .filter_map(|id| self.table(kind).get(id).cloned())
            .collect())
    }
}

/// [`Store`] backed by [`MemoryState`]; every call holds the lock for its whole duration.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the locked state. Meant for seeding and inspecting in tests.
    pub async fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.lock().await;
        f(&mut state)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<Option<User>, Error> {
        Ok(self.state.lock().await.insert_user(user))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, Error> {
        let mut state = self.state.lock().await;

        if let Some(email) = &changes.email {
            if state.users.values().any(|u| u.id != id && &u.email == email) {
                return Ok(None);
            }
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| HtmlError::NotFound.default())?;
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(password) = changes.password {
            user.password = password;
        }

        Ok(Some(user.clone()))
    }

    async fn list_recipes(
        &self,
        user: &User,
        filter: &RecipeFilter,
    ) -> Result<Vec<FullRecipe>, Error> {
        let mut state = self.state.lock().await;

        let recipes: Vec<Recipe> = state
            .recipes
            .values()
            .rev()
            .filter(|recipe| recipe.user_id == user.id && state.matches(recipe, filter))
            .cloned()
            .collect();

        let mut rows = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            rows.push(load_full_recipe(&mut *state, recipe).await?);
        }
        Ok(rows)
    }

    async fn get_recipe(&self, user: &User, id: Uuid) -> Result<Option<FullRecipe>, Error> {
        let mut state = self.state.lock().await;

        match state.find_recipe(user.id, id).await? {
            Some(recipe) => load_full_recipe(&mut *state, recipe).await.map(Some),
            None => Ok(None),
        }
    }

    async fn create_recipe(&self, user: &User, payload: &RecipePayload) -> Result<FullRecipe, Error> {
        let mut state = self.state.lock().await;
        write_new_recipe(&mut *state, user, payload).await
    }

    async fn update_recipe(
        &self,
        user: &User,
        id: Uuid,
        payload: &RecipePayload,
        partial: bool,
    ) -> Result<FullRecipe, Error> {
        let mut state = self.state.lock().await;
        write_recipe_update(&mut *state, user, id, payload, partial).await
    }

    async fn delete_recipe(&self, user: &User, id: Uuid) -> Result<bool, Error> {
        let mut state = self.state.lock().await;

        if state.find_recipe(user.id, id).await?.is_none() {
            return Ok(false);
        }

        state.recipes.remove(&id);
        for kind in AttributeKind::ALL {
            state.clear_links(id, kind).await?;
        }
        Ok(true)
    }

    async fn set_recipe_image(
        &self,
        user: &User,
        id: Uuid,
        image: &str,
    ) -> Result<Option<Recipe>, Error> {
        let mut state = self.state.lock().await;

        Ok(state
            .recipes
            .get_mut(&id)
            .filter(|recipe| recipe.user_id == user.id)
            .map(|recipe| {
                recipe.image = Some(image.to_string());
                recipe.clone()
            }))
    }

    async fn list_attributes(
        &self,
        kind: AttributeKind,
        user: &User,
        assigned_only: bool,
    ) -> Result<Vec<Attribute>, Error> {
        let state = self.state.lock().await;

        let mut rows: Vec<Attribute> = state
            .attributes_of(kind, user.id)
            .into_iter()
            .filter(|attribute| {
                !assigned_only
                    || state
                        .links(kind)
                        .iter()
                        .any(|(_, attribute_id)| *attribute_id == attribute.id)
            })
            .collect();
        rows.sort_by(|a, b| b.name.cmp(&a.name).then(b.id.cmp(&a.id)));

        Ok(rows)
    }

    async fn get_attribute(
        &self,
        kind: AttributeKind,
        user: &User,
        id: Uuid,
    ) -> Result<Option<Attribute>, Error> {
        let state = self.state.lock().await;

        Ok(state
            .table(kind)
            .get(&id)
            .filter(|attribute| attribute.user_id == user.id)
            .cloned())
    }

    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        user: &User,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, Error> {
        let mut state = self.state.lock().await;

        if state
            .table(kind)
            .values()
            .any(|a| a.user_id == user.id && a.id != id && a.name == name)
        {
            if state.table(kind).get(&id).is_some_and(|a| a.user_id == user.id) {
                return Err(field_error("name", "An entry with this name already exists."));
            }
            return Ok(None);
        }

        Ok(state
            .table_mut(kind)
            .get_mut(&id)
            .filter(|attribute| attribute.user_id == user.id)
            .map(|attribute| {
                attribute.name = name.to_string();
                attribute.clone()
            }))
    }

    async fn delete_attribute(
        &self,
        kind: AttributeKind,
        user: &User,
        id: Uuid,
    ) -> Result<bool, Error> {
        let mut state = self.state.lock().await;

        if !state
            .table(kind)
            .get(&id)
            .is_some_and(|attribute| attribute.user_id == user.id)
        {
            return Ok(false);
        }

        state.table_mut(kind).remove(&id);
        state
            .links_mut(kind)
            .retain(|(_, attribute_id)| *attribute_id != id);
        Ok(true)
    }
}
