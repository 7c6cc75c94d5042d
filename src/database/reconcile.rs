//! Get-or-create linking of tags and ingredients to a recipe.
//!
//! A request names related rows by descriptor (`{"name": "Vegan"}`). Each
//! name is resolved to exactly one row owned by the acting user, creating it
//! when the lookup misses, and the row is linked to the recipe. Names match
//! by exact string equality.

use super::{
    error::{Error, HtmlError},
    form::{descriptor_names, AttributeDescriptor, Patch},
    schema::{Attribute, AttributeKind, Recipe, User},
    store::LinkStore,
};

/// Links every requested row to `recipe`, creating missing rows for `acting_user`.
///
/// Additive: existing links are kept. Returns the distinct rows that were
/// linked, in order of first occurrence. Descriptors are validated before
/// anything is written.
pub async fn reconcile_create<S>(
    store: &mut S,
    recipe: &Recipe,
    acting_user: &User,
    requested: &[AttributeDescriptor],
    kind: AttributeKind,
) -> Result<Vec<Attribute>, Error>
where
    S: LinkStore + ?Sized,
{
    ensure_owner(recipe, acting_user)?;
    let names = descriptor_names(requested, kind)?;

    link_names(store, recipe, acting_user, &names, kind).await
}

/// Replaces the links of `kind` on `recipe` when `requested` is provided.
///
/// `Patch::Absent` leaves the relation untouched. `Patch::Provided` clears
/// the relation first, so an empty list detaches everything; detached rows
/// stay in storage.
pub async fn reconcile_update<S>(
    store: &mut S,
    recipe: &Recipe,
    acting_user: &User,
    requested: &Patch<Vec<AttributeDescriptor>>,
    kind: AttributeKind,
) -> Result<Option<Vec<Attribute>>, Error>
where
    S: LinkStore + ?Sized,
{
    let requested = match requested {
        Patch::Absent => return Ok(None),
        Patch::Provided(requested) => requested,
    };

    ensure_owner(recipe, acting_user)?;
    let names = descriptor_names(requested, kind)?;

    store.clear_links(recipe.id, kind).await?;
    link_names(store, recipe, acting_user, &names, kind)
        .await
        .map(Some)
}

async fn link_names<S>(
    store: &mut S,
    recipe: &Recipe,
    acting_user: &User,
    names: &[&str],
    kind: AttributeKind,
) -> Result<Vec<Attribute>, Error>
where
    S: LinkStore + ?Sized,
{
    let mut linked: Vec<Attribute> = Vec::with_capacity(names.len());

    for name in names {
        if linked.iter().any(|attribute| attribute.name == *name) {
            continue;
        }

        let attribute = match store.find_attribute(kind, acting_user.id, name).await? {
            Some(attribute) => attribute,
            None => {
                log::debug!(
                    "Creating {kind:?} {name:?} for user {} on recipe {}",
                    acting_user.id,
                    recipe.id
                );
                store.create_attribute(kind, acting_user.id, name).await?
            }
        };

        store.add_link(recipe.id, kind, attribute.id).await?;
        linked.push(attribute);
    }

    log::trace!(
        "Linked {} {kind:?} rows to recipe {}",
        linked.len(),
        recipe.id
    );

    Ok(linked)
}

/// Recipes are only visible to their owner, so a foreign recipe looks missing.
fn ensure_owner(recipe: &Recipe, acting_user: &User) -> Result<(), Error> {
    if recipe.user_id != acting_user.id {
        return Err(HtmlError::NotFound.default());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::database::{
        memory::MemoryState,
        schema::{NewRecipe, NewUser},
        store::RecipeWriter,
    };

    fn named(names: &[&str]) -> Vec<AttributeDescriptor> {
        names.iter().map(|name| AttributeDescriptor::named(name)).collect()
    }

    fn new_recipe() -> NewRecipe {
        NewRecipe {
            title: String::from("Sample recipe"),
            description: String::new(),
            time_minutes: 22,
            cost: Decimal::from_str("3.49").unwrap(),
            link: String::new(),
        }
    }

    fn user(state: &mut MemoryState, email: &str) -> User {
        state
            .insert_user(NewUser {
                email: email.to_string(),
                name: String::new(),
                password: String::from("hash"),
                is_staff: false,
                is_superuser: false,
            })
            .unwrap()
    }

    async fn recipe(state: &mut MemoryState, owner: &User) -> Recipe {
        state.insert_recipe(owner.id, &new_recipe()).await.unwrap()
    }

    async fn linked_names(state: &mut MemoryState, recipe: &Recipe, kind: AttributeKind) -> Vec<String> {
        state
            .linked_attributes(recipe.id, kind)
            .await
            .unwrap()
            .into_iter()
            .map(|attribute| attribute.name)
            .collect()
    }

    #[tokio::test]
    async fn creates_missing_rows_and_links_them() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;

        let linked = reconcile_create(
            &mut state,
            &recipe,
            &owner,
            &named(&["Indian", "Vegan"]),
            AttributeKind::Tag,
        )
        .await
        .unwrap();

        assert_eq!(linked.len(), 2);
        assert!(linked.iter().all(|tag| tag.user_id == owner.id));
        assert_eq!(
            linked_names(&mut state, &recipe, AttributeKind::Tag).await,
            vec!["Indian", "Vegan"]
        );
    }

    #[tokio::test]
    async fn linking_twice_is_idempotent() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;
        let items = named(&["Indian", "Vegan"]);

        for _ in 0..2 {
            reconcile_create(&mut state, &recipe, &owner, &items, AttributeKind::Tag)
                .await
                .unwrap();
        }

        assert_eq!(state.attributes_of(AttributeKind::Tag, owner.id).len(), 2);
        assert_eq!(linked_names(&mut state, &recipe, AttributeKind::Tag).await.len(), 2);
    }

    #[tokio::test]
    async fn reuses_existing_row_instead_of_recreating() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let existing = state
            .create_attribute(AttributeKind::Ingredient, owner.id, "Curry powder")
            .await
            .unwrap();
        let recipe = recipe(&mut state, &owner).await;

        let linked = reconcile_create(
            &mut state,
            &recipe,
            &owner,
            &named(&["Coconut milk", "Curry powder"]),
            AttributeKind::Ingredient,
        )
        .await
        .unwrap();

        assert_eq!(
            state.attributes_of(AttributeKind::Ingredient, owner.id).len(),
            2
        );
        assert!(linked.contains(&existing));
    }

    #[tokio::test]
    async fn duplicate_names_in_one_request_collapse() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;

        let linked = reconcile_create(
            &mut state,
            &recipe,
            &owner,
            &named(&["A", "A"]),
            AttributeKind::Tag,
        )
        .await
        .unwrap();

        assert_eq!(linked.len(), 1);
        assert_eq!(state.attributes_of(AttributeKind::Tag, owner.id).len(), 1);
        assert_eq!(linked_names(&mut state, &recipe, AttributeKind::Tag).await, vec!["A"]);
    }

    #[tokio::test]
    async fn same_name_is_scoped_per_user() {
        let mut state = MemoryState::default();
        let first = user(&mut state, "first@example.com");
        let second = user(&mut state, "second@example.com");
        let first_recipe = recipe(&mut state, &first).await;
        let second_recipe = recipe(&mut state, &second).await;
        let items = named(&["Spicy"]);

        let a = reconcile_create(&mut state, &first_recipe, &first, &items, AttributeKind::Tag)
            .await
            .unwrap();
        let b = reconcile_create(&mut state, &second_recipe, &second, &items, AttributeKind::Tag)
            .await
            .unwrap();

        assert_ne!(a[0].id, b[0].id);
        assert_eq!(state.attributes_of(AttributeKind::Tag, first.id), a);
        assert_eq!(state.attributes_of(AttributeKind::Tag, second.id), b);
    }

    #[tokio::test]
    async fn names_match_exactly() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;

        reconcile_create(
            &mut state,
            &recipe,
            &owner,
            &named(&["vegan", "Vegan"]),
            AttributeKind::Tag,
        )
        .await
        .unwrap();

        assert_eq!(state.attributes_of(AttributeKind::Tag, owner.id).len(), 2);
    }

    #[tokio::test]
    async fn create_keeps_existing_links() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;

        reconcile_create(&mut state, &recipe, &owner, &named(&["A"]), AttributeKind::Tag)
            .await
            .unwrap();
        reconcile_create(&mut state, &recipe, &owner, &named(&["B"]), AttributeKind::Tag)
            .await
            .unwrap();

        assert_eq!(
            linked_names(&mut state, &recipe, AttributeKind::Tag).await,
            vec!["A", "B"]
        );
    }

    #[tokio::test]
    async fn absent_update_leaves_relation_untouched() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;
        reconcile_create(&mut state, &recipe, &owner, &named(&["A", "B"]), AttributeKind::Tag)
            .await
            .unwrap();

        let result = reconcile_update(&mut state, &recipe, &owner, &Patch::Absent, AttributeKind::Tag)
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(linked_names(&mut state, &recipe, AttributeKind::Tag).await.len(), 2);
    }

    #[tokio::test]
    async fn empty_update_detaches_but_keeps_rows() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;
        reconcile_create(&mut state, &recipe, &owner, &named(&["A", "B"]), AttributeKind::Tag)
            .await
            .unwrap();

        let result = reconcile_update(
            &mut state,
            &recipe,
            &owner,
            &Patch::Provided(vec![]),
            AttributeKind::Tag,
        )
        .await
        .unwrap();

        assert_eq!(result, Some(vec![]));
        assert!(linked_names(&mut state, &recipe, AttributeKind::Tag).await.is_empty());
        assert_eq!(state.attributes_of(AttributeKind::Tag, owner.id).len(), 2);
    }

    #[tokio::test]
    async fn update_replaces_relation() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;
        reconcile_create(&mut state, &recipe, &owner, &named(&["Breakfast"]), AttributeKind::Tag)
            .await
            .unwrap();

        reconcile_update(
            &mut state,
            &recipe,
            &owner,
            &Patch::Provided(named(&["Lunch"])),
            AttributeKind::Tag,
        )
        .await
        .unwrap();

        assert_eq!(
            linked_names(&mut state, &recipe, AttributeKind::Tag).await,
            vec!["Lunch"]
        );
        assert_eq!(state.attributes_of(AttributeKind::Tag, owner.id).len(), 2);
    }

    #[tokio::test]
    async fn blank_name_fails_before_anything_is_written() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;
        reconcile_create(&mut state, &recipe, &owner, &named(&["Keep"]), AttributeKind::Tag)
            .await
            .unwrap();

        let error = reconcile_update(
            &mut state,
            &recipe,
            &owner,
            &Patch::Provided(named(&["New", ""])),
            AttributeKind::Tag,
        )
        .await
        .unwrap_err();

        assert_eq!(error.code, 400);
        assert!(error.fields.contains_key("tags"));
        assert_eq!(
            linked_names(&mut state, &recipe, AttributeKind::Tag).await,
            vec!["Keep"]
        );
        assert_eq!(state.attributes_of(AttributeKind::Tag, owner.id).len(), 1);
    }

    #[tokio::test]
    async fn foreign_recipe_is_refused() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "owner@example.com");
        let intruder = user(&mut state, "intruder@example.com");
        let recipe = recipe(&mut state, &owner).await;

        let error = reconcile_create(&mut state, &recipe, &intruder, &named(&["A"]), AttributeKind::Tag)
            .await
            .unwrap_err();

        assert_eq!(error.code, 404);
        assert!(state.attributes_of(AttributeKind::Tag, intruder.id).is_empty());
    }

    #[tokio::test]
    async fn tags_and_ingredients_are_separate_namespaces() {
        let mut state = MemoryState::default();
        let owner = user(&mut state, "user@example.com");
        let recipe = recipe(&mut state, &owner).await;

        reconcile_create(&mut state, &recipe, &owner, &named(&["Lemon"]), AttributeKind::Tag)
            .await
            .unwrap();
        reconcile_create(&mut state, &recipe, &owner, &named(&["Lemon"]), AttributeKind::Ingredient)
            .await
            .unwrap();

        assert_eq!(state.attributes_of(AttributeKind::Tag, owner.id).len(), 1);
        assert_eq!(state.attributes_of(AttributeKind::Ingredient, owner.id).len(), 1);
    }
}
