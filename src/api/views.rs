use rust_decimal::Decimal;
use serde::Serialize;

use crate::database::schema::{Attribute, FullRecipe, Recipe, User, Uuid};
use crate::media::media_url;

#[derive(Debug, Serialize)]
pub struct UserView {
    pub email: String,
    pub name: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.to_owned(),
            name: user.name.to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenView {
    pub token: String,
}

/// Recipe as shown in lists.
#[derive(Debug, Serialize)]
pub struct RecipeView {
    pub id: Uuid,
    pub title: String,
    pub time_minutes: i32,
    pub cost: Decimal,
    pub link: String,
    pub tags: Vec<Attribute>,
    pub ingredients: Vec<Attribute>,
}

impl From<FullRecipe> for RecipeView {
    fn from(full: FullRecipe) -> Self {
        let FullRecipe {
            recipe,
            tags,
            ingredients,
        } = full;

        Self {
            id: recipe.id,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            cost: recipe.cost,
            link: recipe.link,
            tags,
            ingredients,
        }
    }
}

/// List fields plus `description` and `image`.
#[derive(Debug, Serialize)]
pub struct RecipeDetailView {
    #[serde(flatten)]
    pub summary: RecipeView,
    pub description: String,
    pub image: Option<String>,
}

impl From<FullRecipe> for RecipeDetailView {
    fn from(full: FullRecipe) -> Self {
        let description = full.recipe.description.to_owned();
        let image = full.recipe.image.as_deref().map(media_url);

        Self {
            summary: full.into(),
            description,
            image,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageView {
    pub id: Uuid,
    pub image: Option<String>,
}

impl From<&Recipe> for ImageView {
    fn from(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            image: recipe.image.as_deref().map(media_url),
        }
    }
}
