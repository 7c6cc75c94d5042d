use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type Uuid = i32;

#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// A user row that has not been inserted yet. `password` is already hashed.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Clone, Debug, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub time_minutes: i32,
    pub cost: Decimal,
    pub link: String,
    pub image: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewRecipe {
    pub title: String,
    pub description: String,
    pub time_minutes: i32,
    pub cost: Decimal,
    pub link: String,
}

/// Column updates for an existing recipe; `None` leaves the column untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub time_minutes: Option<i32>,
    pub cost: Option<Decimal>,
    pub link: Option<String>,
}

impl RecipeChanges {
    pub fn apply(&self, recipe: &mut Recipe) {
        if let Some(title) = &self.title {
            recipe.title = title.to_owned();
        }
        if let Some(description) = &self.description {
            recipe.description = description.to_owned();
        }
        if let Some(time_minutes) = self.time_minutes {
            recipe.time_minutes = time_minutes;
        }
        if let Some(cost) = self.cost {
            recipe.cost = cost;
        }
        if let Some(link) = &self.link {
            recipe.link = link.to_owned();
        }
    }
}

/// A tag or an ingredient; both share the same shape and live in separate tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Attribute {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Tag,
    Ingredient,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 2] = [AttributeKind::Tag, AttributeKind::Ingredient];

    pub fn table(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tags",
            AttributeKind::Ingredient => "ingredients",
        }
    }

    pub fn link_table(self) -> &'static str {
        match self {
            AttributeKind::Tag => "recipe_tags",
            AttributeKind::Ingredient => "recipe_ingredients",
        }
    }

    pub fn link_column(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tag_id",
            AttributeKind::Ingredient => "ingredient_id",
        }
    }

    /// Name of the nested field carrying descriptors of this kind in a recipe payload.
    pub fn field(self) -> &'static str {
        match self {
            AttributeKind::Tag => "tags",
            AttributeKind::Ingredient => "ingredients",
        }
    }
}

/// A recipe together with its linked tags and ingredients, ordered by id.
#[derive(Clone, Debug, PartialEq)]
pub struct FullRecipe {
    pub recipe: Recipe,
    pub tags: Vec<Attribute>,
    pub ingredients: Vec<Attribute>,
}

impl FullRecipe {
    pub fn attributes(&self, kind: AttributeKind) -> &[Attribute] {
        match kind {
            AttributeKind::Tag => &self.tags,
            AttributeKind::Ingredient => &self.ingredients,
        }
    }
}

/// Filters accepted by the recipe list; a recipe matches when it links any listed id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecipeFilter {
    pub tags: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<Uuid>>,
}

impl RecipeFilter {
    pub fn ids(&self, kind: AttributeKind) -> Option<&[Uuid]> {
        match kind {
            AttributeKind::Tag => self.tags.as_deref(),
            AttributeKind::Ingredient => self.ingredients.as_deref(),
        }
    }
}
