use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::constants::{
    COST_MAX_DIGITS, COST_SCALE, LINK_MAX_LENGTH, NAME_MAX_LENGTH, TITLE_MAX_LENGTH,
};

use super::{
    error::{field_error, Error, FieldErrors, HtmlError},
    schema::{AttributeKind, NewRecipe, RecipeChanges},
};

/// Optional field of an update payload.
///
/// A missing key deserializes to `Absent` (through `#[serde(default)]`); any
/// present value, including an empty list, becomes `Provided`. `null` is not
/// accepted for `Vec` payloads, so it surfaces as a body error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Patch<T> {
    Absent,
    Provided(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Provided)
    }
}

/// Request for a tag or ingredient by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AttributeDescriptor {
    #[serde(default)]
    pub name: Option<String>,
}

impl AttributeDescriptor {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
        }
    }
}

/// Returns the usable names of `items`, in input order, or a validation error
/// on the field belonging to `kind`.
pub fn descriptor_names(items: &[AttributeDescriptor], kind: AttributeKind) -> Result<Vec<&str>, Error> {
    let mut errors = FieldErrors::new();
    let mut names = Vec::with_capacity(items.len());

    for item in items {
        match item.name.as_deref() {
            None => errors.add(kind.field(), "name: This field is required."),
            Some(name) if name.trim().is_empty() => {
                errors.add(kind.field(), "name: This field may not be blank.")
            }
            Some(name) if name.chars().count() > NAME_MAX_LENGTH => errors.add(
                kind.field(),
                &format!("name: Ensure this field has no more than {NAME_MAX_LENGTH} characters."),
            ),
            Some(name) => names.push(name),
        }
    }

    errors.finish()?;
    Ok(names)
}

/// Body of recipe create, full update and partial update requests.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecipePayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub time_minutes: Option<i64>,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub tags: Patch<Vec<AttributeDescriptor>>,
    #[serde(default)]
    pub ingredients: Patch<Vec<AttributeDescriptor>>,
}

impl RecipePayload {
    pub fn attributes(&self, kind: AttributeKind) -> &Patch<Vec<AttributeDescriptor>> {
        match kind {
            AttributeKind::Tag => &self.tags,
            AttributeKind::Ingredient => &self.ingredients,
        }
    }

    /// Validates a create request. Nested descriptors are checked as well so
    /// that nothing is written for an invalid body.
    pub fn validate_create(&self) -> Result<NewRecipe, Error> {
        let changes = self.validate_changes(true)?;

        match changes {
            RecipeChanges {
                title: Some(title),
                time_minutes: Some(time_minutes),
                cost: Some(cost),
                description,
                link,
            } => Ok(NewRecipe {
                title,
                description: description.unwrap_or_default(),
                time_minutes,
                cost,
                link: link.unwrap_or_default(),
            }),
            _ => Err(HtmlError::InvalidRequest.new("Missing required fields")),
        }
    }

    /// Validates an update request. `partial` is false for PUT, which
    /// requires the same fields as a create.
    pub fn validate_update(&self, partial: bool) -> Result<RecipeChanges, Error> {
        self.validate_changes(!partial)
    }

    fn validate_changes(&self, require: bool) -> Result<RecipeChanges, Error> {
        let mut errors = FieldErrors::new();
        let mut changes = RecipeChanges::default();

        match &self.title {
            None if require => errors.add("title", "This field is required."),
            None => {}
            Some(title) if title.trim().is_empty() => {
                errors.add("title", "This field may not be blank.")
            }
            Some(title) if title.chars().count() > TITLE_MAX_LENGTH => errors.add(
                "title",
                &format!("Ensure this field has no more than {TITLE_MAX_LENGTH} characters."),
            ),
            Some(title) => changes.title = Some(title.to_owned()),
        }

        match self.time_minutes {
            None if require => errors.add("time_minutes", "This field is required."),
            None => {}
            Some(minutes) if minutes < 0 => errors.add(
                "time_minutes",
                "Ensure this value is greater than or equal to 0.",
            ),
            Some(minutes) => match i32::try_from(minutes) {
                Ok(minutes) => changes.time_minutes = Some(minutes),
                Err(_) => errors.add("time_minutes", "Ensure this value is a valid integer."),
            },
        }

        match self.cost {
            None if require => errors.add("cost", "This field is required."),
            None => {}
            Some(cost) => match normalize_cost(cost) {
                Ok(cost) => changes.cost = Some(cost),
                Err(message) => errors.add("cost", message),
            },
        }

        if let Some(description) = &self.description {
            changes.description = Some(description.to_owned());
        }

        match &self.link {
            Some(link) if link.chars().count() > LINK_MAX_LENGTH => errors.add(
                "link",
                &format!("Ensure this field has no more than {LINK_MAX_LENGTH} characters."),
            ),
            Some(link) => changes.link = Some(link.to_owned()),
            None => {}
        }

        for kind in AttributeKind::ALL {
            if let Patch::Provided(items) = self.attributes(kind) {
                if let Err(error) = descriptor_names(items, kind) {
                    for (field, messages) in error.fields {
                        for message in messages {
                            errors.add(&field, &message);
                        }
                    }
                }
            }
        }

        errors.finish()?;
        Ok(changes)
    }
}

/// Fixes `cost` to two decimal places, rejecting values that do not fit `NUMERIC(5,2)`.
pub fn normalize_cost(cost: Decimal) -> Result<Decimal, &'static str> {
    if cost.normalize().scale() > COST_SCALE {
        return Err("Ensure that there are no more than 2 decimal places.");
    }

    let mut cost = cost;
    cost.rescale(COST_SCALE);

    let digits = cost.mantissa().unsigned_abs().to_string().len() as u32;
    if digits > COST_MAX_DIGITS {
        return Err("Ensure that there are no more than 5 digits in total.");
    }

    Ok(cost)
}

/// Body of `PUT`/`PATCH` on a tag or ingredient.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AttributePayload {
    #[serde(default)]
    pub name: Option<String>,
}

impl AttributePayload {
    /// Returns the new name, or `None` for a partial update that leaves it alone.
    pub fn validate(&self, partial: bool) -> Result<Option<String>, Error> {
        match self.name.as_deref() {
            None if partial => Ok(None),
            None => Err(field_error("name", "This field is required.")),
            Some(name) if name.trim().is_empty() => {
                Err(field_error("name", "This field may not be blank."))
            }
            Some(name) if name.chars().count() > NAME_MAX_LENGTH => Err(field_error(
                "name",
                &format!("Ensure this field has no more than {NAME_MAX_LENGTH} characters."),
            )),
            Some(name) => Ok(Some(name.to_owned())),
        }
    }
}

/// Body of user registration and profile updates.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of the token endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenPayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    fn payload(value: serde_json::Value) -> RecipePayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn missing_relation_is_absent_and_empty_list_is_provided() {
        let absent = payload(json!({ "title": "Soup" }));
        let empty = payload(json!({ "tags": [] }));
        let values = payload(json!({ "tags": [{ "name": "Vegan" }] }));

        assert_eq!(absent.tags, Patch::Absent);
        assert_eq!(empty.tags, Patch::Provided(vec![]));
        assert_eq!(
            values.tags,
            Patch::Provided(vec![AttributeDescriptor::named("Vegan")])
        );
    }

    #[test]
    fn null_relation_is_rejected() {
        let result = serde_json::from_value::<RecipePayload>(json!({ "tags": null }));
        assert!(result.is_err());
    }

    #[test]
    fn create_requires_title_time_and_cost() {
        let error = payload(json!({ "description": "x" }))
            .validate_create()
            .unwrap_err();

        assert_eq!(error.code, 400);
        assert!(error.fields.contains_key("title"));
        assert!(error.fields.contains_key("time_minutes"));
        assert!(error.fields.contains_key("cost"));
    }

    #[test]
    fn create_fills_defaults() {
        let recipe = payload(json!({ "title": "X", "time_minutes": 10, "cost": 7.99 }))
            .validate_create()
            .unwrap();

        assert_eq!(recipe.title, "X");
        assert_eq!(recipe.time_minutes, 10);
        assert_eq!(recipe.cost, Decimal::from_str("7.99").unwrap());
        assert_eq!(recipe.description, "");
        assert_eq!(recipe.link, "");
    }

    #[test]
    fn negative_time_is_rejected() {
        let error = payload(json!({ "title": "X", "time_minutes": -1, "cost": "1.00" }))
            .validate_create()
            .unwrap_err();

        assert!(error.fields.contains_key("time_minutes"));
    }

    #[test]
    fn partial_update_accepts_any_subset() {
        let changes = payload(json!({ "title": "New" }))
            .validate_update(true)
            .unwrap();

        assert_eq!(changes.title.as_deref(), Some("New"));
        assert_eq!(changes.cost, None);
    }

    #[test]
    fn full_update_requires_fields() {
        let error = payload(json!({ "title": "New" }))
            .validate_update(false)
            .unwrap_err();

        assert!(error.fields.contains_key("cost"));
    }

    #[test]
    fn blank_descriptor_is_rejected_on_its_field() {
        let error = payload(json!({
            "title": "X", "time_minutes": 1, "cost": "1.00",
            "ingredients": [{ "name": "Salt" }, { "name": "  " }]
        }))
        .validate_create()
        .unwrap_err();

        assert_eq!(
            error.fields.get("ingredients"),
            Some(&vec![String::from("name: This field may not be blank.")])
        );
    }

    #[test]
    fn descriptor_without_name_is_rejected() {
        let items = vec![AttributeDescriptor::default()];
        let error = descriptor_names(&items, AttributeKind::Tag).unwrap_err();

        assert!(error.fields.contains_key("tags"));
    }

    #[test]
    fn descriptor_names_keep_order_and_duplicates() {
        let items = vec![
            AttributeDescriptor::named("A"),
            AttributeDescriptor::named("B"),
            AttributeDescriptor::named("A"),
        ];

        assert_eq!(
            descriptor_names(&items, AttributeKind::Tag).unwrap(),
            vec!["A", "B", "A"]
        );
    }

    #[test]
    fn cost_is_rescaled_to_two_places() {
        let cost = normalize_cost(Decimal::from_str("7.9").unwrap()).unwrap();
        assert_eq!(cost.to_string(), "7.90");
    }

    #[test]
    fn cost_with_too_many_places_or_digits_is_rejected() {
        assert!(normalize_cost(Decimal::from_str("1.999").unwrap()).is_err());
        assert!(normalize_cost(Decimal::from_str("1000.00").unwrap()).is_err());
        assert!(normalize_cost(Decimal::from_str("999.99").unwrap()).is_ok());
    }

    #[test]
    fn attribute_payload_requires_name_on_full_update() {
        assert!(AttributePayload::default().validate(false).is_err());
        assert_eq!(AttributePayload::default().validate(true).unwrap(), None);

        let blank = AttributePayload {
            name: Some(String::from(" ")),
        };
        assert!(blank.validate(true).is_err());
    }
}
