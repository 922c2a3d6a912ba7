//! In-memory drinks resource guarded by per-route scopes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::auth::Authorized;
use crate::auth::scopes::{DeleteDrinks, GetDrinks, GetDrinksDetail, PatchDrinks, PostDrinks};
use crate::error::ApiError;

/// One recipe component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Ingredient name.
    pub name: String,
    /// Display color.
    pub color: String,
    /// Relative amount.
    pub parts: u32,
}

/// A stored drink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drink {
    /// Store-assigned identifier.
    pub id: u64,
    /// Unique title.
    pub title: String,
    /// Recipe, in pour order.
    pub recipe: Vec<Ingredient>,
}

/// Public view of a drink: colors and proportions, no ingredient names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrinkSummary {
    /// Identifier.
    pub id: u64,
    /// Title.
    pub title: String,
    /// Recipe without names.
    pub recipe: Vec<IngredientSummary>,
}

/// Ingredient without its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientSummary {
    /// Display color.
    pub color: String,
    /// Relative amount.
    pub parts: u32,
}

impl Drink {
    /// The public view.
    #[must_use]
    pub fn summary(&self) -> DrinkSummary {
        DrinkSummary {
            id: self.id,
            title: self.title.clone(),
            recipe: self
                .recipe
                .iter()
                .map(|i| IngredientSummary {
                    color: i.color.clone(),
                    parts: i.parts,
                })
                .collect(),
        }
    }
}

/// Body of a create request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDrink {
    /// Title, unique across the store.
    pub title: String,
    /// Non-empty recipe.
    pub recipe: Vec<Ingredient>,
}

/// Body of an update request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrinkPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New recipe.
    #[serde(default)]
    pub recipe: Option<Vec<Ingredient>>,
}

/// Drinks held in memory for the life of the process.
#[derive(Debug, Default)]
pub struct DrinkStore {
    drinks: RwLock<BTreeMap<u64, Drink>>,
    next_id: AtomicU64,
}

impl DrinkStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All drinks, ordered by id.
    pub async fn list(&self) -> Vec<Drink> {
        self.drinks.read().await.values().cloned().collect()
    }

    /// Look up one drink.
    pub async fn get(&self, id: u64) -> Option<Drink> {
        self.drinks.read().await.get(&id).cloned()
    }

    /// Add a drink.
    ///
    /// # Errors
    ///
    /// `Unprocessable` if the title is blank or taken, or the recipe is unusable.
    pub async fn create(&self, new: NewDrink) -> Result<Drink, ApiError> {
        let title = validate_title(&new.title)?;
        validate_recipe(&new.recipe)?;

        let mut drinks = self.drinks.write().await;
        if drinks.values().any(|d| d.title == title) {
            return Err(ApiError::Unprocessable(format!("title '{title}' already exists")));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let drink = Drink {
            id,
            title,
            recipe: new.recipe,
        };
        drinks.insert(id, drink.clone());
        Ok(drink)
    }

    /// Apply the fields present in `patch`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `BadRequest` for an empty patch,
    /// `Unprocessable` for invalid field values.
    pub async fn update(&self, id: u64, patch: DrinkPatch) -> Result<Drink, ApiError> {
        if patch.title.is_none() && patch.recipe.is_none() {
            return Err(ApiError::BadRequest("no fields to update".to_string()));
        }
        let title = patch.title.as_deref().map(validate_title).transpose()?;
        if let Some(recipe) = &patch.recipe {
            validate_recipe(recipe)?;
        }

        let mut drinks = self.drinks.write().await;
        if !drinks.contains_key(&id) {
            return Err(ApiError::NotFound);
        }
        if let Some(title) = &title {
            if drinks.values().any(|d| d.id != id && &d.title == title) {
                return Err(ApiError::Unprocessable(format!("title '{title}' already exists")));
            }
        }

        let drink = drinks.get_mut(&id).ok_or(ApiError::NotFound)?;
        if let Some(title) = title {
            drink.title = title;
        }
        if let Some(recipe) = patch.recipe {
            drink.recipe = recipe;
        }
        Ok(drink.clone())
    }

    /// Remove a drink.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn delete(&self, id: u64) -> Result<Drink, ApiError> {
        self.drinks.write().await.remove(&id).ok_or(ApiError::NotFound)
    }
}

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::Unprocessable("title is empty".to_string()));
    }
    Ok(title.to_string())
}

fn validate_recipe(recipe: &[Ingredient]) -> Result<(), ApiError> {
    if recipe.is_empty() {
        return Err(ApiError::Unprocessable("recipe is empty".to_string()));
    }
    if recipe.iter().any(|i| i.name.trim().is_empty() || i.parts == 0) {
        return Err(ApiError::Unprocessable(
            "every ingredient needs a name and at least one part".to_string(),
        ));
    }
    Ok(())
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == StatusCode::UNPROCESSABLE_ENTITY => {
            Err(ApiError::Unprocessable(rejection.body_text()))
        }
        Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
    }
}

fn drink_id(id: Result<Path<u64>, PathRejection>) -> Result<u64, ApiError> {
    id.map(|Path(id)| id).map_err(|_| ApiError::NotFound)
}

pub(crate) async fn list_drinks(
    _auth: Authorized<GetDrinks>,
    State(store): State<Arc<DrinkStore>>,
) -> Json<Value> {
    let drinks: Vec<DrinkSummary> = store.list().await.iter().map(Drink::summary).collect();
    Json(json!({ "success": true, "drinks": drinks }))
}

pub(crate) async fn drinks_detail(
    _auth: Authorized<GetDrinksDetail>,
    State(store): State<Arc<DrinkStore>>,
) -> Json<Value> {
    Json(json!({ "success": true, "drinks": store.list().await }))
}

pub(crate) async fn create_drink(
    auth: Authorized<PostDrinks>,
    State(store): State<Arc<DrinkStore>>,
    body: Result<Json<NewDrink>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let drink = store.create(json_body(body)?).await?;
    tracing::info!(id = drink.id, sub = %auth.claims().subject(), "Drink created");
    Ok(Json(json!({ "success": true, "drinks": [drink] })))
}

pub(crate) async fn update_drink(
    auth: Authorized<PatchDrinks>,
    State(store): State<Arc<DrinkStore>>,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<DrinkPatch>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = drink_id(id)?;
    let drink = store.update(id, json_body(body)?).await?;
    tracing::info!(id, sub = %auth.claims().subject(), "Drink updated");
    Ok(Json(json!({ "success": true, "drinks": [drink] })))
}

pub(crate) async fn delete_drink(
    auth: Authorized<DeleteDrinks>,
    State(store): State<Arc<DrinkStore>>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = drink_id(id)?;
    store.delete(id).await?;
    tracing::info!(id, sub = %auth.claims().subject(), "Drink deleted");
    Ok(Json(json!({ "success": true, "delete": id })))
}
