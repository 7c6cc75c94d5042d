use std::collections::HashMap;

use bytes::BufMut;
use futures::TryStreamExt;
use warp::{
    http::StatusCode,
    multipart::FormData,
    reject::Rejection,
    reply::Response,
    Filter, Reply,
};

use crate::authentication::middleware::with_session;
use crate::constants::JSON_BODY_LIMIT;
use crate::database::error::{field_error, Error, HtmlError};
use crate::database::form::RecipePayload;
use crate::database::schema::{AttributeKind, RecipeFilter, User, Uuid};

use super::context::{with_context, AppContext};
use super::views::{ImageView, RecipeDetailView, RecipeView};

fn json_body() -> impl Filter<Extract = (RecipePayload,), Error = Rejection> + Clone {
    warp::body::content_length_limit(JSON_BODY_LIMIT).and(warp::body::json())
}

/// `/api/recipe/recipes/...`
pub fn recipe_routes(
    ctx: AppContext,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    collection_routes(ctx.clone())
        .or(detail_routes(ctx.clone()))
        .unify()
        .or(upload_image_route(ctx))
        .unify()
}

fn collection_routes(ctx: AppContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "recipe" / "recipes")
        .and(warp::get())
        .and(with_session(ctx.clone()))
        .and(warp::query::<HashMap<String, String>>())
        .and(with_context(ctx.clone()))
        .and_then(handle_list_recipes);

    let create = warp::path!("api" / "recipe" / "recipes")
        .and(warp::post())
        .and(with_session(ctx.clone()))
        .and(json_body())
        .and(with_context(ctx))
        .and_then(handle_create_recipe);

    list.or(create).unify()
}

fn detail_routes(ctx: AppContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let get = warp::path!("api" / "recipe" / "recipes" / Uuid)
        .and(warp::get())
        .and(with_session(ctx.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_get_recipe);

    let put = warp::path!("api" / "recipe" / "recipes" / Uuid)
        .and(warp::put())
        .and(with_session(ctx.clone()))
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(|id, user, payload, ctx| handle_update_recipe(id, user, payload, ctx, false));

    let patch = warp::path!("api" / "recipe" / "recipes" / Uuid)
        .and(warp::patch())
        .and(with_session(ctx.clone()))
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(|id, user, payload, ctx| handle_update_recipe(id, user, payload, ctx, true));

    let delete = warp::path!("api" / "recipe" / "recipes" / Uuid)
        .and(warp::delete())
        .and(with_session(ctx.clone()))
        .and(with_context(ctx))
        .and_then(handle_delete_recipe);

    get.or(put).unify().or(patch).unify().or(delete).unify()
}

fn upload_image_route(ctx: AppContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let max_length = ctx.media.max_bytes();

    warp::path!("api" / "recipe" / "recipes" / Uuid / "upload-image")
        .and(warp::post())
        .and(with_session(ctx.clone()))
        .and(warp::multipart::form().max_length(max_length))
        .and(with_context(ctx))
        .and_then(handle_upload_image)
}

/// Parses a comma separated id list such as `1,2,3`.
fn parse_ids(field: &str, value: &str) -> Result<Vec<Uuid>, Error> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<Uuid>()
                .map_err(|_| field_error(field, &format!("{id:?} is not a valid id.")))
        })
        .collect()
}

pub fn parse_filter(query: &HashMap<String, String>) -> Result<RecipeFilter, Error> {
    let mut filter = RecipeFilter::default();

    for kind in AttributeKind::ALL {
        if let Some(value) = query.get(kind.field()) {
            let ids = Some(parse_ids(kind.field(), value)?);
            match kind {
                AttributeKind::Tag => filter.tags = ids,
                AttributeKind::Ingredient => filter.ingredients = ids,
            }
        }
    }

    Ok(filter)
}

async fn handle_list_recipes(
    user: User,
    query: HashMap<String, String>,
    ctx: AppContext,
) -> Result<Response, Rejection> {
    let filter = parse_filter(&query)?;
    let recipes: Vec<RecipeView> = ctx
        .store
        .list_recipes(&user, &filter)
        .await?
        .into_iter()
        .map(RecipeView::from)
        .collect();

    Ok(warp::reply::json(&recipes).into_response())
}

async fn handle_create_recipe(
    user: User,
    payload: RecipePayload,
    ctx: AppContext,
) -> Result<Response, Rejection> {
    let recipe = ctx.store.create_recipe(&user, &payload).await?;
    log::info!("User {} created recipe {}", user.id, recipe.recipe.id);

    Ok(warp::reply::with_status(
        warp::reply::json(&RecipeDetailView::from(recipe)),
        StatusCode::CREATED,
    )
    .into_response())
}

async fn handle_get_recipe(id: Uuid, user: User, ctx: AppContext) -> Result<Response, Rejection> {
    match ctx.store.get_recipe(&user, id).await? {
        Some(recipe) => Ok(warp::reply::json(&RecipeDetailView::from(recipe)).into_response()),
        None => Err(HtmlError::NotFound.default().into()),
    }
}

async fn handle_update_recipe(
    id: Uuid,
    user: User,
    payload: RecipePayload,
    ctx: AppContext,
    partial: bool,
) -> Result<Response, Rejection> {
    let recipe = ctx.store.update_recipe(&user, id, &payload, partial).await?;

    Ok(warp::reply::json(&RecipeDetailView::from(recipe)).into_response())
}

async fn handle_delete_recipe(id: Uuid, user: User, ctx: AppContext) -> Result<Response, Rejection> {
    if !ctx.store.delete_recipe(&user, id).await? {
        return Err(HtmlError::NotFound.default().into());
    }
    log::info!("User {} deleted recipe {id}", user.id);

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Reads the `image` field of a multipart form. Each part is drained before
/// the next one is pulled from the form.
async fn read_image(mut form: FormData) -> Result<Option<Vec<u8>>, Error> {
    let malformed = |e: warp::Error| {
        log::debug!("Malformed multipart body: {e}");
        HtmlError::InvalidRequest.new("Malformed multipart body.")
    };

    let mut image = None;
    while let Some(part) = form.try_next().await.map_err(malformed)? {
        let is_image = part.name() == "image";
        let data = part
            .stream()
            .try_fold(Vec::new(), |mut data, buf| async move {
                data.put(buf);
                Ok(data)
            })
            .await
            .map_err(malformed)?;
        if is_image && image.is_none() {
            image = Some(data);
        }
    }

    Ok(image)
}

async fn handle_upload_image(
    id: Uuid,
    user: User,
    form: FormData,
    ctx: AppContext,
) -> Result<Response, Rejection> {
    if ctx.store.get_recipe(&user, id).await?.is_none() {
        return Err(HtmlError::NotFound.default().into());
    }

    let data = match read_image(form).await? {
        Some(data) if !data.is_empty() => data,
        _ => return Err(field_error("image", "No file was submitted.").into()),
    };
    let path = ctx.media.save_recipe_image(&data).await?;

    match ctx.store.set_recipe_image(&user, id, &path).await? {
        Some(recipe) => Ok(warp::reply::json(&ImageView::from(&recipe)).into_response()),
        None => Err(HtmlError::NotFound.default().into()),
    }
}
