use std::collections::HashMap;

use warp::{http::StatusCode, reject::Rejection, reply::Response, Filter, Reply};

use crate::authentication::middleware::with_session;
use crate::constants::JSON_BODY_LIMIT;
use crate::database::error::{field_error, Error, HtmlError};
use crate::database::form::AttributePayload;
use crate::database::schema::{AttributeKind, User, Uuid};

use super::context::{with_context, AppContext};

fn base(kind: AttributeKind) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path("api")
        .and(warp::path("recipe"))
        .and(warp::path(kind.field()))
}

fn json_body() -> impl Filter<Extract = (AttributePayload,), Error = Rejection> + Clone {
    warp::body::content_length_limit(JSON_BODY_LIMIT).and(warp::body::json())
}

/// `/api/recipe/tags/...` and `/api/recipe/ingredients/...`. Rows are only
/// created through recipe writes, so there is no create endpoint.
pub fn attribute_routes(
    ctx: AppContext,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    kind_routes(AttributeKind::Tag, ctx.clone())
        .or(kind_routes(AttributeKind::Ingredient, ctx))
        .unify()
}

fn kind_routes(
    kind: AttributeKind,
    ctx: AppContext,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = base(kind)
        .and(warp::path::end())
        .and(warp::get())
        .and(with_session(ctx.clone()))
        .and(warp::query::<HashMap<String, String>>())
        .and(with_context(ctx.clone()))
        .and_then(move |user, query, ctx| handle_list(kind, user, query, ctx));

    let detail = || base(kind).and(warp::path::param::<Uuid>()).and(warp::path::end());

    let put = detail()
        .and(warp::put())
        .and(with_session(ctx.clone()))
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(move |id, user, payload, ctx| handle_rename(kind, id, user, payload, ctx, false));

    let patch = detail()
        .and(warp::patch())
        .and(with_session(ctx.clone()))
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(move |id, user, payload, ctx| handle_rename(kind, id, user, payload, ctx, true));

    let delete = detail()
        .and(warp::delete())
        .and(with_session(ctx.clone()))
        .and(with_context(ctx))
        .and_then(move |id, user, ctx| handle_delete(kind, id, user, ctx));

    list.or(put)
        .unify()
        .or(patch)
        .unify()
        .or(delete)
        .unify()
}

/// `assigned_only` takes an integer flag; anything but `0` enables it.
fn assigned_only(query: &HashMap<String, String>) -> Result<bool, Error> {
    match query.get("assigned_only") {
        None => Ok(false),
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map(|flag| flag != 0)
            .map_err(|_| field_error("assigned_only", "A valid integer is required.")),
    }
}

async fn handle_list(
    kind: AttributeKind,
    user: User,
    query: HashMap<String, String>,
    ctx: AppContext,
) -> Result<Response, Rejection> {
    let assigned_only = assigned_only(&query)?;
    let rows = ctx.store.list_attributes(kind, &user, assigned_only).await?;

    Ok(warp::reply::json(&rows).into_response())
}

async fn handle_rename(
    kind: AttributeKind,
    id: Uuid,
    user: User,
    payload: AttributePayload,
    ctx: AppContext,
    partial: bool,
) -> Result<Response, Rejection> {
    let renamed = match payload.validate(partial)? {
        Some(name) => ctx.store.rename_attribute(kind, &user, id, &name).await?,
        None => ctx.store.get_attribute(kind, &user, id).await?,
    };

    match renamed {
        Some(row) => Ok(warp::reply::json(&row).into_response()),
        None => Err(HtmlError::NotFound.default().into()),
    }
}

async fn handle_delete(
    kind: AttributeKind,
    id: Uuid,
    user: User,
    ctx: AppContext,
) -> Result<Response, Rejection> {
    if !ctx.store.delete_attribute(kind, &user, id).await? {
        return Err(HtmlError::NotFound.default().into());
    }
    log::info!("User {} deleted {kind:?} {id}", user.id);

    Ok(StatusCode::NO_CONTENT.into_response())
}
