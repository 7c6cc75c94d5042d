use warp::{http::StatusCode, reject::Rejection, reply::Response, Filter, Reply};

use crate::authentication::accounts::{login_user, register_user, update_profile};
use crate::authentication::middleware::with_session;
use crate::constants::JSON_BODY_LIMIT;
use crate::database::form::{TokenPayload, UserPayload};
use crate::database::schema::User;

use super::context::{with_context, AppContext};
use super::views::{TokenView, UserView};

fn json_body() -> impl Filter<Extract = (UserPayload,), Error = Rejection> + Clone {
    warp::body::content_length_limit(JSON_BODY_LIMIT).and(warp::body::json())
}

/// `/api/user/...`
pub fn user_routes(
    ctx: AppContext,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    create_route(ctx.clone())
        .or(token_route(ctx.clone()))
        .unify()
        .or(me_routes(ctx))
        .unify()
}

fn create_route(ctx: AppContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "user" / "create")
        .and(warp::post())
        .and(json_body())
        .and(with_context(ctx))
        .and_then(handle_create_user)
}

fn token_route(ctx: AppContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "user" / "token")
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with_context(ctx))
        .and_then(handle_create_token)
}

fn me_routes(ctx: AppContext) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let get = warp::path!("api" / "user" / "me")
        .and(warp::get())
        .and(with_session(ctx.clone()))
        .and_then(handle_get_me);

    let put = warp::path!("api" / "user" / "me")
        .and(warp::put())
        .and(with_session(ctx.clone()))
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(|user, payload, ctx| handle_update_me(user, payload, ctx, false));

    let patch = warp::path!("api" / "user" / "me")
        .and(warp::patch())
        .and(with_session(ctx.clone()))
        .and(json_body())
        .and(with_context(ctx))
        .and_then(|user, payload, ctx| handle_update_me(user, payload, ctx, true));

    get.or(put).unify().or(patch).unify()
}

async fn handle_create_user(payload: UserPayload, ctx: AppContext) -> Result<Response, Rejection> {
    let user = register_user(ctx.store.as_ref(), &payload).await?;

    Ok(warp::reply::with_status(warp::reply::json(&UserView::from(&user)), StatusCode::CREATED)
        .into_response())
}

async fn handle_create_token(payload: TokenPayload, ctx: AppContext) -> Result<Response, Rejection> {
    let token = login_user(ctx.store.as_ref(), &ctx.keys, &payload).await?;

    Ok(warp::reply::json(&TokenView { token }).into_response())
}

async fn handle_get_me(user: User) -> Result<Response, Rejection> {
    Ok(warp::reply::json(&UserView::from(&user)).into_response())
}

async fn handle_update_me(
    user: User,
    payload: UserPayload,
    ctx: AppContext,
    partial: bool,
) -> Result<Response, Rejection> {
    let user = update_profile(ctx.store.as_ref(), &user, &payload, partial).await?;

    Ok(warp::reply::json(&UserView::from(&user)).into_response())
}
