use std::convert::Infallible;

use warp::{Filter, Reply};

use super::attributes::attribute_routes;
use super::context::AppContext;
use super::recipes::recipe_routes;
use super::rejection::handle_rejection;
use super::users::user_routes;

/// The complete HTTP surface, with errors rendered as JSON.
pub fn routes(ctx: AppContext) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let media = warp::path("media").and(warp::fs::dir(ctx.media.root().to_path_buf()));

    let api = user_routes(ctx.clone())
        .or(recipe_routes(ctx.clone()))
        .unify()
        .or(attribute_routes(ctx))
        .unify();

    api.or(media)
        .recover(handle_rejection)
        .with(warp::log("recipe_api::http"))
}
