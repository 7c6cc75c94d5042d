use warp::{reject::Rejection, Filter};

use crate::api::context::AppContext;
use crate::constants::TOKEN_KEYWORDS;
use crate::database::error::{Error, HtmlError};
use crate::database::schema::User;

/// Extracts the token from `Token <jwt>` or `Bearer <jwt>`.
fn parse_authorization(header: &str) -> Option<&str> {
    let (keyword, token) = header.trim().split_once(' ')?;
    if !TOKEN_KEYWORDS.contains(&keyword) {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

async fn authenticate(ctx: AppContext, header: Option<String>) -> Result<User, Error> {
    let header = header.ok_or_else(|| {
        HtmlError::Unauthorized.new("Authentication credentials were not provided.")
    })?;
    let token = parse_authorization(&header)
        .ok_or_else(|| HtmlError::Unauthorized.new("Invalid token header."))?;

    let session = ctx.keys.verify_jwt_session(token)?;
    match ctx.store.get_user(session.user_id).await? {
        Some(user) if user.is_active => Ok(user),
        _ => Err(HtmlError::Unauthorized.new("User inactive or deleted.")),
    }
}

/// Resolves the acting user from the `Authorization` header, rejecting with 401.
pub fn with_session(ctx: AppContext) -> impl Filter<Extract = (User,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let ctx = ctx.clone();
        async move { authenticate(ctx, header).await.map_err(Rejection::from) }
    })
}
