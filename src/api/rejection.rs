use std::convert::Infallible;

use serde_json::json;
use warp::{http::StatusCode, reject::Rejection, reply::Reply};

use crate::database::error::Error;

/// Turns every rejection into a JSON error response.
///
/// Body and header rejections are checked before `MethodNotAllowed`, which
/// sibling routes on the same path always add to the combined rejection.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(error) = err.find::<Error>() {
        if error.is_server_error() {
            log::error!("Request failed: {error}");
        }
        (error.status(), error.body())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, json!({ "detail": e.to_string() }))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({ "detail": "Request body is too large." }),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            json!({ "detail": "Content-Length header is required." }),
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            json!({ "detail": "Unsupported media type." }),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "detail": "Method not allowed." }),
        )
    } else if err.find::<warp::reject::MissingHeader>().is_some()
        || err.find::<warp::reject::InvalidHeader>().is_some()
    {
        (
            StatusCode::BAD_REQUEST,
            json!({ "detail": "Missing or malformed header." }),
        )
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            json!({ "detail": "Invalid query string." }),
        )
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, json!({ "detail": "Not found." }))
    } else {
        log::error!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "detail": "A server error occurred." }),
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
