use std::{convert::Infallible, sync::Arc};

use warp::Filter;

use crate::database::store::Store;
use crate::authentication::jwt::SessionKeys;
use crate::media::MediaStorage;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub keys: SessionKeys,
    pub media: MediaStorage,
}

impl AppContext {
    pub fn new(store: Arc<dyn Store>, keys: SessionKeys, media: MediaStorage) -> Self {
        Self { store, keys, media }
    }
}

pub fn with_context(ctx: AppContext) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}
