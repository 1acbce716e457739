use std::{convert::Infallible, sync::Arc};
use warp::{http::Method, hyper::body::Bytes, Filter};

use crate::models::Catalog;
use crate::proxy::Upstream;

pub fn with_upstream(
    upstream: Upstream,
) -> impl Filter<Extract = (Upstream,), Error = Infallible> + Clone {
    warp::any().map(move || upstream.clone())
}

pub fn with_catalog(
    catalog: Arc<Catalog>,
) -> impl Filter<Extract = (Arc<Catalog>,), Error = Infallible> + Clone {
    warp::any().map(move || catalog.clone())
}

/// `/api/generate` with any method; the handler answers non-POST itself.
pub fn generate_request(
) -> impl Filter<Extract = (Method, Bytes), Error = warp::Rejection> + Clone {
    warp::path!("api" / "generate")
        .and(warp::method())
        .and(warp::body::bytes())
}
