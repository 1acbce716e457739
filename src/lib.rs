//! Practice quizzes generated on demand by a chat-completion model.

use std::sync::Arc;
use warp::{reply::Reply, Filter};

pub mod config;
pub mod controllers;
pub mod filters;
pub mod generator;
pub mod models;
pub mod parser;
pub mod proxy;
pub mod rejections;
pub mod session;
pub mod views;

use models::Catalog;
use proxy::Upstream;

pub fn routes(
    upstream: Upstream,
    catalog: Arc<Catalog>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let generate = filters::generate_request()
        .and(filters::with_upstream(upstream))
        .and_then(proxy::generate);

    let catalog = warp::path!("api" / "catalog")
        .and(warp::get())
        .and(filters::with_catalog(catalog))
        .map(proxy::catalog);

    generate.or(catalog)
}
