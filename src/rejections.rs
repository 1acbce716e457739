use log::error;
use std::convert::Infallible;
use warp::{http::StatusCode, reject::Rejection, reply::Reply};

use crate::models::ErrorReply;

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "NOT_FOUND";
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "METHOD_NOT_ALLOWED";
    } else {
        error!("unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "UNHANDLED_REJECTION";
    }

    let reply = ErrorReply {
        error: message.into(),
        details: None,
    };

    Ok(warp::reply::with_status(warp::reply::json(&reply), code))
}
