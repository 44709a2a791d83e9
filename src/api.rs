use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap, Method},
    response::Response,
    routing::any,
    Router,
};
use std::collections::HashMap;
use tower_http::trace::TraceLayer;

use crate::dispatch::{dispatch, BookRequest, Target};
use crate::repo::BookRepo;
use crate::response::Envelope;

type QueryParams = Result<Query<HashMap<String, String>>, QueryRejection>;

#[derive(Clone)]
struct AppState<R> {
    repo: R,
}

/// Every method is routed to the dispatcher, so unsupported ones still get an envelope.
pub fn build_app<R: BookRepo>(repo: R) -> Router {
    Router::new()
        .route("/books", any(books_collection::<R>))
        .route("/books/{id}", any(books_item::<R>))
        .fallback(endpoint_not_found::<R>)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { repo })
}

async fn books_collection<R: BookRepo>(
    State(state): State<AppState<R>>,
    method: Method,
    query: QueryParams,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let target = match query {
        Ok(Query(params)) => Target::for_collection(&params),
        Err(_) => Target::Unknown,
    };

    handle(&state.repo, method, target, &headers, body).await
}

async fn books_item<R: BookRepo>(
    State(state): State<AppState<R>>,
    method: Method,
    id: Result<Path<String>, PathRejection>,
    query: QueryParams,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    // An undecodable path segment is handled like any other non-numeric identifier
    let id = id.map(|Path(id)| id).unwrap_or_default();
    let target = match query {
        Ok(Query(params)) => Target::for_item(id, &params),
        Err(_) => Target::Unknown,
    };

    handle(&state.repo, method, target, &headers, body).await
}

async fn endpoint_not_found<R: BookRepo>(
    State(state): State<AppState<R>>,
    method: Method,
) -> Response {
    let request = BookRequest {
        method,
        target: Target::Unknown,
        content_type: None,
        body: Bytes::new(),
    };

    dispatch(&state.repo, request).await.send()
}

async fn handle<R: BookRepo>(
    repo: &R,
    method: Method,
    target: Target,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            return Envelope::failure(rejection.status())
                .message(rejection.body_text())
                .send()
        }
    };

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let request = BookRequest {
        method,
        target,
        content_type,
        body,
    };

    dispatch(repo, request).await.send()
}
