//! Turns a book request into exactly one response envelope.
//!
//! A request is classified from its target (collection, item, or something else) and
//! its method. Each operation validates its input before touching storage, and every
//! failure becomes an [`ApiError`] that is converted to an envelope in one place.

use std::collections::HashMap;
use std::error::Error;

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use tracing::{error, info};

use crate::models::{Book, BookInput, BookList, ValidationError};
use crate::repo::BookRepo;
use crate::response::Envelope;

/// Query parameter that names a book when the collection path is used.
pub const ID_QUERY_PARAM: &str = "bookid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Collection,
    /// Raw identifier as it appeared in the request, not yet validated
    Item(String),
    Unknown,
}

impl Target {
    /// `/books` with no query, or with `bookid` as its only parameter.
    pub fn for_collection(query: &HashMap<String, String>) -> Self {
        match query.len() {
            0 => Target::Collection,
            1 => match query.get(ID_QUERY_PARAM) {
                Some(id) => Target::Item(id.clone()),
                None => Target::Unknown,
            },
            _ => Target::Unknown,
        }
    }

    /// `/books/{id}`, which accepts no query parameters.
    pub fn for_item(id: String, query: &HashMap<String, String>) -> Self {
        if query.is_empty() {
            Target::Item(id)
        } else {
            Target::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchOne(i32),
    Delete(i32),
    Update(i32),
    FetchAll,
    Create,
}

impl Operation {
    /// The identifier is validated before the method is looked at.
    pub fn classify(method: &Method, target: &Target) -> Result<Self, ApiError> {
        match target {
            Target::Unknown => Err(ApiError::EndpointNotFound),
            Target::Item(raw_id) => {
                let id = parse_book_id(raw_id)?;
                match *method {
                    Method::GET => Ok(Operation::FetchOne(id)),
                    Method::DELETE => Ok(Operation::Delete(id)),
                    Method::PATCH => Ok(Operation::Update(id)),
                    _ => Err(ApiError::MethodNotAllowed),
                }
            }
            Target::Collection => match *method {
                Method::GET => Ok(Operation::FetchAll),
                Method::POST => Ok(Operation::Create),
                _ => Err(ApiError::MethodNotAllowed),
            },
        }
    }
}

fn parse_book_id(id: &str) -> Result<i32, ApiError> {
    id.parse::<i32>().map_err(|_| {
        ApiError::bad_request("Book ID cannot be blank or must be numeric")
    })
}

/// A request as delivered by the transport.
#[derive(Debug, Clone)]
pub struct BookRequest {
    pub method: Method,
    pub target: Target,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {}", .0.join(", "))]
    BadRequest(Vec<String>),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("endpoint not found")]
    EndpointNotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    /// Storage failed; only `message` is shown to the client
    #[error("{message}: {source}")]
    Storage {
        message: &'static str,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The request was well formed but the server could not complete it
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(vec![message.into()])
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::bad_request(error.to_string())
    }
}

impl From<ApiError> for Envelope {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::BadRequest(messages) => {
                Envelope::failure(StatusCode::BAD_REQUEST).messages(messages)
            }
            ApiError::NotFound(message) => {
                Envelope::failure(StatusCode::NOT_FOUND).message(message)
            }
            ApiError::EndpointNotFound => {
                Envelope::failure(StatusCode::NOT_FOUND).message("Endpoint not found")
            }
            ApiError::MethodNotAllowed => {
                Envelope::failure(StatusCode::METHOD_NOT_ALLOWED)
                    .message("Request method not allowed")
            }
            ApiError::Storage { message, source } => {
                error!(error = %source, "Database query error: {message}");
                Envelope::failure(StatusCode::INTERNAL_SERVER_ERROR).message(message)
            }
            ApiError::Internal(message) => {
                error!("{message}");
                Envelope::failure(StatusCode::INTERNAL_SERVER_ERROR).message(message)
            }
        }
    }
}

/// Wraps a storage error with the message the client will see.
fn storage_error<E>(message: &'static str) -> impl FnOnce(E) -> ApiError
where
    E: Error + Send + Sync + 'static,
{
    move |source| ApiError::Storage {
        message,
        source: Box::new(source),
    }
}

pub async fn dispatch<R: BookRepo>(repo: &R, request: BookRequest) -> Envelope {
    let result = match Operation::classify(&request.method, &request.target) {
        Ok(Operation::FetchOne(id)) => fetch_book(repo, id).await,
        Ok(Operation::Delete(id)) => delete_book(repo, id).await,
        Ok(Operation::Update(id)) => update_book(repo, id, &request).await,
        Ok(Operation::FetchAll) => list_books(repo).await,
        Ok(Operation::Create) => create_book(repo, &request).await,
        Err(e) => Err(e),
    };

    result.unwrap_or_else(Envelope::from)
}

async fn fetch_book<R: BookRepo>(repo: &R, id: i32) -> Result<Envelope, ApiError> {
    let book = repo
        .find_book(id)
        .await
        .map_err(storage_error("Failed to get book"))?;

    match book {
        Some(book) => {
            info!("Retrieved book from DB: {:?}", book);
            Ok(Envelope::ok(StatusCode::OK).data(&BookList::from_books([&book])))
        }
        None => {
            info!("No book found in DB with ID: {}", id);
            Err(ApiError::NotFound("Book not found"))
        }
    }
}

async fn list_books<R: BookRepo>(repo: &R) -> Result<Envelope, ApiError> {
    let books = repo
        .list_books()
        .await
        .map_err(storage_error("Failed to get books"))?;

    info!("Retrieved {} books from the DB", books.len());

    Ok(Envelope::ok(StatusCode::OK).data(&BookList::from_books(&books)))
}

async fn create_book<R: BookRepo>(repo: &R, request: &BookRequest) -> Result<Envelope, ApiError> {
    let input = decode_body(request, "Content type header is not set to JSON")?;

    let missing = input.missing_fields();
    let (Some(isbn), Some(name), Some(author)) = (input.isbn, input.name, input.author) else {
        return Err(ApiError::BadRequest(missing));
    };

    let book = Book::new(None, isbn, name, author)?;

    let id = repo
        .insert_book(book)
        .await
        .map_err(storage_error("Failed to insert book into database"))?;

    let created = repo
        .find_book(id)
        .await
        .map_err(storage_error("Failed to retrieve book after creation"))?
        .ok_or(ApiError::Internal("Failed to retrieve book after creation"))?;

    info!("Inserted book into the DB: {:?}", created);

    Ok(Envelope::ok(StatusCode::CREATED)
        .message("Book created")
        .data(&BookList::from_books([&created])))
}

async fn update_book<R: BookRepo>(
    repo: &R,
    id: i32,
    request: &BookRequest,
) -> Result<Envelope, ApiError> {
    let changes = decode_body(request, "Content type header not set to JSON")?;
    if changes.is_empty() {
        return Err(ApiError::bad_request("No book fields provided"));
    }

    let Some(mut book) = repo
        .find_book(id)
        .await
        .map_err(storage_error("Failed to update book"))?
    else {
        info!("Tried to update non-existent book with ID: {}", id);
        return Err(ApiError::NotFound("No book found to update"));
    };

    book.apply(&changes)?;

    let updated_rows = repo
        .update_book(id, changes)
        .await
        .map_err(storage_error("Failed to update book"))?;

    if updated_rows == 0 {
        info!("Update of book with ID {} changed no rows", id);
        return Err(ApiError::bad_request("Book not updated"));
    }

    let Some(updated) = repo
        .find_book(id)
        .await
        .map_err(storage_error("Failed to update book"))?
    else {
        return Err(ApiError::NotFound("No book found after update"));
    };

    info!("Updated book in DB: {:?}", updated);

    Ok(Envelope::ok(StatusCode::OK)
        .message("Book updated")
        .data(&BookList::from_books([&updated])))
}

async fn delete_book<R: BookRepo>(repo: &R, id: i32) -> Result<Envelope, ApiError> {
    let deleted_rows = repo
        .delete_book(id)
        .await
        .map_err(storage_error("Failed to delete book"))?;

    if deleted_rows == 0 {
        info!("Tried to delete non-existent book with ID: {}", id);
        return Err(ApiError::NotFound("Book not found"));
    }

    info!("Deleted book from DB with ID: {}", id);

    Ok(Envelope::ok(StatusCode::OK).message("Book deleted"))
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case("application/json"))
}

/// Checks the content type, then decodes the body into the typed book fields.
fn decode_body(
    request: &BookRequest,
    content_type_error: &'static str,
) -> Result<BookInput, ApiError> {
    if !is_json(request.content_type.as_deref()) {
        return Err(ApiError::bad_request(content_type_error));
    }

    let document: serde_json::Value = serde_json::from_slice(&request.body)
        .map_err(|_| ApiError::bad_request("Request body is not valid JSON"))?;

    if !document.is_object() {
        return Err(ApiError::bad_request("Request body must be a JSON object"));
    }

    serde_json::from_value(document)
        .map_err(|e| ApiError::bad_request(format!("Request body has an invalid field: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::in_memory::InMemoryBookRepo;
    use crate::response::tests::read_body;
    use serde_json::{json, Value};

    fn request(method: Method, target: Target, body: Option<Value>) -> BookRequest {
        BookRequest {
            method,
            target,
            content_type: body.as_ref().map(|_| "application/json".to_string()),
            body: body
                .map(|b| Bytes::from(b.to_string()))
                .unwrap_or_default(),
        }
    }

    fn item(id: &str) -> Target {
        Target::Item(id.to_string())
    }

    async fn run(repo: &InMemoryBookRepo, request: BookRequest) -> (StatusCode, Value) {
        read_body(dispatch(repo, request).await.send()).await
    }

    fn dune() -> InMemoryBookRepo {
        InMemoryBookRepo::new().with_book("1234567890123", "Dune", "Herbert")
    }

    #[test]
    fn classifies_by_target_and_method() {
        let cases = [
            (Method::GET, item("4"), Operation::FetchOne(4)),
            (Method::DELETE, item("4"), Operation::Delete(4)),
            (Method::PATCH, item("4"), Operation::Update(4)),
            (Method::GET, Target::Collection, Operation::FetchAll),
            (Method::POST, Target::Collection, Operation::Create),
        ];
        for (method, target, expected) in cases {
            assert_eq!(
                Some(expected),
                Operation::classify(&method, &target).ok(),
                "{method} {target:?}"
            );
        }

        assert!(matches!(
            Operation::classify(&Method::PUT, &item("4")),
            Err(ApiError::MethodNotAllowed)
        ));
        assert!(matches!(
            Operation::classify(&Method::DELETE, &Target::Collection),
            Err(ApiError::MethodNotAllowed)
        ));
        assert!(matches!(
            Operation::classify(&Method::GET, &Target::Unknown),
            Err(ApiError::EndpointNotFound)
        ));
    }

    #[test]
    fn validates_identifier_before_method() {
        for raw in ["", "abc", "1.5", "99999999999"] {
            assert!(matches!(
                Operation::classify(&Method::PUT, &item(raw)),
                Err(ApiError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn resolves_targets_from_query() {
        let empty = HashMap::new();
        let by_id = HashMap::from([(ID_QUERY_PARAM.to_string(), "3".to_string())]);
        let extra = HashMap::from([
            (ID_QUERY_PARAM.to_string(), "3".to_string()),
            ("page".to_string(), "2".to_string()),
        ]);

        assert_eq!(Target::Collection, Target::for_collection(&empty));
        assert_eq!(item("3"), Target::for_collection(&by_id));
        assert_eq!(Target::Unknown, Target::for_collection(&extra));
        assert_eq!(item("3"), Target::for_item("3".to_string(), &empty));
        assert_eq!(Target::Unknown, Target::for_item("3".to_string(), &by_id));
    }

    #[test]
    fn accepts_json_media_type_with_parameters() {
        assert!(is_json(Some("application/json")));
        assert!(is_json(Some("Application/JSON; charset=utf-8")));
        assert!(!is_json(Some("text/plain")));
        assert!(!is_json(None));
    }

    #[tokio::test]
    async fn invalid_identifier_never_reaches_storage() {
        let repo = dune();

        let (status, body) = run(&repo, request(Method::GET, item("abc"), None)).await;

        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(
            json!(["Book ID cannot be blank or must be numeric"]),
            body["messages"]
        );
        assert_eq!(0, repo.calls());
    }

    #[tokio::test]
    async fn fetches_one_book() {
        let repo = dune();

        let (status, body) = run(&repo, request(Method::GET, item("1"), None)).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(true, body["success"]);
        assert_eq!(1, body["data"]["rows_returned"]);
        assert_eq!(
            json!({"id": 1, "isbn": "1234567890123", "name": "Dune", "author": "Herbert"}),
            body["data"]["books"][0]
        );
    }

    #[tokio::test]
    async fn missing_book_is_not_found() {
        let repo = dune();

        for method in [Method::GET, Method::DELETE] {
            let (status, _) = run(&repo, request(method, item("42"), None)).await;
            assert_eq!(StatusCode::NOT_FOUND, status);
        }

        let patch = request(Method::PATCH, item("42"), Some(json!({"name": "x"})));
        let (status, body) = run(&repo, patch).await;
        assert_eq!(StatusCode::NOT_FOUND, status);
        assert_eq!(json!(["No book found to update"]), body["messages"]);
        assert_eq!(0, repo.writes());
    }

    #[tokio::test]
    async fn lists_empty_collection() {
        let repo = InMemoryBookRepo::new();

        let (status, body) = run(&repo, request(Method::GET, Target::Collection, None)).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!({"rows_returned": 0, "books": []}), body["data"]);
    }

    #[tokio::test]
    async fn creates_book() {
        let repo = InMemoryBookRepo::new();
        let input = json!({"isbn": "1234567890123", "name": "Dune", "author": "Herbert"});

        let (status, body) = run(&repo, request(Method::POST, Target::Collection, Some(input))).await;

        assert_eq!(StatusCode::CREATED, status);
        assert_eq!(json!(["Book created"]), body["messages"]);
        let created = &body["data"]["books"][0];
        assert_eq!("1234567890123", created["isbn"]);
        assert_eq!("Dune", created["name"]);
        assert_eq!("Herbert", created["author"]);
        assert!(created["id"].as_i64().unwrap() > 0);

        let id = created["id"].to_string();
        let (_, fetched) = run(&repo, request(Method::GET, item(&id), None)).await;
        assert_eq!(*created, fetched["data"]["books"][0]);
    }

    #[tokio::test]
    async fn create_reports_every_missing_field() {
        let repo = InMemoryBookRepo::new();

        let (status, body) = run(
            &repo,
            request(Method::POST, Target::Collection, Some(json!({"name": null}))),
        )
        .await;

        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(
            json!([
                "ISBN must be provided",
                "Name must be provided",
                "Author must be provided"
            ]),
            body["messages"]
        );
        assert_eq!(0, repo.len());
        assert_eq!(0, repo.calls());
    }

    #[tokio::test]
    async fn create_rejects_out_of_bounds_field() {
        let repo = InMemoryBookRepo::new();
        let input = json!({"isbn": "12345678901234", "name": "Dune", "author": "Herbert"});

        let (status, body) = run(&repo, request(Method::POST, Target::Collection, Some(input))).await;

        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(
            json!(["Book ISBN must be at most 13 characters"]),
            body["messages"]
        );
        assert_eq!(0, repo.writes());
    }

    #[tokio::test]
    async fn create_requires_json_body() {
        let repo = InMemoryBookRepo::new();
        let input = json!({"isbn": "1", "name": "Dune", "author": "Herbert"});

        let mut plain = request(Method::POST, Target::Collection, Some(input));
        plain.content_type = Some("text/plain".to_string());
        let (status, body) = run(&repo, plain).await;
        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(json!(["Content type header is not set to JSON"]), body["messages"]);

        let mut garbage = request(Method::POST, Target::Collection, Some(json!({})));
        garbage.body = Bytes::from_static(b"{not json");
        let (status, body) = run(&repo, garbage).await;
        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(json!(["Request body is not valid JSON"]), body["messages"]);

        let array = request(Method::POST, Target::Collection, Some(json!(["Dune"])));
        let (status, _) = run(&repo, array).await;
        assert_eq!(StatusCode::BAD_REQUEST, status);

        let wrong_type = request(
            Method::POST,
            Target::Collection,
            Some(json!({"isbn": 12, "name": "Dune", "author": "Herbert"})),
        );
        let (status, _) = run(&repo, wrong_type).await;
        assert_eq!(StatusCode::BAD_REQUEST, status);

        assert_eq!(0, repo.calls());
    }

    #[tokio::test]
    async fn partial_update_changes_only_supplied_fields() {
        let repo = dune();

        let patch = request(Method::PATCH, item("1"), Some(json!({"name": "Dune Messiah"})));
        let (status, body) = run(&repo, patch).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!(["Book updated"]), body["messages"]);
        assert_eq!("Dune Messiah", body["data"]["books"][0]["name"]);

        let stored = repo.stored(1).unwrap();
        assert_eq!("Dune Messiah", stored.name());
        assert_eq!("1234567890123", stored.isbn());
        assert_eq!("Herbert", stored.author());
    }

    #[tokio::test]
    async fn update_without_fields_writes_nothing() {
        let repo = dune();

        let patch = request(Method::PATCH, item("1"), Some(json!({"id": 5, "title": "x"})));
        let (status, body) = run(&repo, patch).await;

        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(json!(["No book fields provided"]), body["messages"]);
        assert_eq!(0, repo.writes());
    }

    #[tokio::test]
    async fn update_validates_supplied_fields() {
        let repo = dune();

        let patch = request(
            Method::PATCH,
            item("1"),
            Some(json!({"author": "a".repeat(51)})),
        );
        let (status, _) = run(&repo, patch).await;

        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(0, repo.writes());
        assert_eq!("Herbert", repo.stored(1).unwrap().author());
    }

    #[tokio::test]
    async fn update_with_unchanged_values_is_bad_request() {
        let repo = dune();

        let patch = request(Method::PATCH, item("1"), Some(json!({"name": "Dune"})));
        let (status, body) = run(&repo, patch).await;

        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(json!(["Book not updated"]), body["messages"]);
    }

    #[tokio::test]
    async fn deletes_book() {
        let repo = dune();

        let (status, body) = run(&repo, request(Method::DELETE, item("1"), None)).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!(["Book deleted"]), body["messages"]);
        assert!(body.get("data").is_none());
        assert_eq!(0, repo.len());
    }

    #[tokio::test]
    async fn rejected_targets_never_reach_storage() {
        let repo = dune();

        let (status, body) = run(&repo, request(Method::DELETE, Target::Collection, None)).await;
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, status);
        assert_eq!(json!(["Request method not allowed"]), body["messages"]);

        let (status, body) = run(&repo, request(Method::PUT, item("1"), None)).await;
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, status);
        assert_eq!(405, body["statusCode"]);

        let (status, body) = run(&repo, request(Method::GET, Target::Unknown, None)).await;
        assert_eq!(StatusCode::NOT_FOUND, status);
        assert_eq!(json!(["Endpoint not found"]), body["messages"]);

        assert_eq!(0, repo.calls());
    }

    #[tokio::test]
    async fn update_requires_json_content_type() {
        let repo = dune();

        let mut patch = request(Method::PATCH, item("1"), Some(json!({"name": "x"})));
        patch.content_type = None;
        let (status, body) = run(&repo, patch).await;

        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!(json!(["Content type header not set to JSON"]), body["messages"]);
        assert_eq!(0, repo.calls());
    }

    #[tokio::test]
    async fn create_fails_when_new_row_cannot_be_read_back() {
        let repo = InMemoryBookRepo::losing_inserts();
        let input = json!({"isbn": "1234567890123", "name": "Dune", "author": "Herbert"});

        let (status, body) = run(&repo, request(Method::POST, Target::Collection, Some(input))).await;

        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
        assert_eq!(false, body["success"]);
        assert_eq!(500, body["statusCode"]);
        assert_eq!(
            json!(["Failed to retrieve book after creation"]),
            body["messages"]
        );
        assert!(body.get("data").is_none());
        assert_eq!(1, repo.writes());
        assert_eq!(1, repo.reads());
    }

    #[tokio::test]
    async fn create_fails_when_nothing_is_inserted() {
        let repo = InMemoryBookRepo::rejecting_inserts();
        let input = json!({"isbn": "1234567890123", "name": "Dune", "author": "Herbert"});

        let (status, body) = run(&repo, request(Method::POST, Target::Collection, Some(input))).await;

        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
        assert_eq!(false, body["success"]);
        assert_eq!(
            json!(["Failed to insert book into database"]),
            body["messages"]
        );
        assert_eq!(0, repo.len());
        assert_eq!(0, repo.reads());
    }

    #[tokio::test]
    async fn storage_failure_is_generic_server_error() {
        let repo = InMemoryBookRepo::unavailable();

        let (status, body) = run(&repo, request(Method::GET, Target::Collection, None)).await;

        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
        assert_eq!(false, body["success"]);
        assert_eq!(json!(["Failed to get books"]), body["messages"]);
    }
}
