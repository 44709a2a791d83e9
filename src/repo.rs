use crate::models::{Book, BookInput};
use std::error::Error;
use std::future::Future;

/// Storage for books. Every operation is a single statement; "zero rows" is reported
/// through the return value, never as an error.
pub trait BookRepo: Clone + Send + Sync + 'static {
    type Error: Error + Send + Sync + 'static;

    fn list_books(&self) -> impl Future<Output = Result<Vec<Book>, Self::Error>> + Send;

    fn find_book(&self, id: i32) -> impl Future<Output = Result<Option<Book>, Self::Error>> + Send;

    /// Returns the id assigned to the new row
    fn insert_book(&self, book: Book) -> impl Future<Output = Result<i32, Self::Error>> + Send;

    /// Writes only the fields present in `changes`. Returns the number of rows changed,
    /// which is zero when the supplied values equal the stored ones.
    fn update_book(
        &self,
        id: i32,
        changes: BookInput,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// Returns the number of rows deleted
    fn delete_book(&self, id: i32) -> impl Future<Output = Result<usize, Self::Error>> + Send;
}
