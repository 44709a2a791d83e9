use crate::config::DatabaseSettings;
use crate::models::{Book, BookInput, ValidationError};
use crate::repo::BookRepo;
use crate::schema::books;
use bb8::Pool;
use diesel::{
    BoolExpressionMethods, ExpressionMethods, NullableExpressionMethods, OptionalExtension,
    QueryDsl, SelectableHelper,
};
use diesel_async::{
    pooled_connection::AsyncDieselConnectionManager, AsyncPgConnection, RunQueryDsl,
};

pub type DBPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Connections are opened on first use, not here.
pub fn create_db_pool(settings: &DatabaseSettings) -> DBPool {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(settings.url.as_str());
    Pool::builder()
        .max_size(settings.pool_size)
        .build_unchecked(config)
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("problem getting a connection from the connection pool: {0}")]
    PoolError(#[from] bb8::RunError<diesel_async::pooled_connection::PoolError>),
    #[error("problem executing a statement against the DB: {0}")]
    ResultError(#[from] diesel::result::Error),
    #[error("stored book is invalid: {0}")]
    InvalidRow(#[from] ValidationError),
    #[error("insert statement did not create a row")]
    NothingInserted,
}

#[derive(Debug, diesel::Queryable, diesel::Selectable)]
#[diesel(table_name = books)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BookRow {
    id: i32,
    isbn: String,
    name: String,
    author: String,
}

impl TryFrom<BookRow> for Book {
    type Error = ValidationError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Book::new(Some(row.id), row.isbn, row.name, row.author)
    }
}

#[derive(diesel::Insertable)]
#[diesel(table_name = books)]
struct NewBookRow<'a> {
    isbn: &'a str,
    name: &'a str,
    author: &'a str,
}

// `None` fields are left out of the SET clause
#[derive(diesel::AsChangeset)]
#[diesel(table_name = books)]
struct BookChangeset<'a> {
    isbn: Option<&'a str>,
    name: Option<&'a str>,
    author: Option<&'a str>,
}

#[derive(Clone)]
pub struct DatabaseBookRepo {
    pool: DBPool,
}

impl DatabaseBookRepo {
    pub fn new(pool: DBPool) -> Self {
        DatabaseBookRepo { pool }
    }
}

impl BookRepo for DatabaseBookRepo {
    type Error = DatabaseError;

    async fn list_books(&self) -> Result<Vec<Book>, DatabaseError> {
        let mut conn = self.pool.get().await?;

        let rows = books::table
            .select(BookRow::as_select())
            .order(books::id)
            .load(&mut conn)
            .await?;

        let books = rows
            .into_iter()
            .map(Book::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(books)
    }

    async fn find_book(&self, id: i32) -> Result<Option<Book>, DatabaseError> {
        let mut conn = self.pool.get().await?;

        let maybe_row = books::table
            .find(id)
            .select(BookRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        let maybe_book = maybe_row.map(Book::try_from).transpose()?;

        Ok(maybe_book)
    }

    async fn insert_book(&self, book: Book) -> Result<i32, DatabaseError> {
        let mut conn = self.pool.get().await?;

        let new_row = NewBookRow {
            isbn: book.isbn(),
            name: book.name(),
            author: book.author(),
        };

        let inserted_id = diesel::insert_into(books::table)
            .values(&new_row)
            .returning(books::id)
            .get_result::<i32>(&mut conn)
            .await
            .optional()?;

        inserted_id.ok_or(DatabaseError::NothingInserted)
    }

    async fn update_book(&self, id: i32, changes: BookInput) -> Result<usize, DatabaseError> {
        if changes.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get().await?;

        let changeset = BookChangeset {
            isbn: changes.isbn.as_deref(),
            name: changes.name.as_deref(),
            author: changes.author.as_deref(),
        };

        // A comparison against an unsupplied (NULL) value is never true, so the row only
        // matches when a supplied value differs from the stored one.
        let differs = books::isbn
            .nullable()
            .ne(changes.isbn.clone())
            .or(books::name.nullable().ne(changes.name.clone()))
            .or(books::author.nullable().ne(changes.author.clone()));

        let updated_rows = diesel::update(books::table.find(id).filter(differs))
            .set(&changeset)
            .execute(&mut conn)
            .await?;

        Ok(updated_rows)
    }

    async fn delete_book(&self, id: i32) -> Result<usize, DatabaseError> {
        let mut conn = self.pool.get().await?;

        let deleted_rows = diesel::delete(books::table.find(id))
            .execute(&mut conn)
            .await?;

        Ok(deleted_rows)
    }
}
