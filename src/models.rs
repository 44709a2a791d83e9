use serde::{Deserialize, Serialize};

pub const MAX_ISBN_LEN: usize = 13;
pub const MAX_NAME_LEN: usize = 180;
pub const MAX_AUTHOR_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Book ID must be a positive number")]
    InvalidId,
    #[error("Book ID has already been set")]
    IdAlreadySet,
    #[error("Book ISBN must be at most 13 characters")]
    Isbn,
    #[error("Book name must be at most 180 characters")]
    Name,
    #[error("Book author must be at most 50 characters")]
    Author,
}

/// A catalog record whose fields are always within bounds.
///
/// `id` is `None` until the book has been persisted, and can only be assigned once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    id: Option<i32>,
    isbn: String,
    name: String,
    author: String,
}

impl Book {
    /// Fields are checked in order: id, isbn, name, author. The first failure is returned.
    pub fn new(
        id: Option<i32>,
        isbn: impl Into<String>,
        name: impl Into<String>,
        author: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if let Some(id) = id {
            check_id(id)?;
        }

        Ok(Book {
            id,
            isbn: check_length(isbn.into(), MAX_ISBN_LEN, ValidationError::Isbn)?,
            name: check_length(name.into(), MAX_NAME_LEN, ValidationError::Name)?,
            author: check_length(author.into(), MAX_AUTHOR_LEN, ValidationError::Author)?,
        })
    }

    pub fn id(&self) -> Option<i32> {
        self.id
    }

    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn set_id(&mut self, id: i32) -> Result<(), ValidationError> {
        if self.id.is_some() {
            return Err(ValidationError::IdAlreadySet);
        }
        self.id = Some(check_id(id)?);
        Ok(())
    }

    pub fn set_isbn(&mut self, isbn: impl Into<String>) -> Result<(), ValidationError> {
        self.isbn = check_length(isbn.into(), MAX_ISBN_LEN, ValidationError::Isbn)?;
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ValidationError> {
        self.name = check_length(name.into(), MAX_NAME_LEN, ValidationError::Name)?;
        Ok(())
    }

    pub fn set_author(&mut self, author: impl Into<String>) -> Result<(), ValidationError> {
        self.author = check_length(author.into(), MAX_AUTHOR_LEN, ValidationError::Author)?;
        Ok(())
    }

    /// Applies every supplied field through its setter. Stops at the first invalid one,
    /// leaving earlier fields already applied.
    pub fn apply(&mut self, changes: &BookInput) -> Result<(), ValidationError> {
        if let Some(isbn) = &changes.isbn {
            self.set_isbn(isbn.as_str())?;
        }
        if let Some(name) = &changes.name {
            self.set_name(name.as_str())?;
        }
        if let Some(author) = &changes.author {
            self.set_author(author.as_str())?;
        }
        Ok(())
    }

    pub fn to_record(&self) -> BookRecord {
        BookRecord {
            id: self.id,
            isbn: self.isbn.clone(),
            name: self.name.clone(),
            author: self.author.clone(),
        }
    }
}

fn check_id(id: i32) -> Result<i32, ValidationError> {
    if id <= 0 {
        return Err(ValidationError::InvalidId);
    }
    Ok(id)
}

fn check_length(
    value: String,
    max: usize,
    error: ValidationError,
) -> Result<String, ValidationError> {
    if value.chars().count() > max {
        return Err(error);
    }
    Ok(value)
}

/// Book fields as sent by a client. Absent and `null` fields are both `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookInput {
    pub isbn: Option<String>,
    pub name: Option<String>,
    pub author: Option<String>,
}

impl BookInput {
    pub fn is_empty(&self) -> bool {
        self.isbn.is_none() && self.name.is_none() && self.author.is_none()
    }

    /// One message per absent field, in isbn, name, author order.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.isbn.is_none() {
            missing.push("ISBN must be provided".to_string());
        }
        if self.name.is_none() {
            missing.push("Name must be provided".to_string());
        }
        if self.author.is_none() {
            missing.push("Author must be provided".to_string());
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: Option<i32>,
    pub isbn: String,
    pub name: String,
    pub author: String,
}

/// The `data` payload of every response that carries books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookList {
    pub rows_returned: usize,
    pub books: Vec<BookRecord>,
}

impl BookList {
    pub fn from_books<'a>(books: impl IntoIterator<Item = &'a Book>) -> Self {
        let books: Vec<BookRecord> = books.into_iter().map(Book::to_record).collect();
        BookList {
            rows_returned: books.len(),
            books,
        }
    }
}
