use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde_json::{json, Value};
use warp::http::StatusCode;

/// Error carried from the store and handlers up to the rejection handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub code: u16,
    pub info: Option<String>,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl Error {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Body sent to the client. Field errors take precedence over the detail message.
    pub fn body(&self) -> Value {
        if !self.fields.is_empty() {
            return json!(self.fields);
        }

        match (&self.info, self.code) {
            (_, 500) => json!({ "detail": "A server error occurred." }),
            (Some(info), _) => json!({ "detail": info }),
            (None, _) => json!({ "detail": HtmlError::from_code(self.code).message() }),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.code >= 500
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.info {
            Some(info) => write!(f, "{} ({})", self.code, info)?,
            None => write!(f, "{}", self.code)?,
        }
        for (field, messages) in &self.fields {
            write!(f, " {field}: {}", messages.join(" "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl warp::reject::Reject for Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlError {
    InvalidRequest,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl HtmlError {
    pub fn code(self) -> u16 {
        match self {
            HtmlError::InvalidRequest => 400,
            HtmlError::Unauthorized => 401,
            HtmlError::NotFound => 404,
            HtmlError::MethodNotAllowed => 405,
            HtmlError::InternalServerError => 500,
        }
    }

    fn from_code(code: u16) -> Self {
        match code {
            400 => HtmlError::InvalidRequest,
            401 => HtmlError::Unauthorized,
            404 => HtmlError::NotFound,
            405 => HtmlError::MethodNotAllowed,
            _ => HtmlError::InternalServerError,
        }
    }

    fn message(self) -> &'static str {
        match self {
            HtmlError::InvalidRequest => "Invalid request.",
            HtmlError::Unauthorized => "Authentication credentials were not provided.",
            HtmlError::NotFound => "Not found.",
            HtmlError::MethodNotAllowed => "Method not allowed.",
            HtmlError::InternalServerError => "A server error occurred.",
        }
    }

    pub fn new(self, info: &str) -> Error {
        Error {
            code: self.code(),
            info: Some(info.to_string()),
            fields: BTreeMap::new(),
        }
    }

    pub fn default(self) -> Error {
        Error {
            code: self.code(),
            info: None,
            fields: BTreeMap::new(),
        }
    }
}

/// Wraps a `sqlx::Error` so the underlying cause is kept for logging.
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(e),
            sqlx::Error::RowNotFound => Self::new(String::from("RowNotFound")),
            sqlx::Error::ColumnNotFound(e) => Self::new(e),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        HtmlError::InternalServerError.new(&value.info)
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

/// Per-field validation messages, collected before any write happens.
#[derive(Debug, Default)]
pub struct FieldErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn finish(self) -> Result<(), Error> {
        if self.is_empty() {
            return Ok(());
        }
        Err(self.into())
    }
}

impl From<FieldErrors> for Error {
    fn from(value: FieldErrors) -> Self {
        Error {
            code: HtmlError::InvalidRequest.code(),
            info: None,
            fields: value.fields,
        }
    }
}

/// Shorthand for a single-field validation error.
pub fn field_error(field: &str, message: &str) -> Error {
    let mut errors = FieldErrors::new();
    errors.add(field, message);
    errors.into()
}
