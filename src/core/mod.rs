pub mod error;
pub mod ident;
pub mod types;
pub mod value;

pub use error::{ArchiveError, Result};
pub use ident::validate_identifier;
pub use types::{Column, EntityType, ForeignKey, Key, Row, Schema};
pub use value::{DataType, Value};
