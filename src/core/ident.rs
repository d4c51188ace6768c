use regex::Regex;
use super::{ArchiveError, Result};

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles");
}

/// Table and column names end up spliced into SQL text, so only plain
/// identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.len() > 63 || !IDENTIFIER.is_match(name) {
        return Err(ArchiveError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}
