use std::fmt;
use std::str::FromStr;

use crate::error::BootstrapError;

/// A `module:attribute` reference to the callable an archive launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    module: String,
    attribute: String,
}

impl EntryPoint {
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Dotted attribute path resolved on the imported module.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Accepts `module:attr` and also the `module.attr` spelling used by
    /// runtime overrides, splitting on the last dot.
    ///
    /// # Errors
    /// Returns [`BootstrapError::InvalidEntryPoint`] when no attribute can be
    /// separated from the module.
    pub fn parse_lenient(value: &str) -> Result<Self, BootstrapError> {
        let invalid = || BootstrapError::InvalidEntryPoint {
            value: value.to_string(),
        };
        let (module, attribute) = match value.split_once(':') {
            Some(parts) => parts,
            None => value.rsplit_once('.').ok_or_else(invalid)?,
        };
        let module = module.trim();
        let attribute = attribute.trim();
        if module.is_empty() || attribute.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            module: module.to_string(),
            attribute: attribute.to_string(),
        })
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

fn is_dotted_name(value: &str) -> bool {
    value.split('.').all(is_identifier)
}

impl FromStr for EntryPoint {
    type Err = BootstrapError;

    /// Strict form: exactly one colon with dotted identifiers on both sides.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || BootstrapError::InvalidEntryPoint {
            value: value.to_string(),
        };
        let (module, attribute) = value.split_once(':').ok_or_else(invalid)?;
        if attribute.contains(':') || !is_dotted_name(module) || !is_dotted_name(attribute) {
            return Err(invalid());
        }
        Ok(Self {
            module: module.to_string(),
            attribute: attribute.to_string(),
        })
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.attribute)
    }
}
