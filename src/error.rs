use crate::source::Location;
use std::fmt;

/// A fatal inference fault.
///
/// Inference stops at the first fault; no partial results are produced. The
/// location is the node the fault was detected at, when the parser supplied
/// one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferError {
    pub message: String,
    pub location: Option<Location>,
}

impl InferError {
    pub fn new(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(f, "{} at {location}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for InferError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_when_present() {
        let err = InferError::new("uninitialized constant Foo", Some(Location::new(3, 7)));
        assert_eq!(err.to_string(), "uninitialized constant Foo at <3:7>");
    }

    #[test]
    fn display_omits_missing_location() {
        let err = InferError::new("wrong number of arguments", None);
        assert_eq!(err.to_string(), "wrong number of arguments");
    }
}
