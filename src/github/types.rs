use serde::{Deserialize, Serialize};

/// One entry of a GraphQL `errors` array.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct ErrorEntry {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorEntry {
    pub fn new(kind: Option<&str>, message: Option<&str>) -> Self {
        Self {
            kind: kind.map(str::to_string),
            message: message.map(str::to_string),
        }
    }
}

/// A GraphQL response body: `{ data, errors? }`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
}

impl<T> GraphQlResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn errors(errors: Vec<ErrorEntry>) -> Self {
        Self { data: None, errors }
    }
}

/// Error body GitHub returns on non-2xx responses, e.g. `{"message": "Bad credentials"}`.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}
