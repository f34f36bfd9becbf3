use serde::{Deserialize, Serialize};

/// One step navigating from the argument tuple to a pointer or length value
/// (spec.md §3). An index selects an argument position or an array element;
/// a name selects a struct member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathElement {
    Index(usize),
    Field(String),
}

impl From<usize> for PathElement {
    fn from(i: usize) -> Self {
        PathElement::Index(i)
    }
}

impl From<&str> for PathElement {
    fn from(s: &str) -> Self {
        PathElement::Field(s.to_string())
    }
}
