//! Row records returned by the watched query.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One row of the watched result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Primary key.
    pub id: i64,
    /// Name column.
    pub name: String,
    /// Age column.
    pub age: i64,
}

impl Row {
    /// Create a new row.
    pub fn new(id: i64, name: impl Into<String>, age: i64) -> Self {
        Self {
            id,
            name: name.into(),
            age,
        }
    }
}

impl fmt::Display for Row {
    /// Collaborator line format. The separators are literal single
    /// backslashes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id:{}\\Name:{}\\Age:{}", self.id, self.name, self.age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        let row = Row::new(1, "A", 1);
        assert_eq!(row.to_string(), "Id:1\\Name:A\\Age:1");
    }
}
