//! Watched query descriptors and their validation.

use crate::error::Error;

/// Aggregate function prefixes the facility refuses to track.
const AGGREGATES: &[&str] = &["count(", "sum(", "avg(", "min(", "max("];

/// A fixed, restricted-form statement whose result set is watched.
///
/// The notification facility keys registrations on the literal statement
/// text, so the text is stored exactly as supplied and never normalized.
/// Validation is a fast engine-side path for the facility's statement
/// restrictions; the facility remains the authority and may still refuse
/// a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    text: String,
    source_table: String,
    watched_columns: Vec<String>,
}

impl QueryDescriptor {
    /// Create a descriptor, validating it against the facility's
    /// statement restrictions.
    ///
    /// Fails with [`Error::QueryRejected`] for wildcard projections, TOP,
    /// aggregates, subqueries, joins, temp tables, variables, multi-table
    /// FROM clauses, or a table name without an owner prefix.
    pub fn new(
        text: impl Into<String>,
        source_table: impl Into<String>,
        watched_columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, Error> {
        let text = text.into();
        let source_table = source_table.into();
        let watched_columns: Vec<String> =
            watched_columns.into_iter().map(Into::into).collect();

        validate(&text, &source_table, &watched_columns)?;

        Ok(Self {
            text,
            source_table,
            watched_columns,
        })
    }

    /// The literal statement text, exactly as it will be executed.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The single owner-qualified table this statement reads.
    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    /// The projected columns, in statement order.
    pub fn watched_columns(&self) -> &[String] {
        &self.watched_columns
    }
}

fn validate(text: &str, source_table: &str, watched_columns: &[String]) -> Result<(), Error> {
    let lowered = text.to_ascii_lowercase();

    if !lowered.trim_start().starts_with("select") {
        return Err(reject("statement must be a simple SELECT"));
    }
    if text.contains('*') {
        return Err(reject("wildcard projections are not notifiable"));
    }
    if lowered.contains(" top ") {
        return Err(reject("TOP is not notifiable"));
    }
    if let Some(aggregate) = AGGREGATES.iter().find(|a| lowered.contains(*a)) {
        return Err(reject(format!(
            "aggregate function {} is not notifiable",
            aggregate.trim_end_matches('(')
        )));
    }
    if select_count(&lowered) > 1 {
        return Err(reject("subqueries are not notifiable"));
    }
    if lowered.contains(" join ") {
        return Err(reject("joins are not notifiable"));
    }
    if text.contains('#') {
        return Err(reject("temp tables are not notifiable"));
    }
    if text.contains('@') {
        return Err(reject("variables are not notifiable"));
    }
    if !source_table.contains('.') {
        return Err(reject("table name must carry an owner prefix"));
    }

    let from_clause = match lowered.find(" from ") {
        Some(idx) => {
            let rest = &lowered[idx + 6..];
            match rest.find(" where ") {
                Some(w) => &rest[..w],
                None => rest,
            }
        }
        None => return Err(reject("statement has no FROM clause")),
    };
    if from_clause.contains(',') {
        return Err(reject("statements may reference exactly one table"));
    }
    if !lowered.contains(&source_table.to_ascii_lowercase()) {
        return Err(reject("statement does not reference the source table"));
    }

    if watched_columns.is_empty() {
        return Err(reject("at least one watched column is required"));
    }

    Ok(())
}

fn reject(reason: impl Into<String>) -> Error {
    Error::QueryRejected(reason.into())
}

/// Count SELECT keywords at word boundaries, so identifiers that merely
/// contain the letters (a `[Selected]` column, say) do not count.
fn select_count(lowered: &str) -> usize {
    let bytes = lowered.as_bytes();
    lowered
        .match_indices("select")
        .filter(|(idx, keyword)| {
            let before = idx.checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(idx + keyword.len()).copied();
            !before.is_some_and(is_ident_byte) && !after.is_some_and(is_ident_byte)
        })
        .count()
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
