//! Selector and option evaluation for in-memory document filtering.
//!
//! Selectors use the MongoDB query shape, restricted to the operators below:
//!
//! - implicit equality `{ field: value }`, which also matches arrays containing `value`
//! - dotted paths `{ "a.b.0": value }` into nested documents and arrays
//! - comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`
//! - logical, at any level: `$and`, `$or`, `$nor`
//!
//! Options understood by [`DocumentEvaluator::apply_options`] are `sort`, `skip` and
//! `limit`; any other option key is ignored.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime};

use docmap_core::error::{DocMapError, DocMapResult};

const COMPARISON_OPERATORS: [&str; 9] = ["$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$exists"];

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64. Values of different kinds order by kind,
/// following the MongoDB comparison order.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null or missing value
    Null,
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Binary value, including UUIDs
    Binary(&'a [u8]),
    /// ObjectId value
    ObjectId([u8; 12]),
    /// Boolean value
    Bool(bool),
    /// DateTime value
    DateTime(DateTime),
    /// Any other value; never equal to anything
    Other,
}

impl<'a> Comparable<'a> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Binary(_) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
            Comparable::Other => 9,
        }
    }

    /// Total order used for sorting: by kind first, then by value.
    ///
    /// Numbers use [`f64::total_cmp`], so `NaN` sorts after every other number.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            _ => self
                .partial_cmp(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(binary) => Comparable::Binary(&binary.bytes),
            Bson::ObjectId(oid) => Comparable::ObjectId(oid.bytes()),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Other,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Binary(a), Comparable::Binary(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::Binary(a), Comparable::Binary(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Looks up a dotted path in a document.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(doc)
            if !doc.is_empty() && doc.keys().all(|key| COMPARISON_OPERATORS.contains(&key.as_str())) =>
        {
            Some(doc)
        }
        _ => None,
    }
}

fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    let target = Comparable::from(target);

    match value {
        None => target == Comparable::Null,
        Some(value) => match Comparable::from(value) {
            Comparable::Array(items) => {
                items.iter().any(|item| item == &target) || Comparable::Array(items) == target
            }
            value => value == target,
        },
    }
}

fn compares(value: Option<&Bson>, target: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let target = Comparable::from(target);

    match Comparable::from(value) {
        Comparable::Array(items) => items
            .iter()
            .any(|item| item.partial_cmp(&target).is_some_and(accept)),
        value => value.partial_cmp(&target).is_some_and(accept),
    }
}

fn operand_array<'b>(operator: &str, operand: &'b Bson) -> DocMapResult<&'b Vec<Bson>> {
    operand
        .as_array()
        .ok_or_else(|| DocMapError::InvalidDocument(format!("{} needs an array, got {}", operator, operand)))
}

/// Evaluates selectors and options against stored documents.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document matches every entry of the selector.
    pub fn matches(&self, selector: &Document) -> DocMapResult<bool> {
        for (key, condition) in selector {
            let matched = match key.as_str() {
                "$and" => self.all_match(operand_array(key, condition)?)?,
                "$or" => self.any_match(operand_array(key, condition)?)?,
                "$nor" => !self.any_match(operand_array(key, condition)?)?,
                operator if operator.starts_with('$') => {
                    return Err(DocMapError::InvalidDocument(format!("unsupported operator {}", operator)));
                }
                path => self.matches_condition(lookup(self.document, path), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn all_match(&self, selectors: &[Bson]) -> DocMapResult<bool> {
        for selector in selectors {
            if !self.matches(Self::as_selector(selector)?)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any_match(&self, selectors: &[Bson]) -> DocMapResult<bool> {
        for selector in selectors {
            if self.matches(Self::as_selector(selector)?)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn as_selector(selector: &Bson) -> DocMapResult<&Document> {
        selector
            .as_document()
            .ok_or_else(|| DocMapError::InvalidDocument(format!("expected a selector, got {}", selector)))
    }

    fn matches_condition(&self, value: Option<&Bson>, condition: &Bson) -> DocMapResult<bool> {
        let Some(operators) = is_operator_document(condition) else {
            return Ok(equals(value, condition));
        };

        for (operator, operand) in operators {
            let matched = match operator.as_str() {
                "$eq" => equals(value, operand),
                "$ne" => !equals(value, operand),
                "$gt" => compares(value, operand, Ordering::is_gt),
                "$gte" => compares(value, operand, Ordering::is_ge),
                "$lt" => compares(value, operand, Ordering::is_lt),
                "$lte" => compares(value, operand, Ordering::is_le),
                "$in" => operand_array(operator, operand)?
                    .iter()
                    .any(|candidate| equals(value, candidate)),
                "$nin" => !operand_array(operator, operand)?
                    .iter()
                    .any(|candidate| equals(value, candidate)),
                "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
                _ => false,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Filters documents by a selector.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        selector: &Document,
    ) -> DocMapResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).matches(selector)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    /// Applies the `sort`, `skip` and `limit` options to a result set, in that order.
    pub fn apply_options(mut documents: Vec<Document>, options: &Document) -> DocMapResult<Vec<Document>> {
        if let Some(spec) = options.get("sort") {
            let keys = sort_keys(spec)?;

            documents.sort_by(|a, b| {
                keys.iter()
                    .map(|(field, ascending)| {
                        let left = lookup(a, field).map(Comparable::from).unwrap_or(Comparable::Null);
                        let right = lookup(b, field).map(Comparable::from).unwrap_or(Comparable::Null);
                        let ordering = left.sort_cmp(&right);

                        if *ascending { ordering } else { ordering.reverse() }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        let skip = count_option(options, "skip")?.unwrap_or(0);
        let limit = count_option(options, "limit")?
            .filter(|limit| *limit > 0)
            .unwrap_or(usize::MAX);

        Ok(
            documents
                .into_iter()
                .skip(skip)
                .take(limit)
                .collect()
        )
    }
}

/// Parses a sort specification: a `{ field: direction }` document or an array of
/// `[field, direction]` pairs.
fn sort_keys(spec: &Bson) -> DocMapResult<Vec<(String, bool)>> {
    let invalid = || DocMapError::InvalidDocument(format!("invalid sort specification {}", spec));

    match spec {
        Bson::Document(doc) => doc
            .iter()
            .map(|(field, direction)| Ok((field.clone(), ascending(direction).ok_or_else(invalid)?)))
            .collect(),
        Bson::Array(pairs) => pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([Bson::String(field), direction]) => {
                    Ok((field.clone(), ascending(direction).ok_or_else(invalid)?))
                }
                Some([Bson::String(field)]) => Ok((field.clone(), true)),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

fn ascending(direction: &Bson) -> Option<bool> {
    match direction {
        Bson::Int32(1) | Bson::Int64(1) => Some(true),
        Bson::Int32(-1) | Bson::Int64(-1) => Some(false),
        Bson::Double(value) if *value == 1.0 => Some(true),
        Bson::Double(value) if *value == -1.0 => Some(false),
        Bson::String(value) => match value.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(true),
            "desc" | "descending" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn count_option(options: &Document, key: &str) -> DocMapResult<Option<usize>> {
    let Some(value) = options.get(key) else {
        return Ok(None);
    };

    let count = match value {
        Bson::Int32(value) => *value as i64,
        Bson::Int64(value) => *value,
        Bson::Double(value) if value.fract() == 0.0 => *value as i64,
        _ => return Err(DocMapError::InvalidDocument(format!("invalid {} option {}", key, value))),
    };

    usize::try_from(count)
        .map(Some)
        .map_err(|_| DocMapError::InvalidDocument(format!("negative {} option {}", key, count)))
}
