//! Pure functions over collections of measurements
//!
//! Used by the live pipeline and by historical summary queries. Everything
//! here is generic over `AsRef<Measurement>`, so it works on owned
//! measurements as well as the `Arc<Measurement>`s shared by broadcasts.

use std::fmt;

use serde::Serialize;

use super::Measurement;

/// Errors from aggregate computations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateError {
    /// The input slice was empty
    Empty,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::Empty => write!(f, "cannot aggregate an empty set of measurements"),
        }
    }
}

impl std::error::Error for AggregateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Aggregate view of a set of measurements
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub warning_count: usize,
    pub critical_count: usize,
}

pub fn average<M: AsRef<Measurement>>(items: &[M]) -> Result<f64, AggregateError> {
    if items.is_empty() {
        return Err(AggregateError::Empty);
    }

    let sum: f64 = items
        .iter()
        .map(|m| m.as_ref().value().magnitude())
        .sum();

    Ok(sum / items.len() as f64)
}

/// Measurement with the smallest magnitude (first one wins on ties)
pub fn min<M: AsRef<Measurement>>(items: &[M]) -> Result<&M, AggregateError> {
    items
        .iter()
        .reduce(|best, m| {
            if m.as_ref().value().magnitude() < best.as_ref().value().magnitude() {
                m
            } else {
                best
            }
        })
        .ok_or(AggregateError::Empty)
}

/// Measurement with the largest magnitude (first one wins on ties)
pub fn max<M: AsRef<Measurement>>(items: &[M]) -> Result<&M, AggregateError> {
    items
        .iter()
        .reduce(|best, m| {
            if m.as_ref().value().magnitude() > best.as_ref().value().magnitude() {
                m
            } else {
                best
            }
        })
        .ok_or(AggregateError::Empty)
}

/// Stable sort by collection timestamp
pub fn sort_by_time<M: AsRef<Measurement> + Clone>(items: &[M], order: SortOrder) -> Vec<M> {
    let mut sorted = items.to_vec();
    match order {
        SortOrder::Ascending => {
            sorted.sort_by_key(|m| m.as_ref().timestamp());
        }
        SortOrder::Descending => {
            sorted.sort_by(|a, b| b.as_ref().timestamp().cmp(&a.as_ref().timestamp()));
        }
    }
    sorted
}

pub fn find_critical<M: AsRef<Measurement> + Clone>(items: &[M]) -> Vec<M> {
    items
        .iter()
        .filter(|m| m.as_ref().is_critical())
        .cloned()
        .collect()
}

pub fn find_warning<M: AsRef<Measurement> + Clone>(items: &[M]) -> Vec<M> {
    items
        .iter()
        .filter(|m| m.as_ref().is_warning())
        .cloned()
        .collect()
}

pub fn summarize<M: AsRef<Measurement>>(items: &[M]) -> Result<Summary, AggregateError> {
    Ok(Summary {
        count: items.len(),
        min: min(items)?.as_ref().value().magnitude(),
        max: max(items)?.as_ref().value().magnitude(),
        average: average(items)?,
        warning_count: items.iter().filter(|m| m.as_ref().is_warning()).count(),
        critical_count: items.iter().filter(|m| m.as_ref().is_critical()).count(),
    })
}
