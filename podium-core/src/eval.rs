//! Query evaluation over in-process records.
//!
//! Shared by the collaborators that keep records locally. Only the
//! structured conditions of a query can be evaluated; a query carrying an
//! AQL fragment is rejected with the server's parse error code.

use std::cmp::Ordering;

use serde_json::Value;

use crate::driver::{DISTANCE_PARAMETER, WireRecord};
use crate::error::RemoteError;
use crate::geo::{Coordinates, GeoFields};
use crate::query::Query;

/// Server code for a query that could not be parsed.
pub const ERROR_QUERY_PARSE: i64 = 1501;
/// Server code for a geo query against a collection without a geo index.
pub const ERROR_GEO_INDEX_MISSING: i64 = 1570;

fn ensure_structured(query: &Query) -> Result<(), RemoteError> {
    match query.criteria.aql_fragment() {
        Some(fragment) => Err(RemoteError::new(
            ERROR_QUERY_PARSE,
            format!("AQL fragments are not supported by this collaborator: {fragment}"),
        )),
        None => Ok(()),
    }
}

fn truncate(mut records: Vec<WireRecord>, limit: Option<usize>) -> Vec<WireRecord> {
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    records
}

pub fn filter<'a>(
    query: &Query,
    records: impl IntoIterator<Item = &'a WireRecord>,
) -> Result<Vec<WireRecord>, RemoteError> {
    ensure_structured(query)?;
    let matching = records
        .into_iter()
        .filter(|record| query.matches(record))
        .cloned()
        .collect();
    Ok(truncate(matching, query.criteria.max_results()))
}

fn ranked<'a>(
    query: &Query,
    records: impl IntoIterator<Item = &'a WireRecord>,
    geo: Option<&GeoFields>,
    point: Coordinates,
) -> Result<Vec<(f64, WireRecord)>, RemoteError> {
    ensure_structured(query)?;
    let geo = geo.ok_or_else(|| {
        RemoteError::new(
            ERROR_GEO_INDEX_MISSING,
            format!("no suitable geo index found for collection {}", query.collection),
        )
    })?;

    let mut ranked: Vec<(f64, WireRecord)> = records
        .into_iter()
        .filter(|record| query.matches(record))
        .filter_map(|record| {
            let position = geo.extract(|name| record.get(name))?;
            Some((point.distance_to(&position), record.clone()))
        })
        .collect();
    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    Ok(ranked)
}

fn with_distance(ranked: impl IntoIterator<Item = (f64, WireRecord)>) -> Vec<WireRecord> {
    ranked
        .into_iter()
        .map(|(distance, mut record)| {
            record.insert(DISTANCE_PARAMETER.to_string(), Value::from(distance));
            record
        })
        .collect()
}

pub fn near<'a>(
    query: &Query,
    records: impl IntoIterator<Item = &'a WireRecord>,
    geo: Option<&GeoFields>,
    point: Coordinates,
    limit: usize,
) -> Result<Vec<WireRecord>, RemoteError> {
    let ranked = ranked(query, records, geo, point)?;
    let limit = query.criteria.max_results().map_or(limit, |l| l.min(limit));
    Ok(with_distance(ranked.into_iter().take(limit)))
}

pub fn within<'a>(
    query: &Query,
    records: impl IntoIterator<Item = &'a WireRecord>,
    geo: Option<&GeoFields>,
    point: Coordinates,
    radius: f64,
) -> Result<Vec<WireRecord>, RemoteError> {
    let ranked = ranked(query, records, geo, point)?;
    let inside = ranked.into_iter().filter(|(distance, _)| *distance <= radius);
    Ok(truncate(with_distance(inside), query.criteria.max_results()))
}

/// Case-insensitive substring match on a string attribute.
pub fn search<'a>(
    query: &Query,
    records: impl IntoIterator<Item = &'a WireRecord>,
    field: &str,
    term: &str,
) -> Result<Vec<WireRecord>, RemoteError> {
    ensure_structured(query)?;
    let term = term.to_lowercase();
    let matching = records
        .into_iter()
        .filter(|record| query.matches(record))
        .filter(|record| {
            record
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|text| text.to_lowercase().contains(&term))
        })
        .cloned()
        .collect();
    Ok(truncate(matching, query.criteria.max_results()))
}
