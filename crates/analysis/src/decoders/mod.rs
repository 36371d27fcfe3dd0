//! Concrete decoders for the provider's asynchronous analysis jobs.
//!
//! Every decoder follows the same pipeline:
//! 1. fetch all result pages (`collect_pages`);
//! 2. archive the raw pages as one JSON array;
//! 3. parse pages into provider shapes and normalize confidence/geometry;
//! 4. apply the job's confidence threshold and result cap;
//! 5. emit `DecodedResult`s stamped with the archived payload reference.

mod faces;
mod labels;
mod text;

pub use faces::FaceDetectionHandler;
pub use labels::LabelDetectionHandler;
pub use text::TextDetectionHandler;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use jobrelay_core::{JobId, JobKind, PayloadRef};

use crate::handler::DecodeError;
use crate::source::{PayloadArchive, ResultSource, collect_pages};

/// Parsed pages of one job plus the reference to their archived raw form.
struct Fetched<P> {
    pages: Vec<P>,
    raw_payload: PayloadRef,
}

fn fetch<P: DeserializeOwned>(
    source: &dyn ResultSource,
    archive: &dyn PayloadArchive,
    job_id: &JobId,
    kind: &JobKind,
) -> Result<Fetched<P>, DecodeError> {
    let bodies: Vec<JsonValue> = collect_pages(source, job_id)?
        .into_iter()
        .map(|page| page.body)
        .collect();

    // Archive before parsing so malformed payloads are still inspectable.
    let payload = JsonValue::Array(bodies);
    let raw_payload = archive.archive(job_id, kind, &payload)?;

    let pages = match payload {
        JsonValue::Array(bodies) => bodies
            .into_iter()
            .map(|body| serde_json::from_value(body).map_err(|e| DecodeError::malformed(e.to_string())))
            .collect::<Result<Vec<P>, _>>()?,
        _ => Vec::new(),
    };

    Ok(Fetched { pages, raw_payload })
}

/// Group items by media timestamp, ascending; untimed items form their own group first.
fn group_by_timestamp<T>(items: Vec<T>, timestamp: impl Fn(&T) -> Option<u64>) -> Vec<Vec<T>> {
    let mut groups: BTreeMap<Option<u64>, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(timestamp(&item)).or_default().push(item);
    }
    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_ordered_by_timestamp() {
        let items = vec![(Some(2000), "b"), (None, "x"), (Some(1000), "a"), (Some(2000), "c")];
        let groups = group_by_timestamp(items, |i| i.0);
        let names: Vec<Vec<&str>> = groups
            .into_iter()
            .map(|g| g.into_iter().map(|i| i.1).collect())
            .collect();
        assert_eq!(names, vec![vec!["x"], vec!["a"], vec!["b", "c"]]);
    }
}
