//! Reassembly of split code units
//!
//! Large classes and methods are indexed as several chunks. Before results
//! leave the retrieval layer, fragments of one logical unit (same collection,
//! path, class and method) are merged back into a single hit. Chunks carrying
//! neither a class nor a method name are module-level text and never grouped.

use sdk::types::SearchHit;
use std::collections::HashMap;

type GroupKey = (String, String, Option<String>, Option<String>);

fn group_key(hit: &SearchHit) -> Option<GroupKey> {
    let meta = &hit.metadata;
    if meta.class_name.is_none() && meta.method_name.is_none() {
        return None;
    }
    Some((
        hit.collection.clone(),
        meta.path.clone(),
        meta.class_name.clone(),
        meta.method_name.clone(),
    ))
}

/// Merge fragments of the same code unit.
///
/// Output keeps the position of each group's first occurrence. Merging a
/// merged list changes nothing.
pub fn reconstruct(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut groups: Vec<Vec<SearchHit>> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for hit in hits {
        match group_key(&hit) {
            Some(key) => match index.get(&key) {
                Some(&slot) => groups[slot].push(hit),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![hit]);
                }
            },
            None => groups.push(vec![hit]),
        }
    }

    groups.into_iter().filter_map(merge_group).collect()
}

fn merge_group(mut members: Vec<SearchHit>) -> Option<SearchHit> {
    if members.len() <= 1 {
        return members.pop();
    }

    members.sort_by_key(|h| (h.metadata.start_line, h.metadata.end_line));
    members.dedup_by(|a, b| a.chunk_id == b.chunk_id);
    if members.len() == 1 {
        return members.pop();
    }

    let text = members
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let start_line = members.iter().map(|h| h.metadata.start_line).min();
    let end_line = members.iter().map(|h| h.metadata.end_line).max();
    let score = members.iter().map(|h| h.score).fold(f64::MIN, f64::max);
    let distance = members
        .iter()
        .filter_map(|h| h.distance)
        .reduce(f64::min);

    let mut merged = members.into_iter().next()?;
    merged.text = text;
    merged.score = score;
    merged.distance = distance;
    merged.metadata.start_line = start_line.unwrap_or(merged.metadata.start_line);
    merged.metadata.end_line = end_line.unwrap_or(merged.metadata.end_line);
    // The stored hash described one fragment, not the merged text
    merged.metadata.content_hash = None;

    Some(merged)
}
