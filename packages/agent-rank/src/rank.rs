use std::collections::HashMap;

use crate::types::RankedEntry;

/// Sorted snapshot of a finished tally: count descending, ties broken by
/// agent name ascending so equal counts order deterministically. Pure;
/// truncation to a top-K is the caller's policy.
pub fn rank(counts: &HashMap<String, u64>) -> Vec<RankedEntry> {
    let mut entries: Vec<RankedEntry> = counts
        .iter()
        .map(|(agent_name, &count)| RankedEntry {
            agent_name: agent_name.clone(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.agent_name.cmp(&b.agent_name))
    });
    entries
}
