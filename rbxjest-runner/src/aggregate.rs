// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging the outputs of concurrent executions into a single result.

use crate::output::RawRunOutput;
use rbxjest_metadata::{AggregatedResult, CoverageMap, SnapshotSummary};
use serde_json::Value;

/// The merged output of every execution in a run.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedRun {
    /// The merged results.
    pub results: AggregatedResult,

    /// The first global config reported by any execution.
    pub global_config: Option<Value>,

    /// The merged coverage data, if any execution collected coverage.
    pub coverage: Option<CoverageMap>,
}

/// Merges execution outputs, given in shard order.
///
/// With no outputs, the result is empty and successful.
pub fn merge_run_outputs(outputs: Vec<RawRunOutput>) -> MergedRun {
    let mut global_config = None;
    let mut coverage: Option<CoverageMap> = None;
    let mut results = Vec::with_capacity(outputs.len());

    for output in outputs {
        if global_config.is_none() {
            global_config = output.global_config;
        }
        if let Some(shard_coverage) = output.coverage {
            let merged = coverage.get_or_insert_with(CoverageMap::new);
            for (key, entry) in shard_coverage {
                if !merged.contains_key(&key) {
                    merged.insert(key, entry);
                }
            }
        }
        results.push(output.results);
    }

    MergedRun {
        results: merge_aggregated(results),
        global_config,
        coverage,
    }
}

/// Merges aggregated results, given in shard order.
pub fn merge_aggregated(parts: Vec<AggregatedResult>) -> AggregatedResult {
    let mut parts = parts.into_iter();
    let Some(mut merged) = parts.next() else {
        return AggregatedResult::empty_success();
    };

    for part in parts {
        merged.num_failed_test_suites += part.num_failed_test_suites;
        merged.num_failed_tests += part.num_failed_tests;
        merged.num_passed_test_suites += part.num_passed_test_suites;
        merged.num_passed_tests += part.num_passed_tests;
        merged.num_pending_test_suites += part.num_pending_test_suites;
        merged.num_pending_tests += part.num_pending_tests;
        merged.num_runtime_error_test_suites += part.num_runtime_error_test_suites;
        merged.num_todo_tests += part.num_todo_tests;
        merged.num_total_test_suites += part.num_total_test_suites;
        merged.num_total_tests += part.num_total_tests;
        merge_snapshot(&mut merged.snapshot, part.snapshot);
        merged.start_time = merged.start_time.min(part.start_time);
        merged.success &= part.success;
        merged.test_results.extend(part.test_results);
        merged.was_interrupted |= part.was_interrupted;
        for (key, value) in part.extra {
            merged.extra.entry(key).or_insert(value);
        }
    }
    merged
}

/// Adds the snapshot statistics of `other` into `into`.
pub fn merge_snapshot(into: &mut SnapshotSummary, other: SnapshotSummary) {
    into.added += other.added;
    into.did_update |= other.did_update;
    into.failure |= other.failure;
    into.files_added += other.files_added;
    into.files_removed += other.files_removed;
    into.files_removed_list.extend(other.files_removed_list);
    into.files_unmatched += other.files_unmatched;
    into.files_updated += other.files_updated;
    into.matched += other.matched;
    into.total += other.total;
    into.unchecked += other.unchecked;
    into.unchecked_keys_by_file.extend(other.unchecked_keys_by_file);
    into.unmatched += other.unmatched;
    into.updated += other.updated;
}
