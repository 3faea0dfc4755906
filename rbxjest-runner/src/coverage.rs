// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Re-keying coverage data from runtime addresses to files on disk.

use crate::{helpers::normalize_separators, module_map::ModulePathMap};
use rbxjest_metadata::CoverageMap;
use serde_json::Value;
use tracing::debug;

/// Rewrites every coverage entry so that it is keyed by the absolute path of the compiled file
/// the runtime executed.
///
/// The aggregate `total` entry is kept as is. Keys that don't resolve through the map are joined
/// under the project root. Entry order is preserved.
pub fn rewrite_coverage_data(map: &ModulePathMap, coverage: CoverageMap) -> CoverageMap {
    let mut unresolved = 0usize;
    let rewritten: CoverageMap = coverage
        .into_iter()
        .map(|(key, mut entry)| {
            if key == CoverageMap::TOTAL_KEY {
                return (key, entry);
            }

            let (path, resolved) = match map.get(&key).or_else(|| map.lookup_compiled(&key)) {
                Some(module) => (module.compiled_path.clone(), true),
                None => {
                    unresolved += 1;
                    (map.project_root().join(normalize_separators(&key)), false)
                }
            };
            if let Some(fields) = entry.as_object_mut() {
                if resolved || fields.contains_key(CoverageMap::PATH_FIELD) {
                    fields.insert(
                        CoverageMap::PATH_FIELD.to_owned(),
                        Value::String(path.to_string()),
                    );
                }
            }
            (path.into_string(), entry)
        })
        .collect();

    if unresolved > 0 {
        debug!(unresolved, "coverage entries without a module mapping");
    }
    rewritten
}
