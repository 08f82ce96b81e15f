//! Boundary code generation.
//!
//! Codes are derived from the parent's code, a per-parent ordinal and the
//! element name. Ordinals follow discovery order, so the same sheet always
//! yields the same codes but reordering rows can change them.

use crate::hierarchy::ChildParentMap;
use crate::metrics_defs::BOUNDARY_CODES_GENERATED;
use crate::types::ElementKey;
use indexmap::{IndexMap, IndexSet};
use shared::counter;
use std::collections::HashMap;

/// Generated (or seeded) code for every element seen in a run.
pub type ElementCodes = IndexMap<ElementKey, String>;

/// Next ordinal per parent code.
pub type CountMap = HashMap<String, u32>;

/// `UPPER(parent)_NN_UPPER(name)`. Sequences of 100 and up are not padded.
pub fn generate_element_code(sequence: u32, parent_code: &str, element_name: &str) -> String {
    format!(
        "{}_{:02}_{}",
        parent_code.to_uppercase(),
        sequence,
        element_name.to_uppercase()
    )
    .trim()
    .to_string()
}

/// Strips a parent's own `_NN_NAME` suffix so that child codes stay rooted
/// at the grandparent's segment.
pub fn parent_stem(parent_code: &str, parent_name: &str) -> String {
    let name_suffix = format!("_{}", parent_name.trim().to_uppercase());
    if let Some(rest) = parent_code.strip_suffix(name_suffix.as_str()) {
        return strip_ordinal(rest).to_string();
    }

    // Seeded codes need not follow our own naming scheme.
    match parent_code.rfind('_') {
        Some(idx) => parent_code[..idx].to_string(),
        None => parent_code.to_string(),
    }
}

fn strip_ordinal(code: &str) -> &str {
    match code.rfind('_') {
        Some(idx)
            if idx + 1 < code.len() && code[idx + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &code[..idx]
        }
        _ => code,
    }
}

/// Code for an element whose parent cannot be resolved. Distinct elements
/// sharing their first two characters get the same code.
pub fn fallback_code(hierarchy_type: &str, element_name: &str) -> String {
    let prefix: String = element_name.chars().take(2).collect();
    format!("{}_{}", hierarchy_type, prefix).to_uppercase()
}

/// Distinct elements per column, in order of first appearance.
pub fn column_elements<R: AsRef<[ElementKey]>>(rows: &[R]) -> Vec<IndexSet<ElementKey>> {
    let mut columns: Vec<IndexSet<ElementKey>> = Vec::new();
    for row in rows {
        for (idx, element) in row.as_ref().iter().enumerate() {
            if columns.len() <= idx {
                columns.resize_with(idx + 1, IndexSet::new);
            }
            columns[idx].insert(element.clone());
        }
    }
    columns
}

/// Records a code that already exists in the registry. Its parent's ordinal
/// counter is advanced so new siblings do not reuse the ordinal.
pub fn seed_code(
    element: ElementKey,
    code: String,
    child_parent: &ChildParentMap,
    codes: &mut ElementCodes,
    counts: &mut CountMap,
) {
    if codes.contains_key(&element) {
        return;
    }
    if let Some(parent_code) = child_parent
        .parent_of(&element)
        .and_then(|parent| codes.get(parent))
    {
        *counts.entry(parent_code.clone()).or_default() += 1;
    }
    codes.insert(element, code);
}

/// Assigns a code to every element that does not have one yet, column by
/// column from the root level down. Returns the number of codes generated.
pub fn assign_codes(
    columns: &[IndexSet<ElementKey>],
    child_parent: &ChildParentMap,
    codes: &mut ElementCodes,
    counts: &mut CountMap,
    hierarchy_type: &str,
) -> usize {
    let mut generated = 0;

    for element in columns.iter().flatten() {
        if codes.contains_key(element) {
            continue;
        }

        let parent = child_parent.parent_of(element);
        let parent_code = parent.and_then(|p| codes.get(p)).cloned();

        let code = match (parent, parent_code) {
            (Some(parent), Some(parent_code)) => {
                let counter = counts.entry(parent_code.clone()).or_default();
                *counter += 1;
                let sequence = *counter;

                let prefix = match child_parent.parent_of(parent) {
                    Some(_) => parent_stem(&parent_code, &parent.value),
                    None => parent_code,
                };
                generate_element_code(sequence, &prefix, &element.value)
            }
            _ => {
                let code = fallback_code(hierarchy_type, &element.value);
                if codes.values().any(|existing| *existing == code) {
                    tracing::warn!(
                        boundary_code = %code,
                        boundary_type = %element.key,
                        name = %element.value,
                        "fallback boundary code collides with an existing code"
                    );
                }
                code
            }
        };

        tracing::debug!(boundary_code = %code, name = %element.value, "generated boundary code");
        codes.insert(element.clone(), code);
        generated += 1;
    }

    counter!(BOUNDARY_CODES_GENERATED).increment(generated as u64);
    generated
}
