//! Per-type naming summary.
//!
//! [`PackageSummary::build`] aggregates extractor records by root type,
//! keeping only records whose root resolves to a named type. Each type's
//! occurrences are bucketed into function-local variables, parameters, and
//! receivers, keyed by `(kind, identifier, complete type)`.
//!
//! [`PackageSummary::reject_unified`] prunes types whose naming is already
//! consistent, so the prompt only carries types worth asking about.
//! Rendering is deterministic: types alphabetical, entries by descending
//! count, then identifier, then complete type.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::extract::{IdentKind, TypedIdentifier};

/// Bucket key: one spelling of one kind at one complete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SummaryKey {
    pub kind: IdentKind,
    pub identifier: String,
    pub complete_type: String,
}

impl SummaryKey {
    fn from_record(record: &TypedIdentifier) -> Self {
        SummaryKey {
            kind: record.kind,
            identifier: record.identifier.clone(),
            complete_type: record.complete_type.clone(),
        }
    }
}

/// Occurrence counts for one root type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSummary {
    /// Every record of this root type.
    pub all: HashMap<SummaryKey, u32>,
    /// `FuncVar` records only (`FuncConst` is excluded).
    pub func_vars: HashMap<SummaryKey, u32>,
    /// `FuncParam` records (inputs and named results).
    pub params: HashMap<SummaryKey, u32>,
    /// `FuncReceiver` records.
    pub receivers: HashMap<SummaryKey, u32>,
}

impl TypeSummary {
    fn add(&mut self, record: &TypedIdentifier) {
        let key = SummaryKey::from_record(record);
        *self.all.entry(key.clone()).or_insert(0) += 1;
        let bucket = match record.kind {
            IdentKind::FuncVar => &mut self.func_vars,
            IdentKind::FuncParam => &mut self.params,
            IdentKind::FuncReceiver => &mut self.receivers,
            _ => return,
        };
        *bucket.entry(key).or_insert(0) += 1;
    }

    /// Total record count across every kind.
    pub fn total(&self) -> u32 {
        self.all.values().sum()
    }

    /// Whether this type's naming is already consistent.
    ///
    /// Receivers are compared by spelling alone; function-vars and params by
    /// spelling plus complete type, and against each other when both are
    /// present. A type with neither function-vars nor params is never
    /// considered unified: its receivers or type-only uses may still be
    /// worth asking about.
    fn is_unified(&self) -> bool {
        let receiver_spellings: BTreeSet<&str> = self
            .receivers
            .keys()
            .map(|key| key.identifier.as_str())
            .collect();
        if receiver_spellings.len() > 1 {
            return false;
        }

        let var_shapes: BTreeSet<(&str, &str)> = self
            .func_vars
            .keys()
            .map(|key| (key.identifier.as_str(), key.complete_type.as_str()))
            .collect();
        if var_shapes.len() > 1 {
            return false;
        }
        let param_shapes: BTreeSet<(&str, &str)> = self
            .params
            .keys()
            .map(|key| (key.identifier.as_str(), key.complete_type.as_str()))
            .collect();
        if param_shapes.len() > 1 {
            return false;
        }

        match (var_shapes.first(), param_shapes.first()) {
            (Some(var), Some(param)) => var == param,
            (None, None) => false,
            _ => true,
        }
    }
}

/// Aggregated naming statistics for one pass over a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSummary {
    summary_per_type: BTreeMap<String, TypeSummary>,
    file_to_root_types: HashMap<String, BTreeSet<String>>,
}

impl PackageSummary {
    /// Aggregate extractor records. Records whose root is not a named type,
    /// or whose root type string is empty, are ignored.
    pub fn build(records: &[TypedIdentifier]) -> Self {
        let mut summary = PackageSummary::default();
        for record in records {
            if !record.is_named_type || record.root_type.is_empty() {
                continue;
            }
            summary
                .file_to_root_types
                .entry(record.file_name.clone())
                .or_default()
                .insert(record.root_type.clone());
            summary
                .summary_per_type
                .entry(record.root_type.clone())
                .or_default()
                .add(record);
        }
        summary
    }

    /// The summary entry for one root type.
    pub fn for_type(&self, root_type: &str) -> Option<&TypeSummary> {
        self.summary_per_type.get(root_type)
    }

    /// Root types in the summary, alphabetical.
    pub fn root_types(&self) -> impl Iterator<Item = &str> {
        self.summary_per_type.keys().map(String::as_str)
    }

    /// Root types referenced by identifiers in one file.
    pub fn root_types_for_file(&self, file_name: &str) -> Option<&BTreeSet<String>> {
        self.file_to_root_types.get(file_name)
    }

    pub fn is_empty(&self) -> bool {
        self.summary_per_type.is_empty()
    }

    /// A deep-copied projection containing only the root types used in
    /// `file_name`. Counts stay package-wide; only the set of types shown is
    /// filtered. Mutating the projection never affects the source summary,
    /// and vice versa.
    pub fn relevant_for_file(&self, file_name: &str) -> PackageSummary {
        let Some(wanted) = self.file_to_root_types.get(file_name) else {
            return PackageSummary::default();
        };
        let summary_per_type = self
            .summary_per_type
            .iter()
            .filter(|(root, _)| wanted.contains(*root))
            .map(|(root, counts)| (root.clone(), counts.clone()))
            .collect();
        let mut file_to_root_types = HashMap::new();
        file_to_root_types.insert(file_name.to_string(), wanted.clone());
        PackageSummary {
            summary_per_type,
            file_to_root_types,
        }
    }

    /// Drop types whose naming is already unified, and single-use types,
    /// which are uninformative either way.
    pub fn reject_unified(&mut self) {
        self.summary_per_type
            .retain(|_, counts| counts.total() >= 2 && !counts.is_unified());
    }
}

fn write_bucket(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    bucket: &HashMap<SummaryKey, u32>,
) -> fmt::Result {
    if bucket.is_empty() {
        return Ok(());
    }
    writeln!(f, "  {label}:")?;
    let mut entries: Vec<(&SummaryKey, &u32)> = bucket.iter().collect();
    entries.sort_by(|(ka, ca), (kb, cb)| {
        cb.cmp(ca)
            .then_with(|| ka.identifier.cmp(&kb.identifier))
            .then_with(|| ka.complete_type.cmp(&kb.complete_type))
    });
    for (key, count) in entries {
        writeln!(f, "    {}: {count} ({})", key.identifier, key.complete_type)?;
    }
    Ok(())
}

impl fmt::Display for PackageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (root_type, counts) in &self.summary_per_type {
            writeln!(f, "{root_type}:")?;
            write_bucket(f, "func vars", &counts.func_vars)?;
            write_bucket(f, "params", &counts.params)?;
            write_bucket(f, "receiver", &counts.receivers)?;
        }
        Ok(())
    }
}
