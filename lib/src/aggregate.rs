use std::path::Path;
use std::sync::Arc;
use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::error::{Chainable, Fault, Result};
use crate::fstree::{Entry, EntryId, FsTree};
use crate::processor::Registry;
use crate::value::{Dict, Value};

/// The entry name whose mapping overrides its siblings' keys.
pub const INDEX: &str = "index";

/// Folds the directory tree at `root` into one nested dictionary.
///
/// Every non-hidden entry contributes under its _entry name_: its file name
/// without the last extension. Entries sharing a name form a group whose
/// values are merged in file-name order; a folder resolves recursively, a
/// file through `registry`. The `index` group is merged last and must be a
/// dictionary.
pub fn aggregate<P: AsRef<Path>>(registry: &Registry, root: P) -> Result<Value> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(fault! {
            Fault::NotADirectory, "data root is not a directory",
            "path" => root.display(),
        });
    }

    let tree = FsTree::build(root)?;
    aggregate_dir(registry, &tree, tree.root_id())
}

fn aggregate_dir(registry: &Registry, tree: &FsTree, dir: EntryId) -> Result<Value> {
    let mut groups: BTreeMap<&str, Vec<&Entry>> = BTreeMap::new();
    for &child in &tree[dir].children {
        let entry = &tree[child];
        groups.entry(entry.file_stem()).or_default().push(entry);
    }

    let index = groups.remove(INDEX);
    tracing::debug!(dir = %tree[dir].path.display(), groups = groups.len(), "aggregating");

    let groups: Vec<_> = groups.into_iter().collect();
    let resolved = groups.par_iter()
        .map(|(name, members)| Ok((Arc::<str>::from(*name), resolve_group(registry, tree, members)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut dict: Dict = resolved.into_iter().collect();
    if let Some(members) = index {
        match resolve_group(registry, tree, &members)? {
            Value::Dict(props) => dict.extend(props.iter().map(|(k, v)| (k.clone(), v.clone()))),
            other => return Err(fault! {
                Fault::ConflictingMergeTarget, "index entry must be a mapping",
                "dir" => tree[dir].path.display(),
                "found" => other.kind(),
            }),
        }
    }

    Ok(Value::from(dict))
}

fn resolve_entry(registry: &Registry, tree: &FsTree, entry: &Entry) -> Result<Value> {
    match entry.is_dir() {
        true => aggregate_dir(registry, tree, entry.id),
        false => registry.dispatch(&entry.path),
    }
}

fn resolve_group(registry: &Registry, tree: &FsTree, members: &[&Entry]) -> Result<Value> {
    if let [single] = members {
        return resolve_entry(registry, tree, single);
    }

    let values = members.iter()
        .map(|entry| resolve_entry(registry, tree, entry))
        .collect::<Result<Vec<_>>>()?;

    merge_group(values).chain_with(|| error! {
        "failed to merge same-named entries",
        "entries" => members.iter()
            .map(|e| e.path.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Merges the resolved values of one group, later keys winning.
///
/// Dictionaries merge shallowly. A single non-dictionary value stands alone
/// when every other value is an empty dictionary; any other mix is a
/// [`Fault::ConflictingMergeTarget`].
pub fn merge_group(values: Vec<Value>) -> Result<Value> {
    let (dicts, others): (Vec<Value>, Vec<Value>) = values.into_iter()
        .partition(|value| value.as_dict().is_some());

    match &others[..] {
        [] => {
            let mut merged: Dict = Dict::new();
            for dict in dicts.iter().filter_map(|v| v.as_dict()) {
                merged.extend(dict.iter().map(|(k, v)| (k.clone(), v.clone())));
            }

            Ok(Value::from(merged))
        }
        [single] if dicts.iter().all(Value::is_empty_dict) => Ok(single.clone()),
        _ => Err(fault! {
            Fault::ConflictingMergeTarget, "same-named entries cannot be merged",
            "kinds" => others.iter().map(|v| v.kind()).collect::<Vec<_>>().join(", "),
        }),
    }
}
