//! Flattening of the `pdf_folders` form field.
//!
//! Clients send either a flat JSON array of folder names (one per uploaded
//! PDF, `null` meaning section root) or a nested tree where objects are
//! folders, arrays are siblings, and string leaves are labels. Both shapes
//! flatten to an ordered list of entries that are matched positionally
//! against the uploaded PDF parts.

use crate::services::media_store::{MediaError, MediaResult};
use serde_json::Value;

/// One flattened folder assignment, in submission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderEntry {
    /// Label taken from a tree leaf; `None` for the flat-array shape.
    pub label: Option<String>,
    /// Slash-joined folder path; `None` means section root.
    pub folder: Option<String>,
}

/// Flatten a `pdf_folders` value into ordered folder entries.
pub fn flatten(value: &Value) -> MediaResult<Vec<FolderEntry>> {
    // Flat shape: every element a folder name or null.
    if let Value::Array(items) = value
        && items.iter().all(|v| v.is_string() || v.is_null())
    {
        return Ok(items
            .iter()
            .map(|v| FolderEntry {
                label: None,
                folder: v.as_str().map(str::to_string),
            })
            .collect());
    }

    let mut path = Vec::new();
    let mut out = Vec::new();
    walk(value, &mut path, &mut out)?;
    Ok(out)
}

fn walk(value: &Value, path: &mut Vec<String>, out: &mut Vec<FolderEntry>) -> MediaResult<()> {
    match value {
        Value::String(label) => {
            out.push(FolderEntry {
                label: Some(label.clone()),
                folder: if path.is_empty() {
                    None
                } else {
                    Some(path.join("/"))
                },
            });
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                walk(item, path, out)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (name, subtree) in map {
                path.push(name.clone());
                walk(subtree, path, out)?;
                path.pop();
            }
            Ok(())
        }
        _ => Err(MediaError::Validation(
            "pdf_folders must contain only folder objects, arrays, and string labels".into(),
        )),
    }
}
