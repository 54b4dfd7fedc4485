//! Encoding of the stored field schema: embedding blobs and comma-joined image lists.

use std::path::Path;

use evmanual_shared::{EvManualError, ImageRef, Result};

/// Separator used when image lists are flattened into one column.
pub const LIST_SEPARATOR: &str = ", ";

/// Encode an embedding as little-endian `f32` bytes.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` blob.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(EvManualError::Storage(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Join a list into the single-column form.
pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

/// Split a comma-joined column back into items, trimming and dropping blanks.
pub fn split_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Pair stored image paths with names.
///
/// A path without a stored name falls back to its file name.
pub fn pair_image_refs(paths_column: &str, names_column: &str) -> Vec<ImageRef> {
    let names = split_list(names_column);
    split_list(paths_column)
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let name = names.get(i).cloned().unwrap_or_else(|| file_name(&path));
            ImageRef { path, name }
        })
        .collect()
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Cosine similarity; zero when either vector is zero or dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
