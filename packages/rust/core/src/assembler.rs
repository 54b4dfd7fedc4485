//! Context assembly for answer synthesis.
//!
//! [`assemble`] is pure and unbounded. [`apply_budget`] picks the chunk
//! prefix that fits the length cap and [`assemble_within`] enforces the cap
//! on the joined context.

use evmanual_shared::{Chunk, ImageRef};

/// Separator placed between chunk texts.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Joined context plus the images of every chunk that contributed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledContext {
    pub context: String,
    /// Flattened `image_refs` in chunk order, duplicates kept.
    pub images: Vec<ImageRef>,
}

/// Join chunk texts in order and collect their images.
pub fn assemble(chunks: &[Chunk]) -> AssembledContext {
    let context = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    let images = chunks
        .iter()
        .flat_map(|c| c.image_refs.iter().cloned())
        .collect();

    AssembledContext { context, images }
}

/// Keep the longest prefix of `chunks` whose assembled context fits `max_chars`.
///
/// Lengths are counted in characters, separators included. The first chunk is
/// always kept, even when it alone is over the cap; [`assemble_within`] cuts
/// the context instead. Chunks are never modified. `None` and `Some(0)` keep
/// everything.
pub fn apply_budget(chunks: Vec<Chunk>, max_chars: Option<usize>) -> Vec<Chunk> {
    let Some(max_chars) = effective_budget(max_chars) else {
        return chunks;
    };
    let separator_chars = CONTEXT_SEPARATOR.chars().count();

    let mut used = 0usize;
    let mut kept = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let text_chars = chunk.text.chars().count();
        if kept.is_empty() {
            used = text_chars;
        } else {
            let next = used + separator_chars + text_chars;
            if next > max_chars {
                break;
            }
            used = next;
        }
        kept.push(chunk);
        if used >= max_chars {
            break;
        }
    }
    kept
}

/// [`assemble`], with the context cut to at most `max_chars` characters.
pub fn assemble_within(chunks: &[Chunk], max_chars: Option<usize>) -> AssembledContext {
    let mut assembled = assemble(chunks);
    if let Some(max_chars) = effective_budget(max_chars) {
        let context_chars = assembled.context.chars().count();
        if context_chars > max_chars {
            assembled.context = truncate_chars(&assembled.context, max_chars);
            tracing::debug!(max_chars, context_chars, "context cut to budget");
        }
    }
    assembled
}

fn effective_budget(max_chars: Option<usize>) -> Option<usize> {
    max_chars.filter(|&max| max > 0)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
