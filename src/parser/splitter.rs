//! Windowed splitting of oversized chunks.

use super::Chunk;
use crate::error::IngestError;

/// Split `chunk` into overlapping windows of at most `max_size` characters.
///
/// Windows advance by `max_size - overlap`; the last one ends exactly at the
/// end of the content. Sub-chunk ids are the parent id suffixed with the
/// window ordinal. Line ranges are re-derived from the newlines preceding
/// each window, so they never decrease across siblings.
pub fn split(chunk: Chunk, max_size: usize, overlap: usize) -> Result<Vec<Chunk>, IngestError> {
    if max_size == 0 || overlap >= max_size {
        return Err(IngestError::InvalidSplit { max_size, overlap });
    }

    // Char boundaries, so windows never cut a UTF-8 sequence
    let mut boundaries: Vec<usize> = chunk.content.char_indices().map(|(i, _)| i).collect();
    let len = boundaries.len();
    if len <= max_size {
        return Ok(vec![chunk]);
    }
    boundaries.push(chunk.content.len());

    let step = max_size - overlap;
    let mut pieces = Vec::with_capacity((len - overlap).div_ceil(step));
    let mut start = 0;
    loop {
        let end = (start + max_size).min(len);
        let (from, to) = (boundaries[start], boundaries[end]);

        let start_line = chunk.metadata.start_line + newlines(&chunk.content[..from]);
        let end_line = start_line + newlines(chunk.content[from..to].trim_end_matches('\n'));

        let mut metadata = chunk.metadata.clone();
        metadata.start_line = start_line;
        metadata.end_line = end_line;

        pieces.push(Chunk {
            id: format!("{}_{}", chunk.id, pieces.len()),
            content: chunk.content[from..to].to_string(),
            metadata,
        });

        if end == len {
            break;
        }
        start += step;
    }

    Ok(pieces)
}

fn newlines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}
