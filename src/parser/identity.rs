//! Stable, content-addressed chunk identity.

use super::{Chunk, ChunkMetadata, ExtractedChunk};
use sha2::{Digest, Sha256};

/// Number of content-hash hex characters folded into a chunk id.
const HASH_PREFIX_LEN: usize = 16;

/// SHA-256 of raw content, hex encoded. Doubles as the fingerprint basis for
/// change detection, so it must stay cryptographic.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Derive a chunk id from its structural coordinates, content hash and
/// position within the file.
pub fn build_id(metadata: &ChunkMetadata, content_hash: &str, ordinal: usize) -> String {
    let hash_prefix = content_hash.get(..HASH_PREFIX_LEN).unwrap_or(content_hash);

    let start_line = metadata.start_line.to_string();
    let end_line = metadata.end_line.to_string();
    let ordinal = ordinal.to_string();
    let parts = [
        metadata.relative_path.as_str(),
        metadata.scope_name.as_deref().unwrap_or(""),
        metadata.container_name.as_deref().unwrap_or(""),
        metadata.member_name.as_deref().unwrap_or(""),
        metadata.kind.as_str(),
        start_line.as_str(),
        end_line.as_str(),
        hash_prefix,
        ordinal.as_str(),
    ];

    // Length-prefixed fields: no two field lists share an encoding
    let mut context = md5::Context::new();
    for part in parts {
        context.consume(format!("{}:", part.len()));
        context.consume(part);
    }
    format!("{:x}", context.compute())
}

/// Assign ids in document order. The ordinal is the position in `extracted`,
/// which keeps structurally and textually identical chunks apart.
pub fn assign_ids(extracted: Vec<ExtractedChunk>) -> Vec<Chunk> {
    extracted
        .into_iter()
        .enumerate()
        .map(|(ordinal, chunk)| Chunk {
            id: build_id(&chunk.metadata, &chunk.metadata.content_hash, ordinal),
            content: chunk.content,
            metadata: chunk.metadata,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ChunkKind;
    use std::path::PathBuf;

    fn metadata() -> ChunkMetadata {
        ChunkMetadata {
            absolute_path: PathBuf::from("/repo/src/Foo.java"),
            relative_path: "src/Foo.java".to_string(),
            scope_name: Some("com.example".to_string()),
            container_name: Some("Foo".to_string()),
            member_name: Some("bar".to_string()),
            kind: ChunkKind::Method,
            language: "java".to_string(),
            start_line: 3,
            end_line: 5,
            content_hash: content_hash(b"void bar() {}"),
        }
    }

    #[test]
    fn test_build_id_is_deterministic() {
        let meta = metadata();
        let first = build_id(&meta, &meta.content_hash, 0);
        let second = build_id(&meta, &meta.content_hash, 0);
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn test_each_input_changes_id() {
        let meta = metadata();
        let base = build_id(&meta, &meta.content_hash, 0);

        let mut variants = Vec::new();

        let mut m = meta.clone();
        m.relative_path = "src/Other.java".to_string();
        variants.push(build_id(&m, &meta.content_hash, 0));

        let mut m = meta.clone();
        m.scope_name = None;
        variants.push(build_id(&m, &meta.content_hash, 0));

        let mut m = meta.clone();
        m.container_name = Some("Baz".to_string());
        variants.push(build_id(&m, &meta.content_hash, 0));

        let mut m = meta.clone();
        m.member_name = Some("qux".to_string());
        variants.push(build_id(&m, &meta.content_hash, 0));

        let mut m = meta.clone();
        m.kind = ChunkKind::Function;
        variants.push(build_id(&m, &meta.content_hash, 0));

        let mut m = meta.clone();
        m.start_line = 4;
        variants.push(build_id(&m, &meta.content_hash, 0));

        let mut m = meta.clone();
        m.end_line = 6;
        variants.push(build_id(&m, &meta.content_hash, 0));

        variants.push(build_id(&meta, &content_hash(b"void baz() {}"), 0));
        variants.push(build_id(&meta, &meta.content_hash, 1));

        for variant in variants {
            assert_ne!(variant, base);
        }
    }

    #[test]
    fn test_shifted_fields_do_not_collide() {
        let mut scoped = metadata();
        scoped.scope_name = Some("X".to_string());
        scoped.container_name = None;
        let mut contained = metadata();
        contained.scope_name = None;
        contained.container_name = Some("X".to_string());
        assert_ne!(
            build_id(&scoped, &scoped.content_hash, 0),
            build_id(&contained, &contained.content_hash, 0)
        );

        // A separator inside the path cannot stand in for a field boundary
        let mut colon_path = metadata();
        colon_path.relative_path = "src:a".to_string();
        colon_path.scope_name = None;
        let mut split_path = metadata();
        split_path.relative_path = "src".to_string();
        split_path.scope_name = Some("a".to_string());
        assert_ne!(
            build_id(&colon_path, &colon_path.content_hash, 0),
            build_id(&split_path, &split_path.content_hash, 0)
        );
    }

    #[test]
    fn test_identical_chunks_get_distinct_ids() {
        let meta = metadata();
        let extracted = vec![
            ExtractedChunk {
                content: "void bar() {}".to_string(),
                metadata: meta.clone(),
            },
            ExtractedChunk {
                content: "void bar() {}".to_string(),
                metadata: meta,
            },
        ];

        let chunks = assign_ids(extracted);
        assert_ne!(chunks[0].id, chunks[1].id);
        assert_eq!(chunks[0].metadata.content_hash, chunks[1].metadata.content_hash);
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
