//! Walks a syntax tree and cuts chunks at configured semantic-unit boundaries.

use super::identity::content_hash;
use super::{ChunkKind, ChunkMetadata, ExtractedChunk};
use std::collections::HashSet;
use std::path::Path;
use tree_sitter::{Node, Tree, TreeCursor};

/// File-level inputs shared by every chunk of one extraction.
pub struct SourceFile<'a> {
    pub absolute_path: &'a Path,
    pub relative_path: &'a str,
    pub language: &'a str,
    pub source: &'a str,
}

/// Semantic-unit extractor for one language
pub struct SemanticExtractor<'a> {
    units: &'a HashSet<String>,
}

impl<'a> SemanticExtractor<'a> {
    pub fn new(units: &'a HashSet<String>) -> Self {
        Self { units }
    }

    /// Pre-order walk yielding one chunk per semantic unit, in document order.
    /// Nested units each produce their own chunk; a class chunk and its
    /// method chunks coexist. Trees with parse errors are walked as-is.
    pub fn extract(&self, tree: &Tree, file: &SourceFile<'_>) -> Vec<ExtractedChunk> {
        let root = tree.root_node();
        let scope_name = scope_name(root, file.source);

        let mut chunks = Vec::new();
        let mut containers: Vec<Option<String>> = Vec::new();
        let mut cursor = root.walk();
        self.walk(&mut cursor, file, &scope_name, &mut containers, &mut chunks);

        chunks
    }

    fn walk(
        &self,
        cursor: &mut TreeCursor,
        file: &SourceFile<'_>,
        scope_name: &Option<String>,
        containers: &mut Vec<Option<String>>,
        chunks: &mut Vec<ExtractedChunk>,
    ) {
        let node = cursor.node();
        let kind = ChunkKind::from_node_kind(node.kind());
        let is_unit = self.units.contains(node.kind());

        // Class-like nodes name the container of everything beneath them,
        // whether or not they are configured as units themselves.
        let own_container = if kind.is_container() {
            Some(identifier_of(node, file.source))
        } else {
            None
        };

        if is_unit {
            if let Some(chunk) = self.materialize(node, kind, file, scope_name, containers, &own_container) {
                chunks.push(chunk);
            }
        }

        if cursor.goto_first_child() {
            if let Some(name) = &own_container {
                containers.push(name.clone());
            }

            loop {
                self.walk(cursor, file, scope_name, containers, chunks);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }

            if own_container.is_some() {
                containers.pop();
            }
            cursor.goto_parent();
        }
    }

    fn materialize(
        &self,
        node: Node,
        kind: ChunkKind,
        file: &SourceFile<'_>,
        scope_name: &Option<String>,
        containers: &[Option<String>],
        own_container: &Option<Option<String>>,
    ) -> Option<ExtractedChunk> {
        let content = file.source.get(node.start_byte()..node.end_byte())?;
        if content.trim().is_empty() {
            return None;
        }

        let container_name = match own_container {
            Some(name) => name.clone(),
            None => containers.iter().rev().flatten().next().cloned(),
        };
        let member_name = if kind.is_member() {
            identifier_of(node, file.source)
        } else {
            None
        };

        Some(ExtractedChunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                absolute_path: file.absolute_path.to_path_buf(),
                relative_path: file.relative_path.to_string(),
                scope_name: scope_name.clone(),
                container_name,
                member_name,
                kind,
                language: file.language.to_string(),
                start_line: node.start_position().row + 1,
                end_line: node.end_position().row + 1,
                content_hash: content_hash(content.as_bytes()),
            },
        })
    }
}

/// Single chunk spanning the whole file, used when a cleanly parsed file
/// holds no configured unit.
pub fn whole_file_chunk(file: &SourceFile<'_>) -> Option<ExtractedChunk> {
    if file.source.trim().is_empty() {
        return None;
    }

    Some(ExtractedChunk {
        content: file.source.to_string(),
        metadata: ChunkMetadata {
            absolute_path: file.absolute_path.to_path_buf(),
            relative_path: file.relative_path.to_string(),
            scope_name: None,
            container_name: None,
            member_name: None,
            kind: ChunkKind::File,
            language: file.language.to_string(),
            start_line: 1,
            end_line: file.source.lines().count().max(1),
            content_hash: content_hash(file.source.as_bytes()),
        },
    })
}

/// Package or namespace name declared by a direct child of the root.
fn scope_name(root: Node, source: &str) -> Option<String> {
    let mut cursor = root.walk();
    let declaration = root
        .children(&mut cursor)
        .find(|child| ChunkKind::from_node_kind(child.kind()) == ChunkKind::Namespace)?;
    identifier_of(declaration, source)
}

/// Name of a declaration: its `name` field, else the first direct child that
/// looks like an identifier.
fn identifier_of(node: Node, source: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return text_of(name, source);
    }

    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|child| {
        let kind = child.kind();
        kind.contains("identifier") || kind.contains("name")
    });
    found.and_then(|child| text_of(child, source))
}

fn text_of(node: Node, source: &str) -> Option<String> {
    source
        .get(node.start_byte()..node.end_byte())
        .map(|text| text.to_string())
}
