pub mod code_parser;
pub mod extractor;
pub mod identity;
pub mod splitter;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Code chunk ready for embedding: a semantic unit (function, class, etc.)
/// together with its stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Chunk as produced by extraction, before an ordinal has been assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Location and structural metadata carried by every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    /// Enclosing package or namespace, shared by every chunk of a file.
    pub scope_name: Option<String>,
    /// Enclosing class-like declaration.
    pub container_name: Option<String>,
    /// Function, method or property name.
    pub member_name: Option<String>,
    pub kind: ChunkKind,
    pub language: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    /// 1-indexed, inclusive.
    pub end_line: usize,
    /// Hex SHA-256 of the chunk content.
    pub content_hash: String,
}

/// Structural role of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Namespace,
    Class,
    Interface,
    Enum,
    Function,
    Method,
    Property,
    TemplateDirective,
    TemplateBlock,
    File,
}

impl ChunkKind {
    /// Fixed mapping from a syntax node category to a chunk kind.
    /// Categories not listed here fall back to `File`.
    pub fn from_node_kind(node_kind: &str) -> Self {
        match node_kind {
            "package_declaration"
            | "package_clause"
            | "namespace_declaration"
            | "file_scoped_namespace_declaration"
            | "namespace_definition" => ChunkKind::Namespace,
            "class_declaration"
            | "abstract_class_declaration"
            | "class_definition"
            | "class_specifier"
            | "struct_specifier"
            | "struct_item"
            | "struct_declaration"
            | "record_declaration"
            | "impl_item"
            | "type_declaration" => ChunkKind::Class,
            "interface_declaration" | "trait_item" => ChunkKind::Interface,
            "enum_declaration" | "enum_item" | "enum_specifier" => ChunkKind::Enum,
            "function_declaration"
            | "function_definition"
            | "function_item"
            | "generator_function_declaration" => ChunkKind::Function,
            "method_declaration" | "method_definition" | "constructor_declaration" => {
                ChunkKind::Method
            }
            "property_declaration"
            | "field_declaration"
            | "public_field_definition"
            | "property_signature" => ChunkKind::Property,
            "directive" | "template_directive" => ChunkKind::TemplateDirective,
            "section" | "template_block" => ChunkKind::TemplateBlock,
            _ => ChunkKind::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Namespace => "namespace",
            ChunkKind::Class => "class",
            ChunkKind::Interface => "interface",
            ChunkKind::Enum => "enum",
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Property => "property",
            ChunkKind::TemplateDirective => "template_directive",
            ChunkKind::TemplateBlock => "template_block",
            ChunkKind::File => "file",
        }
    }

    /// Class-like kinds name the container for nested units.
    pub fn is_container(&self) -> bool {
        matches!(self, ChunkKind::Class | ChunkKind::Interface | ChunkKind::Enum)
    }

    /// Function-like kinds carry a member name.
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            ChunkKind::Function | ChunkKind::Method | ChunkKind::Property
        )
    }
}
