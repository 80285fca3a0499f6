use crate::error::IngestError;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Language, Parser, Tree};

/// Syntax tree plus the source it was built from.
pub struct ParsedSource {
    pub tree: Tree,
    pub source: String,
    /// Language tag, e.g. "java"; keys the semantic-unit configuration.
    pub language: &'static str,
    pub has_error: bool,
}

/// Source-to-tree collaborator consumed by the ingestion pipeline.
pub trait SourceParser: Send + Sync {
    /// Parse `path`, using `source` when the caller has already read it.
    fn parse(&self, path: &Path, source: Option<String>) -> Result<ParsedSource>;

    /// Extensions this parser accepts, without the dot.
    fn extensions(&self) -> Vec<String>;
}

/// Tree-sitter backed parser with grammars registered by file extension
pub struct CodeParser {
    languages: HashMap<&'static str, (&'static str, Language)>,
}

impl CodeParser {
    pub fn new() -> Self {
        let mut languages = HashMap::new();

        // tree-sitter 0.20 grammars expose a language() function
        languages.insert("rs", ("rust", tree_sitter_rust::language()));
        languages.insert("ts", ("typescript", tree_sitter_typescript::language_typescript()));
        languages.insert("tsx", ("typescript", tree_sitter_typescript::language_tsx()));
        languages.insert("js", ("javascript", tree_sitter_javascript::language()));
        languages.insert("jsx", ("javascript", tree_sitter_javascript::language()));
        languages.insert("mjs", ("javascript", tree_sitter_javascript::language()));
        languages.insert("py", ("python", tree_sitter_python::language()));
        languages.insert("go", ("go", tree_sitter_go::language()));
        languages.insert("cpp", ("cpp", tree_sitter_cpp::language()));
        languages.insert("cc", ("cpp", tree_sitter_cpp::language()));
        languages.insert("hpp", ("cpp", tree_sitter_cpp::language()));
        languages.insert("h", ("cpp", tree_sitter_cpp::language()));
        languages.insert("java", ("java", tree_sitter_java::language()));
        languages.insert("cs", ("csharp", tree_sitter_c_sharp::language()));

        Self { languages }
    }

    /// Language tag for a path, if its extension is registered.
    pub fn language_for(&self, path: &Path) -> Option<&'static str> {
        let extension = extension_of(path);
        self.languages.get(extension.as_str()).map(|(tag, _)| *tag)
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser for CodeParser {
    fn parse(&self, path: &Path, source: Option<String>) -> Result<ParsedSource> {
        let extension = extension_of(path);

        let (tag, language) = self
            .languages
            .get(extension.as_str())
            .copied()
            .ok_or(IngestError::UnsupportedExtension { extension })?;

        let source = match source {
            Some(source) => source,
            None => std::fs::read_to_string(path).context("Failed to read source file")?,
        };

        let mut parser = Parser::new();
        parser
            .set_language(language)
            .context("Failed to set language")?;

        let tree = parser
            .parse(&source, None)
            .context("Failed to parse code")?;
        let has_error = tree.root_node().has_error();

        Ok(ParsedSource {
            tree,
            source,
            language: tag,
            has_error,
        })
    }

    fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.languages.keys().map(|e| e.to_string()).collect();
        extensions.sort();
        extensions
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_java_class() {
        let parser = CodeParser::new();
        let code = "class Greeter { String hello() { return \"hi\"; } }";

        let parsed = parser
            .parse(Path::new("Greeter.java"), Some(code.to_string()))
            .unwrap();
        assert_eq!(parsed.language, "java");
        assert!(!parsed.has_error);
        assert_eq!(parsed.tree.root_node().kind(), "program");
    }

    #[test]
    fn test_garbage_sets_error_flag() {
        let parser = CodeParser::new();
        let parsed = parser
            .parse(Path::new("Broken.java"), Some("%%% ### !!!".to_string()))
            .unwrap();
        assert!(parsed.has_error);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let parser = CodeParser::new();
        let err = parser
            .parse(Path::new("notes.xyz"), Some("hello".to_string()))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn test_language_lookup_is_case_insensitive() {
        let parser = CodeParser::new();
        assert_eq!(parser.language_for(Path::new("Main.JAVA")), Some("java"));
        assert_eq!(parser.language_for(Path::new("README")), None);
    }
}
