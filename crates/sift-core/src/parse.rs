//! Tree-sitter based code parsing
//!
//! Extracts top-level definitions (functions, classes, structs, methods)
//! as named blocks for embedding.

use tree_sitter::{Language, Node, Parser};

use crate::{Block, Result, SiftError};

/// Supported programming languages for tree-sitter parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    #[cfg(feature = "rs")]
    Rust,
    #[cfg(feature = "python")]
    Python,
    #[cfg(feature = "javascript")]
    JavaScript,
    #[cfg(feature = "typescript")]
    TypeScript,
    #[cfg(feature = "go")]
    Go,
    #[cfg(feature = "java")]
    Java,
    #[cfg(feature = "c")]
    C,
    #[cfg(feature = "cpp")]
    Cpp,
}

impl CodeLanguage {
    /// Detect language from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            #[cfg(feature = "rs")]
            "rs" => Some(Self::Rust),
            #[cfg(feature = "python")]
            "py" | "pyi" => Some(Self::Python),
            #[cfg(feature = "javascript")]
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            #[cfg(feature = "typescript")]
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            #[cfg(feature = "go")]
            "go" => Some(Self::Go),
            #[cfg(feature = "java")]
            "java" => Some(Self::Java),
            #[cfg(feature = "c")]
            "c" | "h" => Some(Self::C),
            #[cfg(feature = "cpp")]
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Some(Self::Cpp),
            _ => None,
        }
    }

    /// Get the tree-sitter language for this code language.
    fn tree_sitter_language(&self) -> Language {
        match *self {
            #[cfg(feature = "rs")]
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            #[cfg(feature = "python")]
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            #[cfg(feature = "javascript")]
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            #[cfg(feature = "typescript")]
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            #[cfg(feature = "go")]
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            #[cfg(feature = "java")]
            Self::Java => tree_sitter_java::LANGUAGE.into(),
            #[cfg(feature = "c")]
            Self::C => tree_sitter_c::LANGUAGE.into(),
            #[cfg(feature = "cpp")]
            Self::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        }
    }

    /// Get the node kinds that represent definitions we want to extract.
    fn definition_kinds(&self) -> &[&str] {
        match *self {
            #[cfg(feature = "rs")]
            Self::Rust => &[
                "function_item",
                "impl_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "mod_item",
                "const_item",
                "static_item",
                "type_item",
                "macro_definition",
            ],
            #[cfg(feature = "python")]
            Self::Python => &[
                "function_definition",
                "class_definition",
                "decorated_definition",
            ],
            #[cfg(feature = "javascript")]
            Self::JavaScript => JS_DEFINITIONS,
            #[cfg(feature = "typescript")]
            Self::TypeScript => JS_DEFINITIONS,
            #[cfg(feature = "go")]
            Self::Go => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
                "const_declaration",
                "var_declaration",
            ],
            #[cfg(feature = "java")]
            Self::Java => &[
                "class_declaration",
                "interface_declaration",
                "enum_declaration",
                "method_declaration",
                "constructor_declaration",
            ],
            #[cfg(feature = "c")]
            Self::C => C_DEFINITIONS,
            #[cfg(feature = "cpp")]
            Self::Cpp => C_DEFINITIONS,
        }
    }
}

#[cfg(any(feature = "javascript", feature = "typescript"))]
const JS_DEFINITIONS: &[&str] = &[
    "function_declaration",
    "class_declaration",
    "method_definition",
    "arrow_function",
    "function",
    "export_statement",
    "lexical_declaration",
];

#[cfg(any(feature = "c", feature = "cpp"))]
const C_DEFINITIONS: &[&str] = &[
    "function_definition",
    "struct_specifier",
    "enum_specifier",
    "class_specifier",
    "namespace_definition",
];

/// Fields that wrap the node carrying the real definition.
const WRAPPER_FIELDS: &[&str] = &["definition", "declaration", "declarator"];

/// Code parser using tree-sitter.
pub struct CodeParser {
    parser: Parser,
}

impl CodeParser {
    /// Create a new code parser.
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Parse source in the given language and extract definition blocks.
    ///
    /// Returns an empty list when the source has no recognisable definitions.
    pub fn parse(&mut self, lang: CodeLanguage, source: &str) -> Result<Vec<Block>> {
        self.parser
            .set_language(&lang.tree_sitter_language())
            .map_err(|e| SiftError::Extraction(e.to_string()))?;

        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| SiftError::Extraction("tree-sitter parse failed".to_string()))?;

        let definition_kinds = lang.definition_kinds();
        let root = tree.root_node();
        let mut blocks = Vec::new();

        // Top-level definitions first
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if definition_kinds.contains(&child.kind()) {
                blocks.push(node_to_block(child, source));
            }
        }

        // If none, the file may only have nested definitions
        if blocks.is_empty() {
            extract_blocks_recursive(&root, source, definition_kinds, &mut blocks);
        }

        Ok(blocks)
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively extract blocks from nested definitions.
fn extract_blocks_recursive(
    node: &Node,
    source: &str,
    definition_kinds: &[&str],
    blocks: &mut Vec<Block>,
) {
    let mut cursor = node.walk();

    for child in node.children(&mut cursor) {
        if definition_kinds.contains(&child.kind()) {
            blocks.push(node_to_block(child, source));
        } else {
            extract_blocks_recursive(&child, source, definition_kinds, blocks);
        }
    }
}

fn node_to_block(node: Node, source: &str) -> Block {
    let start_byte = node.start_byte();
    let end_byte = node.end_byte();

    Block {
        kind: short_kind(inner_definition(node).kind()),
        name: definition_name(node, source).unwrap_or_else(|| "<anonymous>".to_string()),
        start_line: node.start_position().row + 1,
        end_line: source[..end_byte].matches('\n').count() + 1,
        content: source[start_byte..end_byte].to_string(),
    }
}

/// Unwrap decorators and export statements to the definition they carry.
fn inner_definition(node: Node) -> Node {
    for field in &WRAPPER_FIELDS[..2] {
        if let Some(inner) = node.child_by_field_name(field) {
            return inner_definition(inner);
        }
    }
    node
}

/// Best-effort name of a definition node.
fn definition_name(node: Node, source: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return node_text(name, source);
    }
    for field in WRAPPER_FIELDS {
        if let Some(inner) = node.child_by_field_name(field) {
            if inner.kind().ends_with("identifier") {
                return node_text(inner, source);
            }
            if let Some(name) = definition_name(inner, source) {
                return Some(name);
            }
        }
    }
    // Rust `impl Foo` names the implemented type
    if let Some(ty) = node.child_by_field_name("type") {
        return node_text(ty, source);
    }

    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|child| child.kind().ends_with("identifier") || child.kind() == "variable_declarator");
    match found {
        Some(child) if child.kind() == "variable_declarator" => definition_name(child, source),
        Some(child) => node_text(child, source),
        None => None,
    }
}

fn node_text(node: Node, source: &str) -> Option<String> {
    node.utf8_text(source.as_bytes()).ok().map(str::to_string)
}

/// Strip grammar suffixes: `function_item` -> `function`, `class_definition` -> `class`.
fn short_kind(kind: &str) -> String {
    const SUFFIXES: &[&str] = &["_item", "_definition", "_declaration", "_specifier"];
    SUFFIXES
        .iter()
        .find_map(|suffix| kind.strip_suffix(suffix))
        .unwrap_or(kind)
        .to_string()
}
