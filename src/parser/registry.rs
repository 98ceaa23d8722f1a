//! Per-language parser dispatch.
//!
//! Maps a language tag to a tagged chunking strategy: structural (a
//! tree-sitter grammar plus the node-kind rules that mark chunk boundaries)
//! or whole-file fallback. Resolved once per file; there is no per-language
//! type hierarchy.

use tree_sitter::Language;

use super::ChunkKind;

/// One node-kind rule: which tree-sitter node kind becomes a chunk, what
/// chunk kind it maps to, and whether nested functions inside it are
/// promoted to methods.
#[derive(Debug, Clone, Copy)]
pub struct NodeRule {
    pub node_kind: &'static str,
    pub chunk_kind: ChunkKind,
    pub container: bool,
}

const fn rule(node_kind: &'static str, chunk_kind: ChunkKind, container: bool) -> NodeRule {
    NodeRule {
        node_kind,
        chunk_kind,
        container,
    }
}

/// A loaded structural grammar with its chunking rules
pub struct Grammar {
    pub language: Language,
    pub rules: &'static [NodeRule],
}

impl Grammar {
    /// Look up the rule for a tree-sitter node kind
    pub fn rule_for(&self, node_kind: &str) -> Option<&NodeRule> {
        self.rules.iter().find(|r| r.node_kind == node_kind)
    }
}

/// Chunking strategy for one language tag
pub enum ChunkStrategy {
    /// Walk the syntax tree and emit one chunk per named definition
    Structural(Grammar),
    /// Emit exactly one whole-file chunk
    Fallback,
}

const RUST_RULES: &[NodeRule] = &[
    rule("function_item", ChunkKind::Function, false),
    rule("impl_item", ChunkKind::Class, true),
    rule("trait_item", ChunkKind::Class, true),
    rule("struct_item", ChunkKind::Class, false),
    rule("enum_item", ChunkKind::Class, false),
    rule("mod_item", ChunkKind::Module, true),
];

const PYTHON_RULES: &[NodeRule] = &[
    rule("function_definition", ChunkKind::Function, false),
    rule("class_definition", ChunkKind::Class, true),
];

const JAVASCRIPT_RULES: &[NodeRule] = &[
    rule("function_declaration", ChunkKind::Function, false),
    rule("generator_function_declaration", ChunkKind::Function, false),
    rule("method_definition", ChunkKind::Method, false),
    rule("class_declaration", ChunkKind::Class, true),
];

const TYPESCRIPT_RULES: &[NodeRule] = &[
    rule("function_declaration", ChunkKind::Function, false),
    rule("generator_function_declaration", ChunkKind::Function, false),
    rule("method_definition", ChunkKind::Method, false),
    rule("class_declaration", ChunkKind::Class, true),
    rule("interface_declaration", ChunkKind::Class, false),
    rule("enum_declaration", ChunkKind::Class, false),
    rule("internal_module", ChunkKind::Module, true),
];

const GO_RULES: &[NodeRule] = &[
    rule("function_declaration", ChunkKind::Function, false),
    rule("method_declaration", ChunkKind::Method, false),
    rule("type_declaration", ChunkKind::Class, false),
];

const JAVA_RULES: &[NodeRule] = &[
    rule("class_declaration", ChunkKind::Class, true),
    rule("interface_declaration", ChunkKind::Class, true),
    rule("enum_declaration", ChunkKind::Class, true),
    rule("method_declaration", ChunkKind::Method, false),
    rule("constructor_declaration", ChunkKind::Method, false),
];

const SWIFT_RULES: &[NodeRule] = &[
    rule("function_declaration", ChunkKind::Function, false),
    rule("class_declaration", ChunkKind::Class, true),
    rule("protocol_declaration", ChunkKind::Class, true),
];

const C_RULES: &[NodeRule] = &[
    rule("function_definition", ChunkKind::Function, false),
    rule("struct_specifier", ChunkKind::Class, false),
    rule("enum_specifier", ChunkKind::Class, false),
    rule("union_specifier", ChunkKind::Class, false),
    rule("type_definition", ChunkKind::Class, false),
];

const CPP_RULES: &[NodeRule] = &[
    rule("function_definition", ChunkKind::Function, false),
    rule("class_specifier", ChunkKind::Class, true),
    rule("struct_specifier", ChunkKind::Class, true),
    rule("enum_specifier", ChunkKind::Class, false),
    rule("union_specifier", ChunkKind::Class, false),
    rule("namespace_definition", ChunkKind::Module, true),
];

const CSHARP_RULES: &[NodeRule] = &[
    rule("class_declaration", ChunkKind::Class, true),
    rule("struct_declaration", ChunkKind::Class, true),
    rule("interface_declaration", ChunkKind::Class, true),
    rule("enum_declaration", ChunkKind::Class, false),
    rule("method_declaration", ChunkKind::Method, false),
    rule("constructor_declaration", ChunkKind::Method, false),
    rule("namespace_declaration", ChunkKind::Module, true),
];

const RUBY_RULES: &[NodeRule] = &[
    rule("method", ChunkKind::Function, false),
    rule("singleton_method", ChunkKind::Method, false),
    rule("class", ChunkKind::Class, true),
    rule("module", ChunkKind::Module, true),
];

const PHP_RULES: &[NodeRule] = &[
    rule("function_definition", ChunkKind::Function, false),
    rule("method_declaration", ChunkKind::Method, false),
    rule("class_declaration", ChunkKind::Class, true),
    rule("interface_declaration", ChunkKind::Class, true),
    rule("trait_declaration", ChunkKind::Class, true),
    rule("namespace_definition", ChunkKind::Module, true),
];

/// Resolve the chunking strategy for a language tag.
///
/// Tags come from extension detection in the file walker. Unknown tags get
/// the whole-file fallback, so every eligible file yields at least one chunk.
pub fn strategy_for(language: &str) -> ChunkStrategy {
    let grammar = match language {
        "rust" => Grammar {
            language: tree_sitter_rust::LANGUAGE.into(),
            rules: RUST_RULES,
        },
        "python" => Grammar {
            language: tree_sitter_python::LANGUAGE.into(),
            rules: PYTHON_RULES,
        },
        "javascript" => Grammar {
            language: tree_sitter_javascript::LANGUAGE.into(),
            rules: JAVASCRIPT_RULES,
        },
        "typescript" => Grammar {
            language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            rules: TYPESCRIPT_RULES,
        },
        "tsx" => Grammar {
            language: tree_sitter_typescript::LANGUAGE_TSX.into(),
            rules: TYPESCRIPT_RULES,
        },
        "go" => Grammar {
            language: tree_sitter_go::LANGUAGE.into(),
            rules: GO_RULES,
        },
        "java" => Grammar {
            language: tree_sitter_java::LANGUAGE.into(),
            rules: JAVA_RULES,
        },
        "swift" => Grammar {
            language: tree_sitter_swift::LANGUAGE.into(),
            rules: SWIFT_RULES,
        },
        "c" => Grammar {
            language: tree_sitter_c::LANGUAGE.into(),
            rules: C_RULES,
        },
        "cpp" => Grammar {
            language: tree_sitter_cpp::LANGUAGE.into(),
            rules: CPP_RULES,
        },
        "csharp" => Grammar {
            language: tree_sitter_c_sharp::LANGUAGE.into(),
            rules: CSHARP_RULES,
        },
        "ruby" => Grammar {
            language: tree_sitter_ruby::LANGUAGE.into(),
            rules: RUBY_RULES,
        },
        "php" => Grammar {
            language: tree_sitter_php::LANGUAGE_PHP.into(),
            rules: PHP_RULES,
        },
        _ => return ChunkStrategy::Fallback,
    };
    ChunkStrategy::Structural(grammar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_languages_resolve() {
        for tag in [
            "rust",
            "python",
            "javascript",
            "typescript",
            "tsx",
            "go",
            "java",
            "swift",
            "c",
            "cpp",
            "csharp",
            "ruby",
            "php",
        ] {
            assert!(
                matches!(strategy_for(tag), ChunkStrategy::Structural(_)),
                "expected structural strategy for {tag}"
            );
        }
    }

    #[test]
    fn test_unknown_language_falls_back() {
        assert!(matches!(strategy_for("toml"), ChunkStrategy::Fallback));
        assert!(matches!(strategy_for(""), ChunkStrategy::Fallback));
        assert!(matches!(strategy_for("brainfuck"), ChunkStrategy::Fallback));
    }

    #[test]
    fn test_rule_lookup() {
        if let ChunkStrategy::Structural(grammar) = strategy_for("rust") {
            let rule = grammar.rule_for("function_item").unwrap();
            assert_eq!(rule.chunk_kind, ChunkKind::Function);
            assert!(!rule.container);

            let rule = grammar.rule_for("impl_item").unwrap();
            assert_eq!(rule.chunk_kind, ChunkKind::Class);
            assert!(rule.container);

            assert!(grammar.rule_for("macro_invocation").is_none());
        } else {
            panic!("rust should be structural");
        }
    }
}
