//! Per-language syntax tables consumed by the generic extractor.
//!
//! Each language contributes a [`LanguageSyntax`]: the sets of tree-sitter
//! node kinds that shape each symbol/edge, and an [`ExportRule`] describing
//! how that language spells "this is part of the public surface" (the
//! literal ECMAScript export-statement rule doesn't translate to Rust, Go
//! or C directly, so those get syntactic substitutes for the same
//! concept).

use tree_sitter::Language;

/// How a language marks a declaration as part of its public surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportRule {
    /// The parent node is an export-statement/export-declaration form (or
    /// a `decorated_definition` whose parent is such a form). TS/JS.
    ParentExportStatement,
    /// The parent is the module root and the name doesn't start with `_`.
    /// Python.
    PythonModuleLevel,
    /// The declaration carries a `pub`/`pub(...)` visibility modifier as a
    /// direct child. Rust.
    PubKeyword,
    /// The identifier's first letter is uppercase. Go.
    UppercaseIdentifier,
    /// The declaration is not `static`-qualified at file scope. C/C++.
    NonStatic,
}

/// Node-kind sets and behavior describing one language's syntax, as
/// consumed by [`super::extract::extract`].
pub struct LanguageSyntax {
    pub function_kinds: &'static [&'static str],
    pub method_kinds: &'static [&'static str],
    pub class_kinds: &'static [&'static str],
    pub interface_kinds: &'static [&'static str],
    pub type_alias_kinds: &'static [&'static str],
    pub enum_kinds: &'static [&'static str],
    /// `lexical_declaration`/`variable_declaration`-shaped nodes; emitted
    /// as `function` when the initializer is an arrow function and the
    /// parent is an export, `variable` otherwise.
    pub variable_kinds: &'static [&'static str],
    pub call_kind: &'static str,
    pub import_kinds: &'static [&'static str],
    pub comment_kinds: &'static [&'static str],
    pub class_body_kind: &'static str,
    pub export_rule: ExportRule,
}

const ECMA_SYNTAX: LanguageSyntax = LanguageSyntax {
    function_kinds: &["function_declaration"],
    method_kinds: &["method_definition"],
    class_kinds: &["class_declaration"],
    interface_kinds: &["interface_declaration"],
    type_alias_kinds: &["type_alias_declaration"],
    enum_kinds: &["enum_declaration"],
    variable_kinds: &["lexical_declaration", "variable_declaration"],
    call_kind: "call_expression",
    import_kinds: &["import_statement"],
    comment_kinds: &["comment"],
    class_body_kind: "class_body",
    export_rule: ExportRule::ParentExportStatement,
};

const PYTHON_SYNTAX: LanguageSyntax = LanguageSyntax {
    function_kinds: &["function_definition"],
    method_kinds: &[],
    class_kinds: &["class_definition"],
    interface_kinds: &[],
    type_alias_kinds: &[],
    enum_kinds: &[],
    variable_kinds: &[],
    call_kind: "call",
    import_kinds: &["import_statement", "import_from_statement"],
    comment_kinds: &["comment"],
    class_body_kind: "block",
    export_rule: ExportRule::PythonModuleLevel,
};

const RUST_SYNTAX: LanguageSyntax = LanguageSyntax {
    function_kinds: &["function_item"],
    method_kinds: &[],
    class_kinds: &["struct_item"],
    interface_kinds: &["trait_item"],
    type_alias_kinds: &["type_item"],
    enum_kinds: &["enum_item"],
    variable_kinds: &[],
    call_kind: "call_expression",
    import_kinds: &["use_declaration"],
    comment_kinds: &["line_comment", "block_comment"],
    class_body_kind: "declaration_list",
    export_rule: ExportRule::PubKeyword,
};

const GO_SYNTAX: LanguageSyntax = LanguageSyntax {
    function_kinds: &["function_declaration"],
    method_kinds: &["method_declaration"],
    class_kinds: &["type_declaration"],
    interface_kinds: &[],
    type_alias_kinds: &[],
    enum_kinds: &[],
    variable_kinds: &[],
    call_kind: "call_expression",
    import_kinds: &["import_declaration"],
    comment_kinds: &["comment"],
    class_body_kind: "field_declaration_list",
    export_rule: ExportRule::UppercaseIdentifier,
};

const C_FAMILY_SYNTAX: LanguageSyntax = LanguageSyntax {
    function_kinds: &["function_definition"],
    method_kinds: &[],
    class_kinds: &["struct_specifier", "class_specifier"],
    interface_kinds: &[],
    type_alias_kinds: &["type_definition"],
    enum_kinds: &["enum_specifier"],
    variable_kinds: &[],
    call_kind: "call_expression",
    import_kinds: &[],
    comment_kinds: &["comment"],
    class_body_kind: "field_declaration_list",
    export_rule: ExportRule::NonStatic,
};

const BASH_SYNTAX: LanguageSyntax = LanguageSyntax {
    function_kinds: &["function_definition"],
    method_kinds: &[],
    class_kinds: &[],
    interface_kinds: &[],
    type_alias_kinds: &[],
    enum_kinds: &[],
    variable_kinds: &[],
    call_kind: "command",
    import_kinds: &[],
    comment_kinds: &["comment"],
    class_body_kind: "compound_statement",
    export_rule: ExportRule::NonStatic,
};

/// Map a lowercase extension (without the dot) to a language tag.
pub fn tag_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "ts" => "typescript",
        "tsx" => "tsx",
        "js" | "jsx" | "mjs" => "javascript",
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "sh" | "bash" => "bash",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        _ => return None,
    })
}

pub fn syntax_for_tag(tag: &str) -> &'static LanguageSyntax {
    match tag {
        "typescript" | "tsx" | "javascript" => &ECMA_SYNTAX,
        "python" => &PYTHON_SYNTAX,
        "rust" => &RUST_SYNTAX,
        "go" => &GO_SYNTAX,
        "c" | "cpp" => &C_FAMILY_SYNTAX,
        "bash" => &BASH_SYNTAX,
        _ => &ECMA_SYNTAX,
    }
}

/// Load the tree-sitter grammar for a language tag. Returns `None` for a
/// tag with no available grammar (never the case for the tags this crate
/// produces, but the registry is written to tolerate it).
pub fn load_grammar(tag: &str) -> Option<Language> {
    match tag {
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "tsx" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "bash" => Some(tree_sitter_bash::LANGUAGE.into()),
        "c" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" => Some(tree_sitter_cpp::LANGUAGE.into()),
        _ => None,
    }
}
