//! The generic tree-sitter walker.
//!
//! One traversal produces symbols (tracking an enclosing-class/type
//! container as it descends), a second collects imports, a third collects
//! calls by climbing ancestors from each call-expression node. All three
//! are driven entirely by the node-kind sets in a [`LanguageSyntax`]
//! table; there is no per-language traversal code here.

use tree_sitter::{Language, Node, Parser};

use super::languages::{ExportRule, LanguageSyntax};
use super::{ParseResult, RawCall, RawImport, RawSymbol};

const SIGNATURE_CAP: usize = 200;
const DOCSTRING_CAP: usize = 500;
const BODY_CAP: usize = 2048;
const BODY_CAP_CLASS: usize = 3072;

const SKIPPED_CALLS: &[&str] = &[
    "console.log",
    "console.error",
    "console.warn",
    "console.info",
    "console.debug",
    "print",
    "require",
];

const EXPORT_PARENT_KINDS: &[&str] = &[
    "export_statement",
    "export_declaration",
    "export_default_declaration",
];

pub fn extract(language: &Language, syntax: &LanguageSyntax, source: &str) -> ParseResult {
    let mut parser = Parser::new();
    if parser.set_language(language).is_err() {
        return ParseResult::default();
    }
    let Some(tree) = parser.parse(source, None) else {
        return ParseResult::default();
    };
    let root = tree.root_node();

    let mut symbols = Vec::new();
    walk_symbols(root, None, source, syntax, &mut symbols);

    let mut imports = Vec::new();
    walk_imports(root, source, syntax, &mut imports);

    let mut calls = Vec::new();
    walk_calls(root, source, syntax, &mut calls);

    ParseResult {
        symbols,
        imports,
        calls,
        language: None,
    }
}

fn walk_symbols(
    node: Node,
    container: Option<String>,
    source: &str,
    syntax: &LanguageSyntax,
    out: &mut Vec<RawSymbol>,
) {
    let kind = node.kind();

    if syntax.class_kinds.contains(&kind) || syntax.interface_kinds.contains(&kind) {
        if let Some(name) = field_text(node, "name", source) {
            out.push(build_symbol(
                node,
                &name,
                None,
                symbol_kind(syntax, kind),
                source,
                syntax,
            ));
            descend_children(node, Some(name), source, syntax, out);
            return;
        }
    }

    if syntax.type_alias_kinds.contains(&kind) || syntax.enum_kinds.contains(&kind) {
        if let Some(name) = field_text(node, "name", source) {
            out.push(build_symbol(
                node,
                &name,
                None,
                symbol_kind(syntax, kind),
                source,
                syntax,
            ));
        }
        descend_children(node, container, source, syntax, out);
        return;
    }

    if syntax.method_kinds.contains(&kind) {
        if let Some(name) = field_text(node, "name", source) {
            let qualified = receiver_qualified_name(node, &name, source)
                .or_else(|| container.clone().map(|c| format!("{c}.{name}")));
            out.push(build_symbol(node, &name, qualified, "method", source, syntax));
        }
        descend_children(node, container, source, syntax, out);
        return;
    }

    if syntax.function_kinds.contains(&kind) {
        if let Some(name) = field_text(node, "name", source) {
            let qualified = container.clone().map(|c| format!("{c}.{name}"));
            out.push(build_symbol(node, &name, qualified, "function", source, syntax));
        }
        descend_children(node, container, source, syntax, out);
        return;
    }

    // Rust `impl` bodies contribute no symbol of their own but set the
    // enclosing container for methods. `trait_item` never reaches here:
    // it's in `interface_kinds`, caught by the branch above.
    if kind == "impl_item" {
        if let Some(type_name) = field_text(node, "type", source) {
            descend_children(node, Some(type_name), source, syntax, out);
            return;
        }
    }

    if syntax.variable_kinds.contains(&kind) {
        if is_export_parent(node) {
            for declarator in named_children(node).filter(|c| c.kind() == "variable_declarator") {
                if let Some(name) = field_text(declarator, "name", source) {
                    let is_arrow = declarator
                        .child_by_field_name("value")
                        .map(|v| v.kind() == "arrow_function")
                        .unwrap_or(false);
                    let emitted_kind = if is_arrow { "function" } else { "variable" };
                    out.push(build_symbol(node, &name, None, emitted_kind, source, syntax));
                }
            }
        }
        descend_children(node, container, source, syntax, out);
        return;
    }

    descend_children(node, container, source, syntax, out);
}

fn descend_children(
    node: Node,
    container: Option<String>,
    source: &str,
    syntax: &LanguageSyntax,
    out: &mut Vec<RawSymbol>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_symbols(child, container.clone(), source, syntax, out);
    }
}

fn build_symbol(
    node: Node,
    name: &str,
    qualified_name: Option<String>,
    kind: &'static str,
    source: &str,
    syntax: &LanguageSyntax,
) -> RawSymbol {
    let body_cap = if kind == "class" || kind == "interface" {
        BODY_CAP_CLASS
    } else {
        BODY_CAP
    };
    RawSymbol {
        name: name.to_string(),
        qualified_name,
        kind,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        signature: first_line(node, source),
        docstring: leading_comment(node, source, syntax),
        body: Some(cap_chars(node_text(node, source), body_cap)),
        exported: is_exported(node, name, syntax, source),
    }
}

fn symbol_kind(syntax: &LanguageSyntax, kind: &str) -> &'static str {
    if syntax.class_kinds.contains(&kind) {
        "class"
    } else if syntax.interface_kinds.contains(&kind) {
        "interface"
    } else if syntax.type_alias_kinds.contains(&kind) {
        "type"
    } else if syntax.enum_kinds.contains(&kind) {
        "enum"
    } else {
        "class"
    }
}

fn is_exported(node: Node, name: &str, syntax: &LanguageSyntax, source: &str) -> bool {
    match syntax.export_rule {
        ExportRule::ParentExportStatement => {
            let Some(parent) = node.parent() else {
                return false;
            };
            if EXPORT_PARENT_KINDS.contains(&parent.kind()) {
                return true;
            }
            if parent.kind() == "decorated_definition" {
                if let Some(grandparent) = parent.parent() {
                    return EXPORT_PARENT_KINDS.contains(&grandparent.kind());
                }
            }
            false
        }
        ExportRule::PythonModuleLevel => {
            let parent_is_module = node.parent().map(|p| p.kind() == "module").unwrap_or(false);
            parent_is_module && !name.starts_with('_')
        }
        ExportRule::PubKeyword => {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .any(|c| c.kind() == "visibility_modifier")
        }
        ExportRule::UppercaseIdentifier => {
            name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
        }
        ExportRule::NonStatic => {
            let mut cursor = node.walk();
            !node.children(&mut cursor).any(|c| {
                c.kind() == "storage_class_specifier" && node_text(c, source).trim() == "static"
            })
        }
    }
}

fn receiver_qualified_name(node: Node, name: &str, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    let param = receiver.named_children(&mut cursor).next()?;
    let mut type_node = param.child_by_field_name("type")?;
    if type_node.kind() == "pointer_type" {
        type_node = type_node.named_child(0)?;
    }
    let type_name = node_text(type_node, source).trim();
    Some(format!("{type_name}.{name}"))
}

fn is_export_parent(node: Node) -> bool {
    node.parent()
        .map(|p| EXPORT_PARENT_KINDS.contains(&p.kind()))
        .unwrap_or(false)
}

fn first_line(node: Node, source: &str) -> Option<String> {
    let text = node_text(node, source);
    let line = text.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        None
    } else {
        Some(cap_chars(line, SIGNATURE_CAP))
    }
}

fn leading_comment(node: Node, source: &str, syntax: &LanguageSyntax) -> Option<String> {
    let sibling = node.prev_sibling()?;
    if syntax.comment_kinds.contains(&sibling.kind()) {
        Some(cap_chars(node_text(sibling, source).trim(), DOCSTRING_CAP))
    } else {
        None
    }
}

fn field_text(node: Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, source).to_string())
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn cap_chars(s: &str, cap: usize) -> String {
    s.chars().take(cap).collect()
}

fn named_children(node: Node) -> impl Iterator<Item = Node<'_>> {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    children.into_iter()
}

// ---- imports ------------------------------------------------------------

fn walk_imports(node: Node, source: &str, syntax: &LanguageSyntax, out: &mut Vec<RawImport>) {
    if syntax.import_kinds.contains(&node.kind()) {
        if let Some(import) = extract_import(node, source) {
            out.push(import);
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_imports(child, source, syntax, out);
    }
}

fn extract_import(node: Node, source: &str) -> Option<RawImport> {
    let source_text = import_source_text(node, source)?;
    let mut names = Vec::new();
    collect_import_names(node, source, &mut names);
    Some(RawImport {
        source: source_text,
        names,
    })
}

fn import_source_text(node: Node, source: &str) -> Option<String> {
    if let Some(src) = node.child_by_field_name("source") {
        return Some(strip_quotes(node_text(src, source)));
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "string" | "string_literal") {
            return Some(strip_quotes(node_text(child, source)));
        }
    }
    // Bare `import x` / `import x.y`: the module path itself.
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "dotted_name" | "aliased_import") {
            return Some(node_text(child, source).to_string());
        }
    }
    None
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn collect_import_names(node: Node, source: &str, names: &mut Vec<String>) {
    match node.kind() {
        "import_clause" => {
            if let Some(first) = node.named_child(0) {
                if first.kind() == "identifier" {
                    names.push(node_text(first, source).to_string());
                }
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_import_names(child, source, names);
            }
        }
        "import_specifier" => {
            if let Some(n) = node.child_by_field_name("name") {
                names.push(node_text(n, source).to_string());
            } else if let Some(id) = node.named_child(0) {
                names.push(node_text(id, source).to_string());
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_import_names(child, source, names);
            }
        }
    }
}

// ---- calls ---------------------------------------------------------------

fn walk_calls(node: Node, source: &str, syntax: &LanguageSyntax, out: &mut Vec<RawCall>) {
    if node.kind() == syntax.call_kind {
        if let Some(call) = extract_call(node, source) {
            out.push(call);
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_calls(child, source, syntax, out);
    }
}

fn extract_call(node: Node, source: &str) -> Option<RawCall> {
    let function = node.child_by_field_name("function")?;
    let raw = node_text(function, source);
    let called_name = if raw.contains('.') {
        raw.rsplit('.').take(2).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join(".")
    } else {
        raw.to_string()
    };
    if SKIPPED_CALLS.contains(&called_name.as_str()) || called_name.len() >= 100 {
        return None;
    }
    let caller_name = enclosing_symbol_name(node, source)?;
    Some(RawCall {
        caller_name,
        called_name,
        line: node.start_position().row + 1,
    })
}

fn enclosing_symbol_name(node: Node, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            "function_declaration" | "function_definition" | "function_item" | "method_definition"
            | "method_declaration" | "class_declaration" | "class_definition" | "struct_item" => {
                if let Some(name) = n.child_by_field_name("name") {
                    return Some(node_text(name, source).to_string());
                }
            }
            "variable_declarator" => {
                if let Some(name) = n.child_by_field_name("name") {
                    return Some(node_text(name, source).to_string());
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = n.walk();
                for child in n.named_children(&mut cursor) {
                    if child.kind() == "variable_declarator" {
                        if let Some(name) = child.child_by_field_name("name") {
                            return Some(node_text(name, source).to_string());
                        }
                    }
                }
            }
            _ => {}
        }
        current = n.parent();
    }
    None
}
