//! Multi-language syntactic extraction.
//!
//! Language detection is by extension. Each supported language is
//! described by a [`languages::LanguageSyntax`] table consumed by the
//! single generic tree-sitter walker in [`extract`]; there is no
//! per-language traversal function. A lazily-populated grammar registry
//! caches failed loads as `Absent` so a missing grammar is never retried
//! on every file.

pub mod extract;
pub mod languages;

use std::cell::RefCell;
use std::collections::HashMap;

use tree_sitter::Language;

/// One extracted symbol, prior to being assigned a Store identity.
#[derive(Debug, Clone)]
pub struct RawSymbol {
    pub name: String,
    pub qualified_name: Option<String>,
    pub kind: &'static str,
    pub start_line: usize,
    pub end_line: usize,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub body: Option<String>,
    pub exported: bool,
}

/// One extracted import: a source specifier plus the identifier names
/// bound by it (empty for a bare `import x` with no named bindings).
#[derive(Debug, Clone)]
pub struct RawImport {
    pub source: String,
    pub names: Vec<String>,
}

/// One extracted intra-file call: the enclosing symbol's name and the
/// called name, at the call's line.
#[derive(Debug, Clone)]
pub struct RawCall {
    pub caller_name: String,
    pub called_name: String,
    pub line: usize,
}

/// The result of parsing a single file.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub symbols: Vec<RawSymbol>,
    pub imports: Vec<RawImport>,
    pub calls: Vec<RawCall>,
    pub language: Option<String>,
}

/// Languages tracked for hashing/membership only; never handed to
/// tree-sitter.
const UNPARSED_EXTENSIONS: &[&str] = &["json", "css", "html", "htm"];

enum GrammarState {
    Loaded(Language),
    Absent,
}

/// Caches loaded tree-sitter grammars by language tag, recording failed
/// loads as `Absent` so they are not retried.
#[derive(Default)]
pub struct GrammarRegistry {
    grammars: RefCell<HashMap<&'static str, GrammarState>>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_load(&self, tag: &'static str) -> Option<Language> {
        let mut grammars = self.grammars.borrow_mut();
        let state = grammars
            .entry(tag)
            .or_insert_with(|| match languages::load_grammar(tag) {
                Some(language) => GrammarState::Loaded(language),
                None => GrammarState::Absent,
            });
        match state {
            GrammarState::Loaded(language) => Some(language.clone()),
            GrammarState::Absent => None,
        }
    }
}

/// Map a file extension to a language tag, or `None` for unrecognized
/// extensions.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    languages::tag_for_extension(ext)
}

/// Parse `content`, dispatching on `rel_path`'s extension. Returns an
/// empty result (with a `None` language) for unsupported/unrecognized
/// extensions, and an empty-but-language-tagged result for the
/// hash-only extensions (json/css/html). A grammar load failure or an
/// internal parser panic is swallowed into an empty result; a single
/// file's parse never fails the run.
pub fn parse(
    registry: &GrammarRegistry,
    rel_path: &str,
    content: &str,
) -> ParseResult {
    let ext = std::path::Path::new(rel_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    if UNPARSED_EXTENSIONS.contains(&ext) {
        return ParseResult {
            language: language_for_extension(ext).map(str::to_string),
            ..Default::default()
        };
    }

    let Some(tag) = language_for_extension(ext) else {
        return ParseResult::default();
    };

    let Some(language) = registry.get_or_load(tag) else {
        return ParseResult {
            language: Some(tag.to_string()),
            ..Default::default()
        };
    };

    let syntax = languages::syntax_for_tag(tag);
    let mut result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        extract::extract(&language, syntax, content)
    }))
    .unwrap_or_default();
    result.language = Some(tag.to_string());
    result
}
