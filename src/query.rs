//! The ten query operators, each reading from an open [`Store`] handle and
//! returning plain owned records (no references into the store).

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use crate::store::{SearchHit, Store, SymbolRow, SymbolWithFile};

/// A symbol summary shared by most operators (everything but `search`,
/// which additionally carries a highlight snippet).
#[derive(Debug, Clone, Serialize)]
pub struct SymbolSummary {
    pub name: String,
    pub qualified_name: Option<String>,
    pub kind: String,
    pub file: String,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: Option<String>,
    pub exported: bool,
    pub rank: f64,
}

impl From<SymbolWithFile> for SymbolSummary {
    fn from(value: SymbolWithFile) -> Self {
        Self {
            name: value.symbol.name,
            qualified_name: value.symbol.qualified_name,
            kind: value.symbol.kind,
            file: value.file_path,
            start_line: value.symbol.start_line,
            end_line: value.symbol.end_line,
            signature: value.symbol.signature,
            exported: value.symbol.exported,
            rank: value.rank,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub summary: SymbolSummary,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextResult {
    #[serde(flatten)]
    pub summary: SymbolSummary,
    pub body: Option<String>,
    pub docstring: Option<String>,
    pub dependencies: Vec<SymbolSummary>,
    pub dependents: Vec<SymbolSummary>,
    pub siblings: Vec<SymbolSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactEntry {
    pub file: String,
    pub depth: usize,
    pub symbol_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub file_count: usize,
    pub symbol_count: i64,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub files: i64,
    pub symbols: i64,
    pub edges: i64,
    pub file_deps: i64,
}

/// Tokenize `q`: replace non-word non-space characters with spaces, split
/// on whitespace, wrap each token in quotes, join with ` OR `.
fn build_fts_query(q: &str) -> String {
    let cleaned: String = q
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() || c == '_' { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub fn search(store: &Store, q: &str, limit: usize) -> Result<Vec<SearchResult>> {
    if q.trim().is_empty() {
        return Ok(Vec::new());
    }
    let fts_query = build_fts_query(q);
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }
    let hits = store.search(&fts_query, limit)?;
    Ok(hits.into_iter().map(search_result_from).collect())
}

fn search_result_from(hit: SearchHit) -> SearchResult {
    let rank = hit.rank;
    let file = hit.file_path;
    let symbol = hit.symbol;
    SearchResult {
        summary: SymbolSummary {
            name: symbol.name,
            qualified_name: symbol.qualified_name,
            kind: symbol.kind,
            file,
            start_line: symbol.start_line,
            end_line: symbol.end_line,
            signature: symbol.signature,
            exported: symbol.exported,
            rank,
        },
        snippet: hit.snippet,
    }
}

pub fn callers(store: &Store, name: &str) -> Result<Vec<SymbolSummary>> {
    Ok(store.callers_of(name)?.into_iter().map(SymbolSummary::from).collect())
}

pub fn dependencies(store: &Store, name: &str) -> Result<Vec<SymbolSummary>> {
    Ok(store.dependencies_of(name)?.into_iter().map(SymbolSummary::from).collect())
}

pub fn context(store: &Store, name: &str) -> Result<Option<ContextResult>> {
    let mut matches = store.symbols_matching_name(name)?;
    if matches.is_empty() {
        return Ok(None);
    }
    matches.sort_by(|a, b| {
        b.symbol
            .exported
            .cmp(&a.symbol.exported)
            .then(b.rank.partial_cmp(&a.rank).unwrap_or(std::cmp::Ordering::Equal))
    });
    let chosen = matches.into_iter().next().unwrap();
    let symbol_id = chosen.symbol.id;
    let file_id = chosen.symbol.file_id;

    let dependencies = store
        .dependencies_of_symbol(symbol_id)?
        .into_iter()
        .map(SymbolSummary::from)
        .collect();
    let dependents = store
        .dependents_of_symbol(symbol_id)?
        .into_iter()
        .map(SymbolSummary::from)
        .collect();
    let siblings = store
        .symbols_in_file(file_id)?
        .into_iter()
        .filter(|s| s.id != symbol_id)
        .map(|s| symbol_summary_for_row(s, &chosen.file_path, store))
        .collect::<Result<Vec<_>>>()?;

    let body = chosen.symbol.body.clone();
    let docstring = chosen.symbol.docstring.clone();
    Ok(Some(ContextResult {
        summary: SymbolSummary::from(chosen),
        body,
        docstring,
        dependencies,
        dependents,
        siblings,
    }))
}

fn symbol_summary_for_row(row: SymbolRow, file_path: &str, store: &Store) -> Result<SymbolSummary> {
    let rank = store.rank_of(row.id)?;
    Ok(SymbolSummary {
        name: row.name,
        qualified_name: row.qualified_name,
        kind: row.kind,
        file: file_path.to_string(),
        start_line: row.start_line,
        end_line: row.end_line,
        signature: row.signature,
        exported: row.exported,
        rank,
    })
}

/// Breadth-first reverse traversal of the FileDep graph: files that
/// (transitively) import `file`, layered by minimum hop distance.
pub fn impact(store: &Store, file: &str, max_depth: usize) -> Result<Vec<ImpactEntry>> {
    let Some(target_id) = store.file_id_for_path(file)? else {
        return Ok(Vec::new());
    };

    let all_deps = store.all_file_deps()?;
    let mut dependents_of: HashMap<i64, Vec<i64>> = HashMap::new();
    for dep in &all_deps {
        dependents_of.entry(dep.to_file_id).or_default().push(dep.from_file_id);
    }

    let mut depth_of: HashMap<i64, usize> = HashMap::new();
    let mut queue: VecDeque<(i64, usize)> = VecDeque::new();
    queue.push_back((target_id, 0));
    let mut visited: HashSet<i64> = HashSet::new();
    visited.insert(target_id);

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(parents) = dependents_of.get(&current) else {
            continue;
        };
        for &parent in parents {
            if visited.insert(parent) {
                depth_of.insert(parent, depth + 1);
                queue.push_back((parent, depth + 1));
            }
        }
    }

    let files = store.all_files()?;
    let mut entries = Vec::new();
    for (file_id, depth) in depth_of {
        let Some(row) = files.iter().find(|f| f.id == file_id) else {
            continue;
        };
        let symbol_count = store.symbol_count_for_file(file_id)?;
        entries.push(ImpactEntry {
            file: row.path.clone(),
            depth,
            symbol_count,
        });
    }
    entries.sort_by(|a, b| a.depth.cmp(&b.depth).then(b.symbol_count.cmp(&a.symbol_count)));
    Ok(entries)
}

pub fn rank(store: &Store, top: usize) -> Result<Vec<SymbolSummary>> {
    Ok(store.top_ranked(top)?.into_iter().map(SymbolSummary::from).collect())
}

pub fn modules(store: &Store) -> Result<Vec<ModuleSummary>> {
    let files = store.all_files()?;
    let deps = store.all_file_deps()?;

    let partition_of = |path: &str| -> String {
        match path.split_once('/') {
            Some((first, _)) => first.to_string(),
            None => ".".to_string(),
        }
    };

    let mut files_by_partition: HashMap<String, Vec<i64>> = HashMap::new();
    let mut partition_of_file: HashMap<i64, String> = HashMap::new();
    for file in &files {
        let partition = partition_of(&file.path);
        files_by_partition.entry(partition.clone()).or_default().push(file.id);
        partition_of_file.insert(file.id, partition);
    }

    let mut summaries = Vec::new();
    for (partition, file_ids) in &files_by_partition {
        let mut symbol_count = 0;
        let mut depends_on: HashSet<String> = HashSet::new();
        for &file_id in file_ids {
            symbol_count += store.symbol_count_for_file(file_id)?;
        }
        for dep in &deps {
            let Some(from_partition) = partition_of_file.get(&dep.from_file_id) else {
                continue;
            };
            if from_partition != partition {
                continue;
            }
            if let Some(to_partition) = partition_of_file.get(&dep.to_file_id) {
                if to_partition != partition {
                    depends_on.insert(to_partition.clone());
                }
            }
        }
        let mut depends_on: Vec<String> = depends_on.into_iter().collect();
        depends_on.sort();
        summaries.push(ModuleSummary {
            name: partition.clone(),
            file_count: file_ids.len(),
            symbol_count,
            depends_on,
        });
    }
    summaries.sort_by(|a, b| b.symbol_count.cmp(&a.symbol_count));
    Ok(summaries)
}

pub fn stats(store: &Store) -> Result<Stats> {
    let (files, symbols, edges, file_deps) = store.stats()?;
    Ok(Stats {
        files,
        symbols,
        edges,
        file_deps,
    })
}

pub fn brief(store: &Store) -> Result<String> {
    let stats = stats(store)?;
    let histogram = store.language_histogram()?;
    let top_modules = modules(store)?;
    let top_symbols = rank(store, 10)?;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} files, {} symbols, {} edges, {} file deps",
        stats.files, stats.symbols, stats.edges, stats.file_deps
    );
    if !histogram.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Languages:");
        for (language, count) in &histogram {
            let _ = writeln!(out, "  {language}: {count}");
        }
    }
    if !top_modules.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Top modules:");
        for module in top_modules.iter().take(8) {
            let _ = writeln!(
                out,
                "  {} ({} files, {} symbols)",
                module.name, module.file_count, module.symbol_count
            );
        }
    }
    if !top_symbols.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Top symbols:");
        for symbol in top_symbols.iter().take(10) {
            let _ = writeln!(out, "  {} ({}) in {}", symbol.name, symbol.kind, symbol.file);
        }
    }
    Ok(out)
}

pub fn pre_edit(store: &Store, file: &str) -> Result<String> {
    let mut out = String::new();
    let Some(file_row) = store.file_by_path(file)? else {
        let _ = writeln!(out, "{file} is not indexed");
        return Ok(out);
    };

    let symbols = store.symbols_in_file(file_row.id)?;
    let exported: Vec<&SymbolRow> = symbols.iter().filter(|s| s.exported).collect();
    let _ = writeln!(out, "Exported symbols in {file}:");
    if exported.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for symbol in &exported {
        let _ = writeln!(out, "  {} ({}) [{}-{}]", symbol.name, symbol.kind, symbol.start_line, symbol.end_line);
    }

    let dependents = store.file_deps_to(file_row.id)?;
    let files = store.all_files()?;
    let path_of = |id: i64| files.iter().find(|f| f.id == id).map(|f| f.path.clone());
    let mut dependent_paths: Vec<String> = dependents.iter().filter_map(|d| path_of(d.from_file_id)).collect();
    dependent_paths.sort();
    dependent_paths.dedup();
    let _ = writeln!(out);
    let _ = writeln!(out, "Depended on by {} file(s):", dependent_paths.len());
    for path in dependent_paths.iter().take(15) {
        let _ = writeln!(out, "  {path}");
    }
    if dependent_paths.len() > 15 {
        let _ = writeln!(out, "  ... and {} more", dependent_paths.len() - 15);
    }

    let dependencies = store.file_deps_from(file_row.id)?;
    let _ = writeln!(out);
    let _ = writeln!(out, "Imports:");
    if dependencies.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for dep in &dependencies {
        if let Some(path) = path_of(dep.to_file_id) {
            let _ = writeln!(out, "  {path} ({})", dep.name);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_fts_query_wraps_tokens_with_or() {
        assert_eq!(build_fts_query("hello world"), "\"hello\" OR \"world\"");
    }

    #[test]
    fn build_fts_query_strips_punctuation() {
        assert_eq!(build_fts_query("foo.bar()"), "\"foo\" OR \"bar\"");
    }

    #[test]
    fn search_of_empty_query_is_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(search(&store, "", 15).unwrap().is_empty());
        assert!(search(&store, "   ", 15).unwrap().is_empty());
    }

    #[test]
    fn context_of_missing_symbol_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(context(&store, "nope").unwrap().is_none());
    }

    #[test]
    fn stats_of_empty_store_is_all_zero() {
        let store = Store::open_in_memory().unwrap();
        let s = stats(&store).unwrap();
        assert_eq!((s.files, s.symbols, s.edges, s.file_deps), (0, 0, 0, 0));
    }
}
