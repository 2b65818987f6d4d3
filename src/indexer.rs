//! Orchestrates the collector, parser, resolver and store into the two
//! public re-index entry points, plus the PageRank pass that follows a
//! full index.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::collector;
use crate::parser::{self, GrammarRegistry, RawSymbol};
use crate::resolver;
use crate::store::{NewCall, NewSymbol, ResolvedImport, Store};

/// Summary of a full re-index, returned to the CLI as JSON.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexSummary {
    pub files_total: usize,
    pub files_changed: usize,
    pub files_skipped: usize,
    pub symbols_found: usize,
    pub duration_secs: f64,
}

/// A changed file, carrying its raw imports resolved to candidate target
/// paths on disk. Target file ids aren't known yet at this point — on a
/// fresh index the importee may not have a file row until every path has
/// been processed in the first pass.
struct ChangedFile {
    file_id: i64,
    imports: Vec<(String, Vec<String>)>,
}

fn to_new_symbol(s: &RawSymbol) -> NewSymbol<'_> {
    NewSymbol {
        name: &s.name,
        qualified_name: s.qualified_name.as_deref(),
        kind: s.kind,
        start_line: s.start_line as i64,
        end_line: s.end_line as i64,
        signature: s.signature.as_deref(),
        docstring: s.docstring.as_deref(),
        body: s.body.as_deref(),
        exported: s.exported,
    }
}

/// Full re-index of `root`: collect, parse changed files, resolve
/// in-tree imports, emit intra-file `calls` edges, prune stale files,
/// run the cross-file `references` pass, then recompute PageRank.
///
/// Import resolution happens in a second pass, after every path has gone
/// through the first: on a fresh index an importer's path can sort ahead
/// of its importee's, so the importee's file row may not exist yet while
/// the first pass is still running.
pub fn index_project(root: &Path, store: &Store) -> Result<IndexSummary> {
    let start = Instant::now();
    let paths = collector::collect(root)?;
    let files_total = paths.len();
    info!("collected {files_total} files under {}", root.display());

    let registry = GrammarRegistry::new();
    let mut files_changed = 0usize;
    let mut files_skipped = 0usize;
    let mut symbols_found = 0usize;

    let mut exported_by_file: HashMap<i64, HashMap<String, i64>> = HashMap::new();
    let mut changed_files: Vec<ChangedFile> = Vec::new();

    for rel_path in &paths {
        let abs = root.join(rel_path);
        let bytes = match fs::read(&abs) {
            Ok(b) => b,
            Err(err) => {
                warn!("skipping unreadable file {rel_path}: {err}");
                files_skipped += 1;
                continue;
            }
        };
        let digest = digest_hex(&bytes);

        let existing = store.file_by_path(rel_path)?;
        let unchanged = existing.as_ref().is_some_and(|f| f.digest == digest);
        if unchanged {
            let file_id = existing.expect("checked above").id;
            exported_by_file.insert(file_id, store.exported_symbol_table_for_file(file_id)?);
            debug!("unchanged: {rel_path}");
            continue;
        }

        let content = String::from_utf8_lossy(&bytes);
        let ext = Path::new(rel_path).extension().and_then(|e| e.to_str()).unwrap_or("");
        let language = parser::language_for_extension(ext);
        let line_count = content.lines().count() as i64;

        let parsed = parser::parse(&registry, rel_path, &content);
        symbols_found += parsed.symbols.len();

        let new_symbols: Vec<NewSymbol> = parsed.symbols.iter().map(to_new_symbol).collect();
        let new_calls: Vec<NewCall> = parsed
            .calls
            .iter()
            .map(|c| NewCall {
                caller_name: &c.caller_name,
                called_name: &c.called_name,
            })
            .collect();

        let result = store.index_file(rel_path, language, &digest, line_count, &new_symbols, &new_calls, &[])?;
        files_changed += 1;

        exported_by_file.insert(result.file_id, store.exported_symbol_table_for_file(result.file_id)?);

        let imports = parsed
            .imports
            .iter()
            .filter_map(|import| {
                resolver::resolve(root, rel_path, &import.source).map(|target| (target, import.names.clone()))
            })
            .collect();

        changed_files.push(ChangedFile {
            file_id: result.file_id,
            imports,
        });
    }

    let valid: HashSet<String> = paths.into_iter().collect();
    store.remove_stale(&valid)?;

    // Second pass: every file row now exists, so imports can be resolved
    // into FileDeps and the cross-file `references` edges can follow.
    for changed in &changed_files {
        let resolved: Vec<ResolvedImport> = changed
            .imports
            .iter()
            .map(|(target, names)| ResolvedImport {
                target_path: target,
                names,
            })
            .collect();
        let deps = store.index_file_deps(changed.file_id, &resolved)?;

        let importer_symbols = store.symbol_ids_for_file(changed.file_id)?;
        for dep in &deps {
            let Some(target_table) = exported_by_file.get(&dep.target_file_id) else {
                continue;
            };
            for name in &dep.names {
                let Some(&target_symbol_id) = target_table.get(name) else {
                    continue;
                };
                for &symbol_id in &importer_symbols {
                    store.insert_edge(symbol_id, target_symbol_id, "references")?;
                }
            }
        }
    }

    recompute_rankings(store)?;

    let duration_secs = start.elapsed().as_secs_f64();
    info!(
        "index complete: {files_changed}/{files_total} changed, {symbols_found} symbols, {duration_secs:.2}s"
    );

    Ok(IndexSummary {
        files_total,
        files_changed,
        files_skipped,
        symbols_found,
        duration_secs,
    })
}

/// Single-file incremental re-index. Runs steps 2-3 of a full index for
/// `rel` alone, atomically, then returns; does not prune stale files,
/// resolve cross-file `references`, or recompute PageRank.
pub fn reindex_file(root: &Path, store: &Store, rel: &str) -> Result<()> {
    let abs = root.join(rel);
    if !abs.is_file() {
        store.remove_file(rel)?;
        return Ok(());
    }

    let bytes = fs::read(&abs).with_context(|| format!("reading {}", abs.display()))?;
    let digest = digest_hex(&bytes);

    if let Some(existing) = store.file_by_path(rel)? {
        if existing.digest == digest {
            return Ok(());
        }
    }

    let content = String::from_utf8_lossy(&bytes);
    let ext = Path::new(rel).extension().and_then(|e| e.to_str()).unwrap_or("");
    let language = parser::language_for_extension(ext);
    let line_count = content.lines().count() as i64;

    let registry = GrammarRegistry::new();
    let parsed = parser::parse(&registry, rel, &content);

    let new_symbols: Vec<NewSymbol> = parsed.symbols.iter().map(to_new_symbol).collect();
    let new_calls: Vec<NewCall> = parsed
        .calls
        .iter()
        .map(|c| NewCall {
            caller_name: &c.caller_name,
            called_name: &c.called_name,
        })
        .collect();

    let resolved_targets: Vec<(String, Vec<String>)> = parsed
        .imports
        .iter()
        .filter_map(|import| resolver::resolve(root, rel, &import.source).map(|target| (target, import.names.clone())))
        .collect();
    let resolved_imports: Vec<ResolvedImport> = resolved_targets
        .iter()
        .map(|(target, names)| ResolvedImport {
            target_path: target,
            names,
        })
        .collect();

    store.index_file(rel, language, &digest, line_count, &new_symbols, &new_calls, &resolved_imports)?;

    Ok(())
}

/// PageRank over the full Symbol/Edge graph: damping 0.85, 20 power
/// iterations, dangling nodes redistributed uniformly.
fn recompute_rankings(store: &Store) -> Result<()> {
    let (ids, edges) = store.full_graph()?;
    let rankings = pagerank(&ids, &edges);
    store.replace_rankings(&rankings)?;
    Ok(())
}

const DAMPING: f64 = 0.85;
const ITERATIONS: usize = 20;

fn pagerank(ids: &[i64], edges: &[(i64, i64)]) -> Vec<(i64, f64, i64, i64)> {
    let n = ids.len();
    if n == 0 {
        return Vec::new();
    }

    let mut index_of: HashMap<i64, usize> = HashMap::with_capacity(n);
    for (i, &id) in ids.iter().enumerate() {
        index_of.insert(id, i);
    }

    let mut out_adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0i64; n];
    let mut out_degree = vec![0i64; n];
    for &(from, to) in edges {
        let (Some(&fi), Some(&ti)) = (index_of.get(&from), index_of.get(&to)) else {
            continue;
        };
        out_adj[fi].push(ti);
        out_degree[fi] += 1;
        in_degree[ti] += 1;
    }

    let mut rank = vec![1.0 / n as f64; n];
    for _ in 0..ITERATIONS {
        let mut next = vec![(1.0 - DAMPING) / n as f64; n];
        let mut dangling_mass = 0.0;
        for i in 0..n {
            if out_degree[i] > 0 {
                let share = DAMPING * rank[i] / out_degree[i] as f64;
                for &j in &out_adj[i] {
                    next[j] += share;
                }
            } else {
                dangling_mass += DAMPING * rank[i] / n as f64;
            }
        }
        if dangling_mass > 0.0 {
            for v in next.iter_mut() {
                *v += dangling_mass;
            }
        }
        rank = next;
    }

    ids.iter()
        .enumerate()
        .map(|(i, &id)| (id, rank[i], in_degree[i], out_degree[i]))
        .collect()
}

fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let full = hasher.finalize();
    full.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pagerank_of_a_cycle_is_uniform() {
        let ids: Vec<i64> = (0..10).collect();
        let edges: Vec<(i64, i64)> = (0..10).map(|i| (i, (i + 1) % 10)).collect();
        let rankings = pagerank(&ids, &edges);
        for (_, rank, _, _) in &rankings {
            assert!((rank - 0.1).abs() < 1e-6, "rank {rank} not close to 0.1");
        }
    }

    #[test]
    fn pagerank_mass_is_conserved() {
        let ids: Vec<i64> = (0..5).collect();
        let edges = vec![(0, 1), (1, 2), (2, 0), (3, 0)];
        let rankings = pagerank(&ids, &edges);
        let total: f64 = rankings.iter().map(|(_, r, _, _)| r).sum();
        assert!((total - 1.0).abs() < 1e-6, "total {total} not close to 1.0");
    }

    #[test]
    fn empty_graph_produces_no_rankings() {
        assert!(pagerank(&[], &[]).is_empty());
    }

    #[test]
    fn digest_is_sixteen_hex_chars() {
        let digest = digest_hex(b"hello world");
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn indexing_twice_touches_nothing_on_second_pass() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("a.ts"),
            "export function foo() { bar(); }\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("b.ts"), "export function bar() {}\n").unwrap();

        let store = Store::open(temp.path()).unwrap();
        let first = index_project(temp.path(), &store).unwrap();
        assert_eq!(first.files_changed, 2);

        let second = index_project(temp.path(), &store).unwrap();
        assert_eq!(second.files_changed, 0);
    }

    #[test]
    fn cross_file_reference_edge_appears_after_import() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("a.ts"),
            "import { bar } from './b';\nexport function foo() { bar(); }\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("b.ts"), "export function bar() {}\n").unwrap();

        let store = Store::open(temp.path()).unwrap();
        index_project(temp.path(), &store).unwrap();

        let callers = store.callers_of("bar").unwrap();
        assert!(callers.iter().any(|c| c.symbol.name == "foo"));
    }
}
