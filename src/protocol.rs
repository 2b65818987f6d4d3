//! Line-delimited request/response tool protocol over stdin/stdout.
//!
//! Each line in is a JSON object `{"id", "tool", "args"}`; each line out is
//! `{"id", "ok": true, "result"}` or `{"id", "ok": false, "error"}`.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::indexer;
use crate::query;
use crate::store::Store;

#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ToolResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_IMPACT_DEPTH: usize = 5;

/// Run the tool-protocol server, reading requests from stdin and writing
/// responses to stdout until stdin closes.
pub fn serve(root: &Path, store: &Store) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request: ToolRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response = ToolResponse::err(Value::Null, format!("parse error: {e}"));
                write_response(&mut stdout, &response)?;
                continue;
            }
        };

        let start = Instant::now();
        let tool = request.tool.clone();
        let response = match dispatch(root, store, &request.tool, &request.args) {
            Ok(result) => ToolResponse::ok(request.id, result),
            Err(e) => ToolResponse::err(request.id, e.to_string()),
        };
        eprintln!("{tool} completed in {}ms", start.elapsed().as_millis());
        write_response(&mut stdout, &response)?;
    }

    Ok(())
}

fn write_response(stdout: &mut io::Stdout, response: &ToolResponse) -> Result<()> {
    let json = serde_json::to_string(response)?;
    writeln!(stdout, "{json}")?;
    stdout.flush()?;
    Ok(())
}

fn dispatch(root: &Path, store: &Store, tool: &str, args: &Value) -> Result<Value> {
    debug!("dispatching tool {tool}");
    match tool {
        "search_code" => {
            let q = str_arg(args, "query")?;
            let limit = usize_arg(args, "limit").unwrap_or(DEFAULT_SEARCH_LIMIT);
            Ok(json!(query::search(store, q, limit)?))
        }
        "get_symbol" => {
            let name = str_arg(args, "name")?;
            match query::context(store, name)? {
                Some(result) => Ok(json!(result)),
                None => Ok(json!({ "message": format!("no symbol named '{name}' found") })),
            }
        }
        "get_callers" => {
            let name = str_arg(args, "name")?;
            Ok(json!(query::callers(store, name)?))
        }
        "get_dependents" => {
            let name = str_arg(args, "name")?;
            Ok(json!(query::callers(store, name)?))
        }
        "get_dependencies" => {
            let name = str_arg(args, "name")?;
            Ok(json!(query::dependencies(store, name)?))
        }
        "get_architecture" => {
            let depth = usize_arg(args, "max_depth").unwrap_or(DEFAULT_IMPACT_DEPTH);
            if let Some(file) = args.get("file").and_then(Value::as_str) {
                Ok(json!(query::impact(store, file, depth)?))
            } else {
                Ok(json!(query::modules(store)?))
            }
        }
        "reindex_file" => {
            let rel = str_arg(args, "path")?;
            indexer::reindex_file(root, store, rel)?;
            Ok(json!({ "reindexed": rel }))
        }
        other => Err(anyhow!("unknown tool: {other}")),
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing '{key}' argument"))
}

fn usize_arg(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unknown_tool_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let root = tempdir().unwrap();
        let err = dispatch(root.path(), &store, "not_a_tool", &json!({})).unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[test]
    fn search_code_with_missing_query_errors() {
        let store = Store::open_in_memory().unwrap();
        let root = tempdir().unwrap();
        let err = dispatch(root.path(), &store, "search_code", &json!({})).unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn get_symbol_missing_yields_friendly_payload() {
        let store = Store::open_in_memory().unwrap();
        let root = tempdir().unwrap();
        let result = dispatch(root.path(), &store, "get_symbol", &json!({"name": "missing"}))
            .unwrap();
        assert!(result.get("message").is_some());
    }
}
