use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::manager::{MemoryManager, Request, Response};
use crate::types::{Algorithm, ProcessId};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to access script file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("failed to encode results: {0}")]
    Json(#[from] serde_json::Error),
}

/// A parsed request together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub line: usize,
    pub text: String,
    pub request: Request,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepError {
    pub kind: &'static str,
    pub message: String,
}

/// Outcome of replaying one script line.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub line: usize,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Replay {
    pub results: Vec<StepResult>,
    pub failures: usize,
}

pub fn read_script<P: AsRef<Path>>(path: P) -> Result<Vec<ScriptLine>, ScriptError> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_script(&content)
}

/// Parse a workload script: one request per line, `#` starts a comment.
pub fn parse_script(content: &str) -> Result<Vec<ScriptLine>, ScriptError> {
    let mut lines = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let request = parse_request(&tokens)
            .map_err(|message| ScriptError::Syntax { line: index + 1, message })?;
        lines.push(ScriptLine { line: index + 1, text: text.to_string(), request });
    }
    Ok(lines)
}

fn parse_request(tokens: &[&str]) -> Result<Request, String> {
    let engine = tokens[0].to_ascii_lowercase();
    let command = tokens.get(1).map(|c| c.to_ascii_lowercase()).unwrap_or_default();
    let args = tokens.get(2..).unwrap_or(&[]);

    let request = match (engine.as_str(), command.as_str()) {
        ("paging", "configure") => {
            expect_args(args, 2, "paging configure <total_memory> <page_size>")?;
            Request::PagingConfigure {
                total_memory: number(args[0], "total_memory")?,
                page_size: number(args[1], "page_size")?,
            }
        }
        ("paging", "algorithm") => {
            expect_args(args, 1, "paging algorithm <FIFO|LRU>")?;
            Request::PagingAlgorithm { algorithm: algorithm(args[0])? }
        }
        ("paging", "allocate") => {
            expect_args(args, 2, "paging allocate <pid> <page>")?;
            Request::PagingAllocate { process_id: ProcessId::from(args[0]), page_number: number(args[1], "page")? }
        }
        ("paging", "allocate-pages") => {
            expect_args(args, 2, "paging allocate-pages <pid> <num_pages>")?;
            Request::PagingAllocatePages {
                process_id: ProcessId::from(args[0]),
                num_pages: number(args[1], "num_pages")?,
            }
        }
        ("paging", "access") => {
            expect_args(args, 2, "paging access <pid> <page>")?;
            Request::PagingAccess { process_id: ProcessId::from(args[0]), page_number: number(args[1], "page")? }
        }
        ("paging", "deallocate") => {
            expect_args(args, 1, "paging deallocate <pid>")?;
            Request::PagingDeallocate { process_id: ProcessId::from(args[0]) }
        }
        ("paging", "reset") => Request::PagingReset,
        ("paging", "show") => Request::PagingShow,

        ("segment", "configure") => {
            expect_args(args, 1, "segment configure <total_memory>")?;
            Request::SegmentConfigure { total_memory: number(args[0], "total_memory")? }
        }
        ("segment", "algorithm") => {
            expect_args(args, 1, "segment algorithm <FIFO|LRU>")?;
            Request::SegmentAlgorithm { algorithm: algorithm(args[0])? }
        }
        ("segment", "allocate") => {
            expect_args(args, 3, "segment allocate <pid> <segment> <size>")?;
            Request::SegmentAllocate {
                process_id: ProcessId::from(args[0]),
                segment_id: number(args[1], "segment")?,
                size: number(args[2], "size")?,
            }
        }
        ("segment", "touch") => {
            expect_args(args, 2, "segment touch <pid> <segment>")?;
            Request::SegmentTouch { process_id: ProcessId::from(args[0]), segment_id: number(args[1], "segment")? }
        }
        ("segment", "deallocate") => {
            expect_args(args, 2, "segment deallocate <pid> <segment>")?;
            Request::SegmentDeallocate {
                process_id: ProcessId::from(args[0]),
                segment_id: number(args[1], "segment")?,
            }
        }
        ("segment", "deallocate-process") => {
            expect_args(args, 1, "segment deallocate-process <pid>")?;
            Request::SegmentDeallocateProcess { process_id: ProcessId::from(args[0]) }
        }
        ("segment", "reset") => Request::SegmentReset,
        ("segment", "show") => Request::SegmentShow,

        ("vm", "configure") => {
            expect_args(args, 3, "vm configure <total_memory> <page_size> <swap_size>")?;
            Request::VmConfigure {
                total_memory: number(args[0], "total_memory")?,
                page_size: number(args[1], "page_size")?,
                swap_size: number(args[2], "swap_size")?,
            }
        }
        ("vm", "algorithm") => {
            expect_args(args, 1, "vm algorithm <FIFO|LRU>")?;
            Request::VmAlgorithm { algorithm: algorithm(args[0])? }
        }
        ("vm", "allocate") => {
            expect_args(args, 2, "vm allocate <pid> <num_pages>")?;
            Request::VmAllocate { process_id: ProcessId::from(args[0]), num_pages: number(args[1], "num_pages")? }
        }
        ("vm", "access") => {
            expect_args(args, 2, "vm access <pid> <page>")?;
            Request::VmAccess { process_id: ProcessId::from(args[0]), page_number: number(args[1], "page")? }
        }
        ("vm", "deallocate") => {
            expect_args(args, 1, "vm deallocate <pid>")?;
            Request::VmDeallocate { process_id: ProcessId::from(args[0]) }
        }
        ("vm", "reset") => Request::VmReset,
        ("vm", "show") => Request::VmShow,

        ("paging" | "segment" | "vm", "") => return Err(format!("missing command after '{engine}'")),
        ("paging" | "segment" | "vm", other) => return Err(format!("unknown {engine} command: {other}")),
        (other, _) => return Err(format!("unknown engine: {other} (expected paging, segment or vm)")),
    };
    Ok(request)
}

fn expect_args(args: &[&str], count: usize, usage: &str) -> Result<(), String> {
    if args.len() != count {
        return Err(format!("expected {} argument(s), got {}; usage: {}", count, args.len(), usage));
    }
    Ok(())
}

fn number<T: std::str::FromStr>(token: &str, what: &str) -> Result<T, String> {
    token.parse().map_err(|_| format!("invalid {}: {}", what, token))
}

fn algorithm(token: &str) -> Result<Algorithm, String> {
    token.parse().map_err(|e: crate::error::SimError| e.to_string())
}

/// Replay `script` against `manager`.
///
/// Stops after the first failed request unless `keep_going` is set.
pub fn replay(manager: &MemoryManager, script: &[ScriptLine], keep_going: bool) -> Replay {
    let mut replay = Replay::default();
    for step in script {
        debug!(line = step.line, command = %step.text, "replaying");
        let (response, error) = match manager.handle(step.request.clone()) {
            Ok(response) => (Some(response), None),
            Err(e) => (None, Some(StepError { kind: e.kind(), message: e.to_string() })),
        };
        let failed = error.is_some();
        replay.results.push(StepResult { line: step.line, command: step.text.clone(), response, error });

        if failed {
            replay.failures += 1;
            if !keep_going {
                break;
            }
        }
    }
    info!(steps = replay.results.len(), failures = replay.failures, "replay finished");
    replay
}

/// Write results as pretty JSON to `path`, or stdout when `None`.
pub fn write_results<P: AsRef<Path>, T: Serialize>(path: Option<P>, results: &T) -> Result<(), ScriptError> {
    let content = serde_json::to_string_pretty(results)?;
    match path {
        Some(path) => fs::write(path.as_ref(), content)?,
        None => println!("{}", content),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    #[test]
    fn test_parse_script_skips_comments_and_blanks() {
        let script = "# warm-up\n\npaging configure 4 1\n  paging allocate-pages P1 4  # fill\npaging show\n";
        let lines = parse_script(script).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line, 3);
        assert_eq!(lines[0].request, Request::PagingConfigure { total_memory: 4, page_size: 1 });
        assert_eq!(lines[1].text, "paging allocate-pages P1 4");
        assert_eq!(lines[2].request, Request::PagingShow);
    }

    #[test]
    fn test_parse_every_engine() {
        let script = "\
            PAGING algorithm lru\n\
            segment allocate P1 2 16\n\
            segment touch P1 2\n\
            segment deallocate-process P1\n\
            vm configure 4 1 8\n\
            vm access 7 0\n";
        let lines = parse_script(script).unwrap();
        assert_eq!(lines[0].request, Request::PagingAlgorithm { algorithm: Algorithm::Lru });
        assert_eq!(
            lines[1].request,
            Request::SegmentAllocate { process_id: "P1".into(), segment_id: 2, size: 16 }
        );
        assert_eq!(lines[2].request, Request::SegmentTouch { process_id: "P1".into(), segment_id: 2 });
        assert_eq!(lines[3].request, Request::SegmentDeallocateProcess { process_id: "P1".into() });
        assert_eq!(lines[4].request, Request::VmConfigure { total_memory: 4, page_size: 1, swap_size: 8 });
        // numeric process ids stay opaque text
        assert_eq!(lines[5].request, Request::VmAccess { process_id: ProcessId::from(7u64), page_number: 0 });
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = parse_script("paging show\nvm allocate P1\n").unwrap_err();
        match err {
            ScriptError::Syntax { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("usage"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(parse_script("disk format"), Err(ScriptError::Syntax { line: 1, .. })));
        assert!(matches!(parse_script("vm"), Err(ScriptError::Syntax { line: 1, .. })));
        assert!(matches!(parse_script("vm allocate P1 -2"), Err(ScriptError::Syntax { .. })));
        assert!(matches!(parse_script("paging algorithm clock"), Err(ScriptError::Syntax { .. })));
    }

    #[test]
    fn test_replay_stops_on_first_error() {
        let manager = MemoryManager::new(&SimConfig::default()).unwrap();
        let script = parse_script("vm access P1 0\nvm allocate P1 1\n").unwrap();

        let replay = replay(&manager, &script, false);
        assert_eq!(replay.failures, 1);
        assert_eq!(replay.results.len(), 1);
        assert_eq!(replay.results[0].error.as_ref().unwrap().kind, "ProcessNotFound");
    }

    #[test]
    fn test_replay_keep_going() {
        let manager = MemoryManager::new(&SimConfig::default()).unwrap();
        let script = parse_script("vm access P1 0\nvm allocate P1 1\nvm access P1 0\n").unwrap();

        let replay = replay(&manager, &script, true);
        assert_eq!(replay.failures, 1);
        assert_eq!(replay.results.len(), 3);
        assert!(replay.results[2].response.is_some());
        assert_eq!(manager.virtual_memory().page_faults(), 1);
    }

    #[test]
    fn test_write_results_to_file() {
        let path = std::env::temp_dir().join(format!("memsim-results-{}.json", std::process::id()));
        let manager = MemoryManager::new(&SimConfig::default()).unwrap();
        let script = parse_script("segment allocate P1 0 4\nsegment show\n").unwrap();
        let replay = replay(&manager, &script, false);

        write_results(Some(&path), &replay).unwrap();
        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["failures"], 0);
        assert_eq!(written["results"][1]["response"]["kind"], "segmentation");
        assert_eq!(written["results"][1]["response"]["free_blocks"][0]["base"], 4);
        fs::remove_file(&path).unwrap();
    }
}
