//! Heuristic source-file scanner.
//!
//! Last-resort fallback, run only when DWARF is absent/disabled and no
//! other strategy found source files. Scans a bounded
//! window for printable runs ending in a known source extension.
//!
//! this crate picks one documented
//! policy — a 16 MiB scan window and a fixed extension whitelist — rather
//! than varying it by build flag.

use std::collections::BTreeSet;

/// Default byte window scanned from the start of the file.
pub const DEFAULT_SCAN_WINDOW: usize = 16 * 1024 * 1024;

const EXTENSIONS: &[&str] = &[
    ".c", ".cc", ".cpp", ".cxx", ".h", ".hpp", ".rs", ".go", ".ada", ".adb", ".ads", ".swift",
    ".m", ".mm",
];

const MIN_RUN_LEN: usize = 4;

/// Scans `bytes` (capped to `window`) for printable-ASCII runs that look
/// like a source file path, marking each with the heuristic-origin
/// property at the call site (this crate returns only the paths).
pub fn scan(bytes: &[u8], window: usize) -> BTreeSet<String> {
    let capped = &bytes[..bytes.len().min(window)];
    if bytes.len() > window {
        tracing::debug!(file_len = bytes.len(), window, "heuristic scan window truncated");
    }

    let mut found = BTreeSet::new();
    let mut run_start = None;

    for (i, &b) in capped.iter().enumerate() {
        let printable = (0x20..=0x7e).contains(&b);
        if printable {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            check_run(capped, start, i, &mut found);
        }
    }
    if let Some(start) = run_start {
        check_run(capped, start, capped.len(), &mut found);
    }

    found
}

fn check_run(bytes: &[u8], start: usize, end: usize, found: &mut BTreeSet<String>) {
    if end - start < MIN_RUN_LEN {
        return;
    }
    let run = match std::str::from_utf8(&bytes[start..end]) {
        Ok(s) => s,
        Err(_) => return,
    };
    if EXTENSIONS.iter().any(|ext| run.ends_with(ext)) {
        found.insert(run.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_embedded_source_paths() {
        let mut data = b"\x00\x00\x00".to_vec();
        data.extend_from_slice(b"/usr/src/foo/bar.c");
        data.push(0);
        data.extend_from_slice(b"binary garbage not a path");

        let found = scan(&data, DEFAULT_SCAN_WINDOW);
        assert!(found.contains("/usr/src/foo/bar.c"));
    }

    #[test]
    fn ignores_runs_without_known_extension() {
        let data = b"this printable run has no source extension at all".to_vec();
        let found = scan(&data, DEFAULT_SCAN_WINDOW);
        assert!(found.is_empty());
    }

    #[test]
    fn respects_scan_window() {
        let mut data = vec![b'.'; 100];
        data.extend_from_slice(b"late.rs");
        let found = scan(&data, 50);
        assert!(found.is_empty());
    }
}
