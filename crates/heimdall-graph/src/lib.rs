//! Component/dependency graph builder.
//!
//! BFS over `needed` names starting from the root artifact, resolving each
//! name to a filesystem path via the platform's shared-library search order,
//! extracting every resolved path exactly once, then assembling a frozen
//! `Document`.

use heimdall_extract::{extract, CancelToken, ExtractConfig, ExtractError, Extracted};
use heimdall_lang::LanguageAdapter;
use heimdall_model::{Document, SbomSpec};
use heimdall_packages::PackageProbe;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("root artifact extraction failed: {0}")]
    RootExtraction(#[from] ExtractError),
}

/// Resolves a raw dependency name (e.g. `libssl.so.3`) to a filesystem path
/// using the platform's loader search order. A trait so BFS can be tested
/// against a fake search order instead of the real filesystem/environment.
pub trait LibrarySearch: Send + Sync {
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// Linux: `LD_LIBRARY_PATH`, then the caller-supplied DT_RUNPATH entries,
/// then a fixed set of standard directories (no `/etc/ld.so.cache` parsing —
/// this crate has no dependency on glibc's cache format, so the standard
/// directory list is the best-effort fallback).
pub struct LinuxSearch {
    pub runpath: Vec<PathBuf>,
}

impl LinuxSearch {
    pub fn from_env(runpath: Vec<PathBuf>) -> Self {
        Self { runpath }
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Ok(p) = std::env::var("LD_LIBRARY_PATH") {
            dirs.extend(std::env::split_paths(&p));
        }
        dirs.extend(self.runpath.iter().cloned());
        dirs.extend(
            ["/lib", "/usr/lib", "/lib64", "/usr/lib64", "/usr/local/lib"]
                .iter()
                .map(PathBuf::from),
        );
        dirs
    }
}

impl LibrarySearch for LinuxSearch {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs()
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|p| p.is_file())
    }
}

/// macOS: `DYLD_LIBRARY_PATH`, then rpaths, then standard frameworks/lib dirs.
pub struct MacosSearch {
    pub rpaths: Vec<PathBuf>,
}

impl MacosSearch {
    pub fn from_env(rpaths: Vec<PathBuf>) -> Self {
        Self { rpaths }
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Ok(p) = std::env::var("DYLD_LIBRARY_PATH") {
            dirs.extend(std::env::split_paths(&p));
        }
        dirs.extend(self.rpaths.iter().cloned());
        dirs.extend(
            ["/usr/lib", "/usr/local/lib", "/opt/homebrew/lib"]
                .iter()
                .map(PathBuf::from),
        );
        dirs
    }
}

impl LibrarySearch for MacosSearch {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs()
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|p| p.is_file())
    }
}

/// Windows: `PATH`, then the directory of the artifact itself, then the
/// standard system directories (a simplification of the full DLL search
/// order, which also depends on SafeDllSearchMode and the application
/// manifest — both outside what a static analyzer can observe).
pub struct WindowsSearch {
    pub app_dir: Option<PathBuf>,
}

impl WindowsSearch {
    pub fn from_env(app_dir: Option<PathBuf>) -> Self {
        Self { app_dir }
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        dirs.extend(self.app_dir.iter().cloned());
        if let Ok(p) = std::env::var("PATH") {
            dirs.extend(std::env::split_paths(&p));
        }
        dirs.extend(
            ["C:\\Windows\\System32", "C:\\Windows"]
                .iter()
                .map(PathBuf::from),
        );
        dirs
    }
}

impl LibrarySearch for WindowsSearch {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs()
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|p| p.is_file())
    }
}

pub struct GraphOptions<'a> {
    pub transitive: bool,
    pub ali_dir: Option<PathBuf>,
    pub extract_config: ExtractConfig,
    pub search: &'a dyn LibrarySearch,
    pub adapters: &'a [Box<dyn LanguageAdapter>],
}

/// Builds the full component/dependency graph rooted at `root_path`.
pub fn build(
    root_path: &Path,
    spec: SbomSpec,
    document_id: String,
    created_at: String,
    probe: &PackageProbe,
    options: &GraphOptions,
    cancel: &CancelToken,
) -> Result<Document, GraphError> {
    let mut document = Document::new(spec, document_id, created_at);
    let mut resolved_cache: HashMap<PathBuf, String> = HashMap::new();

    let root = extract(
        root_path,
        &options.extract_config,
        probe,
        options.adapters,
        options.ali_dir.as_deref(),
        cancel,
    )?;
    let Extracted { primary, extra } = root;
    let root_id = primary.id.clone();
    document.primary_component = Some(root_id.clone());
    resolved_cache.insert(
        PathBuf::from(&primary.file_path),
        primary.id.clone(),
    );
    let root_needed = primary.needed.clone();
    document.add_component(primary);
    for component in extra {
        document.add_component(component);
    }

    if !options.transitive {
        resolve_depth_one(
            &root_id,
            &root_needed,
            &mut document,
            &mut resolved_cache,
            probe,
            options,
            cancel,
        );
        document.freeze();
        return Ok(document);
    }

    let mut frontier: VecDeque<(String, Vec<String>)> = VecDeque::new();
    frontier.push_back((root_id, root_needed));
    let mut visiting: HashMap<String, String> = HashMap::new(); // id -> parent id, for cycle detection

    // Extraction of distinct artifacts is embarrassingly parallel;
    // assembly into `document` stays single-threaded. Each iteration below
    // drains the *entire* current BFS wave, resolves every name to a path
    // up front, extracts the not-yet-cached paths concurrently via rayon,
    // then folds the results back in BFS order so output stays deterministic.
    while !frontier.is_empty() {
        if cancel.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::warn!("graph build cancelled mid-BFS");
            break;
        }
        let wave: Vec<(String, Vec<String>)> = frontier.drain(..).collect();

        let mut resolutions: Vec<(String, String, Option<PathBuf>)> = Vec::new();
        let mut to_extract: Vec<PathBuf> = Vec::new();
        let mut seen_this_wave: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();

        for (from_id, needed_names) in &wave {
            for name in needed_names {
                let resolved = options
                    .search
                    .resolve(name)
                    .map(|p| p.canonicalize().unwrap_or(p));
                if let Some(p) = &resolved {
                    if !resolved_cache.contains_key(p) && seen_this_wave.insert(p.clone()) {
                        to_extract.push(p.clone());
                    }
                }
                resolutions.push((from_id.clone(), name.clone(), resolved));
            }
        }

        let extracted: Vec<(PathBuf, Result<Extracted, ExtractError>)> = to_extract
            .into_par_iter()
            .map(|path| {
                let result = extract(
                    &path,
                    &options.extract_config,
                    probe,
                    options.adapters,
                    options.ali_dir.as_deref(),
                    cancel,
                );
                (path, result)
            })
            .collect();

        for (path, result) in extracted {
            match result {
                Ok(Extracted { primary: dep, extra }) => {
                    let dep_id = dep.id.clone();
                    resolved_cache.insert(path, dep_id.clone());
                    let dep_needed = dep.needed.clone();
                    document.add_component(dep);
                    for component in extra {
                        document.add_component(component);
                    }
                    frontier.push_back((dep_id, dep_needed));
                }
                Err(err) => {
                    tracing::warn!(?err, path = %path.display(), "dependency extraction failed");
                }
            }
        }

        for (from_id, name, resolved) in resolutions {
            let Some(resolved_path) = resolved else {
                attach_unresolved(&mut document, &from_id, &name);
                continue;
            };
            let Some(dep_id) = resolved_cache.get(&resolved_path).cloned() else {
                // Extraction of this path failed in the parallel pass above.
                attach_unresolved(&mut document, &from_id, &name);
                continue;
            };
            if would_close_cycle(&visiting, &from_id, &dep_id) {
                document.add_component_property(
                    &from_id,
                    &format!("dep.cycle-broken.{name}"),
                    &dep_id,
                );
                continue;
            }
            visiting.entry(dep_id.clone()).or_insert_with(|| from_id.clone());
            document.add_edge(from_id.clone(), dep_id);
        }
    }

    document.freeze();
    Ok(document)
}

fn resolve_depth_one(
    root_id: &str,
    root_needed: &[String],
    document: &mut Document,
    resolved_cache: &mut HashMap<PathBuf, String>,
    probe: &PackageProbe,
    options: &GraphOptions,
    cancel: &CancelToken,
) {
    for name in root_needed {
        let Some(resolved_path) = options.search.resolve(name) else {
            attach_unresolved(document, root_id, name);
            continue;
        };
        let resolved_path = resolved_path.canonicalize().unwrap_or(resolved_path);
        if let Some(existing_id) = resolved_cache.get(&resolved_path) {
            document.add_edge(root_id.to_string(), existing_id.clone());
            continue;
        }
        match extract(
            &resolved_path,
            &options.extract_config,
            probe,
            options.adapters,
            options.ali_dir.as_deref(),
            cancel,
        ) {
            Ok(Extracted { primary, extra }) => {
                let dep_id = primary.id.clone();
                resolved_cache.insert(resolved_path, dep_id.clone());
                document.add_component(primary);
                for component in extra {
                    document.add_component(component);
                }
                document.add_edge(root_id.to_string(), dep_id);
            }
            Err(err) => {
                tracing::warn!(%name, ?err, "dependency extraction failed, recording as unresolved");
                attach_unresolved(document, root_id, name);
            }
        }
    }
}

fn attach_unresolved(document: &mut Document, component_id: &str, name: &str) {
    document.add_component_property(component_id, &format!("dep.unresolved.{name}"), "true");
}

/// A new edge `from -> to` would close a cycle if `to` is an ancestor of
/// `from` in the BFS tree currently being walked.
fn would_close_cycle(visiting: &HashMap<String, String>, from: &str, to: &str) -> bool {
    let mut cursor = from;
    loop {
        if cursor == to {
            return true;
        }
        match visiting.get(cursor) {
            Some(parent) => cursor = parent,
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSearch(HashMap<String, PathBuf>);

    impl LibrarySearch for FixedSearch {
        fn resolve(&self, name: &str) -> Option<PathBuf> {
            self.0.get(name).cloned()
        }
    }

    #[test]
    fn cycle_detection_flags_closing_edge() {
        let mut visiting = HashMap::new();
        visiting.insert("b".to_string(), "a".to_string());
        visiting.insert("c".to_string(), "b".to_string());
        assert!(would_close_cycle(&visiting, "c", "a"));
        assert!(!would_close_cycle(&visiting, "c", "z"));
    }

    #[test]
    fn fixed_search_resolves_known_names_only() {
        let mut map = HashMap::new();
        map.insert("libfoo.so".to_string(), PathBuf::from("/lib/libfoo.so"));
        let search = FixedSearch(map);
        assert_eq!(search.resolve("libfoo.so"), Some(PathBuf::from("/lib/libfoo.so")));
        assert_eq!(search.resolve("libbar.so"), None);
    }

    #[test]
    fn linux_search_dirs_include_standard_paths() {
        let search = LinuxSearch::from_env(Vec::new());
        let dirs = search.search_dirs();
        assert!(dirs.iter().any(|d| d == Path::new("/usr/lib")));
    }
}
