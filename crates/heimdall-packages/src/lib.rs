//! Package-manager probes.
//!
//! Given a file path, matches it against the platform's package database to
//! derive supplier/license/purl. Side-effect-free, no network. Every probe
//! degrades to `None` rather than propagating an error — a missing or
//! unreadable package DB is not fatal to extraction.

use packageurl::PackageUrl;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Builds a `pkg:<ty>/<name>@<version>` purl via the `packageurl` crate so
/// every probe emits the same canonicalized shape `heimdall-model` expects.
fn build_purl(ty: &str, name: &str, version: &str) -> Option<String> {
    let mut purl = PackageUrl::new(ty, name).ok()?;
    if !version.is_empty() {
        purl.with_version(version);
    }
    Some(purl.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub package_name: String,
    pub version: String,
    pub license: Option<String>,
    pub supplier: Option<String>,
    pub purl: Option<String>,
}

/// Caches probe results by absolute path for the lifetime of one run (a
/// read-mostly shared cache across worker threads).
pub struct PackageProbe {
    roots: ProbeRoots,
    cache: RwLock<HashMap<PathBuf, Option<PackageInfo>>>,
}

/// Filesystem roots the probe reads from. Exposed so tests can point the
/// probe at a fixture directory instead of the real `/var/lib/...` tree.
#[derive(Debug, Clone)]
pub struct ProbeRoots {
    pub dpkg_info_dir: PathBuf,
    pub dpkg_status_file: PathBuf,
    pub pacman_local_dir: PathBuf,
    pub homebrew_cellar_dir: PathBuf,
}

impl Default for ProbeRoots {
    fn default() -> Self {
        Self {
            dpkg_info_dir: PathBuf::from("/var/lib/dpkg/info"),
            dpkg_status_file: PathBuf::from("/var/lib/dpkg/status"),
            pacman_local_dir: PathBuf::from("/var/lib/pacman/local"),
            homebrew_cellar_dir: PathBuf::from("/opt/homebrew/Cellar"),
        }
    }
}

impl PackageProbe {
    pub fn new(roots: ProbeRoots) -> Self {
        Self {
            roots,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up `path` against every supported package manager in turn,
    /// returning the first hit. Results are cached by absolute path.
    pub fn lookup(&self, path: &Path) -> Option<PackageInfo> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(hit) = self.cache.read().get(&path) {
            return hit.clone();
        }

        let result = dpkg_lookup(&self.roots, &path)
            .or_else(|| pacman_lookup(&self.roots, &path))
            .or_else(|| homebrew_lookup(&self.roots, &path))
            .or_else(|| rpm_lookup(&path));

        self.cache.write().insert(path, result.clone());
        result
    }
}

fn dpkg_lookup(roots: &ProbeRoots, path: &Path) -> Option<PackageInfo> {
    let entries = fs::read_dir(&roots.dpkg_info_dir).ok()?;
    let target = path.to_string_lossy();

    let mut owning_package = None;
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.extension().and_then(|e| e.to_str()) != Some("list") {
            continue;
        }
        let contents = match fs::read_to_string(&entry_path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if contents.lines().any(|l| l == target) {
            owning_package = entry_path.file_stem().map(|s| s.to_string_lossy().into_owned());
            break;
        }
    }

    let package_name = owning_package?;
    let (version, supplier) = dpkg_status_fields(&roots.dpkg_status_file, &package_name)
        .unwrap_or((String::new(), None));

    Some(PackageInfo {
        purl: build_purl("deb", &package_name, &version),
        package_name,
        version,
        license: None,
        supplier,
    })
}

/// Reads `Package:`/`Version:`/`Maintainer:` out of dpkg's status file for
/// one package. Debian copyright files (license text) are intentionally
/// not parsed -- this probe surfaces package-DB metadata only.
fn dpkg_status_fields(status_file: &Path, package_name: &str) -> Option<(String, Option<String>)> {
    let contents = fs::read_to_string(status_file).ok()?;
    let mut in_block = false;
    let mut version = String::new();
    let mut maintainer = None;

    for block in contents.split("\n\n") {
        if !block.lines().any(|l| l == format!("Package: {package_name}")) {
            continue;
        }
        in_block = true;
        for line in block.lines() {
            if let Some(v) = line.strip_prefix("Version: ") {
                version = v.to_string();
            }
            if let Some(m) = line.strip_prefix("Maintainer: ") {
                maintainer = Some(m.to_string());
            }
        }
        break;
    }

    in_block.then_some((version, maintainer))
}

fn pacman_lookup(roots: &ProbeRoots, path: &Path) -> Option<PackageInfo> {
    let entries = fs::read_dir(&roots.pacman_local_dir).ok()?;
    let target = path.strip_prefix("/").unwrap_or(path).to_string_lossy().into_owned();

    for entry in entries.flatten() {
        let dir = entry.path();
        let files_path = dir.join("files");
        let desc_path = dir.join("desc");
        let files = match fs::read_to_string(&files_path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if !files.lines().any(|l| l == target) {
            continue;
        }
        let desc = fs::read_to_string(&desc_path).ok()?;
        return Some(parse_pacman_desc(&desc));
    }
    None
}

fn parse_pacman_desc(desc: &str) -> PackageInfo {
    let mut fields: HashMap<&str, String> = HashMap::new();
    let mut lines = desc.lines().peekable();
    while let Some(line) = lines.next() {
        if let Some(key) = line.strip_prefix('%').and_then(|l| l.strip_suffix('%')) {
            if let Some(value) = lines.next() {
                fields.insert(key, value.to_string());
            }
        }
    }

    let package_name = fields.get("NAME").cloned().unwrap_or_default();
    let version = fields.get("VERSION").cloned().unwrap_or_default();
    PackageInfo {
        purl: build_purl("pacman", &package_name, &version),
        package_name,
        version,
        license: fields.get("LICENSE").cloned(),
        supplier: fields.get("PACKAGER").cloned(),
    }
}

fn homebrew_lookup(roots: &ProbeRoots, path: &Path) -> Option<PackageInfo> {
    let target = path.to_string_lossy();
    if !target.starts_with(&*roots.homebrew_cellar_dir.to_string_lossy()) {
        return None;
    }

    // Layout: Cellar/<name>/<version>/...
    let rel = path.strip_prefix(&roots.homebrew_cellar_dir).ok()?;
    let mut components = rel.components();
    let name = components.next()?.as_os_str().to_string_lossy().into_owned();
    let version = components.next()?.as_os_str().to_string_lossy().into_owned();

    let receipt_path = roots
        .homebrew_cellar_dir
        .join(&name)
        .join(&version)
        .join("INSTALL_RECEIPT.json");
    let license = fs::read_to_string(&receipt_path)
        .ok()
        .and_then(|c| serde_json::from_str::<serde_json::Value>(&c).ok())
        .and_then(|v| v.get("license").and_then(|l| l.as_str()).map(str::to_string));

    Some(PackageInfo {
        purl: build_purl("brew", &name, &version),
        package_name: name,
        version,
        license,
        supplier: Some("Homebrew".to_string()),
    })
}

/// rpm's file-to-package map lives in a Berkeley DB / sqlite file this crate
/// deliberately does not link against (no FFI, per the "no network,
/// no FFI into the system package manager" posture) -- this always degrades
/// to `NotFound` until a pure-Rust reader for that format is adopted.
fn rpm_lookup(_path: &Path) -> Option<PackageInfo> {
    None
}
