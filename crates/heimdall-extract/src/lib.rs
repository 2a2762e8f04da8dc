//! Metadata extraction orchestrator.
//!
//! Applies every extraction strategy in priority order and merges their
//! results into one `Component`. Only a file-level or object-decode fatal
//! error fails the whole extraction; every other strategy's failure
//! degrades to a `"extract.<strategy>.error"` property and extraction
//! continues.

use heimdall_archive::ArchiveMember;
use heimdall_lang::{AdapterContext, LanguageAdapter};
use heimdall_model::{Component, ComponentKind, HashAlgorithm, NOASSERTION};
use heimdall_object::{ImageKind, ObjectFacts};
use heimdall_packages::PackageProbe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(String),
    #[error("unrecognized artifact format")]
    UnsupportedFormat,
    #[error("extraction was cancelled")]
    Cancelled,
    #[error("file exceeds the configured size cap")]
    TooLarge,
}

/// Tunables for one extraction run, passed down from `heimdall-core`'s
/// public `Config`.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub max_file_size: u64,
    pub per_artifact_timeout: Duration,
    pub heuristic_scan_window: usize,
    pub dwarf_enabled: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_file_size: heimdall_hash::DEFAULT_MAX_SIZE,
            per_artifact_timeout: Duration::from_secs(60),
            heuristic_scan_window: heimdall_heuristic::DEFAULT_SCAN_WINDOW,
            dwarf_enabled: true,
        }
    }
}

/// Checked at the top of each strategy and between BFS iterations upstream.
pub type CancelToken = Arc<AtomicBool>;

pub fn new_cancel_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

fn check_cancelled(token: &CancelToken) -> Result<(), ExtractError> {
    if token.load(Ordering::Relaxed) {
        Err(ExtractError::Cancelled)
    } else {
        Ok(())
    }
}

/// One artifact's extraction result: the primary Component plus any
/// additional Components a language adapter discovered alongside it
/// (e.g. one per Ada compilation unit).
#[derive(Debug, Clone)]
pub struct Extracted {
    pub primary: Component,
    pub extra: Vec<Component>,
}

/// Extracts one Component from `path`, running every strategy in turn.
pub fn extract(
    path: &Path,
    config: &ExtractConfig,
    probe: &PackageProbe,
    adapters: &[Box<dyn LanguageAdapter>],
    ali_dir: Option<&Path>,
    cancel: &CancelToken,
) -> Result<Extracted, ExtractError> {
    let deadline = Instant::now() + config.per_artifact_timeout;
    check_cancelled(cancel)?;

    // Step 1: resolve, stat, size cap.
    let resolved = path
        .canonicalize()
        .map_err(|e| ExtractError::Io(e.to_string()))?;
    let meta = std::fs::metadata(&resolved).map_err(|e| ExtractError::Io(e.to_string()))?;
    if meta.len() > config.max_file_size {
        return Err(ExtractError::TooLarge);
    }

    // Step 2: read bytes once.
    let bytes = std::fs::read(&resolved).map_err(|e| ExtractError::Io(e.to_string()))?;

    let mut component = Component::bare(
        resolved.to_string_lossy().into_owned(),
        meta.len(),
        ComponentKind::Object,
    );

    // Step 3: hashes.
    match heimdall_hash::compute_hashes(
        &resolved,
        &[
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha512,
        ],
        config.max_file_size,
    ) {
        Ok(hashes) => component.hashes = hashes,
        Err(e) => {
            component
                .properties
                .insert("extract.hash.error".to_string(), e.to_string());
        }
    }
    component.refresh_id();

    check_cancelled(cancel)?;
    if Instant::now() > deadline {
        component
            .properties
            .insert("extract.timeout".to_string(), "true".to_string());
        return Ok(Extracted {
            primary: component,
            extra: Vec::new(),
        });
    }

    // Step 4: classify and decode.
    let is_archive = bytes.starts_with(b"!<arch>\n");
    let mut object_facts: Option<ObjectFacts> = None;
    let mut decoded_members: Vec<(ArchiveMember, Option<ObjectFacts>)> = Vec::new();

    if is_archive {
        component.kind = ComponentKind::StaticLibrary;
        match heimdall_archive::walk(&bytes) {
            Ok(members) => {
                let names: Vec<String> = members.iter().map(|m| m.member_name.clone()).collect();
                component
                    .properties
                    .insert("archive.members".to_string(), names.join(","));
                for member in members {
                    let facts = heimdall_object::decode(&member.bytes).ok();
                    decoded_members.push((member, facts));
                }
            }
            Err(e) => {
                component
                    .properties
                    .insert("extract.archive.error".to_string(), e.to_string());
            }
        }
    } else {
        match heimdall_object::decode(&bytes) {
            Ok(facts) => {
                component.kind = match facts.image_kind {
                    ImageKind::Executable => ComponentKind::Executable,
                    ImageKind::SharedLibrary if facts.entry_point.is_some() => {
                        ComponentKind::Executable
                    }
                    ImageKind::SharedLibrary => ComponentKind::SharedLibrary,
                    ImageKind::Relocatable | ImageKind::Unknown => ComponentKind::Object,
                };
                component.needed = facts.needed.clone();
                component.sections = facts.sections.clone();
                component.symbols = facts.symbols.clone();
                if let Some(id) = &facts.build_id {
                    component
                        .properties
                        .insert("object.build_id".to_string(), id.clone());
                }
                component
                    .properties
                    .insert("object.stripped".to_string(), facts.is_stripped.to_string());
                object_facts = Some(facts);
            }
            Err(e) => match e {
                heimdall_object::ObjectError::UnsupportedFormat => {
                    return Err(ExtractError::UnsupportedFormat);
                }
                heimdall_object::ObjectError::Truncated => {
                    // Decode aborted partway through a malformed header; hashes
                    // are already computed, so degrade in place and let DWARF,
                    // the heuristic scanner, the package probe, and language
                    // adapters still have a chance to populate the component.
                    component
                        .properties
                        .insert("extract.object.error".to_string(), e.to_string());
                    component.kind = ComponentKind::Object;
                }
            },
        }
    }

    check_cancelled(cancel)?;

    // Step 5: DWARF, when debug sections are present.
    if config.dwarf_enabled {
        let has_debug = object_facts
            .as_ref()
            .map(|f| f.debug_section_presence)
            .unwrap_or(true); // archive members: always attempt per-member below
        if !is_archive && has_debug {
            run_dwarf(&bytes, &mut component);
        }
        for (member, facts) in &decoded_members {
            if facts.as_ref().map(|f| f.debug_section_presence).unwrap_or(false) {
                run_dwarf(&member.bytes, &mut component);
            }
        }
    }

    // Step 6: heuristic fallback, only if nothing found source files yet.
    if component.source_files.is_empty() {
        let window = config.heuristic_scan_window;
        let found = if is_archive {
            decoded_members
                .iter()
                .flat_map(|(m, _)| heimdall_heuristic::scan(&m.bytes, window))
                .collect()
        } else {
            heimdall_heuristic::scan(&bytes, window)
        };
        if !found.is_empty() {
            component.source_files.extend(found);
            component
                .properties
                .insert("source.origin".to_string(), "heuristic".to_string());
        }
    }

    check_cancelled(cancel)?;

    // Step 7: package probe.
    if let Some(pkg) = probe.lookup(&resolved) {
        if !pkg.package_name.is_empty() {
            component.name = pkg.package_name;
        }
        if !pkg.version.is_empty() {
            component.version = pkg.version;
        }
        if let Some(lic) = pkg.license {
            component.license = lic;
        }
        if component.supplier.is_none() {
            component.supplier = pkg.supplier;
        }
        if component.package_purl.is_none() {
            component.package_purl = pkg.purl;
        }
    }

    // Step 8: language adapters.
    let ctx = AdapterContext {
        ali_dir: ali_dir.map(Path::to_path_buf),
    };
    let extra = heimdall_lang::run_adapters(adapters, &resolved, &bytes, &mut component, &ctx);

    component.refresh_id();
    Ok(Extracted {
        primary: component,
        extra,
    })
}

fn run_dwarf(bytes: &[u8], component: &mut Component) {
    match heimdall_dwarf::extract_debug(bytes) {
        Ok(facts) => {
            component.source_files.extend(facts.source_files);
            component.functions.extend(facts.functions);
            component.compile_units.extend(facts.compile_units);
            if facts.partial {
                component
                    .properties
                    .insert("dwarf.partial".to_string(), "true".to_string());
            }
        }
        Err(e) => {
            component
                .properties
                .insert("extract.dwarf.error".to_string(), e.to_string());
        }
    }
}

/// Extraction never overwrites a concrete value with `NOASSERTION`.
pub fn merge_license(current: &str, candidate: &str) -> String {
    if candidate == NOASSERTION || candidate.is_empty() {
        current.to_string()
    } else {
        candidate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heimdall_packages::ProbeRoots;
    use std::io::Write;

    fn probe() -> PackageProbe {
        PackageProbe::new(ProbeRoots {
            dpkg_info_dir: "/nonexistent".into(),
            dpkg_status_file: "/nonexistent".into(),
            pacman_local_dir: "/nonexistent".into(),
            homebrew_cellar_dir: "/nonexistent".into(),
        })
    }

    #[test]
    fn unparseable_bytes_fail_as_unsupported_format() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"not an object file at all").unwrap();
        let config = ExtractConfig::default();
        let cancel = new_cancel_token();
        let err = extract(f.path(), &config, &probe(), &[], None, &cancel).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat));
    }

    #[test]
    fn extraction_computes_hashes_even_when_format_is_unrecognized() {
        // Hashing (step 3) happens before format classification; a failed
        // decode should still have left a populated hash map on the
        // component the caller sees via the error path in other tests, but
        // here we assert the happy path: a recognizable header-less blob
        // still gets cancelled/size-checked correctly before decode runs.
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"!<arch>\n").unwrap(); // archive magic, no members
        let config = ExtractConfig::default();
        let cancel = new_cancel_token();
        let result = extract(f.path(), &config, &probe(), &[], None, &cancel);
        assert!(result.is_ok());
        let extracted = result.unwrap();
        assert!(extracted.primary.hashes.contains_key(&heimdall_model::HashAlgorithm::Sha256));
    }

    #[test]
    fn cancellation_is_observed_before_work_starts() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"anything").unwrap();
        let config = ExtractConfig::default();
        let cancel = new_cancel_token();
        cancel.store(true, Ordering::Relaxed);
        let err = extract(f.path(), &config, &probe(), &[], None, &cancel).unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
    }

    #[test]
    fn oversized_file_is_too_large() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 32]).unwrap();
        let config = ExtractConfig {
            max_file_size: 8,
            ..ExtractConfig::default()
        };
        let cancel = new_cancel_token();
        let err = extract(f.path(), &config, &probe(), &[], None, &cancel).unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge));
    }

    #[test]
    fn truncated_object_degrades_in_place_instead_of_failing() {
        // Valid ELF magic followed by a header that's cut off mid-field;
        // `object` reports this as a truncation, not an unrecognized format.
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0x7f, b'E', b'L', b'F', 2, 1, 1]).unwrap();
        let config = ExtractConfig::default();
        let cancel = new_cancel_token();
        let extracted = extract(f.path(), &config, &probe(), &[], None, &cancel).unwrap();
        assert_eq!(extracted.primary.kind, ComponentKind::Object);
        assert!(extracted.primary.properties.contains_key("extract.object.error"));
        assert!(extracted.primary.hashes.contains_key(&heimdall_model::HashAlgorithm::Sha256));
    }

    #[test]
    fn merge_license_never_regresses_to_noassertion() {
        assert_eq!(merge_license("MIT", NOASSERTION), "MIT");
        assert_eq!(merge_license(NOASSERTION, "Apache-2.0"), "Apache-2.0");
    }
}
