//! Language-specific artifact adapters.
//!
//! Each adapter implements [`LanguageAdapter`]: `recognize` decides whether
//! it applies to an artifact, `enrich` folds what it finds into the
//! primary Component and returns any additional Components it discovered
//! (e.g. one Ada `Source` component per compilation unit). A missing or
//! inapplicable adapter is a no-op.

use heimdall_model::{Component, ComponentKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Context an adapter needs beyond the bytes of the artifact itself --
/// companion directories supplied through the Core API (`set_ali_file_path`).
#[derive(Debug, Clone, Default)]
pub struct AdapterContext {
    pub ali_dir: Option<PathBuf>,
}

pub trait LanguageAdapter: Send + Sync {
    /// Name used in `properties` keys when this adapter contributes facts.
    fn name(&self) -> &'static str;

    /// Whether this adapter applies to `path`/`bytes`. Must not panic or
    /// perform expensive work; a quick extension/magic check.
    fn recognize(&self, path: &Path, bytes: &[u8]) -> bool;

    /// Folds discovered facts into `component` and returns any additional
    /// Components this adapter produced (e.g. Ada compilation units).
    fn enrich(&self, component: &mut Component, ctx: &AdapterContext) -> Vec<Component>;
}

/// Runs every adapter that recognizes the artifact, in a fixed order, and
/// collects every additional Component they produce.
pub fn run_adapters(
    adapters: &[Box<dyn LanguageAdapter>],
    path: &Path,
    bytes: &[u8],
    component: &mut Component,
    ctx: &AdapterContext,
) -> Vec<Component> {
    let mut extra = Vec::new();
    for adapter in adapters {
        if adapter.recognize(path, bytes) {
            extra.extend(adapter.enrich(component, ctx));
        }
    }
    extra
}

pub fn default_adapters() -> Vec<Box<dyn LanguageAdapter>> {
    vec![
        Box::new(AdaAdapter),
        Box::new(RustRlibAdapter),
        Box::new(GoBuildInfoAdapter),
        Box::new(SwiftAdapter),
    ]
}

/// Parses GNAT `.ali` files (line-oriented: `U` unit, `W` with-clause,
/// `D` source dependency) to recover Ada compilation units.
pub struct AdaAdapter;

struct AliUnit {
    name: String,
    source_file: String,
    source_files: BTreeSet<String>,
    imports: BTreeSet<String>,
}

fn parse_ali(contents: &str) -> Option<AliUnit> {
    let mut name = None;
    let mut source_file = None;
    let mut source_files = BTreeSet::new();
    let mut imports = BTreeSet::new();

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("U") => {
                name = fields.next().map(str::to_string);
                if let Some(sf) = fields.next() {
                    source_file = Some(sf.to_string());
                    source_files.insert(sf.to_string());
                }
            }
            Some("W") => {
                if let Some(withed) = fields.next() {
                    imports.insert(withed.trim_end_matches("%s").trim_end_matches("%b").to_string());
                }
            }
            Some("D") => {
                if let Some(sf) = fields.next() {
                    source_files.insert(sf.to_string());
                }
            }
            _ => {}
        }
    }

    Some(AliUnit {
        name: name?,
        source_file: source_file.unwrap_or_default(),
        source_files,
        imports,
    })
}

impl LanguageAdapter for AdaAdapter {
    fn name(&self) -> &'static str {
        "ada"
    }

    fn recognize(&self, path: &Path, _bytes: &[u8]) -> bool {
        path.with_extension("ali").exists()
            || path.extension().and_then(|e| e.to_str()) == Some("ali")
    }

    fn enrich(&self, component: &mut Component, ctx: &AdapterContext) -> Vec<Component> {
        let Some(dir) = &ctx.ali_dir else {
            return Vec::new();
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        let mut produced = Vec::new();
        for entry in entries.flatten() {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("ali") {
                continue;
            }
            let contents = match std::fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let Some(unit) = parse_ali(&contents) else {
                continue;
            };

            let mut source_component = Component::bare(
                unit.source_file.clone(),
                0,
                ComponentKind::Source,
            );
            source_component.name = unit.name.clone();
            source_component.source_files.extend(unit.source_files.iter().cloned());
            source_component
                .properties
                .insert("ada.imports".to_string(), unit.imports.iter().cloned().collect::<Vec<_>>().join(","));
            source_component.refresh_id();
            produced.push(source_component);

            component.source_files.extend(unit.source_files);
        }

        if !produced.is_empty() {
            component
                .properties
                .insert("lang.ada.units".to_string(), produced.len().to_string());
        }
        produced
    }
}

/// Placeholder hook: a real implementation would parse the `.rlib`'s
/// embedded metadata section (rustc's `lib.rmeta`) for crate name/deps.
/// No-op until that parser exists.
pub struct RustRlibAdapter;

impl LanguageAdapter for RustRlibAdapter {
    fn name(&self) -> &'static str {
        "rust-rlib"
    }

    fn recognize(&self, _path: &Path, _bytes: &[u8]) -> bool {
        false
    }

    fn enrich(&self, _component: &mut Component, _ctx: &AdapterContext) -> Vec<Component> {
        Vec::new()
    }
}

/// Placeholder hook: a real implementation would decode the
/// `runtime/debug.BuildInfo`-shaped blob Go embeds in compiled binaries.
/// No-op until that parser exists.
pub struct GoBuildInfoAdapter;

impl LanguageAdapter for GoBuildInfoAdapter {
    fn name(&self) -> &'static str {
        "go-buildinfo"
    }

    fn recognize(&self, _path: &Path, _bytes: &[u8]) -> bool {
        false
    }

    fn enrich(&self, _component: &mut Component, _ctx: &AdapterContext) -> Vec<Component> {
        Vec::new()
    }
}

/// Placeholder hook: a real implementation would read Swift's reflection
/// metadata sections (`__swift5_*`). No-op until that parser exists.
pub struct SwiftAdapter;

impl LanguageAdapter for SwiftAdapter {
    fn name(&self) -> &'static str {
        "swift"
    }

    fn recognize(&self, _path: &Path, _bytes: &[u8]) -> bool {
        false
    }

    fn enrich(&self, _component: &mut Component, _ctx: &AdapterContext) -> Vec<Component> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_ali_unit() {
        let ali = "U main%b main.adb 5e6f7a8b\nW text_io%s text_io.ali\nD main.adb 12345 abcdef\n";
        let unit = parse_ali(ali).unwrap();
        assert_eq!(unit.name, "main%b");
        assert!(unit.imports.contains("text_io"));
        assert!(unit.source_files.contains("main.adb"));
    }

    #[test]
    fn ada_adapter_enriches_from_ali_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.ali"),
            "U main%b main.adb 5e6f7a8b\nW text_io%s text_io.ali\n",
        )
        .unwrap();

        let ctx = AdapterContext {
            ali_dir: Some(dir.path().to_path_buf()),
        };
        let mut component = Component::bare("/bin/main".into(), 100, ComponentKind::Executable);
        let extra = AdaAdapter.enrich(&mut component, &ctx);

        assert_eq!(extra.len(), 1);
        assert!(component.source_files.contains("main.adb"));
    }

    #[test]
    fn placeholder_adapters_never_recognize() {
        assert!(!RustRlibAdapter.recognize(Path::new("foo.rlib"), &[]));
        assert!(!GoBuildInfoAdapter.recognize(Path::new("foo"), &[]));
        assert!(!SwiftAdapter.recognize(Path::new("foo"), &[]));
    }
}
