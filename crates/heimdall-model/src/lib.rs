//! Version-agnostic component and document model.
//!
//! This is the central type family every extraction strategy, the graph
//! builder, and both SBOM serializers share. Nothing in this crate knows
//! about ELF, DWARF, SPDX, or CycloneDX — it only describes the facts a
//! Component can carry and how a Document owns them.

use packageurl::PackageUrl;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Hash algorithms a Component's content identity may be recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// The lowercase key used in [`Component::hashes`] and property maps.
    pub fn key(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

/// The physical nature of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Executable,
    SharedLibrary,
    StaticLibrary,
    Object,
    Source,
    SystemLibrary,
    Framework,
}

/// A section as discovered by an object-format decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub size: u64,
    pub flags: u64,
}

/// Binding/visibility of a symbol-table entry. Ordered so `Symbol` can live
/// in a `BTreeSet`; symbol tables are deduplicated by `(name, kind)` and a
/// `BTreeSet` gives us that for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolKind {
    Defined,
    Undefined,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub binding: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub source_file: Option<String>,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompileUnit {
    pub name: String,
    pub producer: String,
    pub language: String,
}

/// A software component: the primary entity of a Document.
///
/// Invariants: a stable `id`, a `file_path` unique within the owning
/// Document, and merge-by-SHA-256 when two artifacts share content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub version: String,
    pub supplier: Option<String>,
    pub license: String,
    pub download_location: Option<String>,
    pub homepage: Option<String>,
    pub kind: ComponentKind,
    pub file_path: String,
    pub file_size: u64,
    pub hashes: BTreeMap<HashAlgorithm, String>,
    pub sections: Vec<Section>,
    pub symbols: BTreeSet<Symbol>,
    pub source_files: BTreeSet<String>,
    pub functions: BTreeSet<Function>,
    pub compile_units: BTreeSet<CompileUnit>,
    pub needed: Vec<String>,
    pub package_purl: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Sentinel SPDX value for an absent license.
pub const NOASSERTION: &str = "NOASSERTION";

impl Component {
    /// Builds the id: `"<name>-<version>-<hash[0:16]>"` when a SHA-256 is
    /// known, else `"<name>-<version>"`, else `"<name>-<path-hash>"`.
    pub fn make_id(name: &str, version: &str, sha256: Option<&str>, file_path: &str) -> String {
        if let Some(h) = sha256 {
            return format!("{name}-{version}-{}", &h[..h.len().min(16)]);
        }
        if !version.is_empty() {
            return format!("{name}-{version}");
        }
        let mut hasher = Sha256::new();
        hasher.update(file_path.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{name}-{}", &digest[..16])
    }

    /// A component with just the facts known before any extraction strategy
    /// has run: a resolved path and its size. Strategies fill the rest in.
    pub fn bare(file_path: String, file_size: u64, kind: ComponentKind) -> Self {
        let name = std::path::Path::new(&file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.clone());
        let id = Component::make_id(&name, "", None, &file_path);
        Self {
            id,
            name,
            version: String::new(),
            supplier: None,
            license: NOASSERTION.to_string(),
            download_location: None,
            homepage: None,
            kind,
            file_path,
            file_size,
            hashes: BTreeMap::new(),
            sections: Vec::new(),
            symbols: BTreeSet::new(),
            source_files: BTreeSet::new(),
            functions: BTreeSet::new(),
            compile_units: BTreeSet::new(),
            needed: Vec::new(),
            package_purl: None,
            properties: BTreeMap::new(),
        }
    }

    /// Recomputes `id` from the current name/version/hash. Call after a
    /// merge step that may have discovered a SHA-256 or a version string.
    pub fn refresh_id(&mut self) {
        let sha256 = self.hashes.get(&HashAlgorithm::Sha256).map(|s| s.as_str());
        self.id = Component::make_id(&self.name, &self.version, sha256, &self.file_path);
    }

    /// Derives a Package URL-flavored purl string if one hasn't already
    /// been assigned by the package probe, useful as a fallback identifier.
    pub fn purl_or_synthetic(&self) -> Option<String> {
        if let Some(p) = &self.package_purl {
            if PackageUrl::from_str(p).is_ok() {
                return Some(p.clone());
            }
        }
        None
    }
}

/// A directed dependency edge: `from` dynamically links `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Who or what created a Document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreatorKind {
    Tool,
    Organization,
    Person,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub kind: CreatorKind,
    pub name: String,
    pub version: Option<String>,
    pub email: Option<String>,
}

/// Lifecycle states a Document moves through. Transitions
/// are one-directional; `Document` only exposes forward-moving methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentState {
    Draft,
    Frozen,
    Emitted,
    Canonicalized,
    Signed,
}

/// The target SBOM spec and version a Document will be serialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SbomSpec {
    Spdx23,
    Spdx30,
    Spdx30_0_1,
    CycloneDx14,
    CycloneDx15,
    CycloneDx16,
}

impl SbomSpec {
    pub fn is_cyclonedx(self) -> bool {
        matches!(
            self,
            SbomSpec::CycloneDx14 | SbomSpec::CycloneDx15 | SbomSpec::CycloneDx16
        )
    }

    pub fn is_spdx(self) -> bool {
        !self.is_cyclonedx()
    }
}

/// Top-level aggregate owning every Component and Edge in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub spec: SbomSpec,
    pub document_id: String,
    pub created_at: String,
    pub creators: Vec<Creator>,
    pub primary_component: Option<String>,
    pub components: indexmap::IndexMap<String, Component>,
    pub edges: BTreeSet<Edge>,
    #[serde(skip)]
    pub state: DocumentStateCell,
}

/// `DocumentState` wrapped so `Document` can derive `Serialize`/`Deserialize`
/// without dragging lifecycle bookkeeping into the wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentStateCell(pub DocumentState);

impl Default for DocumentState {
    fn default() -> Self {
        DocumentState::Draft
    }
}

impl Document {
    pub fn new(spec: SbomSpec, document_id: String, created_at: String) -> Self {
        Self {
            spec,
            document_id,
            created_at,
            creators: Vec::new(),
            primary_component: None,
            components: indexmap::IndexMap::new(),
            edges: BTreeSet::new(),
            state: DocumentStateCell::default(),
        }
    }

    /// Inserts or merges a Component: identical SHA-256 content always
    /// merges into one Component.
    pub fn add_component(&mut self, component: Component) {
        if let Some(existing_id) = self.find_by_sha256(&component) {
            if existing_id != component.id {
                // Two distinct paths, identical content: keep the first-seen
                // entry but don't lose a record of the duplicate path.
                if let Some(existing) = self.components.get_mut(&existing_id) {
                    existing
                        .properties
                        .entry("dedup.alias_path".to_string())
                        .or_insert_with(|| component.file_path.clone());
                }
                return;
            }
        }
        self.components.insert(component.id.clone(), component);
    }

    fn find_by_sha256(&self, candidate: &Component) -> Option<String> {
        let sha256 = candidate.hashes.get(&HashAlgorithm::Sha256)?;
        self.components
            .values()
            .find(|c| c.hashes.get(&HashAlgorithm::Sha256) == Some(sha256))
            .map(|c| c.id.clone())
    }

    pub fn add_edge(&mut self, from: String, to: String) {
        self.edges.insert(Edge { from, to });
    }

    /// Records a free-form fact against an already-inserted Component, used
    /// by the graph builder for `"dep.unresolved"` / `"dep.cycle-broken"`.
    /// A no-op if `component_id` isn't present.
    pub fn add_component_property(&mut self, component_id: &str, key: &str, value: &str) {
        if let Some(component) = self.components.get_mut(component_id) {
            component
                .properties
                .insert(key.to_string(), value.to_string());
        }
    }

    /// Sorts components (primary first, then by id) and edges by
    /// `(from.id, to.id)` ordering guarantee.
    pub fn freeze(&mut self) {
        self.components.sort_by(|a_id, _, b_id, _| {
            let primary = self.primary_component.as_deref();
            let a_is_primary = Some(a_id.as_str()) == primary;
            let b_is_primary = Some(b_id.as_str()) == primary;
            match (a_is_primary, b_is_primary) {
                (true, true) | (false, false) => a_id.cmp(b_id),
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
            }
        });
        self.state = DocumentStateCell(DocumentState::Frozen);
    }
}

/// A digital signature over a canonicalized document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub algorithm: String,
    pub key_id: Option<String>,
    pub value: String,
    pub public_key: Option<serde_json::Value>,
    pub certificate_chain: Option<Vec<String>>,
}
