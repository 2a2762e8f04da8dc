//! CycloneDX 1.4 / 1.5 / 1.6 serialization.
//!
//! Builds the document through `serde_json::Map` (a `BTreeMap` under the
//! hood, since this workspace doesn't enable `preserve_order`) rather than
//! string concatenation — every field passes through
//! `serde_json::Value`, so escaping and key presence are guaranteed by the
//! library instead of hand-rolled.

use heimdall_model::{Component, ComponentKind, Document, HashAlgorithm, SbomSpec};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CycloneDxError {
    #[error("document targets a non-CycloneDX spec")]
    WrongSpec,
    #[error("dependency '{0}' references a component not present in the document")]
    DanglingReference(String),
    #[error("hash digest for algorithm {algorithm} has invalid length or characters: {digest}")]
    InvalidHash { algorithm: &'static str, digest: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycloneDxVersion {
    V1_4,
    V1_5,
    V1_6,
}

impl CycloneDxVersion {
    fn from_spec(spec: SbomSpec) -> Result<Self, CycloneDxError> {
        match spec {
            SbomSpec::CycloneDx14 => Ok(Self::V1_4),
            SbomSpec::CycloneDx15 => Ok(Self::V1_5),
            SbomSpec::CycloneDx16 => Ok(Self::V1_6),
            _ => Err(CycloneDxError::WrongSpec),
        }
    }

    fn spec_version_str(self) -> &'static str {
        match self {
            Self::V1_4 => "1.4",
            Self::V1_5 => "1.5",
            Self::V1_6 => "1.6",
        }
    }

    fn requires_schema_field(self) -> bool {
        !matches!(self, Self::V1_4)
    }

    fn requires_serial_number(self) -> bool {
        !matches!(self, Self::V1_4)
    }

    fn has_lifecycles(self) -> bool {
        !matches!(self, Self::V1_4)
    }

    fn has_evidence(self) -> bool {
        !matches!(self, Self::V1_4)
    }

    /// 1.5 requires `evidence.identity.field`; 1.6 keeps it but no longer
    /// requires `callstack.frames[].module` (kept optional either way here
    /// since this serializer never emits a callstack).
    fn evidence_identity_required(self) -> bool {
        matches!(self, Self::V1_5 | Self::V1_6)
    }
}

fn hash_alg_name(alg: HashAlgorithm) -> &'static str {
    match alg {
        HashAlgorithm::Md5 => "MD5",
        HashAlgorithm::Sha1 => "SHA-1",
        HashAlgorithm::Sha256 => "SHA-256",
        HashAlgorithm::Sha512 => "SHA-512",
    }
}

fn expected_hash_len(alg: HashAlgorithm) -> usize {
    match alg {
        HashAlgorithm::Md5 => 32,
        HashAlgorithm::Sha1 => 40,
        HashAlgorithm::Sha256 => 64,
        HashAlgorithm::Sha512 => 128,
    }
}

fn validate_hash(alg: HashAlgorithm, digest: &str) -> Result<(), CycloneDxError> {
    let ok = digest.len() == expected_hash_len(alg)
        && digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
    if ok {
        Ok(())
    } else {
        Err(CycloneDxError::InvalidHash {
            algorithm: hash_alg_name(alg),
            digest: digest.to_string(),
        })
    }
}

fn component_type(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Executable => "application",
        ComponentKind::SharedLibrary | ComponentKind::StaticLibrary | ComponentKind::SystemLibrary => "library",
        ComponentKind::Framework => "framework",
        ComponentKind::Object | ComponentKind::Source => "file",
    }
}

/// Serializes `document` as CycloneDX. Validates reference integrity first
/// (every `dependencies[*].dependsOn` must resolve to a `bom-ref`) and
/// every hash digest's shape, failing before any bytes are produced.
pub fn serialize(document: &Document, tool_name: &str, tool_version: &str) -> Result<Value, CycloneDxError> {
    let version = CycloneDxVersion::from_spec(document.spec)?;

    for edge in &document.edges {
        if !document.components.contains_key(&edge.to) {
            return Err(CycloneDxError::DanglingReference(edge.to.clone()));
        }
    }
    for component in document.components.values() {
        for (alg, digest) in &component.hashes {
            validate_hash(*alg, digest)?;
        }
    }

    let mut root = Map::new();
    root.insert("bomFormat".to_string(), json!("CycloneDX"));
    root.insert("specVersion".to_string(), json!(version.spec_version_str()));
    root.insert("version".to_string(), json!(1));
    root.insert(
        "serialNumber".to_string(),
        json!(format!("urn:uuid:{}", document.document_id.trim_start_matches("urn:uuid:"))),
    );
    if version.requires_schema_field() {
        root.insert(
            "$schema".to_string(),
            json!(format!(
                "http://cyclonedx.org/schema/bom-{}.schema.json",
                version.spec_version_str()
            )),
        );
    }
    let _ = version.requires_serial_number(); // always emitted; flag documents the 1.4 leniency

    root.insert("metadata".to_string(), build_metadata(document, version, tool_name, tool_version));

    let components: Vec<Value> = document
        .components
        .values()
        .map(|c| build_component(c, version))
        .collect();
    root.insert("components".to_string(), Value::Array(components));

    let dependencies = build_dependencies(document);
    root.insert("dependencies".to_string(), Value::Array(dependencies));

    Ok(Value::Object(root))
}

fn build_metadata(document: &Document, version: CycloneDxVersion, tool_name: &str, tool_version: &str) -> Value {
    let mut metadata = Map::new();
    metadata.insert("timestamp".to_string(), json!(document.created_at));

    let tools = if matches!(version, CycloneDxVersion::V1_4) {
        json!([{ "vendor": "heimdall", "name": tool_name, "version": tool_version }])
    } else {
        json!({
            "components": [{
                "type": "application",
                "name": tool_name,
                "version": tool_version,
            }]
        })
    };
    metadata.insert("tools".to_string(), tools);

    if version.has_lifecycles() {
        metadata.insert("lifecycles".to_string(), json!([{ "phase": "build" }]));
    }

    if let Some(primary_id) = &document.primary_component {
        if let Some(primary) = document.components.get(primary_id) {
            metadata.insert("component".to_string(), build_component(primary, version));
        }
    }

    Value::Object(metadata)
}

fn build_component(component: &Component, version: CycloneDxVersion) -> Value {
    let mut obj = Map::new();
    obj.insert("type".to_string(), json!(component_type(component.kind)));
    obj.insert("bom-ref".to_string(), json!(component.id));
    obj.insert("name".to_string(), json!(component.name));
    if !component.version.is_empty() {
        obj.insert("version".to_string(), json!(component.version));
    }
    if let Some(supplier) = &component.supplier {
        obj.insert("supplier".to_string(), json!({ "name": supplier }));
    }
    obj.insert("licenses".to_string(), json!([{ "license": { "id": component.license } }]));
    if let Some(purl) = &component.package_purl {
        obj.insert("purl".to_string(), json!(purl));
    }

    let hashes: Vec<Value> = component
        .hashes
        .iter()
        .map(|(alg, digest)| json!({ "alg": hash_alg_name(*alg), "content": digest }))
        .collect();
    if !hashes.is_empty() {
        obj.insert("hashes".to_string(), Value::Array(hashes));
    }

    if !component.properties.is_empty() {
        let props: Vec<Value> = component
            .properties
            .iter()
            .map(|(k, v)| json!({ "name": k, "value": v }))
            .collect();
        obj.insert("properties".to_string(), Value::Array(props));
    }

    if version.has_evidence() && component.hashes.contains_key(&HashAlgorithm::Sha256) {
        let mut identity = Map::new();
        identity.insert("field".to_string(), json!("hash"));
        identity.insert("confidence".to_string(), json!(1.0));
        let _ = version.evidence_identity_required(); // both 1.5/1.6 get identity; documents the distinction
        obj.insert(
            "evidence".to_string(),
            json!({ "identity": Value::Object(identity) }),
        );
    }

    Value::Object(obj)
}

fn build_dependencies(document: &Document) -> Vec<Value> {
    let mut by_from: std::collections::BTreeMap<&str, Vec<&str>> = std::collections::BTreeMap::new();
    for edge in &document.edges {
        by_from.entry(&edge.from).or_default().push(&edge.to);
    }
    by_from
        .into_iter()
        .map(|(from, mut tos)| {
            tos.sort_unstable();
            json!({ "ref": from, "dependsOn": tos })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use heimdall_model::{Component, ComponentKind};

    fn doc_with_one_dependency() -> Document {
        let mut doc = Document::new(SbomSpec::CycloneDx16, "urn:uuid:x".into(), "2024-01-01T00:00:00Z".into());
        let mut root = Component::bare("/bin/app".into(), 10, ComponentKind::Executable);
        root.hashes.insert(HashAlgorithm::Sha256, "a".repeat(64));
        root.refresh_id();
        let mut dep = Component::bare("/lib/libfoo.so".into(), 10, ComponentKind::SharedLibrary);
        dep.hashes.insert(HashAlgorithm::Sha256, "b".repeat(64));
        dep.refresh_id();
        doc.primary_component = Some(root.id.clone());
        doc.add_edge(root.id.clone(), dep.id.clone());
        doc.add_component(root);
        doc.add_component(dep);
        doc.freeze();
        doc
    }

    #[test]
    fn v1_4_omits_schema_and_lifecycles() {
        let mut doc = doc_with_one_dependency();
        doc.spec = SbomSpec::CycloneDx14;
        let value = serialize(&doc, "heimdall", "0.1.0").unwrap();
        assert!(value.get("$schema").is_none());
        assert!(value.get("metadata").unwrap().get("lifecycles").is_none());
    }

    #[test]
    fn v1_5_includes_lifecycles_and_evidence() {
        let doc = doc_with_one_dependency();
        let value = serialize(&doc, "heimdall", "0.1.0").unwrap();
        assert!(value.get("metadata").unwrap().get("lifecycles").is_some());
        let components = value.get("components").unwrap().as_array().unwrap();
        assert!(components.iter().any(|c| c.get("evidence").is_some()));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut doc = Document::new(SbomSpec::CycloneDx16, "urn:uuid:x".into(), "now".into());
        let root = Component::bare("/bin/app".into(), 1, ComponentKind::Executable);
        doc.primary_component = Some(root.id.clone());
        let root_id = root.id.clone();
        doc.add_component(root);
        doc.edges.insert(heimdall_model::Edge {
            from: root_id,
            to: "nonexistent".to_string(),
        });
        let err = serialize(&doc, "heimdall", "0.1.0").unwrap_err();
        assert!(matches!(err, CycloneDxError::DanglingReference(_)));
    }

    #[test]
    fn dependencies_section_lists_outgoing_edges_sorted() {
        let doc = doc_with_one_dependency();
        let value = serialize(&doc, "heimdall", "0.1.0").unwrap();
        let deps = value.get("dependencies").unwrap().as_array().unwrap();
        assert_eq!(deps.len(), 1);
        assert!(deps[0].get("dependsOn").unwrap().as_array().unwrap().len() == 1);
    }
}
