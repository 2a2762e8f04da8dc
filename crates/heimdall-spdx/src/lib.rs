//! SPDX 2.3 (tag-value, JSON) and 3.0 / 3.0.x (JSON-LD)
//! serialization.
//!
//! 2.3 has two on-disk shapes (a line-oriented tag-value format and a JSON
//! document shaped like it); 3.0/3.0.x is JSON-LD with `@context`/`@graph`.
//! Both JSON shapes are built through `serde_json::Value`, never string
//! concatenation.

use heimdall_model::{Component, Document, HashAlgorithm, SbomSpec};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpdxError {
    #[error("document targets a non-SPDX spec")]
    WrongSpec,
    #[error("relationship references an undefined SPDXID: {0}")]
    DanglingReference(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpdxVersion {
    V2_3,
    /// Decided: "3.0" and "3.0.1" are
    /// distinct namespaces, not interchangeable labels for the same output.
    V3_0,
    V3_0_1,
}

impl SpdxVersion {
    fn from_spec(spec: SbomSpec) -> Result<Self, SpdxError> {
        match spec {
            SbomSpec::Spdx23 => Ok(Self::V2_3),
            SbomSpec::Spdx30 => Ok(Self::V3_0),
            SbomSpec::Spdx30_0_1 => Ok(Self::V3_0_1),
            _ => Err(SpdxError::WrongSpec),
        }
    }

    fn namespace_segment(self) -> &'static str {
        match self {
            Self::V2_3 => "SPDX2.3",
            Self::V3_0 => "SPDX3.0",
            Self::V3_0_1 => "SPDX3.0.1",
        }
    }

    fn version_string(self) -> &'static str {
        match self {
            Self::V2_3 => "SPDX-2.3",
            Self::V3_0 => "SPDX-3.0",
            Self::V3_0_1 => "SPDX-3.0.1",
        }
    }
}

/// `SPDXID`s must be `[a-zA-Z0-9.-]+`; component ids may contain other
/// characters (hash digests, slashes in synthetic ids), so this sanitizes.
fn spdx_ref(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '-' })
        .collect();
    format!("SPDXRef-{cleaned}")
}

fn spdx_hash_name(alg: HashAlgorithm) -> &'static str {
    match alg {
        HashAlgorithm::Md5 => "MD5",
        HashAlgorithm::Sha1 => "SHA1",
        HashAlgorithm::Sha256 => "SHA256",
        HashAlgorithm::Sha512 => "SHA512",
    }
}

fn document_namespace(document: &Document, version: SpdxVersion) -> String {
    format!(
        "https://heimdall.example/spdxdocs/{}/{}",
        version.namespace_segment(),
        document.document_id.trim_start_matches("urn:uuid:")
    )
}

fn check_relationship_integrity(document: &Document) -> Result<(), SpdxError> {
    for edge in &document.edges {
        if !document.components.contains_key(&edge.to) {
            return Err(SpdxError::DanglingReference(edge.to.clone()));
        }
    }
    Ok(())
}

/// Writes SPDX 2.3's line-oriented tag-value format.
pub fn serialize_tag_value(document: &Document, tool_name: &str, tool_version: &str) -> Result<String, SpdxError> {
    SpdxVersion::from_spec(document.spec)?;
    check_relationship_integrity(document)?;

    let version = SpdxVersion::V2_3;
    let mut out = String::new();
    out.push_str("SPDXVersion: SPDX-2.3\n");
    out.push_str("DataLicense: CC0-1.0\n");
    out.push_str("SPDXID: SPDXRef-DOCUMENT\n");
    out.push_str(&format!("DocumentName: {}\n", document.document_id));
    out.push_str(&format!("DocumentNamespace: {}\n", document_namespace(document, version)));
    out.push_str(&format!("Creator: Tool: Heimdall-{tool_version}\n"));
    for creator in &document.creators {
        let kind = match creator.kind {
            heimdall_model::CreatorKind::Tool => "Tool",
            heimdall_model::CreatorKind::Organization => "Organization",
            heimdall_model::CreatorKind::Person => "Person",
        };
        out.push_str(&format!("Creator: {kind}: {}\n", creator.name));
    }
    out.push_str(&format!("Created: {}\n", document.created_at));
    let _ = tool_name;

    for component in document.components.values() {
        let spdx_id = spdx_ref(&component.id);
        out.push_str("\n");
        out.push_str(&format!("PackageName: {}\n", component.name));
        out.push_str(&format!("SPDXID: {spdx_id}\n"));
        let version_str = if component.version.is_empty() { "NOASSERTION" } else { component.version.as_str() };
        out.push_str(&format!("PackageVersion: {version_str}\n"));
        out.push_str(&format!("PackageFileName: {}\n", component.file_path));
        let supplier = component.supplier.as_deref().unwrap_or("NOASSERTION");
        out.push_str(&format!("PackageSupplier: {supplier}\n"));
        let download = component.download_location.as_deref().unwrap_or("NOASSERTION");
        out.push_str(&format!("PackageDownloadLocation: {download}\n"));
        out.push_str(&format!("PackageLicenseConcluded: {}\n", component.license));
        out.push_str(&format!("PackageLicenseDeclared: {}\n", component.license));
        out.push_str("PackageCopyrightText: NOASSERTION\n");
        for (alg, digest) in &component.hashes {
            out.push_str(&format!("PackageChecksum: {}: {digest}\n", spdx_hash_name(*alg)));
        }
        for source_file in &component.source_files {
            out.push_str(&format!("FileName: {source_file}\n"));
        }
    }

    if !document.edges.is_empty() {
        out.push_str("\n");
        for edge in &document.edges {
            out.push_str(&format!(
                "Relationship: {} DEPENDS_ON {}\n",
                spdx_ref(&edge.from),
                spdx_ref(&edge.to)
            ));
        }
    }

    Ok(out)
}

/// Writes SPDX 2.3's JSON document shape (the same fields as tag-value, in
/// the schema's nested JSON form).
pub fn serialize_json_2_3(document: &Document, tool_version: &str) -> Result<Value, SpdxError> {
    SpdxVersion::from_spec(document.spec)?;
    check_relationship_integrity(document)?;
    let version = SpdxVersion::V2_3;

    let mut root = Map::new();
    root.insert("spdxVersion".to_string(), json!(version.version_string()));
    root.insert("dataLicense".to_string(), json!("CC0-1.0"));
    root.insert("SPDXID".to_string(), json!("SPDXRef-DOCUMENT"));
    root.insert("name".to_string(), json!(document.document_id));
    root.insert(
        "documentNamespace".to_string(),
        json!(document_namespace(document, version)),
    );

    let mut creators = vec![json!(format!("Tool: Heimdall-{tool_version}"))];
    for creator in &document.creators {
        let kind = match creator.kind {
            heimdall_model::CreatorKind::Tool => "Tool",
            heimdall_model::CreatorKind::Organization => "Organization",
            heimdall_model::CreatorKind::Person => "Person",
        };
        creators.push(json!(format!("{kind}: {}", creator.name)));
    }
    root.insert(
        "creationInfo".to_string(),
        json!({ "creators": creators, "created": document.created_at }),
    );

    let packages: Vec<Value> = document.components.values().map(|c| package_json(c)).collect();
    root.insert("packages".to_string(), Value::Array(packages));

    let relationships: Vec<Value> = document
        .edges
        .iter()
        .map(|edge| {
            json!({
                "spdxElementId": spdx_ref(&edge.from),
                "relationshipType": "DEPENDS_ON",
                "relatedSpdxElement": spdx_ref(&edge.to),
            })
        })
        .collect();
    root.insert("relationships".to_string(), Value::Array(relationships));

    Ok(Value::Object(root))
}

fn package_json(component: &Component) -> Value {
    let mut obj = Map::new();
    obj.insert("name".to_string(), json!(component.name));
    obj.insert("SPDXID".to_string(), json!(spdx_ref(&component.id)));
    obj.insert(
        "versionInfo".to_string(),
        json!(if component.version.is_empty() { "NOASSERTION".to_string() } else { component.version.clone() }),
    );
    obj.insert("packageFileName".to_string(), json!(component.file_path));
    obj.insert(
        "supplier".to_string(),
        json!(component.supplier.clone().unwrap_or_else(|| "NOASSERTION".to_string())),
    );
    obj.insert(
        "downloadLocation".to_string(),
        json!(component.download_location.clone().unwrap_or_else(|| "NOASSERTION".to_string())),
    );
    obj.insert("licenseConcluded".to_string(), json!(component.license));
    obj.insert("licenseDeclared".to_string(), json!(component.license));
    obj.insert("copyrightText".to_string(), json!("NOASSERTION"));

    let checksums: Vec<Value> = component
        .hashes
        .iter()
        .map(|(alg, digest)| json!({ "algorithm": spdx_hash_name(*alg), "checksumValue": digest }))
        .collect();
    obj.insert("checksums".to_string(), Value::Array(checksums));

    Value::Object(obj)
}

/// Writes SPDX 3.0 / 3.0.x's JSON-LD shape: a flat `@graph` of typed nodes
/// instead of the 2.3 schema's package/relationship arrays.
pub fn serialize_json_ld(document: &Document, tool_version: &str) -> Result<Value, SpdxError> {
    let version = SpdxVersion::from_spec(document.spec)?;
    if matches!(version, SpdxVersion::V2_3) {
        return Err(SpdxError::WrongSpec);
    }
    check_relationship_integrity(document)?;

    let ns = document_namespace(document, version);
    let mut graph = Vec::new();

    graph.push(json!({
        "@id": format!("{ns}#SPDXRef-DOCUMENT"),
        "type": "SpdxDocument",
        "spdxVersion": version.version_string(),
        "creationInfo": {
            "created": document.created_at,
            "createdBy": [format!("Tool: Heimdall-{tool_version}")],
        },
    }));

    for component in document.components.values() {
        let node_id = format!("{ns}#{}", spdx_ref(&component.id));
        let checksums: Vec<Value> = component
            .hashes
            .iter()
            .map(|(alg, digest)| json!({ "algorithm": spdx_hash_name(*alg), "checksumValue": digest }))
            .collect();
        graph.push(json!({
            "@id": node_id,
            "type": "software_Package",
            "name": component.name,
            "software_packageVersion": if component.version.is_empty() { Value::String("NOASSERTION".into()) } else { json!(component.version) },
            "software_downloadLocation": component.download_location.clone().unwrap_or_else(|| "NOASSERTION".to_string()),
            "simplelicensing_licenseConcluded": component.license,
            "verifiedUsing": checksums,
        }));
    }

    for edge in &document.edges {
        graph.push(json!({
            "type": "Relationship",
            "from": format!("{ns}#{}", spdx_ref(&edge.from)),
            "relationshipType": "dependsOn",
            "to": [format!("{ns}#{}", spdx_ref(&edge.to))],
        }));
    }

    Ok(json!({
        "@context": "https://spdx.org/rdf/3.0.1/spdx-context.jsonld",
        "@graph": graph,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use heimdall_model::{Component, ComponentKind, Edge};

    fn sample_document(spec: SbomSpec) -> Document {
        let mut doc = Document::new(spec, "urn:uuid:x".into(), "2024-01-01T00:00:00Z".into());
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
    fn tag_value_emits_relationship_and_checksum_lines() {
        let doc = sample_document(SbomSpec::Spdx23);
        let text = serialize_tag_value(&doc, "heimdall", "0.1.0").unwrap();
        assert!(text.contains("SPDXVersion: SPDX-2.3"));
        assert!(text.contains("DEPENDS_ON"));
        assert!(text.contains("PackageChecksum: SHA256:"));
    }

    #[test]
    fn json_ld_uses_distinct_namespace_per_dot_release() {
        let doc30 = sample_document(SbomSpec::Spdx30);
        let doc301 = sample_document(SbomSpec::Spdx30_0_1);
        let v30 = serialize_json_ld(&doc30, "0.1.0").unwrap();
        let v301 = serialize_json_ld(&doc301, "0.1.0").unwrap();
        let ns30 = v30["@graph"][0]["@id"].as_str().unwrap();
        let ns301 = v301["@graph"][0]["@id"].as_str().unwrap();
        assert_ne!(ns30, ns301);
        assert!(ns30.contains("SPDX3.0/"));
        assert!(ns301.contains("SPDX3.0.1/"));
    }

    #[test]
    fn dangling_relationship_is_rejected() {
        let mut doc = Document::new(SbomSpec::Spdx23, "urn:uuid:x".into(), "now".into());
        let root = Component::bare("/bin/app".into(), 1, ComponentKind::Executable);
        let root_id = root.id.clone();
        doc.add_component(root);
        doc.edges.insert(Edge { from: root_id, to: "missing".to_string() });
        let err = serialize_json_2_3(&doc, "0.1.0").unwrap_err();
        assert!(matches!(err, SpdxError::DanglingReference(_)));
    }
}
