//! End-to-end coverage for the six scenarios the Core API is built to
//! serve: a stripped dynamic object with no debug info, a static archive,
//! a signed CycloneDX document, identical content re-emitted across every
//! supported spec/version target, and the dangling-reference guard that
//! `finalize` relies on.
//!
//! Fixtures are synthesized in-memory rather than checked in as binary
//! blobs. The ELF fixture is a bare 64-byte ELF64 header (zero section and
//! program header counts) -- a minimal but spec-valid object, the shape a
//! stripped, statically-linked, debug-info-free binary reduces to.

use ed25519_dalek::SigningKey;
use heimdall_core::{
    close, finalize, init, last_error, process_input_file, set_format, set_output_path, sign,
    Config,
};
use pkcs8::EncodePrivateKey;
use std::io::Write;

const EM_X86_64: u16 = 0x3E;
const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;

/// Builds a minimal, valid ELF64 header with no program or section headers:
/// the degenerate case of a stripped binary with no symbols, no DT_NEEDED
/// table, and no `.debug_*` sections for the extractor to find.
fn minimal_elf64(e_type: u16, entry: u64) -> Vec<u8> {
    let mut b = vec![0u8; 64];
    b[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
    b[4] = 2; // ELFCLASS64
    b[5] = 1; // ELFDATA2LSB
    b[6] = 1; // EI_VERSION
    b[7] = 0; // ELFOSABI_NONE
    b[16..18].copy_from_slice(&e_type.to_le_bytes());
    b[18..20].copy_from_slice(&EM_X86_64.to_le_bytes());
    b[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version
    b[24..32].copy_from_slice(&entry.to_le_bytes()); // e_entry
    b[32..40].copy_from_slice(&0u64.to_le_bytes()); // e_phoff
    b[40..48].copy_from_slice(&0u64.to_le_bytes()); // e_shoff
    b[48..52].copy_from_slice(&0u32.to_le_bytes()); // e_flags
    b[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
    b[54..56].copy_from_slice(&56u16.to_le_bytes()); // e_phentsize
    b[56..58].copy_from_slice(&0u16.to_le_bytes()); // e_phnum
    b[58..60].copy_from_slice(&64u16.to_le_bytes()); // e_shentsize
    b[60..62].copy_from_slice(&0u16.to_le_bytes()); // e_shnum
    b[62..64].copy_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    b
}

fn write_fixture(bytes: &[u8], suffix: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(bytes).unwrap();
    f
}

fn build_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut builder = ar::Builder::new(&mut buf);
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, *data).unwrap();
        }
    }
    buf
}

#[test]
fn stripped_dynamic_object_is_extracted_and_emitted_as_cyclonedx() {
    let elf = write_fixture(&minimal_elf64(ET_DYN, 0x1000), ".bin");
    let out = tempfile::NamedTempFile::new().unwrap();

    let handle = init(Config::default());
    assert_eq!(set_format(handle, "cyclonedx", "1.6"), 0);
    assert_eq!(set_output_path(handle, out.path()), 0);
    let status = process_input_file(handle, elf.path());
    assert_eq!(status, 0, "{:?}", last_error(handle));
    assert_eq!(finalize(handle), 0, "{:?}", last_error(handle));
    close(handle);

    let text = std::fs::read_to_string(out.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["bomFormat"], "CycloneDX");
    assert_eq!(value["specVersion"], "1.6");
    let components = value["components"].as_array().unwrap();
    assert_eq!(components.len(), 1);
    let component = &components[0];
    assert!(component["hashes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|h| h["alg"] == "SHA-256"));
    let properties = component["properties"].as_array().unwrap();
    assert!(properties
        .iter()
        .any(|p| p["name"] == "object.stripped" && p["value"] == "true"));

    // The primary component is also the metadata.component
    assert_eq!(value["metadata"]["component"]["bom-ref"], component["bom-ref"]);
}

#[test]
fn static_archive_with_two_members_round_trips_through_spdx_tag_value() {
    let archive_bytes = build_archive(&[("a.o", b"AAAA"), ("b.o", b"BBBBBB")]);
    let archive = write_fixture(&archive_bytes, ".a");
    let out = tempfile::Builder::new().suffix(".spdx").tempfile().unwrap();

    let handle = init(Config::default());
    assert_eq!(set_format(handle, "spdx", "2.3"), 0);
    assert_eq!(set_output_path(handle, out.path()), 0);
    assert_eq!(process_input_file(handle, archive.path()), 0, "{:?}", last_error(handle));
    assert_eq!(finalize(handle), 0, "{:?}", last_error(handle));
    close(handle);

    let text = std::fs::read_to_string(out.path()).unwrap();
    assert!(text.starts_with("SPDXVersion: SPDX-2.3\n"));
    assert_eq!(text.matches("PackageName:").count(), 1);
    assert!(text.contains("PackageChecksum: SHA256:"));
}

#[test]
fn signing_round_trip_over_a_finalized_cyclonedx_document() {
    let elf = write_fixture(&minimal_elf64(ET_EXEC, 0x401000), ".bin");
    let out = tempfile::NamedTempFile::new().unwrap();

    let handle = init(Config::default());
    set_format(handle, "cyclonedx", "1.6");
    set_output_path(handle, out.path());
    assert_eq!(process_input_file(handle, elf.path()), 0, "{:?}", last_error(handle));
    assert_eq!(finalize(handle), 0, "{:?}", last_error(handle));

    let seed = [7u8; 32];
    let signing_key = SigningKey::from_bytes(&seed);
    let pem = signing_key.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();
    let key_file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(key_file.path(), pem.as_bytes()).unwrap();

    let status = sign(handle, key_file.path(), "Ed25519", Some("test-key-1".to_string()), None);
    assert_eq!(status, 0, "{:?}", last_error(handle));
    close(handle);

    let signed_bytes = std::fs::read(out.path()).unwrap();
    let signed_value: serde_json::Value = serde_json::from_slice(&signed_bytes).unwrap();

    let signature = signed_value.get("signature").expect("signature field present after sign()");
    assert_eq!(signature["algorithm"], "Ed25519");
    assert_eq!(signature["keyId"], "test-key-1");
    let jwk = signature["publicKey"].clone();
    assert!(heimdall_sign::verify(&signed_value, &jwk));

    let mut mutated = signed_value.clone();
    mutated["bomFormat"] = serde_json::json!("NotCycloneDX");
    assert!(!heimdall_sign::verify(&mutated, &jwk));
}

#[test]
fn same_root_artifact_serializes_to_distinct_shapes_across_every_spec_version() {
    let elf_bytes = minimal_elf64(ET_DYN, 0x2000);

    let run = |spec: &str, version: &str, suffix: &str| -> String {
        let elf = write_fixture(&elf_bytes, ".bin");
        let out = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        let handle = init(Config::default());
        assert_eq!(set_format(handle, spec, version), 0);
        set_output_path(handle, out.path());
        assert_eq!(process_input_file(handle, elf.path()), 0, "{:?}", last_error(handle));
        assert_eq!(finalize(handle), 0, "{:?}", last_error(handle));
        close(handle);
        std::fs::read_to_string(out.path()).unwrap()
    };

    let spdx23_tag_value = run("spdx", "2.3", ".spdx");
    let spdx23_json = run("spdx", "2.3", ".json");
    let spdx30 = run("spdx", "3.0", ".json");
    let spdx30_1 = run("spdx", "3.0.1", ".json");
    let cdx14 = run("cyclonedx", "1.4", ".json");
    let cdx16 = run("cyclonedx", "1.6", ".json");

    assert!(spdx23_tag_value.starts_with("SPDXVersion: SPDX-2.3"));
    let spdx23_json_value: serde_json::Value = serde_json::from_str(&spdx23_json).unwrap();
    assert_eq!(spdx23_json_value["spdxVersion"], "SPDX-2.3");

    let spdx30_value: serde_json::Value = serde_json::from_str(&spdx30).unwrap();
    let spdx30_1_value: serde_json::Value = serde_json::from_str(&spdx30_1).unwrap();
    let ns30 = spdx30_value["@graph"][0]["@id"].as_str().unwrap();
    let ns30_1 = spdx30_1_value["@graph"][0]["@id"].as_str().unwrap();
    assert_ne!(ns30, ns30_1, "3.0 and 3.0.1 must not share a namespace");
    assert!(ns30.contains("SPDX3.0/"));
    assert!(ns30_1.contains("SPDX3.0.1/"));

    let cdx14_value: serde_json::Value = serde_json::from_str(&cdx14).unwrap();
    let cdx16_value: serde_json::Value = serde_json::from_str(&cdx16).unwrap();
    assert!(cdx14_value.get("$schema").is_none(), "1.4 has no $schema field");
    assert!(cdx16_value.get("$schema").is_some());
    assert!(cdx14_value["metadata"].get("lifecycles").is_none());
    assert!(cdx16_value["metadata"].get("lifecycles").is_some());
}

#[test]
fn dangling_relationship_is_rejected_by_both_serializers_before_emission() {
    use heimdall_model::{Component, ComponentKind, Document, Edge, SbomSpec};

    let mut cdx_doc = Document::new(SbomSpec::CycloneDx16, "urn:uuid:x".into(), "now".into());
    let root = Component::bare("/bin/app".into(), 1, ComponentKind::Executable);
    let root_id = root.id.clone();
    cdx_doc.primary_component = Some(root_id.clone());
    cdx_doc.add_component(root);
    cdx_doc.edges.insert(Edge { from: root_id.clone(), to: "nonexistent".into() });

    let cdx_err = heimdall_cyclonedx::serialize(&cdx_doc, "heimdall", "0.1.0").unwrap_err();
    assert!(matches!(cdx_err, heimdall_cyclonedx::CycloneDxError::DanglingReference(_)));

    let mut spdx_doc = Document::new(SbomSpec::Spdx23, "urn:uuid:y".into(), "now".into());
    let root = Component::bare("/bin/app".into(), 1, ComponentKind::Executable);
    let root_id = root.id.clone();
    spdx_doc.add_component(root);
    spdx_doc.edges.insert(Edge { from: root_id, to: "missing".into() });

    let spdx_err = heimdall_spdx::serialize_json_2_3(&spdx_doc, "0.1.0").unwrap_err();
    assert!(matches!(spdx_err, heimdall_spdx::SpdxError::DanglingReference(_)));
}
