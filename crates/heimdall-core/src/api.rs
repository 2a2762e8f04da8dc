//! The Core API. Every function here is what the (out of
//! scope) plugin loader and CLI call; every status return is an integer
//! kind-specific code, with `0` meaning success.

use crate::config::Config;
use crate::error::HeimdallError;
use crate::session::{self, Handle};
use heimdall_graph::{GraphOptions, LibrarySearch};
#[cfg(target_os = "macos")]
use heimdall_graph::MacosSearch;
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
use heimdall_graph::LinuxSearch;
#[cfg(target_os = "windows")]
use heimdall_graph::WindowsSearch;
use heimdall_model::{Document, DocumentState, DocumentStateCell, SbomSpec};
use std::path::{Path, PathBuf};

const TOOL_NAME: &str = "heimdall";
const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

fn status_of(result: Result<(), HeimdallError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.status_code(),
    }
}

/// Starts a new session and returns its handle. Never fails; a bad
/// `Config` field is caught the first time it's used, not at `init`.
pub fn init(config: Config) -> Handle {
    session::create(config)
}

/// Tears down a session's state. Necessary for a long-running host process
/// (the plugin loader) to avoid leaking sessions across many calls into
/// the same process.
pub fn close(handle: Handle) -> i32 {
    session::destroy(handle);
    0
}

fn parse_spec(spec: &str, version: &str) -> Option<SbomSpec> {
    match (spec.to_ascii_lowercase().as_str(), version) {
        ("spdx", "2.3") => Some(SbomSpec::Spdx23),
        ("spdx", "3.0") => Some(SbomSpec::Spdx30),
        ("spdx", "3.0.1") => Some(SbomSpec::Spdx30_0_1),
        ("cyclonedx", "1.4") => Some(SbomSpec::CycloneDx14),
        ("cyclonedx", "1.5") => Some(SbomSpec::CycloneDx15),
        ("cyclonedx", "1.6") => Some(SbomSpec::CycloneDx16),
        _ => None,
    }
}

pub fn set_format(handle: Handle, spec: &str, version: &str) -> i32 {
    status_of(session::with_session(handle, |session| {
        let parsed = parse_spec(spec, version).ok_or(HeimdallError::UnsupportedFormat)?;
        session.spec = Some(parsed);
        Ok(())
    }))
}

pub fn set_output_path(handle: Handle, path: impl AsRef<Path>) -> i32 {
    status_of(session::with_session(handle, |session| {
        session.output_path = Some(path.as_ref().to_path_buf());
        Ok(())
    }))
}

pub fn set_transitive(handle: Handle, transitive: bool) -> i32 {
    status_of(session::with_session(handle, |session| {
        session.transitive = Some(transitive);
        Ok(())
    }))
}

pub fn set_ali_file_path(handle: Handle, path: impl AsRef<Path>) -> i32 {
    status_of(session::with_session(handle, |session| {
        session.ali_dir = Some(path.as_ref().to_path_buf());
        Ok(())
    }))
}

/// Builds the platform's default dependency search order from `overrides`
/// (the caller-supplied extra directories checked first).
fn platform_search(overrides: &[PathBuf]) -> Box<dyn LibrarySearch> {
    #[cfg(target_os = "macos")]
    {
        Box::new(MacosSearch::from_env(overrides.to_vec()))
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(WindowsSearch::from_env(overrides.first().cloned()))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Box::new(LinuxSearch::from_env(overrides.to_vec()))
    }
}

/// Extracts `path` and everything it transitively depends on (or just
/// `path` plus its direct dependencies, if `set_transitive(false)` was
/// called), merging the result into the session's accumulating Document.
/// May be called more than once per session; every call after the first
/// folds its components/edges into the same Document rather than starting
/// a new one, so a host can build one SBOM across several root artifacts.
pub fn process_input_file(handle: Handle, path: impl AsRef<Path>) -> i32 {
    status_of(session::with_session(handle, |session| {
        let spec = session.spec.ok_or(HeimdallError::FormatNotSet)?;
        let search = platform_search(&session.config.search_path_overrides);
        let options = GraphOptions {
            transitive: session.effective_transitive(),
            ali_dir: session.ali_dir.clone(),
            extract_config: session.config.extract_config(),
            search: search.as_ref(),
            adapters: &session.adapters,
        };

        let (document_id, created_at) = match &session.document {
            Some(existing) => (existing.document_id.clone(), existing.created_at.clone()),
            None => (
                format!("urn:uuid:{}", uuid::Uuid::new_v4()),
                chrono::Utc::now().to_rfc3339(),
            ),
        };

        let built = heimdall_graph::build(
            path.as_ref(),
            spec,
            document_id,
            created_at,
            &session.probe,
            &options,
            &session.cancel,
        )?;

        match &mut session.document {
            Some(existing) => merge_document(existing, built),
            None => session.document = Some(built),
        }
        Ok(())
    }))
}

/// Folds `incoming`'s components and edges into `existing`, keeping
/// `existing`'s `primary_component` — a later `process_input_file` call
/// contributes more of the graph, it doesn't replace the root.
fn merge_document(existing: &mut Document, incoming: Document) {
    for (_, component) in incoming.components {
        existing.add_component(component);
    }
    for edge in incoming.edges {
        existing.edges.insert(edge);
    }
}

fn is_tag_value_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("spdx"))
        .unwrap_or(false)
}

/// Serializes the accumulated Document and writes it to the configured
/// output path. SPDX 2.3 emits tag-value when the output
/// path's extension is `.spdx`, JSON otherwise; SPDX 3.0/3.0.1 always emit
/// JSON-LD (their only on-disk shape); CycloneDX always emits JSON.
pub fn finalize(handle: Handle) -> i32 {
    status_of(session::with_session(handle, |session| {
        let output_path = session
            .output_path
            .clone()
            .ok_or(HeimdallError::OutputPathNotSet)?;
        let document = session.document.as_mut().ok_or(HeimdallError::InvalidState)?;
        document.freeze();

        let bytes = match document.spec {
            SbomSpec::Spdx23 if is_tag_value_path(&output_path) => {
                heimdall_spdx::serialize_tag_value(document, TOOL_NAME, TOOL_VERSION)?.into_bytes()
            }
            SbomSpec::Spdx23 => to_json_bytes(&heimdall_spdx::serialize_json_2_3(document, TOOL_VERSION)?)?,
            SbomSpec::Spdx30 | SbomSpec::Spdx30_0_1 => {
                to_json_bytes(&heimdall_spdx::serialize_json_ld(document, TOOL_VERSION)?)?
            }
            SbomSpec::CycloneDx14 | SbomSpec::CycloneDx15 | SbomSpec::CycloneDx16 => {
                to_json_bytes(&heimdall_cyclonedx::serialize(document, TOOL_NAME, TOOL_VERSION)?)?
            }
        };

        std::fs::write(&output_path, bytes).map_err(|e| HeimdallError::IoError(e.to_string()))?;
        document.state = DocumentStateCell(DocumentState::Emitted);
        Ok(())
    }))
}

fn to_json_bytes(value: &serde_json::Value) -> Result<Vec<u8>, HeimdallError> {
    serde_json::to_vec_pretty(value).map_err(|e| HeimdallError::IoError(e.to_string()))
}

/// Splits a PEM bundle into its individual certificate blocks.
fn split_pem_certificates(bundle: &str) -> Vec<String> {
    bundle
        .split_inclusive("-----END CERTIFICATE-----")
        .map(str::trim)
        .filter(|block| block.contains("BEGIN CERTIFICATE"))
        .map(str::to_string)
        .collect()
}

/// Signs the already-finalized output file in place, CycloneDX only. Must
/// run after `finalize`; overwrites the output with the signed form.
pub fn sign(
    handle: Handle,
    key_path: impl AsRef<Path>,
    algorithm: &str,
    key_id: Option<String>,
    cert_path: Option<&Path>,
) -> i32 {
    status_of(session::with_session(handle, |session| {
        session.require_state_at_least(DocumentState::Emitted)?;

        let spec = session
            .document
            .as_ref()
            .map(|d| d.spec)
            .ok_or(HeimdallError::InvalidState)?;
        if !spec.is_cyclonedx() {
            return Err(HeimdallError::InvalidState);
        }

        let output_path = session
            .output_path
            .clone()
            .ok_or(HeimdallError::OutputPathNotSet)?;
        let alg = heimdall_sign::SignAlgorithm::from_jws_name(algorithm)
            .ok_or_else(|| HeimdallError::KeyError(format!("unsupported algorithm: {algorithm}")))?;

        let pem_bytes = std::fs::read(key_path.as_ref()).map_err(|e| HeimdallError::IoError(e.to_string()))?;
        let existing_bytes = std::fs::read(&output_path).map_err(|e| HeimdallError::IoError(e.to_string()))?;
        let mut value: serde_json::Value =
            serde_json::from_slice(&existing_bytes).map_err(|e| HeimdallError::IoError(e.to_string()))?;

        let canonical = heimdall_sign::canonicalize(&value);
        let mut info = heimdall_sign::sign(&canonical, &pem_bytes, alg, key_id)?;

        if let Some(cert_path) = cert_path {
            let pem_text =
                std::fs::read_to_string(cert_path).map_err(|e| HeimdallError::IoError(e.to_string()))?;
            info.certificate_chain = Some(split_pem_certificates(&pem_text));
        }

        heimdall_sign::embed_signature(&mut value, &info);
        let bytes = to_json_bytes(&value)?;
        std::fs::write(&output_path, bytes).map_err(|e| HeimdallError::IoError(e.to_string()))?;

        if let Some(document) = session.document.as_mut() {
            document.state = DocumentStateCell(DocumentState::Signed);
        }
        Ok(())
    }))
}

/// The last error's stable kind string and a human-readable message, or
/// `None` if the session's last call succeeded (or the handle is unknown).
pub fn last_error(handle: Handle) -> Option<(String, String)> {
    session::last_error(handle).map(|err| (err.kind().to_string(), err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_format_is_rejected_before_processing() {
        let handle = init(Config::default());
        let status = process_input_file(handle, "/nonexistent/path");
        assert_ne!(status, 0);
        let (kind, _) = last_error(handle).unwrap();
        assert_eq!(kind, "FormatNotSet");
        close(handle);
    }

    #[test]
    fn sign_before_finalize_is_rejected() {
        let handle = init(Config::default());
        set_format(handle, "cyclonedx", "1.6");
        let status = sign(handle, "/nonexistent/key.pem", "Ed25519", None, None);
        assert_ne!(status, 0);
        let (kind, _) = last_error(handle).unwrap();
        assert_eq!(kind, "InvalidState");
        close(handle);
    }

    #[test]
    fn unknown_format_string_is_rejected() {
        let handle = init(Config::default());
        let status = set_format(handle, "not-a-spec", "9.9");
        assert_ne!(status, 0);
        close(handle);
    }

    #[test]
    fn splitting_a_pem_bundle_keeps_each_certificate_block() {
        let bundle = "-----BEGIN CERTIFICATE-----\nAAA\n-----END CERTIFICATE-----\n-----BEGIN CERTIFICATE-----\nBBB\n-----END CERTIFICATE-----\n";
        let blocks = split_pem_certificates(bundle);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("AAA"));
        assert!(blocks[1].contains("BBB"));
    }
}
