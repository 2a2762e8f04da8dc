//! `Handle` -> `Session` registry opaque-handle API.

use crate::config::Config;
use crate::error::HeimdallError;
use heimdall_extract::{new_cancel_token, CancelToken};
use heimdall_lang::{default_adapters, LanguageAdapter};
use heimdall_model::{Document, SbomSpec};
use heimdall_packages::{PackageProbe, ProbeRoots};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// An opaque session reference, stable for the lifetime of the process.
/// Deliberately a bare integer (not a Rust reference or smart pointer) so
/// the API can be called from a C ABI shim without exposing ownership
/// across the boundary.
pub type Handle = u64;

/// Where a `Document` is in its one-directional lifecycle. Mirrors
/// `heimdall_model::DocumentState` but ranked, so the API layer can reject
/// a call that would move a document backward.
fn state_rank(state: heimdall_model::DocumentState) -> u8 {
    use heimdall_model::DocumentState::*;
    match state {
        Draft => 0,
        Frozen => 1,
        Emitted => 2,
        Canonicalized => 3,
        Signed => 4,
    }
}

pub(crate) struct Session {
    pub config: Config,
    pub spec: Option<SbomSpec>,
    pub output_path: Option<PathBuf>,
    pub transitive: Option<bool>,
    pub ali_dir: Option<PathBuf>,
    pub document: Option<Document>,
    pub probe: PackageProbe,
    pub adapters: Vec<Box<dyn LanguageAdapter>>,
    pub cancel: CancelToken,
    pub last_error: Option<HeimdallError>,
}

impl Session {
    fn new(config: Config) -> Self {
        Self {
            config,
            spec: None,
            output_path: None,
            transitive: None,
            ali_dir: None,
            document: None,
            probe: PackageProbe::new(ProbeRoots::default()),
            adapters: default_adapters(),
            cancel: new_cancel_token(),
            last_error: None,
        }
    }

    pub fn effective_transitive(&self) -> bool {
        self.transitive.unwrap_or(self.config.transitive)
    }

    /// Rejects a transition that would move the document's lifecycle state
    /// backward or sideways from `from`
    pub fn require_state_at_least(&self, minimum: heimdall_model::DocumentState) -> Result<(), HeimdallError> {
        let current = self
            .document
            .as_ref()
            .map(|d| d.state.0)
            .unwrap_or(heimdall_model::DocumentState::Draft);
        if state_rank(current) >= state_rank(minimum) {
            Ok(())
        } else {
            Err(HeimdallError::InvalidState)
        }
    }
}

fn registry() -> &'static RwLock<HashMap<Handle, Session>> {
    static REGISTRY: OnceLock<RwLock<HashMap<Handle, Session>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn next_handle() -> Handle {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn create(config: Config) -> Handle {
    let handle = next_handle();
    registry().write().insert(handle, Session::new(config));
    handle
}

pub(crate) fn with_session<R>(
    handle: Handle,
    f: impl FnOnce(&mut Session) -> Result<R, HeimdallError>,
) -> Result<R, HeimdallError> {
    let mut registry = registry().write();
    let session = registry.get_mut(&handle).ok_or(HeimdallError::UnknownHandle)?;
    let result = f(session);
    if let Err(err) = &result {
        session.last_error = Some(err.clone());
    }
    result
}

pub(crate) fn last_error(handle: Handle) -> Option<HeimdallError> {
    registry().read().get(&handle).and_then(|s| s.last_error.clone())
}

pub(crate) fn destroy(handle: Handle) {
    registry().write().remove(&handle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_monotonically_increasing() {
        let a = create(Config::default());
        let b = create(Config::default());
        assert!(b > a);
        destroy(a);
        destroy(b);
    }

    #[test]
    fn unknown_handle_is_reported_as_such() {
        let result = with_session(999_999, |_| Ok(()));
        assert!(matches!(result, Err(HeimdallError::UnknownHandle)));
    }

    #[test]
    fn state_gate_rejects_premature_sign() {
        let session = Session::new(Config::default());
        let result = session.require_state_at_least(heimdall_model::DocumentState::Emitted);
        assert!(matches!(result, Err(HeimdallError::InvalidState)));
    }
}
