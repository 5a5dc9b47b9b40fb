use std::sync::OnceLock;

use querygate_core::QueryError;

use crate::gate::QueryGate;

static GLOBAL: OnceLock<QueryGate> = OnceLock::new();

/// Install the process-wide gate. Fails if one is already installed.
///
/// Servers that want a single shared gate call this once at startup; tests and
/// libraries should construct their own [`QueryGate`] instead.
pub fn init_global(gate: QueryGate) -> Result<&'static QueryGate, QueryError> {
    GLOBAL.set(gate).map_err(|_| {
        QueryError::Configuration("global query gate already initialized".to_string())
    })?;
    tracing::info!("global query gate installed");
    GLOBAL
        .get()
        .ok_or_else(|| QueryError::Internal("global query gate vanished after install".to_string()))
}

pub fn global() -> Option<&'static QueryGate> {
    GLOBAL.get()
}
