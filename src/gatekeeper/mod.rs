//! Model gatekeeper: mutual exclusion for the single GPU.
//!
//! Three tenants share one card: the script writer, the auditor, and the
//! TTS synthesizer. At most one may be resident at any instant. The rule
//! used to live in pipeline discipline ("unload the LLM before calling
//! TTS"); here it is enforced at the boundary: acquisition is scoped,
//! release is guaranteed on every exit path, and cross-tenant nesting fails
//! fast instead of deadlocking.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A GPU-resident role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tenant {
    Writer,
    Auditor,
    Synthesizer,
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tenant::Writer => "writer",
            Tenant::Auditor => "auditor",
            Tenant::Synthesizer => "synthesizer",
        };
        f.write_str(name)
    }
}

tokio::task_local! {
    /// The tenant held by the current task, for reentrancy and
    /// nesting-misuse detection.
    static HELD_TENANT: Tenant;
}

/// The sole arbiter of the resident-model slot.
#[derive(Debug, Default)]
pub struct Gatekeeper {
    resident: Mutex<Option<Tenant>>,
    released: Notify,
}

impl Gatekeeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The currently resident tenant, if any. Observational only.
    pub fn resident(&self) -> Option<Tenant> {
        *self.resident.lock()
    }

    /// Run `body` with `tenant` resident.
    ///
    /// Futures are lazy, so nothing in `body` executes before the tenant is
    /// resident. Waits until no other tenant is resident. Nested
    /// acquisition of the same tenant is a no-op; nested acquisition of a
    /// different tenant is a programming error and fails fast with
    /// [`GateError`] — that mistake would otherwise deadlock here forever.
    pub async fn with_tenant<T>(
        &self,
        tenant: Tenant,
        body: impl Future<Output = T>,
    ) -> Result<T, GateError> {
        if let Ok(held) = HELD_TENANT.try_with(|t| *t) {
            if held == tenant {
                // Reentrant acquire of the held tenant: run in place.
                return Ok(body.await);
            }
            return Err(GateError::CrossTenantNesting { held, requested: tenant });
        }

        loop {
            {
                let mut slot = self.resident.lock();
                if slot.is_none() {
                    *slot = Some(tenant);
                    break;
                }
            }
            self.released.notified().await;
        }
        tracing::debug!(target: "gatekeeper", %tenant, "resident");

        let _release = ReleaseOnDrop { gate: self };
        Ok(HELD_TENANT.scope(tenant, body).await)
    }
}

/// Clears the resident slot even when the body errors, panics, or the
/// future is dropped mid-flight.
struct ReleaseOnDrop<'a> {
    gate: &'a Gatekeeper,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        let released = self.gate.resident.lock().take();
        if let Some(tenant) = released {
            tracing::debug!(target: "gatekeeper", %tenant, "released");
        }
        self.gate.released.notify_one();
    }
}

/// Gatekeeper misuse. Always a caller bug; aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("cannot acquire tenant '{requested}' while '{held}' is held by the same task")]
    CrossTenantNesting { held: Tenant, requested: Tenant },
}
