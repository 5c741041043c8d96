//! Running a single component hook.
//!
//! # Responsibilities
//! - Await `on_startup` / `on_shutdown` with an optional deadline
//! - Attribute failures to the unit and component
//! - Record hook duration and failures
//!
//! # Design Decisions
//! - A stalled hook becomes `StartupHandlerError::Timeout`; the hook future
//!   is dropped at the deadline

use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::component::ComponentHandle;
use crate::error::{HookKind, StartupHandlerError};
use crate::observability::metrics;

/// Run `hook` of `handle`, failing after `timeout` if one is given.
pub async fn run_hook(
    handle: &ComponentHandle,
    hook: HookKind,
    timeout: Option<Duration>,
) -> Result<(), StartupHandlerError> {
    let started = Instant::now();
    let hooks = handle.hooks();
    let fut = match hook {
        HookKind::Startup => hooks.on_startup(),
        HookKind::Shutdown => hooks.on_shutdown(),
    }
    .instrument(handle.span().clone());

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(|source| hook_error(handle, hook, source)),
            Err(_) => Err(StartupHandlerError::Timeout {
                unit: handle.unit().to_string(),
                component: handle.type_name().to_string(),
                hook,
                after: limit,
            }),
        },
        None => fut.await.map_err(|source| hook_error(handle, hook, source)),
    };

    let elapsed = started.elapsed();
    metrics::record_hook(handle.unit(), hook, elapsed, outcome.is_ok());

    match &outcome {
        Ok(()) => tracing::debug!(
            unit = %handle.unit(),
            component = handle.type_name(),
            hook = %hook,
            elapsed_ms = elapsed.as_millis() as u64,
            "Hook completed"
        ),
        Err(e) => tracing::error!(
            unit = %handle.unit(),
            component = handle.type_name(),
            hook = %hook,
            error = %e,
            "Hook failed"
        ),
    }

    outcome
}

fn hook_error(
    handle: &ComponentHandle,
    hook: HookKind,
    source: crate::error::BoxError,
) -> StartupHandlerError {
    StartupHandlerError::Hook {
        unit: handle.unit().to_string(),
        component: handle.type_name().to_string(),
        hook,
        source,
    }
}
