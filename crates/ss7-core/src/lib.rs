//! Facade crate tying the link (`ss7-mtp2`), routing (`ss7-mtp3`) and
//! call-control (`ss7-isup`) layers together behind a single session
//! type, driven by one cooperative host loop.
//!
//! Key components:
//! - [`config`] — TOML-based configuration with an Input/Resolved split
//! - [`device`] — the byte-oriented transport a host wires in per link
//! - [`host`] — callbacks the session invokes back into the host app
//! - [`session`] — the `Session` type: owns every link, the MTP3 engine,
//!   the call table and the event ring

pub mod config;
pub mod device;
pub mod host;
pub mod session;

pub use config::{StackConfig, StackConfigInput, SwitchVariant};
pub use device::{Device, DeviceEvent};
pub use host::{HangupAction, HangupResult, HostCallbacks};
pub use session::Session;

/// Installs a default `tracing` subscriber (env-filter based) if no
/// subscriber is already set. Safe to call multiple times — subsequent
/// calls are no-ops. Controlled by `RUST_LOG` (e.g. `RUST_LOG=ss7_core=debug`).
pub fn init() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if tracing::dispatcher::has_been_set() {
            tracing::info!("ss7-core: tracing subscriber already set");
            return;
        }
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_target(true)
            .with_thread_names(true)
            .compact()
            .finish();
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            tracing::info!("ss7-core initialized");
        }
    });
}
