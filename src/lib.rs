//! wsr - Wayland session recorder.
//!
//! Records clicks and keystrokes from `/dev/input`, captures a screenshot for
//! every click and assembles an ordered, annotated session timeline.

pub mod capture;
pub mod config;
pub mod recorder;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins when set; otherwise `verbose` switches the crate from
/// info to debug output.
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "wsr=debug,wsr_lib=debug"
    } else {
        "wsr=info,wsr_lib=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
