//! User-Agent and library identification.
//!
//! The same name and version appear in the HTTP `User-Agent` header and in the
//! `$lib` / `$lib_version` properties of every event.

use std::sync::OnceLock;

/// Library name used in the User-Agent string.
const LIB_NAME: &str = "ambit-rust";

/// Library version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cached User-Agent string (computed once on first access).
static USER_AGENT: OnceLock<String> = OnceLock::new();

/// Returns the User-Agent string for backend requests.
///
/// Format: `ambit-rust/0.1.0 (rust/1.85; linux/x86_64)`
pub fn user_agent() -> &'static str {
    USER_AGENT.get_or_init(|| {
        format!(
            "{}/{} ({}; {}/{})",
            LIB_NAME,
            VERSION,
            rust_version(),
            os_name(),
            std::env::consts::ARCH,
        )
    })
}

/// Minimum supported Rust version the crate was built against.
fn rust_version() -> &'static str {
    concat!("rust/", env!("CARGO_PKG_RUST_VERSION"))
}

fn os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}
