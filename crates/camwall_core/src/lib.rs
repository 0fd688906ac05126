//! camwall Core - resource lifecycle orchestration for a live camera wall
//!
//! This crate contains all business logic with zero UI dependencies.
//! A UI front end (or the bundled headless binary) drives it through
//! [`session::Session`] or directly through [`orchestrator::Orchestrator`].

pub mod chains;
pub mod config;
pub mod layout;
pub mod logging;
pub mod models;
pub mod native;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod workers;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns the (major, minor) pair of the crate version.
pub fn version_major_minor() -> (u32, u32) {
    let mut parts = version().split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }

    #[test]
    fn version_major_minor_parses() {
        let (major, minor) = version_major_minor();
        assert_eq!(format!("{}.{}", major, minor), version().rsplitn(2, '.').last().unwrap());
    }
}
