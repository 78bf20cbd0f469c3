//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn src() -> PathBuf {
        "src".into()
    }

    pub fn output() -> PathBuf {
        "dist".into()
    }

    pub fn timeout_secs() -> u64 {
        120
    }
}

// ============================================================================
// [tools] Section Defaults
// ============================================================================

pub mod tools {
    pub fn bundler() -> Vec<String> {
        vec!["esbuild".into()]
    }

    pub fn minifier() -> Vec<String> {
        vec!["esbuild".into()]
    }

    pub fn bundler_args() -> Vec<String> {
        Vec::new()
    }

    pub fn main_args() -> Vec<String> {
        Vec::new()
    }
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    pub fn debounce_ms() -> u64 {
        300
    }
}
