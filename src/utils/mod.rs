pub mod cancel;
pub mod exec;
pub mod log;
pub mod minify;
