//! Minifier collaborator.

use crate::utils::{
    cancel::CancelToken,
    exec::{ExecOptions, exec},
};
use anyhow::Result;
use std::{ffi::OsString, time::Duration};

/// Turns a bundle into its minified form.
pub trait Minifier: Send + Sync {
    fn minify(&self, code: &[u8], cancel: &CancelToken) -> Result<Vec<u8>>;
}

/// Minifies through an esbuild-compatible command line, bundle on stdin.
pub struct EsbuildMinifier {
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl EsbuildMinifier {
    pub fn new(command: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

impl Minifier for EsbuildMinifier {
    fn minify(&self, code: &[u8], cancel: &CancelToken) -> Result<Vec<u8>> {
        let args: Vec<OsString> = ["--minify", "--loader=js", "--log-level=warning"]
            .into_iter()
            .map(OsString::from)
            .collect();
        let options = ExecOptions {
            stdin: Some(code),
            timeout: self.timeout,
            ..Default::default()
        };

        let output = exec(&self.command, &args, &options, cancel)?;
        Ok(output.stdout)
    }
}
