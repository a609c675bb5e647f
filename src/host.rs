//! Script host boundary.
//!
//! The pipeline emits JavaScript; something else owns the realm that runs it
//! (a page, a webview, an embedded engine). `execute_and_render` and
//! `hot_reload` deliver their scripts through this trait.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::CompileResult;

#[async_trait]
pub trait ScriptHost: Send + Sync {
    /// Evaluate a script in the realm that owns the document.
    async fn eval(&self, script: &str) -> CompileResult<()>;
}

/// Host that discards scripts. Useful when only the bundle string is wanted.
#[derive(Debug, Default)]
pub struct NullHost;

#[async_trait]
impl ScriptHost for NullHost {
    async fn eval(&self, script: &str) -> CompileResult<()> {
        debug!(bytes = script.len(), "no host attached; script discarded");
        Ok(())
    }
}

/// Host that records every delivered script, for tests and embedders that
/// forward scripts elsewhere.
#[derive(Debug, Default)]
pub struct RecordingHost {
    scripts: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }

    pub fn last_script(&self) -> Option<String> {
        self.scripts.lock().last().cloned()
    }
}

#[async_trait]
impl ScriptHost for RecordingHost {
    async fn eval(&self, script: &str) -> CompileResult<()> {
        self.scripts.lock().push(script.to_string());
        Ok(())
    }
}
