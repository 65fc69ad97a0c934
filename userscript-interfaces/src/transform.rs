//! Code transformation interface

use async_trait::async_trait;
use userscript_core::{Result, ScriptLang};

/// Executable JavaScript produced by a [`CodeTransformer`]
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub code: String,
}

/// Compiles script sources into CommonJS-style JavaScript.
///
/// Compiler rejections are reported as `EngineError::NotSupported`.
#[async_trait]
pub trait CodeTransformer: Send + Sync {
    async fn transform(&self, code: &str, lang: ScriptLang) -> Result<TransformOutput>;
}
