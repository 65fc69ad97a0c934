//! Script transformers

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use userscript_config::{ScriptConfig, TransformerKind};
use userscript_core::{EngineError, Result, ScriptLang};
use userscript_interfaces::{CodeTransformer, TransformOutput};

/// Compiles scripts to CommonJS with an `esbuild` executable
pub struct EsbuildTransformer {
    program: String,
}

impl EsbuildTransformer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CodeTransformer for EsbuildTransformer {
    async fn transform(&self, code: &str, lang: ScriptLang) -> Result<TransformOutput> {
        let mut child = Command::new(&self.program)
            .arg(format!("--loader={}", lang.extension()))
            .arg("--format=cjs")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::not_supported(format!(
                    "Cannot start the script compiler '{}': {}",
                    self.program, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await?;
            // Closing stdin lets esbuild start compiling
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let diagnostics = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::not_supported(format!(
                "Failed to compile {} script:\n{}",
                lang,
                diagnostics.trim()
            )));
        }

        debug!(%lang, bytes = output.stdout.len(), "Script transformed by esbuild");
        Ok(TransformOutput {
            code: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Runs JavaScript as written and rejects TypeScript
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTransformer;

#[async_trait]
impl CodeTransformer for PassthroughTransformer {
    async fn transform(&self, code: &str, lang: ScriptLang) -> Result<TransformOutput> {
        match lang {
            ScriptLang::Js => Ok(TransformOutput {
                code: code.to_string(),
            }),
            ScriptLang::Ts => Err(EngineError::not_supported(
                "TypeScript scripts need a transformer; set script.transformer to esbuild",
            )),
        }
    }
}

/// Transformer selected by `script.transformer`
pub fn transformer_from_config(config: &ScriptConfig) -> Arc<dyn CodeTransformer> {
    match config.transformer {
        TransformerKind::None => Arc::new(PassthroughTransformer),
        TransformerKind::Esbuild => Arc::new(EsbuildTransformer::new(config.esbuild_path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_keeps_js() {
        let output = PassthroughTransformer
            .transform("exports.main = () => 1;", ScriptLang::Js)
            .await
            .unwrap();
        assert_eq!(output.code, "exports.main = () => 1;");
    }

    #[tokio::test]
    async fn test_passthrough_rejects_ts() {
        let err = PassthroughTransformer
            .transform("export const x: number = 1;", ScriptLang::Ts)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_missing_compiler_is_not_supported() {
        let transformer = EsbuildTransformer::new("/nonexistent/esbuild-binary");
        let err = transformer.transform("1", ScriptLang::Ts).await.unwrap_err();
        assert!(matches!(err, EngineError::NotSupported(ref m) if m.contains("esbuild-binary")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compiler_rejection_carries_diagnostics() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("esbuild");
        std::fs::write(&fake, "#!/bin/sh\ncat > /dev/null\necho 'ERROR: Expected \";\"' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let transformer = EsbuildTransformer::new(fake.to_string_lossy());
        let err = transformer.transform("let x =", ScriptLang::Ts).await.unwrap_err();
        assert!(matches!(err, EngineError::NotSupported(ref m) if m.contains("Expected")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compiler_output_is_returned() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("esbuild");
        std::fs::write(&fake, "#!/bin/sh\necho \"// $1 $2\"\ncat\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let transformer = EsbuildTransformer::new(fake.to_string_lossy());
        let output = transformer.transform("exports.a = 1;", ScriptLang::Ts).await.unwrap();
        assert_eq!(output.code, "// --loader=ts --format=cjs\nexports.a = 1;");
    }
}
