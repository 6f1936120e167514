//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and credentials are available before
//! starting a job that would otherwise fail midway.

use crate::analysis::ProviderKind;
use crate::config::Settings;
use crate::error::{Result, VidlensError};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Analysis needs ffmpeg and the provider's API key.
    Analyze(ProviderKind),
    /// The server needs ffmpeg; keys are checked per job.
    Serve,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_tool("ffmpeg")?;
    check_tool("ffprobe")?;
    if let Operation::Analyze(provider) = operation {
        check_api_key(provider, settings)?;
    }
    Ok(())
}

/// Check that the API key for `provider` is configured.
pub fn check_api_key(provider: ProviderKind, settings: &Settings) -> Result<()> {
    match provider {
        ProviderKind::Gemini => settings.gemini.resolve_api_key().map(|_| ()).ok_or_else(|| {
            VidlensError::Config(
                "Gemini API key not set. Set it with: export GOOGLE_API_KEY='...' \
                 or [gemini] api_key in the config file"
                    .to_string(),
            )
        }),
        ProviderKind::OpenAi => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(()),
            Ok(_) => Err(VidlensError::Config(
                "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
            )),
            Err(_) => Err(VidlensError::Config(
                "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
            )),
        },
    }
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    // ffmpeg/ffprobe use -version (single dash), others use --version
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(VidlensError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(VidlensError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(VidlensError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_reported() {
        let err = check_tool("vidlens-definitely-not-installed").unwrap_err();
        assert!(matches!(err, VidlensError::ToolNotFound(_)));
    }

    #[test]
    fn test_gemini_key_from_settings() {
        let mut settings = Settings::default();
        settings.gemini.api_key = Some("configured".to_string());
        assert!(check_api_key(ProviderKind::Gemini, &settings).is_ok());
    }
}
