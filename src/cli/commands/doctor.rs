//! Doctor command - verify system requirements and configuration.

use crate::analysis::ProviderKind;
use crate::cli::Output;
use crate::config::Settings;
use console::style;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("vidlens doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("External Tools").bold());
    for check in [
        check_tool("ffmpeg", "ffmpeg -version", install_hint_ffmpeg()),
        check_tool("ffprobe", "ffprobe -version", install_hint_ffmpeg()),
    ] {
        check.print();
        checks.push(check);
    }

    println!();

    // A missing key is only an error for the default provider.
    println!("{}", style("API Configuration").bold());
    let default_provider = settings.analysis.provider;
    for check in [
        escalate(check_gemini_key(settings), default_provider == ProviderKind::Gemini),
        escalate(check_openai_api_key(), default_provider == ProviderKind::OpenAi),
    ] {
        check.print();
        checks.push(check);
    }

    println!();

    println!("{}", style("Directories").bold());
    for check in check_directories(settings) {
        check.print();
        checks.push(check);
    }

    println!();

    println!("{}", style("Configuration").bold());
    let config_check = check_config_file();
    config_check.print();
    checks.push(config_check);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before analyzing videos.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! vidlens is ready to use.");
    }

    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str, version_cmd: &str, hint: &str) -> CheckResult {
    let mut parts = version_cmd.split_whitespace();
    let Some(cmd) = parts.next() else {
        return CheckResult::error(name, "no command given", hint);
    };

    match Command::new(cmd).args(parts).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();

            let version_display = if version.chars().count() > 50 {
                format!("{}...", version.chars().take(50).collect::<String>())
            } else {
                version
            };

            CheckResult::ok(name, &version_display)
        }
        Ok(_) => CheckResult::error(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::error(name, "not found", hint)
        }
        Err(e) => CheckResult::error(name, &format!("error: {}", e), hint),
    }
}

fn escalate(mut check: CheckResult, required: bool) -> CheckResult {
    if required && check.status == CheckStatus::Warning && check.message.contains("not set") {
        check.status = CheckStatus::Error;
    }
    check
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn check_gemini_key(settings: &Settings) -> CheckResult {
    match settings.gemini.resolve_api_key() {
        Some(key) => CheckResult::ok(
            "Gemini API key",
            &format!("configured ({}), model {}", mask(&key), settings.gemini.model),
        ),
        None => CheckResult::warning(
            "Gemini API key",
            "not set",
            "Set with: export GOOGLE_API_KEY='...' (required for --provider gemini)",
        ),
    }
}

fn check_openai_api_key() -> CheckResult {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", mask(&key)))
        }
        Ok(key) if key.is_empty() => CheckResult::warning(
            "OPENAI_API_KEY",
            "not set (empty)",
            "Set with: export OPENAI_API_KEY='sk-...' (required for --provider openai)",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...' (required for --provider openai)",
        ),
    }
}

fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    [
        ("Temp directory", settings.temp_dir()),
        ("Upload directory", settings.upload_dir()),
    ]
    .into_iter()
    .map(|(name, dir)| {
        if dir.exists() {
            CheckResult::ok(name, &dir.display().to_string())
        } else {
            CheckResult::warning(
                name,
                &format!("{} (will be created)", dir.display()),
                "Directory will be created on first use",
            )
        }
    })
    .collect()
}

fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: vidlens config init",
        )
    }
}

/// Platform-specific install hint for ffmpeg.
fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}
