//! `dnpkit resolve` command implementation.

use dnpkit_core::{
    resolve_install, DnpRequest, InstallPlanEntry, InstalledSnapshot, RegistryClient,
    ResolveOptions,
};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolve command arguments.
#[derive(Debug, Clone)]
pub struct ResolveArgs {
    pub request: String,
    pub registry: Option<String>,
    pub installed: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Error info for JSON output.
#[derive(Debug, Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
}

impl ErrorInfo {
    fn new(code: &'static str, error: impl std::fmt::Display) -> Self {
        Self {
            code,
            message: error.to_string(),
        }
    }
}

/// Resolve result for JSON output.
#[derive(Debug, Serialize)]
struct ResolveResult<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a [InstallPlanEntry]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

/// Run the resolve command.
///
/// Prints the install plan to stdout. On failure the error code and message
/// are printed (as JSON with `--json`) and the process exits with status 1.
pub fn run(cwd: &Path, args: &ResolveArgs, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    match runtime.block_on(resolve(cwd, args)) {
        Ok(plan) => {
            if json {
                let result = ResolveResult {
                    ok: true,
                    plan: Some(&plan),
                    error: None,
                };
                println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            } else {
                print_plan(&plan);
            }
            Ok(())
        }
        Err(error) => {
            if json {
                let result = ResolveResult {
                    ok: false,
                    plan: None,
                    error: Some(error),
                };
                println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            } else {
                eprintln!("error: {}: {}", error.code, error.message);
            }
            std::process::exit(1);
        }
    }
}

async fn resolve(cwd: &Path, args: &ResolveArgs) -> Result<Vec<InstallPlanEntry>, ErrorInfo> {
    let request = DnpRequest::parse(&args.request).map_err(|e| ErrorInfo::new(e.code(), &e))?;

    let options = match &args.config {
        Some(path) => {
            ResolveOptions::load(&cwd.join(path)).map_err(|e| ErrorInfo::new(e.code(), &e))?
        }
        None => ResolveOptions::default(),
    };

    let registry = match &args.registry {
        Some(location) => RegistryClient::from_location(location, cwd),
        None => RegistryClient::from_env(cwd),
    }
    .map_err(|e| ErrorInfo::new(e.code(), &e))?;
    debug!(registry = %registry.location(), "using registry");

    let installed = match &args.installed {
        Some(path) => {
            InstalledSnapshot::from_file(&cwd.join(path)).map_err(|e| ErrorInfo::new(e.code(), &e))?
        }
        None => InstalledSnapshot::default(),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    resolve_install(&request, &registry, &installed, &options, &cancel)
        .await
        .map_err(|e| ErrorInfo::new(e.code(), &e))
}

fn print_plan(plan: &[InstallPlanEntry]) {
    if plan.is_empty() {
        println!("Nothing to install");
        return;
    }

    let width = plan.iter().map(|e| e.name.len()).max().unwrap_or(0);
    for entry in plan {
        let status = if entry.needs_install {
            "install"
        } else {
            "up to date"
        };
        println!(
            "{:>3}. {:<width$}  {:<12}  {}",
            entry.order + 1,
            entry.name,
            entry.target_version.to_string(),
            status,
        );
    }

    let to_install = plan.iter().filter(|e| e.needs_install).count();
    println!();
    println!("{to_install} of {} packages to install", plan.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnpkit_core::dnp::codes;

    #[test]
    fn test_error_result_shape() {
        let result = ResolveResult {
            ok: false,
            plan: None,
            error: Some(ErrorInfo::new(
                codes::DNP_REQUEST_INVALID,
                "Invalid request: Empty request",
            )),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["code"], "DNP_REQUEST_INVALID");
        assert!(value.get("plan").is_none());
    }
}
