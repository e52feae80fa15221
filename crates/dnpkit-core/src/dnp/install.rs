//! The `resolve_install` entry point.

use super::aggregate::{aggregate, annotate_installed};
use super::error::ResolveError;
use super::fetcher::Fetcher;
use super::installed::{select_relevant_installed, InstalledStateProvider};
use super::plan::{build_install_plan, InstallPlanEntry};
use super::resolve::resolve_versions;
use super::spec::{validate_content_hash, validate_name, DnpRequest, VersionSpec};
use crate::config::ResolveOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Compute the install plan for `request`.
///
/// Reads the installed snapshot once, aggregates every candidate reachable
/// from the request and the installed packages that depend on it, picks one
/// version per needed package, and orders the result for installation.
/// Either a complete plan or an error is returned, never a partial plan.
///
/// # Errors
/// - [`ResolveError::InvalidRequest`] for a malformed request
/// - [`ResolveError::InstalledState`] if the installed snapshot cannot be read
/// - [`ResolveError::UnsatisfiableConstraint`] if no consistent assignment exists
/// - [`ResolveError::Cancelled`] if `cancel` fires before completion
#[tracing::instrument(skip_all, fields(request = %request))]
pub async fn resolve_install(
    request: &DnpRequest,
    fetcher: &dyn Fetcher,
    installed: &dyn InstalledStateProvider,
    options: &ResolveOptions,
    cancel: &CancellationToken,
) -> Result<Vec<InstallPlanEntry>, ResolveError> {
    validate_name(&request.name)?;
    if let VersionSpec::Origin(hash) = &request.spec {
        validate_content_hash(hash)?;
    }

    let installed = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ResolveError::Cancelled),
        listed = installed.list() => listed?,
    };

    let relevant = select_relevant_installed(&request.name, &installed);
    info!(
        installed = installed.len(),
        relevant = relevant.len(),
        "selected relevant installed packages"
    );

    let (mut universe, _stats) = aggregate(
        request,
        &relevant,
        fetcher,
        options.max_concurrent_fetches,
        cancel,
    )
    .await?;
    annotate_installed(&mut universe, &installed);

    if cancel.is_cancelled() {
        return Err(ResolveError::Cancelled);
    }

    let resolved = resolve_versions(&universe, options.max_resolve_steps)?;
    let plan = build_install_plan(&universe, &resolved, &installed, &options.orchestrator);

    info!(
        entries = plan.len(),
        to_install = plan.iter().filter(|e| e.needs_install).count(),
        "install plan ready"
    );

    Ok(plan)
}
