use std::{collections::HashMap, fs, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use teams_aad_core::{
    PermissionCatalog, ProvisionResult,
    manifest::{AadManifest, manifest_to_application, resolve_manifest_permissions, validate_manifest},
};
use teams_aad_provisioner::{
    AadProvisioner, Audience, CollaboratorService, DownstreamAccess, ProvisionContext,
    ProvisionReport, RunContext, Settings,
    backend::{GraphBackend, backend_for},
    progress::StderrProgress,
    storage::{EnvScope, FileStateStore, env_state::load_aad_state},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "teams-aad-admin", version)]
struct Cli {
    /// Environment name; overrides AAD_ENV
    #[arg(long)]
    env: Option<String>,
    /// Directory holding permissions.json; overrides AAD_PROJECT_ROOT
    #[arg(long)]
    project_root: Option<PathBuf>,
    /// Environment state directory; overrides AAD_STATE_DIR
    #[arg(long)]
    state_dir: Option<PathBuf>,
    /// Merge declared permissions into existing grants instead of replacing them
    #[arg(long)]
    merge_permissions: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    Provision {
        #[arg(long)]
        local: bool,
    },
    PostProvision {
        #[arg(long)]
        local: bool,
    },
    UpdatePermission {
        #[arg(long)]
        local: bool,
    },
    /// Grant a downstream API scope and redirect URIs to an existing client app
    GrantApiAccess {
        #[arg(long)]
        object_id: String,
        #[arg(long)]
        resource_app_id: String,
        #[arg(long)]
        scope_id: String,
        #[arg(long = "redirect-uri")]
        redirect_uris: Vec<String>,
    },
    ListCollaborators {
        #[arg(long)]
        object_id: Option<String>,
    },
    CheckPermission {
        #[arg(long)]
        object_id: Option<String>,
        /// User object id; defaults to the signed-in user
        #[arg(long)]
        user: Option<String>,
    },
    GrantPermission {
        #[arg(long)]
        object_id: Option<String>,
        #[arg(long)]
        user: String,
    },
    /// Resolve and validate an AAD manifest, then print the Graph application body
    BuildManifest {
        #[arg(long)]
        file: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = settings_with_overrides(&cli)?;
    let catalog = settings
        .permission_catalog()
        .context("failed to load permission catalog")?;

    match cli.cmd {
        Command::BuildManifest { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read manifest at {}", file.display()))?;
            let mut manifest: AadManifest = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse manifest at {}", file.display()))?;
            resolve_manifest_permissions(&mut manifest, &catalog)?;
            for warning in validate_manifest(&manifest) {
                eprintln!("warning: {warning}");
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&manifest_to_application(&manifest))?
            );
        }
        Command::Provision { local } => {
            run_lifecycle(&settings, catalog, local, |p, ctx| p.provision(ctx))?;
        }
        Command::PostProvision { local } => {
            run_lifecycle(&settings, catalog, local, |p, ctx| p.post_provision(ctx))?;
        }
        Command::UpdatePermission { local } => {
            run_lifecycle(&settings, catalog, local, |p, ctx| p.update_permission(ctx))?;
        }
        Command::GrantApiAccess {
            object_id,
            resource_app_id,
            scope_id,
            redirect_uris,
        } => {
            let run = resolve_run(&settings, None)?;
            let backend = backend_for(&run, &settings.endpoints)?;
            let provisioner =
                AadProvisioner::new(Arc::from(backend), catalog).with_retry(settings.retry);
            let access = DownstreamAccess {
                object_id,
                resource_app_id,
                scope_id,
                redirect_uris,
            };
            let report = provisioner.reconcile_downstream_access(&run, &settings.env, &access)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ListCollaborators { object_id } => {
            let service = collaborators(&settings)?;
            let object_id = object_id_or_state(&settings, object_id)?;
            let owners = service.list_collaborators(&object_id)?;
            println!("{}", serde_json::to_string_pretty(&owners)?);
        }
        Command::CheckPermission { object_id, user } => {
            let service = collaborators(&settings)?;
            let object_id = object_id_or_state(&settings, object_id)?;
            let user = match user {
                Some(user) => user,
                None => service.signed_in_user()?.id,
            };
            let status = service.check_permission(&object_id, &user)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::GrantPermission { object_id, user } => {
            let service = collaborators(&settings)?;
            let object_id = object_id_or_state(&settings, object_id)?;
            let status = service.grant_permission(&object_id, &user)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}

/// Command-line flags take precedence over the matching `AAD_*` variables.
fn settings_with_overrides(cli: &Cli) -> anyhow::Result<Settings> {
    let mut overrides: HashMap<&str, String> = HashMap::new();
    if let Some(env) = &cli.env {
        overrides.insert("AAD_ENV", env.clone());
    }
    if let Some(root) = &cli.project_root {
        overrides.insert("AAD_PROJECT_ROOT", root.display().to_string());
    }
    if let Some(state_dir) = &cli.state_dir {
        overrides.insert("AAD_STATE_DIR", state_dir.display().to_string());
    }
    if cli.merge_permissions {
        overrides.insert("AAD_PERMISSION_POLICY", "merge".into());
    }
    Settings::from_lookup(|key| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })
    .context("invalid AAD_* configuration")
}

fn resolve_run(settings: &Settings, audience: Option<Audience>) -> anyhow::Result<RunContext> {
    let provider = settings.tokens.provider(settings.endpoints.timeout)?;
    let run = match audience {
        Some(audience) => RunContext::for_audience(provider.as_ref(), audience),
        None => RunContext::resolve(provider.as_ref()),
    }
    .context("failed to acquire an access token")?;
    Ok(run)
}

fn run_lifecycle<F>(
    settings: &Settings,
    catalog: PermissionCatalog,
    local: bool,
    operation: F,
) -> anyhow::Result<()>
where
    F: FnOnce(&AadProvisioner, &ProvisionContext<'_>) -> ProvisionResult<ProvisionReport>,
{
    let run = resolve_run(settings, None)?;
    let backend = backend_for(&run, &settings.endpoints)?;
    let store = FileStateStore::new(settings.state_dir.clone()).with_context(|| {
        format!("failed to open state directory {}", settings.state_dir.display())
    })?;
    let provisioner = AadProvisioner::new(Arc::from(backend), catalog)
        .with_retry(settings.retry)
        .with_policy(settings.permission_policy)
        .with_progress(Arc::new(StderrProgress));
    let ctx = ProvisionContext::new(
        &run,
        &store,
        EnvScope::new(settings.env.clone(), local),
        settings.project_root.clone(),
    );

    let report = operation(&provisioner, &ctx)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn collaborators(settings: &Settings) -> anyhow::Result<CollaboratorService> {
    let run = resolve_run(settings, Some(Audience::Graph))?;
    let graph = GraphBackend::new(
        &settings.endpoints.graph_base_url,
        run.token(),
        settings.endpoints.timeout,
    )?;
    Ok(CollaboratorService::new(
        Arc::new(graph),
        settings.retry,
        &settings.env,
        run.tenant_id(),
    ))
}

fn object_id_or_state(settings: &Settings, object_id: Option<String>) -> anyhow::Result<String> {
    if let Some(object_id) = object_id {
        return Ok(object_id);
    }
    let store = FileStateStore::new(settings.state_dir.clone())?;
    load_aad_state(&store, &EnvScope::new(&settings.env, false))?
        .object_id
        .context("no objectId in environment state; pass --object-id or run provision first")
}
