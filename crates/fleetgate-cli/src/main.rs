// crates/fleetgate-cli/src/main.rs
// ============================================================================
// Module: Fleetgate CLI Entry Point
// Description: Command dispatcher for the fleetgate-agent and
//              fleetgate-controller processes, plus one-shot operator
//              commands against a controller's configuration.
// Purpose: Give operators a single binary to run either half of the system
//          and to drive resolution, rules, the registry, and deployments
//          without standing up the HTTP API.
// Dependencies: clap, fleetgate-agent, fleetgate-controller, fleetgate-core,
//               fleetgate-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! `fleetgate agent serve` and `fleetgate controller serve` run the two
//! long-lived processes (§4.5, §4.9, §4.10). Every other subcommand is a
//! one-shot operator tool: it loads the same [`fleetgate_core::config::Settings`]
//! a running controller would, builds a [`fleetgate_controller::Controller`]
//! directly over the configured Rule Store and agents, performs one
//! operation, and exits — the controller process and this CLI are
//! independent clients of the same SQLite-backed Rule Store (§6), not
//! client and server of each other.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use fleetgate_agent::AgentServer;
use fleetgate_agent::LocalAgent;
use fleetgate_controller::ChangeRequest;
use fleetgate_controller::Scheduler;
use fleetgate_core::ConfigTarget;
use fleetgate_core::ConfigType;
use fleetgate_core::DeploymentId;
use fleetgate_core::GroupId;
use fleetgate_core::Instance;
use fleetgate_core::InstanceGroup;
use fleetgate_core::InstanceId;
use fleetgate_core::NewConfigRule;
use fleetgate_core::Plugin;
use fleetgate_core::PluginId;
use fleetgate_core::ResolveQuery;
use fleetgate_core::RuleFilter;
use fleetgate_core::RuleId;
use fleetgate_core::Scope;
use fleetgate_core::Tag;
use fleetgate_core::TagId;
use fleetgate_core::ValueType;
use serde::Deserialize;
use thiserror::Error;

mod config;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "fleetgate", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Host-local agent process commands (§4.5).
    Agent {
        /// Selected agent subcommand.
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Controller process commands (§4.6, §4.9, §4.10).
    Controller {
        /// Selected controller subcommand.
        #[command(subcommand)]
        command: ControllerCommand,
    },
    /// Resolves a single `(instance, target)` query (§4.3).
    Resolve(ResolveArgs),
    /// Drift scan commands (§4.4).
    Drift {
        /// Selected drift subcommand.
        #[command(subcommand)]
        command: DriftCommand,
    },
    /// Policy rule commands (§4.2).
    Rule {
        /// Selected rule subcommand.
        #[command(subcommand)]
        command: RuleCommand,
    },
    /// Instance registry commands (§4.9).
    Instance {
        /// Selected instance subcommand.
        #[command(subcommand)]
        command: InstanceCommand,
    },
    /// Plugin, group, and tag registry commands (§4.8, §9).
    Registry {
        /// Selected registry subcommand.
        #[command(subcommand)]
        command: RegistryCommand,
    },
    /// Deployment orchestrator commands (§4.7).
    Deploy {
        /// Selected deployment subcommand.
        #[command(subcommand)]
        command: DeployCommand,
    },
}

/// Agent process subcommands.
#[derive(Subcommand, Debug)]
enum AgentCommand {
    /// Runs the Agent RPC server (blocking) for this host (§6).
    Serve(AgentServeArgs),
}

/// Arguments for `agent serve`.
#[derive(Args, Debug)]
struct AgentServeArgs {
    /// Path to this host's agent TOML configuration.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,
}

/// Controller process subcommands.
#[derive(Subcommand, Debug)]
enum ControllerCommand {
    /// Runs the control-plane HTTP API and scheduler (§4.9, §4.10).
    Serve(ControllerServeArgs),
}

/// Arguments for `controller serve`.
#[derive(Args, Debug)]
struct ControllerServeArgs {
    /// Path to the controller's Settings TOML configuration.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,
    /// Address the control-plane API binds.
    #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,
    /// Skip starting the discovery/drift-scan/heartbeat scheduler.
    #[arg(long)]
    no_scheduler: bool,
}

/// Arguments shared by every command that reaches a controller's Settings.
#[derive(Args, Debug)]
struct SettingsArgs {
    /// Path to the controller's Settings TOML configuration.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,
}

/// Arguments for `resolve`.
#[derive(Args, Debug)]
struct ResolveArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Instance to resolve against.
    #[arg(long)]
    instance: String,
    /// Dotted key path.
    #[arg(long)]
    key: String,
    /// Config file relative path.
    #[arg(long)]
    file: String,
    /// Plugin owning `file`, if any.
    #[arg(long)]
    plugin: Option<String>,
}

/// Drift scan subcommands.
#[derive(Subcommand, Debug)]
enum DriftCommand {
    /// Scans one instance, or every active instance when omitted.
    Scan(DriftScanArgs),
}

/// Arguments for `drift scan`.
#[derive(Args, Debug)]
struct DriftScanArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Restrict the scan to a single instance.
    #[arg(long)]
    instance: Option<String>,
}

/// Rule subcommands.
#[derive(Subcommand, Debug)]
enum RuleCommand {
    /// Inserts a new rule from a JSON request file.
    Put(RulePutArgs),
    /// Deactivates a rule by id.
    Deactivate(RuleDeactivateArgs),
    /// Lists rules matching a filter.
    List(RuleListArgs),
}

/// Arguments for `rule put`.
#[derive(Args, Debug)]
struct RulePutArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Path to a JSON file with `{scope, target, value, value_type,
    /// security_sensitive?}`.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

/// Arguments for `rule deactivate`.
#[derive(Args, Debug)]
struct RuleDeactivateArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Rule identifier to deactivate.
    #[arg(long)]
    id: u64,
}

/// Arguments for `rule list`.
#[derive(Args, Debug)]
struct RuleListArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Restrict to rules targeting this plugin.
    #[arg(long)]
    plugin: Option<String>,
    /// Restrict to rules at this file.
    #[arg(long)]
    file: Option<String>,
    /// Restrict to active rules only.
    #[arg(long)]
    active_only: bool,
}

/// Instance registry subcommands.
#[derive(Subcommand, Debug)]
enum InstanceCommand {
    /// Registers an instance, or updates its registry row, from a JSON file.
    Register(InstanceRegisterArgs),
    /// Lists every instance the registry currently knows about.
    List(SettingsOnlyArgs),
}

/// Arguments for `instance register`.
#[derive(Args, Debug)]
struct InstanceRegisterArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Path to a JSON file with `{id, name, host, platform, port, active,
    /// last_seen}`.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

/// Arguments for any command that only needs a Settings path.
#[derive(Args, Debug)]
struct SettingsOnlyArgs {
    #[command(flatten)]
    settings: SettingsArgs,
}

/// Plugin, group, and tag registry subcommands (§4.8, §9).
#[derive(Subcommand, Debug)]
enum RegistryCommand {
    /// Upserts a plugin catalog entry from a JSON file.
    PutPlugin(RegistryFileArgs),
    /// Upserts an instance group's metadata from a JSON file.
    PutGroup(RegistryFileArgs),
    /// Adds an instance to a group.
    AddGroupMember(RegistryMemberArgs),
    /// Upserts a tag's metadata from a JSON file.
    PutTag(RegistryFileArgs),
    /// Assigns a tag to an instance.
    AddTagMember(RegistryMemberArgs),
}

/// Arguments for a registry `put-*` command taking a JSON file.
#[derive(Args, Debug)]
struct RegistryFileArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Path to the JSON file describing the entity.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

/// Arguments for adding an instance to a group or tag.
#[derive(Args, Debug)]
struct RegistryMemberArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Group or tag identifier.
    #[arg(long)]
    id: String,
    /// Instance to add.
    #[arg(long)]
    instance: String,
}

/// Deployment subcommands.
#[derive(Subcommand, Debug)]
enum DeployCommand {
    /// Plans a deployment from a JSON change-set file without executing it.
    Plan(DeployPlanArgs),
    /// Executes a previously planned deployment.
    Execute(DeployIdArgs),
    /// Manually rolls back a deployment.
    Rollback(DeployIdArgs),
}

/// Arguments for `deploy plan`.
#[derive(Args, Debug)]
struct DeployPlanArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Path to a JSON file with a `[{instance, target}, ...]` change set.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

/// Arguments for `deploy execute` and `deploy rollback`.
#[derive(Args, Debug)]
struct DeployIdArgs {
    #[command(flatten)]
    settings: SettingsArgs,
    /// Deployment identifier.
    #[arg(long)]
    id: u64,
}

/// Request body shape for `rule put`, mirroring the control-plane API's
/// `POST /rules`.
#[derive(Debug, Deserialize)]
struct PutRuleRequest {
    /// Scope this rule applies at.
    scope: Scope,
    /// Target this rule sets.
    target: ConfigTarget,
    /// Literal value, pre variable-substitution.
    value: serde_json::Value,
    /// Declared type the literal must coerce into.
    value_type: ValueType,
    /// Whether drift on this key is elevated to `error` severity.
    #[serde(default)]
    security_sensitive: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for operator-facing failure messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Agent { command } => command_agent(command),
        Commands::Controller { command } => command_controller(command).await,
        Commands::Resolve(args) => command_resolve(args),
        Commands::Drift { command } => command_drift(command),
        Commands::Rule { command } => command_rule(command),
        Commands::Instance { command } => command_instance(command),
        Commands::Registry { command } => command_registry(command),
        Commands::Deploy { command } => command_deploy(command),
    }
}

// ============================================================================
// SECTION: Agent Commands
// ============================================================================

/// Dispatches agent subcommands.
fn command_agent(command: AgentCommand) -> CliResult<ExitCode> {
    match command {
        AgentCommand::Serve(args) => command_agent_serve(&args),
    }
}

/// Runs the blocking Agent RPC server on the calling thread.
fn command_agent_serve(args: &AgentServeArgs) -> CliResult<ExitCode> {
    let agent_config = config::load_agent_config(&args.config)?;
    let bind_addr = agent_config.bind_addr.clone();
    let local_agent = LocalAgent::new(agent_config);
    let server = AgentServer::new(Arc::new(local_agent));
    server.run(&bind_addr).map_err(|err| CliError::new(format!("agent server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Controller Commands
// ============================================================================

/// Dispatches controller subcommands.
async fn command_controller(command: ControllerCommand) -> CliResult<ExitCode> {
    match command {
        ControllerCommand::Serve(args) => command_controller_serve(args).await,
    }
}

/// Runs the control-plane HTTP API, optionally alongside the scheduler.
async fn command_controller_serve(args: ControllerServeArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.config)?;
    let controller = config::build_controller(&settings)?;

    let _scheduler = if args.no_scheduler {
        None
    } else {
        Some(Scheduler::start(Arc::clone(&controller), &settings.scheduler))
    };

    write_stderr_line(&format!("fleetgate controller listening on {}", args.bind))?;
    fleetgate_controller::api::serve(controller, args.bind)
        .await
        .map_err(|err| CliError::new(format!("control-plane api failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Resolve Command
// ============================================================================

/// Executes `resolve`.
fn command_resolve(args: ResolveArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let query = ResolveQuery {
        instance: InstanceId::new(args.instance),
        target: ConfigTarget {
            config_type: if args.plugin.is_some() { ConfigType::Plugin } else { ConfigType::Standard },
            plugin: args.plugin.map(PluginId::new),
            file: args.file,
            key: args.key,
        },
    };
    let resolved = controller.resolve(&query).map_err(|err| CliError::new(format!("resolve failed: {err}")))?;
    print_json(&resolved)
}

// ============================================================================
// SECTION: Drift Commands
// ============================================================================

/// Dispatches drift subcommands.
fn command_drift(command: DriftCommand) -> CliResult<ExitCode> {
    match command {
        DriftCommand::Scan(args) => command_drift_scan(args),
    }
}

/// Executes `drift scan`.
fn command_drift_scan(args: DriftScanArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let items = match args.instance {
        Some(instance) => controller.scan_drift(&InstanceId::new(instance)),
        None => controller.scan_drift_all(),
    }
    .map_err(|err| CliError::new(format!("drift scan failed: {err}")))?;
    print_json(&items)
}

// ============================================================================
// SECTION: Rule Commands
// ============================================================================

/// Dispatches rule subcommands.
fn command_rule(command: RuleCommand) -> CliResult<ExitCode> {
    match command {
        RuleCommand::Put(args) => command_rule_put(&args),
        RuleCommand::Deactivate(args) => command_rule_deactivate(&args),
        RuleCommand::List(args) => command_rule_list(&args),
    }
}

/// Executes `rule put`.
fn command_rule_put(args: &RulePutArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let body: PutRuleRequest = read_json_file(&args.file)?;
    let rule = NewConfigRule {
        scope: body.scope,
        target: body.target,
        value: body.value,
        value_type: body.value_type,
        security_sensitive: body.security_sensitive,
    };
    let id = controller.set_rule(rule).map_err(|err| CliError::new(format!("rule put failed: {err}")))?;
    write_stdout_line(&format!("rule id {}", id.get()))
}

/// Executes `rule deactivate`.
fn command_rule_deactivate(args: &RuleDeactivateArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let id = RuleId::from_raw(args.id).ok_or_else(|| CliError::new("rule id must be non-zero"))?;
    controller.deactivate_rule(id).map_err(|err| CliError::new(format!("rule deactivate failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `rule list`.
fn command_rule_list(args: &RuleListArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let filter = RuleFilter { plugin: args.plugin.clone().map(PluginId::new), file: args.file.clone(), active_only: args.active_only };
    let rules = controller.list_rules(&filter).map_err(|err| CliError::new(format!("rule list failed: {err}")))?;
    print_json(&rules)
}

// ============================================================================
// SECTION: Instance Commands
// ============================================================================

/// Dispatches instance subcommands.
fn command_instance(command: InstanceCommand) -> CliResult<ExitCode> {
    match command {
        InstanceCommand::Register(args) => command_instance_register(&args),
        InstanceCommand::List(args) => command_instance_list(&args),
    }
}

/// Executes `instance register`.
fn command_instance_register(args: &InstanceRegisterArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let instance: Instance = read_json_file(&args.file)?;
    controller.register_instance(instance).map_err(|err| CliError::new(format!("instance register failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `instance list`.
fn command_instance_list(args: &SettingsOnlyArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let instances = controller.list_instances().map_err(|err| CliError::new(format!("instance list failed: {err}")))?;
    print_json(&instances)
}

// ============================================================================
// SECTION: Registry Commands
// ============================================================================

/// Dispatches registry subcommands.
fn command_registry(command: RegistryCommand) -> CliResult<ExitCode> {
    match command {
        RegistryCommand::PutPlugin(args) => command_registry_put_plugin(&args),
        RegistryCommand::PutGroup(args) => command_registry_put_group(&args),
        RegistryCommand::AddGroupMember(args) => command_registry_add_group_member(&args),
        RegistryCommand::PutTag(args) => command_registry_put_tag(&args),
        RegistryCommand::AddTagMember(args) => command_registry_add_tag_member(&args),
    }
}

/// Executes `registry put-plugin`.
fn command_registry_put_plugin(args: &RegistryFileArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let plugin: Plugin = read_json_file(&args.file)?;
    controller.put_plugin(plugin).map_err(|err| CliError::new(format!("put plugin failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `registry put-group`.
fn command_registry_put_group(args: &RegistryFileArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let group: InstanceGroup = read_json_file(&args.file)?;
    controller.put_group(group).map_err(|err| CliError::new(format!("put group failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `registry add-group-member`.
fn command_registry_add_group_member(args: &RegistryMemberArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let group = GroupId::new(args.id.clone());
    let instance = InstanceId::new(args.instance.clone());
    controller.add_group_member(&group, &instance).map_err(|err| CliError::new(format!("add group member failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `registry put-tag`.
fn command_registry_put_tag(args: &RegistryFileArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let tag: Tag = read_json_file(&args.file)?;
    controller.put_tag(tag).map_err(|err| CliError::new(format!("put tag failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `registry add-tag-member`.
fn command_registry_add_tag_member(args: &RegistryMemberArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let tag = TagId::new(args.id.clone());
    let instance = InstanceId::new(args.instance.clone());
    controller.add_tag_member(&tag, &instance).map_err(|err| CliError::new(format!("add tag member failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Deploy Commands
// ============================================================================

/// Dispatches deploy subcommands.
fn command_deploy(command: DeployCommand) -> CliResult<ExitCode> {
    match command {
        DeployCommand::Plan(args) => command_deploy_plan(&args),
        DeployCommand::Execute(args) => command_deploy_execute(&args),
        DeployCommand::Rollback(args) => command_deploy_rollback(&args),
    }
}

/// Executes `deploy plan`.
fn command_deploy_plan(args: &DeployPlanArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let requests: Vec<ChangeRequest> = read_json_file(&args.file)?;
    let deployment = controller.plan_deployment(requests).map_err(|err| CliError::new(format!("deploy plan failed: {err}")))?;
    print_json(&deployment)
}

/// Executes `deploy execute`.
fn command_deploy_execute(args: &DeployIdArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let id = DeploymentId::from_raw(args.id).ok_or_else(|| CliError::new("deployment id must be non-zero"))?;
    let deployment = controller.execute_deployment(id).map_err(|err| CliError::new(format!("deploy execute failed: {err}")))?;
    print_json(&deployment)
}

/// Executes `deploy rollback`.
fn command_deploy_rollback(args: &DeployIdArgs) -> CliResult<ExitCode> {
    let settings = config::load_settings(&args.settings.config)?;
    let controller = config::build_controller(&settings)?;
    let id = DeploymentId::from_raw(args.id).ok_or_else(|| CliError::new("deployment id must be non-zero"))?;
    let deployment = controller.rollback_deployment(id).map_err(|err| CliError::new(format!("deploy rollback failed: {err}")))?;
    print_json(&deployment)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Reads and parses a JSON request file.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let bytes = std::fs::read(path).map_err(|err| CliError::new(format!("failed to read {}: {err}", path.display())))?;
    serde_json::from_slice(&bytes).map_err(|err| CliError::new(format!("failed to parse {}: {err}", path.display())))
}

/// Serializes `value` as pretty JSON and writes it to stdout.
fn print_json<T: serde::Serialize>(value: &T) -> CliResult<ExitCode> {
    let text = serde_json::to_string_pretty(value).map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    write_stdout_line(&text)?;
    Ok(ExitCode::SUCCESS)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> CliResult<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}").map_err(|err| CliError::new(format!("failed to write stderr: {err}")))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
