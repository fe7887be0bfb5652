// Command dispatcher (spec §6.4): init, chat, gateway, vault, schedule,
// rollback, identity. Each command bootstraps its own `AgentContext` from
// the resolved config path and data directory, runs, and exits.

use agentcore::atoms::error::CoreError;
use agentcore::atoms::types::{ApprovalStatus, Channel, Role, TurnContext};
use agentcore::config::Config;
use agentcore::pipeline::executor::{ApprovalCallback, StorePollingApproval};
use agentcore::AgentContext;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Exit codes consumed by the shell (spec §6.4).
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG_ERROR: i32 = 64;
    pub const VAULT_AUTH_ERROR: i32 = 65;
    pub const STARTUP_FAILURE: i32 = 70;
    pub const FATAL_SHUTDOWN: i32 = 75;
}

#[derive(Parser, Debug)]
#[command(name = "agent")]
#[command(about = "Run and administer a single autonomous agent install")]
pub struct Args {
    /// Path to the TOML config file.
    #[arg(long, value_name = "PATH", default_value = "agent.toml")]
    pub config: PathBuf,

    /// Data directory (overrides the config's storage.data_dir).
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// First-boot setup: open/create the store, vault, and identity.
    Init,
    /// Send a single message on the CLI channel and print the reply.
    Chat {
        message: String,
    },
    /// Run the WebSocket gateway until interrupted.
    Gateway,
    /// Vault subcommands.
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
    /// Scheduled-task subcommands.
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Restore a prior database snapshot from `<data_dir>/backups/`.
    Rollback {
        revision: String,
    },
    /// Goal subcommands.
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },
    /// Identity subcommands.
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum VaultAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
    Delete { key: String },
    Rotate { new_password: String },
}

#[derive(Subcommand, Debug)]
pub enum ScheduleAction {
    List,
    Create { name: String, schedule_expr: String, goal: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum IdentityAction {
    Status,
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum GoalAction {
    /// Decompose `goal` into checkpoints (a single LLM call) and activate it.
    Create { goal: String },
    List,
    Status { goal_id: String },
}

fn master_password() -> String {
    std::env::var("AGENT_MASTER_PASSWORD").unwrap_or_else(|_| {
        eprint!("master password: ");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).unwrap_or_default();
        line.trim().to_string()
    })
}

fn load_config(path: &std::path::Path) -> Result<Config, i32> {
    let raw = std::fs::read_to_string(path).map_err(|_| exit_code::CONFIG_ERROR)?;
    Config::from_toml_str(&raw).map_err(|e| {
        eprintln!("config error: {e}");
        exit_code::CONFIG_ERROR
    })
}

fn bootstrap(config: Config, data_dir: PathBuf) -> Result<AgentContext, i32> {
    let password = master_password();
    AgentContext::bootstrap(config, data_dir, &password).map_err(|e| match e {
        CoreError::Vault(_) | CoreError::FingerprintMismatch => {
            eprintln!("vault error: {e}");
            exit_code::VAULT_AUTH_ERROR
        }
        other => {
            eprintln!("startup failure: {other}");
            exit_code::STARTUP_FAILURE
        }
    })
}

fn resolve_data_dir(cfg: &Config, override_dir: Option<PathBuf>) -> PathBuf {
    override_dir.unwrap_or_else(|| {
        let raw = &cfg.storage.data_dir;
        match raw.strip_prefix("~/").and_then(|rest| dirs::home_dir().map(|h| h.join(rest))) {
            Some(expanded) => expanded,
            None => PathBuf::from(raw),
        }
    })
}

/// The `chat` command's approval callback: the CLI has no connected gateway
/// client, so it falls back to store-backed polling with an auto-deny once
/// the terminal has no one to answer it (non-interactive use).
struct CliApproval<'a>(StorePollingApproval<'a>);

#[async_trait]
impl<'a> ApprovalCallback for CliApproval<'a> {
    async fn request_approval(&self, tool_name: &str, params: &serde_json::Value, context: &str) -> agentcore::atoms::error::CoreResult<ApprovalStatus> {
        eprintln!("[approval required] {tool_name}: {context}");
        self.0.request_approval(tool_name, params, context).await
    }
}

pub async fn run(args: Args) -> i32 {
    let cfg = match load_config(&args.config) {
        Ok(c) => c,
        Err(code) if matches!(&args.command, Command::Init) => {
            // `init` is allowed to run against a missing config file, using
            // defaults, to produce the very first one.
            let _ = code;
            Config::default()
        }
        Err(code) => return code,
    };
    let data_dir = resolve_data_dir(&cfg, args.data_dir.clone());

    match args.command {
        Command::Init => cmd_init(cfg, data_dir, &args.config),
        Command::Chat { message } => cmd_chat(cfg, data_dir, message).await,
        Command::Gateway => cmd_gateway(cfg, data_dir).await,
        Command::Vault { action } => cmd_vault(cfg, data_dir, action),
        Command::Schedule { action } => cmd_schedule(cfg, data_dir, action),
        Command::Rollback { revision } => cmd_rollback(data_dir, revision),
        Command::Identity { action } => cmd_identity(cfg, data_dir, action),
        Command::Goal { action } => cmd_goal(cfg, data_dir, action).await,
    }
}

fn cmd_init(cfg: Config, data_dir: PathBuf, config_path: &std::path::Path) -> i32 {
    if !config_path.exists() {
        let rendered = toml::to_string_pretty(&cfg).unwrap_or_default();
        if let Err(e) = std::fs::write(config_path, rendered) {
            eprintln!("could not write {}: {e}", config_path.display());
            return exit_code::CONFIG_ERROR;
        }
    }
    let ctx = match bootstrap(cfg, data_dir) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    if ctx.store.get_identity().map(|i| i.is_none()).unwrap_or(true) {
        if let Err(e) = ctx.store.init_identity("owner", "Agent") {
            eprintln!("identity init failed: {e}");
            return exit_code::STARTUP_FAILURE;
        }
    }
    println!("initialized at {}", ctx.workspace_dir.display());
    exit_code::SUCCESS
}

async fn cmd_chat(cfg: Config, data_dir: PathBuf, message: String) -> i32 {
    let ctx = match bootstrap(cfg, data_dir) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    let tier = ctx.config.authority.resolve(&Channel::Cli.to_string(), "owner");
    let session = match ctx.store.connect_session("cli", "owner", tier) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("session error: {e}");
            return exit_code::STARTUP_FAILURE;
        }
    };

    let user_turn = agentcore::atoms::types::Turn {
        role: Role::User,
        content: message,
        tool_calls: vec![],
        tool_call_id: None,
        attachments: vec![],
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = ctx.store.append_turn(&session.session_id, user_turn.clone(), ctx.config.max_conversation_len) {
        eprintln!("store error: {e}");
        return exit_code::STARTUP_FAILURE;
    }

    let mut conversation = session.conversation;
    conversation.push(user_turn);

    let router = ctx.router();
    let executor = ctx.executor(&router);
    let approvals = CliApproval(StorePollingApproval {
        store: &ctx.store,
        session_id: &session.session_id,
        timeout_secs: ctx.config.approval_timeout_seconds,
        poll_interval_ms: 500,
    });

    match executor.run_turn(None, &session.session_id, tier, TurnContext::UserChat, &mut conversation, &approvals).await {
        Ok(outcome) => {
            println!("{}", outcome.final_content);
            if outcome.safety_terminated {
                return exit_code::FATAL_SHUTDOWN;
            }
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("turn failed: {e}");
            exit_code::STARTUP_FAILURE
        }
    }
}

async fn cmd_gateway(cfg: Config, data_dir: PathBuf) -> i32 {
    let ctx = match bootstrap(cfg, data_dir) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    let router = ctx.router();
    let executor = ctx.executor(&router);
    let session_router = agentcore::gateway::SessionRouter::new(&ctx.store, &ctx.config);
    let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));

    {
        let stop = stop.clone();
        let _ = tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        });
    }

    let pause = agentcore::goalrunner::PauseToken::default();
    let inbox = agentcore::mind::EventInbox::default();

    // The goal runner and autonomous mind share this process rather than a
    // separately spawned task: both borrow `executor`/`session_router`,
    // which aren't `'static`, so they run as concurrently polled futures on
    // this same task instead (spec §4.3 "long-lived cooperative worker").
    let (gateway_result, ..) = tokio::join!(
        agentcore::gateway::server::run(&ctx.config, &executor, &session_router, stop.clone()),
        goal_runner_loop(&ctx, &executor, &session_router, &pause, stop.clone()),
        mind_loop(&ctx, &executor, &session_router, &inbox, &pause, stop.clone()),
    );

    match gateway_result {
        Ok(()) => exit_code::SUCCESS,
        Err(e) => {
            eprintln!("gateway error: {e}");
            exit_code::FATAL_SHUTDOWN
        }
    }
}

/// Sleeps up to `secs`, waking early (in ~200ms steps) once `stop` is set, so
/// the driving loops below shut down promptly alongside the gateway.
async fn sleep_or_stop(secs: u64, stop: &std::sync::Arc<std::sync::atomic::AtomicBool>) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(secs);
    while tokio::time::Instant::now() < deadline && !stop.load(std::sync::atomic::Ordering::Relaxed) {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}

/// Drives every active goal's checkpoints to completion (spec §4.3 "Goal
/// Runner" execution loop), resuming `auto_continue` goals on startup and
/// otherwise polling for newly activated ones.
async fn goal_runner_loop(
    ctx: &agentcore::AgentContext,
    executor: &agentcore::pipeline::executor::Executor<'_>,
    session_router: &agentcore::gateway::SessionRouter<'_>,
    pause: &agentcore::goalrunner::PauseToken,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
) {
    use std::sync::atomic::Ordering;

    let runner = agentcore::goalrunner::GoalRunner { cfg: &ctx.config.goal_loop, store: &ctx.store, executor };

    let resumed = agentcore::goalrunner::goals_to_auto_resume(&ctx.store, ctx.config.goal_loop.auto_continue).unwrap_or_default();
    for goal in resumed {
        if let Err(e) = drive_goal(&runner, goal, session_router, pause, &stop).await {
            eprintln!("goal driving loop error: {e}");
        }
    }

    while !stop.load(Ordering::Relaxed) {
        let active = ctx.store.list_goals_by_status(agentcore::atoms::types::GoalStatus::Active).unwrap_or_default();
        for goal in active {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if let Err(e) = drive_goal(&runner, goal, session_router, pause, &stop).await {
                eprintln!("goal driving loop error: {e}");
            }
        }
        sleep_or_stop(5, &stop).await;
    }
}

/// Runs one goal's checkpoints to a terminal or pausing `StepOutcome`,
/// re-fetching the goal row between checkpoints so progress persisted by
/// `step` is visible to the next iteration.
async fn drive_goal(
    runner: &agentcore::goalrunner::GoalRunner<'_>,
    goal: agentcore::store::goals::Goal,
    session_router: &agentcore::gateway::SessionRouter<'_>,
    pause: &agentcore::goalrunner::PauseToken,
    stop: &std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> agentcore::atoms::error::CoreResult<()> {
    use agentcore::goalrunner::StepOutcome;
    use std::sync::atomic::Ordering;

    // Broadcasting approval requests to every qualifying client (spec §4.3
    // step 4) isn't implemented yet; this scopes approvals to the goal's
    // originating session, same as a user-chat turn.
    let approvals = agentcore::gateway::GatewayApproval {
        router: session_router,
        store: runner.store,
        session_id: goal.session_id.clone(),
        timeout_secs: agentcore::atoms::constants::DEFAULT_APPROVAL_TIMEOUT_SECS,
    };

    let mut current = goal;
    let mut checkpoints_since_eval = 0u32;
    loop {
        if stop.load(Ordering::Relaxed) || pause.is_set() {
            return Ok(());
        }
        match runner.step(&current, pause, &approvals).await? {
            StepOutcome::GoalCompleted | StepOutcome::Paused | StepOutcome::BudgetExceeded => return Ok(()),
            StepOutcome::CheckpointAdvanced => {
                checkpoints_since_eval += 1;
                if checkpoints_since_eval >= agentcore::atoms::constants::EVALUATE_PROGRESS_EVERY_N_CHECKPOINTS {
                    checkpoints_since_eval = 0;
                    runner.evaluate_progress(&current).await?;
                }
                runner.pause_between_checkpoints(pause).await;
                current = match runner.store.get_goal(&current.goal_id)? {
                    Some(g) => g,
                    None => return Ok(()),
                };
            }
        }
    }
}

/// Runs the autonomous mind's wake cycle on its own schedule (spec §4.3
/// "Autonomous Mind"); a no-op when `mind.enabled` is false in config.
async fn mind_loop(
    ctx: &agentcore::AgentContext,
    executor: &agentcore::pipeline::executor::Executor<'_>,
    session_router: &agentcore::gateway::SessionRouter<'_>,
    inbox: &agentcore::mind::EventInbox,
    pause: &agentcore::goalrunner::PauseToken,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
) {
    use std::sync::atomic::Ordering;

    if !ctx.config.mind.enabled {
        return;
    }
    // The mind always runs at owner authority regardless of channel resolution
    // (it has no external caller to resolve a tier for); `Mind::wake` relies
    // on this directly for its own tool-call authority.
    let session = match ctx.store.connect_session("mind", "owner", agentcore::atoms::types::AuthorityTier::Owner) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("mind session error: {e}");
            return;
        }
    };
    let mind = agentcore::mind::Mind { cfg: &ctx.config.mind, store: &ctx.store, executor, inbox };
    let mut next_wakeup = ctx.config.mind.wakeup_seconds;

    while !stop.load(Ordering::Relaxed) {
        sleep_or_stop(next_wakeup, &stop).await;
        if stop.load(Ordering::Relaxed) {
            return;
        }
        if pause.is_set() {
            continue;
        }

        let spent = ctx.store.cost_today_total().unwrap_or(0.0);
        let daily_spend_pct = if ctx.config.llm.daily_budget_usd > 0.0 { spent / ctx.config.llm.daily_budget_usd } else { 0.0 };

        let approvals = agentcore::gateway::GatewayApproval {
            router: session_router,
            store: &ctx.store,
            session_id: session.session_id.clone(),
            timeout_secs: ctx.config.approval_timeout_seconds,
        };

        match mind.wake(&session.session_id, &approvals, daily_spend_pct).await {
            Ok(outcome) => next_wakeup = outcome.next_wakeup_seconds,
            Err(e) => {
                eprintln!("mind wakeup error: {e}");
                next_wakeup = ctx.config.mind.wakeup_seconds;
            }
        }
    }
}

async fn cmd_goal(cfg: Config, data_dir: PathBuf, action: GoalAction) -> i32 {
    let ctx = match bootstrap(cfg, data_dir) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    match action {
        GoalAction::Create { goal } => {
            let tier = ctx.config.authority.resolve(&Channel::Cli.to_string(), "owner");
            let session = match ctx.store.connect_session("cli", "owner", tier) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("session error: {e}");
                    return exit_code::STARTUP_FAILURE;
                }
            };
            let router = ctx.router();
            let executor = ctx.executor(&router);
            let created = agentcore::goalrunner::create_goal(
                &executor,
                &session.session_id,
                &goal,
                ctx.config.goal_loop.max_checkpoint_attempts as i64,
                ctx.config.goal_loop.max_checkpoints,
            )
            .await;
            match created {
                Ok(created) => match ctx.store.set_goal_status(&created.goal_id, agentcore::atoms::types::GoalStatus::Active) {
                    Ok(()) => {
                        println!("{}", created.goal_id);
                        exit_code::SUCCESS
                    }
                    Err(e) => {
                        eprintln!("{e}");
                        exit_code::STARTUP_FAILURE
                    }
                },
                Err(e) => {
                    eprintln!("goal creation failed: {e}");
                    exit_code::STARTUP_FAILURE
                }
            }
        }
        GoalAction::List => {
            use agentcore::atoms::types::GoalStatus;
            let statuses =
                [GoalStatus::Planning, GoalStatus::Active, GoalStatus::Paused, GoalStatus::Completed, GoalStatus::Failed, GoalStatus::Cancelled];
            for status in statuses {
                match ctx.store.list_goals_by_status(status) {
                    Ok(goals) => {
                        for g in goals {
                            println!("{}\t{:?}\t{}/{}\t{}", g.goal_id, g.status, g.current_checkpoint, g.total_checkpoints, g.goal);
                        }
                    }
                    Err(e) => {
                        eprintln!("{e}");
                        return exit_code::STARTUP_FAILURE;
                    }
                }
            }
            exit_code::SUCCESS
        }
        GoalAction::Status { goal_id } => match ctx.store.get_goal(&goal_id) {
            Ok(Some(goal)) => {
                println!("{}", serde_json::to_string_pretty(&goal).unwrap_or_default());
                exit_code::SUCCESS
            }
            Ok(None) => {
                eprintln!("no such goal: {goal_id}");
                exit_code::CONFIG_ERROR
            }
            Err(e) => {
                eprintln!("{e}");
                exit_code::STARTUP_FAILURE
            }
        },
    }
}

fn cmd_vault(cfg: Config, data_dir: PathBuf, action: VaultAction) -> i32 {
    let mut ctx = match bootstrap(cfg, data_dir) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    match action {
        VaultAction::Set { key, value } => match ctx.vault.set(&key, &value) {
            Ok(()) => exit_code::SUCCESS,
            Err(e) => {
                eprintln!("vault set failed: {e}");
                exit_code::VAULT_AUTH_ERROR
            }
        },
        VaultAction::Get { key } => match ctx.vault.get(&key) {
            Some(v) => {
                println!("{v}");
                exit_code::SUCCESS
            }
            None => {
                eprintln!("no such key: {key}");
                exit_code::CONFIG_ERROR
            }
        },
        VaultAction::List => {
            for key in ctx.vault.list() {
                println!("{key}");
            }
            exit_code::SUCCESS
        }
        VaultAction::Delete { key } => match ctx.vault.delete(&key) {
            Ok(true) => exit_code::SUCCESS,
            Ok(false) => {
                eprintln!("no such key: {key}");
                exit_code::CONFIG_ERROR
            }
            Err(e) => {
                eprintln!("vault delete failed: {e}");
                exit_code::VAULT_AUTH_ERROR
            }
        },
        VaultAction::Rotate { new_password } => match ctx.vault.rotate(&new_password) {
            Ok(()) => exit_code::SUCCESS,
            Err(e) => {
                eprintln!("vault rotate failed: {e}");
                exit_code::VAULT_AUTH_ERROR
            }
        },
    }
}

fn cmd_schedule(cfg: Config, data_dir: PathBuf, action: ScheduleAction) -> i32 {
    let ctx = match bootstrap(cfg, data_dir) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    match action {
        ScheduleAction::List => {
            match ctx.store.list_scheduled_tasks() {
                Ok(tasks) => {
                    for task in tasks {
                        println!("{}\t{}\t{}\t{}", task.id, task.name, task.schedule_expr, task.goal);
                    }
                    exit_code::SUCCESS
                }
                Err(e) => {
                    eprintln!("{e}");
                    exit_code::STARTUP_FAILURE
                }
            }
        }
        ScheduleAction::Create { name, schedule_expr, goal } => {
            match ctx.store.create_scheduled_task(&name, &schedule_expr, &goal, None) {
                Ok(task) => {
                    println!("{}", task.id);
                    exit_code::SUCCESS
                }
                Err(e) => {
                    eprintln!("{e}");
                    exit_code::STARTUP_FAILURE
                }
            }
        }
        ScheduleAction::Delete { id } => match ctx.store.delete_scheduled_task(&id) {
            Ok(true) => exit_code::SUCCESS,
            Ok(false) => {
                eprintln!("no such scheduled task: {id}");
                exit_code::CONFIG_ERROR
            }
            Err(e) => {
                eprintln!("{e}");
                exit_code::STARTUP_FAILURE
            }
        },
    }
}

/// Restores `<data_dir>/agent.db` from `<data_dir>/backups/agent-<revision>.db`.
/// Creating backups is an operational concern outside this dispatcher; this
/// command only consumes snapshots already present on disk.
fn cmd_rollback(data_dir: PathBuf, revision: String) -> i32 {
    let backup_path = data_dir.join("backups").join(format!("agent-{revision}.db"));
    if !backup_path.exists() {
        eprintln!("no backup found for revision {revision} at {}", backup_path.display());
        return exit_code::CONFIG_ERROR;
    }
    let live_path = data_dir.join(agentcore::atoms::constants::STORE_FILE_NAME);
    match std::fs::copy(&backup_path, &live_path) {
        Ok(_) => {
            println!("restored {} from revision {revision}", live_path.display());
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("rollback failed: {e}");
            exit_code::STARTUP_FAILURE
        }
    }
}

fn cmd_identity(cfg: Config, data_dir: PathBuf, action: IdentityAction) -> i32 {
    let ctx = match bootstrap(cfg, data_dir) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    match action {
        IdentityAction::Status => match ctx.store.get_identity() {
            Ok(Some(identity)) => {
                println!("{}", serde_json::to_string_pretty(&identity).unwrap_or_default());
                exit_code::SUCCESS
            }
            Ok(None) => {
                println!("no identity yet; run `agent init` first");
                exit_code::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                exit_code::STARTUP_FAILURE
            }
        },
        IdentityAction::Reset => match ctx.store.reset_identity() {
            Ok(()) => exit_code::SUCCESS,
            Err(e) => {
                eprintln!("{e}");
                exit_code::STARTUP_FAILURE
            }
        },
    }
}
