//! Pointgate daemon: runs the node, or performs one-off admin operations
//! against its data directory.

use anyhow::Context;
use clap::Parser;
use pointgate_ledger::NewCode;
use pointgate_node::{init_logging, LogFormat, NodeConfig, PointgateNode};
use pointgate_types::UserId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pointgate", about = "Points ledger and verification governor")]
struct Cli {
    /// Data directory for LMDB storage.
    #[arg(long, env = "POINTGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "POINTGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "POINTGATE_LOG_FORMAT")]
    log_format: Option<String>,

    /// Enable Prometheus metrics.
    #[arg(long, env = "POINTGATE_ENABLE_METRICS")]
    metrics: bool,

    /// Disable the load monitor.
    #[arg(long, env = "POINTGATE_DISABLE_MONITOR")]
    disable_monitor: bool,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "POINTGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Account administration.
    #[command(name = "account")]
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Redeemable code administration.
    #[command(name = "code")]
    Code {
        #[command(subcommand)]
        action: CodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT/SIGTERM.
    Run,
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(clap::Subcommand)]
enum AccountAction {
    /// Show one account.
    Show { id: u64 },
    /// Add points to an account.
    Credit { id: u64, amount: i64 },
    /// Block an account.
    Block { id: u64 },
    /// Unblock an account.
    Unblock { id: u64 },
    /// List blocked accounts.
    Blocked,
}

#[derive(clap::Subcommand)]
enum CodeAction {
    /// Mint a code.
    Create {
        code: String,
        value: i64,
        #[arg(long, default_value_t = 1)]
        max_uses: u32,
        /// Days until expiry; omit or pass 0 for none.
        #[arg(long)]
        expiry_days: Option<u32>,
        /// Id recorded as the creator.
        #[arg(long, default_value_t = 0)]
        creator: u64,
    },
    /// List codes, newest first.
    List {
        #[arg(long)]
        creator: Option<u64>,
    },
    /// Show a code and its usage history.
    Show { code: String },
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_string_lossy();
            NodeConfig::from_toml_file(&path)
                .with_context(|| format!("failed to load config file {path}"))?
        }
        None => NodeConfig::default(),
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    config.enable_metrics |= cli.metrics;
    if cli.disable_monitor {
        config.governor.enable_monitor = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let format: LogFormat = config.log_format.parse().map_err(anyhow::Error::msg)?;
    init_logging(format, &config.log_level);

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Run => {
                tracing::info!(
                    data_dir = %config.data_dir.display(),
                    categories = config.governor.categories.len(),
                    monitor = config.governor.enable_monitor,
                    metrics = config.enable_metrics,
                    "starting pointgate node"
                );
                let mut node = PointgateNode::new(config)?;
                node.start()?;

                node.shutdown.wait_for_signal().await;
                tracing::info!("shutdown signal received, stopping node");
                node.stop().await?;

                tracing::info!("pointgate daemon exited cleanly");
            }
            NodeAction::Config => {
                println!("{}", config.to_toml_string()?);
            }
        },
        Command::Account { action } => {
            let mut node = PointgateNode::new(config)?;
            let ledger = &node.ledger;
            match action {
                AccountAction::Show { id } => match ledger.get_account(UserId::new(id))? {
                    Some(account) => {
                        println!("id:          {}", account.id);
                        println!("username:    {}", account.username.as_deref().unwrap_or("-"));
                        println!("name:        {}", account.display_name);
                        println!("balance:     {}", account.balance);
                        println!("blocked:     {}", account.blocked);
                        println!(
                            "referred_by: {}",
                            account.referred_by.map_or("-".to_string(), |r| r.to_string())
                        );
                        let invited = ledger.referrals(account.id)?.len();
                        println!("invited:     {invited}");
                    }
                    None => println!("account {id} not found"),
                },
                AccountAction::Credit { id, amount } => {
                    let balance = ledger.credit(UserId::new(id), amount)?;
                    println!("account {id} balance: {balance}");
                }
                AccountAction::Block { id } => {
                    ledger.set_blocked(UserId::new(id), true)?;
                    println!("account {id} blocked");
                }
                AccountAction::Unblock { id } => {
                    ledger.set_blocked(UserId::new(id), false)?;
                    println!("account {id} unblocked");
                }
                AccountAction::Blocked => {
                    for account in ledger.blocked_accounts()? {
                        println!("{}\t{}", account.id, account.display_name);
                    }
                }
            }
            node.stop().await?;
        }
        Command::Code { action } => {
            let mut node = PointgateNode::new(config)?;
            let codes = &node.codes;
            match action {
                CodeAction::Create {
                    code,
                    value,
                    max_uses,
                    expiry_days,
                    creator,
                } => {
                    let mut new = NewCode::new(code, value, UserId::new(creator)).max_uses(max_uses);
                    if let Some(days) = expiry_days {
                        new = new.expires_in_days(days);
                    }
                    let created = codes.create_code(new)?;
                    println!(
                        "created {} worth {} ({} uses)",
                        created.code, created.value, created.max_uses
                    );
                }
                CodeAction::List { creator } => {
                    for code in codes.list_codes(creator.map(UserId::new))? {
                        println!(
                            "{}\t{}\t{}/{}\t{}",
                            code.code,
                            code.value,
                            code.current_uses,
                            code.max_uses,
                            code.expires_at
                                .map_or("never".to_string(), |t| t.as_secs().to_string())
                        );
                    }
                }
                CodeAction::Show { code } => match codes.get_code(&code)? {
                    Some(found) => {
                        println!(
                            "{}: value {}, {} of {} uses",
                            found.code, found.value, found.current_uses, found.max_uses
                        );
                        for usage in codes.usages(&code)? {
                            println!("  {}\t{}", usage.user, usage.used_at.as_secs());
                        }
                    }
                    None => println!("code {code} not found"),
                },
            }
            node.stop().await?;
        }
    }

    Ok(())
}
