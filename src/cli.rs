use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use sebastian::adapter::{ConversationAdapter, OpenAiAdapter, ScriptedAdapter};
use sebastian::config::Config;
use sebastian::core::store::RecordStore;
use sebastian::discord::DiscordBridge;
use sebastian::liveness::{self, Readiness};
use sebastian::shell::{BotShell, Command, Reply};

#[derive(Parser)]
#[command(name = "sebastian")]
#[command(about = "Sebastian, a demonic butler for your Discord server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to Discord and serve the liveness endpoint (default)
    Run,
    /// Talk to Sebastian from the terminal
    Chat {
        message: String,
        #[command(flatten)]
        target: Target,
    },
    /// Show a user's standing
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// Reward Sebastian
    Reward {
        #[command(flatten)]
        target: Target,
    },
    /// Punish Sebastian
    Punish {
        #[command(flatten)]
        target: Target,
    },
    /// Start a quest
    Quest {
        #[command(flatten)]
        target: Target,
    },
    /// Advance the current quest
    Advance {
        #[command(flatten)]
        target: Target,
    },
    /// Apply one scheduled decay pass to every record
    Tick,
}

/// Which record a local command acts on.
#[derive(Args)]
pub struct Target {
    #[arg(long, default_value = "local")]
    pub server: String,
    #[arg(long, default_value = "local")]
    pub user: String,
    /// Use canned replies instead of calling OpenAI
    #[arg(long)]
    pub offline: bool,
}

impl Cli {
    pub fn runs_bot(&self) -> bool {
        matches!(self.command, None | Some(Commands::Run))
    }
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => handle_run(config).await,
        Commands::Chat { message, target } => {
            let shell = local_shell(&config, target.offline)?;
            let reply = shell.handle_chat(&target.server, &target.user, &message).await;
            print_reply(&reply);
            Ok(())
        }
        Commands::Status { target } => handle_command(&config, target, Command::Status).await,
        Commands::Reward { target } => handle_command(&config, target, Command::Reward).await,
        Commands::Punish { target } => handle_command(&config, target, Command::Punish).await,
        Commands::Quest { target } => handle_command(&config, target, Command::StartQuest).await,
        Commands::Advance { target } => handle_command(&config, target, Command::Advance).await,
        Commands::Tick => {
            let shell = local_shell(&config, true)?;
            let count = shell.tick().await.context("Tick failed")?;
            println!("Decay applied to {} records", count);
            Ok(())
        }
    }
}

async fn handle_command(config: &Config, target: Target, command: Command) -> Result<()> {
    let shell = local_shell(config, target.offline)?;
    let reply = shell.handle_command(&target.server, &target.user, command).await;
    print_reply(&reply);
    Ok(())
}

fn open_store(config: &Config) -> Result<RecordStore> {
    RecordStore::open(&config.db_path)
        .with_context(|| format!("Failed to open store at {}", config.db_path.display()))
}

fn openai_adapter(config: &Config) -> Result<Arc<dyn ConversationAdapter>> {
    let key = config.require_openai_key()?;
    Ok(Arc::new(OpenAiAdapter::new(
        key,
        config.openai_base_url.clone(),
        config.model.clone(),
        config.image_model.clone(),
    )))
}

fn local_shell(config: &Config, offline: bool) -> Result<BotShell> {
    let adapter: Arc<dyn ConversationAdapter> = if offline {
        Arc::new(ScriptedAdapter::default())
    } else {
        openai_adapter(config)?
    };
    Ok(BotShell::new(open_store(config)?, adapter, config.tuning.clone()))
}

fn print_reply(reply: &Reply) {
    if let Some(title) = &reply.title {
        println!("{}", title);
    }
    println!("{}", reply.text);
    if let Some(url) = &reply.image_url {
        println!("{}", url);
    }
    println!("(mood: {})", reply.mood);
}

async fn handle_run(config: Config) -> Result<()> {
    if let Err(e) = config.validate_for_bot() {
        error!("Cannot start: {}", e);
        return Err(e.into());
    }
    let token = config.discord_token.clone().context("DISCORD_TOKEN is not set")?;

    let store = open_store(&config)?;
    let shell = Arc::new(BotShell::new(store, openai_adapter(&config)?, config.tuning.clone()));
    let readiness = Readiness::new();

    let server_readiness = readiness.clone();
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = liveness::serve(port, server_readiness).await {
            error!("Liveness server stopped: {}", e);
        }
    });

    let tick_shell = shell.clone();
    let period = config.tuning.story_event_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            match tick_shell.tick().await {
                Ok(count) => info!(count, "Scheduled decay applied"),
                Err(e) => error!("Scheduled decay failed: {}", e),
            }
        }
    });

    info!("Starting Sebastian");
    DiscordBridge::new(token, shell, readiness)
        .run()
        .await
        .context("Discord gateway stopped")
}
