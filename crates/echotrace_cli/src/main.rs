mod lookup;
mod output;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use branch_tree::{ConversationId, NodePatch};
use chat_service::{build_service, AppConfig, ConversationService, AVAILABLE_MODELS};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FORK_NAME: &str = "Branch";

#[derive(Parser)]
#[command(name = "echotrace")]
#[command(about = "Branchable conversations with a language model")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.echotrace/config.toml or ./echotrace.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the model for this invocation
    #[arg(long, global = true)]
    model: Option<String>,

    /// Enable debug logging
    #[arg(long, short, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a conversation
    New {
        #[arg(long)]
        title: Option<String>,
    },
    /// List conversations
    List,
    /// Print the active (or given) branch of a conversation
    Show {
        conversation: Option<String>,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Send one message and record the reply
    Say {
        conversation: String,
        message: String,
        /// Node recorded as the new exchange's parent
        #[arg(long)]
        parent: Option<String>,
    },
    /// Interactive chat on the active branch
    Chat { conversation: Option<String> },
    /// Fork a new branch ending at a node of the active branch
    Fork {
        conversation: String,
        node: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Make a branch active
    Switch { conversation: String, branch: String },
    /// Edit the fields of an exchange
    Edit {
        conversation: String,
        node: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        ai: Option<String>,
        #[arg(long)]
        annotations: Option<String>,
    },
    /// List the branches of a conversation
    Branches { conversation: String },
    /// Set a conversation's title; omit the title to clear it
    Rename {
        conversation: String,
        title: Option<String>,
    },
    /// Rename a branch
    RenameBranch {
        conversation: String,
        branch: String,
        name: String,
    },
    /// Delete a conversation and all of its history
    Delete { conversation: String },
    /// List known models
    Models,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    tracing::debug!(
        backend = ?config.backend,
        data_dir = %config.data_dir().display(),
        "Configuration loaded"
    );

    if let Commands::Models = cli.command {
        let selected = config.model();
        for model in AVAILABLE_MODELS {
            let marker = if *model == selected { "*" } else { " " };
            println!("{} {}", marker.green().bold(), model);
        }
        return Ok(());
    }

    let service = build_service(&config)
        .await
        .context("failed to open conversation storage")?;

    if let Err(error) = run(&service, cli.command).await {
        output::error(format!("{error:#}"));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(service: &ConversationService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::New { title } => {
            let created = service.create_conversation(title).await?;
            output::success(format!("Created {} ({})", created.id, created.title));
        }
        Commands::List => {
            output::conversations(&service.list_conversations().await?);
        }
        Commands::Show {
            conversation,
            branch,
        } => {
            let id = conversation_or_first(service, conversation.as_deref()).await?;
            show(service, &id, branch.as_deref()).await?;
        }
        Commands::Say {
            conversation,
            message,
            parent,
        } => {
            let id = conversation_id(service, &conversation).await?;
            let parent = match parent {
                Some(query) => Some(lookup::node(&service.snapshot(&id).await?, &query)?),
                None => None,
            };
            let node = service.add_exchange(&id, message, parent).await?;
            println!(
                "{} {}",
                "Assistant:".green().bold(),
                node.ai_msg.as_deref().unwrap_or_default()
            );
        }
        Commands::Chat { conversation } => {
            let id = conversation_or_first(service, conversation.as_deref()).await?;
            chat(service, &id).await?;
        }
        Commands::Fork {
            conversation,
            node,
            name,
        } => {
            let id = conversation_id(service, &conversation).await?;
            let from = lookup::node(&service.snapshot(&id).await?, &node)?;
            let name = name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_FORK_NAME.to_string());
            let branch = service.fork_branch(&id, name, &from).await?;
            output::success(format!(
                "Forked '{}' ({}) at {}",
                branch.name,
                output::short(branch.id.as_str()),
                output::short(from.as_str())
            ));
        }
        Commands::Switch {
            conversation,
            branch,
        } => {
            let id = conversation_id(service, &conversation).await?;
            let branch_id = lookup::branch(&service.snapshot(&id).await?, &branch)?;
            service.switch_branch(&id, &branch_id).await?;
            show(service, &id, None).await?;
        }
        Commands::Edit {
            conversation,
            node,
            user,
            ai,
            annotations,
        } => {
            let patch = NodePatch {
                user_msg: user,
                ai_msg: ai,
                annotations,
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to change, pass --user, --ai or --annotations");
            }
            let id = conversation_id(service, &conversation).await?;
            let node_id = lookup::node(&service.snapshot(&id).await?, &node)?;
            let node = service.update_node(&id, &node_id, patch).await?;
            output::success(format!("Updated {}", output::short(node.id.as_str())));
        }
        Commands::Branches { conversation } => {
            let id = conversation_id(service, &conversation).await?;
            output::branches(&service.branches(&id).await?);
        }
        Commands::Rename {
            conversation,
            title,
        } => {
            let id = conversation_id(service, &conversation).await?;
            let renamed = service.rename_conversation(&id, title).await?;
            output::success(format!("{} is now '{}'", renamed.id, renamed.title));
        }
        Commands::RenameBranch {
            conversation,
            branch,
            name,
        } => {
            let id = conversation_id(service, &conversation).await?;
            let branch_id = lookup::branch(&service.snapshot(&id).await?, &branch)?;
            let branch = service.rename_branch(&id, &branch_id, name).await?;
            output::success(format!("Branch renamed to '{}'", branch.name));
        }
        Commands::Delete { conversation } => {
            let id = conversation_id(service, &conversation).await?;
            service.delete_conversation(&id).await?;
            output::success(format!("Deleted {id}"));
        }
        Commands::Models => {}
    }
    Ok(())
}

async fn conversation_id(service: &ConversationService, query: &str) -> anyhow::Result<ConversationId> {
    lookup::conversation(&service.list_conversations().await?, query)
}

/// The named conversation, or the first one (created if none exist).
async fn conversation_or_first(
    service: &ConversationService,
    query: Option<&str>,
) -> anyhow::Result<ConversationId> {
    match query {
        Some(query) => conversation_id(service, query).await,
        None => service
            .ensure_conversation()
            .await?
            .into_iter()
            .next()
            .map(|summary| summary.id)
            .context("no conversation available"),
    }
}

async fn show(
    service: &ConversationService,
    id: &ConversationId,
    branch: Option<&str>,
) -> anyhow::Result<()> {
    let state = service.snapshot(id).await?;
    let branch_id = match branch {
        Some(query) => lookup::branch(&state, query)?,
        None => state.current_branch_id().clone(),
    };
    let nodes: Vec<_> = state.timeline(Some(&branch_id))?.into_iter().cloned().collect();
    let branch_name = state
        .branch(&branch_id)
        .map(|branch| branch.name.as_str())
        .unwrap_or_default();
    output::timeline(
        &state.display_title(id),
        branch_name,
        &nodes,
        state.current_node_id(),
    );
    Ok(())
}

async fn chat(service: &ConversationService, id: &ConversationId) -> anyhow::Result<()> {
    show(service, id, None).await?;
    println!(
        "{}",
        format!("Model: {}. Type 'exit' or 'quit' to leave", service.model()).dimmed()
    );
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        match service.add_exchange(id, input, None).await {
            Ok(node) => println!(
                "{} {}",
                "Assistant:".green().bold(),
                node.ai_msg.as_deref().unwrap_or_default()
            ),
            Err(error) => output::error(error.to_string()),
        }
        println!();
    }

    Ok(())
}
