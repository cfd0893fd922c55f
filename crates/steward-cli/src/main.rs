mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{log::LogSubcommand, spec::SpecSubcommand, task::TaskSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "steward",
    about = "Spec-driven development workflow: specs, worktrees, branch promotion, GitHub sync",
    version,
    propagate_version = true
)]
struct Cli {
    /// Repository root (default: auto-detect from the current directory)
    #[arg(long, global = true, env = "STEWARD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize steward in the current repository
    Init {
        /// Project name (default: repository directory name)
        #[arg(long)]
        project: Option<String>,
    },

    /// Manage specs
    Spec {
        #[command(subcommand)]
        subcommand: SpecSubcommand,
    },

    /// Manage tasks under a spec
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Record and list work logs
    Log {
        #[command(subcommand)]
        subcommand: LogSubcommand,
    },

    /// Reconcile local records with GitHub issues and PRs
    Sync {
        /// Plan only; apply nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Merge completion PRs into the integration branch
    Merge {
        /// Spec slug or prefix (omit to list merge-ready PRs)
        slug: Option<String>,

        /// Merge every merge-ready PR
        #[arg(long)]
        all: bool,

        /// Keep feature branches after merging
        #[arg(long)]
        keep_branch: bool,

        /// Show what would be merged without merging
        #[arg(long)]
        dry_run: bool,
    },

    /// Promote a pipeline stage (fast-forward only)
    Promote {
        /// Target stage: 'test' or 'main'
        stage: String,

        /// Plan only; move nothing
        #[arg(long)]
        dry_run: bool,

        /// Required to actually promote to the release branch
        #[arg(long)]
        force: bool,
    },

    /// Delete branches and worktrees of finished specs
    Cleanup {
        /// Report only; delete nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the store overview
    Status,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let ctx = match root::resolve(cli.root.as_deref()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init { project } => cmd::init::run(&ctx, project.as_deref(), cli.json),
        Commands::Spec { subcommand } => cmd::spec::run(&ctx, subcommand, cli.json),
        Commands::Task { subcommand } => cmd::task::run(&ctx, subcommand, cli.json),
        Commands::Log { subcommand } => cmd::log::run(&ctx, subcommand, cli.json),
        Commands::Sync { dry_run } => cmd::sync::run(&ctx, dry_run, cli.json),
        Commands::Merge {
            slug,
            all,
            keep_branch,
            dry_run,
        } => cmd::merge::run(&ctx, slug.as_deref(), all, keep_branch, dry_run, cli.json),
        Commands::Promote {
            stage,
            dry_run,
            force,
        } => cmd::promote::run(&ctx, &stage, dry_run, force, cli.json),
        Commands::Cleanup { dry_run } => cmd::cleanup::run(&ctx, dry_run, cli.json),
        Commands::Status => cmd::status::run(&ctx, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
