use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "kubeforge")]
#[command(version)]
#[command(about = "Converge the IAM instance profiles behind Kubernetes server pools", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update instance profiles until they match the cluster spec
    Apply(ApplyArgs),

    /// Tear down every instance profile in the cluster spec
    Delete(DeleteArgs),

    /// Show actual state and whether each pool is in sync (read only)
    Status(StatusArgs),

    /// Manage stored cluster defaults
    #[command(subcommand)]
    Defaults(DefaultsCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by commands that talk to AWS
#[derive(Args, Clone, Default)]
pub struct AwsArgs {
    /// Cluster spec file (TOML or JSON)
    #[arg(short, long, env = "KUBEFORGE_SPEC")]
    pub spec: String,

    /// AWS CLI named profile
    #[arg(long, env = "AWS_PROFILE")]
    pub aws_profile: Option<String>,

    /// AWS region (defaults to the cluster location)
    #[arg(long)]
    pub region: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub aws: AwsArgs,

    /// Number of pools reconciled in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Passes per pool before giving up on convergence
    #[arg(long, default_value = "3")]
    pub max_passes: u32,
}

#[derive(Parser)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub aws: AwsArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser)]
pub struct StatusArgs {
    #[command(flatten)]
    pub aws: AwsArgs,
}

#[derive(Subcommand)]
pub enum DefaultsCommand {
    /// Show the effective defaults
    Show,

    /// Set one default
    Set {
        /// Key, e.g. node-instance-type
        key: String,
        /// New value
        value: String,
    },

    /// Forget stored defaults and use the built-in values
    Reset,
}
