use clap::{Parser, Subcommand};

use tick_tock::Environment;

#[derive(Parser)]
#[command(name = "tick-tock")]
#[command(about = "Track time per project and sub-activity", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the current selection and today's totals
    Status,

    /// Start timing the current selection (stops any other timer)
    Start,

    /// Stop all running timers
    Stop,

    /// Select the project (and optionally sub-activity) to time
    Select {
        /// Project alias
        project: String,

        /// Sub-activity alias
        #[arg(short, long)]
        sub: Option<String>,
    },

    /// Manage projects
    Projects {
        #[command(subcommand)]
        action: ProjectsAction,
    },

    /// Manage sub-activities of a project
    Sub {
        #[command(subcommand)]
        action: SubAction,
    },

    /// Inspect or switch environments
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ProjectsAction {
    /// List all projects
    List,
    /// Add a project
    Add {
        /// Display name
        name: String,
        /// External reference number
        #[arg(short, long, default_value = "")]
        dz: String,
        /// Unique alias (defaults to the name)
        #[arg(short, long, default_value = "")]
        alias: String,
    },
    /// Remove a project and all of its history
    Remove {
        /// Project alias
        alias: String,
    },
}

#[derive(Subcommand)]
pub enum SubAction {
    /// Add a sub-activity to a project
    Add {
        /// Project alias
        project: String,
        /// Display name
        name: String,
        /// Unique alias within the project (defaults to the name)
        #[arg(short, long)]
        alias: Option<String>,
    },
    /// Remove a sub-activity from a project
    Remove {
        /// Project alias
        project: String,
        /// Sub-activity alias
        alias: String,
    },
}

#[derive(Subcommand)]
pub enum EnvAction {
    /// Show the active environment and its data file
    Show,
    /// Switch to another environment and load its data
    Switch {
        /// development, production or test
        environment: Environment,
    },
    /// Copy the current environment's data to another environment
    Copy {
        /// development, production or test
        target: Environment,
    },
    /// Copy production data into development
    DevCopy,
    /// Copy development data into production
    Promote,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Create a default configuration file
    Init,
    /// Show the effective configuration
    Show,
    /// Print the configuration file path
    Path,
}
