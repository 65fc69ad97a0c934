//! CLI argument parsing definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use userscript_core::ScriptLang;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding scripts and global state
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Answer yes to every confirmation
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script from the library
    Run {
        /// Script name
        name: String,

        /// JSON arguments merged over the script's defaults (example: --args='{"count":3}')
        #[arg(long, value_name = "JSON")]
        args: Option<String>,

        /// Keep the script mounted until interrupted instead of cleaning up right away
        #[arg(long)]
        keep: bool,
    },

    /// Run the script a source file belongs to, as if it were open in the editor
    RunCurrent {
        /// Source file inside a script directory
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },

    /// Run the configured start-up scripts and keep them mounted until interrupted
    StartUp,

    /// Manage the script library
    Scripts {
        #[command(subcommand)]
        scripts_cmd: ScriptCommands,
    },

    /// Install node modules for scripts
    Install {
        /// Module specs (`name` or `name@version`)
        #[arg(required = true)]
        modules: Vec<String>,

        /// Install into the package manager's global location
        #[arg(long, short = 'g')]
        global: bool,

        /// Record as development dependencies
        #[arg(long, short = 'D')]
        dev: bool,
    },

    /// Install the dependencies declared in the packages root
    InstallDeps,

    /// List published versions of a package, newest first
    Versions {
        package: String,

        /// Show at most this many versions
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ScriptCommands {
    /// List scripts
    List,

    /// Create a script from the template
    Create {
        name: String,

        /// Source language
        #[arg(long, value_enum, default_value_t = LangArg::Js)]
        lang: LangArg,

        #[arg(long, value_name = "STRING")]
        description: Option<String>,
    },

    /// Delete a script and its directory
    Delete { name: String },

    /// Copy a .js or .ts file into a new script
    Import {
        file: PathBuf,

        /// Script name (defaults to the file stem)
        #[arg(long, value_name = "STRING")]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration in use
    Show {
        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },

    /// Set one configuration value and save the file
    Set {
        /// Dotted key (example: node.package_manager)
        key: String,

        /// JSON value; anything that is not valid JSON is taken as a string
        value: String,
    },

    /// Print the path of the configuration file
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LangArg {
    Js,
    Ts,
}

impl From<LangArg> for ScriptLang {
    fn from(lang: LangArg) -> Self {
        match lang {
            LangArg::Js => ScriptLang::Js,
            LangArg::Ts => ScriptLang::Ts,
        }
    }
}
