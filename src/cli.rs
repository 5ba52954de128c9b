//! Command-line interface definition

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// droidscope - inspect and drive Android UI hierarchies over adb
#[derive(Parser, Debug)]
#[command(name = "droidscope")]
#[command(about = "Inspect and drive Android UI hierarchies over adb", long_about = None)]
pub struct Cli {
    /// Device serial (overrides config and $ANDROID_SERIAL)
    #[arg(long, short, global = true)]
    pub serial: Option<String>,

    /// Directory containing .droidscope/config.toml (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Dump a window's view hierarchy through the ViewServer
    Dump {
        /// Window hash id (defaults to the focused window)
        #[arg(long)]
        window: Option<String>,

        /// Print the dump text as received instead of the parsed tree
        #[arg(long)]
        raw: bool,
    },

    /// Print the first view matching a query as JSON
    Find {
        /// Selector field, e.g. `--field className=android.widget.Button`
        #[arg(long = "field", value_name = "NAME=VALUE", required = true)]
        fields: Vec<String>,

        /// Window hash id (defaults to the focused window)
        #[arg(long)]
        window: Option<String>,
    },

    /// Print the ViewServer protocol version
    Protocol,

    /// Print UiAutomator device info
    Info,

    /// Click a screen coordinate
    Click { x: i32, y: i32 },

    /// Swipe between two screen coordinates
    Swipe {
        sx: i32,
        sy: i32,
        ex: i32,
        ey: i32,

        /// Number of move steps (about 5 ms each)
        #[arg(long)]
        steps: Option<u32>,
    },

    /// Count objects matching a query through UiAutomator
    Count {
        /// Selector field, e.g. `--field textContains=Settings`
        #[arg(long = "field", value_name = "NAME=VALUE", required = true)]
        fields: Vec<String>,
    },

    /// Write a default .droidscope/config.toml
    Init,
}
