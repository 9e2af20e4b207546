use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "opbind", version, about = "Bind graph operators to backend kernels")]
pub struct Cli {
    /// Log level (RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    /// Worker threads for the par backend (0 = one per core)
    #[arg(long, global = true, default_value_t = 0)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve every node of a graph description and print its binding
    Resolve {
        /// Path to the JSON graph description
        #[arg(long)]
        graph: PathBuf,

        /// Primary backend
        #[arg(long, default_value = "par")]
        backend: String,

        /// Fallback backend consulted when the primary has no kernel; ignored
        /// when it names the primary
        #[arg(long, default_value = "cpu")]
        fallback: String,

        /// Fail instead of consulting the fallback backend
        #[arg(long)]
        no_fallback: bool,

        /// Opset import as DOMAIN:VERSION; overrides the graph file's imports
        #[arg(long = "opset")]
        opsets: Vec<String>,
    },
    /// List the operators a backend registers
    Ops {
        #[arg(long, default_value = "cpu")]
        backend: String,
    },
    /// List registered backends
    Backends,
}
