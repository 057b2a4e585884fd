//! CLI interface for Sonar
//!
//! One question in, one grounded answer out.

use clap::Parser;
use std::path::PathBuf;

/// Sonar: ask questions about an indexed codebase
///
/// Plans a short investigation, retrieves code through the configured vector
/// store collections, and answers with `path:start-end` citations.
#[derive(Parser, Debug)]
#[command(name = "sonar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The question to answer
    #[arg(value_name = "QUESTION")]
    pub question: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
