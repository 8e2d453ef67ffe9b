use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reelbot")]
#[command(author, version, about = "Telegram bot that generates short narrated videos from diffusion images", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the bot with long polling and the weekly scheduler
    Run,

    /// Generate one video without Telegram and print the artifact paths
    Generate {
        /// Upload the result to YouTube (requires token.json)
        #[arg(long)]
        upload: bool,
    },

    /// Print one image prompt from the configured generator
    Prompt,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
