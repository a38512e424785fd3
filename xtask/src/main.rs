use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Workspace tasks for the elan driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every workspace member
    Build,
    /// Run the test suite (no hardware needed)
    Test,
    /// Capture frames from an attached sensor
    Capture {
        /// Number of frames to capture
        #[arg(short, long, default_value_t = 10)]
        frames: u64,
        /// Where to save PNG frames
        #[arg(short, long, default_value = "captures")]
        output_dir: String,
    },
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed", what);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building workspace...");
            cargo(&["build", "--workspace"], "Build")?;
        }
        Commands::Test => {
            println!("Testing elan-core...");
            cargo(&["test", "-p", "elan-core"], "Test")?;
        }
        Commands::Capture { frames, output_dir } => {
            println!("Capturing {} frames into {}...", frames, output_dir);
            let frames = frames.to_string();
            cargo(
                &[
                    "run",
                    "-p",
                    "elan-cli",
                    "--",
                    "--frames",
                    &frames,
                    "--output-dir",
                    output_dir,
                ],
                "Capture",
            )?;
        }
    }

    Ok(())
}
