use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for lumen")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Everything CI runs: fmt, clippy, tests, docs, headless smoke run
    Ci,
    /// Check formatting
    Fmt,
    /// Lint all targets with warnings denied
    Clippy,
    /// Run the workspace tests
    Test,
    /// Build rustdoc without dependencies
    Doc,
    /// Render a few frames of the demo scene on the headless device
    Smoke {
        #[arg(long, default_value = "3")]
        frames: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => {
            fmt()?;
            clippy()?;
            test()?;
            doc()?;
            smoke(3)?;
        }
        Commands::Fmt => fmt()?,
        Commands::Clippy => clippy()?,
        Commands::Test => test()?,
        Commands::Doc => doc()?,
        Commands::Smoke { frames } => smoke(frames)?,
    }

    Ok(())
}

fn cargo(step: &str, args: &[&str]) -> Result<()> {
    println!("==> {step}: cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{step} failed ({status})");
    }
    Ok(())
}

fn fmt() -> Result<()> {
    cargo("fmt", &["fmt", "--all", "--", "--check"])
}

fn clippy() -> Result<()> {
    cargo(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn test() -> Result<()> {
    cargo("test", &["test", "--workspace"])
}

fn doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}

fn smoke(frames: u32) -> Result<()> {
    let frames = frames.to_string();
    cargo(
        "smoke",
        &["run", "-p", "lumen-cli", "--", "dry-run", "--frames", &frames],
    )
}
