use std::path::PathBuf;

use clap::{Parser, Subcommand};
use taskflow::cli::{check_definition, effective_config, DefinitionSummary};
use taskflow::utils::LoggingConfig;

#[derive(Parser)]
#[command(name = "taskflow", version, about = "TaskFlow planning loop CLI", author)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective planner configuration.
    Config {
        #[arg(long, default_value_t = true)]
        pretty: bool,
    },
    Definition {
        #[command(subcommand)]
        command: DefinitionCommand,
    },
}

#[derive(Subcommand)]
enum DefinitionCommand {
    /// Validate a YAML or JSON workflow definition.
    Check { file: PathBuf },
}

fn main() -> anyhow::Result<()> {
    LoggingConfig::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Config { pretty } => handle_config(pretty)?,
        Command::Definition { command } => match command {
            DefinitionCommand::Check { file } => handle_definition_check(file)?,
        },
    }
    Ok(())
}

fn handle_config(pretty: bool) -> anyhow::Result<()> {
    let config = effective_config()?;
    let content = if pretty {
        serde_json::to_string_pretty(&config)?
    } else {
        serde_json::to_string(&config)?
    };
    println!("{content}");
    Ok(())
}

fn handle_definition_check(file: PathBuf) -> anyhow::Result<()> {
    let summary = check_definition(&file)?;
    render_summary(&summary);
    Ok(())
}

fn render_summary(summary: &DefinitionSummary) {
    println!(
        "Workflow `{}` ({}) is valid: {} parameters, {} blocks",
        summary.workflow_id,
        summary.title,
        summary.parameters,
        summary.blocks.len()
    );
    println!("{:<32} {:<12} {}", "Label", "Type", "Output");
    for block in &summary.blocks {
        println!(
            "{:<32} {:<12} {}",
            block.label, block.block_type, block.output_parameter
        );
    }
}
