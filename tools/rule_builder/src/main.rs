use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use config_validator::Severity;
use rule_builder::{BuildError, build_from_path};
use rule_format::{DataFilter, RuleTable};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compile rule files and print the rule table", long_about = None)]
struct Cli {
    /// Path to YAML rule file
    config: PathBuf,
    /// Output format for the compiled table
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Yaml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match build_from_path(&cli.config) {
        Ok(output) => {
            print_diagnostics(&output.diagnostics);
            match cli.format {
                Format::Text => print_table(&output.table),
                Format::Yaml => print!("{}", serde_yaml::to_string(&output.table)?),
            }
            if !output.skipped.is_empty() {
                eprintln!("Skipped rules: {:?}", output.skipped);
            }
            Ok(())
        }
        Err(BuildError::Validation(diags)) => {
            print_diagnostics(&diags);
            eprintln!("Rule table build failed due to validation errors.");
            std::process::exit(2);
        }
        Err(err) => Err(err.into()),
    }
}

fn print_table(table: &RuleTable) {
    println!("{} rules", table.len());
    for (status, rules) in table.buckets() {
        println!("status {status:#04X}:");
        for rule in rules {
            let channel = rule
                .channel
                .map_or_else(|| "any".to_string(), |c| c.to_string());
            let data = match rule.data {
                DataFilter::Any => "any".to_string(),
                DataFilter::Single(v) => v.to_string(),
                DataFilter::Pair(a, b) => format!("{a} {b}"),
            };
            println!(
                "  [{}] channel={} data={} -> {}",
                rule.name,
                channel,
                data,
                rule.command.source()
            );
        }
    }
}

fn print_diagnostics(diags: &[config_validator::ValidationIssue]) {
    if diags.is_empty() {
        return;
    }
    eprintln!("Diagnostics:");
    for diag in diags {
        let level = match diag.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        if let Some(loc) = diag.location {
            eprintln!(
                "- [{}] {}: {} (line {}, column {})",
                level, diag.path, diag.message, loc.line, loc.column
            );
        } else {
            eprintln!("- [{}] {}: {}", level, diag.path, diag.message);
        }
    }
}
