use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kiln_cli::logging::{self, LogFormat};
use kiln_cli::{EvalWorker, SandboxConfig};
use kiln_parse::parse_str;
use kiln_types::{Effect, EvalReport};

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Kiln: evaluate geometry scripts in a sandbox and report shapes or errors")]
struct Cli {
    /// Log filter, e.g. `debug` or `kiln::sandbox=trace` (default: $KILN_LOG or warn)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a script and print its report
    Run {
        /// Path to the script
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,

        /// Sandbox configuration (JSON)
        #[arg(long)]
        config: Option<String>,

        /// Effects to allow, overriding the config (io, time, rand)
        #[arg(long, value_delimiter = ',')]
        allow: Vec<Effect>,
    },

    /// Read a script and dump its forms
    Parse {
        /// Path to the script
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Pretty,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref(), cli.log_format)
        .context("invalid --log-level")?;

    match cli.command {
        Commands::Run {
            file,
            format,
            config,
            allow,
        } => cmd_run(&file, format, config.as_deref(), allow),
        Commands::Parse { file, format } => cmd_parse(&file, format),
    }
}

fn read_source(path: &str, limit: usize) -> Result<String> {
    let src =
        std::fs::read_to_string(path).with_context(|| format!("cannot read script '{}'", path))?;
    if src.len() > limit {
        eprintln!(
            "Error: script exceeds the {} byte limit ({} bytes)",
            limit,
            src.len()
        );
        std::process::exit(1);
    }
    Ok(src)
}

fn cmd_run(file: &str, format: Format, config: Option<&str>, allow: Vec<Effect>) -> Result<()> {
    let mut config = match config {
        Some(path) => SandboxConfig::load(Path::new(path))?,
        None => SandboxConfig::default(),
    };
    if !allow.is_empty() {
        config.allow = allow;
    }
    let src = read_source(file, config.max_source_size)?;

    let mut worker = EvalWorker::spawn(config)?;
    worker.submit(src)?;
    let reply = worker.recv()?;
    worker.shutdown()?;

    print!("{}", reply.output);
    match format {
        Format::Pretty => print_report(&reply.report),
        Format::Json => println!("{}", serde_json::to_string_pretty(&reply.report)?),
    }

    if !reply.report.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &EvalReport) {
    match report {
        EvalReport::Errors { errors } => {
            for e in errors {
                println!("{} at {}", e.kind, e.range);
                for line in e.message.lines() {
                    println!("  {}", line);
                }
                if !e.stack_trace.is_empty() {
                    println!("stack:");
                    for line in e.stack_trace.lines() {
                        println!("  {}", line);
                    }
                }
            }
        }
        EvalReport::Output {
            result,
            shapes,
            variables,
        } => {
            println!("result: {}", result.as_deref().unwrap_or("(no forms)"));
            for var in variables.values() {
                println!("var {} = {} at {}", var.id, var.value, var.range);
            }
            for shape in shapes {
                println!("shape {}: {}", shape.tree_id, shape.tree);
            }
        }
    }
}

fn cmd_parse(file: &str, format: Format) -> Result<()> {
    let src = read_source(file, kiln_cli::config::DEFAULT_MAX_SOURCE_SIZE)?;
    let forms = parse_str(file, &src)?;
    match format {
        Format::Pretty => {
            for form in &forms {
                println!("{}: {}", form.range(), form.datum);
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&forms)?),
    }
    Ok(())
}
