//! Chroma Compiler CLI
//!
//! A thin command-line front end over the `chromac` library: enough to run
//! the pipeline end to end and inspect its output. File discovery, project
//! globbing, and the linker invocation that turns emitted IR into a native
//! binary are an external driver's job, not this crate's (see `DESIGN.md`).

use std::path::PathBuf;
use std::process;

use clap::{Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;

use chromac::{check_file, compile_file_to_ir, CompilerConfig};

#[derive(ClapParser)]
#[command(name = "chromac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chroma compiler front-end and middle-end", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lex, parse, resolve imports, and type-check a .chr file
    Check {
        /// Input .chr source file
        input: PathBuf,

        /// Emit diagnostics as JSON instead of the human-readable rendering
        #[arg(long)]
        json: bool,
    },

    /// Run the full pipeline, including codegen, and print the emitted IR
    EmitIr {
        /// Input .chr source file
        input: PathBuf,

        /// Write the emitted IR to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit diagnostics as JSON instead of the human-readable rendering
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let filter = EnvFilter::try_from_env("CHROMAC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { input, json } => run_check(&input, json),
        Commands::EmitIr {
            input,
            output,
            json,
        } => run_emit_ir(&input, output.as_deref(), json),
    }
}

fn run_check(input: &std::path::Path, json: bool) {
    let config = CompilerConfig::new().with_json_diagnostics(json);
    let outcome = match check_file(input, &config) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    print_diagnostics(&outcome.diagnostics, json);
    if outcome.diagnostics.has_errors() {
        process::exit(1);
    }
}

fn run_emit_ir(input: &std::path::Path, output: Option<&std::path::Path>, json: bool) {
    let config = CompilerConfig::new().with_json_diagnostics(json);
    let outcome = match compile_file_to_ir(input, &config) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    print_diagnostics(&outcome.diagnostics, json);
    if outcome.diagnostics.has_errors() {
        process::exit(1);
    }
    let ir = outcome.ir.expect("codegen ran because diagnostics had no errors");
    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &ir) {
                eprintln!("error: failed to write {}: {}", path.display(), e);
                process::exit(1);
            }
        }
        None => print!("{}", ir),
    }
}

fn print_diagnostics(diagnostics: &chromac::Diagnostics, json: bool) {
    if diagnostics.all().is_empty() {
        return;
    }
    if json {
        println!("{}", diagnostics.render_json());
    } else {
        print!("{}", diagnostics.render_human());
    }
}
