//! schemadoc CLI
//!
//! Command-line interface for generating Markdown documentation from JSON Schema.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::debug;
use schemadoc::{
    config_path, generate, init_logging, Config, FileNaming, GenerateOptions, PageTemplate,
};

#[derive(Parser)]
#[command(name = "schemadoc")]
#[command(about = "Generate Markdown documentation from JSON Schema documents")]
#[command(version)]
struct Cli {
    /// Config file (default: $SCHEMADOC_CONFIG or .schemadoc.yaml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate documents
    Gen {
        /// File path or dir to one or more JSON schema files
        #[arg(long = "in", short = 'i')]
        input: PathBuf,

        /// Output dir to generate files to
        #[arg(long, short, default_value = "out")]
        out: PathBuf,

        /// Filename pattern for generated files ({name}, {root}, or a template)
        #[arg(long, short = 'f', default_value = "{name}.md")]
        outfile: String,

        /// Custom page template path
        #[arg(long, short = 't')]
        template: Option<PathBuf>,
    },

    /// Show full version info
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(&config_path(cli.config.as_deref())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    if cli.no_color {
        config.color = false;
    }
    init_logging(&config, cli.verbose);
    debug!("config: {:?}", config);

    let result = match cli.command {
        Commands::Gen {
            input,
            out,
            outfile,
            template,
        } => run_gen(input, out, outfile, template),
        Commands::Version => {
            run_version();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_gen(
    input: PathBuf,
    out: PathBuf,
    outfile: String,
    template: Option<PathBuf>,
) -> Result<(), u8> {
    let naming = FileNaming::new(outfile).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let mut options = GenerateOptions::new(input, out).naming(naming);
    if let Some(path) = template {
        let template = PageTemplate::from_file(&path).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
        debug!("using template {}", template.name());
        options = options.template(template);
    }

    let written = generate(&options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    debug!("generated {} file(s)", written.len());
    Ok(())
}

fn run_version() {
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("OS: {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!(
        "Remote loading: {}",
        if cfg!(feature = "remote") { "enabled" } else { "disabled" }
    );
}
