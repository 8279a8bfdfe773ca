mod config;
mod error;
mod location;
mod logging;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use config::{Config, LogLevel};
use error::CliError;
use ftl_parser::{ParseError, ParseOptions, Program};

#[derive(Parser)]
#[command(name = "ftl")]
#[command(about = "Inspect and check FreeMarker templates")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). Overrides FTL_LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the syntax tree and structural errors as JSON
    Parse {
        /// Input template
        path: PathBuf,

        /// Single-line JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },

    /// Print the markup token stream as JSON
    Tokens {
        /// Input template
        path: PathBuf,
    },

    /// Report every error as `path:line:col: message`
    Check {
        /// Input template
        path: PathBuf,
    },
}

/// One reported problem, with presentation coordinates.
#[derive(Debug, Serialize)]
struct Diagnostic {
    message: String,
    start: usize,
    end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column: Option<usize>,
}

impl Diagnostic {
    fn new(source: &str, message: &str, start: usize, end: usize) -> Self {
        let position = location::line_col(source, start);
        Self {
            message: message.to_string(),
            start,
            end,
            line: position.map(|(line, _)| line),
            column: position.map(|(_, column)| column),
        }
    }

    fn render(&self, path: &Path) -> String {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                format!("{}:{line}:{column}: {}", path.display(), self.message)
            }
            _ => format!("{}:{}: {}", path.display(), self.start, self.message),
        }
    }
}

#[derive(Serialize)]
struct ParseOutput<'a> {
    ast: &'a Program,
    errors: Vec<Diagnostic>,
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config.apply_overrides(cli.log_level),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };
    logging::init_logging(&config);

    let result = match &cli.command {
        Command::Parse { path, compact } => cmd_parse(path, *compact),
        Command::Tokens { path } => cmd_tokens(path),
        Command::Check { path } => cmd_check(path),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn read_source(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_options(path: &Path) -> ParseOptions {
    ParseOptions {
        base_path: path.parent().map(Path::to_path_buf),
    }
}

fn fatal(source: &str, error: &ParseError) -> Diagnostic {
    let span = error.span();
    Diagnostic::new(source, error.message(), span.start, span.end)
}

fn structural(source: &str, ast: &Program) -> Vec<Diagnostic> {
    ast.errors
        .iter()
        .map(|e| Diagnostic::new(source, &e.message, e.span.start, e.span.end))
        .collect()
}

fn to_json<T: Serialize>(value: &T, compact: bool) -> Result<String, CliError> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(json)
}

fn cmd_parse(path: &Path, compact: bool) -> Result<i32, CliError> {
    let source = read_source(path)?;

    let result = match ftl_parser::parse_with_options(&source, &parse_options(path)) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", fatal(&source, &e).render(path));
            return Ok(1);
        }
    };

    let output = ParseOutput {
        ast: &result.ast,
        errors: structural(&source, &result.ast),
    };
    println!("{}", to_json(&output, compact)?);
    Ok(if output.errors.is_empty() { 0 } else { 1 })
}

fn cmd_tokens(path: &Path) -> Result<i32, CliError> {
    let source = read_source(path)?;

    match ftl_lexer::Scanner::tokenize(&source) {
        Ok(tokens) => {
            println!("{}", to_json(&tokens, false)?);
            Ok(0)
        }
        Err(e) => {
            let diagnostic = Diagnostic::new(&source, &e.message, e.span.start, e.span.end);
            eprintln!("{}", diagnostic.render(path));
            Ok(1)
        }
    }
}

fn cmd_check(path: &Path) -> Result<i32, CliError> {
    let source = read_source(path)?;

    let diagnostics = match ftl_parser::parse_with_options(&source, &parse_options(path)) {
        Ok(result) => structural(&source, &result.ast),
        Err(e) => vec![fatal(&source, &e)],
    };

    for diagnostic in &diagnostics {
        println!("{}", diagnostic.render(path));
    }

    if diagnostics.is_empty() {
        eprintln!("OK: {}", path.display());
        Ok(0)
    } else {
        tracing::info!(errors = diagnostics.len(), "check failed");
        Ok(1)
    }
}
