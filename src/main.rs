use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use ay::config::InterpreterConfig;
use ay::error::LuaError;
use ay::interpreter::Interpreter;
use ay::parser;
use ay::scanner::Scanner;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lua 5.4 interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,

    /// Nested calls allowed before a stack overflow is reported
    #[arg(long, global = true)]
    max_depth: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes the input, printing each token
    Tokenize { filename: Option<PathBuf> },

    /// Parses the input as a chunk and prints its syntax tree as JSON
    Parse { filename: Option<PathBuf> },

    /// Evaluates the input as an expression list and prints the values
    Evaluate { filename: Option<PathBuf> },

    /// Runs the input as a Lua chunk
    Run { filename: Option<PathBuf> },
}

/// Reads the whole input, from a memory-mapped file or from stdin.
fn read_source(filename: Option<&PathBuf>) -> Result<Vec<u8>> {
    let Some(filename) = filename else {
        info!("Reading source from stdin");
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    };

    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let len = file
        .metadata()
        .context(format!("Failed to stat file {:?}", filename))?
        .len();
    if len == 0 {
        return Ok(Vec::new());
    }

    // SAFETY: the map is copied out before anything else can touch the file.
    let map = unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;
    info!("Read {} bytes from {:?}", map.len(), filename);
    Ok(map.to_vec())
}

fn chunk_name(filename: Option<&PathBuf>) -> String {
    match filename {
        Some(path) => path.display().to_string(),
        None => "stdin".to_string(),
    }
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("ay::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Print an error and exit: 65 for static errors, 70 for runtime ones.
fn fail(error: LuaError) -> ! {
    debug!("Exiting on error: {:?}", error);
    match &error {
        LuaError::Lex { .. } | LuaError::Parse { .. } | LuaError::Resolve { .. } => {
            eprintln!("{}", error);
            std::process::exit(65);
        }
        LuaError::Runtime(e) => {
            eprintln!("{}", e.report());
            std::process::exit(70);
        }
        other => {
            eprintln!("{}", other);
            std::process::exit(70);
        }
    }
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else if std::env::var_os("RUST_LOG").is_some() {
        env_logger::Builder::from_default_env().init();
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let mut config = InterpreterConfig::default();
    if let Some(depth) = args.max_depth {
        config = config.with_max_call_depth(depth);
    }

    match args.commands {
        Commands::Tokenize { filename } => {
            info!("Running Tokenize subcommand");
            let source = read_source(filename.as_ref())?;

            let mut tokenized = true;
            for token in Scanner::from_bytes(&source) {
                match token {
                    Ok(token) => {
                        debug!("Scanned token: {}", token);
                        println!("{}", token);
                    }
                    Err(e) => {
                        tokenized = false;
                        debug!("Tokenization debug: {}", e);
                        eprintln!("{}", e);
                    }
                }
            }

            if !tokenized {
                debug!("Tokenization failed, exiting with code 65");
                std::process::exit(65);
            }
            info!("Tokenization completed successfully");
        }

        Commands::Parse { filename } => {
            info!("Running Parse subcommand");
            let source = read_source(filename.as_ref())?;

            let chunk = parser::parse_chunk(&source, &chunk_name(filename.as_ref()))
                .unwrap_or_else(|e| fail(e));
            let json = serde_json::to_string_pretty(&chunk).context("Failed to serialize syntax tree")?;
            println!("{}", json);

            info!("Parse subcommand completed");
        }

        Commands::Evaluate { filename } => {
            info!("Running Evaluate subcommand");
            let source = read_source(filename.as_ref())?;

            let config = config.with_chunk_name(chunk_name(filename.as_ref()));
            let mut interpreter = Interpreter::with_config(config);
            let values = interpreter.eval_source(&source).unwrap_or_else(|e| fail(e));

            let mut line = Vec::new();
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    line.push(b'\t');
                }
                let text = interpreter.tostring(value).unwrap_or_else(|e| fail(e));
                line.extend_from_slice(text.as_bytes());
            }
            line.push(b'\n');

            let mut stdout = io::stdout();
            stdout.write_all(&line).context("Failed to write result")?;
            info!("Evaluate subcommand completed");
        }

        Commands::Run { filename } => {
            info!("Running Run subcommand");
            let source = read_source(filename.as_ref())?;

            let config = config.with_chunk_name(chunk_name(filename.as_ref()));
            let mut interpreter = Interpreter::with_config(config);
            interpreter.exec(&source).unwrap_or_else(|e| fail(e));

            io::stdout().flush().context("Failed to flush stdout")?;
            info!("Program executed successfully");
        }
    }

    Ok(())
}
