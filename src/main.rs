use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use turtlec::backend::{self, generator, regalloc::LinearScan};
use turtlec::{ast, ir, CompileError};

#[derive(Parser)]
#[command(name = "turtlec")]
#[command(about = "Lowers a turtle program's syntax tree to IR and allocates its registers")]
struct Args {
    /// Syntax tree of the program, as JSON
    input: PathBuf,

    /// Which artifacts to write
    #[arg(long, value_enum, default_value_t = Emit::All)]
    emit: Emit,

    /// Directory receiving emit.txt and reg.txt
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Number of allocatable physical registers
    #[arg(long, default_value_t = backend::regalloc::DEFAULT_POOL_SIZE)]
    registers: usize,

    /// Release a register at the instruction where its last use is
    #[arg(long)]
    reuse_at_boundary: bool,

    /// Log pass progress and allocation decisions
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    Ir,
    Reg,
    All,
}

struct Config {
    source: PathBuf,
    out_dir: PathBuf,
    emit: Emit,
    allocator: LinearScan,
}

impl Config {
    fn build(args: Args) -> Result<Config, &'static str> {
        if args.registers == 0 {
            return Err("At least one physical register is required");
        }

        if args.out_dir.exists() && !args.out_dir.is_dir() {
            return Err("Output path exists and is not a directory");
        }

        Ok(Config {
            source: args.input,
            out_dir: args.out_dir,
            emit: args.emit,
            allocator: LinearScan::new(args.registers).reuse_at_boundary(args.reuse_at_boundary),
        })
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = Config::build(args).unwrap_or_else(|err| {
        eprintln!("Error parsing arguments: {err}");
        process::exit(1);
    });

    let source = fs::read_to_string(&config.source).unwrap_or_else(|err| {
        eprintln!("Error reading {}: {err}", config.source.display());
        process::exit(1);
    });

    let program: ast::Program = serde_json::from_str(&source).unwrap_or_else(|err| {
        eprintln!("Error reading syntax tree: {err}");
        process::exit(1);
    });

    // Render everything before touching the filesystem
    let outputs = build_outputs(&program, &config).unwrap_or_else(|err| {
        report(&*err);
        process::exit(1);
    });

    fs::create_dir_all(&config.out_dir).unwrap_or_else(|err| {
        eprintln!("Error creating {}: {err}", config.out_dir.display());
        process::exit(1);
    });

    write_outputs(&config.out_dir, &outputs).unwrap_or_else(|(path, err)| {
        eprintln!("Error writing {}: {err}", path.display());
        process::exit(1);
    });
}

/// Produces the requested artifacts as `(file name, contents)` pairs.
/// The IR listing alone needs no register allocation.
fn build_outputs(
    program: &ast::Program,
    config: &Config,
) -> Result<Vec<(&'static str, String)>, Box<dyn Error>> {
    if config.emit == Emit::Ir {
        let lowered = ir::lower::lower(program)?;
        return Ok(vec![("emit.txt", generator::generate_ir(&lowered)?)]);
    }

    let artifacts = backend::compile(program, &config.allocator)?.render()?;
    let mut outputs = Vec::new();
    if config.emit == Emit::All {
        outputs.push(("emit.txt", artifacts.ir));
    }
    outputs.push(("reg.txt", artifacts.allocation));
    Ok(outputs)
}

/// Writes every output to a temporary file in `out_dir` and renames them
/// into place once all writes succeeded. On failure nothing is left behind.
fn write_outputs(
    out_dir: &Path,
    outputs: &[(&'static str, String)],
) -> Result<(), (PathBuf, io::Error)> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();

    for (name, contents) in outputs {
        let temp = out_dir.join(format!(".{name}.tmp"));
        if let Err(err) = fs::write(&temp, contents) {
            for (staged_temp, _) in &staged {
                let _ = fs::remove_file(staged_temp);
            }
            let _ = fs::remove_file(&temp);
            return Err((out_dir.join(name), err));
        }
        staged.push((temp, out_dir.join(name)));
    }

    for (i, (temp, target)) in staged.iter().enumerate() {
        if let Err(err) = fs::rename(temp, target) {
            let placed = staged[..i].iter().map(|(_, target)| target);
            let pending = staged[i..].iter().map(|(temp, _)| temp);
            for path in placed.chain(pending) {
                let _ = fs::remove_file(path);
            }
            return Err((target.clone(), err));
        }
        log::info!("wrote {}", target.display());
    }

    Ok(())
}

fn report(err: &(dyn Error + 'static)) {
    match err.downcast_ref::<CompileError>() {
        Some(err) if err.is_internal() => eprintln!("Compiler bug: {err}"),
        Some(err) => eprintln!("Compilation failed: {err}"),
        None => eprintln!("Error rendering output: {err}"),
    }
}
