mod foreign;
mod resolver;

use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use pyrinas_core::{CompilationArtifact, CompileOptions, UnitKind, compile_c};

use crate::resolver::{ModuleResolver, is_library_path};

/// Compile Pyrinas source files to C.
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    after_help = "`import a.b` binds the module as `b`; refer to its exports as `b.name`."
)]
struct Cli {
    /// Source file; reads stdin when omitted.
    #[arg(short, long)]
    input: Option<String>,

    #[arg(short, long)]
    output: String,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "c",
        help = "Output format: c, exe"
    )]
    emit: String,

    #[arg(long, help = "Compile as a library (no main required)")]
    lib: bool,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory holding pyrinas.h and pyrinas.c (defaults to the bundled runtime)"
    )]
    runtime: Option<String>,

    #[arg(
        short = 'M',
        long = "module-path",
        value_name = "DIR",
        help = "Extra directory to search for imported modules"
    )]
    module_path: Vec<String>,

    #[arg(long, value_name = "COMPILER", default_value = "cc")]
    cc: String,

    #[arg(long, help = "Print the token stream to stderr")]
    dump_tokens: bool,

    #[arg(long, help = "Print the syntax tree to stderr")]
    dump_ast: bool,

    #[arg(long, help = "Print the generated C to stderr")]
    dump_c: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn default_runtime_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../runtime")
}

fn execute(cli: Cli) -> Result<()> {
    let runtime_root = cli
        .runtime
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_runtime_root);

    let (source, input_path) = match &cli.input {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {path}"))?;
            (source, Some(PathBuf::from(path)))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read source from stdin")?;
            (buffer, None)
        }
    };

    let unit = if cli.lib || input_path.as_deref().is_some_and(is_library_path) {
        UnitKind::Library
    } else {
        UnitKind::Program
    };
    let options = CompileOptions {
        unit,
        dump_tokens: cli.dump_tokens,
        dump_ast: cli.dump_ast,
        dump_output: cli.dump_c,
        ..CompileOptions::default()
    };

    let base = match input_path.as_deref().and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => env::current_dir().context("failed to read current directory")?,
    };
    let extra: Vec<PathBuf> = cli.module_path.iter().map(PathBuf::from).collect();
    let mut resolver = ModuleResolver::new(&base, &extra, &options.runtime_header, cli.verbose);

    let current = input_path.as_deref().map(fs::canonicalize).transpose()?;
    let fragments = resolver.fragments_for(&source, current.as_deref())?;

    let label = cli.input.as_deref().unwrap_or("<stdin>");
    if cli.verbose {
        eprintln!("compiling {label} as {unit:?}");
    }
    let artifact = compile_c(&source, &options, &fragments)
        .with_context(|| format!("failed to compile {label}"))?;
    print_dumps(&artifact);

    match cli.emit.as_str() {
        "c" => {
            write_output(&cli.output, artifact.c_source.as_bytes())?;
            let dir = output_dir(&cli.output);
            for module in resolver.compiled() {
                let path = dir.join(module.c_file_name());
                write_output(&path, module.c_source.as_bytes())?;
            }
            if cli.verbose {
                eprintln!("wrote {}", cli.output);
            }
        }
        "exe" => {
            let c_path = PathBuf::from(format!("{}.c", cli.output));
            write_output(&c_path, artifact.c_source.as_bytes())?;
            let mut sources = vec![c_path];
            let dir = output_dir(&cli.output);
            for module in resolver.compiled() {
                let path = dir.join(module.c_file_name());
                write_output(&path, module.c_source.as_bytes())?;
                sources.push(path);
            }
            build_executable(&cli, &runtime_root, &sources, resolver.libraries())?;
            if cli.verbose {
                eprintln!("built {}", cli.output);
            }
        }
        other => return Err(anyhow!("unsupported emit format: {other}")),
    }

    Ok(())
}

fn print_dumps(artifact: &CompilationArtifact) {
    if let Some(tokens) = &artifact.dumps.tokens {
        eprintln!("--- tokens ---\n{tokens}");
    }
    if let Some(ast) = &artifact.dumps.ast {
        eprintln!("--- ast ---\n{ast}");
    }
    if let Some(output) = &artifact.dumps.output {
        eprintln!("--- c ---\n{output}");
    }
}

fn output_dir(output: &str) -> PathBuf {
    Path::new(output)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn build_executable(
    cli: &Cli,
    runtime_root: &Path,
    sources: &[PathBuf],
    libraries: &[String],
) -> Result<()> {
    let runtime_source = runtime_root.join("pyrinas.c");
    if !runtime_source.is_file() {
        bail!("runtime source not found at {}", runtime_source.display());
    }

    let mut command = Command::new(&cli.cc);
    command
        .arg("-I")
        .arg(runtime_root)
        .arg("-o")
        .arg(&cli.output)
        .args(sources)
        .arg(&runtime_source);
    for library in libraries.iter().filter(|library| library.as_str() != "m") {
        command.arg(format!("-l{library}"));
    }
    command.arg("-lm");

    if cli.verbose {
        eprintln!("running {command:?}");
    }
    let output = command
        .output()
        .with_context(|| format!("failed to run C compiler {}", cli.cc))?;
    if !output.status.success() {
        bail!(
            "C compiler failed\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

fn write_output(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}
