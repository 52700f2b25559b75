use std::path::{Component, Path, PathBuf};
use std::sync::Once;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "pathvm::vm=info,pathvm::vm::alloc=debug,pathvm::module=debug,pathvm_cli=info";

use anyhow::Context;
use clap::{Parser, Subcommand};
use pathvm_core::{
    module::ModuleRegistry,
    vm::{self, Image, Vm, VmConfig},
};
use tracing::info;


#[derive(Debug, Parser)]
#[command(
    name = "pathvm",
    author,
    version,
    about = "Run and inspect pathvm bytecode images",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Commands>,

    /// If no subcommand, treat as an image file to run
    #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
    file: Option<PathBuf>,

    /// VM settings in TOML (`max_call_depth`, `initial_stack_capacity`, `frame_pool_limit`)
    #[arg(long, global = true, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,

    /// Override the nested call limit
    #[arg(long, global = true, value_name = "N")]
    max_call_depth: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run an image and print what its entry lambda leaves on the stack.
    Run {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
    /// Load and validate an image without running it.
    Check {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
    /// Print the bytecode of an image.
    Disasm {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("PATHVM_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn load_config(path: Option<&Path>, max_call_depth: Option<usize>) -> anyhow::Result<VmConfig> {
    let mut config = match path {
        Some(path) => VmConfig::from_path(path)?,
        None => VmConfig::default(),
    };
    if let Some(limit) = max_call_depth {
        config.max_call_depth = limit;
    }
    Ok(config)
}

fn load_image(path: &Path) -> anyhow::Result<(Image, ModuleRegistry)> {
    let mut registry = pathvm_stdlib::stdlib_registry()?;
    let image = Image::load(path, &mut registry)?;
    Ok((image, registry))
}

fn run_image(path: &Path, config: VmConfig) -> anyhow::Result<()> {
    let (image, registry) = load_image(path)?;
    let mut vm = Vm::with_config(config);
    let results = image.run(&mut vm, &registry)?;
    info!(target: "pathvm_cli", results = results.len(), "run finished");
    for value in results {
        println!("{}", value);
    }
    Ok(())
}

fn check_image(path: &Path) -> anyhow::Result<()> {
    let (image, registry) = load_image(path)?;
    println!(
        "ok: {} lambdas, {} records, {} modules",
        image.lambdas.len(),
        image.records.len(),
        registry.records().count()
    );
    Ok(())
}

fn disasm_image(path: &Path) -> anyhow::Result<()> {
    let (image, _) = load_image(path)?;
    // Record initializers are listed even when the entry never allocates them.
    let roots = std::iter::once(image.entry.clone()).chain(image.records.iter().map(|r| r.init.clone()));
    let out = vm::disassemble_all(roots).context("failed to disassemble image")?;
    print!("{}", out);
    Ok(())
}

fn try_main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs {
        command,
        file,
        config,
        max_call_depth,
    } = CliArgs::parse();
    let config = load_config(config.as_deref(), max_call_depth)?;

    match (command, file) {
        (Some(Commands::Run { file }), _) | (None, Some(file)) => run_image(&file, config),
        (Some(Commands::Check { file }), _) => check_image(&file),
        (Some(Commands::Disasm { file }), _) => disasm_image(&file),
        (None, None) => anyhow::bail!("no image given; see `pathvm --help`"),
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
