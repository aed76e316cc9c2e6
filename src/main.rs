use clap::Parser;
use curlew::options::DEFAULT_MAX_DEPTH;
use curlew::{compile_with, global_registry, map_from_json, DataError, Map, Options};
use tracing_subscriber::EnvFilter;

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Render a `{{ }}` template against JSON data.
#[derive(Parser, Debug)]
#[command(name = "curlew", version)]
struct Cli {
    /// Template file, or `-` to read it from stdin.
    template: PathBuf,

    /// JSON object to render against. Defaults to `{}`.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Report problems in the template instead of rendering it.
    #[arg(long)]
    check: bool,

    /// Deepest allowed block or expression nesting.
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Longest accepted template, in bytes.
    #[arg(long)]
    max_len: Option<usize>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("curlew=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let template_src = match read_input(&cli.template) {
        Ok(src) => src,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::from(2);
        }
    };

    let mut options = Options::new().with_max_depth(cli.max_depth);
    if let Some(max_len) = cli.max_len {
        options = options.with_max_template_len(max_len);
    }
    let template = compile_with(&template_src, &options);

    if cli.check {
        let errors = template.validate(&global_registry());
        if errors.is_empty() {
            return ExitCode::SUCCESS;
        }
        for err in &errors {
            eprintln!("[{}] {} at /{}", err.code, err.message, err.path.join("/"));
        }
        return ExitCode::FAILURE;
    }

    let data = match load_data(cli.data.as_deref()) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::from(2);
        }
    };

    let output = template.render(&data);
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout.write_all(output.as_bytes()).and_then(|_| stdout.flush()) {
        eprintln!("cannot write output: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn read_input(path: &Path) -> Result<String, DataError> {
    let io_err = |source| DataError::Io {
        path: path.display().to_string(),
        source,
    };
    if path == Path::new("-") {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input).map_err(io_err)?;
        Ok(input)
    } else {
        fs::read_to_string(path).map_err(io_err)
    }
}

fn load_data(path: Option<&Path>) -> Result<Map, DataError> {
    match path {
        Some(path) => map_from_json(&read_input(path)?),
        None => Ok(Map::new()),
    }
}
