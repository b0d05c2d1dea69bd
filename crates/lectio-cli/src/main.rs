use lectio::render::{DiagramView, OutlineEngine, RenderOptions, RetryEngine, to_html};
use lectio::{HeadlessError, HeadlessPipeline, LectioConfig, normalize_diagram_source};
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Document(HeadlessError),
    Json(serde_json::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Document(err) => write!(f, "{err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::Yaml(err) => write!(f, "YAML error: {err}"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<HeadlessError> for CliError {
    fn from(value: HeadlessError) -> Self {
        Self::Document(value)
    }
}

impl From<lectio::Error> for CliError {
    fn from(value: lectio::Error) -> Self {
        Self::Document(value.into())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    #[default]
    Repair,
    Check,
    Render,
    Diagram,
}

#[derive(Debug, Clone, Copy, Default)]
enum RenderFormat {
    #[default]
    Json,
    Html,
}

impl FromStr for RenderFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    pretty: bool,
    config: Option<String>,
    no_repair: bool,
    render_format: RenderFormat,
    out: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiagramOut<'a> {
    recognized: bool,
    normalized: &'a str,
    view: &'a DiagramView,
}

fn usage() -> &'static str {
    "lectio-cli\n\
\n\
USAGE:\n\
  lectio-cli [repair] [--pretty] [--config <path>] [<path>|-]\n\
  lectio-cli check [--config <path>] [<path>|-]\n\
  lectio-cli render [--format json|html] [--pretty] [--config <path>] [--no-repair] [--out <path>] [<path>|-]\n\
  lectio-cli diagram [--pretty] [--config <path>] [<path>|-]\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', input is read from stdin.\n\
  - repair prints {document, diagnostics}; check prints diagnostics only.\n\
  - render prints the presentation tree (json) or an HTML fragment (html).\n\
  - diagram reads a single diagram source, normalizes it and renders it with the retry engine.\n\
  - --config accepts a JSON or YAML file merged over the defaults.\n\
  - Set LECTIO_LOG (e.g. LECTIO_LOG=debug) to control log output on stderr.\n\
"
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "repair" => args.command = Command::Repair,
            "check" => args.command = Command::Check,
            "render" => args.command = Command::Render,
            "diagram" => args.command = Command::Diagram,
            "--pretty" => args.pretty = true,
            "--no-repair" => args.no_repair = true,
            "--format" => {
                let Some(fmt) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.render_format = fmt
                    .parse::<RenderFormat>()
                    .map_err(|_| CliError::Usage(usage()))?;
            }
            "--config" => {
                let Some(path) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.config = Some(path.clone());
            }
            "--out" => {
                let Some(out) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.out = Some(out.clone());
            }
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            "-" if args.input.is_none() => args.input = Some("-".to_string()),
            other if other.starts_with('-') => return Err(CliError::Usage(usage())),
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    Ok(args)
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

/// Defaults merged with the overrides in `path` (JSON for `.json`, YAML otherwise).
fn load_config(path: Option<&str>) -> Result<LectioConfig, CliError> {
    let Some(path) = path else {
        return Ok(LectioConfig::defaults());
    };
    let text = std::fs::read_to_string(path)?;
    let overrides: Value = if path.ends_with(".json") {
        serde_json::from_str(&text)?
    } else {
        serde_yaml::from_str(&text)?
    };
    let config = LectioConfig::with_overrides(&overrides);
    config.validate()?;
    Ok(config)
}

fn to_json(value: &impl Serialize, pretty: bool) -> Result<String, CliError> {
    let mut text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    text.push('\n');
    Ok(text)
}

fn write_text(text: &str, out: Option<&str>) -> Result<(), CliError> {
    match out {
        None => {
            print!("{text}");
            Ok(())
        }
        Some(path) => {
            std::fs::write(path, text)?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LECTIO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_diagram(args: &Args, config: &LectioConfig, source: &str) -> Result<String, CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let normalized = normalize_diagram_source(source);
    let engine = RetryEngine::new(OutlineEngine::default(), RenderOptions::from_config(config));
    let base_id = engine.options().id_prefix.clone();
    let view = runtime.block_on(engine.render_diagram(&base_id, normalized.text()));
    to_json(
        &DiagramOut {
            recognized: normalized.is_recognized(),
            normalized: normalized.text(),
            view: &view,
        },
        args.pretty,
    )
}

fn run_document(args: &Args, config: LectioConfig, input: &str) -> Result<String, CliError> {
    let pipeline = HeadlessPipeline::with_config(config)?;
    let document = pipeline.parse(input)?;
    tracing::debug!(blocks = document.blocks.len(), "document parsed");

    if let Command::Render = args.command {
        let document = if args.no_repair {
            document
        } else {
            pipeline.repair_deterministic(document).document
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let tree = runtime.block_on(pipeline.render(&document));
        return match args.render_format {
            RenderFormat::Json => to_json(&tree, args.pretty),
            RenderFormat::Html => Ok(to_html(&tree)),
        };
    }

    let outcome = pipeline.repair_deterministic(document);
    if let Command::Check = args.command {
        to_json(&outcome.diagnostics, args.pretty)
    } else {
        to_json(&outcome, args.pretty)
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let input = read_input(args.input.as_deref())?;
    let text = match args.command {
        Command::Diagram => run_diagram(&args, &config, &input)?,
        Command::Repair | Command::Check | Command::Render => run_document(&args, config, &input)?,
    };
    write_text(&text, args.out.as_deref())
}

fn main() {
    init_tracing();

    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
