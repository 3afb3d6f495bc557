use anyhow::Result;
use std::ffi::OsString;
use std::path::PathBuf;

use imgeval::{logging, Config, Device, Evaluator};

struct Args {
    image: PathBuf,
    prompt: String,
    device: Option<Device>,
    config_path: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> Args {
    parse_args_from(std::env::args_os().collect())
}

fn parse_args_from(args: Vec<OsString>) -> Args {
    let mut device = None;
    let mut config_path = None;
    let mut log_dir = None;
    let mut json = false;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].to_str() {
            Some("--help" | "-h") => {
                print_help();
                std::process::exit(0);
            }
            Some("--version" | "-V") => {
                println!("imgeval {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Some("--json") => {
                json = true;
            }
            Some("--device" | "-d") => {
                let value = option_value(&args, i, "--device");
                match value.to_str().map(str::parse::<Device>) {
                    Some(Ok(parsed)) => device = Some(parsed),
                    Some(Err(e)) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                    None => {
                        eprintln!("Error: --device must be valid UTF-8");
                        std::process::exit(1);
                    }
                }
                i += 1;
            }
            Some("--config" | "-c") => {
                config_path = Some(PathBuf::from(option_value(&args, i, "--config")));
                i += 1;
            }
            Some("--log-dir") => {
                log_dir = Some(PathBuf::from(option_value(&args, i, "--log-dir")));
                i += 1;
            }
            Some(flag) if flag.starts_with('-') && flag.len() > 1 => {
                eprintln!("Unknown argument: {}", flag);
                print_help();
                std::process::exit(1);
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    if positional.len() != 2 {
        eprintln!("Error: expected <IMAGE> and <PROMPT>");
        print_help();
        std::process::exit(1);
    }

    let prompt = positional.pop().unwrap_or_default();
    let image = PathBuf::from(positional.pop().unwrap_or_default());

    // Paths may be any bytes; the prompt is text
    let prompt = match prompt.into_string() {
        Ok(prompt) => prompt,
        Err(_) => {
            eprintln!("Error: <PROMPT> must be valid UTF-8");
            std::process::exit(1);
        }
    };

    Args {
        image,
        prompt,
        device,
        config_path,
        log_dir,
        json,
    }
}

fn option_value<'a>(args: &'a [OsString], i: usize, name: &str) -> &'a OsString {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", name);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"imgeval - score an image against a text prompt

USAGE:
    imgeval [OPTIONS] <IMAGE> <PROMPT>

OPTIONS:
    --device, -d DEVICE   auto, cpu, cuda or cuda:N (default: from config)
    --config, -c PATH     Path to config file
    --json                Print scores as a JSON object
    --log-dir PATH        Write logs to a daily file in PATH
    --version, -V         Show version
    --help, -h            Show this help message

ENVIRONMENT:
    IMGEVAL_CONFIG        Path to config file (overrides default location)
    IMGEVAL_LOG           Log level (trace, debug, info, warn, error)
    ORT_DYLIB_PATH        Path to the ONNX Runtime shared library

Config file location: $XDG_CONFIG_HOME/imgeval/config.toml"#
    );
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(device) = args.device {
        config.device = device;
    }

    let evaluator = Evaluator::from_config(&config)?;
    let results = evaluator.evaluate(args.image.as_path(), &args.prompt)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("Relevance: {}", results.relevance);
        println!("Quality:   {}", results.quality);
        println!("Aesthetic: {}", results.aesthetic);
    }

    Ok(())
}

fn main() {
    let args = parse_args();

    let _ = logging::init(args.log_dir.clone());

    if let Err(e) = run(args) {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
