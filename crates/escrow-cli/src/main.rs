mod config;
mod demo;
mod logging;
mod services;
mod ui;

use std::env;
use std::path::PathBuf;

use escrow_core::Config;
use escrow_core::OperationRegistry;
use escrow_core::Payable;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("escrow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "operations" => {
            print_operations();
            Ok(())
        }
        "demo" => {
            let options = parse_options(args.collect())?;
            run_demo(options)
        }
        "console" => {
            let options = parse_options(args.collect())?;
            if options.json {
                return Err("--json is only supported by demo".into());
            }
            run_console(options)
        }
        _ => {
            print_help();
            Err(format!("unknown command: {command}").into())
        }
    }
}

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    json: bool,
}

fn parse_options(args: Vec<String>) -> Result<Options, Box<dyn std::error::Error>> {
    let mut options = Options::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--config requires a path".into());
                };
                options.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--json" => {
                options.json = true;
                i += 1;
            }
            other => {
                return Err(format!("unsupported argument: {other}").into());
            }
        }
    }
    Ok(options)
}

fn load(options: &Options) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(config::load_config(options.config.as_deref())?)
}

fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
}

fn run_demo(options: Options) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_stderr();
    let config = load(&options)?;
    let runtime = build_runtime()?;
    let transcript = runtime.block_on(demo::run_demo(&config));
    if options.json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else {
        demo::print_transcript(&transcript);
    }
    Ok(())
}

fn run_console(options: Options) -> Result<(), Box<dyn std::error::Error>> {
    let log_path = logging::init_file()?;
    let config = load(&options)?;
    tracing::info!(log = %log_path.display(), rpc = %config.network.rpc_url, "console starting");
    let runtime = build_runtime()?;
    ui::run(&runtime, &config)
}

fn print_operations() {
    println!(
        "{:<22} {:<13} {:<18} {:<6} {:<18} {}",
        "operation", "registry", "function", "mode", "inputs", "value"
    );
    for spec in OperationRegistry::list() {
        let inputs: Vec<&str> = spec.inputs.iter().map(|input| input.label()).collect();
        let value = match spec.payable {
            Payable::No => "-".to_string(),
            Payable::ValueEqualsArg(index) => format!("== arg #{}", index + 1),
        };
        println!(
            "{:<22} {:<13} {:<18} {:<6} {:<18} {}",
            spec.id.as_str(),
            spec.registry.label().trim_end_matches(" registry"),
            spec.function,
            spec.mode.label(),
            inputs.join(", "),
            value
        );
    }
}

fn print_help() {
    println!("escrow {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  escrow operations");
    println!("  escrow demo [--json] [--config PATH]");
    println!("  escrow console [--config PATH]");
    println!("  escrow --help");
    println!("  escrow --version");
}
