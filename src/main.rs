#[macro_use]
mod log;

mod config;
mod fetch;
mod gmail;
mod record;
mod rules;
mod store;

use config::Config;
use gmail::client::GmailClient;
use rules::processor::Processor;
use std::path::{Path, PathBuf};
use std::process::Command;
use store::Store;

const DEFAULT_MAX_RESULTS: u32 = 50;

fn default_config_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("mailsift").join("config.toml")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
            .join(".config")
            .join("mailsift")
            .join("config.toml")
    } else {
        PathBuf::from("config.toml")
    }
}

pub fn run_token_command(cmd: &str) -> Result<String, String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .map_err(|e| format!("failed to execute token command: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "token command exited with {}: {}",
            output.status, stderr
        ));
    }

    let token = String::from_utf8(output.stdout)
        .map_err(|e| format!("token command output is not valid UTF-8: {}", e))?;
    let token = token.trim();
    if token.is_empty() {
        return Err("token command printed nothing".to_string());
    }
    Ok(token.to_string())
}

fn connect(config: &Config) -> Result<GmailClient, String> {
    let token = run_token_command(&config.gmail.token_command)?;
    Ok(GmailClient::new(
        &config.gmail.api_url,
        &config.gmail.user_id,
        &token,
    ))
}

fn open_store(config: &Config) -> Result<Store, String> {
    Store::open(&config.store_path).map_err(|e| e.to_string())
}

/// `--rules=PATH`, then `[rules] path` from the config, then `rules.json`
/// next to the config file.
fn resolve_rules_path(args: &[String], config: &Config, config_path: &Path) -> PathBuf {
    if let Some(arg) = args.iter().find(|a| a.starts_with("--rules=")) {
        return PathBuf::from(&arg["--rules=".len()..]);
    }
    if let Some(ref path) = config.rules_path {
        return path.clone();
    }
    config_path
        .parent()
        .map(|p| p.join("rules.json"))
        .unwrap_or_else(|| PathBuf::from("rules.json"))
}

fn cmd_init_db(config: &Config) -> Result<(), String> {
    let store = open_store(config)?;
    let count = store.count().map_err(|e| e.to_string())?;
    println!(
        "Store ready at {} ({} email(s)).",
        store.path().display(),
        count
    );
    Ok(())
}

fn cmd_fetch(args: &[String], config: &Config) -> Result<(), String> {
    let max_results = match args.iter().find(|a| a.starts_with("--max-results=")) {
        Some(arg) => {
            let raw = &arg["--max-results=".len()..];
            match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(format!("invalid --max-results value '{}'", raw)),
            }
        }
        None => DEFAULT_MAX_RESULTS,
    };

    let store = open_store(config)?;
    let client = connect(config)?;
    let fetched = fetch::fetch_and_store(&client, &store, max_results)?;
    println!("Fetched {} message(s).", fetched);
    Ok(())
}

fn cmd_process(args: &[String], config: &Config, config_path: &Path) -> Result<(), String> {
    let stop_after_first_match = if args.iter().any(|a| a == "--stop-after-first-match") {
        true
    } else if args.iter().any(|a| a == "--allow-multiple") {
        false
    } else {
        config.processing.stop_after_first_match
    };

    let rules_path = resolve_rules_path(args, config, config_path);
    let rulesets = rules::load_rules(&rules_path).map_err(|e| e.to_string())?;
    println!(
        "Loaded {} rule-set(s) from {}",
        rulesets.len(),
        rules_path.display()
    );

    let store = open_store(config)?;
    let client = connect(config)?;
    let processor = Processor::new(&store, &client, &config.processing);
    let matched = processor
        .process(&rulesets, stop_after_first_match)
        .map_err(|e| e.to_string())?;
    println!("Applied rules to {} matching email(s).", matched);
    Ok(())
}

fn cmd_print_rules(args: &[String], config: &Config, config_path: &Path) -> Result<(), String> {
    let rules_path = resolve_rules_path(args, config, config_path);
    let rulesets = rules::load_rules(&rules_path).map_err(|e| e.to_string())?;
    println!("Rules file: {}", rules_path.display());
    println!("Rule-sets loaded: {}", rulesets.len());
    println!();
    print!("{}", rules::format_rules_for_display(&rulesets));
    Ok(())
}

fn print_usage() {
    eprintln!("Usage: mailsift [--config=PATH] <COMMAND> [OPTIONS]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  init-db                  Create the local store and print its path");
    eprintln!("  fetch                    Download inbox messages into the local store");
    eprintln!("    --max-results=N        Number of messages to fetch (default: 50)");
    eprintln!("  process                  Apply rule-sets to every stored email");
    eprintln!("    --rules=PATH           Use rules file at PATH");
    eprintln!("    --stop-after-first-match  Apply at most one rule-set per email");
    eprintln!("    --allow-multiple       Apply every matching rule-set");
    eprintln!("  print-rules              Parse and print the rules file");
    eprintln!("    --rules=PATH           Use rules file at PATH");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config=PATH            Use config file at PATH instead of default");
    eprintln!("  --help-config            Print default config path and all options");
    eprintln!("  --help                   Show this help");
    eprintln!();
    eprintln!("Set MAILSIFT_DEBUG=1 for debug logging on stderr.");
}

fn print_help_config() {
    let config_path = default_config_path();
    println!("Default config file: {}", config_path.display());
    println!();
    println!("Available options:");
    println!();
    println!("[gmail]                          # Required");
    println!("  token_command = \"gcloud auth print-access-token\"  # Shell command printing an OAuth access token (required)");
    println!("  api_url = \"https://gmail.googleapis.com/gmail/v1\" # API base URL (default shown)");
    println!("  user_id = \"me\"                # Mailbox owner (default: \"me\")");
    println!();
    println!("[store]");
    println!(
        "  path = \"{}\"  # Local email store",
        config::default_store_path().display()
    );
    println!();
    println!("[rules]");
    println!("  path = \"rules.json\"          # Rules file (default: rules.json next to the config)");
    println!("  default_move_label = \"Processed\"  # Target of move_message without a label (default: \"Processed\")");
    println!("  stop_after_first_match = false  # Apply at most one rule-set per email (default: false)");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(if args.is_empty() { 1 } else { 0 });
    }

    if args.iter().any(|a| a == "--help-config") {
        print_help_config();
        std::process::exit(0);
    }

    log::init();

    let command = match args.iter().find(|a| !a.starts_with("--")) {
        Some(c) => c.as_str(),
        None => {
            print_usage();
            std::process::exit(1);
        }
    };

    let config_path = args
        .iter()
        .find(|a| a.starts_with("--config="))
        .map(|a| PathBuf::from(&a["--config=".len()..]))
        .unwrap_or_else(default_config_path);

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config from {}: {}", config_path.display(), e);
            eprintln!("Create a config file with:");
            eprintln!();
            eprintln!("  [gmail]");
            eprintln!("  token_command = \"gcloud auth print-access-token\"");
            std::process::exit(1);
        }
    };

    let result = match command {
        "init-db" => cmd_init_db(&config),
        "fetch" => cmd_fetch(&args, &config),
        "process" => cmd_process(&args, &config, &config_path),
        "print-rules" => cmd_print_rules(&args, &config, &config_path),
        other => {
            eprintln!("Unknown command '{}'", other);
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        log_error!("[Main] {} failed: {}", command, e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
