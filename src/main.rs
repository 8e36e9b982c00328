use clap::{Arg, Command};
use log::LevelFilter;
use mailtriage::classifier::EmailClassifier;
use mailtriage::config::Config;
use serde::Deserialize;
use std::process;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct BatchRecord {
    #[serde(default)]
    subject: String,
    body: String,
}

#[tokio::main]
async fn main() {
    let matches = Command::new("mailtriage")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Hybrid rule/ML inbound email classification engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("mailtriage.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write the default configuration file and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration (hierarchy integrity, pattern targets) and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("subject")
                .short('s')
                .long("subject")
                .value_name("TEXT")
                .help("Subject of a single email to classify")
                .default_value(""),
        )
        .arg(
            Arg::new("body")
                .short('b')
                .long("body")
                .value_name("TEXT")
                .help("Body of a single email to classify"),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .value_name("FILE")
                .help("Classify a JSON-lines file ({\"subject\":...,\"body\":...} per line)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Print per-label usage counts after classification")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        match Config::default().to_file(path) {
            Ok(()) => println!("Default configuration written to {path}"),
            Err(e) => {
                eprintln!("Error writing configuration: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        match config.build() {
            Ok((hierarchy, patterns)) => {
                println!("Configuration OK");
                println!("  categories: {}", hierarchy.categories().len());
                println!("  labels:     {}", hierarchy.label_count());
                println!("  patterns:   {}", patterns.rule_count());
                println!("  threshold:  {:.2}", config.min_confidence);
            }
            Err(e) => {
                eprintln!("Configuration invalid: {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    let classifier = match EmailClassifier::new(&config) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            eprintln!("Error initializing classifier: {e:#}");
            process::exit(1);
        }
    };

    if let Some(batch_path) = matches.get_one::<String>("batch") {
        if let Err(e) = run_batch(Arc::clone(&classifier), batch_path).await {
            eprintln!("Batch classification failed: {e:#}");
            process::exit(1);
        }
    } else if let Some(body) = matches.get_one::<String>("body") {
        let subject = matches.get_one::<String>("subject").unwrap();
        let output = classifier.classify(subject, body);
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing result: {e}"),
        }
    } else {
        eprintln!("Nothing to do: pass --body, --batch, --test-config or --generate-config");
        process::exit(1);
    }

    if matches.get_flag("stats") {
        print_stats(&classifier);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        let config = Config::from_file(path)?;
        log::info!("Loaded configuration from {path}");
        Ok(config)
    } else {
        log::warn!("Configuration file {path} not found, using built-in defaults");
        Ok(Config::default())
    }
}

async fn run_batch(classifier: Arc<EmailClassifier>, path: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read batch file: {path}"))?;

    let mut handles = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: BatchRecord = serde_json::from_str(line)
            .with_context(|| format!("bad record on line {}", line_no + 1))?;

        let classifier = Arc::clone(&classifier);
        handles.push(tokio::spawn(async move {
            classifier.classify(&record.subject, &record.body)
        }));
    }

    let total = handles.len();
    for handle in handles {
        let output = handle.await?;
        println!("{}", serde_json::to_string(&output)?);
    }
    log::info!("Batch complete: {total} emails classified");
    Ok(())
}

fn print_stats(classifier: &EmailClassifier) {
    let stats = classifier.stats();
    let mut rows: Vec<_> = stats.into_iter().filter(|(_, count)| *count > 0).collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    eprintln!();
    eprintln!("Label usage:");
    if rows.is_empty() {
        eprintln!("  (no classifications recorded)");
    }
    for (label, count) in rows {
        eprintln!("  {count:>8}  {label}");
    }
}
