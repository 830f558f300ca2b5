use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "fedimap",
    version,
    about = "Crawl the fediverse and map how instances interact"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
/// Exit codes:
///   0  success
///   1  general/unknown error
///   2  configuration error
///   4  database error
///   5  HTTP client setup error
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}");
    let lower = msg.to_lowercase();

    if lower.contains("config") {
        2 // config error
    } else if lower.contains("database") || lower.contains("sqlite") {
        4 // database error
    } else if lower.contains("http client") {
        5 // client setup error
    } else {
        1 // general error
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the selected command
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command, cli.quiet)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_config() {
        let err = anyhow::anyhow!("Cannot load config: fedimap.toml: Parse error: expected `=`");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_database() {
        let err = anyhow::anyhow!("Cannot open database: /tmp/fedimap.db");
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_store_error_inside_crawl() {
        let err = anyhow::anyhow!("Store error: SQLite error: disk I/O error")
            .context("Crawl pass failed");
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_client() {
        let err = anyhow::anyhow!("HTTP client build failed: no TLS backend")
            .context("Cannot build HTTP client");
        assert_eq!(classify_exit_code(&err), 5);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
