use onedrived::daemon::{DaemonConfig, DaemonRuntime};
use onedrived::storage::TokenStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Once,
    Monitor,
    Logout,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CliOptions {
    mode: CliMode,
    resync: bool,
    verbose: bool,
}

fn parse_cli<I>(args: I) -> anyhow::Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions {
        mode: CliMode::Once,
        resync: false,
        verbose: false,
    };
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--monitor" | "-m" => options.mode = CliMode::Monitor,
            "--resync" => options.resync = true,
            "--verbose" | "-v" => options.verbose = true,
            "--logout" => options.mode = CliMode::Logout,
            "--help" | "-h" => options.mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let options = parse_cli(std::env::args())?;
    match options.mode {
        CliMode::Logout => {
            let storage = TokenStorage::new()?;
            storage.delete()?;
            eprintln!("[onedrived] saved credentials removed");
            return Ok(());
        }
        CliMode::Help => {
            println!("Usage: onedrived [--monitor] [--resync] [--verbose]");
            println!("  --monitor  Keep running: poll the change feed and watch the sync root");
            println!("  --resync   Drop the persisted cursor and index before the first pass");
            println!("  --verbose  Log every local filesystem event");
            println!("  --logout   Remove saved OAuth credentials and exit");
            return Ok(());
        }
        CliMode::Once | CliMode::Monitor => {}
    }

    let mut config = DaemonConfig::from_env()?;
    config.verbose |= options.verbose;
    let daemon = DaemonRuntime::bootstrap(config, options.resync).await?;
    match options.mode {
        CliMode::Monitor => daemon.run_monitor().await,
        _ => daemon.run_once().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("onedrived")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_cli_defaults_to_single_pass() {
        let options = parse_cli(args(&[])).unwrap();
        assert_eq!(options.mode, CliMode::Once);
        assert!(!options.resync);
        assert!(!options.verbose);
    }

    #[test]
    fn parse_cli_supports_monitor_with_flags() {
        let options = parse_cli(args(&["--monitor", "--resync", "-v"])).unwrap();
        assert_eq!(options.mode, CliMode::Monitor);
        assert!(options.resync);
        assert!(options.verbose);
    }

    #[test]
    fn parse_cli_rejects_unknown_flags() {
        assert!(parse_cli(args(&["--frobnicate"])).is_err());
    }
}
