use {anyhow::Result, clap::Subcommand, mqtg_config::MqtgConfig};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report every problem.
    Check,
    /// Print the effective configuration with the bot token hidden.
    Show,
}

pub async fn handle_config(action: &ConfigAction, loaded: mqtg_config::Result<MqtgConfig>) -> Result<()> {
    match action {
        ConfigAction::Check => check(loaded),
        ConfigAction::Show => {
            println!("{:#?}", loaded?);
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(loaded: mqtg_config::Result<MqtgConfig>) -> Result<()> {
    let problems = match loaded.and_then(|config| mqtg_config::validate(&config)) {
        Ok(()) => Vec::new(),
        Err(mqtg_config::Error::Invalid { problems }) => problems,
        Err(e) => vec![e.to_string()],
    };

    for problem in &problems {
        eprintln!("  {BOLD}{RED}error{RESET} {problem}");
    }

    if problems.is_empty() {
        eprintln!("No issues found.");
        Ok(())
    } else {
        eprintln!("\n{} error(s)", problems.len());
        std::process::exit(1);
    }
}
