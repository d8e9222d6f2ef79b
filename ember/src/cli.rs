use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::ArgMatches;
use ember_config::{Config, OverridableConfig};
use ember_log::LogConfig;

use crate::cliapp::make_app;
use crate::setup;
use crate::upload::{self, Upload};

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new(".ember"), PathBuf::as_path);

    // Commands that do not need to load the config:
    if let Some(matches) = matches.subcommand_matches("config") {
        if matches.subcommand_matches("init").is_some() {
            return init_config(config_path);
        }
    } else if let Some(matches) = matches.subcommand_matches("upload") {
        ember_log::init(&LogConfig::default());
        return upload_recording(matches);
    }

    let mut config = load_config(config_path)?;
    // override file config with environment variables
    let env_config = extract_config_env_vars();
    config.apply_override(env_config)?;

    ember_log::init(config.logging());

    if let Some(matches) = matches.subcommand_matches("config") {
        manage_config(&config, matches)
    } else if let Some(matches) = matches.subcommand_matches("run") {
        // override config with run command args
        let arg_config = extract_config_args(matches);
        config.apply_override(arg_config)?;
        run(config)
    } else {
        unreachable!();
    }
}

/// Loads the config from the config folder, or the defaults if the folder has no config.
fn load_config(path: &Path) -> Result<Config> {
    if Config::config_exists(path) {
        Ok(Config::from_path(path)?)
    } else {
        Ok(Config::default())
    }
}

/// Extract config arguments from a parsed command line arguments object
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        host: matches.get_one("host").cloned(),
        port: matches.get_one("port").cloned(),
        upstream: matches.get_one("upstream").cloned(),
        log_level: None,
        shutdown_timeout: matches.get_one("shutdown_timeout").cloned(),
    }
}

/// Extract config arguments from environment variables
pub fn extract_config_env_vars() -> OverridableConfig {
    OverridableConfig {
        host: env::var("EMBER_HOST").ok(),
        port: env::var("EMBER_PORT").ok(),
        upstream: env::var("EMBER_UPSTREAM").ok(),
        log_level: env::var("EMBER_LOG_LEVEL").ok(),
        shutdown_timeout: env::var("EMBER_SHUTDOWN_TIMEOUT").ok(),
    }
}

#[allow(clippy::print_stdout)]
fn init_config(config_path: &Path) -> Result<()> {
    if Config::config_exists(config_path) {
        return Err(anyhow!(
            "a config already exists in {}",
            config_path.display()
        ));
    }

    Config::create_default(config_path)?;
    println!("All done! Config written to {}", config_path.display());

    Ok(())
}

#[allow(clippy::print_stdout)]
fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    if matches.subcommand_matches("show").is_some() {
        print!("{}", config.to_yaml_string()?);
        Ok(())
    } else {
        unreachable!();
    }
}

#[allow(clippy::print_stdout)]
fn upload_recording(matches: &ArgMatches) -> Result<()> {
    let params = Upload::from_matches(matches)?;
    let body = upload::upload(&params)?;

    if matches.get_flag("verbose") && !body.is_empty() {
        println!("{body}");
    }

    ember_log::info!("upload accepted");
    Ok(())
}

pub fn run(config: Config) -> Result<()> {
    setup::dump_spawn_infos(&config);
    let metrics = setup::init_metrics(&config)?;
    ember_server::run(config, metrics)?;
    Ok(())
}
