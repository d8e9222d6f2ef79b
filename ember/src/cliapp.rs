//! This module implements the definition of the command line app.

use std::path::PathBuf;

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "The ingest server for Java Flight Recorder profiles.";

pub fn make_app() -> Command {
    Command::new("ember")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .propagate_version(true)
        .max_term_width(79)
        .help_template(
            "\
{bin} {version}
{about}

{usage-heading} {usage}

{all-args}",
        )
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("DIR")
                .env("EMBER_CONFIG")
                .default_value(".ember")
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the ingest server")
                .after_help(
                    "This runs the ingest server in the foreground until it's shut down. It \
                     will bind to the port and network interface configured in the config file \
                     or passed on the command line.",
                )
                .arg(
                    Arg::new("host")
                        .value_name("HOST")
                        .long("host")
                        .short('H')
                        .help("The host dns name or ip address."),
                )
                .arg(
                    Arg::new("port")
                        .value_name("PORT")
                        .long("port")
                        .short('P')
                        .help("The server port."),
                )
                .arg(
                    Arg::new("upstream")
                        .value_name("URL")
                        .long("upstream")
                        .short('u')
                        .help(
                            "The URL that record batches are forwarded to. Pass an empty value \
                             to log batches instead.",
                        ),
                )
                .arg(
                    Arg::new("shutdown_timeout")
                        .value_name("SECONDS")
                        .long("shutdown-timeout")
                        .help("Maximum number of seconds to wait for pending requests on shutdown."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the ember config")
                .after_help(
                    "This command provides basic config management. It can be used to create a \
                     default configuration file and to print the effective configuration.",
                )
                .subcommand_required(true)
                .subcommand(
                    Command::new("init").about("Write the default config into the config folder"),
                )
                .subcommand(
                    Command::new("show").about("Show the entire config out for debugging purposes"),
                ),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload a JFR recording to a running server")
                .after_help(
                    "This gzip-compresses the recording and sends it as the `jfr` part of a \
                     multipart request to the ingest endpoint of the given server.",
                )
                .arg(
                    Arg::new("url")
                        .value_name("URL")
                        .long("url")
                        .required(true)
                        .value_parser(ValueParser::new(url::Url::parse))
                        .help("The base URL of the server, e.g. http://127.0.0.1:8062/"),
                )
                .arg(
                    Arg::new("file")
                        .value_name("PATH")
                        .long("file")
                        .short('f')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("The JFR recording to upload."),
                )
                .arg(
                    Arg::new("name")
                        .value_name("NAME")
                        .long("name")
                        .short('n')
                        .required(true)
                        .help("The application name with labels, e.g. 'app{env=prod}'."),
                )
                .arg(
                    Arg::new("from")
                        .value_name("SECONDS")
                        .long("from")
                        .required(true)
                        .value_parser(value_parser!(u64))
                        .help("Start of the profiled window in seconds since the epoch."),
                )
                .arg(
                    Arg::new("until")
                        .value_name("SECONDS")
                        .long("until")
                        .required(true)
                        .value_parser(value_parser!(u64))
                        .help("End of the profiled window in seconds since the epoch."),
                )
                .arg(
                    Arg::new("sample_rate")
                        .value_name("HZ")
                        .long("sample-rate")
                        .value_parser(value_parser!(u32))
                        .help("The sampling frequency of the recording in Hertz."),
                )
                .arg(
                    Arg::new("verbose")
                        .long("verbose")
                        .short('v')
                        .action(ArgAction::SetTrue)
                        .help("Print the response body."),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_app() {
        make_app().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let matches = make_app()
            .try_get_matches_from([
                "ember",
                "upload",
                "--url",
                "http://127.0.0.1:8062/",
                "--file",
                "profile.jfr",
                "--name",
                "svc{env=prod}",
                "--from",
                "1000",
                "--until",
                "2000",
            ])
            .unwrap();

        let (name, matches) = matches.subcommand().unwrap();
        assert_eq!(name, "upload");
        assert_eq!(matches.get_one::<u64>("from"), Some(&1000));
        assert_eq!(matches.get_one::<u32>("sample_rate"), None);
        assert!(!matches.get_flag("verbose"));
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(make_app().try_get_matches_from(["ember"]).is_err());
    }
}
