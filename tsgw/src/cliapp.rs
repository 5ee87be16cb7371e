// This module implements the definition of the command line app.
//
// It must not have any other imports than clap so the app definition stays self-contained.
use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "tsgw is a multi-tenant metrics gateway that publishes to Kafka.";

pub fn make_app() -> Command {
    Command::new("tsgw")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("TSGW_CONFIG")
                .value_parser(ValueParser::path_buf())
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the gateway")
                .after_help(
                    "This reads plaintext metrics of the form 'name[;tag=value]* value \
                     timestamp' from stdin, one per line, and publishes them for a single \
                     organization until stdin is closed.",
                )
                .arg(
                    Arg::new("org")
                        .long("org")
                        .value_name("ORG_ID")
                        .env("TSGW_ORG")
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("The organization that owns the metrics."),
                )
                .arg(
                    Arg::new("batch_size")
                        .long("batch-size")
                        .value_name("COUNT")
                        .env("TSGW_BATCH_SIZE")
                        .default_value("1000")
                        .value_parser(value_parser!(u64).range(1..))
                        .help("The maximum number of metrics per published batch."),
                )
                .arg(
                    Arg::new("kafka_broker_url")
                        .long("kafka-broker-url")
                        .value_name("BROKERS")
                        .env("TSGW_KAFKA_BROKER_URL")
                        .help("Comma separated kafka brokers, overrides the config."),
                )
                .arg(
                    Arg::new("metrics_topic")
                        .long("metrics-topic")
                        .value_name("TOPIC")
                        .env("TSGW_METRICS_TOPIC")
                        .help("The kafka topic for metrics, overrides the config."),
                )
                .arg(
                    Arg::new("publish")
                        .long("publish")
                        .value_name("BOOL")
                        .env("TSGW_PUBLISH")
                        .help("Enable or disable publishing to kafka, overrides the config."),
                )
                .arg(
                    Arg::new("statsd")
                        .long("statsd")
                        .value_name("HOST_PORT")
                        .env("TSGW_STATSD")
                        .help("The statsd server for internal metrics, overrides the config."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the gateway config")
                .after_help(
                    "This command provides basic config management. It prints the \
                     effective config and validates it without starting the gateway.",
                )
                .subcommand_required(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values \
                             which are not in the config file but filled in from \
                             defaults. The default output format is YAML but a debug \
                             format can also be specified.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .default_value("yaml")
                                .value_parser(["debug", "yaml"])
                                .help("The output format"),
                        ),
                )
                .subcommand(
                    Command::new("check")
                        .about("Validate the config")
                        .after_help(
                            "This loads the config, applies all checks done at startup \
                             and exits with a non-zero status if any of them fails.",
                        )
                        .arg(
                            Arg::new("quiet")
                                .short('q')
                                .long("quiet")
                                .action(ArgAction::SetTrue)
                                .help("Do not print anything on success"),
                        ),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_definition() {
        make_app().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let matches = make_app()
            .try_get_matches_from([
                "tsgw",
                "-c",
                "/etc/tsgw",
                "run",
                "--org",
                "7",
                "--kafka-broker-url",
                "a:9092,b:9092",
            ])
            .unwrap();

        let (name, run) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(run.get_one::<u32>("org"), Some(&7));
        assert_eq!(run.get_one::<u64>("batch_size"), Some(&1000));
        assert_eq!(
            run.get_one::<String>("kafka_broker_url").map(String::as_str),
            Some("a:9092,b:9092")
        );
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let result =
            make_app().try_get_matches_from(["tsgw", "run", "--org", "1", "--batch-size", "0"]);
        assert!(result.is_err());
    }
}
