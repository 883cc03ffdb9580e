use clap::{App, Arg};

use crossbar::config::Config;
use crossbar::Registry;
use plinth::logging;

pub fn main() {
    let matches = App::new("Integration Bus Registry")
        .version("0.1.0")
        .about("Brokers participant membership for one simulation domain.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the configuration file (.json or .toml)")
                .index(1),
        )
        .arg(
            Arg::with_name("domain")
                .short("d")
                .long("domain")
                .takes_value(true)
                .default_value("0")
                .help("Domain id to provide"),
        )
        .arg(
            Arg::with_name("listen")
                .short("l")
                .long("listen")
                .takes_value(true)
                .help("Listen URI override, e.g. tcp://0.0.0.0:8500 or local:///tmp/registry.xbar"),
        )
        .get_matches();

    let config = match matches.value_of("CONFIG_FILE") {
        Some(path) => Config::load(path).expect("Error loading configuration file"),
        None => Config::default(),
    };

    let domain: u32 = matches
        .value_of("domain")
        .unwrap()
        .parse()
        .expect("Error parsing domain id");

    let logger = logging::init_with_level(&config.logging.level);

    let port = u32::from(config.middleware.registry.port) + domain;
    let mut registry = Registry::new(config, &logger).expect("Error creating the registry");

    match matches.value_of("listen") {
        Some(listen_uri) => {
            logging::info!(logger, "starting registry"; "listen" => listen_uri);
            registry
                .provide_domain_uri(listen_uri)
                .expect("Error providing the domain on the listen URI");
        }
        None => {
            logging::info!(logger, "starting registry"; "domain" => domain, "port" => port);
            registry.provide_domain(domain).expect("Error providing the domain");
        }
    }

    // All the work happens on the reactor thread; the main thread idles
    // until the process is terminated.
    loop {
        std::thread::park();
    }
}
