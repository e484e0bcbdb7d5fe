#[macro_use]
extern crate clap;
extern crate csv;
extern crate gffdb;
#[macro_use]
extern crate log;
extern crate simple_logger;

use std::process;

use log::LevelFilter;
use simple_logger::SimpleLogger;

mod cli;
mod tools;


fn main() {
    let matches = cli::build_cli().get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if let Err(err) = SimpleLogger::new().with_level(level).init() {
        eprintln!("could not initialize logging: {}", err);
    }

    if let Err(msg) = cli::run(matches) {
        error!("{}", msg);
        process::exit(1);
    }
}
