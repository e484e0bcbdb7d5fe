use std::io;

use clap::ArgMatches;
use csv;

use gffdb::open_db;


/// Runs the `info` subcommand.
pub fn run(matches: &ArgMatches) -> Result<(), String> {
    let input = matches.value_of("input")
        .ok_or_else(|| "missing input argument".to_owned())?;
    let db = open_db(input).map_err(|err| err.to_string())?;

    let n_features = db.n_features().map_err(|err| err.to_string())?;
    let featuretypes = db.featuretypes().map_err(|err| err.to_string())?;

    let mut writer = csv::Writer::from_writer(io::stdout())
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never);
    writer.encode(("dialect", db.dialect().fmt.to_string()))
        .map_err(|err| err.to_string())?;
    writer.encode(("version", db.version()))
        .map_err(|err| err.to_string())?;
    writer.encode(("features", n_features))
        .map_err(|err| err.to_string())?;
    for (featuretype, count) in featuretypes {
        writer.encode((featuretype, count))
            .map_err(|err| err.to_string())?;
    }
    writer.flush().map_err(|err| err.to_string())?;

    if matches.is_present("directives") {
        let directives = db.directives().map_err(|err| err.to_string())?;
        for directive in directives {
            println!("{}", directive);
        }
    }
    Ok(())
}
