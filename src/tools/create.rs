use std::str::FromStr;

use clap::ArgMatches;

use gffdb::{DbBuilder, GffSource, IdSpec, MergeStrategy};


/// Runs the `create` subcommand.
pub fn run(matches: &ArgMatches) -> Result<(), String> {
    let input = matches.value_of("input")
        .ok_or_else(|| "missing input argument".to_owned())?;
    let output = matches.value_of("output")
        .ok_or_else(|| "missing output argument".to_owned())?;

    let source = if input.starts_with("http://") || input.starts_with("https://") {
        GffSource::from_url(input)
    } else {
        GffSource::from_path(input)
    };

    let mut builder = DbBuilder::new(source, output)
        .force(matches.is_present("force"))
        .verbose(matches.is_present("verbose"))
        .force_gff(matches.is_present("force-gff"))
        .disable_infer_genes(matches.is_present("disable-infer-genes"))
        .disable_infer_transcripts(matches.is_present("disable-infer-transcripts"))
        .ignore_malformed_lines(matches.is_present("ignore-malformed-lines"))
        .keep_order(matches.is_present("keep-order"))
        .sort_attribute_values(matches.is_present("sort-attribute-values"));

    if let Some(strategy) = matches.value_of("merge-strategy") {
        builder = builder.merge_strategy(MergeStrategy::from_str(strategy)?);
    }
    if let Some(keys) = matches.values_of("id-spec") {
        let mut keys = keys.map(|key| key.to_owned()).collect::<Vec<String>>();
        let spec = if keys.len() == 1 {
            IdSpec::Key(keys.remove(0))
        } else {
            IdSpec::Keys(keys)
        };
        builder = builder.id_spec(spec);
    }
    if let Some(checklines) = matches.value_of("checklines") {
        let n = checklines.parse::<usize>()
            .map_err(|err| format!("invalid checklines value: {}", err))?;
        builder = builder.checklines(if n == 0 { None } else { Some(n) });
    }

    let db = builder.run().map_err(|err| err.to_string())?;
    let n_features = db.n_features().map_err(|err| err.to_string())?;
    info!("created {} with {} features", output, n_features);
    Ok(())
}
