use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tools;

const TEMPLATE: &'static str = "
{bin} {version}
{about}


USAGE:
    {usage}

SUBCOMMANDS:
{subcommands}

OPTIONS:
{unified}";

const ABOUT: &'static str = "
gffdbtools builds queryable feature databases from GFF3 and GTF annotation
files and inspects their contents. Submit bug reports, feature requests, or
view the source code at https://github.com/bow/gffdbtools.";

const TEMPLATE_SUBCMD: &'static str = "
USAGE:
    {usage}

ARGS:
{positionals}

OPTIONS:
{unified}";

/// Constructs a new `clap::App` for argument parsing.
pub fn build_cli() -> App<'static, 'static> {
    App::new("gffdbtools")
        .version(crate_version!())
        .about(ABOUT)
        .template(TEMPLATE)
        .max_term_width(80)
        .settings(&[AppSettings::GlobalVersion,
                    AppSettings::SubcommandRequiredElseHelp,
                    AppSettings::DisableHelpSubcommand,
                    AppSettings::VersionlessSubcommands])
        .arg(Arg::with_name("verbose")
                 .short("v")
                 .long("verbose")
                 .multiple(true)
                 .global(true)
                 .help("Increases logging verbosity"))
        .subcommand(SubCommand::with_name("create")
                        .about("Builds a feature database from a GFF3 or GTF file")
                        .template(TEMPLATE_SUBCMD)
                        .arg(Arg::with_name("input")
                                 .value_name("input")
                                 .help("Path or URL of the input annotation file")
                                 .takes_value(true)
                                 .required(true))
                        .arg(Arg::with_name("output")
                                 .value_name("output")
                                 .help("Path of the database to create")
                                 .takes_value(true)
                                 .required(true))
                        .arg(Arg::with_name("force")
                                 .long("force")
                                 .help("Overwrites the output database if it exists"))
                        .arg(Arg::with_name("merge-strategy")
                                 .long("merge-strategy")
                                 .value_name("strategy")
                                 .takes_value(true)
                                 .possible_values(
                                     &["error", "warning", "merge",
                                       "create_unique", "replace"])
                                 .help("Policy for rows that claim the same primary key"))
                        .arg(Arg::with_name("id-spec")
                                 .long("id-spec")
                                 .value_name("key")
                                 .takes_value(true)
                                 .multiple(true)
                                 .number_of_values(1)
                                 .help("Attribute key(s) primary keys are derived from, \
                                        tried in order"))
                        .arg(Arg::with_name("checklines")
                                 .long("checklines")
                                 .value_name("n")
                                 .takes_value(true)
                                 .help("Number of leading records sampled for dialect \
                                        inference; 0 samples the whole input"))
                        .arg(Arg::with_name("force-gff")
                                 .long("force-gff")
                                 .help("Treats the input as plain GFF, skipping \
                                        gene/transcript inference"))
                        .arg(Arg::with_name("disable-infer-genes")
                                 .long("disable-infer-genes")
                                 .help("Skips synthesis of gene rows during GTF ingest"))
                        .arg(Arg::with_name("disable-infer-transcripts")
                                 .long("disable-infer-transcripts")
                                 .help("Skips synthesis of transcript rows during GTF \
                                        ingest"))
                        .arg(Arg::with_name("ignore-malformed-lines")
                                 .long("ignore-malformed-lines")
                                 .help("Skips structurally malformed lines with a warning"))
                        .arg(Arg::with_name("keep-order")
                                 .long("keep-order")
                                 .help("Preserves each feature's own attribute-key order \
                                        when rendering"))
                        .arg(Arg::with_name("sort-attribute-values")
                                 .long("sort-attribute-values")
                                 .help("Sorts multi-values within each attribute key")))
        .subcommand(SubCommand::with_name("info")
                        .about("Summarizes the contents of a feature database")
                        .template(TEMPLATE_SUBCMD)
                        .arg(Arg::with_name("input")
                                 .value_name("input")
                                 .help("Path of the database to inspect")
                                 .takes_value(true)
                                 .required(true))
                        .arg(Arg::with_name("directives")
                                 .long("directives")
                                 .help("Also lists stored directive lines")))
}

/// Runs the appropriate tool given the subcommand argument matches.
pub fn run(matches: ArgMatches) -> Result<(), String> {
    match matches.subcommand() {
        ("create", Some(m)) => tools::create::run(m),
        ("info", Some(m)) => tools::info::run(m),
        // We should not reach this point since we already require
        // that subcommands must be present in the app settings.
        _ => Err("Unexpected subcommand parsing error".to_owned()),
    }
}
