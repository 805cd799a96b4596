use clap::error::ErrorKind as UsageError;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process;

use t1dgrs::score::main::{list_variants, run_grs_with_args};

#[derive(Parser, Debug)]
#[command(
    name = "t1dgrs",
    version,
    about = "Type 1 diabetes genetic risk score with HLA-DQ interaction terms",
    long_about = "Scores every individual in a PLINK 1.9 fileset: DQ allele calls from tag \
                 variants, pairwise DQ interaction betas, linear weights over all variants and, \
                 when configured, reference centiles, PPV and case probability."
)]
struct Cli {
    /// PLINK fileset prefix (expects PREFIX.bed, PREFIX.bim, PREFIX.fam)
    #[arg(short = 'b', long, value_name = "PREFIX")]
    bfile: Option<PathBuf>,

    /// TOML configuration naming the reference tables
    #[arg(short = 'c', long, value_name = "FILE")]
    config: PathBuf,

    /// Output prefix; PREFIX_dosage.tsv, PREFIX_DQ_calls.tsv and PREFIX_RESULTS.tsv are written
    #[arg(short = 'o', long, value_name = "PREFIX", default_value = "./output")]
    output: PathBuf,

    /// Print every variant ID the configuration scores and exit
    #[arg(long)]
    list: bool,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = match (cli.list, &cli.bfile) {
        (true, _) => list_variants(&cli.config).map(|ids| {
            for id in ids {
                println!("{id}");
            }
        }),
        (false, Some(bfile)) => run_grs_with_args(bfile, &cli.config, &cli.output).map(|_| ()),
        (false, None) => Cli::command()
            .error(
                UsageError::MissingRequiredArgument,
                "--bfile <PREFIX> is required unless --list is given",
            )
            .exit(),
    };

    if let Err(e) = result {
        let kind = e.kind();
        eprintln!("Error ({kind}): {e}");
        process::exit(kind.exit_code());
    }
}
