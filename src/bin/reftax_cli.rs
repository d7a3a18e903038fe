use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use reftax_rs::dialect::detect_dialect;
use reftax_rs::lineage::BATCH_SIZE;
use reftax_rs::query::{format_query_inputs, split_inputs, DEFAULT_CHUNK_SIZE};
use reftax_rs::{format_reference_db, FormatOptions};

#[derive(Parser)]
#[command(
    name = "reftax-rs",
    version,
    about = "Format UNITE/SILVA reference databases for SINTAX, RDP and BLAST training"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the header format of a reference database
    Detect {
        /// Reference FASTA (plain or .gz)
        db: PathBuf,
    },
    /// Normalize a reference database and build its trained taxonomy
    Format {
        /// Reference FASTA (plain or .gz)
        #[arg(short, long, env = "REFTAX_DB")]
        db: PathBuf,

        /// Directory receiving the training files
        #[arg(short = 't', long, env = "REFTAX_TRAINING_DIR", default_value = "training_files")]
        training_dir: PathBuf,

        /// Suffix every taxon name with a running number
        #[arg(long, env = "REFTAX_DUP")]
        dup: bool,

        /// Rank table rows between output flushes
        #[arg(long, env = "REFTAX_BATCH_SIZE", default_value_t = BATCH_SIZE)]
        batch_size: usize,

        /// Maximum SILVA ranks in the SINTAX export
        #[arg(long, env = "REFTAX_UTAX_RANKS", default_value_t = 8)]
        utax_ranks: usize,
    },
    /// Clean a query FASTA before classification
    CheckInputs {
        input: PathBuf,
        output: PathBuf,

        /// Drop records whose header contains k__unidentified
        #[arg(long)]
        filter: bool,
    },
    /// Split a query FASTA into numbered chunk files
    Split {
        input: PathBuf,

        #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg.to_string());
    spinner
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Detect { db } => {
            println!("{}", detect_dialect(&db)?);
        }
        Commands::Format {
            db,
            training_dir,
            dup,
            batch_size,
            utax_ranks,
        } => {
            let options = FormatOptions {
                batch_size,
                dup,
                utax_rank_limit: utax_ranks,
            };
            let s = spinner("green", "Reformatting database...");
            let artifacts = format_reference_db(&db, &training_dir, &options)?;
            s.finish_with_message(format!(
                "{} format: {} sequences, {} taxa written to {}",
                artifacts.dialect,
                artifacts.sequences,
                artifacts.taxa,
                training_dir.display()
            ));
        }
        Commands::CheckInputs {
            input,
            output,
            filter,
        } => {
            let s = spinner("blue", "Checking query sequences...");
            let n = format_query_inputs(&input, &output, filter)?;
            s.finish_with_message(format!("{} sequences written to {}", n, output.display()));
        }
        Commands::Split { input, chunk_size } => {
            for path in split_inputs(&input, chunk_size)? {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
