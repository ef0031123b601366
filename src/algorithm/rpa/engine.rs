//! Batch driver for the `predict` subcommand.
//!
//! Loads the taxonomy, the two sequence stores and the alignment table,
//! then runs one placement per query on the rayon pool. Each placement
//! is independent and writes into its own log sink; predictions and log
//! blocks are emitted in input order afterwards.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::common::{parse_alignments, PredictionRecord};
use crate::report::gff3;
use crate::sequence::SequenceStore;
use crate::taxonomy::reader::{read_seqid_map, read_taxonomy};

use super::args::PredictArgs;
use super::predictor::{RpaConfig, RpaPredictor};

pub fn run(args: PredictArgs) -> Result<()> {
    if !(0.0..=1.0).contains(&args.exclude_factor) {
        bail!("--exclude-factor must be within [0, 1]");
    }
    if !(0.0..=1.0).contains(&args.reeval_bandwidth) {
        bail!("--reeval-bandwidth must be within [0, 1]");
    }

    let num_threads = if args.num_threads == 0 {
        num_cpus::get()
    } else {
        args.num_threads
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .context("failed to build thread pool")?;

    let taxonomy = read_taxonomy(&args.taxonomy)?;
    let seqid_map = read_seqid_map(&args.seqid_map)?;
    let queries = SequenceStore::from_fasta(&args.queries)?;
    let references = SequenceStore::from_fasta(&args.references)?;
    let mut record_sets = parse_alignments(&args.alignments, &taxonomy, &seqid_map)?;

    if args.verbose {
        eprintln!(
            "[INFO] {} taxa, {} queries, {} references, {} record sets",
            taxonomy.len(),
            queries.len(),
            references.len(),
            record_sets.len()
        );
    }

    let config = RpaConfig {
        exclude_factor: args.exclude_factor,
        reeval_bandwidth: args.reeval_bandwidth,
    };
    let predictor = RpaPredictor::new(&taxonomy, &queries, &references, &config);

    let bar = ProgressBar::new(record_sets.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap(),
    );

    let results: Vec<(PredictionRecord, String)> = record_sets
        .par_iter_mut()
        .map(|set| {
            let mut log = String::new();
            let prediction = predictor.predict(set, &mut log);
            bar.inc(1);
            (prediction, log)
        })
        .collect();
    bar.finish_and_clear();

    let predictions: Vec<PredictionRecord> = results.iter().map(|(p, _)| p.clone()).collect();
    match &args.out {
        Some(path) => {
            let mut writer = BufWriter::new(
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
            );
            gff3::write_predictions(&mut writer, &predictions, &taxonomy)?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            gff3::write_predictions(&mut writer, &predictions, &taxonomy)?;
        }
    }

    if let Some(path) = &args.log {
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        );
        for (_, log) in &results {
            writer.write_all(log.as_bytes())?;
        }
    } else if args.verbose {
        for (_, log) in &results {
            eprint!("{}", log);
        }
    }

    Ok(())
}
