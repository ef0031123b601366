use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Tab-separated candidate alignment records
    #[arg(short, long)]
    pub alignments: PathBuf,
    /// Query sequences (FASTA)
    #[arg(short, long)]
    pub queries: PathBuf,
    /// Reference sequences (FASTA)
    #[arg(short, long)]
    pub references: PathBuf,
    /// Taxonomy table: taxid, parent taxid, name, rank
    #[arg(short, long)]
    pub taxonomy: PathBuf,
    /// Mapping from reference sequence id to taxid
    #[arg(short = 'm', long)]
    pub seqid_map: PathBuf,
    /// Mask records scoring below this fraction of the best seed score
    #[arg(long, default_value_t = 0.5)]
    pub exclude_factor: f64,
    /// Re-align seeds within this fraction of the best seed score
    #[arg(long, default_value_t = 0.1)]
    pub reeval_bandwidth: f64,
    /// Worker threads (0 = all cores)
    #[arg(short = 'n', long, default_value_t = 0)]
    pub num_threads: usize,
    /// Output file (GFF3); stdout when omitted
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    /// Write the per-query placement log to this file
    #[arg(long)]
    pub log: Option<PathBuf>,
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,
}
