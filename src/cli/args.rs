use clap::Parser;
use crate::config::defs::{ToolVariant, ARRIBA_TAG, DISCARDED_FUSIONS_TSV, FUSIONS_TSV};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "seqtoid-fusion", version = "1.0")]
pub struct Arguments {

    #[arg(short, long, default_value = "arriba")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'o', long = "out", help = "Working directory for all generated files. If not specified, a directory named '<sample>_YYYYMMDD' will be created in the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(short = 'x', long, help = "Aligned reads (BAM) from the STAR aligner")]
    pub bam: Option<String>,

    #[arg(long, help = "Separate chimeric alignments (Chimeric.out.sam), used with --chim-out-type separate-legacy")]
    pub chimeric: Option<String>,

    #[arg(long, default_value = "within-container", help = "Chimeric output type: within-container (WithinBam) or separate-legacy (SAMSeparateOld)")]
    pub chim_out_type: String,

    #[arg(short = 'a', long, help = "Annotation file in GTF format, optionally gzipped")]
    pub gtf: Option<String>,

    #[arg(short = 'g', long)]
    pub genome: Option<String>,

    #[arg(short = 'b', long, help = "Blacklist file of fusion genes")]
    pub blacklist: Option<String>,

    #[arg(short = 'k', long, help = "Known fusions file")]
    pub known_fusions: Option<String>,

    #[arg(long, default_value = FUSIONS_TSV)]
    pub output_file: String,

    #[arg(long, default_value = DISCARDED_FUSIONS_TSV)]
    pub discarded_fusions_file: String,

    #[arg(long, help = "Name of the intergenic fusions output; required by the blacklist-as-genome variant")]
    pub intergenic_fusions_file: Option<String>,

    #[arg(short = 's', long, help = "Sample name, prefixed to every output file name")]
    pub sample: Option<String>,

    #[arg(long = "variant", default_value = "genome-aware", value_enum)]
    pub variant: ToolVariant,

    #[arg(long, default_value_t = false, help = "Do not pass the contig list (-i) derived from the annotation")]
    pub no_derive_contigs: bool,

    #[arg(long, default_value = ARRIBA_TAG)]
    pub arriba_bin: String,

    #[clap(long, help = "Kill the tool after this many seconds")]
    pub timeout: Option<u64>,

    #[arg(long, default_value_t = false)]
    pub check_version: bool,

    #[arg(long, help = "Write the declared outputs as JSON to this file (relative to the working directory)")]
    pub manifest: Option<String>,
}
