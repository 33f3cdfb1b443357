use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Show the persisted progress of a job item
    Progress {
        #[arg(long, help = "Job ID to inspect")]
        job: String,

        #[arg(
            long,
            help = "Sharding item within the job; every recorded item when omitted"
        )]
        item: Option<u32>,

        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,

        #[arg(long, help = "Progress store directory, defaults to ~/.pipeline/state")]
        state: Option<PathBuf>,
    },
    /// Decode the routing information carried by a job id
    InspectJob {
        #[arg(long, help = "Job ID to decode")]
        job: String,

        #[arg(long, help = "If set, prints the decoded fields as JSON")]
        json: bool,
    },
}
