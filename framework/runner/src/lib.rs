mod cli;
mod init;
mod pipeline;
mod resolver;
mod run;
mod shutdown;
mod tailer;

pub mod prelude {
    pub use crate::cli::{RelayCli, ReporterOpt};
    pub use crate::init::init;
    pub use crate::pipeline::{run_pipeline, Pipeline, PipelineState};
    pub use crate::resolver::{
        find_results_directory, DirectoryResolver, Lookup, ResolveError, ResultsLocation,
    };
    pub use crate::run::{relay, run, RelayDefinition, RelayOutcome};
    pub use crate::tailer::{TailConfig, TailOutcome, Tailer};
}
