use super::runner::stage;
use super::types::{JobContext, JobFailure};
use crate::analysis::sink::OutputStaging;

pub const JOB_TYPE: &str = "enriched_dump_v1";
pub const LOCATION: &str = "enriched_logs";

/// Full joined relation, in log order, for downstream consumers.
pub fn execute(ctx: &JobContext, sink: &OutputStaging) -> Result<u64, JobFailure> {
    stage(sink, JOB_TYPE, LOCATION, &ctx.enriched.rows)
}
