use super::types::{JobContext, JobFailure, JobOutcome, RunManifest, RunSummary};
use super::{
    avg_listen_time_v1, enriched_dump_v1, favorite_genres_v1, genre_loyalty_v1,
    mood_recommendations_v1, night_owls_v1, top_songs_week_v1,
};
use crate::analysis::join::enrich;
use crate::analysis::loader::{load_events, load_items};
use crate::analysis::partition::ShardPlan;
use crate::analysis::sink::OutputStaging;
use crate::config::AnalyticsConfig;
use crate::error::AnalyticsResult;
use crate::model::format_timestamp;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

/// Every job of a run as `(job_type, location)`.
pub const JOBS: [(&str, &str); 7] = [
    (favorite_genres_v1::JOB_TYPE, favorite_genres_v1::LOCATION),
    (avg_listen_time_v1::JOB_TYPE, avg_listen_time_v1::LOCATION),
    (top_songs_week_v1::JOB_TYPE, top_songs_week_v1::LOCATION),
    (mood_recommendations_v1::JOB_TYPE, mood_recommendations_v1::LOCATION),
    (genre_loyalty_v1::JOB_TYPE, genre_loyalty_v1::LOCATION),
    (night_owls_v1::JOB_TYPE, night_owls_v1::LOCATION),
    (enriched_dump_v1::JOB_TYPE, enriched_dump_v1::LOCATION),
];

pub struct AnalysisRunner {
    config: AnalyticsConfig,
    semaphore: Arc<Semaphore>,
}

impl AnalysisRunner {
    pub fn new(config: AnalyticsConfig) -> Self {
        let max_concurrency = config.max_concurrent_jobs.max(1);
        Self {
            config,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    pub async fn run(self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("analytics_run", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(self, run_id: Uuid) -> Result<RunSummary> {
        let started = Instant::now();
        let started_at = Utc::now();
        let now = self.config.reference_now();
        let mut timings_ms: BTreeMap<String, u64> = BTreeMap::new();
        tracing::info!(
            phase = "runner_start",
            reference_now = %format_timestamp(&now),
            events_path = %self.config.events_path.display(),
            items_path = %self.config.items_path.display(),
            output_root = %self.config.output_root.display(),
            "analytics run started"
        );

        let load_started = Instant::now();
        let events_path = self.config.events_path.clone();
        let items_path = self.config.items_path.clone();
        let (events, items) = tokio::try_join!(
            run_blocking("listening log loader", move || load_events(&events_path)),
            run_blocking("song metadata loader", move || load_items(&items_path)),
        )?;
        timings_ms.insert("load".to_string(), elapsed_ms(load_started));

        let join_started = Instant::now();
        let items: Vec<Arc<_>> = items.into_iter().map(Arc::new).collect();
        let (events, items, enriched) = tokio::task::spawn_blocking(move || {
            let enriched = enrich(&events, &items);
            (events, items, enriched)
        })
        .await
        .context("join task failed")?;
        timings_ms.insert("join".to_string(), elapsed_ms(join_started));

        let input_events = events.len() as u64;
        let input_items = items.len() as u64;
        let enriched_rows = enriched.rows.len() as u64;
        let orphan_events = enriched.orphan_events;

        let ctx = Arc::new(JobContext {
            events,
            items,
            enriched,
            plan: ShardPlan::new(self.config.shards),
            now,
            config: self.config.clone(),
        });
        let staging = Arc::new(OutputStaging::prepare(&self.config.output_root)?);

        let mut set: JoinSet<Result<JobOutcome, JobFailure>> = JoinSet::new();
        for (job_type, location) in JOBS {
            let semaphore = self.semaphore.clone();
            let ctx = ctx.clone();
            let staging = staging.clone();
            let span = tracing::info_span!("analysis_job", job_type = %job_type, location = %location);
            set.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|err| JobFailure {
                        job_type: job_type.to_string(),
                        code: "runner_closed".to_string(),
                        message: err.to_string(),
                    })?;
                    let job_started = Instant::now();
                    let job_span = tracing::Span::current();
                    let rows = tokio::task::spawn_blocking(move || {
                        let _guard = job_span.enter();
                        execute_job(job_type, &ctx, &staging)
                    })
                    .await
                    .map_err(|err| JobFailure {
                        job_type: job_type.to_string(),
                        code: "job_panicked".to_string(),
                        message: err.to_string(),
                    })??;

                    let duration_ms = elapsed_ms(job_started);
                    tracing::info!(phase = "job_complete", rows, duration_ms, "analysis job finished");
                    Ok::<_, JobFailure>(JobOutcome {
                        job_type: job_type.to_string(),
                        location: location.to_string(),
                        rows,
                        duration_ms,
                    })
                }
                .instrument(span),
            );
        }

        let mut outcomes: Vec<JobOutcome> = Vec::with_capacity(JOBS.len());
        while let Some(joined) = set.join_next().await {
            let outcome = joined.map_err(|err| anyhow!("analysis job task failed: {err}"));
            match outcome {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(failure)) => {
                    tracing::warn!(
                        phase = "runner_complete",
                        status = "failed",
                        duration_ms = elapsed_ms(started),
                        error_code = %failure.code,
                        error_message = %failure.message,
                        "analytics run failed; previous output left untouched"
                    );
                    set.abort_all();
                    return Err(failure.into());
                }
                Err(err) => {
                    set.abort_all();
                    return Err(err);
                }
            }
        }

        let mut rows = BTreeMap::new();
        let mut job_versions = BTreeMap::new();
        for outcome in outcomes {
            rows.insert(outcome.location.clone(), outcome.rows);
            timings_ms.insert(outcome.job_type.clone(), outcome.duration_ms);
            job_versions.insert(outcome.location, outcome.job_type);
        }
        timings_ms.insert("total".to_string(), elapsed_ms(started));

        let manifest = RunManifest {
            run_id,
            started_at: started_at.to_rfc3339(),
            completed_at: Utc::now().to_rfc3339(),
            reference_now: format_timestamp(&now),
            seed: self.config.seed,
            input_events,
            input_items,
            enriched_rows,
            orphan_events,
            rows,
            timings_ms,
            job_versions,
        };

        let staging = Arc::try_unwrap(staging)
            .map_err(|_| anyhow!("output staging still shared after all jobs finished"))?;
        let committed = manifest.clone();
        let output_root = tokio::task::spawn_blocking(move || staging.commit(&committed))
            .await
            .context("commit task failed")??;

        tracing::info!(
            phase = "runner_complete",
            status = "completed",
            duration_ms = elapsed_ms(started),
            orphan_events,
            "analytics run finished"
        );
        Ok(RunSummary {
            output_root,
            manifest,
        })
    }
}

pub(super) fn execute_job(
    job_type: &str,
    ctx: &JobContext,
    sink: &OutputStaging,
) -> Result<u64, JobFailure> {
    match job_type {
        favorite_genres_v1::JOB_TYPE => favorite_genres_v1::execute(ctx, sink),
        avg_listen_time_v1::JOB_TYPE => avg_listen_time_v1::execute(ctx, sink),
        top_songs_week_v1::JOB_TYPE => top_songs_week_v1::execute(ctx, sink),
        mood_recommendations_v1::JOB_TYPE => mood_recommendations_v1::execute(ctx, sink),
        genre_loyalty_v1::JOB_TYPE => genre_loyalty_v1::execute(ctx, sink),
        night_owls_v1::JOB_TYPE => night_owls_v1::execute(ctx, sink),
        enriched_dump_v1::JOB_TYPE => enriched_dump_v1::execute(ctx, sink),
        other => Err(JobFailure::unsupported(other)),
    }
}

pub(super) fn stage<T: Serialize>(
    sink: &OutputStaging,
    job_type: &str,
    location: &str,
    rows: &[T],
) -> Result<u64, JobFailure> {
    sink.write_location(location, rows)
        .map_err(|err| JobFailure::from_error(job_type, &err))
}

async fn run_blocking<T, F>(label: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> AnalyticsResult<T> + Send + 'static,
{
    let value = tokio::task::spawn_blocking(work)
        .await
        .with_context(|| format!("{label} task failed"))??;
    Ok(value)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
