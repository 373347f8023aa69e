//! Workflow coordinator
//!
//! The state machine that turns one `WorkflowRequest` into a
//! `CombinedResult`:
//!
//! `Validate -> SchemaRetrieval -> QueryGeneration -> QueryValidation ->
//! QueryExecution -> ResultValidation -> {Visualization ∥ Insight} ->
//! NarrationSynthesis -> Combine`
//!
//! With no data source the run short-circuits from Validate to a
//! narration-only terminal state. Caches are consulted before schema
//! retrieval and query execution. Every failure goes through the classifier;
//! retries, one-shot automatic fixes, and aborts follow the classification
//! alone. Run state is owned exclusively by this task; the caches and the
//! stage-statistics registry are the only state shared across runs.

use crate::capability::{DataAccess, LanguageModel, PromptContext};
use crate::classifier::{classify, user_message, ClassifyContext};
use crate::combiner::{self, ParallelOutcome, PrimaryOutcome};
use crate::error::{CapabilityError, RawFailure};
use crate::progress::{ProgressEmitter, ProgressEvent};
use crate::quality::{self, ScoredOutcome, StageStatsRegistry};
use crate::retry::{backoff_delay, policy_for, RetryConfig};
use crate::stages;
use insightflow_cache::{QueryKey, QueryResultCache, SchemaCache};
use insightflow_model::{
    CombinedResult, DataSourceId, ErrorClassification, ExecutionPath, QueryOutcome,
    ResultMetadata, RunId, SchemaInfo, Stage, StageTiming, WorkflowRequest, WorkflowState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Coordinator tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Retry policy parameters
    pub retry: RetryConfig,
    /// Deadline per stage attempt
    pub stage_deadline: Duration,
    /// Shared deadline for the visualization/insight fan-out
    pub fanout_deadline: Duration,
    /// Row limit injected by the automatic fix
    pub default_row_limit: u32,
    /// Rows of the outcome forwarded into artifact prompts
    pub result_sample_rows: usize,
}

impl CoordinatorConfig {
    /// With retry parameters
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// With per-stage deadline
    #[inline]
    #[must_use]
    pub fn with_stage_deadline(mut self, deadline: Duration) -> Self {
        self.stage_deadline = deadline;
        self
    }

    /// With fan-out deadline
    #[inline]
    #[must_use]
    pub fn with_fanout_deadline(mut self, deadline: Duration) -> Self {
        self.fanout_deadline = deadline;
        self
    }

    /// With default row limit
    #[inline]
    #[must_use]
    pub fn with_default_row_limit(mut self, limit: u32) -> Self {
        self.default_row_limit = limit;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            stage_deadline: Duration::from_secs(30),
            fanout_deadline: Duration::from_secs(45),
            default_row_limit: 1000,
            result_sample_rows: 20,
        }
    }
}

/// Outcome of driving one stage to success or a terminal classification
struct StageRun<T> {
    result: Result<T, ErrorClassification>,
    attempts: u32,
    duration_ms: u64,
    errors: Vec<ErrorClassification>,
}

/// The workflow coordinator
pub struct WorkflowCoordinator {
    config: CoordinatorConfig,
    data: Arc<dyn DataAccess>,
    model: Arc<dyn LanguageModel>,
    schema_cache: Arc<dyn SchemaCache>,
    result_cache: Arc<dyn QueryResultCache>,
    stats: Arc<StageStatsRegistry>,
    progress: ProgressEmitter,
}

impl WorkflowCoordinator {
    /// Create coordinator over the injected collaborators
    #[must_use]
    pub fn new(
        data: Arc<dyn DataAccess>,
        model: Arc<dyn LanguageModel>,
        schema_cache: Arc<dyn SchemaCache>,
        result_cache: Arc<dyn QueryResultCache>,
    ) -> Self {
        Self {
            config: CoordinatorConfig::default(),
            data,
            model,
            schema_cache,
            result_cache,
            stats: Arc::new(StageStatsRegistry::new()),
            progress: ProgressEmitter::disabled(),
        }
    }

    /// With config
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// With a shared statistics registry
    #[inline]
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<StageStatsRegistry>) -> Self {
        self.stats = stats;
        self
    }

    /// Attach a progress consumer
    #[inline]
    #[must_use]
    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = ProgressEmitter::new(sender);
        self
    }

    /// Stage statistics registry
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &StageStatsRegistry {
        &self.stats
    }

    /// Run one request to a canonical result
    ///
    /// Never panics or returns an error: every outcome, including terminal
    /// failures, is a `CombinedResult`.
    pub async fn run(&self, request: WorkflowRequest) -> CombinedResult {
        let run_id = RunId::new();
        let path = match (&request.data_source_id, request.strategy.combined_generation) {
            (None, _) => ExecutionPath::Conversational,
            (Some(_), true) => ExecutionPath::CombinedGeneration,
            (Some(_), false) => ExecutionPath::SeparateStages,
        };
        let mut state = WorkflowState::new(run_id, path);
        tracing::info!(%run_id, ?path, query = %request.query, "workflow started");

        state.enter(Stage::Validate);
        self.progress.emit(run_id, Stage::Validate, "validating request");
        let validate_started = Instant::now();
        if request.query.trim().is_empty() {
            let classification = classify(
                &RawFailure::InvalidRequest("the question is empty".into()),
                &ClassifyContext::for_stage(Stage::Validate),
            );
            self.stats.record(Stage::Validate, false);
            state.record_error(classification.clone());
            return self.failure_result(state, classification);
        }
        self.stats.record(Stage::Validate, true);
        state.record_timing(StageTiming::executed(
            Stage::Validate,
            elapsed_ms(validate_started),
            1,
        ));

        match request.data_source_id.clone() {
            None => self.run_conversational(state, &request).await,
            Some(data_source) => self.run_staged(state, &request, data_source).await,
        }
    }

    /// Narration-only path: nothing to query, so nothing else is attempted
    async fn run_conversational(
        &self,
        mut state: WorkflowState,
        request: &WorkflowRequest,
    ) -> CombinedResult {
        state.enter(Stage::NarrationSynthesis);
        self.progress
            .emit(state.run_id, Stage::NarrationSynthesis, "composing answer");

        let mut prompt = PromptContext::for_question(&request.query)
            .with_hint("no data source is connected; answer conversationally");
        if let Some(conversation) = request.conversation_id {
            prompt = prompt.with_conversation(conversation);
        }
        let ctx = ClassifyContext::for_stage(Stage::NarrationSynthesis);
        let run = self
            .drive_stage(Stage::NarrationSynthesis, &ctx, || {
                stages::synthesize_narration(&self.model, &prompt, self.config.stage_deadline)
            })
            .await;
        self.absorb(&mut state, Stage::NarrationSynthesis, &run);

        match run.result {
            Ok(narration) => {
                state.narration = Some(narration);
                self.finalize_success(state, Vec::new(), None)
            }
            Err(classification) => self.failure_result(state, classification),
        }
    }

    /// Full pipeline against a data source
    async fn run_staged(
        &self,
        mut state: WorkflowState,
        request: &WorkflowRequest,
        data_source: DataSourceId,
    ) -> CombinedResult {
        // SchemaRetrieval, cache first
        state.enter(Stage::SchemaRetrieval);
        self.progress
            .emit(state.run_id, Stage::SchemaRetrieval, "loading schema");
        let schema = match self.schema_cache.get(&data_source).await {
            Some(schema) => {
                tracing::debug!(data_source = %data_source, "schema cache hit");
                state.record_timing(StageTiming::cache_hit(Stage::SchemaRetrieval));
                schema
            }
            None => {
                let ctx = ClassifyContext::for_stage(Stage::SchemaRetrieval)
                    .with_data_source(data_source.clone());
                let run = self
                    .drive_stage(Stage::SchemaRetrieval, &ctx, || {
                        stages::retrieve_schema(
                            &self.data,
                            &data_source,
                            self.config.stage_deadline,
                        )
                    })
                    .await;
                self.absorb(&mut state, Stage::SchemaRetrieval, &run);
                match run.result {
                    Ok(schema) => {
                        self.schema_cache.put(schema.clone()).await;
                        schema
                    }
                    Err(classification) => return self.failure_result(state, classification),
                }
            }
        };
        state.schema = Some(schema.clone());

        // QueryGeneration + QueryValidation (with the one-shot fix)
        let mut sql = match self
            .generate_valid_sql(&mut state, request, &data_source, &schema, None)
            .await
        {
            Ok(sql) => sql,
            Err(classification) => return self.failure_result(state, classification),
        };

        // QueryExecution, cache first
        let outcome = match self
            .execute_with_cache(&mut state, &data_source, &mut sql)
            .await
        {
            Ok(outcome) => outcome,
            Err(classification) => return self.failure_result(state, classification),
        };
        state.sql = Some(sql.clone());
        state.outcome = Some(outcome);

        // ResultValidation, with the empty-result regeneration loop
        let has_data = match self
            .validate_with_regeneration(&mut state, request, &data_source, &schema, &mut sql)
            .await
        {
            Ok(has_data) => has_data,
            Err(classification) => return self.failure_result(state, classification),
        };
        state.sql = Some(sql.clone());

        // Visualization ∥ Insight fan-out, skipped entirely without data
        let parallel = if has_data {
            self.generate_artifacts(&mut state, request, &sql).await
        } else {
            tracing::info!(run_id = %state.run_id, "no rows after retries; skipping artifact stages");
            Vec::new()
        };

        // NarrationSynthesis, unless a combined payload already carried one
        let payload_narration = parallel.iter().any(|p| match p {
            ParallelOutcome::Combined(v) => combiner::extract_narration(v).is_some(),
            _ => false,
        });
        if !payload_narration {
            state.enter(Stage::NarrationSynthesis);
            self.progress
                .emit(state.run_id, Stage::NarrationSynthesis, "composing narrative");
            let mut prompt = PromptContext::for_question(&request.query).with_sql(sql.clone());
            if let Some(outcome) = &state.outcome {
                prompt = prompt.with_outcome(self.sampled(outcome));
            }
            if !has_data {
                prompt = prompt.with_hint("the query returned no rows; explain that no data matched");
            }
            let ctx = ClassifyContext::for_stage(Stage::NarrationSynthesis)
                .with_data_source(data_source.clone());
            let run = self
                .drive_stage(Stage::NarrationSynthesis, &ctx, || {
                    stages::synthesize_narration(&self.model, &prompt, self.config.stage_deadline)
                })
                .await;
            self.absorb(&mut state, Stage::NarrationSynthesis, &run);
            match run.result {
                Ok(narration) => state.narration = Some(narration),
                Err(classification) => return self.failure_result(state, classification),
            }
        }

        let message = (!has_data).then(|| "No matching data was found".to_string());
        self.finalize_success(state, parallel, message)
    }

    /// Generate SQL and pass the local guardrails, regenerating on retryable
    /// validation failures and applying the deterministic fix at most once
    async fn generate_valid_sql(
        &self,
        state: &mut WorkflowState,
        request: &WorkflowRequest,
        data_source: &DataSourceId,
        schema: &SchemaInfo,
        hint: Option<&str>,
    ) -> Result<String, ErrorClassification> {
        let mut regen_hint = hint.map(str::to_string);

        loop {
            state.enter(Stage::QueryGeneration);
            self.progress
                .emit(state.run_id, Stage::QueryGeneration, "generating query");
            let mut prompt =
                PromptContext::for_question(&request.query).with_schema(schema.clone());
            if let Some(conversation) = request.conversation_id {
                prompt = prompt.with_conversation(conversation);
            }
            if let Some(hint) = &regen_hint {
                prompt = prompt.with_hint(hint.clone());
            }
            let gen_ctx = ClassifyContext::for_stage(Stage::QueryGeneration)
                .with_data_source(data_source.clone());
            let run = self
                .drive_stage(Stage::QueryGeneration, &gen_ctx, || {
                    stages::generate_query(&self.model, &prompt, self.config.stage_deadline)
                })
                .await;
            self.absorb(state, Stage::QueryGeneration, &run);
            let mut sql = run.result?;

            state.enter(Stage::QueryValidation);
            self.progress
                .emit(state.run_id, Stage::QueryValidation, "checking query");
            let val_ctx = ClassifyContext::for_stage(Stage::QueryValidation)
                .with_data_source(data_source.clone());
            let started = Instant::now();
            let mut attempts = 0u32;

            loop {
                attempts += 1;
                match stages::validate_query(&sql) {
                    Ok(()) => {
                        self.stats.record(Stage::QueryValidation, true);
                        state.record_timing(StageTiming::executed(
                            Stage::QueryValidation,
                            elapsed_ms(started),
                            attempts,
                        ));
                        return Ok(sql);
                    }
                    Err(raw) => {
                        let classification = classify(&raw, &val_ctx);
                        self.stats.record(Stage::QueryValidation, false);
                        state.record_error(classification.clone());

                        let policy = policy_for(classification.retry_strategy);
                        if policy.fix_first && !state.fix_applied(Stage::QueryValidation) {
                            if let Some(fixed) = stages::apply_automatic_fix(
                                &sql,
                                &classification.subtype,
                                self.config.default_row_limit,
                            ) {
                                tracing::debug!(
                                    subtype = %classification.subtype,
                                    "applied automatic query fix"
                                );
                                state.mark_fix_applied(Stage::QueryValidation);
                                sql = fixed;
                                // the free retry: not counted against the cap
                                continue;
                            }
                        }

                        state.record_timing(StageTiming::executed(
                            Stage::QueryValidation,
                            elapsed_ms(started),
                            attempts,
                        ));

                        if classification.is_terminal() {
                            return Err(classification);
                        }
                        let retries = state.count_retry(Stage::QueryValidation);
                        if retries > self.config.retry.max_stage_retries {
                            return Err(classification);
                        }
                        regen_hint = Some(format!(
                            "the previous query was rejected: {}",
                            classification.suggested_fix
                        ));
                        break; // regenerate
                    }
                }
            }
        }
    }

    /// Execute under the result cache, fixing execution-side syntax problems
    /// at most once
    async fn execute_with_cache(
        &self,
        state: &mut WorkflowState,
        data_source: &DataSourceId,
        sql: &mut String,
    ) -> Result<QueryOutcome, ErrorClassification> {
        state.enter(Stage::QueryExecution);
        self.progress
            .emit(state.run_id, Stage::QueryExecution, "running query");

        let key = QueryKey::new(data_source.clone(), sql);
        if let Some(outcome) = self.result_cache.get(&key).await {
            tracing::debug!(data_source = %data_source, "query result cache hit");
            state.record_timing(StageTiming::cache_hit(Stage::QueryExecution));
            return Ok(outcome);
        }

        let ctx = ClassifyContext::for_stage(Stage::QueryExecution)
            .with_data_source(data_source.clone());
        loop {
            let run = self
                .drive_stage(Stage::QueryExecution, &ctx, || {
                    stages::execute_query(
                        &self.data,
                        data_source,
                        sql.as_str(),
                        self.config.stage_deadline,
                    )
                })
                .await;
            self.absorb(state, Stage::QueryExecution, &run);
            match run.result {
                Ok(outcome) => {
                    // empty outcomes are never cached: a broadened retry must
                    // reach the source again
                    if outcome.row_count > 0 {
                        self.result_cache
                            .put(QueryKey::new(data_source.clone(), sql), outcome.clone())
                            .await;
                    }
                    return Ok(outcome);
                }
                Err(classification) => {
                    let policy = policy_for(classification.retry_strategy);
                    if policy.fix_first && !state.fix_applied(Stage::QueryExecution) {
                        if let Some(fixed) = stages::apply_automatic_fix(
                            sql,
                            &classification.subtype,
                            self.config.default_row_limit,
                        ) {
                            tracing::debug!(
                                subtype = %classification.subtype,
                                "applied automatic fix after execution failure"
                            );
                            state.mark_fix_applied(Stage::QueryExecution);
                            *sql = fixed;
                            continue;
                        }
                    }
                    return Err(classification);
                }
            }
        }
    }

    /// Check the outcome shape; on empty results regenerate and re-execute up
    /// to the cap. Returns whether the terminal outcome has rows ("no data"
    /// is a success, not an error).
    async fn validate_with_regeneration(
        &self,
        state: &mut WorkflowState,
        request: &WorkflowRequest,
        data_source: &DataSourceId,
        schema: &SchemaInfo,
        sql: &mut String,
    ) -> Result<bool, ErrorClassification> {
        state.enter(Stage::ResultValidation);
        self.progress
            .emit(state.run_id, Stage::ResultValidation, "checking results");
        let ctx = ClassifyContext::for_stage(Stage::ResultValidation)
            .with_data_source(data_source.clone());

        loop {
            let Some(outcome) = state.outcome.clone() else {
                let classification = classify(
                    &RawFailure::MalformedResult("no outcome recorded".into()),
                    &ctx,
                );
                state.record_error(classification.clone());
                return Err(classification);
            };

            match stages::validate_result(&outcome) {
                Ok(()) => {
                    self.stats.record(Stage::ResultValidation, true);
                    state.record_timing(StageTiming::executed(Stage::ResultValidation, 0, 1));
                    return Ok(true);
                }
                Err(raw) => {
                    let empty = matches!(raw, RawFailure::EmptyResult);
                    let classification = classify(&raw, &ctx);
                    self.stats.record(Stage::ResultValidation, false);
                    state.record_error(classification.clone());

                    let retries = state.count_retry(Stage::ResultValidation);
                    if retries > self.config.retry.max_stage_retries {
                        state.record_timing(StageTiming::executed(
                            Stage::ResultValidation,
                            0,
                            retries,
                        ));
                        return if empty {
                            Ok(false)
                        } else {
                            Err(classification)
                        };
                    }

                    if empty {
                        tracing::debug!(retry = retries, "empty result; regenerating query");
                        let new_sql = self
                            .generate_valid_sql(
                                state,
                                request,
                                data_source,
                                schema,
                                Some(
                                    "the previous query returned no rows; broaden the filters or aggregation",
                                ),
                            )
                            .await?;
                        *sql = new_sql;
                    }
                    let outcome = self.execute_with_cache(state, data_source, sql).await?;
                    state.outcome = Some(outcome);
                    state.enter(Stage::ResultValidation);
                }
            }
        }
    }

    /// The one structured concurrency point: both artifact stages run against
    /// the same immutable outcome snapshot and join under a shared deadline.
    /// A failed side leaves its field absent; it never fails the run.
    async fn generate_artifacts(
        &self,
        state: &mut WorkflowState,
        request: &WorkflowRequest,
        sql: &str,
    ) -> Vec<ParallelOutcome> {
        let Some(outcome) = state.outcome.as_ref() else {
            return Vec::new();
        };
        let prompt = PromptContext::for_question(&request.query)
            .with_sql(sql.to_string())
            .with_outcome(self.sampled(outcome));
        let data_source = request.data_source_id.clone();
        let mut parallel = Vec::new();

        if request.strategy.combined_generation {
            state.enter(Stage::VisualizationGeneration);
            self.progress.emit(
                state.run_id,
                Stage::VisualizationGeneration,
                "generating chart and insights",
            );
            let ctx = classify_ctx(Stage::VisualizationGeneration, data_source);
            let run = self
                .drive_stage(Stage::VisualizationGeneration, &ctx, || {
                    stages::generate_combined(&self.model, &prompt, self.config.stage_deadline)
                })
                .await;
            self.absorb(state, Stage::VisualizationGeneration, &run);
            match run.result {
                Ok(payload) => parallel.push(ParallelOutcome::Combined(payload)),
                Err(classification) => {
                    tracing::warn!(
                        subtype = %classification.subtype,
                        "combined artifact generation failed; continuing without artifacts"
                    );
                }
            }
            return parallel;
        }

        state.enter(Stage::VisualizationGeneration);
        self.progress.emit(
            state.run_id,
            Stage::VisualizationGeneration,
            "generating chart",
        );
        self.progress.emit(
            state.run_id,
            Stage::InsightGeneration,
            "extracting insights",
        );

        let vis_ctx = classify_ctx(Stage::VisualizationGeneration, data_source.clone());
        let ins_ctx = classify_ctx(Stage::InsightGeneration, data_source);
        let vis_fut = self.drive_stage(Stage::VisualizationGeneration, &vis_ctx, || {
            stages::generate_visualization(&self.model, &prompt, self.config.stage_deadline)
        });
        let ins_fut = self.drive_stage(Stage::InsightGeneration, &ins_ctx, || {
            stages::generate_insights(&self.model, &prompt, self.config.stage_deadline)
        });

        match tokio::time::timeout(
            self.config.fanout_deadline,
            futures::future::join(vis_fut, ins_fut),
        )
        .await
        {
            Ok((vis_run, ins_run)) => {
                self.absorb(state, Stage::VisualizationGeneration, &vis_run);
                self.absorb(state, Stage::InsightGeneration, &ins_run);
                match vis_run.result {
                    Ok(payload) => parallel.push(ParallelOutcome::Visualization(payload)),
                    Err(classification) => tracing::warn!(
                        subtype = %classification.subtype,
                        "visualization failed; continuing without a chart"
                    ),
                }
                match ins_run.result {
                    Ok(payload) => parallel.push(ParallelOutcome::Insights(payload)),
                    Err(classification) => tracing::warn!(
                        subtype = %classification.subtype,
                        "insight extraction failed; continuing without insights"
                    ),
                }
            }
            Err(_) => {
                let deadline_ms = self.config.fanout_deadline.as_millis() as u64;
                for stage in [Stage::VisualizationGeneration, Stage::InsightGeneration] {
                    let classification = classify(
                        &RawFailure::Capability(CapabilityError::Timeout(
                            self.config.fanout_deadline,
                        )),
                        &classify_ctx(stage, request.data_source_id.clone()),
                    );
                    self.stats.record(stage, false);
                    state.record_error(classification);
                    state.record_timing(StageTiming::executed(stage, deadline_ms, 1));
                }
                tracing::warn!("fan-out deadline expired; continuing without artifacts");
            }
        }

        parallel
    }

    /// Drive one stage through the classification-driven retry loop.
    ///
    /// Takes no run state so fan-out sides can run concurrently; the caller
    /// merges the returned bookkeeping at the stage boundary.
    async fn drive_stage<T, F, Fut>(
        &self,
        stage: Stage,
        ctx: &ClassifyContext,
        mut op: F,
    ) -> StageRun<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RawFailure>>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut errors = Vec::new();

        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    self.stats.record(stage, true);
                    return StageRun {
                        result: Ok(value),
                        attempts,
                        duration_ms: elapsed_ms(started),
                        errors,
                    };
                }
                Err(raw) => {
                    let classification = classify(&raw, ctx);
                    self.stats.record(stage, false);
                    tracing::warn!(
                        stage = %stage,
                        subtype = %classification.subtype,
                        attempt = attempts,
                        "stage attempt failed"
                    );
                    errors.push(classification.clone());

                    let policy = policy_for(classification.retry_strategy);
                    let retries_done = attempts - 1;
                    if !policy.retry_allowed
                        || policy.fix_first
                        || retries_done >= self.config.retry.max_stage_retries
                    {
                        return StageRun {
                            result: Err(classification),
                            attempts,
                            duration_ms: elapsed_ms(started),
                            errors,
                        };
                    }
                    if policy.backoff {
                        tokio::time::sleep(backoff_delay(&self.config.retry, attempts)).await;
                    }
                }
            }
        }
    }

    /// Merge a detached stage run into the run state
    fn absorb<T>(&self, state: &mut WorkflowState, stage: Stage, run: &StageRun<T>) {
        for classification in &run.errors {
            state.record_error(classification.clone());
        }
        for _ in 1..run.attempts {
            state.count_retry(stage);
        }
        state.record_timing(StageTiming::executed(stage, run.duration_ms, run.attempts));
    }

    /// Converge a successful terminal state through the combiner
    fn finalize_success(
        &self,
        mut state: WorkflowState,
        parallel: Vec<ParallelOutcome>,
        message: Option<String>,
    ) -> CombinedResult {
        state.enter(Stage::Combine);
        self.progress
            .emit(state.run_id, Stage::Combine, "assembling result");

        let mut metadata = ResultMetadata::new(state.run_id, state.path);
        metadata.stage_timings = state.timings.clone();
        metadata.message = message;

        let primary = PrimaryOutcome {
            success: true,
            sql: state.sql.clone(),
            outcome: state.outcome.clone(),
            narration: state.narration.clone(),
        };
        let mut result = combiner::combine(primary, &parallel, metadata);
        let confidence = self.confidence(&state, &result);
        result.metadata.confidence = confidence;
        tracing::info!(
            run_id = %state.run_id,
            confidence = result.metadata.confidence,
            duration_ms = result.metadata.total_duration_ms(),
            "workflow finished"
        );
        result
    }

    /// Converge a failed run through the same combiner
    fn failure_result(
        &self,
        mut state: WorkflowState,
        classification: ErrorClassification,
    ) -> CombinedResult {
        state.enter(Stage::Combine);
        self.progress
            .emit(state.run_id, Stage::Combine, "assembling failure result");

        let mut metadata = ResultMetadata::new(state.run_id, state.path);
        metadata.stage_timings = state.timings.clone();
        metadata.message = Some(user_message(&classification));
        metadata.classification = Some(classification.clone());

        let primary = PrimaryOutcome {
            success: false,
            sql: state.sql.clone(),
            outcome: state.outcome.clone(),
            narration: state.narration.clone(),
        };
        let mut result = combiner::combine(primary, &[], metadata);
        let confidence = self.confidence(&state, &result);
        result.metadata.confidence = confidence;
        tracing::warn!(
            run_id = %state.run_id,
            subtype = %classification.subtype,
            "workflow failed"
        );
        result
    }

    /// Confidence for the assembled result
    fn confidence(&self, state: &WorkflowState, result: &CombinedResult) -> f32 {
        let scored = ScoredOutcome {
            path: Some(state.path),
            sql: result.sql.as_deref(),
            outcome: result.outcome.as_ref(),
            chart: result.chart_spec.as_ref(),
            insights: result.insights.as_deref(),
            narration: result.narration.as_deref(),
        };
        let historical = self.mean_success_rate(state);
        quality::score(&scored, result.metadata.total_duration_ms(), historical)
    }

    /// Mean historical success rate over the stages this run touched
    fn mean_success_rate(&self, state: &WorkflowState) -> f64 {
        let stages: BTreeSet<_> = state.timings.iter().map(|t| t.stage).collect();
        if stages.is_empty() {
            return 0.5;
        }
        let sum: f64 = stages
            .iter()
            .map(|stage| self.stats.success_rate(*stage))
            .sum();
        sum / stages.len() as f64
    }

    /// Outcome truncated to the configured prompt sample
    fn sampled(&self, outcome: &QueryOutcome) -> QueryOutcome {
        QueryOutcome::new(
            outcome.columns.clone(),
            outcome.sample(self.config.result_sample_rows).to_vec(),
        )
    }
}

fn classify_ctx(stage: Stage, data_source: Option<DataSourceId>) -> ClassifyContext {
    let ctx = ClassifyContext::for_stage(stage);
    match data_source {
        Some(id) => ctx.with_data_source(id),
        None => ctx,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{MockDataAccess, MockLanguageModel};
    use insightflow_cache::{MokaQueryResultCache, MokaSchemaCache};

    fn coordinator(
        data: MockDataAccess,
        model: MockLanguageModel,
    ) -> WorkflowCoordinator {
        WorkflowCoordinator::new(
            Arc::new(data),
            Arc::new(model),
            Arc::new(MokaSchemaCache::default()),
            Arc::new(MokaQueryResultCache::default()),
        )
        .with_config(CoordinatorConfig::default().with_retry(
            RetryConfig::default().with_base_delay(Duration::from_millis(1)),
        ))
    }

    #[tokio::test]
    async fn conversational_path_produces_only_narration() {
        let data = MockDataAccess::new();
        let mut model = MockLanguageModel::new();
        model
            .expect_generate()
            .returning(|_, _| Ok("Connect a data source to run queries.".to_string()));

        let result = coordinator(data, model)
            .run(WorkflowRequest::new("what can you do?"))
            .await;

        assert!(result.success);
        assert!(result.has_field("narration"));
        assert!(!result.has_field("sql"));
        assert!(!result.has_field("chart_spec"));
        assert!(!result.has_field("insights"));
        assert_eq!(
            result.metadata.execution_path,
            ExecutionPath::Conversational
        );
        assert!(result.presence_is_accurate());
    }

    #[tokio::test]
    async fn empty_question_fails_validation() {
        let data = MockDataAccess::new();
        let model = MockLanguageModel::new();

        let result = coordinator(data, model)
            .run(WorkflowRequest::new("   "))
            .await;

        assert!(!result.success);
        let classification = result.metadata.classification.unwrap();
        assert_eq!(classification.subtype, "invalid-request");
        assert!(result.metadata.message.is_some());
    }

    #[tokio::test]
    async fn retryable_stage_is_attempted_cap_plus_one_times() {
        let mut data = MockDataAccess::new();
        data.expect_fetch_schema().times(4).returning(|_| {
            Err(CapabilityError::Connection("connection refused".into()))
        });
        let model = MockLanguageModel::new();

        let result = coordinator(data, model)
            .run(
                WorkflowRequest::new("total sales by month")
                    .with_data_source(DataSourceId::new("warehouse-1")),
            )
            .await;

        assert!(!result.success);
        let classification = result.metadata.classification.unwrap();
        assert_eq!(classification.subtype, "connection-failed");
        // mockall verifies the exact call count on drop
    }

    #[tokio::test]
    async fn requires_input_aborts_without_retrying() {
        let mut data = MockDataAccess::new();
        data.expect_fetch_schema().times(1).returning(|_| {
            Err(CapabilityError::PermissionDenied("fetch schema".into()))
        });
        let model = MockLanguageModel::new();

        let result = coordinator(data, model)
            .run(
                WorkflowRequest::new("total sales by month")
                    .with_data_source(DataSourceId::new("warehouse-1")),
            )
            .await;

        assert!(!result.success);
        let classification = result.metadata.classification.unwrap();
        assert!(classification.requires_input());
        assert!(classification.suggested_fix.contains("read access"));
    }
}
