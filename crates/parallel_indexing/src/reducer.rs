use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};

use anyhow::Context;
use errors::{
    ErrorMetadata,
    ErrorMetadataAnyhowExt,
};
use futures::future::try_join_all;
use index_storage::{
    IndexHandle,
    IndexName,
    IndexStorage,
};

use crate::{
    bounded_thread_pool::BoundedThreadPool,
    capabilities::{
        IndexerFactory,
        MergerFactory,
    },
    config::{
        ParallelBuildConfig,
        ReductionStrategy,
    },
    document::{
        BoxedDocumentSource,
        DocumentSource,
    },
    merge::{
        MergeOperator,
        MergeResult,
        PartialIndex,
    },
    metrics::{
        build_run_timer,
        log_documents_indexed,
        output_commit_timer,
        partition_build_timer,
    },
    name_allocator::NameAllocator,
    stats::{
        BuildStats,
        RunCounters,
    },
};

/// Result of a successful run. `output` is `None` when no partition
/// contributed any documents.
#[derive(Debug)]
pub struct BuildOutcome {
    pub output: Option<IndexHandle>,
    pub stats: BuildStats,
}

/// Builds one index from many document sources: every source is indexed into
/// its own fragment in parallel, the fragments are merged down to one, and
/// the survivor is renamed to the configured output name.
///
/// A failure anywhere fails the run. Fragments written before the failure
/// are left where they are.
pub struct ParallelBuildReducer {
    config: ParallelBuildConfig,
    storage: Arc<dyn IndexStorage>,
    indexer_factory: Arc<dyn IndexerFactory>,
    merger_factory: Arc<dyn MergerFactory>,
}

impl ParallelBuildReducer {
    pub fn new(
        config: ParallelBuildConfig,
        storage: Arc<dyn IndexStorage>,
        indexer_factory: Arc<dyn IndexerFactory>,
        merger_factory: Arc<dyn MergerFactory>,
    ) -> Self {
        Self {
            config,
            storage,
            indexer_factory,
            merger_factory,
        }
    }

    pub fn config(&self) -> &ParallelBuildConfig {
        &self.config
    }

    /// Index tokenised partitions. Partitions that turn out to be empty are
    /// skipped without constructing an indexer.
    pub async fn build<S>(&self, sources: Vec<S>) -> anyhow::Result<BuildOutcome>
    where
        S: DocumentSource + 'static,
    {
        let sources = sources
            .into_iter()
            .map(|s| Box::new(s) as BoxedDocumentSource)
            .collect();
        self.run(sources, true).await
    }

    /// Index pre-split collections. Every collection gets an indexer and a
    /// fragment, empty or not; empty fragments are dropped while merging.
    pub async fn build_collections<S>(&self, collections: Vec<S>) -> anyhow::Result<BuildOutcome>
    where
        S: DocumentSource + 'static,
    {
        let collections = collections
            .into_iter()
            .map(|s| Box::new(s) as BoxedDocumentSource)
            .collect();
        self.run(collections, false).await
    }

    async fn run(
        &self,
        sources: Vec<BoxedDocumentSource>,
        probe_empty: bool,
    ) -> anyhow::Result<BuildOutcome> {
        let timer = build_run_timer();
        match self.run_inner(sources, probe_empty).await {
            Ok(outcome) => {
                timer.finish();
                Ok(outcome)
            },
            Err(e) => {
                e.report_metric();
                timer.finish_with(e.metric_status_label_value());
                Err(e)
            },
        }
    }

    async fn run_inner(
        &self,
        sources: Vec<BoxedDocumentSource>,
        probe_empty: bool,
    ) -> anyhow::Result<BuildOutcome> {
        self.config.validate(&*self.storage)?;

        let num_partitions = sources.len();
        let worker_count = self.config.worker_count(num_partitions);
        let names = Arc::new(NameAllocator::new(
            self.config.build_prefix().clone(),
            self.config.merge_prefix().clone(),
        ));
        let operator = MergeOperator::new(
            self.config.output_location().to_path_buf(),
            self.storage.clone(),
            self.merger_factory.clone(),
            names.clone(),
        );
        let run = RunContext {
            location: self.config.output_location().to_path_buf(),
            storage: self.storage.clone(),
            indexer_factory: self.indexer_factory.clone(),
            names: names.clone(),
            counters: operator.counters().clone(),
            worker_count,
            failed: Arc::new(AtomicBool::new(false)),
        };
        let pool = BoundedThreadPool::new(num_partitions.max(1), worker_count, "parallel_index");
        tracing::info!(
            "Building {num_partitions} partitions with {worker_count} workers into {:?}",
            run.location
        );

        let result = async {
            let fragments = run.build_all(&pool, sources, probe_empty).await?;
            let survivor = match self.config.reduction() {
                ReductionStrategy::Sequential => {
                    reduce_sequential(&pool, &operator, fragments).await?
                },
                ReductionStrategy::PairwiseTree => {
                    reduce_pairwise(&pool, &operator, fragments).await?
                },
            };
            self.commit(&pool, survivor).await
        }
        .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                run.failed.store(true, Ordering::SeqCst);
                if let Ok(abandoned) = run.allocated_on_disk() {
                    if !abandoned.is_empty() {
                        tracing::warn!(
                            "Index build failed, leaving {} fragments in {:?}: {abandoned:?}",
                            abandoned.len(),
                            run.location
                        );
                    }
                }
                return Err(e);
            },
        };
        if let Ok(leftovers) = run.allocated_on_disk() {
            if !leftovers.is_empty() {
                tracing::warn!("Fragments left over after commit: {leftovers:?}");
            }
        }
        let output_documents = output.as_ref().map_or(0, IndexHandle::document_count);
        let stats = run.counters.snapshot(num_partitions, output_documents);
        tracing::info!("Index build finished: {stats:?}");
        Ok(BuildOutcome { output, stats })
    }

    async fn commit(
        &self,
        pool: &BoundedThreadPool,
        survivor: MergeResult,
    ) -> anyhow::Result<Option<IndexHandle>> {
        let MergeResult::Present(fragment) = survivor else {
            tracing::info!("No partition produced any documents, nothing to commit");
            return Ok(None);
        };
        let storage = self.storage.clone();
        let location = self.config.output_location().to_path_buf();
        let output_name = self.config.output_name().clone();
        let timer = output_commit_timer();
        let result = pool
            .execute(move || commit_fragment(&*storage, location, &fragment, &output_name))
            .await
            .and_then(|r| r);
        match result {
            Ok(handle) => {
                timer.finish();
                log_documents_indexed(handle.document_count());
                Ok(Some(handle))
            },
            Err(e) => {
                timer.finish_with(e.metric_status_label_value());
                Err(e)
            },
        }
    }
}

fn commit_fragment(
    storage: &dyn IndexStorage,
    location: PathBuf,
    fragment: &PartialIndex,
    output_name: &IndexName,
) -> anyhow::Result<IndexHandle> {
    let commit_error = || {
        ErrorMetadata::commit_failed(format!(
            "Failed to commit fragment {} as {output_name} in {location:?}",
            fragment.name()
        ))
    };
    if storage
        .exists(&location, output_name)
        .with_context(commit_error)?
    {
        return Err(anyhow::anyhow!(
            "An index named {output_name} appeared while the build was running"
        ))
        .context(commit_error());
    }
    storage
        .rename(&location, fragment.name(), &location, output_name)
        .with_context(commit_error)?;
    let handle = storage
        .open(&location, output_name)
        .with_context(commit_error)?
        .ok_or_else(|| anyhow::anyhow!("{output_name} is missing after the rename"))
        .with_context(commit_error)?;
    tracing::info!(
        "Committed {} as {output_name} ({} documents)",
        fragment.name(),
        handle.document_count()
    );
    Ok(handle)
}

/// State shared by every worker of one run.
#[derive(Clone)]
struct RunContext {
    location: PathBuf,
    storage: Arc<dyn IndexStorage>,
    indexer_factory: Arc<dyn IndexerFactory>,
    names: Arc<NameAllocator>,
    counters: Arc<RunCounters>,
    worker_count: usize,
    // Set once the run has failed; partitions that have not started yet are
    // skipped.
    failed: Arc<AtomicBool>,
}

impl RunContext {
    async fn build_all(
        &self,
        pool: &BoundedThreadPool,
        sources: Vec<BoxedDocumentSource>,
        probe_empty: bool,
    ) -> anyhow::Result<Vec<MergeResult>> {
        let tasks = sources.into_iter().enumerate().map(|(i, source)| {
            let run = self.clone();
            async move {
                let result = pool
                    .execute({
                        let run = run.clone();
                        move || run.build_partition(source, probe_empty)
                    })
                    .await
                    .with_context(|| {
                        ErrorMetadata::build_failed(format!("Worker for partition {i} died"))
                    })
                    .and_then(|r| r);
                if result.is_err() {
                    run.failed.store(true, Ordering::SeqCst);
                }
                result
            }
        });
        try_join_all(tasks).await
    }

    fn build_partition(
        &self,
        source: BoxedDocumentSource,
        probe_empty: bool,
    ) -> anyhow::Result<MergeResult> {
        if self.failed.load(Ordering::SeqCst) {
            return Ok(MergeResult::Absent);
        }
        let mut source = source.peekable();
        if probe_empty && source.peek().is_none() {
            self.counters.empty_partition_skipped();
            return Ok(MergeResult::Absent);
        }
        let _timer = partition_build_timer();
        let name = self.names.next_build_name();
        let mut indexer = self
            .indexer_factory
            .construct(&self.location, &name)
            .with_context(|| {
                ErrorMetadata::invalid_configuration(
                    "IndexerConstructionFailed",
                    format!("Could not construct an indexer for {name}"),
                )
            })?;
        indexer.set_parallelism_hint(self.worker_count);
        let build_error =
            || ErrorMetadata::build_failed(format!("Failed to build fragment {name}"));
        indexer
            .index_documents(&mut source)
            .with_context(build_error)?;

        let Some(handle) = self
            .storage
            .open(&self.location, &name)
            .with_context(build_error)?
        else {
            tracing::warn!("Indexer reported success but fragment {name} does not exist");
            return Ok(MergeResult::Absent);
        };
        let document_count = self.storage.document_count(&handle);
        self.storage.close(handle).with_context(build_error)?;
        self.counters.fragment_built();
        tracing::debug!("Built fragment {name} with {document_count} documents");
        Ok(MergeResult::Present(PartialIndex::new(name, document_count)))
    }

    /// Fragments of this run that are still on disk.
    fn allocated_on_disk(&self) -> anyhow::Result<Vec<IndexName>> {
        Ok(self
            .storage
            .list(&self.location)?
            .into_iter()
            .filter(|name| self.names.is_allocated(name))
            .collect())
    }
}

async fn reduce_sequential(
    pool: &BoundedThreadPool,
    operator: &MergeOperator,
    fragments: Vec<MergeResult>,
) -> anyhow::Result<MergeResult> {
    let operator = operator.clone();
    pool.execute(move || {
        fragments
            .into_iter()
            .try_fold(MergeResult::Absent, |acc, fragment| {
                operator.merge(acc, fragment)
            })
    })
    .await
    .with_context(|| ErrorMetadata::merge_failed("Sequential merge worker died"))
    .and_then(|r| r)
}

async fn reduce_pairwise(
    pool: &BoundedThreadPool,
    operator: &MergeOperator,
    fragments: Vec<MergeResult>,
) -> anyhow::Result<MergeResult> {
    // `Absent` is the identity, so it never needs a merge slot.
    let mut round: Vec<MergeResult> = fragments
        .into_iter()
        .filter(MergeResult::is_present)
        .collect();
    while round.len() > 1 {
        let mut pending = round.into_iter();
        let mut tasks = vec![];
        let mut carried = None;
        loop {
            match (pending.next(), pending.next()) {
                (Some(left), Some(right)) => {
                    let operator = operator.clone();
                    tasks.push(async move {
                        pool.execute(move || operator.merge(left, right))
                            .await
                            .with_context(|| ErrorMetadata::merge_failed("Merge worker died"))
                            .and_then(|r| r)
                    });
                },
                (Some(odd), None) => {
                    carried = Some(odd);
                    break;
                },
                _ => break,
            }
        }
        let mut next = try_join_all(tasks).await?;
        next.extend(carried);
        round = next.into_iter().filter(MergeResult::is_present).collect();
    }
    Ok(round.pop().unwrap_or_default())
}
