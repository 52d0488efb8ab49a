use std::{
    fs,
    num::NonZeroUsize,
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use cmd_util::env::config_tool;
use index_storage::{
    IndexStorage,
    LocalDirIndexStorage,
};
use parallel_indexing::{
    DOCNO_KEY,
    Document,
    DocumentPostingList,
    ParallelBuildConfig,
    ParallelBuildReducer,
    ReductionStrategy,
    basic::{
        BasicIndexerFactory,
        BasicMergerFactory,
    },
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Index a directory of text files in parallel, one partition per file"
)]
struct Args {
    /// Directory of input files. Every non-blank line is one document.
    input: PathBuf,

    /// Existing directory the index is written to.
    output: PathBuf,

    /// Name of the committed index. Defaults to PARALLEL_INDEX_OUTPUT_NAME.
    #[arg(long)]
    output_name: Option<String>,

    /// Maximum number of concurrent workers, 0 for one per input file.
    #[arg(long)]
    max_workers: Option<usize>,

    /// `sequential` or `pairwise_tree`.
    #[arg(long)]
    reduction: Option<ReductionStrategy>,
}

/// Reads its file on first use, so the read happens on the worker.
struct LineSource {
    path: PathBuf,
    lines: Option<std::vec::IntoIter<(usize, String)>>,
}

impl LineSource {
    fn new(path: PathBuf) -> Self {
        Self { path, lines: None }
    }

    fn document(&self, line_number: usize, line: &str) -> Document {
        let postings: DocumentPostingList = line
            .split_whitespace()
            .map(|token| {
                token
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|term| !term.is_empty())
            .map(|term| (term, 1))
            .collect();
        let docno = format!("{}:{line_number}", self.path.display());
        Document::new([(DOCNO_KEY.to_owned(), docno)].into(), postings)
    }
}

impl Iterator for LineSource {
    type Item = anyhow::Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.lines.is_none() {
            let contents = match fs::read_to_string(&self.path) {
                Ok(contents) => contents,
                Err(e) => {
                    self.lines = Some(Vec::new().into_iter());
                    return Some(
                        Err(e).with_context(|| format!("Failed to read {:?}", self.path)),
                    );
                },
            };
            let lines: Vec<_> = contents
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| (i + 1, line.to_owned()))
                .collect();
            self.lines = Some(lines.into_iter());
        }
        let (line_number, line) = self.lines.as_mut()?.next()?;
        Some(Ok(self.document(line_number, &line)))
    }
}

fn main() -> anyhow::Result<()> {
    let _guard = config_tool();
    let args = Args::parse();

    let mut config = ParallelBuildConfig::new(&args.output)?;
    if let Some(output_name) = args.output_name {
        config = config.with_output_name(output_name.parse()?);
    }
    if let Some(max_workers) = args.max_workers {
        config = config.with_max_workers(NonZeroUsize::new(max_workers));
    }
    if let Some(reduction) = args.reduction {
        config = config.with_reduction(reduction);
    }

    let mut sources = vec![];
    for entry in WalkDir::new(&args.input)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            sources.push(LineSource::new(entry.into_path()));
        }
    }
    tracing::info!("Indexing {} files from {:?}", sources.len(), args.input);

    let storage: Arc<dyn IndexStorage> = Arc::new(LocalDirIndexStorage::new());
    let reducer = ParallelBuildReducer::new(
        config,
        storage.clone(),
        Arc::new(BasicIndexerFactory::new(storage)),
        Arc::new(BasicMergerFactory),
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(reducer.build(sources))?;

    match outcome.output {
        Some(index) => println!(
            "Wrote {} with {} documents to {:?}",
            index.name(),
            index.document_count(),
            index.location()
        ),
        None => println!("No documents found, no index written"),
    }
    eprintln!("{:?}", outcome.stats);
    Ok(())
}
