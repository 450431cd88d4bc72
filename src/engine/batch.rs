//! Independent file jobs on a worker pool.
//!
//! Every job loads its own documents, so jobs share nothing but the
//! read-only configuration and the monitor's cancellation token.

use super::jobs;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::ops::{CompressOptions, CompressStats, TextInsertion};
use crate::progress::Monitor;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One unit of batch work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum BatchJob {
    /// Concatenate files
    Merge {
        /// Inputs in order
        inputs: Vec<PathBuf>,
        /// Output file
        output: PathBuf,
    },
    /// One file per page
    Split {
        /// Input file
        input: PathBuf,
        /// Directory receiving the pages
        output_dir: PathBuf,
    },
    /// Keep only the listed pages
    RemovePages {
        /// Input file
        input: PathBuf,
        /// 0-based pages to keep, in output order
        keep: Vec<usize>,
        /// Output file
        output: PathBuf,
    },
    /// Recompress streams
    Compress {
        /// Input file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Options; the configured defaults when absent
        #[serde(default)]
        options: Option<CompressOptions>,
    },
    /// Count pages
    PageCount {
        /// Input file
        input: PathBuf,
    },
    /// Place a line of text
    InsertText {
        /// Input file
        input: PathBuf,
        /// 0-based page
        page: usize,
        /// Text and placement
        insertion: TextInsertion,
        /// Output file
        output: PathBuf,
    },
}

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobOutput {
    /// Page count of the result
    Pages(usize),
    /// Files written
    Files(Vec<PathBuf>),
    /// Compression summary
    Compressed(CompressStats),
    /// Output written, nothing to report
    Written,
}

impl BatchJob {
    /// Run the job on the current thread.
    pub fn run(&self, config: &EngineConfig, monitor: &Monitor) -> Result<JobOutput> {
        match self {
            BatchJob::Merge { inputs, output } => {
                jobs::merge_files(inputs, output, config, monitor).map(JobOutput::Pages)
            },
            BatchJob::Split { input, output_dir } => {
                jobs::split_file(input, output_dir, config, monitor).map(JobOutput::Files)
            },
            BatchJob::RemovePages { input, keep, output } => {
                jobs::remove_pages_file(input, keep, output, config, monitor).map(JobOutput::Pages)
            },
            BatchJob::Compress { input, output, options } => {
                let options = options.as_ref().unwrap_or(&config.compress);
                jobs::compress_file(input, output, options, config, monitor).map(JobOutput::Compressed)
            },
            BatchJob::PageCount { input } => jobs::page_count_file(input, config).map(JobOutput::Pages),
            BatchJob::InsertText {
                input,
                page,
                insertion,
                output,
            } => jobs::insert_text_file(input, *page, insertion, output, config).map(|()| JobOutput::Written),
        }
    }
}

/// Run `jobs` on a pool of `config.worker_threads` threads.
///
/// Results are in input order; one failing job does not stop the others.
/// Jobs not yet started when `monitor` is cancelled fail with `Cancelled`.
pub fn run_batch(jobs: &[BatchJob], config: &EngineConfig, monitor: &Monitor) -> Result<Vec<Result<JobOutput>>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build()
        .map_err(|e| Error::Config(format!("worker pool: {}", e)))?;
    let total = jobs.len();
    log::info!("Running {} jobs on {} threads", total, pool.current_num_threads());

    let results = pool.install(|| {
        jobs.par_iter()
            .enumerate()
            .map(|(i, job)| {
                monitor.check(i, total)?;
                let out = job.run(config, monitor);
                if let Err(e) = &out {
                    log::warn!("Job {} failed: {}", i, e);
                }
                out
            })
            .collect()
    });
    Ok(results)
}
