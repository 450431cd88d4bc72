//! Whole-file jobs: read input paths, transform, write output paths.
//!
//! Each job owns the documents it loads, so jobs can run side by side on
//! the batch pool. Outputs are written with [`write_atomic`]; a failed job
//! leaves no output behind.

use super::atomic::{write_atomic, write_atomic_all};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::ops::{self, CompressOptions, CompressStats, TextInsertion};
use crate::page_tree;
use crate::progress::Monitor;
use crate::writer::{serialize, SerializeOptions};
use std::fs;
use std::path::{Path, PathBuf};

fn load(path: &Path, config: &EngineConfig) -> Result<Document> {
    Document::load_with_options(path, config.parser.clone())
}

fn stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Config(format!("{} has no file name", path.display())))
}

pub(crate) fn stamp_producer(doc: &mut Document, config: &EngineConfig) {
    if let Some(producer) = &config.producer {
        doc.set_info("Producer", crate::object::Object::string(producer.as_str()));
    }
}

/// Concatenate the pages of `inputs` into `output`. Returns the page count.
pub fn merge_files(inputs: &[PathBuf], output: &Path, config: &EngineConfig, monitor: &Monitor) -> Result<usize> {
    let docs = inputs.iter().map(|p| load(p, config)).collect::<Result<Vec<_>>>()?;
    let refs: Vec<&Document> = docs.iter().collect();
    let mut merged = ops::merge(&refs, monitor)?;
    stamp_producer(&mut merged, config);
    let pages = page_tree::page_count(&merged)?;
    write_atomic(output, &serialize(&merged, &SerializeOptions::default())?)?;
    log::info!("Merged {} files into {} ({} pages)", inputs.len(), output.display(), pages);
    Ok(pages)
}

/// Write every page of `input` to `output_dir` as `{stem}_page_{n}.pdf`,
/// `n` counting from 1. The directory is created if needed.
pub fn split_file(input: &Path, output_dir: &Path, config: &EngineConfig, monitor: &Monitor) -> Result<Vec<PathBuf>> {
    let doc = load(input, config)?;
    let stem = stem(input)?;
    let parts = ops::split_each_page(&doc, monitor)?;

    let mut outputs = Vec::with_capacity(parts.len());
    for (i, mut part) in parts.into_iter().enumerate() {
        stamp_producer(&mut part, config);
        let path = output_dir.join(format!("{}_page_{}.pdf", stem, i + 1));
        outputs.push((path, serialize(&part, &SerializeOptions::default())?));
    }
    fs::create_dir_all(output_dir)?;
    write_atomic_all(&outputs)?;
    Ok(outputs.into_iter().map(|(path, _)| path).collect())
}

/// Write the pages of `input` listed in `keep` (0-based, in that order) to
/// `output`. Indices past the end are skipped. Returns the page count.
pub fn remove_pages_file(
    input: &Path,
    keep: &[usize],
    output: &Path,
    config: &EngineConfig,
    monitor: &Monitor,
) -> Result<usize> {
    let mut doc = load(input, config)?;
    ops::keep_pages(&mut doc, keep, monitor)?;
    let pages = page_tree::page_count(&doc)?;
    write_atomic(output, &serialize(&doc, &SerializeOptions::default())?)?;
    Ok(pages)
}

/// Recompress `input` into `output`, dropping unreachable objects.
pub fn compress_file(
    input: &Path,
    output: &Path,
    options: &CompressOptions,
    config: &EngineConfig,
    monitor: &Monitor,
) -> Result<CompressStats> {
    let mut doc = load(input, config)?;
    let stats = ops::compress(&mut doc, options, monitor)?;
    let bytes = serialize(&doc, &SerializeOptions::default().with_compact(true))?;
    write_atomic(output, &bytes)?;
    Ok(stats)
}

/// Number of pages in `input`.
pub fn page_count_file(input: &Path, config: &EngineConfig) -> Result<usize> {
    page_tree::page_count(&load(input, config)?)
}

/// Place one line of text on page `index` of `input` and write `output`.
pub fn insert_text_file(
    input: &Path,
    index: usize,
    insertion: &TextInsertion,
    output: &Path,
    config: &EngineConfig,
) -> Result<()> {
    let mut doc = load(input, config)?;
    ops::insert_text(&mut doc, index, insertion)?;
    write_atomic(output, &serialize(&doc, &SerializeOptions::default())?)
}
