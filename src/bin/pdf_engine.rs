//! Command-line front end for the PDF engine.
//!
//! Usage:
//!   pdf_engine count <input>
//!   pdf_engine merge <output> <input>...
//!   pdf_engine split <input> <output-dir>
//!   pdf_engine remove <input> <output> <pages>
//!   pdf_engine compress <input> <output> [--level N] [--quality Q]
//!   pdf_engine rotate <input> <output> <degrees> [pages]
//!   pdf_engine watermark <input> <output> <text> [--opacity X] [--size N] [--pages P] [--background]
//!   pdf_engine insert-text <input> <output> <page> <x> <y> <text> [--size N]
//!   pdf_engine encrypt <input> <output> <user-password> <owner-password> [--algorithm A]
//!   pdf_engine decrypt <input> <output> <password>
//!   pdf_engine text <input> [pages]
//!
//! Pages are 1-based ranges such as `1,3-5,8`, or `all`. Set
//! `PDF_ENGINE_CONFIG` to a JSON file to override the engine defaults and
//! `RUST_LOG` to control logging.

use pdf_engine::encryption::{Algorithm, EncryptionConfig};
use pdf_engine::engine::jobs;
use pdf_engine::ops::{CompressOptions, Layer, PageSelection, TextInsertion, WatermarkConfig};
use pdf_engine::{Engine, EngineConfig, Error, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

const USAGE: &str = "usage: pdf_engine <count|merge|split|remove|compress|rotate|watermark|insert-text|encrypt|decrypt|text> ...";

/// Positional arguments plus `--flag value` options.
struct Args {
    positional: Vec<String>,
    options: Vec<(String, Option<String>)>,
}

impl Args {
    fn parse(raw: impl Iterator<Item = String>) -> Self {
        let raw: Vec<String> = raw.collect();
        let mut positional = Vec::new();
        let mut options = Vec::new();
        let mut i = 0;
        while i < raw.len() {
            if let Some(name) = raw[i].strip_prefix("--") {
                let value = raw.get(i + 1).filter(|v| !v.starts_with("--")).cloned();
                if value.is_some() && name != "background" {
                    i += 1;
                    options.push((name.to_string(), value));
                } else {
                    options.push((name.to_string(), None));
                }
            } else {
                positional.push(raw[i].clone());
            }
            i += 1;
        }
        Self { positional, options }
    }

    fn get(&self, index: usize, what: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::Config(format!("missing {}\n{}", what, USAGE)))
    }

    fn path(&self, index: usize, what: &str) -> Result<PathBuf> {
        self.get(index, what).map(PathBuf::from)
    }

    fn number<T: FromStr>(&self, index: usize, what: &str) -> Result<T> {
        let raw = self.get(index, what)?;
        raw.parse()
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", what, raw)))
    }

    fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    fn option_number<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.option(name)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| Error::Config(format!("--{} must be a number, got '{}'", name, raw)))
            })
            .transpose()
    }

    fn flag(&self, name: &str) -> bool {
        self.options.iter().any(|(n, _)| n == name)
    }
}

fn load_config() -> Result<EngineConfig> {
    match std::env::var_os("PDF_ENGINE_CONFIG") {
        Some(path) => EngineConfig::from_json_file(Path::new(&path)),
        None => Ok(EngineConfig::default()),
    }
}

fn selection(engine: &mut Engine, doc: pdf_engine::DocumentHandle, raw: Option<&str>) -> Result<PageSelection> {
    match raw {
        Some(raw) => PageSelection::parse(raw, engine.page_count(doc)?),
        None => Ok(PageSelection::All),
    }
}

fn parse_algorithm(raw: &str) -> Result<Algorithm> {
    match raw.to_ascii_lowercase().as_str() {
        "rc4-40" => Ok(Algorithm::Rc4_40),
        "rc4-128" => Ok(Algorithm::Rc4_128),
        "aes-128" => Ok(Algorithm::Aes128),
        "aes-256" => Ok(Algorithm::Aes256),
        other => Err(Error::Config(format!(
            "unknown algorithm '{}' (rc4-40, rc4-128, aes-128, aes-256)",
            other
        ))),
    }
}

fn run(command: &str, args: &Args, config: EngineConfig) -> Result<String> {
    let mut engine = Engine::new(config);
    match command {
        "count" => {
            let count = jobs::page_count_file(&args.path(0, "input")?, engine.config())?;
            Ok(format!("{} pages", count))
        },
        "merge" => {
            let output = args.path(0, "output")?;
            let inputs: Vec<PathBuf> = args.positional[1..].iter().map(PathBuf::from).collect();
            if inputs.is_empty() {
                return Err(Error::Config(format!("merge needs at least one input\n{}", USAGE)));
            }
            let pages = jobs::merge_files(&inputs, &output, engine.config(), engine.monitor())?;
            Ok(format!("merged {} files into {} ({} pages)", inputs.len(), output.display(), pages))
        },
        "split" => {
            let files = jobs::split_file(
                &args.path(0, "input")?,
                &args.path(1, "output directory")?,
                engine.config(),
                engine.monitor(),
            )?;
            Ok(format!("wrote {} files", files.len()))
        },
        "remove" => {
            let doc = engine.open(args.path(0, "input")?)?;
            let pages = PageSelection::parse(args.get(2, "pages")?, engine.page_count(doc)?)?;
            let indices = pages.indices(engine.page_count(doc)?)?;
            engine.delete_pages(doc, &indices)?;
            engine.save(doc, args.path(1, "output")?)?;
            Ok(format!("removed {} pages, {} left", indices.len(), engine.page_count(doc)?))
        },
        "compress" => {
            let mut options = engine.config().compress.clone();
            if let Some(level) = args.option_number("level")? {
                options = options.with_level(level);
            }
            if let Some(quality) = args.option_number("quality")? {
                options = options.with_image_quality(quality);
            }
            let stats = jobs::compress_file(
                &args.path(0, "input")?,
                &args.path(1, "output")?,
                &options,
                engine.config(),
                engine.monitor(),
            )?;
            Ok(format!(
                "recompressed {} of {} streams: {} -> {} bytes",
                stats.flated + stats.images,
                stats.streams,
                stats.bytes_before,
                stats.bytes_after
            ))
        },
        "rotate" => {
            let doc = engine.open(args.path(0, "input")?)?;
            let degrees: i64 = args.number(2, "degrees")?;
            let pages = selection(&mut engine, doc, args.positional.get(3).map(String::as_str))?;
            engine.rotate(doc, &pages, degrees)?;
            engine.save(doc, args.path(1, "output")?)?;
            Ok(format!("rotated by {} degrees", degrees))
        },
        "watermark" => {
            let doc = engine.open(args.path(0, "input")?)?;
            let mut wm = WatermarkConfig::new(args.get(2, "text")?);
            if let Some(opacity) = args.option_number("opacity")? {
                wm = wm.with_opacity(opacity);
            }
            if let Some(size) = args.option_number("size")? {
                wm = wm.with_font_size(size);
            }
            if args.flag("background") {
                wm = wm.with_layer(Layer::Background);
            }
            let pages = selection(&mut engine, doc, args.option("pages"))?;
            engine.watermark(doc, &wm, &pages)?;
            engine.save(doc, args.path(1, "output")?)?;
            Ok("watermarked".to_string())
        },
        "insert-text" => {
            let page: usize = args.number(2, "page")?;
            if page == 0 {
                return Err(Error::InvalidPageRange("pages are numbered from 1".to_string()));
            }
            let mut insertion = TextInsertion::new(args.get(5, "text")?, args.number(3, "x")?, args.number(4, "y")?);
            if let Some(size) = args.option_number("size")? {
                insertion = insertion.with_font_size(size);
            }
            jobs::insert_text_file(
                &args.path(0, "input")?,
                page - 1,
                &insertion,
                &args.path(1, "output")?,
                engine.config(),
            )?;
            Ok(format!("inserted text on page {}", page))
        },
        "encrypt" => {
            let doc = engine.open(args.path(0, "input")?)?;
            let mut encryption = EncryptionConfig::new(args.get(2, "user password")?, args.get(3, "owner password")?);
            if let Some(raw) = args.option("algorithm") {
                encryption = encryption.with_algorithm(parse_algorithm(raw)?);
            }
            engine.encrypt(doc, &encryption)?;
            engine.save(doc, args.path(1, "output")?)?;
            Ok(format!("encrypted with {:?}", encryption.algorithm))
        },
        "decrypt" => {
            let doc = engine.open(args.path(0, "input")?)?;
            engine.decrypt(doc, args.get(2, "password")?)?;
            engine.save(doc, args.path(1, "output")?)?;
            Ok("decrypted".to_string())
        },
        "text" => {
            let doc = engine.open(args.path(0, "input")?)?;
            let pages = selection(&mut engine, doc, args.positional.get(1).map(String::as_str))?;
            let texts = engine.extract_text(doc, &pages)?;
            for page in &texts {
                println!("--- page {} ---", page.index + 1);
                println!("{}", page.text);
            }
            Ok(format!("extracted {} pages", texts.len()))
        },
        other => Err(Error::Config(format!("unknown command '{}'\n{}", other, USAGE))),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let mut raw = std::env::args().skip(1);
    let Some(command) = raw.next() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };
    let args = Args::parse(raw);

    let result = load_config().and_then(|config| run(&command, &args, config));
    match result {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("error [{:?}]: {}", e.kind(), e);
            ExitCode::FAILURE
        },
    }
}
