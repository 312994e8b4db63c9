use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;

use folio_core::archive::Archive;
use folio_core::cancel::CancelToken;
use folio_core::config::{
    archive_options_from_config, config_path, diagnostics_limits_from_config, load_config,
    pagination_options_from_config, parse_options_from_config, save_config,
    typography_from_config, AppConfig,
};
use folio_core::diagnostics::diagnose;
use folio_core::document::{Block, Document, Page};
use folio_core::import::{import_book, import_book_async};
use folio_core::layout::{
    paginate_or_scroll, MonospaceMetrics, PaginationSession, Presentation, Viewport,
};
use folio_core::package::load_package;
use folio_core::progress::{ProgressEvent, ProgressHandler};
use folio_core::readers::epub::parse_book;
use folio_core::readers::DiagnosticsPolicy;
use folio_core::source::{BookSource, FileSource};
use folio_core::toc::{build_title_map, load_navigation};

type CliError = Box<dyn std::error::Error + Send + Sync>;
type CliResult<T = ()> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Inspect and paginate EPUB books")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check container structure
    Diagnose {
        /// Input file
        #[arg(required = true)]
        input: String,

        /// Exit with an error when any issue is found
        #[arg(long)]
        strict: bool,
    },

    /// Show metadata and reading statistics
    Info {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// Import books and print their library records
    Import {
        /// Input file(s)
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// List chapters in reading order
    Chapters {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// Show the navigation document's title map
    Toc {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// Paginate a book for a viewport
    Paginate {
        /// Input file
        #[arg(required = true)]
        input: String,

        /// Viewport width in pixels
        #[arg(long, default_value_t = 600.0)]
        width: f32,

        /// Viewport height in pixels
        #[arg(long, default_value_t = 800.0)]
        height: f32,

        /// Font size in pixels (overrides config)
        #[arg(long)]
        font_size: Option<f32>,

        /// Print the text of this page (1-based)
        #[arg(long)]
        page: Option<usize>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Create default config file
    Init,
    /// Show current config
    Show,
    /// Set a config value
    Set {
        /// Key (e.g., pagination.font_size)
        key: String,
        /// Value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Diagnose { input, strict } => run_diagnose(input, *strict, cli.json),
        Commands::Info { input } => run_info(input, cli.json),
        Commands::Import { inputs } => run_import(inputs, cli.json),
        Commands::Chapters { input } => run_chapters(input, cli.json),
        Commands::Toc { input } => run_toc(input, cli.json),
        Commands::Paginate { input, width, height, font_size, page } => {
            run_paginate(input, *width, *height, *font_size, *page, cli.json)
        }
        Commands::Config { action } => run_config(action, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Renders parse progress on stderr.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(json: bool) -> Self {
        let bar = if json {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos}/{len}") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressHandler for BarProgress {
    fn on_progress(&self, event: ProgressEvent) {
        if let Some(total) = event.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(event.current);
        self.bar.set_message(event.message.unwrap_or(event.operation));
    }
}

fn open_source(input: &str) -> CliResult<FileSource> {
    let path = Path::new(input);
    if !path.exists() {
        return Err(format!("Input file not found: {}", path.display()).into());
    }
    Ok(FileSource::new(path))
}

fn read_document(input: &str, cfg: &AppConfig, json: bool) -> CliResult<Document> {
    let source = open_source(input)?;
    let progress = BarProgress::new(json);
    let outcome = parse_book(
        &source,
        &parse_options_from_config(cfg),
        &CancelToken::new(),
        Some(&progress),
    );
    progress.finish();
    Ok(outcome?.into_result()?)
}

fn run_diagnose(input: &str, strict: bool, json: bool) -> CliResult {
    let cfg = load_config();
    let source = open_source(input)?;
    let archive = Archive::from_source(&source, &archive_options_from_config(&cfg.archive))?;
    let diagnosis = diagnose(&archive, &diagnostics_limits_from_config(&cfg.diagnostics));

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnosis)?);
    } else {
        let s = &diagnosis.structure;
        println!(
            "Entries: {} ({} content, {} images)",
            s.entry_count, s.content_entries, s.image_entries
        );
        println!("Uncompressed size: {} bytes", s.total_uncompressed_bytes);
        if s.recovered {
            println!("Recovered from duplicate entries");
        }
        if s.truncated {
            println!("Recovery stopped early; later entries are missing");
        }
        for issue in &diagnosis.issues {
            match &issue.entry {
                Some(entry) => println!("[{}] {}", issue.kind.code(), entry),
                None => println!("[{}]", issue.kind.code()),
            }
        }
        if diagnosis.valid {
            println!("Container OK.");
        }
    }

    let strict = strict || cfg.diagnostics.policy == DiagnosticsPolicy::Strict;
    if strict && !diagnosis.valid {
        return Err(format!("Diagnostics reported {} issue(s)", diagnosis.issues.len()).into());
    }
    Ok(())
}

fn run_info(input: &str, json: bool) -> CliResult {
    let cfg = load_config();
    let source = open_source(input)?;
    let progress = BarProgress::new(json);
    let book = import_book(&source, &cfg, &CancelToken::new(), Some(&progress));
    progress.finish();
    let book = book?;

    if json {
        println!("{}", serde_json::to_string_pretty(&book)?);
    } else {
        let m = &book.metadata;
        println!("Title: {}", m.title);
        println!("Author: {}", m.author);
        if let Some(d) = &m.description {
            println!("Description: {}", d);
        }
        if let Some(c) = &m.cover {
            println!("Cover: {} ({}x{})", c.entry, c.width, c.height);
        }
        let s = &book.stats;
        println!("Words: {}", s.word_count);
        println!("Chapters: {}", s.chapter_count);
        println!("Images: {}", s.image_count);
        println!("Reading time: {:.1} min", s.estimated_reading_time_minutes);
    }
    Ok(())
}

fn run_import(inputs: &[String], json: bool) -> CliResult {
    let cfg = load_config();
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;

    let results = runtime.block_on(async {
        let mut handles = Vec::with_capacity(inputs.len());
        for input in inputs {
            let source: Arc<dyn BookSource> = Arc::new(FileSource::new(input));
            let task = import_book_async(source, cfg.clone(), CancelToken::new());
            handles.push((input.clone(), tokio::spawn(task)));
        }
        let mut results = Vec::with_capacity(handles.len());
        for (input, handle) in handles {
            results.push((input, handle.await));
        }
        results
    });

    let mut failed = 0;
    let mut books = Vec::new();
    for (input, result) in results {
        match result {
            Ok(Ok(book)) => {
                if !json {
                    println!(
                        "Added: {} by {} ({})",
                        book.metadata.title, book.metadata.author, input
                    );
                }
                books.push(book);
            }
            Ok(Err(e)) => {
                failed += 1;
                eprintln!("{}: {}", input, e);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", input, e);
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&books)?);
    }
    if failed > 0 {
        return Err(format!("{} of {} book(s) could not be added", failed, inputs.len()).into());
    }
    Ok(())
}

fn run_chapters(input: &str, json: bool) -> CliResult {
    let cfg = load_config();
    let doc = read_document(input, &cfg, json)?;
    let chapters: Vec<_> = doc
        .blocks
        .iter()
        .filter_map(|b| match b {
            Block::Chapter(c) => Some(c),
            _ => None,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&chapters)?);
    } else {
        println!("Order: {:?}", doc.order_source);
        for (i, c) in chapters.iter().enumerate() {
            let indent = if c.nested { "  " } else { "" };
            println!("{:>3}. {}{}", i + 1, indent, c.title);
        }
    }
    Ok(())
}

fn run_toc(input: &str, json: bool) -> CliResult {
    let cfg = load_config();
    let source = open_source(input)?;
    let mut archive = Archive::from_source(&source, &archive_options_from_config(&cfg.archive))?;
    let package = load_package(&mut archive)?;
    let nav = load_navigation(&mut archive, package.as_ref());
    let Some(titles) = build_title_map(nav.as_ref()) else {
        if json {
            println!("null");
        } else {
            println!("No table of contents.");
        }
        return Ok(());
    };

    if json {
        let entries: Vec<_> = titles
            .iter()
            .map(|(source, chapter)| {
                serde_json::json!({
                    "source": source,
                    "title": chapter.title,
                    "nested": chapter.nested,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (source, chapter) in titles.iter() {
            let indent = if chapter.nested { "  " } else { "" };
            println!("{}{} -> {}", indent, chapter.title, source);
        }
    }
    Ok(())
}

fn run_paginate(
    input: &str,
    width: f32,
    height: f32,
    font_size: Option<f32>,
    page: Option<usize>,
    json: bool,
) -> CliResult {
    let cfg = load_config();
    let doc = read_document(input, &cfg, json)?;

    let mut typography = typography_from_config(&cfg.pagination);
    if let Some(size) = font_size {
        typography.font_size = size;
    }
    let opts = pagination_options_from_config(&cfg.pagination);
    let session = PaginationSession::new();
    let pages = session.paginate(
        &doc.blocks,
        Viewport::new(width, height),
        &typography,
        &MonospaceMetrics::default(),
        &opts,
    );

    let pages = match paginate_or_scroll(&doc.blocks, pages) {
        Presentation::Paged(pages) => pages,
        Presentation::Continuous(_) => {
            return Err("Pagination unavailable for this viewport; use continuous scroll".into());
        }
    };

    match page {
        Some(n) => {
            let p = n
                .checked_sub(1)
                .and_then(|i| pages.get(i))
                .ok_or_else(|| format!("Page {} out of range (1-{})", n, pages.len()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(p)?);
            } else {
                print_page(p);
            }
        }
        None => {
            if json {
                let summary: Vec<_> = pages
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "index": p.index,
                            "first_block": p.first_block,
                            "blocks": p.blocks.len(),
                            "height": p.height,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Pages: {}", pages.len());
                if pages.len() == opts.max_pages {
                    println!("(truncated at {} pages)", opts.max_pages);
                }
            }
        }
    }
    Ok(())
}

fn print_page(page: &Page) {
    for block in &page.blocks {
        match block {
            Block::Chapter(c) => println!("## {}\n", c.title),
            Block::Separator => println!("* * *\n"),
            Block::Image(img) => match &img.alt {
                Some(alt) => println!("[image: {} \"{}\"]\n", img.entry, alt),
                None => println!("[image: {}]\n", img.entry),
            },
            Block::Text(t) => println!("{}\n", t.text),
        }
    }
}

fn run_config(
    action: &ConfigAction,
    json: bool,
) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            save_config(&AppConfig::default(), &path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = config_path().ok_or("Could not determine config directory")?;
            let mut cfg: AppConfig = if path.exists() {
                let s = std::fs::read_to_string(&path)?;
                toml::from_str(&s).unwrap_or_else(|_| AppConfig::default())
            } else {
                AppConfig::default()
            };

            set_config_key(&mut cfg, key, value)?;

            save_config(&cfg, &path)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> CliResult {
    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["archive", sub] => match *sub {
            "recover_duplicates" => cfg.archive.recover_duplicates = Some(value.parse()?),
            "inline_limit_kb" => cfg.archive.inline_limit_kb = Some(value.parse()?),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["diagnostics", sub] => match *sub {
            "policy" => {
                cfg.diagnostics.policy = match value {
                    "strict" => DiagnosticsPolicy::Strict,
                    "best-effort" => DiagnosticsPolicy::BestEffort,
                    _ => return Err(format!("Unknown policy: {}", value).into()),
                }
            }
            "max_name_len" => cfg.diagnostics.max_name_len = Some(value.parse()?),
            "max_entry_size_mb" => cfg.diagnostics.max_entry_size_mb = Some(value.parse()?),
            "max_entries" => cfg.diagnostics.max_entries = Some(value.parse()?),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["extraction", sub] => match *sub {
            "max_workers" => cfg.extraction.max_workers = Some(value.parse()?),
            "use_toc" => cfg.extraction.use_toc = value.parse()?,
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["pagination", sub] => {
            let p = &mut cfg.pagination;
            match *sub {
                "font_size" => p.font_size = Some(value.parse()?),
                "line_height" => p.line_height = Some(value.parse()?),
                "indent" => p.indent = Some(value.parse()?),
                "horizontal_padding" => p.horizontal_padding = Some(value.parse()?),
                "vertical_padding" => p.vertical_padding = Some(value.parse()?),
                "block_spacing" => p.block_spacing = Some(value.parse()?),
                "heading_scale" => p.heading_scale = Some(value.parse()?),
                "max_pages" => p.max_pages = Some(value.parse()?),
                "marker_margin" => p.marker_margin = Some(value.parse()?),
                "image_height" => p.image_height = Some(value.parse()?),
                _ => return Err(format!("Unknown key: {}", key).into()),
            }
        }
        ["metadata", sub] => match *sub {
            "extract_cover" => cfg.metadata.extract_cover = value.parse()?,
            "unknown_author" => cfg.metadata.unknown_author = Some(value.to_string()),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        _ => return Err(format!("Unknown key: {}", key).into()),
    }
    Ok(())
}
