//! sift CLI: Semantic code search with an incremental index

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fs2::FileExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sift_core::scan::scan_files;
use sift_core::search::filter_by_threshold;
use sift_core::{
    CodeExtractor, Config, DefaultIndex, IndexStats, ManifestStore, Pattern, ProgressEvent,
    SearchResult, discover, grep_blocks,
};
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{LinesWithEndings, as_24_bit_terminal_escaped};

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Semantic code search", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    search: SearchArgs,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// Search query
    query: Option<String>,

    /// Directory to search (default: nearest indexed ancestor of the current directory)
    path: Option<PathBuf>,

    /// Maximum number of results
    #[arg(short = 'n', long, default_value = "10")]
    limit: usize,

    /// Minimum similarity score (0-1)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Omit block content from the output
    #[arg(short, long)]
    compact: bool,

    /// Search the existing index without building or updating it
    #[arg(long)]
    no_index: bool,

    /// Match the query literally instead of semantically (no index needed)
    #[arg(short, long, conflicts_with = "regex")]
    exact: bool,

    /// Match the query as a regular expression (no index needed)
    #[arg(short, long)]
    regex: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .sift/config.json
    Init {
        /// Directory to initialize (default: current directory)
        path: Option<PathBuf>,
    },

    /// Index files, skipping unchanged ones
    Index {
        /// Directory to index (default: current directory)
        path: Option<PathBuf>,
    },

    /// Re-index changed files and drop deleted ones
    Update {
        path: Option<PathBuf>,
    },

    /// Show index status and statistics
    Status {
        path: Option<PathBuf>,

        /// Print status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete the index and build it again
    Rebuild {
        path: Option<PathBuf>,
    },

    /// Delete the index
    Clean {
        path: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Some(Commands::Init { path }) => cmd_init(path).map(|_| true),
        Some(Commands::Index { path }) => cmd_index(path, cli.quiet).map(|_| true),
        Some(Commands::Update { path }) => cmd_update(path, cli.quiet).map(|_| true),
        Some(Commands::Status { path, json }) => cmd_status(path, json).map(|_| true),
        Some(Commands::Rebuild { path }) => cmd_rebuild(path, cli.quiet).map(|_| true),
        Some(Commands::Clean { path }) => cmd_clean(path).map(|_| true),
        None => match cli.search.query.clone() {
            Some(query) => cmd_search(&query, &cli.search, cli.quiet),
            None => {
                println!("Usage: sift <query> [path] or sift <command>");
                println!("Run 'sift --help' for more information.");
                Ok(true)
            }
        },
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// The directory a mutating command works on.
fn target_root(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    path.canonicalize()
        .with_context(|| format!("Cannot access {}", path.display()))
}

/// The directory a query runs against: the nearest indexed ancestor, or the
/// target itself when nothing has been indexed yet. The second value is the
/// target relative to that root, empty when they are the same.
fn search_root(path: Option<PathBuf>) -> Result<(PathBuf, String)> {
    let target = target_root(path)?;
    let root = discover::find_index_root(&target).unwrap_or_else(|| target.clone());
    let scope = sift_core::scan::relative_path(&root, &target);
    Ok((root, scope))
}

/// A flag raised by the first Ctrl-C; a second one exits immediately.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let signalled = flag.clone();

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::debug!("Ctrl-C handling unavailable: {}", e);
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            signalled.store(true, Ordering::Relaxed);
            eprintln!("\nCancelling after the current batch (Ctrl-C again to abort)");
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    });

    flag
}

/// Take the writer lock for `root`, failing if another process holds it.
fn lock_writer(root: &Path) -> Result<File> {
    let path = discover::lock_path(root);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("Cannot open lock file {}", path.display()))?;
    file.try_lock_exclusive().with_context(|| {
        format!(
            "Another sift process is updating the index in {}",
            root.display()
        )
    })?;
    Ok(file)
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb
}

/// Open the index for `root`, routing its progress events to `pb` and
/// stopping between batches once `cancel` is raised.
fn open_index(root: PathBuf, pb: &ProgressBar, cancel: Arc<AtomicBool>) -> Result<DefaultIndex> {
    let mut index = DefaultIndex::open(root)?;
    index.set_cancel_flag(cancel);

    index.set_progress_callback(Box::new({
        let pb = pb.clone();
        move |event| {
            let (current, total) = event.position();
            match event {
                ProgressEvent::Extracting { .. } => {
                    pb.set_length(total as u64);
                    pb.set_position(current as u64);
                }
                ProgressEvent::Embedding { .. } => {
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("█▓░"),
                    );
                    pb.set_length(total as u64);
                    pb.set_position(current as u64);
                }
                ProgressEvent::Finished { .. } => pb.set_position(total as u64),
            }
            pb.set_message(event.message());
        }
    }));

    Ok(index)
}

fn print_stats(stats: &IndexStats) {
    println!("✓ Indexing complete:");
    println!("  Files indexed:   {}", stats.files);
    println!("  Blocks embedded: {}", stats.blocks);
    println!("  Files unchanged: {}", stats.skipped);
    println!("  Vectors removed: {}", stats.deleted);
    if stats.errors > 0 {
        println!("  Files failed:    {}", stats.errors);
    }
}

fn cmd_init(path: Option<PathBuf>) -> Result<()> {
    let root = target_root(path)?;
    let config_path = discover::config_path(&root);

    if config_path.exists() {
        anyhow::bail!("Already initialized: {} exists", config_path.display());
    }

    Config::default().save(&root)?;

    println!("Initialized sift in {}", discover::index_dir(&root).display());
    println!("Run 'sift index' to index files.");

    Ok(())
}

fn cmd_index(path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let root = target_root(path)?;
    let _lock = lock_writer(&root)?;

    let pb = progress_bar(quiet);
    pb.set_message("Scanning files...");

    let config = Config::load(&root)?;
    let files = scan_files(&root, &config)?;
    let mut index = open_index(root, &pb, cancel_on_ctrl_c())?;
    let stats = index.index(&files)?;

    pb.finish_and_clear();
    if !quiet {
        print_stats(&stats);
    }

    Ok(())
}

fn cmd_update(path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let root = target_root(path)?;
    let _lock = lock_writer(&root)?;

    let pb = progress_bar(quiet);
    pb.set_message("Scanning files...");

    let config = Config::load(&root)?;
    let files = scan_files(&root, &config)?;
    let mut index = open_index(root, &pb, cancel_on_ctrl_c())?;
    let stats = index.update(&files)?;

    pb.finish_and_clear();
    if !quiet {
        print_stats(&stats);
    }

    Ok(())
}

fn cmd_rebuild(path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let root = target_root(path)?;
    let _lock = lock_writer(&root)?;

    let pb = progress_bar(quiet);
    pb.set_message("Scanning files...");

    // Read the config before the folder holding it goes away
    let config = Config::load(&root)?;
    let had_config = discover::config_path(&root).exists();
    let files = scan_files(&root, &config)?;

    let mut index = open_index(root.clone(), &pb, cancel_on_ctrl_c())?;
    index.clear()?;
    if had_config {
        config.save(&root)?;
    }
    let stats = index.index(&files)?;

    pb.finish_and_clear();
    if !quiet {
        print_stats(&stats);
    }

    Ok(())
}

fn cmd_clean(path: Option<PathBuf>) -> Result<()> {
    let root = target_root(path)?;
    let lock = lock_writer(&root)?;

    // No config or model is loaded, so a broken index can always be removed
    let removed = sift_core::remove_index(&root)?;

    drop(lock);
    let lock_path = discover::lock_path(&root);
    if let Err(e) = std::fs::remove_file(&lock_path) {
        tracing::debug!("Leaving {}: {}", lock_path.display(), e);
    }

    if removed {
        println!("Removed {}", discover::index_dir(&root).display());
    } else {
        println!("Nothing to clean in {}", root.display());
    }
    Ok(())
}

#[derive(Serialize)]
struct Status {
    root: PathBuf,
    indexed: bool,
    model: Option<String>,
    indexed_model: Option<String>,
    files: usize,
    blocks: usize,
    vectors: Option<usize>,
    stale: Option<usize>,
    error: Option<String>,
}

/// Vector count and number of stale files, which need a working config.
fn index_counts(root: &Path, config: &Config) -> Result<(usize, usize)> {
    let mut index = DefaultIndex::open(root.to_path_buf())?;
    let files = scan_files(root, config)?;
    let stale = index.needs_update(&files);
    Ok((index.count()?, stale))
}

fn collect_status(root: PathBuf) -> Status {
    let manifests = ManifestStore::new(&root);
    let manifest = manifests.load();
    let mut status = Status {
        indexed: manifests.exists(),
        model: None,
        indexed_model: manifest.model.clone(),
        files: manifest.files.len(),
        blocks: manifest.block_count(),
        vectors: None,
        stale: None,
        error: None,
        root,
    };

    let counts = Config::load(&status.root)
        .map_err(anyhow::Error::from)
        .and_then(|config| {
            status.model = Some(config.model.clone());
            if status.indexed {
                index_counts(&status.root, &config).map(Some)
            } else {
                Ok(None)
            }
        });
    match counts {
        Ok(Some((vectors, stale))) => {
            status.vectors = Some(vectors);
            status.stale = Some(stale);
        }
        Ok(None) => {}
        Err(e) => status.error = Some(format!("{e:#}")),
    }

    status
}

fn cmd_status(path: Option<PathBuf>, json: bool) -> Result<()> {
    let (root, _) = search_root(path)?;
    let status = collect_status(root);

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("sift index: {}", status.root.display());
    if let Some(error) = &status.error {
        println!("  \x1b[31mConfig problem:\x1b[0m {}", error);
        println!("  Fix .sift/config.json or run 'sift clean' to start over.");
    }
    if !status.indexed {
        println!("Not indexed. Run 'sift index' to build the index.");
        return Ok(());
    }
    println!();
    println!("Index:");
    if let Some(model) = &status.model {
        println!("  Model: {}", model);
    }
    if let Some(model) = &status.indexed_model {
        println!("  Built with: {}", model);
    }
    println!("  Files indexed: {}", status.files);
    println!("  Total blocks: {}", status.blocks);
    if let Some(vectors) = status.vectors {
        println!("  Stored vectors: {}", vectors);
    }
    if let Some(stale) = status.stale {
        println!("  Files needing update: {}", stale);
    }

    Ok(())
}

/// Run a query, building or refreshing the index first unless told not to.
/// Returns whether anything was found.
fn cmd_search(query: &str, args: &SearchArgs, quiet: bool) -> Result<bool> {
    if args.exact || args.regex {
        return cmd_grep(query, args);
    }

    let (root, scope) = search_root(args.path.clone())?;
    let pb = progress_bar(quiet || args.json);
    let mut index = open_index(root.clone(), &pb, cancel_on_ctrl_c())?;

    if args.no_index && !index.is_indexed() {
        anyhow::bail!(
            "No index found in {} (run without --no-index to build it)",
            root.display()
        );
    }

    if !args.no_index {
        let config = Config::load(&root)?;
        let files = scan_files(&root, &config)?;
        if !index.is_indexed() {
            let _lock = lock_writer(&root)?;
            pb.set_message("Building index...");
            index.index(&files)?;
        } else if index.needs_update(&files) > 0 {
            let _lock = lock_writer(&root)?;
            pb.set_message("Updating index...");
            index.update(&files)?;
        }
    }

    pb.set_message("Searching...");
    let results = index.search_in(query, args.limit, &scope)?;
    let results = match args.threshold {
        Some(min_score) => filter_by_threshold(results, min_score),
        None => results,
    };
    pb.finish_and_clear();

    print_results(query, &results, args)
}

/// Literal or regex search straight over the files under the target path.
fn cmd_grep(query: &str, args: &SearchArgs) -> Result<bool> {
    let root = target_root(args.path.clone())?;
    let config = Config::load(&root).unwrap_or_else(|e| {
        tracing::warn!("Using default config: {}", e);
        Config::default()
    });

    let pattern = if args.regex {
        Pattern::regex(query)?
    } else {
        Pattern::exact(query)
    };

    let files = scan_files(&root, &config)?;
    let mut extractor = CodeExtractor::new(&config);
    let mut results = grep_blocks(&files, &pattern, &mut extractor);
    results.truncate(args.limit);

    print_results(query, &results, args)
}

/// Print results as JSON or highlighted text. Returns whether there were any.
fn print_results(query: &str, results: &[SearchResult], args: &SearchArgs) -> Result<bool> {
    if args.json {
        print_json(results, args.compact)?;
        return Ok(!results.is_empty());
    }

    if results.is_empty() {
        println!("No results found for: {}", query);
        return Ok(false);
    }

    let highlighter = SyntaxHighlighter::new();

    println!("Results for: {}\n", query);

    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result, &highlighter, args.compact);
    }

    Ok(true)
}

#[derive(Serialize)]
struct CompactResult<'a> {
    file: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
    start_line: usize,
    end_line: usize,
    score: f32,
}

fn print_json(results: &[SearchResult], compact: bool) -> Result<()> {
    let output = if compact {
        let compact: Vec<CompactResult> = results
            .iter()
            .map(|r| CompactResult {
                file: &r.file,
                kind: &r.kind,
                name: &r.name,
                start_line: r.start_line,
                end_line: r.end_line,
                score: r.score,
            })
            .collect();
        serde_json::to_string_pretty(&compact)?
    } else {
        serde_json::to_string_pretty(results)?
    };
    println!("{}", output);
    Ok(())
}

/// Pretty-print a search result with syntax highlighting.
fn print_result(index: usize, result: &SearchResult, highlighter: &SyntaxHighlighter, compact: bool) {
    let score_color = if result.score > 0.7 {
        "\x1b[32m" // Green for high scores
    } else if result.score > 0.5 {
        "\x1b[33m" // Yellow for medium scores
    } else {
        "\x1b[31m" // Red for low scores
    };

    // Header: index, score, file path, line range, block
    println!(
        "\x1b[1;36m[{}]\x1b[0m {}{:.3}\x1b[0m  \x1b[1m{}\x1b[0m:\x1b[33m{}-{}\x1b[0m  \x1b[2m{} {}\x1b[0m",
        index,
        score_color,
        result.score,
        result.file,
        result.start_line,
        result.end_line,
        result.kind,
        result.name,
    );

    if compact {
        return;
    }

    let extension = Path::new(&result.file)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("txt");

    let code = format_block(&result.content, result.start_line);
    println!("{}", highlighter.highlight(&code, extension));
    println!();
}

/// Number the block's lines, eliding the middle of long blocks.
fn format_block(text: &str, start_line: usize) -> String {
    const MAX_DISPLAY_LINES: usize = 12;
    const HEAD_LINES: usize = 5;
    const TAIL_LINES: usize = 3;

    let lines: Vec<&str> = text.lines().collect();
    let total_lines = lines.len();
    let mut result = String::new();

    if total_lines <= MAX_DISPLAY_LINES {
        for (i, line) in lines.iter().enumerate() {
            result.push_str(&format!("│ {:4} │ {}\n", start_line + i, line));
        }
    } else {
        // Head
        for (i, line) in lines[..HEAD_LINES].iter().enumerate() {
            result.push_str(&format!("│ {:4} │ {}\n", start_line + i, line));
        }
        // Ellipsis
        let hidden = total_lines - HEAD_LINES - TAIL_LINES;
        result.push_str(&format!(
            "\x1b[2m     ┊  ... {} more lines ...\x1b[0m\n",
            hidden
        ));
        // Tail
        for (i, line) in lines[total_lines - TAIL_LINES..].iter().enumerate() {
            let line_num = start_line + total_lines - TAIL_LINES + i;
            result.push_str(&format!("│ {:4} │ {}\n", line_num, line));
        }
    }
    result
}

/// Wrapper around syntect for syntax highlighting.
struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl SyntaxHighlighter {
    fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }

    fn highlight(&self, code: &str, extension: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_extension(extension)
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let Some(theme) = self.theme_set.themes.get("base16-ocean.dark") else {
            return code.to_string();
        };
        let mut highlighter = HighlightLines::new(syntax, theme);

        let mut output = String::new();
        for line in LinesWithEndings::from(code) {
            match highlighter.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => {
                    output.push_str(&as_24_bit_terminal_escaped(&ranges[..], false));
                }
                Err(_) => {
                    output.push_str(line);
                }
            }
        }
        output.push_str("\x1b[0m"); // Reset colors

        output
    }
}
