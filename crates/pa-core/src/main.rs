//! patest - preferential-attachment stream analysis
//!
//! The entry point handles:
//! - Fused runs: edge stream in, ranks out
//! - Event log generation and offline rank replay
//! - Balance replay, from balance changes or transaction tables
//! - Degree and balance distribution snapshots
//! - Configuration inspection

use clap::{Args, Parser, Subcommand};
use pa_common::{Error, OutputFormat, Result};
use pa_core::balances::{
    run_balances, write_changes, BalanceHistogramSink, BalanceLineSink, BalanceReader,
    BalanceReplay, BalanceSink, BalanceSource, BalanceSplitSink, TxBalanceSource,
};
use pa_core::config::{load_config, AnalysisConfig, ConfigOptions, ConfigOverrides, Window};
use pa_core::exit_codes::ExitCode;
use pa_core::input::{
    read_links, BinaryEdgeReader, EdgeSource, EventLogReader, NodeIndex, TableReader,
    TextEdgeReader, TxSide, TxTableReader, TxTimeReader,
};
use pa_core::log_event;
use pa_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use pa_core::replay::{run_replay, RankReplay};
use pa_core::sink::{line_sink, Columns, EventSink, HistogramSink, SplitRankSink};
use pa_core::snapshot::{
    run_balance_snapshots, run_degree_snapshots, DegreeSnapshots, SnapshotWriter,
};
use pa_core::stream::{run_stream, EdgeStreamProcessor, ProcessorOptions};
use pa_heap::EdgeStore;
use pa_tree::{build_index, Allocator, TreeVariant};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

const READ_BUFFER: usize = 1 << 16;

/// Preferential-attachment tests over time-ordered transaction graphs
#[derive(Parser)]
#[command(name = "patest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "PA_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process an edge stream and write the rank of every attachment
    Run(RunArgs),

    /// Process an edge stream and write the event log
    Generate(GenerateArgs),

    /// Compute ranks from an event log
    Ranks(RanksArgs),

    /// Compute balance ranks from balance changes or transaction tables
    Balances(BalancesArgs),

    /// Write degree distributions of an event log at regular intervals
    Degrees(DegreesArgs),

    /// Write address balance distributions at regular intervals
    BalanceDists(BalanceDistsArgs),

    /// Print the resolved configuration
    Config(ConfigArgs),
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct StreamArgs {
    /// Edge stream file; stdin when omitted or '-'
    input: Option<PathBuf>,

    /// Input is 12-byte little-endian (source, target, timestamp) records
    #[arg(long)]
    binary: bool,

    /// Node ids file; without it node indices are assigned on first sight
    #[arg(long)]
    ids: Option<PathBuf>,

    /// Links file listing every (source, target) pair of the stream
    #[arg(long)]
    links: Option<PathBuf>,

    /// Read contract flags from the ids file and emit them with events
    #[arg(long)]
    contracts: bool,

    /// Retention window (e.g. 30d, 2w, 3600); 0 never expires
    #[arg(short, long)]
    window: Option<Window>,

    /// Accept records whose timestamp is below the previous one
    #[arg(long)]
    lenient_order: bool,

    /// Abort on node ids that do not fit 32 bits instead of skipping them
    #[arg(long)]
    strict_ids: bool,

    /// Eviction heap growth step, in entries
    #[arg(long)]
    heap_chunk: Option<usize>,
}

#[derive(Args, Debug)]
struct RankOpts {
    /// Weight exponent; repeat or comma-separate for several
    #[arg(short = 'a', long = "exponent", value_delimiter = ',')]
    exponents: Vec<f64>,

    /// Rank tree semantics
    #[arg(long, value_enum)]
    variant: Option<TreeVariant>,

    /// Rank tree node allocator
    #[arg(long, value_enum)]
    allocator: Option<Allocator>,

    /// Write ranks to per-exponent files named <BASE>-<a>-<kind>.dat
    #[arg(long, value_name = "BASE")]
    split: Option<PathBuf>,

    /// Write rank histograms with this bin width instead of raw ranks
    #[arg(long)]
    bin_width: Option<f64>,

    /// Flush histograms every period of stream time (e.g. 1d)
    #[arg(long)]
    every: Option<Window>,
}

#[derive(Args, Debug)]
struct OutputOpts {
    /// Output format on stdout
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Records between progress log lines; 0 disables them
    #[arg(long)]
    progress: Option<u64>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    stream: StreamArgs,

    #[command(flatten)]
    ranks: RankOpts,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    stream: StreamArgs,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Args, Debug)]
struct RanksArgs {
    /// Event log file; stdin when omitted or '-'
    input: Option<PathBuf>,

    #[command(flatten)]
    ranks: RankOpts,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Args, Debug)]
struct BalancesArgs {
    /// Balance change file (old new [txid]); stdin when omitted or '-'
    #[arg(conflicts_with = "txout")]
    input: Option<PathBuf>,

    /// Transaction outputs table (txid seq address value) to derive changes from
    #[arg(long)]
    txout: Option<PathBuf>,

    /// Transaction inputs table (txid seq prev_txid prev_seq address value)
    #[arg(long, requires = "txout")]
    txin: Option<PathBuf>,

    /// Forget addresses whose balance a debit brings back to zero
    #[arg(long)]
    forget_zero: bool,

    /// Write the derived balance changes instead of ranks
    #[arg(long, requires = "txout")]
    generate: bool,

    /// Only balances above this value enter the distribution
    #[arg(long)]
    threshold: Option<i64>,

    /// Balance value to leave out of the distribution; repeatable
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<i64>,

    /// Weight exponent; repeat or comma-separate for several
    #[arg(short = 'a', long = "exponent", value_delimiter = ',')]
    exponents: Vec<f64>,

    /// Rank tree semantics
    #[arg(long, value_enum)]
    variant: Option<TreeVariant>,

    /// Rank tree node allocator
    #[arg(long, value_enum)]
    allocator: Option<Allocator>,

    /// Write ranks to per-exponent files named <BASE>-<a>.dat
    #[arg(long, value_name = "BASE")]
    split: Option<PathBuf>,

    /// Write rank histograms, by count and by credited amount, with this bin width
    #[arg(long)]
    bin_width: Option<f64>,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Args, Debug)]
struct DegreesArgs {
    /// Event log file; stdin when omitted or '-'
    input: Option<PathBuf>,

    /// Stream time between snapshots (e.g. 1y, 30d)
    #[arg(short, long)]
    interval: Option<Window>,

    /// Timestamp of the first snapshot
    #[arg(short, long)]
    start: Option<u32>,

    /// Accept event logs whose timestamps go backwards
    #[arg(long)]
    unsorted: bool,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Args, Debug)]
struct BalanceDistsArgs {
    /// Transaction outputs table (txid seq address value)
    #[arg(long)]
    txout: PathBuf,

    /// Transaction inputs table; without it balances only grow
    #[arg(long)]
    txin: Option<PathBuf>,

    /// Transaction timestamps table (txid timestamp)
    #[arg(long)]
    times: PathBuf,

    /// Stream time between snapshots (e.g. 1y, 30d)
    #[arg(short, long)]
    interval: Option<Window>,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(flatten)]
    stream: StreamArgs,

    #[command(flatten)]
    ranks: RankOpts,

    #[command(flatten)]
    output: OutputOpts,
}

// ============================================================================
// Override plumbing
// ============================================================================

impl StreamArgs {
    fn apply(&self, o: &mut ConfigOverrides) {
        o.window = self.window;
        o.heap_chunk = self.heap_chunk;
        if self.contracts {
            o.contracts = Some(true);
        }
        if self.lenient_order {
            o.strict_order = Some(false);
        }
        if self.strict_ids {
            o.ignore_invalid_ids = Some(false);
        }
    }
}

impl RankOpts {
    fn apply(&self, o: &mut ConfigOverrides) {
        if !self.exponents.is_empty() {
            o.exponents = Some(self.exponents.clone());
        }
        o.variant = self.variant;
        o.allocator = self.allocator;
        o.split = self.split.clone();
        o.histogram_bin_width = self.bin_width;
        o.histogram_every = self.every;
    }
}

impl OutputOpts {
    fn apply(&self, o: &mut ConfigOverrides) {
        o.output_format = self.format;
        o.progress_every = self.progress;
    }
}

impl Commands {
    fn overrides(&self) -> ConfigOverrides {
        let mut o = ConfigOverrides::default();
        match self {
            Commands::Run(args) => {
                args.stream.apply(&mut o);
                args.ranks.apply(&mut o);
                args.output.apply(&mut o);
            }
            Commands::Generate(args) => {
                args.stream.apply(&mut o);
                args.output.apply(&mut o);
            }
            Commands::Ranks(args) => {
                args.ranks.apply(&mut o);
                args.output.apply(&mut o);
            }
            Commands::Balances(args) => {
                if !args.exponents.is_empty() {
                    o.exponents = Some(args.exponents.clone());
                }
                o.variant = args.variant;
                o.allocator = args.allocator;
                o.split = args.split.clone();
                o.threshold = args.threshold;
                if !args.exclude.is_empty() {
                    o.exclude = Some(args.exclude.clone());
                }
                if args.forget_zero {
                    o.forget_zero = Some(true);
                }
                o.histogram_bin_width = args.bin_width;
                args.output.apply(&mut o);
            }
            Commands::Degrees(args) => {
                o.snapshot_interval = args.interval;
                o.snapshot_start = args.start;
                if args.unsorted {
                    o.require_sorted = Some(false);
                }
                args.output.apply(&mut o);
            }
            Commands::BalanceDists(args) => {
                o.snapshot_interval = args.interval;
                args.output.apply(&mut o);
            }
            Commands::Config(args) => {
                args.stream.apply(&mut o);
                args.ranks.apply(&mut o);
                args.output.apply(&mut o);
            }
        }
        o
    }

    fn name(&self) -> &'static str {
        match self {
            Commands::Run(_) => "run",
            Commands::Generate(_) => "generate",
            Commands::Ranks(_) => "ranks",
            Commands::Balances(_) => "balances",
            Commands::Degrees(_) => "degrees",
            Commands::BalanceDists(_) => "balance-dists",
            Commands::Config(_) => "config",
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            std::process::exit(code.as_i32());
        }
    };

    let level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(level, cli.global.log_format));

    let ctx = LogContext::new(generate_run_id());
    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "starting",
        command = cli.command.name(),
        version = env!("CARGO_PKG_VERSION")
    );

    let exit_code = match execute(&cli, &ctx) {
        Ok(()) => {
            log_event!(ctx, INFO, event_names::RUN_FINISHED, Stage::Output, "done");
            ExitCode::Clean
        }
        Err(err) => {
            let code = ExitCode::from_error(&err);
            log_event!(
                ctx,
                ERROR,
                event_names::RUN_FAILED,
                Stage::Output,
                "run failed",
                error_code = err.code(),
                kind = err.kind_name(),
                exit_code = code.as_i32()
            );
            eprintln!("error[{}] {}: {}", err.code(), err.kind_name(), err);
            eprintln!("  Fix: {}", err.remediation());
            code
        }
    };

    std::process::exit(exit_code.as_i32());
}

fn execute(cli: &Cli, ctx: &LogContext) -> Result<()> {
    let options = ConfigOptions {
        config_path: cli.global.config.clone(),
        overrides: cli.command.overrides(),
    };
    let resolved = load_config(&options)?;
    let source = resolved
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<defaults>".to_string());
    log_event!(
        ctx,
        INFO,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "configuration resolved",
        path = source.as_str(),
        window = resolved.config.window.seconds(),
        exponents = resolved.config.exponents.len() as u64
    );
    let cfg = &resolved.config;

    match &cli.command {
        Commands::Run(args) => run_edges(cfg, &args.stream, true, ctx),
        Commands::Generate(args) => run_edges(cfg, &args.stream, false, ctx),
        Commands::Ranks(args) => run_ranks(cfg, args.input.as_deref(), ctx),
        Commands::Balances(args) => run_balance_replay(cfg, args, ctx),
        Commands::Degrees(args) => run_degrees(cfg, args.input.as_deref(), ctx),
        Commands::BalanceDists(args) => run_balance_dists(cfg, args, ctx),
        Commands::Config(_) => {
            let text = toml::to_string_pretty(cfg)
                .map_err(|e| Error::Config(format!("cannot render configuration: {}", e)))?;
            print!("{}", text);
            Ok(())
        }
    }
}

// ============================================================================
// Command implementations
// ============================================================================

fn open_input(path: Option<&Path>) -> Result<(Box<dyn BufRead>, String)> {
    match path {
        Some(p) if p != Path::new("-") => {
            let file = File::open(p).map_err(|e| {
                Error::Io(io::Error::new(e.kind(), format!("{}: {}", p.display(), e)))
            })?;
            Ok((
                Box::new(BufReader::with_capacity(READ_BUFFER, file)),
                p.display().to_string(),
            ))
        }
        _ => Ok((Box::new(io::stdin().lock()), "<stdin>".to_string())),
    }
}

fn open_table(path: Option<&Path>) -> Result<TableReader<Box<dyn BufRead>>> {
    let (reader, name) = open_input(path)?;
    Ok(TableReader::new(reader).with_source(name))
}

fn stdout() -> BufWriter<io::StdoutLock<'static>> {
    BufWriter::with_capacity(READ_BUFFER, io::stdout().lock())
}

/// Sink for rank output: per-exponent files when a split base is set,
/// stdout otherwise.
fn rank_sink(cfg: &AnalysisConfig) -> Result<Box<dyn EventSink>> {
    match (&cfg.output.split, &cfg.histogram) {
        (Some(base), Some(hist)) => Ok(Box::new(HistogramSink::create(
            base,
            &cfg.exponents,
            hist.bin_width,
            hist.every.seconds(),
        )?)),
        (Some(base), None) => Ok(Box::new(SplitRankSink::create(base, &cfg.exponents)?)),
        (None, _) => {
            let columns = if cfg.exponents.is_empty() {
                Columns::Unweighted
            } else {
                Columns::Weighted
            };
            Ok(line_sink(stdout(), cfg.output.format, columns))
        }
    }
}

/// Finish the sink on success; on failure only flush what is complete.
fn close_sink<T>(sink: &mut dyn EventSink, result: Result<T>, ctx: &LogContext) -> Result<T> {
    match result {
        Ok(value) => {
            sink.finish()?;
            log_event!(ctx, DEBUG, event_names::OUTPUT_FLUSHED, Stage::Output, "output flushed");
            Ok(value)
        }
        Err(err) => {
            let _ = sink.flush();
            Err(err)
        }
    }
}

fn load_nodes(cfg: &AnalysisConfig, ids: Option<&Path>, ctx: &LogContext) -> Result<NodeIndex> {
    let Some(path) = ids else {
        return Ok(NodeIndex::dynamic());
    };
    let mut table = open_table(Some(path))?;
    let nodes = NodeIndex::read_ids(&mut table, cfg.contracts)?;
    log_event!(
        ctx,
        INFO,
        event_names::IDS_LOADED,
        Stage::Load,
        "node ids loaded",
        nodes = nodes.len() as u64,
        contracts = nodes.has_contracts()
    );
    Ok(nodes)
}

fn run_edges(cfg: &AnalysisConfig, args: &StreamArgs, with_ranks: bool, ctx: &LogContext) -> Result<()> {
    let mut nodes = load_nodes(cfg, args.ids.as_deref(), ctx)?;
    let edges = match &args.links {
        Some(path) => {
            let store = read_links(&mut open_table(Some(path))?, &mut nodes)?;
            log_event!(
                ctx,
                INFO,
                event_names::LINKS_LOADED,
                Stage::Load,
                "link table loaded",
                links = store.len() as u64
            );
            store
        }
        None => EdgeStore::new(),
    };

    let ranks = with_ranks.then(|| build_index::<u32>(cfg.variant, cfg.allocator, &cfg.exponents));
    let mut processor = EdgeStreamProcessor::new(ProcessorOptions::from(cfg), nodes, edges, ranks)?;

    let mut source: Box<dyn EdgeSource> = if args.binary {
        let (reader, name): (Box<dyn Read>, String) = match args.input.as_deref() {
            Some(p) if p != Path::new("-") => {
                let (r, n) = open_input(Some(p))?;
                (Box::new(r), n)
            }
            _ => (Box::new(io::stdin().lock()), "<stdin>".to_string()),
        };
        Box::new(BinaryEdgeReader::new(reader).with_source(name))
    } else {
        Box::new(TextEdgeReader::new(
            open_table(args.input.as_deref())?,
            cfg.ignore_invalid_ids,
        ))
    };

    let mut sink = if with_ranks {
        rank_sink(cfg)?
    } else {
        line_sink(stdout(), cfg.output.format, Columns::Events)
    };
    let result = run_stream(
        &mut processor,
        source.as_mut(),
        sink.as_mut(),
        cfg.progress_every,
        ctx,
    );
    close_sink(sink.as_mut(), result, ctx).map(|_| ())
}

fn run_ranks(cfg: &AnalysisConfig, input: Option<&Path>, ctx: &LogContext) -> Result<()> {
    let mut log = EventLogReader::new(open_table(input)?);
    let mut replay = RankReplay::new(build_index::<u32>(cfg.variant, cfg.allocator, &cfg.exponents));
    let mut sink = rank_sink(cfg)?;
    let result = run_replay(&mut replay, &mut log, sink.as_mut(), cfg.progress_every, ctx);
    close_sink(sink.as_mut(), result, ctx).map(|_| ())
}

fn is_stdin(path: Option<&Path>) -> bool {
    path.map_or(true, |p| p == Path::new("-"))
}

/// Balance changes merged from the transaction tables.
fn tx_source(
    txout: &Path,
    txin: Option<&Path>,
    forget_zero: bool,
) -> Result<TxBalanceSource<Box<dyn BufRead>>> {
    if is_stdin(Some(txout)) && txin.is_some_and(|p| is_stdin(Some(p))) {
        return Err(Error::Config(
            "only one transaction table can be read from stdin".to_string(),
        ));
    }
    let outputs = TxTableReader::new(open_table(Some(txout))?, TxSide::Output);
    let inputs = match txin {
        Some(p) => Some(TxTableReader::new(open_table(Some(p))?, TxSide::Input)),
        None => None,
    };
    TxBalanceSource::new(outputs, inputs, forget_zero)
}

fn run_balance_replay(cfg: &AnalysisConfig, args: &BalancesArgs, ctx: &LogContext) -> Result<()> {
    let mut source: Box<dyn BalanceSource> = match &args.txout {
        Some(txout) => Box::new(tx_source(
            txout,
            args.txin.as_deref(),
            cfg.balances.forget_zero,
        )?),
        None => Box::new(BalanceReader::new(open_table(args.input.as_deref())?)),
    };
    if args.generate {
        let written = write_changes(source.as_mut(), &mut stdout(), cfg.output.format)?;
        log_event!(
            ctx,
            DEBUG,
            event_names::OUTPUT_FLUSHED,
            Stage::Output,
            "balance changes written",
            records = written
        );
        return Ok(());
    }

    let index = build_index::<i64>(cfg.variant, cfg.allocator, &cfg.exponents);
    let mut replay = BalanceReplay::new(
        index,
        cfg.balances.threshold,
        cfg.balances.exclude.clone(),
    )?;
    let mut sink: Box<dyn BalanceSink> = match (&cfg.output.split, &cfg.histogram) {
        (Some(base), Some(hist)) => {
            if !hist.every.is_unbounded() {
                return Err(Error::Config(
                    "balance histograms are written once at the end; unset histogram.every"
                        .to_string(),
                ));
            }
            Box::new(BalanceHistogramSink::create(base, &cfg.exponents, hist.bin_width)?)
        }
        (Some(base), None) => Box::new(BalanceSplitSink::create(base, &cfg.exponents)?),
        (None, _) => Box::new(BalanceLineSink::new(
            stdout(),
            cfg.output.format,
            !cfg.exponents.is_empty(),
        )),
    };
    match run_balances(&mut replay, source.as_mut(), sink.as_mut(), cfg.progress_every, ctx) {
        Ok(_) => {
            sink.finish()?;
            log_event!(ctx, DEBUG, event_names::OUTPUT_FLUSHED, Stage::Output, "output flushed");
            Ok(())
        }
        Err(err) => {
            let _ = sink.flush();
            Err(err)
        }
    }
}

fn run_degrees(cfg: &AnalysisConfig, input: Option<&Path>, ctx: &LogContext) -> Result<()> {
    let mut log = EventLogReader::new(open_table(input)?);
    let mut snapshots = DegreeSnapshots::new(&cfg.snapshots)?;
    let mut out = SnapshotWriter::new(stdout(), cfg.output.format);
    let result = run_degree_snapshots(&mut snapshots, &mut log, &mut out, cfg.progress_every, ctx);
    if result.is_err() {
        let _ = out.flush();
    }
    result.map(|_| ())
}

fn run_balance_dists(cfg: &AnalysisConfig, args: &BalanceDistsArgs, ctx: &LogContext) -> Result<()> {
    let tables = [Some(args.txout.as_path()), args.txin.as_deref(), Some(args.times.as_path())];
    if tables.into_iter().flatten().filter(|&p| is_stdin(Some(p))).count() > 1 {
        return Err(Error::Config(
            "only one transaction table can be read from stdin".to_string(),
        ));
    }
    let mut source = tx_source(&args.txout, args.txin.as_deref(), true)?;
    let mut times = TxTimeReader::new(open_table(Some(args.times.as_path()))?);
    let mut out = SnapshotWriter::new(stdout(), cfg.output.format);
    let result = run_balance_snapshots(
        &mut source,
        &mut times,
        cfg.snapshots.interval.seconds(),
        &mut out,
        cfg.progress_every,
        ctx,
    );
    if result.is_err() {
        let _ = out.flush();
    }
    result.map(|_| ())
}
