use ccdr::blocks::BlockList;
use ccdr::correlation::CorrelationMatrix;
use ccdr::estimate::CcdrError;
use ccdr::generative::{default_lambda_grid, random_dag, sample_sem};
use ccdr::graph::{GraphRecord, SparseDag};
use ccdr::linalg::utils::sample_correlation;
use ccdr::penalty::PenaltyKind;
use ccdr::solver::{RegularizationPath, grid_ccdr, single_ccdr};
use ccdr::types::{CcdrConfig, default_eps, default_gamma, default_max_iters};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use csv::{ReaderBuilder, WriterBuilder};
use rand::{SeedableRng, rngs::StdRng};
use std::fs;
use std::path::{Path, PathBuf};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (build ",
    env!("CCDR_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "ccdr")]
#[command(about = "Sparse DAG estimation by concave coordinate descent", long_about = None)]
#[command(version = VERSION)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve a decreasing sequence of penalty values with warm starts.
    Path(PathArgs),
    /// Solve a single penalty value.
    Single(SingleArgs),
    /// Simulate data from a random DAG and write its packed correlations.
    Simulate(SimulateArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PenaltyArg {
    Mcp,
    Scad,
    Lasso,
}

impl From<PenaltyArg> for PenaltyKind {
    fn from(arg: PenaltyArg) -> Self {
        match arg {
            PenaltyArg::Mcp => PenaltyKind::Mcp,
            PenaltyArg::Scad => PenaltyKind::Scad,
            PenaltyArg::Lasso => PenaltyKind::Lasso,
        }
    }
}

#[derive(Args, Debug)]
struct TuningArgs {
    #[arg(long, default_value_t = default_gamma())]
    gamma: f64,
    #[arg(long, default_value_t = default_eps())]
    eps: f64,
    #[arg(long = "max-iters", default_value_t = default_max_iters())]
    max_iters: usize,
    #[arg(long, default_value_t = 0.0)]
    alpha: f64,
    #[arg(long, value_enum, default_value_t = PenaltyArg::Mcp)]
    penalty: PenaltyArg,
    /// Reshuffle candidate blocks before every sweep after the first.
    #[arg(long)]
    shuffle: bool,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Stop the path once a solution has more than RATIO * P edges.
    #[arg(long = "max-edges-ratio")]
    max_edges_ratio: Option<f64>,
}

impl TuningArgs {
    fn to_config(&self) -> CcdrConfig {
        CcdrConfig {
            gamma: self.gamma,
            eps: self.eps,
            max_iters: self.max_iters,
            alpha: self.alpha,
            penalty: self.penalty.into(),
            shuffle_blocks: self.shuffle,
            seed: self.seed,
            max_edges_ratio: self.max_edges_ratio,
        }
    }
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Packed upper-triangular correlations, column by column.
    #[arg(long)]
    cors: PathBuf,
    /// Node count; inferred from the correlation file when omitted.
    #[arg(long)]
    nodes: Option<usize>,
    /// Sample size used to scale the penalty.
    #[arg(long)]
    nn: Option<usize>,
    /// Two-value file holding `P nn`.
    #[arg(long)]
    params: Option<PathBuf>,
    /// Initial graph as a JSON record.
    #[arg(long)]
    init: Option<PathBuf>,
    /// Flat `(row, col)` pairs; defaults to every pair ordered by correlation strength.
    #[arg(long)]
    blocks: Option<PathBuf>,
    #[arg(short, long)]
    out: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
    #[command(flatten)]
    tuning: TuningArgs,
}

#[derive(Args, Debug)]
struct PathArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Explicit penalty values; overrides --nlam/--lambda-ratio.
    #[arg(long)]
    lambdas: Option<PathBuf>,
    #[arg(long, default_value_t = 20)]
    nlam: usize,
    #[arg(long = "lambda-ratio", default_value_t = 1e-4)]
    lambda_ratio: f64,
}

#[derive(Args, Debug)]
struct SingleArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long)]
    lambda: f64,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[arg(long)]
    nodes: usize,
    #[arg(long)]
    edges: usize,
    #[arg(long, default_value_t = 1.0)]
    coef: f64,
    #[arg(long)]
    nn: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(short, long)]
    out: PathBuf,
    /// Also write `P nn` for use with --params.
    #[arg(long = "params-out")]
    params_out: Option<PathBuf>,
    /// Also write the generating graph as a JSON record.
    #[arg(long = "truth-out")]
    truth_out: Option<PathBuf>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Path(args) => run_path(args),
        Command::Single(args) => run_single(args),
        Command::Simulate(args) => run_simulate(args),
    }
}

struct Problem {
    cors: CorrelationMatrix,
    nn: usize,
    graph: SparseDag,
    init_sigmas: Vec<f64>,
    blocks: BlockList,
    config: CcdrConfig,
}

fn engine_err(e: CcdrError) -> String {
    e.to_string()
}

fn load_problem(input: &InputArgs) -> Result<Problem, String> {
    let packed = read_numbers(&input.cors)?;
    let (nodes, nn) = match &input.params {
        Some(path) => {
            let vals = read_numbers(path)?;
            if vals.len() < 2 {
                return Err(format!(
                    "params file '{}' must hold `P nn`, found {} values",
                    path.display(),
                    vals.len()
                ));
            }
            (
                Some(as_count(vals[0], "P")?),
                Some(as_count(vals[1], "nn")?),
            )
        }
        None => (input.nodes, input.nn),
    };
    let nn = nn.ok_or_else(|| "sample size missing: pass --nn or --params".to_string())?;
    let cors = match nodes {
        Some(p) => CorrelationMatrix::from_packed(&packed, p),
        None => CorrelationMatrix::from_packed_infer(&packed),
    }
    .map_err(engine_err)?;
    let p = cors.dim();

    let (graph, init_sigmas) = match &input.init {
        Some(path) => {
            let payload = fs::read_to_string(path)
                .map_err(|e| format!("failed to read initial graph '{}': {e}", path.display()))?;
            let record: GraphRecord = serde_json::from_str(&payload)
                .map_err(|e| format!("failed to parse initial graph json: {e}"))?;
            let graph = SparseDag::from_record(&record).map_err(|e| e.to_string())?;
            (graph, Vec::new())
        }
        None => (SparseDag::new(p), vec![-1.0; p]),
    };

    let blocks = match &input.blocks {
        Some(path) => {
            let flat = read_integers(path)?;
            BlockList::from_flat(&flat).map_err(|e| e.to_string())?
        }
        None => BlockList::from_node_order(&cors.node_order()).map_err(|e| e.to_string())?,
    };

    Ok(Problem {
        cors,
        nn,
        graph,
        init_sigmas,
        blocks,
        config: input.tuning.to_config(),
    })
}

fn run_path(args: PathArgs) -> Result<(), String> {
    let Problem {
        cors,
        nn,
        graph,
        init_sigmas,
        mut blocks,
        config,
    } = load_problem(&args.input)?;
    let lambdas = match &args.lambdas {
        Some(path) => read_numbers(path)?,
        None => default_lambda_grid(nn, args.lambda_ratio, args.nlam).map_err(engine_err)?,
    };
    let path = grid_ccdr(
        &cors,
        graph,
        &init_sigmas,
        nn,
        &lambdas,
        &config,
        args.input.verbose,
        &mut blocks,
    )
    .map_err(engine_err)?;

    print_path_summary(&path);
    write_json(args.input.out.as_deref(), &path.to_records())
}

fn run_single(args: SingleArgs) -> Result<(), String> {
    let Problem {
        cors,
        nn,
        graph,
        init_sigmas,
        mut blocks,
        config,
    } = load_problem(&args.input)?;
    let mut outcome = single_ccdr(
        &cors,
        graph,
        &init_sigmas,
        nn,
        args.lambda,
        &config,
        args.input.verbose,
        &mut blocks,
    )
    .map_err(engine_err)?;
    outcome.graph.recompute_active_set_size(true);
    eprintln!(
        "lambda {}: {} edges after {} sweeps{}",
        args.lambda,
        outcome.graph.active_set_size(),
        outcome.summary.sweeps,
        if outcome.summary.converged {
            ""
        } else {
            " (not converged)"
        }
    );
    write_json(args.input.out.as_deref(), &outcome.graph.to_record(args.lambda))
}

fn run_simulate(args: SimulateArgs) -> Result<(), String> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let truth = random_dag(args.nodes, args.edges, args.coef, &mut rng).map_err(engine_err)?;
    let data = sample_sem(&truth, args.nn, &mut rng).map_err(engine_err)?;
    let cors = sample_correlation(data.view()).map_err(engine_err)?;

    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(&args.out)
        .map_err(|e| format!("failed to create output '{}': {e}", args.out.display()))?;
    for v in cors.to_packed() {
        wtr.write_record([format!("{v:.12}")])
            .map_err(|e| format!("failed to write correlation value: {e}"))?;
    }
    wtr.flush()
        .map_err(|e| format!("failed to flush correlation writer: {e}"))?;

    if let Some(path) = &args.params_out {
        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .delimiter(b' ')
            .from_path(path)
            .map_err(|e| format!("failed to create params file '{}': {e}", path.display()))?;
        wtr.write_record([args.nodes.to_string(), args.nn.to_string()])
            .map_err(|e| format!("failed to write params: {e}"))?;
        wtr.flush()
            .map_err(|e| format!("failed to flush params writer: {e}"))?;
    }
    if let Some(path) = &args.truth_out {
        write_json(Some(path.as_path()), &truth.to_record(-1.0))?;
    }

    eprintln!(
        "simulated {} observations over {} nodes from a DAG with {} edges",
        args.nn,
        args.nodes,
        truth.active_set_size()
    );
    Ok(())
}

fn print_path_summary(path: &RegularizationPath) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["lambda", "edges", "sweeps", "max change", "converged"]);
    for (lambda, graph, summary) in path.iter() {
        table.add_row(Row::from(vec![
            Cell::new(format!("{lambda:.5}")),
            Cell::new(graph.active_set_size()),
            Cell::new(summary.sweeps),
            Cell::new(format!("{:.3e}", summary.max_change)),
            Cell::new(if summary.converged { "yes" } else { "no" }),
        ]));
    }
    println!("{table}");
    if path.stopped_early {
        println!("path stopped early: edge count exceeded --max-edges-ratio");
    }
}

fn write_json<T: serde::Serialize>(out: Option<&Path>, value: &T) -> Result<(), String> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|e| format!("failed to serialize output: {e}"))?;
    match out {
        Some(path) => fs::write(path, payload)
            .map_err(|e| format!("failed to write '{}': {e}", path.display())),
        None => {
            println!("{payload}");
            Ok(())
        }
    }
}

fn as_count(value: f64, what: &str) -> Result<usize, String> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(format!("{what} must be a non-negative integer, got {value}"))
    }
}

/// Every field in a headerless file, split on commas and whitespace.
fn read_fields(path: &Path) -> Result<Vec<String>, String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("failed to open '{}': {e}", path.display()))?;
    let mut fields = Vec::new();
    for rec in rdr.records() {
        let record = rec.map_err(|e| format!("failed reading '{}': {e}", path.display()))?;
        for field in record.iter() {
            fields.extend(field.split_whitespace().map(str::to_string));
        }
    }
    Ok(fields)
}

fn read_numbers(path: &Path) -> Result<Vec<f64>, String> {
    read_fields(path)?
        .iter()
        .map(|f| {
            f.parse::<f64>()
                .map_err(|e| format!("invalid number '{f}' in '{}': {e}", path.display()))
        })
        .collect()
}

fn read_integers(path: &Path) -> Result<Vec<i64>, String> {
    read_fields(path)?
        .iter()
        .map(|f| {
            f.parse::<i64>()
                .map_err(|e| format!("invalid integer '{f}' in '{}': {e}", path.display()))
        })
        .collect()
}
