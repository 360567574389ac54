use std::{
    io,
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    sync::Arc,
};

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use poolscope::{
    dashboard::{self, DashboardError, DEFAULT_PORT},
    explore::{
        BinPage, BinRequest, BlockTree, ErrorLogPage, ErrorLogRequest, NodeDetail, ObjectDescription, ObjectListRequest,
        ObjectPage, RangePage, RangeRequest, RecordFilter, ShapeSummary, SpaceMapHeader,
        SpaceMapSummary, TreeRequest,
    },
    provider::ImageError,
    types::{DatasetId, Namespace, ObjectId},
    ExplorerError, Outcome, PoolSession,
};
use serde::Serialize;
use thiserror::Error;

mod config;
mod ui;

use config::{CliConfig, ConfigError};
use ui::{Col, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "poolscope",
    version,
    about = "Bounded exploration of pool block trees and space maps"
)]
struct Cli {
    /// Pool image to open (JSON).
    #[arg(long, global = true, env = "POOLSCOPE_IMAGE", value_name = "FILE")]
    image: Option<PathBuf>,
    /// Config file (defaults to the per-user poolscope/config.toml).
    #[arg(long, global = true, env = "POOLSCOPE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
    #[arg(long, value_enum, default_value_t = ThemeArg::Auto, global = true)]
    theme: ThemeArg,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
    Plain,
}

impl From<ThemeArg> for Theme {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::Auto => Theme::Auto,
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Plain => Theme::Plain,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the pool name and request caps
    Pool,
    /// List objects in the metadata or a dataset namespace
    Objects(ObjectsCmd),
    /// Page through the persistent data-error log
    Errors(PageArgs),
    /// Describe one object
    Describe(DescribeCmd),
    /// Materialize an object's block-pointer tree
    Tree(TreeCmd),
    /// Space map views
    #[command(subcommand)]
    Spacemap(SpacemapCmd),
    /// Serve the dashboard API over HTTP
    Serve(ServeCmd),
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct ObjectsCmd {
    #[arg(long, value_name = "ID")]
    dataset: Option<u64>,
    #[arg(long)]
    cursor: Option<u64>,
    #[arg(long)]
    limit: Option<u64>,
    /// Only list objects with this type tag.
    #[arg(long = "type", value_name = "TAG")]
    type_tag: Option<u8>,
}

#[derive(Args, Debug)]
struct DescribeCmd {
    #[arg(value_name = "OBJECT")]
    object: u64,
    #[arg(long, value_name = "ID")]
    dataset: Option<u64>,
}

#[derive(Args, Debug)]
struct TreeCmd {
    #[arg(value_name = "OBJECT")]
    object: u64,
    #[arg(long, value_name = "ID")]
    dataset: Option<u64>,
    #[arg(long)]
    max_depth: Option<u64>,
    #[arg(long)]
    max_nodes: Option<u64>,
    /// Print every node instead of a per-level digest.
    #[arg(long)]
    nodes: bool,
}

#[derive(Subcommand, Debug)]
enum SpacemapCmd {
    /// Totals, txg span and length histogram
    Summary {
        #[arg(value_name = "OBJECT")]
        object: u64,
    },
    /// Page through individual records
    Ranges {
        #[arg(value_name = "OBJECT")]
        object: u64,
        #[command(flatten)]
        page: PageArgs,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Aggregate records into fixed-size offset bins
    Bins {
        #[arg(value_name = "OBJECT")]
        object: u64,
        #[arg(long, value_name = "BYTES")]
        bin_size: Option<u64>,
        #[command(flatten)]
        page: PageArgs,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long)]
    cursor: Option<u64>,
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// all, alloc or free.
    #[arg(long)]
    op: Option<String>,
    #[arg(long, value_name = "BYTES")]
    min_length: Option<u64>,
    #[arg(long)]
    txg_min: Option<u64>,
    #[arg(long)]
    txg_max: Option<u64>,
}

impl FilterArgs {
    fn filter(&self) -> Result<RecordFilter, ExplorerError> {
        RecordFilter::from_params(self.op.as_deref(), self.min_length, self.txg_min, self.txg_max)
    }
}

#[derive(Args, Debug)]
struct ServeCmd {
    #[arg(long)]
    host: Option<IpAddr>,
    #[arg(long)]
    port: Option<u16>,
    /// Extra CORS origin; repeatable.
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    allow_origins: Vec<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Dashboard(#[from] DashboardError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("no pool image given; pass --image or set `default` under [image] in {0}")]
    NoImage(String),
    #[error("{}: {}", .0.code().as_str(), .0.message())]
    Explore(ExplorerError),
    /// The failure envelope was already written to stdout.
    #[error("request failed")]
    Reported,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(CliError::Reported) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "poolscope", &mut io::stdout());
        return Ok(());
    }

    dashboard::install_tracing_subscriber();
    let config = CliConfig::load(cli.config.clone())?;
    let ui = Ui::new(cli.theme.into());
    let format = cli.format;
    let session = Arc::new(open_session(cli.image.as_ref(), &config)?);

    match cli.command {
        Command::Completions { .. } => Ok(()),
        Command::Pool => {
            let info = session.info();
            report(format, Ok(info), |info| {
                ui.fields(
                    &format!("Pool {}", info.name),
                    &[
                        ("tree depth max", info.tree_depth_max.to_string()),
                        ("tree nodes max", info.tree_nodes_max.to_string()),
                        ("range page max", info.ranges_limit_max.to_string()),
                        ("bin page max", info.bins_limit_max.to_string()),
                        (
                            "bin size",
                            format!("{}..={}", info.bin_size_min, info.bin_size_max),
                        ),
                        ("object page max", info.objects_limit_max.to_string()),
                        ("error page max", info.errors_limit_max.to_string()),
                    ],
                )
            })
        }
        Command::Objects(cmd) => {
            let result = namespace(cmd.dataset).and_then(|namespace| {
                session.objects(&ObjectListRequest {
                    namespace,
                    cursor: cmd.cursor,
                    limit: cmd.limit,
                    type_tag: cmd.type_tag,
                })
            });
            report(format, result, |page| print_objects(&ui, page))
        }
        Command::Errors(page) => {
            let result = session.errors(&ErrorLogRequest {
                cursor: page.cursor,
                limit: page.limit,
            });
            report(format, result, |page| print_errors(&ui, page))
        }
        Command::Describe(cmd) => {
            let result = namespace(cmd.dataset).and_then(|namespace| {
                session.describe(namespace, ObjectId::checked(cmd.object)?)
            });
            report(format, result, |desc| print_description(&ui, desc))
        }
        Command::Tree(cmd) => {
            let result = namespace(cmd.dataset).and_then(|namespace| {
                session.block_tree(&TreeRequest {
                    namespace,
                    object: ObjectId::checked(cmd.object)?,
                    max_depth: cmd.max_depth,
                    max_nodes: cmd.max_nodes,
                })
            });
            report(format, result, |tree| print_tree(&ui, tree, cmd.nodes))
        }
        Command::Spacemap(SpacemapCmd::Summary { object }) => {
            let result = ObjectId::checked(object).and_then(|id| session.spacemap_summary(id));
            report(format, result, |summary| print_summary(&ui, summary))
        }
        Command::Spacemap(SpacemapCmd::Ranges {
            object,
            page,
            filter,
        }) => {
            let result = ObjectId::checked(object).and_then(|object| {
                session.spacemap_ranges(&RangeRequest {
                    object,
                    cursor: page.cursor,
                    limit: page.limit,
                    filter: filter.filter()?,
                })
            });
            report(format, result, |page| print_ranges(&ui, page))
        }
        Command::Spacemap(SpacemapCmd::Bins {
            object,
            bin_size,
            page,
            filter,
        }) => {
            let result = ObjectId::checked(object).and_then(|object| {
                session.spacemap_bins(&BinRequest {
                    object,
                    bin_size,
                    cursor: page.cursor,
                    limit: page.limit,
                    filter: filter.filter()?,
                })
            });
            report(format, result, |page| print_bins(&ui, page))
        }
        Command::Serve(cmd) => {
            let host = cmd
                .host
                .or_else(|| config.host())
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
            let port = cmd.port.or_else(|| config.port()).unwrap_or(DEFAULT_PORT);
            let mut origins = config.allow_origins().to_vec();
            origins.extend(cmd.allow_origins);
            if format == OutputFormat::Text {
                ui.status(&format!(
                    "serving pool '{}' on http://{host}:{port}",
                    session.name()
                ));
            }
            dashboard::serve_session(session, host, port, &origins).await?;
            Ok(())
        }
    }
}

fn open_session(image: Option<&PathBuf>, config: &CliConfig) -> Result<PoolSession, CliError> {
    let path = image.or_else(|| config.default_image()).ok_or_else(|| {
        CliError::NoImage(
            config
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string()),
        )
    })?;
    Ok(PoolSession::open_image(path)?)
}

fn namespace(dataset: Option<u64>) -> Result<Namespace, ExplorerError> {
    dataset
        .map(DatasetId::checked)
        .transpose()
        .map(Namespace::from_dataset)
}

/// Prints the envelope in JSON mode, or the text rendering on success.
fn report<T, F>(
    format: OutputFormat,
    result: Result<T, ExplorerError>,
    printer: F,
) -> Result<(), CliError>
where
    T: Serialize,
    F: FnOnce(&T),
{
    match format {
        OutputFormat::Json => {
            let outcome = Outcome::from(result);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            match outcome {
                Outcome::Payload { .. } => Ok(()),
                Outcome::Failure { .. } => Err(CliError::Reported),
            }
        }
        OutputFormat::Text => match result {
            Ok(value) => {
                printer(&value);
                Ok(())
            }
            Err(err) => Err(CliError::Explore(err)),
        },
    }
}

fn print_objects(ui: &Ui, page: &ObjectPage) {
    let rows: Vec<Vec<String>> = page
        .objects
        .iter()
        .map(|entry| {
            vec![
                entry.object_id.to_string(),
                entry.type_tag.to_string(),
                entry.type_name.to_string(),
                entry.header_len.to_string(),
                or_dash(entry.levels),
            ]
        })
        .collect();
    let title = match page.dataset_id {
        Some(id) => format!("Objects in dataset {id}"),
        None => "Objects".to_string(),
    };
    ui.grid(
        &title,
        &[
            Col::Num("object"),
            Col::Num("type"),
            Col::Text("name"),
            Col::Num("bonus"),
            Col::Num("levels"),
        ],
        &rows,
    );
    ui.page_footer(page.count, page.next);
}

fn print_errors(ui: &Ui, page: &ErrorLogPage) {
    let rows: Vec<Vec<String>> = page
        .entries
        .iter()
        .map(|entry| {
            vec![
                format!("{:?}", entry.source).to_ascii_lowercase(),
                entry.dataset_obj.to_string(),
                entry.object.to_string(),
                entry.level.to_string(),
                entry.block_id.to_string(),
                or_dash(entry.birth_txg),
                entry.path.clone().unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    ui.grid(
        &format!("Persistent errors in pool {}", page.pool),
        &[
            Col::Text("log"),
            Col::Num("dataset"),
            Col::Num("object"),
            Col::Num("level"),
            Col::Num("blkid"),
            Col::Num("birth"),
            Col::Text("path"),
        ],
        &rows,
    );
    ui.page_footer(page.count, page.next);
}

fn print_description(ui: &Ui, desc: &ObjectDescription) {
    ui.fields(
        &format!("Object {}", desc.object_id),
        &[
            ("type", format!("{} ({})", desc.type_name, desc.type_tag)),
            ("bonus length", desc.header_len.to_string()),
            ("space map", desc.is_space_map.to_string()),
        ],
    );
    if let Some(shape) = &desc.shape {
        ui.gap();
        print_shape(ui, shape);
    }
}

fn print_shape(ui: &Ui, shape: &ShapeSummary) {
    ui.fields(
        "Shape",
        &[
            ("levels", shape.levels.to_string()),
            ("pointer slots", shape.pointer_slots.to_string()),
            ("indirect shift", shape.indirect_block_shift.to_string()),
            ("children/indirect", shape.children_per_indirect.to_string()),
            ("data block size", shape.data_block_size.to_string()),
            ("max block id", shape.max_block_id.to_string()),
            ("spill", shape.has_spill.to_string()),
        ],
    );
}

fn print_tree(ui: &Ui, tree: &BlockTree, every_node: bool) {
    ui.fields(
        &format!("Block tree of object {}", tree.object_id),
        &[
            ("nodes", tree.count.to_string()),
            ("max depth", tree.max_depth.to_string()),
            ("max nodes", tree.max_nodes.to_string()),
            ("truncated", tree.truncated.to_string()),
            ("depth limited", tree.depth_limited.to_string()),
            ("skipped children", tree.skipped_children.to_string()),
        ],
    );
    if let Some(NodeDetail::Root(root)) = tree.nodes.first().map(|node| &node.detail) {
        ui.gap();
        print_shape(ui, &root.shape);
    }

    ui.gap();
    if every_node {
        let rows: Vec<Vec<String>> = tree
            .nodes
            .iter()
            .filter_map(|node| match &node.detail {
                NodeDetail::Pointer(ptr) => Some(vec![
                    node.id.to_string(),
                    or_dash(node.parent_id),
                    ptr.depth.to_string(),
                    ptr.level.to_string(),
                    ptr.block_id.to_string(),
                    ptr.birth_txg.to_string(),
                    ptr.physical_size.to_string(),
                    pointer_flags(ptr.is_hole, ptr.is_embedded, ptr.is_gang),
                ]),
                NodeDetail::Root(_) => None,
            })
            .collect();
        ui.grid(
            "Pointers",
            &[
                Col::Num("id"),
                Col::Num("parent"),
                Col::Num("depth"),
                Col::Num("level"),
                Col::Num("blkid"),
                Col::Num("birth"),
                Col::Num("psize"),
                Col::Text("flags"),
            ],
            &rows,
        );
    } else {
        let mut per_depth: Vec<(u64, u64)> = Vec::new();
        for node in &tree.nodes {
            if let NodeDetail::Pointer(ptr) = &node.detail {
                match per_depth.iter_mut().find(|(depth, _)| *depth == ptr.depth) {
                    Some((_, count)) => *count += 1,
                    None => per_depth.push((ptr.depth, 1)),
                }
            }
        }
        per_depth.sort_unstable();
        let rows: Vec<Vec<String>> = per_depth
            .iter()
            .map(|(depth, count)| vec![depth.to_string(), count.to_string()])
            .collect();
        ui.grid(
            "Pointers per depth",
            &[Col::Num("depth"), Col::Num("pointers")],
            &rows,
        );
    }
    if tree.truncated {
        ui.alert("tree truncated; raise --max-depth or --max-nodes to see more");
    }
}

fn pointer_flags(hole: bool, embedded: bool, gang: bool) -> String {
    let flags: Vec<&str> = [(hole, "hole"), (embedded, "embedded"), (gang, "gang")]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join(",")
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn header_rows(header: &SpaceMapHeader) -> Vec<(&'static str, String)> {
    vec![
        ("start", header.start.to_string()),
        (
            "size",
            header.size.map_or_else(|| "unknown".into(), |s| s.to_string()),
        ),
        ("shift", header.shift.to_string()),
        ("log length", header.length.to_string()),
        ("allocated", header.allocated.to_string()),
    ]
}

fn print_summary(ui: &Ui, summary: &SpaceMapSummary) {
    let mut rows = header_rows(&summary.header);
    rows.extend([
        ("entries", summary.range_entries.to_string()),
        ("alloc entries", summary.alloc_entries.to_string()),
        ("free entries", summary.free_entries.to_string()),
        ("alloc bytes", summary.alloc_bytes.to_string()),
        ("free bytes", summary.free_bytes.to_string()),
        ("net bytes", summary.net_bytes.to_string()),
        ("txg span", txg_span(summary.txg.min(), summary.txg.max())),
    ]);
    ui.fields(&format!("Space map {}", summary.header.object_id), &rows);

    ui.gap();
    let rows: Vec<Vec<String>> = summary
        .histogram
        .iter()
        .map(|bucket| {
            vec![
                bucket.bucket.to_string(),
                bucket.min_length.to_string(),
                or_dash(bucket.max_length),
                bucket.alloc_count.to_string(),
                bucket.free_count.to_string(),
            ]
        })
        .collect();
    ui.grid(
        "Length histogram",
        &[
            Col::Num("bucket"),
            Col::Num("min"),
            Col::Num("max"),
            Col::Num("alloc"),
            Col::Num("free"),
        ],
        &rows,
    );
}

fn txg_span(min: Option<u64>, max: Option<u64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{min}..={max}"),
        _ => "-".to_string(),
    }
}

fn print_ranges(ui: &Ui, page: &RangePage) {
    let rows: Vec<Vec<String>> = page
        .ranges
        .iter()
        .map(|entry| {
            vec![
                entry.index.to_string(),
                entry.position.to_string(),
                format!("{:?}", entry.op).to_ascii_lowercase(),
                entry.offset.to_string(),
                entry.length.to_string(),
                or_dash(entry.txg),
                or_dash(entry.device_id),
            ]
        })
        .collect();
    ui.grid(
        &format!("Space map {} records (op {})", page.header.object_id, page.filter.op),
        &[
            Col::Num("index"),
            Col::Num("pos"),
            Col::Op("op"),
            Col::Num("offset"),
            Col::Num("length"),
            Col::Num("txg"),
            Col::Num("vdev"),
        ],
        &rows,
    );
    ui.page_footer(page.count, page.next);
}

fn print_bins(ui: &Ui, page: &BinPage) {
    let rows: Vec<Vec<String>> = page
        .bins
        .iter()
        .map(|bin| {
            vec![
                bin.index.to_string(),
                bin.offset.to_string(),
                bin.length.to_string(),
                bin.alloc_bytes.to_string(),
                bin.free_bytes.to_string(),
                bin.alloc_ops.to_string(),
                bin.free_ops.to_string(),
                txg_span(bin.txg.min(), bin.txg.max()),
            ]
        })
        .collect();
    let total = page
        .total_bins
        .map_or_else(|| "unknown".to_string(), |t| t.to_string());
    ui.grid(
        &format!(
            "Space map {} bins of {} bytes ({total} total)",
            page.header.object_id, page.bin_size
        ),
        &[
            Col::Num("bin"),
            Col::Num("offset"),
            Col::Num("length"),
            Col::Num("alloc"),
            Col::Num("free"),
            Col::Num("allocs"),
            Col::Num("frees"),
            Col::Num("txg"),
        ],
        &rows,
    );
    ui.page_footer(page.count, page.next);
}
