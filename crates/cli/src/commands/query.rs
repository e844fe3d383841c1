use std::sync::Arc;
use std::time::Instant;

use owo_colors::OwoColorize;
use serde::Serialize;
use sluice_common::config::{AppConfig, ExecutionSettings};
use sluice_common::warnings::{collect_warnings, collect_warnings_sync};
use sluice_connectors::SqliteSource;
use sluice_runner::{
    CallArgs, CompiledQuery, IdentityOptimizer, ParameterAccessor, ParameterId, ProviderFlags,
    QueryPlan, RowLimit, RowMapper, SubQuery, Value,
};
use tokio_util::sync::CancellationToken;

use crate::output::{self, OutputFormat};

#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    /// Path to the SQLite database file
    #[arg(long)]
    pub db: String,

    /// Statement to run. `?` placeholders are bound from `--arg` in order
    #[arg(long)]
    pub sql: String,

    /// Positional argument value (int, float, true/false, null, or text)
    #[arg(long = "arg", value_name = "VALUE")]
    pub args: Vec<String>,

    /// Rows to skip before the first returned row
    #[arg(long, allow_negative_numbers = true)]
    pub skip: Option<i64>,

    /// Maximum number of rows to return
    #[arg(long, allow_negative_numbers = true)]
    pub take: Option<i64>,

    /// Page in memory instead of rendering LIMIT/OFFSET into the statement
    #[arg(long, default_value_t = false)]
    pub emulate: bool,

    /// Push rows through the async driver. Ctrl-C cancels between rows
    #[arg(long = "async", default_value_t = false)]
    pub use_async: bool,
}

#[derive(Serialize, Default)]
pub struct QueryReport {
    pub rows: Vec<Vec<Value>>,
    pub row_count: u64,
    pub mapper_mode: String,
    pub paging: String,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A plan ready to compile, with the arguments it reads.
pub(crate) struct Prepared {
    pub plan: QueryPlan,
    pub args: CallArgs,
    pub flags: ProviderFlags,
}

/// Parses a command-line argument into the narrowest matching value.
pub(crate) fn parse_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Int(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return Value::Float(float);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Text(raw.to_string()),
    }
}

/// Builds the plan for `args`.
///
/// User arguments occupy call positions `0..n` and placeholders `p0..pn`.
/// Skip and take follow them as extra call arguments. When the source pages
/// natively the statement is wrapped in `LIMIT ? OFFSET ?` bound from those
/// arguments; otherwise both are emulated so they never split across the
/// backend and the runner.
pub(crate) fn prepare(args: &QueryArgs, flags: ProviderFlags) -> Prepared {
    let mut values: Vec<Value> = args.args.iter().map(|raw| parse_value(raw)).collect();
    let user_args = values.len();

    let mut placeholders: Vec<ParameterId> = (0..user_args)
        .map(|i| ParameterId::new(format!("p{}", i)))
        .collect();
    let mut parameters: Vec<(ParameterId, ParameterAccessor)> = placeholders
        .iter()
        .enumerate()
        .map(|(i, p)| (p.clone(), ParameterAccessor::argument(i)))
        .collect();

    let mut push_count = |name: &str, count: Option<i64>| {
        count.map(|n| {
            let id = ParameterId::new(name);
            parameters.push((id.clone(), ParameterAccessor::argument(values.len())));
            values.push(Value::Int(n.max(0)));
            id
        })
    };
    let skip = push_count("skip", args.skip);
    let take = push_count("take", args.take);

    let paged = skip.is_some() || take.is_some();
    let native = flags.skip_supported && flags.take_supported;
    let base = args.sql.trim().trim_end_matches(';').trim_end();

    let (statement, flags) = if paged && native {
        let mut statement = format!("SELECT * FROM ({})", base);
        match &take {
            Some(id) => {
                statement.push_str(" LIMIT ?");
                placeholders.push(id.clone());
            }
            None => statement.push_str(" LIMIT -1"),
        }
        if let Some(id) = &skip {
            statement.push_str(" OFFSET ?");
            placeholders.push(id.clone());
        }
        (statement, flags)
    } else if paged {
        (base.to_string(), ProviderFlags::emulated())
    } else {
        (base.to_string(), flags)
    };

    let mut query = SubQuery::new(statement).with_placeholders(placeholders);
    for (id, accessor) in parameters {
        query = query.with_parameter(id, accessor);
    }
    if let Some(id) = skip {
        query = query.with_skip(RowLimit::Parameter(id));
    }
    if let Some(id) = take {
        query = query.with_take(RowLimit::Parameter(id));
    }

    Prepared {
        plan: QueryPlan::from_query(query),
        args: CallArgs::new(values),
        flags,
    }
}

fn effective_settings(args: &QueryArgs, config: &AppConfig) -> ExecutionSettings {
    let mut settings = config.execution.clone();
    if args.emulate {
        settings.emulate_skip = true;
        settings.emulate_take = true;
    }
    settings
}

/// Rows either stream straight to stdout (human) or are kept for the report.
struct RowSink {
    format: OutputFormat,
    rows: Vec<Vec<Value>>,
    count: u64,
}

impl RowSink {
    fn new(format: OutputFormat) -> Self {
        Self {
            format,
            rows: Vec::new(),
            count: 0,
        }
    }

    fn push(&mut self, row: Vec<Value>) {
        self.count += 1;
        if self.format.is_machine_readable() {
            self.rows.push(row);
        } else {
            println!("{}", output::format_row(&row));
        }
    }
}

pub async fn run_query(
    args: &QueryArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let settings = effective_settings(args, config);
    let source = SqliteSource::new("sqlite", args.db.clone()).with_settings(&settings);
    let prepared = prepare(args, source.capabilities());

    let query = Arc::new(CompiledQuery::compile_with_settings(
        prepared.plan,
        &IdentityOptimizer,
        &prepared.flags,
        RowMapper::<Vec<Value>>::for_row(),
        &settings,
    )?);
    let paging = if query.paging().is_active() {
        "emulated"
    } else if args.skip.is_some() || args.take.is_some() {
        "native"
    } else {
        "none"
    };

    let started = Instant::now();
    let (outcome, warnings) = if args.use_async {
        run_async(&query, &source, prepared.args, format).await
    } else {
        run_sync(Arc::clone(&query), source, prepared.args, format).await?
    };
    let elapsed = started.elapsed();

    if !format.is_machine_readable() {
        output::print_warnings(&warnings);
    }
    let sink = outcome?;

    let report = QueryReport {
        rows: sink.rows,
        row_count: sink.count,
        mapper_mode: query.mapper().mode().to_string(),
        paging: paging.to_string(),
        elapsed_ms: elapsed.as_millis() as u64,
        warnings,
    };

    if format.is_machine_readable() {
        output::print_success(format, report)?;
    } else {
        eprintln!(
            "{} {} rows in {} ms (mapper: {}, paging: {})",
            "✔".green(),
            report.row_count,
            report.elapsed_ms,
            report.mapper_mode,
            report.paging
        );
    }
    Ok(())
}

type Outcome = (sluice_error::Result<RowSink>, Vec<String>);

/// Iterates the lazy sequence on a blocking thread.
async fn run_sync(
    query: Arc<CompiledQuery<Vec<Value>>>,
    source: SqliteSource,
    args: CallArgs,
    format: OutputFormat,
) -> anyhow::Result<Outcome> {
    let outcome = tokio::task::spawn_blocking(move || {
        collect_warnings_sync(|| -> sluice_error::Result<RowSink> {
            let mut sink = RowSink::new(format);
            for row in query.execute(&source, None, args)? {
                sink.push(row?);
            }
            Ok(sink)
        })
    })
    .await?;
    Ok(outcome)
}

/// Pushes rows through the async driver until done or interrupted.
async fn run_async(
    query: &CompiledQuery<Vec<Value>>,
    source: &SqliteSource,
    args: CallArgs,
    format: OutputFormat,
) -> Outcome {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling query");
                cancel.cancel();
            }
        }
    });

    let mut sink = RowSink::new(format);
    let (result, warnings) = collect_warnings(query.for_each_async(
        source,
        None,
        args,
        |row| sink.push(row),
        &cancel,
    ))
    .await;
    interrupt.abort();

    (result.map(|_| sink), warnings)
}
