use anyhow::Result;
use sluice_connectors::MemorySource;
use sluice_runner::{
    CallArgs, CompiledQuery, IdentityOptimizer, MapMode, ParameterAccessor, ProviderFlags,
    QueryPlan, RowLimit, RowMapper, SubQuery, Value,
};
use tokio_util::sync::CancellationToken;

fn readings(values: Vec<Value>) -> MemorySource {
    MemorySource::new("readings", values.into_iter().map(|v| vec![v]).collect())
}

fn compile(query: SubQuery) -> Result<CompiledQuery<(i64,)>> {
    Ok(CompiledQuery::compile(
        QueryPlan::from_query(query),
        &IdentityOptimizer,
        &ProviderFlags::emulated(),
        RowMapper::for_row(),
    )?)
}

fn paged(skip: i64, take: i64) -> Result<CompiledQuery<(i64,)>> {
    compile(
        SubQuery::new("SELECT reading FROM readings")
            .with_skip(RowLimit::Literal(skip))
            .with_take(RowLimit::Literal(take)),
    )
}

#[test]
fn test_emulated_window_reads_only_what_it_needs() -> Result<()> {
    let source = readings((1..=10).map(Value::Int).collect());
    let query = compile(
        SubQuery::new("SELECT reading FROM readings")
            .with_parameter("skip", ParameterAccessor::argument(0))
            .with_parameter("take", ParameterAccessor::argument(1))
            .with_skip(RowLimit::Parameter("skip".into()))
            .with_take(RowLimit::Parameter("take".into())),
    )?;

    let rows = query
        .execute(&source, None, CallArgs::new(vec![Value::Int(3), Value::Int(2)]))?
        .collect::<sluice_error::Result<Vec<_>>>()?;

    assert_eq!(rows, vec![(4,), (5,)]);
    assert_eq!(source.stats().rows_read(), 5);
    assert_eq!(source.stats().opened(), 1);
    assert_eq!(source.stats().open_readers(), 0);
    Ok(())
}

#[test]
fn test_abandoned_sequence_closes_reader_once() -> Result<()> {
    let source = readings((1..=10).map(Value::Int).collect());
    let query = paged(0, 100)?;

    let mut results = query.execute(&source, None, CallArgs::empty())?;
    assert_eq!(results.next().transpose()?, Some((1,)));
    assert_eq!(source.stats().open_readers(), 1);

    drop(results);
    assert_eq!(source.stats().closed(), 1);
    assert_eq!(source.stats().rows_read(), 1);
    Ok(())
}

#[test]
fn test_skipped_text_row_is_converted_leniently() -> Result<()> {
    let source = readings(vec![
        Value::Int(1),
        Value::Text("2".into()),
        Value::Int(3),
    ]);
    let query = paged(2, 5)?;

    let rows = query
        .execute(&source, None, CallArgs::empty())?
        .collect::<sluice_error::Result<Vec<_>>>()?;

    assert_eq!(rows, vec![(3,)]);
    assert_eq!(query.mapper().mode(), MapMode::Slow);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_cancellation_releases_reader() -> Result<()> {
    let source = readings((1..=20).map(Value::Int).collect());
    let query = paged(0, 20)?;

    let cancel = CancellationToken::new();
    let mut seen = Vec::new();
    let err = query
        .for_each_async(
            &source,
            None,
            CallArgs::empty(),
            |(reading,)| {
                seen.push(reading);
                if seen.len() == 2 {
                    cancel.cancel();
                }
            },
            &cancel,
        )
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected the call to be cancelled"))?;

    assert!(err.is_cancelled());
    assert_eq!(seen, vec![1, 2]);
    assert_eq!(source.stats().rows_read(), 2);
    assert_eq!(source.stats().open_readers(), 0);
    Ok(())
}
