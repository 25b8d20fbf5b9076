//! End-to-end encoding tests.
//!
//! These drive [`RowEncoder`] through its public surface with the bundled
//! caster and record inserter, and inspect the emitted pairs, the shared
//! allocators and the diagnostic events.

mod common;

use std::sync::Arc;

use common::{build_encoder, capture_logs, simple_encoder, MapCompiler, RecordingInserter};
use kv_row_encoder::autoid::{shard_row_id, ShardIdLayout};
use kv_row_encoder::core::kv::decode_record_key;
use kv_row_encoder::diagnostics::ROW_TRUNCATED_MARKER;
use kv_row_encoder::inserter::decode_record_value;
use kv_row_encoder::{
    Allocators, AutoRandomBits, ColumnDefault, ColumnInfo, Datum, EncodeError, EncoderOptions,
    ErrorKind, EvalContext, FieldType, MysqlType, RecordInserter, RedactMode, Result,
    RowIdTag, TableInfo,
};

fn id_name_table(id_type: MysqlType) -> TableInfo {
    let mut table = TableInfo::new(
        10,
        "people",
        vec![
            ColumnInfo::new(1, "id", 0, FieldType::new(id_type).not_null())
                .auto_increment()
                .primary_key(),
            ColumnInfo::new(2, "name", 1, FieldType::new(MysqlType::Varchar).with_flen(32)),
        ],
    );
    table.pk_is_handle = true;
    table
}

// =============================================================================
// Value resolution
// =============================================================================

#[test]
fn test_auto_increment_row_resolves_from_row_seq() {
    let (mut encoder, inserter) = simple_encoder(id_name_table(MysqlType::Long));

    let pairs = encoder
        .encode_row(&[None, Some(Datum::from("hello"))], &[], 7)
        .unwrap();

    assert_eq!(
        inserter.records(),
        vec![vec![Datum::Int64(7), Datum::from("hello")]]
    );
    assert_eq!(pairs.len(), 1);
    let pair = &pairs.pairs[0];
    assert_eq!(pair.row_id, RowIdTag::new(7));
    assert_eq!(decode_record_key(&pair.key).unwrap(), (10, 7));
    assert_eq!(
        decode_record_value(&pair.val).unwrap()[&2],
        Datum::from("hello")
    );
    assert_eq!(encoder.allocators().auto_increment.base(), 7);
}

#[test]
fn test_auto_increment_out_of_range_is_cast_failure() {
    let (mut encoder, _) = simple_encoder(id_name_table(MysqlType::Tiny));

    assert!(encoder.encode_row(&[None, None], &[], 127).is_ok());
    let err = encoder.encode_row(&[None, None], &[], 128).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CastFailure);
    assert_eq!(
        err.contexts(),
        vec!["failed to cast value as tinyint for column `id` (#1)"]
    );
}

#[test]
fn test_not_null_policy_is_configurable() {
    let table = Arc::new(TableInfo::new(
        1,
        "stock",
        vec![ColumnInfo::new(
            1,
            "qty",
            0,
            FieldType::new(MysqlType::Long).not_null(),
        )],
    ));

    let mut strict = build_encoder(
        Arc::clone(&table),
        Allocators::new(),
        EncoderOptions::default(),
        MapCompiler::new(),
        RecordInserter::new(),
    );
    let err = strict.encode_row(&[Some(Datum::Null)], &[], 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotNullViolation);

    let inserter = RecordingInserter::default();
    let mut lenient = build_encoder(
        table,
        Allocators::new(),
        EncoderOptions {
            strict_not_null: false,
            ..EncoderOptions::default()
        },
        MapCompiler::new(),
        inserter.clone(),
    );
    lenient.encode_row(&[Some(Datum::Null)], &[], 1).unwrap();
    assert_eq!(inserter.records()[0][0], Datum::Int64(0));
    assert_eq!(lenient.warnings(), &["Column 'qty' cannot be null".to_string()]);
}

#[test]
fn test_default_expression_sees_scoped_transaction() {
    let table = Arc::new(TableInfo::new(
        1,
        "events",
        vec![
            ColumnInfo::new(1, "created", 0, FieldType::new(MysqlType::Varchar))
                .with_default(ColumnDefault::Expr("txn_start".into())),
            ColumnInfo::new(2, "leaked", 1, FieldType::new(MysqlType::Long)).generated("has_txn"),
        ],
    ));
    let compiler = MapCompiler::new()
        .with("txn_start", |ctx: &EvalContext, _: &[Datum]| -> Result<Datum> {
            let scope = ctx
                .txn_scope()
                .ok_or_else(|| EncodeError::Expression("no transaction scope".into()))?;
            Ok(Datum::from(scope.start_time.to_rfc3339()))
        })
        .with("has_txn", |ctx: &EvalContext, _: &[Datum]| -> Result<Datum> {
            Ok(Datum::Int64(i64::from(ctx.txn_scope().is_some())))
        });
    let inserter = RecordingInserter::default();
    let mut encoder = build_encoder(
        table,
        Allocators::new(),
        EncoderOptions::default(),
        compiler,
        inserter.clone(),
    );

    encoder.encode_row(&[None, None], &[], 1).unwrap();
    let records = inserter.records();
    let record = &records[0];
    assert!(record[0].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(record[1], Datum::Int64(0), "scope must not outlive the default");
}

// =============================================================================
// Generated columns
// =============================================================================

#[test]
fn test_generated_columns_see_earlier_results() {
    let table = Arc::new(TableInfo::new(
        1,
        "calc",
        vec![
            ColumnInfo::new(1, "a", 0, FieldType::new(MysqlType::Long)),
            ColumnInfo::new(2, "b", 1, FieldType::new(MysqlType::Long)).generated("a * 2"),
            ColumnInfo::new(3, "c", 2, FieldType::new(MysqlType::Long)).generated("b + 1"),
        ],
    ));
    let compiler = MapCompiler::new()
        .with("a * 2", |_: &EvalContext, row: &[Datum]| -> Result<Datum> {
            Ok(Datum::Int64(row[0].as_i64().unwrap_or_default() * 2))
        })
        .with("b + 1", |_: &EvalContext, row: &[Datum]| -> Result<Datum> {
            Ok(Datum::Int64(row[1].as_i64().unwrap_or_default() + 1))
        });
    let inserter = RecordingInserter::default();
    let mut encoder = build_encoder(
        table,
        Allocators::new(),
        EncoderOptions::default(),
        compiler,
        inserter.clone(),
    );

    encoder
        .encode_row(&[Some(Datum::Int64(5)), None, None], &[], 1)
        .unwrap();
    let records = inserter.records();
    let record = &records[0];
    assert_eq!(record[1], Datum::Int64(10));
    assert_eq!(record[2], Datum::Int64(11));
}

#[test]
fn test_generated_column_failure_is_logged() {
    let table = Arc::new(TableInfo::new(
        1,
        "calc",
        vec![
            ColumnInfo::new(1, "a", 0, FieldType::new(MysqlType::Long)),
            ColumnInfo::new(2, "b", 1, FieldType::new(MysqlType::Long)).generated("boom"),
        ],
    ));
    let compiler = MapCompiler::new().with("boom", |_: &EvalContext, _: &[Datum]| -> Result<Datum> {
        Err(EncodeError::Expression("division by zero".into()))
    });
    let mut encoder = build_encoder(
        table,
        Allocators::new(),
        EncoderOptions::default(),
        compiler,
        RecordInserter::new(),
    );

    let (result, events) = capture_logs(|| encoder.encode_row(&[Some(Datum::Int64(1))], &[], 1));
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GeneratedColumnFailure);
    assert_eq!(
        err.contexts(),
        vec!["failed to evaluate generated column expression for column `b`"]
    );

    let event = events
        .iter()
        .find(|e| e.message == "kv convert failed: cannot evaluate generated column expression")
        .expect("generated column failure logged");
    assert_eq!(event.field("col_name"), Some("b"));

    // the buffer survives for the next row
    assert!(encoder.checkout_row_buffer().capacity() >= 2);
}

// =============================================================================
// Commit and provenance
// =============================================================================

#[test]
fn test_all_pairs_share_row_tag_and_buffer_is_reused() {
    let (mut encoder, _) = simple_encoder(id_name_table(MysqlType::LongLong));

    for seq in [1_i64, 250, 70_000] {
        let pairs = encoder
            .encode_row(&[None, Some(Datum::from("x"))], &[], seq)
            .unwrap();
        assert!(pairs.iter().all(|p| p.row_id == RowIdTag::new(seq)));
        for pair in pairs.iter() {
            assert_eq!(pair.row_id.decode().unwrap(), seq);
        }

        let mut buffer = encoder.checkout_row_buffer();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 2);

        // a caller-built record goes through the same commit path
        let manual_seq = seq + 1_000_000;
        buffer.push(Datum::Int64(manual_seq));
        buffer.push(Datum::from("manual"));
        let pairs = encoder.commit(buffer, &[], manual_seq).unwrap();
        assert!(pairs.iter().all(|p| p.row_id == RowIdTag::new(manual_seq)));
    }
}

#[test]
fn test_commit_failure_is_logged_and_annotated() {
    let (mut encoder, _) = simple_encoder(id_name_table(MysqlType::LongLong));
    encoder
        .encode_row(&[Some(Datum::Int64(1)), Some(Datum::from("a"))], &[], 1)
        .unwrap();

    let original = vec![Datum::from("1"), Datum::from("b")];
    let (result, events) = capture_logs(|| {
        encoder.encode_row(&[Some(Datum::Int64(1)), Some(Datum::from("b"))], &original, 2)
    });
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsertFailure);
    assert_eq!(err.contexts(), vec!["failed to encode row 2"]);

    let event = events
        .iter()
        .find(|e| e.message == "kv encode failed")
        .expect("commit failure logged");
    assert_eq!(
        event.field("original_row"),
        Some(r#"[{"kind":"string","val":"1"},{"kind":"string","val":"b"}]"#)
    );
    assert!(event.field("error").is_some_and(|e| e.contains("Duplicate entry '1'")));
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn test_convert_failure_logs_only_offending_value() {
    let (mut encoder, _) = simple_encoder(id_name_table(MysqlType::Tiny));
    let original = vec![Datum::from("300"), Datum::from("someone")];

    let (result, events) = capture_logs(|| {
        encoder.encode_row(
            &[Some(Datum::from("300")), Some(Datum::from("someone"))],
            &original,
            3,
        )
    });
    assert_eq!(result.unwrap_err().kind(), ErrorKind::CastFailure);

    let convert = events
        .iter()
        .find(|e| e.message == "kv convert failed")
        .expect("conversion failure logged");
    assert_eq!(
        convert.field("original"),
        Some(r#"[{"kind":"string","val":"300"}]"#)
    );
    assert_eq!(convert.field("col_name"), Some("id"));

    let value = events
        .iter()
        .find(|e| e.message == "failed to convert kv value")
        .expect("offending value logged");
    assert_eq!(value.field("orig_val"), Some("300"));
    assert_eq!(value.field("column_id"), Some("1"));
}

#[test]
fn test_logged_rows_are_bounded_and_redacted() {
    let mut table = TableInfo::new(
        1,
        "wide",
        (0..50)
            .map(|i| {
                ColumnInfo::new(
                    i + 1,
                    format!("c{i}"),
                    i as usize,
                    FieldType::new(MysqlType::Varchar),
                )
            })
            .collect(),
    );
    table.columns.push(
        ColumnInfo::new(51, "id", 50, FieldType::new(MysqlType::LongLong).not_null())
            .primary_key(),
    );
    table.pk_is_handle = true;
    let table = Arc::new(table);

    let options = EncoderOptions {
        redact: RedactMode::On,
        max_row_log_bytes: 100,
        max_value_log_chars: 64,
        ..EncoderOptions::default()
    };
    let mut encoder = build_encoder(
        Arc::clone(&table),
        Allocators::new(),
        options,
        MapCompiler::new(),
        RecordInserter::new(),
    );

    let mut input: Vec<Option<Datum>> = (0..50).map(|_| Some(Datum::from("secret"))).collect();
    input.push(Some(Datum::Int64(1)));
    let original: Vec<Datum> = input.iter().flatten().cloned().collect();
    encoder.encode_row(&input, &original, 1).unwrap();

    let (result, events) = capture_logs(|| encoder.encode_row(&input, &original, 2));
    assert!(result.is_err());
    let logged = events
        .iter()
        .find(|e| e.message == "kv encode failed")
        .and_then(|e| e.field("original_row"))
        .expect("row logged");
    assert!(!logged.contains("secret"));
    assert_eq!(logged.matches(ROW_TRUNCATED_MARKER).count(), 1);
    assert_eq!(logged.matches(r#"{"kind":"string","val":"?"}"#).count(), 16);
}

// =============================================================================
// Identifier synthesis
// =============================================================================

fn auto_random_table(unsigned: bool) -> TableInfo {
    let mut ft = FieldType::new(MysqlType::LongLong).not_null();
    if unsigned {
        ft = ft.unsigned();
    }
    let mut table = TableInfo::new(
        3,
        "orders",
        vec![
            ColumnInfo::new(1, "id", 0, ft).primary_key(),
            ColumnInfo::new(2, "note", 1, FieldType::new(MysqlType::Varchar)),
        ],
    );
    table.pk_is_handle = true;
    table.auto_random = Some(AutoRandomBits {
        column_id: 1,
        shard_bits: 5,
        range_bits: 2,
    });
    table
}

#[test]
fn test_auto_random_composition() {
    let signed = ShardIdLayout::new(5, 2, false);
    let id = signed.compose(3, 100);
    assert_eq!(id, (3 << 58) | 100);
    assert_eq!(id & signed.incremental_mask(), 100);
    let parts = signed.decompose(id);
    assert_eq!((parts.range, parts.shard, parts.incremental), (0, 3, 100));

    let unsigned = ShardIdLayout::new(5, 2, true);
    let id = unsigned.compose(3, 100);
    assert_eq!(id, (3 << 59) | 100);
    assert_eq!(id & ((1 << 59) - 1), 100);
}

#[test]
fn test_auto_random_column_is_filled_and_rebased() {
    let table = Arc::new(auto_random_table(false));
    let allocators = Allocators::for_table(&table);
    let options = EncoderOptions {
        auto_random_seed: 42,
        ..EncoderOptions::default()
    };

    let first = RecordingInserter::default();
    let mut encoder = build_encoder(
        Arc::clone(&table),
        allocators.clone(),
        options.clone(),
        MapCompiler::new(),
        first.clone(),
    );
    encoder.encode_row(&[None, None], &[], 100).unwrap();
    let id = first.records()[0][0].as_i64().unwrap();
    assert!(id > 0);
    let layout = *encoder.converter().layout().unwrap();
    assert_eq!(id & layout.incremental_mask(), 100);
    assert_eq!(allocators.auto_random.base(), 100);

    // same seed, same shard
    let second = RecordingInserter::default();
    let mut replay = build_encoder(
        table,
        Allocators::new(),
        options,
        MapCompiler::new(),
        second.clone(),
    );
    replay.encode_row(&[None, None], &[], 100).unwrap();
    assert_eq!(second.records()[0][0], Datum::Int64(id));
}

#[test]
fn test_shard_row_id_is_deterministic() {
    let mut table = TableInfo::new(
        4,
        "logs",
        vec![ColumnInfo::new(1, "msg", 0, FieldType::new(MysqlType::Varchar))],
    );
    table.shard_row_id_bits = 4;
    let table = Arc::new(table);

    let handles: Vec<Datum> = [1_i64, 2]
        .iter()
        .map(|&seed| {
            let inserter = RecordingInserter::default();
            let mut encoder = build_encoder(
                Arc::clone(&table),
                Allocators::new(),
                EncoderOptions {
                    auto_random_seed: seed,
                    ..EncoderOptions::default()
                },
                MapCompiler::new(),
                inserter.clone(),
            );
            encoder.encode_row(&[None], &[], 5).unwrap();
            assert_eq!(encoder.allocators().row_id.base(), 5);
            inserter.records()[0][1].clone()
        })
        .collect();

    assert_eq!(handles[0], handles[1]);
    assert_eq!(handles[0], Datum::Int64(shard_row_id(5, 4)));
    assert_eq!(shard_row_id(5, 4) & ((1 << 59) - 1), 5);
}

#[test]
fn test_encoders_share_allocators_across_threads() {
    let table = Arc::new(id_name_table(MysqlType::LongLong));
    let allocators = Allocators::for_table(&table);

    std::thread::scope(|scope| {
        for worker in 0..4_i64 {
            let table = Arc::clone(&table);
            let allocators = allocators.clone();
            scope.spawn(move || {
                let mut encoder = build_encoder(
                    table,
                    allocators,
                    EncoderOptions::default(),
                    MapCompiler::new(),
                    RecordInserter::new(),
                );
                for i in 0..250 {
                    let seq = worker * 1000 + i + 1;
                    encoder.encode_row(&[None, None], &[], seq).unwrap();
                }
            });
        }
    });

    assert_eq!(allocators.auto_increment.base(), 3250);
}
