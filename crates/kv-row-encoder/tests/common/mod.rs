//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as FmtWrite;
use std::sync::{Arc, Mutex};

use kv_row_encoder::{
    Allocators, Datum, EncodeError, EncoderOptions, EncodingConfig, ExprCompiler, Expression,
    RecordInserter, Result, RowEncoder, RowInserter, StandardCaster, TableInfo,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// =============================================================================
// Log capture
// =============================================================================

/// One captured tracing event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// A tracing layer that records every event it sees.
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let mut text = String::new();
        let _ = write!(text, "{:?}", value);
        if field.name() == "message" {
            self.message = text;
        } else {
            self.fields.insert(field.name().to_string(), text);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }
}

/// Run `f` with a capturing subscriber installed on this thread.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<CapturedEvent>) {
    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, layer.events())
}

// =============================================================================
// Collaborators
// =============================================================================

/// Compiles expression sources by exact lookup.
#[derive(Default, Clone)]
pub struct MapCompiler {
    exprs: HashMap<String, Arc<dyn Expression>>,
}

impl MapCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: &str, expr: impl Expression + 'static) -> Self {
        self.exprs.insert(source.to_string(), Arc::new(expr));
        self
    }
}

impl ExprCompiler for MapCompiler {
    fn compile(&self, _table: &TableInfo, source: &str) -> Result<Arc<dyn Expression>> {
        self.exprs
            .get(source)
            .cloned()
            .ok_or_else(|| EncodeError::Expression(format!("unknown expression `{}`", source)))
    }
}

/// Wraps a [`RecordInserter`] and keeps a copy of every record it is given.
#[derive(Clone, Default)]
pub struct RecordingInserter {
    inner: Arc<Mutex<RecordInserter>>,
    records: Arc<Mutex<Vec<Vec<Datum>>>>,
}

impl RecordingInserter {
    pub fn records(&self) -> Vec<Vec<Datum>> {
        self.records.lock().unwrap().clone()
    }
}

impl RowInserter for RecordingInserter {
    fn add_record(
        &mut self,
        table: &TableInfo,
        record: &[Datum],
    ) -> Result<kv_row_encoder::InsertedRow> {
        self.records.lock().unwrap().push(record.to_vec());
        self.inner.lock().unwrap().add_record(table, record)
    }
}

// =============================================================================
// Encoder construction
// =============================================================================

pub fn build_encoder(
    table: Arc<TableInfo>,
    allocators: Allocators,
    options: EncoderOptions,
    compiler: MapCompiler,
    inserter: impl RowInserter + 'static,
) -> RowEncoder {
    RowEncoder::new(EncodingConfig {
        table,
        options,
        allocators,
        compiler: Arc::new(compiler),
        caster: Arc::new(StandardCaster),
        inserter: Box::new(inserter),
        logger: tracing::info_span!("encode"),
    })
    .unwrap()
}

/// An encoder with default options, fresh allocators and no expressions.
pub fn simple_encoder(table: TableInfo) -> (RowEncoder, RecordingInserter) {
    let table = Arc::new(table);
    let inserter = RecordingInserter::default();
    let encoder = build_encoder(
        Arc::clone(&table),
        Allocators::for_table(&table),
        EncoderOptions::default(),
        MapCompiler::new(),
        inserter.clone(),
    );
    (encoder, inserter)
}
