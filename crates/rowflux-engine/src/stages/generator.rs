//! Row generator: a configurable source stage.

use std::time::Duration;

use serde::Deserialize;

use rowflux_types::layout::{Column, RowLayout};
use rowflux_types::row::{Row, Value, ValueType};

use crate::error::EngineError;
use crate::stage::{Stage, StageContext, StepSignal};

#[derive(Debug, Deserialize)]
struct FieldSpec {
    name: String,
    #[serde(rename = "type")]
    value_type: ValueType,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeneratorParams {
    count: u64,
    #[serde(default)]
    delay_ms: u64,
    /// Name of an `int64` field whose value increments by one per emitted
    /// row, starting from its configured value.
    #[serde(default)]
    sequence_field: Option<String>,
    fields: Vec<FieldSpec>,
}

/// Emits `count` rows built from a configured field list, optionally
/// sleeping `delay_ms` between rows to simulate a slow source.
pub struct RowGenerator {
    cells: Vec<Value>,
    layout: RowLayout,
    count: u64,
    emitted: u64,
    delay: Duration,
    sequence_index: Option<usize>,
    layout_pushed: bool,
}

impl RowGenerator {
    pub fn new() -> Self {
        Self {
            cells: Vec::new(),
            layout: RowLayout::default(),
            count: 0,
            emitted: 0,
            delay: Duration::ZERO,
            sequence_index: None,
            layout_pushed: false,
        }
    }

    fn cell_value(stage: &str, spec: &FieldSpec) -> Result<Value, EngineError> {
        if spec.value.is_null() {
            return Ok(Value::Null);
        }
        let value = match spec.value_type {
            ValueType::Bool => spec.value.as_bool().map(Value::Bool),
            ValueType::Int64 => spec.value.as_i64().map(Value::Int64),
            ValueType::Float64 => spec.value.as_f64().map(Value::Float64),
            ValueType::Utf8 => spec.value.as_str().map(|s| Value::Utf8(s.to_string())),
            ValueType::Binary => spec
                .value
                .as_str()
                .map(|s| Value::Binary(s.as_bytes().to_vec())),
        };
        value.ok_or_else(|| {
            EngineError::stage(
                stage,
                format!(
                    "field '{}' value {} does not match declared type {}",
                    spec.name, spec.value, spec.value_type
                ),
            )
        })
    }

    fn next_row(&self) -> Row {
        let mut cells = self.cells.clone();
        if let Some(index) = self.sequence_index {
            if let Some(Value::Int64(base)) = self.cells.get(index) {
                cells[index] = Value::Int64(base + self.emitted as i64);
            }
        }
        Row::new(cells)
    }
}

impl Default for RowGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for RowGenerator {
    fn init(&mut self, ctx: &mut StageContext) -> Result<(), EngineError> {
        let params: GeneratorParams = serde_json::from_value(ctx.params().clone())
            .map_err(|e| EngineError::stage(ctx.stage_name(), format!("invalid params: {e}")))?;

        let mut columns = Vec::with_capacity(params.fields.len());
        let mut cells = Vec::with_capacity(params.fields.len());
        for spec in &params.fields {
            columns.push(Column::new(spec.name.clone(), spec.value_type));
            cells.push(Self::cell_value(ctx.stage_name(), spec)?);
        }
        self.layout = RowLayout::new(columns);

        if let Some(field) = &params.sequence_field {
            let index = self.layout.index_of(field).ok_or_else(|| {
                EngineError::stage(
                    ctx.stage_name(),
                    format!("sequence_field '{field}' is not a declared field"),
                )
            })?;
            self.sequence_index = Some(index);
        }

        self.cells = cells;
        self.count = params.count;
        self.delay = Duration::from_millis(params.delay_ms);
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError> {
        if self.emitted >= self.count {
            return Ok(StepSignal::NoMoreInput);
        }
        if !self.layout_pushed {
            ctx.set_output_layout(self.layout.clone());
            self.layout_pushed = true;
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        ctx.write_row(self.next_row())?;
        self.emitted += 1;
        Ok(StepSignal::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_parse() {
        let params: GeneratorParams = serde_json::from_value(serde_json::json!({
            "count": 12,
            "fields": [
                {"name": "id", "type": "int64", "value": 1},
                {"name": "name", "type": "utf8", "value": "x"},
            ],
        }))
        .expect("parse");
        assert_eq!(params.count, 12);
        assert_eq!(params.delay_ms, 0);
        assert!(params.sequence_field.is_none());
        assert_eq!(params.fields.len(), 2);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let spec = FieldSpec {
            name: "id".to_string(),
            value_type: ValueType::Int64,
            value: serde_json::json!("not a number"),
        };
        assert!(RowGenerator::cell_value("gen", &spec).is_err());
    }

    #[test]
    fn test_null_value_allowed_for_any_type() {
        let spec = FieldSpec {
            name: "id".to_string(),
            value_type: ValueType::Int64,
            value: serde_json::Value::Null,
        };
        assert_eq!(RowGenerator::cell_value("gen", &spec).unwrap(), Value::Null);
    }

    #[test]
    fn test_sequence_rows_increment() {
        let mut generator = RowGenerator::new();
        generator.cells = vec![Value::Int64(4)];
        generator.layout = RowLayout::new(vec![Column::new("n", ValueType::Int64)]);
        generator.sequence_index = Some(0);
        generator.count = 2;
        assert_eq!(generator.next_row().get(0).and_then(Value::as_i64), Some(4));
        generator.emitted = 1;
        assert_eq!(generator.next_row().get(0).and_then(Value::as_i64), Some(5));
    }
}
