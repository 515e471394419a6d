use chrono::Utc;
use serde_json::{Map, Value};
use std::{collections::HashMap, time::Duration};
use tracing::{error, info, warn};

const SERVICE: &str = "staffing-backend";
const SLOW_TRANSACTION: Duration = Duration::from_secs(1);

/// Emits one JSON object per line through `tracing`.
#[derive(Debug)]
pub struct StructuredLogger;

impl StructuredLogger {
    /// Timing for a named multi-statement unit of work. `rows` is what it produced or read.
    pub fn log_transaction(&self, name: &str, elapsed: Duration, rows: Option<usize>) {
        let fields = transaction_fields(name, elapsed, rows);
        let slow = fields.get("slow") == Some(&Value::Bool(true));
        let line = entry("transaction", fields);

        if slow {
            warn!("Slow transaction: {}", line);
        } else {
            info!("{}", line);
        }
    }

    pub fn log_error(&self, message: &str, context: HashMap<String, Value>) {
        let mut fields = context;
        fields.insert("error_message".to_string(), message.into());
        error!("{}", entry("error", fields));
    }

    pub fn log_business_event(
        &self,
        event_name: &str,
        user_id: Option<i32>,
        metadata: HashMap<String, Value>,
    ) {
        let mut fields = metadata;
        fields.insert("event_name".to_string(), event_name.into());
        fields.insert("user_id".to_string(), user_id.into());
        info!("{}", entry("business_event", fields));
    }
}

/// Builds the metadata map for the `log_*` calls from `(key, value)` pairs.
pub fn event_fields<const N: usize>(pairs: [(&str, Value); N]) -> HashMap<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn transaction_fields(name: &str, elapsed: Duration, rows: Option<usize>) -> HashMap<String, Value> {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    event_fields([
        ("transaction", name.into()),
        ("duration_ms", millis.into()),
        ("rows", rows.into()),
        ("slow", (elapsed > SLOW_TRANSACTION).into()),
    ])
}

// Envelope keys win over caller fields.
fn entry(event_type: &str, fields: HashMap<String, Value>) -> Value {
    let mut line: Map<String, Value> = fields.into_iter().collect();
    line.insert("timestamp".to_string(), Utc::now().to_rfc3339().into());
    line.insert("event_type".to_string(), event_type.into());
    line.insert("service".to_string(), SERVICE.into());
    Value::Object(line)
}

pub static LOGGER: StructuredLogger = StructuredLogger;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_fields_report_rows_and_slowness() {
        let fast = transaction_fields("process_closure", Duration::from_millis(40), Some(2));
        assert_eq!(fast["transaction"], "process_closure");
        assert_eq!(fast["duration_ms"], 40);
        assert_eq!(fast["rows"], 2);
        assert_eq!(fast["slow"], false);

        let slow = transaction_fields("dashboard_stats", Duration::from_millis(1500), None);
        assert_eq!(slow["rows"], Value::Null);
        assert_eq!(slow["slow"], true);
    }

    #[test]
    fn envelope_overrides_caller_fields() {
        let line = entry(
            "business_event",
            event_fields([("service", json!("spoofed")), ("process_id", json!(4))]),
        );
        assert_eq!(line["service"], SERVICE);
        assert_eq!(line["event_type"], "business_event");
        assert_eq!(line["process_id"], 4);
        assert!(line["timestamp"].is_string());
    }

    #[test]
    fn event_fields_builds_owned_map() {
        let fields = event_fields([("process_id", json!(4)), ("promoted", json!(2))]);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["promoted"], json!(2));
    }
}
