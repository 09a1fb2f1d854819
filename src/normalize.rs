//! Converts Loki JSON bodies into [`ToolResult`]s.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, TimeZone, Utc};
use serde_json::json;

use crate::error::{LokiMcpError, Result};
use crate::model::{
    LabelResponse, LogEntry, QueryResponse, Sample, Series, SeriesResult, StreamResult, ToolResult,
};
use crate::params::{Direction, OutputFormat, QueryParams};

pub fn normalize_query(body: &str, params: &QueryParams) -> Result<ToolResult> {
    if params.format == OutputFormat::Raw {
        return Ok(ToolResult::text(body));
    }

    let resp: QueryResponse = serde_json::from_str(body)
        .map_err(|e| LokiMcpError::Normalization(format!("query response is not valid JSON: {e}")))?;
    check_status(resp.status.as_deref(), resp.error.as_deref())?;
    let data = resp
        .data
        .ok_or_else(|| LokiMcpError::Normalization("query response has no `data` field".into()))?;

    let structured = match data.result_type.as_str() {
        "streams" => {
            let streams: Vec<StreamResult> = serde_json::from_value(data.result).map_err(|e| {
                LokiMcpError::Normalization(format!("malformed stream result: {e}"))
            })?;
            let entries = flatten_streams(streams, params.direction)?;
            let text = render_entries(&entries, &params.query);
            let value = json!({
                "resultType": "streams",
                "count": entries.len(),
                "entries": entries,
            });
            (text, value)
        }
        "matrix" | "vector" => {
            let raw: Vec<SeriesResult> = serde_json::from_value(data.result).map_err(|e| {
                LokiMcpError::Normalization(format!("malformed {} result: {e}", data.result_type))
            })?;
            let series: Vec<Series> = raw.into_iter().map(into_series).collect();
            let text = render_series(&series);
            let value = json!({
                "resultType": data.result_type,
                "count": series.len(),
                "series": series,
            });
            (text, value)
        }
        other => {
            return Err(LokiMcpError::Normalization(format!(
                "unsupported resultType {other:?}"
            )))
        }
    };

    let (text, value) = structured;
    Ok(match params.format {
        OutputFormat::Json => ToolResult {
            content: vec![],
            is_error: false,
        }
        .with_structured(value),
        _ => ToolResult::text(text).with_structured(value),
    })
}

pub fn normalize_label_names(body: &str) -> Result<ToolResult> {
    let labels = parse_label_list(body)?;
    let mut text = format!("Found {} labels", labels.len());
    for l in &labels {
        text.push('\n');
        text.push_str(l);
    }
    Ok(ToolResult::text(text).with_structured(json!({ "labels": labels })))
}

pub fn normalize_label_values(body: &str, label: &str) -> Result<ToolResult> {
    let values = parse_label_list(body)?;
    let mut text = format!("Found {} values for label {label:?}", values.len());
    for v in &values {
        text.push('\n');
        text.push_str(v);
    }
    Ok(ToolResult::text(text).with_structured(json!({ "label": label, "values": values })))
}

fn parse_label_list(body: &str) -> Result<Vec<String>> {
    let resp: LabelResponse = serde_json::from_str(body)
        .map_err(|e| LokiMcpError::Normalization(format!("label response is malformed: {e}")))?;
    check_status(resp.status.as_deref(), resp.error.as_deref())?;
    // Loki omits `data` entirely when nothing matched.
    Ok(resp.data.unwrap_or_default())
}

fn check_status(status: Option<&str>, error: Option<&str>) -> Result<()> {
    match status {
        None | Some("success") => Ok(()),
        Some(other) => Err(LokiMcpError::Normalization(format!(
            "loki reported status {other:?}: {}",
            error.unwrap_or("no error message")
        ))),
    }
}

fn flatten_streams(streams: Vec<StreamResult>, direction: Direction) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    for s in streams {
        for (timestamp, line) in s.values {
            let nanos = timestamp.parse::<i64>().map_err(|_| {
                LokiMcpError::Normalization(format!("log entry timestamp {timestamp:?} is not a nanosecond epoch"))
            })?;
            entries.push(LogEntry {
                timestamp,
                nanos,
                labels: s.stream.clone(),
                line,
            });
        }
    }
    entries.sort_by_key(|e| e.nanos);
    if direction == Direction::Backward {
        entries.reverse();
    }
    Ok(entries)
}

fn into_series(raw: SeriesResult) -> Series {
    let mut samples: Vec<Sample> = raw
        .values
        .into_iter()
        .map(|(timestamp, value)| Sample { timestamp, value })
        .collect();
    if let Some((timestamp, value)) = raw.value {
        samples.push(Sample { timestamp, value });
    }
    Series {
        labels: raw.metric,
        samples,
    }
}

fn render_entries(entries: &[LogEntry], query: &str) -> String {
    if entries.is_empty() {
        return format!("No log entries found for query {query}");
    }
    let mut out = format!("Found {} log entries", entries.len());
    for e in entries {
        out.push('\n');
        out.push_str(&format!(
            "{} {} {}",
            format_nanos(e.nanos),
            format_labels(&e.labels),
            e.line.trim_end_matches('\n')
        ));
    }
    out
}

fn render_series(series: &[Series]) -> String {
    let mut out = format!("Found {} series", series.len());
    for s in series {
        out.push('\n');
        out.push_str(&format_labels(&s.labels));
        for sample in &s.samples {
            let ts = Utc
                .timestamp_millis_opt((sample.timestamp * 1000.0) as i64)
                .single()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| sample.timestamp.to_string());
            out.push_str(&format!("\n  {ts} {}", sample.value));
        }
    }
    out
}

fn format_nanos(nanos: i64) -> String {
    Utc.timestamp_nanos(nanos)
        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn format_labels(labels: &BTreeMap<String, String>) -> String {
    let inner: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v:?}")).collect();
    format!("{{{}}}", inner.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Scope;

    fn params(direction: Direction, format: OutputFormat) -> QueryParams {
        QueryParams {
            query: "{app=\"api\"}".into(),
            limit: 100,
            since: None,
            direction,
            format,
            scope: Scope::default(),
        }
    }

    const TWO_STREAMS: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "streams",
            "result": [
                {"stream": {"app": "api"}, "values": [["1704164647000000000", "third"], ["1704164645000000000", "first"]]},
                {"stream": {"app": "web"}, "values": [["1704164646000000000", "second"]]}
            ]
        }
    }"#;

    #[test]
    fn streams_merge_in_requested_order() {
        let res = normalize_query(TWO_STREAMS, &params(Direction::Forward, OutputFormat::Text)).unwrap();
        assert!(!res.is_error);
        let text = res.joined_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Found 3 log entries");
        assert_eq!(lines[1], "2024-01-02T03:04:05Z {app=\"api\"} first");
        assert_eq!(lines[2], "2024-01-02T03:04:06Z {app=\"web\"} second");
        assert!(lines[3].ends_with("third"));

        let res = normalize_query(TWO_STREAMS, &params(Direction::Backward, OutputFormat::Text)).unwrap();
        let structured = res.structured().unwrap();
        assert_eq!(structured["count"], 3);
        assert_eq!(structured["entries"][0]["line"], "third");
    }

    #[test]
    fn json_format_has_only_structured_block() {
        let res = normalize_query(TWO_STREAMS, &params(Direction::Forward, OutputFormat::Json)).unwrap();
        assert_eq!(res.content.len(), 1);
        assert!(res.structured().is_some());
    }

    #[test]
    fn structured_block_renders_as_pretty_json_text() {
        let res = normalize_query(TWO_STREAMS, &params(Direction::Forward, OutputFormat::Json)).unwrap();
        let wire = res.to_mcp();
        let text = wire["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("\n  \"count\": 3"), "{text}");
        let reparsed: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(&reparsed, res.structured().unwrap());
    }

    #[test]
    fn non_numeric_timestamp_is_normalization_error() {
        let body = r#"{"status":"success","data":{"resultType":"streams","result":[
            {"stream":{"app":"api"},"values":[["1704164645000000000","ok"],["2024-01-02T03:04:05Z","bad"]]}]}}"#;
        for direction in [Direction::Forward, Direction::Backward] {
            let err = normalize_query(body, &params(direction, OutputFormat::Text)).unwrap_err();
            match err {
                LokiMcpError::Normalization(msg) => assert!(msg.contains("2024-01-02T03:04:05Z"), "{msg}"),
                other => panic!("expected normalization error, got {other:?}"),
            }
        }
    }

    #[test]
    fn raw_format_passes_body_through() {
        let res = normalize_query("not even json", &params(Direction::Forward, OutputFormat::Raw)).unwrap();
        assert_eq!(res.joined_text(), "not even json");
    }

    #[test]
    fn matrix_results_render_series() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[
            {"metric":{"app":"api"},"values":[[1704164645,"2"],[1704164705,"5"]]}]}}"#;
        let res = normalize_query(body, &params(Direction::Backward, OutputFormat::Text)).unwrap();
        let text = res.joined_text();
        assert!(text.starts_with("Found 1 series"));
        assert!(text.contains("2024-01-02T03:04:05Z 2"));
        assert_eq!(res.structured().unwrap()["series"][0]["samples"][1]["value"], "5");
    }

    #[test]
    fn malformed_bodies_are_normalization_errors() {
        let p = params(Direction::Backward, OutputFormat::Text);
        for body in [
            "<html>bad gateway</html>",
            r#"{"status":"success"}"#,
            r#"{"data":{"resultType":"streams","result":{"oops":1}}}"#,
            r#"{"data":{"resultType":"scalar","result":[1,"2"]}}"#,
            r#"{"status":"error","error":"parse error at line 1"}"#,
        ] {
            let err = normalize_query(body, &p).unwrap_err();
            assert!(matches!(err, LokiMcpError::Normalization(_)), "body {body}");
        }
    }

    #[test]
    fn empty_label_values_is_not_an_error() {
        let res = normalize_label_values(r#"{"data": []}"#, "app").unwrap();
        assert!(!res.is_error);
        assert_eq!(res.joined_text(), "Found 0 values for label \"app\"");
        assert_eq!(res.structured().unwrap()["values"], json!([]));
    }

    #[test]
    fn label_names_listed_one_per_line() {
        let res = normalize_label_names(r#"{"status":"success","data":["app","job"]}"#).unwrap();
        assert_eq!(res.joined_text(), "Found 2 labels\napp\njob");
    }

    #[test]
    fn label_list_shape_mismatch() {
        let err = normalize_label_names(r#"{"data": {"app": 1}}"#).unwrap_err();
        assert!(matches!(err, LokiMcpError::Normalization(_)));
    }
}
