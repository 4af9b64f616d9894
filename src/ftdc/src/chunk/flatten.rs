use bson::{Bson, Document};

/// One numeric leaf extracted from a reference document, in canonical
/// (depth-first, field-declaration) order.  The position in the flattened
/// sequence is the metric ordinal used to index the delta matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedMetric {
    /// Dotted field path, array indices included ("mem.bins.0").
    pub path: String,
    /// Reference value, widened to i64.
    pub value: i64,
}

/// flatten walks `doc` depth-first in field-declaration order and extracts
/// every numeric leaf.  Non-numeric leaves (strings, object ids, null,
/// binary, ...) are skipped and do not consume a metric ordinal.
pub fn flatten(doc: &Document) -> Vec<FlattenedMetric> {
    let mut out = Vec::new();
    walk_document("", doc, &mut out);
    out
}

fn walk_document(prefix: &str, doc: &Document, out: &mut Vec<FlattenedMetric>) {
    for (name, value) in doc.iter() {
        let path = join_path(prefix, name);
        walk_value(path, value, out);
    }
}

fn walk_value(path: String, value: &Bson, out: &mut Vec<FlattenedMetric>) {
    match value {
        Bson::Document(doc) => walk_document(&path, doc, out),
        Bson::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk_value(join_path(&path, &i.to_string()), item, out);
            }
        }
        other => {
            if let Some(value) = numeric_value(other) {
                out.push(FlattenedMetric { path, value });
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// numeric_value widens a numeric BSON leaf to i64: integers as-is, doubles
/// truncated, booleans as 0/1, datetimes as epoch millis.
fn numeric_value(value: &Bson) -> Option<i64> {
    match value {
        Bson::Double(v) => Some(*v as i64),
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Boolean(v) => Some(*v as i64),
        Bson::DateTime(dt) => Some(dt.timestamp_millis()),
        _ => None,
    }
}
