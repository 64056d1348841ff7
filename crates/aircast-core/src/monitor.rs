// crates/aircast-core/src/monitor.rs
//
// Hierarchical status snapshots published once per tick.
//
// A `State` is a flat map of slash-separated paths to small value lists
// ("stage/layer/10/foreground/producer" → ["color"]). Components build
// their own state each tick and the channel grafts them together under
// prefixes, so the map is rebuilt rather than mutated in place.

use std::collections::BTreeMap;

use serde::Serialize;

/// One monitor datum. Kept deliberately small — consumers (OSC publishers,
/// log sinks) only ever see scalars and strings.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::I32(v) }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self { Value::I64(v as i64) }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::I64(v) }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self { Value::F32(v) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::F64(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Str(v.to_owned()) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Value::Str(v) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct State {
    data: BTreeMap<String, Vec<Value>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` to a single value, replacing any previous entry.
    pub fn insert<V: Into<Value>>(&mut self, path: &str, value: V) {
        self.data.insert(path.to_owned(), vec![value.into()]);
    }

    /// Set `path` to a value list (e.g. per-channel peaks, [num, den] pairs).
    pub fn insert_list<V: Into<Value>>(&mut self, path: &str, values: Vec<V>) {
        self.data
            .insert(path.to_owned(), values.into_iter().map(Into::into).collect());
    }

    /// Graft `child` under `prefix`: every `k → v` becomes `prefix/k → v`.
    pub fn insert_state(&mut self, prefix: &str, child: State) {
        for (k, v) in child.data {
            self.data.insert(format!("{prefix}/{k}"), v);
        }
    }

    pub fn get(&self, path: &str) -> Option<&[Value]> {
        self.data.get(path).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Value>)> {
        self.data.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat JSON object (`path` → value array), for status publishers that
    /// speak JSON rather than a binary wire format.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.data).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graft_prefixes_every_path() {
        let mut layer = State::new();
        layer.insert("producer", "color");
        layer.insert("paused", false);

        let mut stage = State::new();
        stage.insert_state("layer/10/foreground", layer);

        assert_eq!(
            stage.get("layer/10/foreground/producer"),
            Some(&[Value::Str("color".into())][..])
        );
        assert_eq!(
            stage.get("layer/10/foreground/paused"),
            Some(&[Value::Bool(false)][..])
        );
    }

    #[test]
    fn list_values_preserve_order() {
        let mut s = State::new();
        s.insert_list("framerate", vec![60000_i32, 1001]);
        assert_eq!(
            s.get("framerate"),
            Some(&[Value::I32(60000), Value::I32(1001)][..])
        );
    }

    #[test]
    fn insert_replaces() {
        let mut s = State::new();
        s.insert("x", 1_i32);
        s.insert("x", 2_i32);
        assert_eq!(s.get("x"), Some(&[Value::I32(2)][..]));
    }

    #[test]
    fn json_export_keeps_paths_and_scalars() {
        let mut s = State::new();
        s.insert("stage/layer/10/foreground/paused", false);
        s.insert_list("framerate", vec![25000_i32, 1000]);

        let json = s.to_json();
        assert_eq!(json["stage/layer/10/foreground/paused"][0], false);
        assert_eq!(json["framerate"][1], 1000);
    }
}
