//! `monsoon info`: one-shot system or CPU information.

use monsoon_core::{MetricsProvider, NativeProvider, StaticTopic};

use super::fail;

pub fn run(kind: &str, json: bool) {
    let kind: StaticTopic = kind.parse().unwrap_or_else(|e| fail(e));
    let info = NativeProvider::new()
        .static_info(kind)
        .unwrap_or_else(|e| fail(e));

    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(text) => println!("{text}"),
            Err(e) => fail(e),
        }
        return;
    }

    let lines = info.lines();
    let width = lines.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in lines {
        println!("  {key:<width$}  {value}");
    }
}
