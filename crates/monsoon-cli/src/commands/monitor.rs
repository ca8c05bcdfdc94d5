use super::{build_config, fail, make_provider, parse_topic};
use crate::StreamArgs;

pub fn run(topic: &str, columns: Option<&str>, stream: &StreamArgs) {
    let topic = parse_topic(topic);
    let mut config = build_config(stream, topic).unwrap_or_else(|e| fail(e));
    if let Some(columns) = columns {
        config
            .set_columns(topic, columns)
            .unwrap_or_else(|e| fail(e));
    }

    let provider = make_provider(stream.replay.as_deref());
    let mut app = crate::tui::app::App::new(provider, config);
    if let Err(e) = app.run() {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
}
