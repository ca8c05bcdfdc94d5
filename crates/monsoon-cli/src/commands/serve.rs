use super::{build_config, fail, make_provider};
use crate::StreamArgs;

pub fn run(host: &str, port: u16, stream: &StreamArgs) {
    let config = build_config(stream, monsoon_core::Topic::CpuCores).unwrap_or_else(|e| fail(e));
    let provider = make_provider(stream.replay.as_deref());

    let base = format!("http://{host}:{port}");
    println!("🌧  Monsoon Server v{}", monsoon_core::VERSION);
    println!("   {base}");
    println!(
        "   provider: {}, window: {} samples every {:?}",
        provider.name(),
        config.capacity,
        config.interval
    );
    println!();
    println!("   Endpoints:");
    println!("     GET  /                       API index (try: curl {base})");
    println!("     GET  /topics/{{topic}}         cpu_cores, memory or processes");
    println!("     GET  /info/{{kind}}            system or cpu");
    println!("     POST /processes/{{pid}}/kill   Send SIGTERM");
    println!();
    println!("   Query params for /topics/{{topic}}:");
    println!("     mode=live|history       Projection mode (default: live)");
    println!("     sort=cpu|memory|name|id Sort key (provider order when omitted)");
    println!("     dir=asc|desc            Sort direction");
    println!("     filter=<text>           Case-insensitive name/exe/id match");
    println!("     columns=a,b,c           Visible columns");
    println!();
    println!("   Examples:");
    println!("     curl {base}/topics/processes?sort=memory&filter=chrome");
    println!("     curl {base}/topics/cpu_cores?mode=history");
    println!();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fail(format!("cannot start runtime: {e}")),
    };
    if let Err(e) = rt.block_on(monsoon_server::run_server(provider, config, host, port)) {
        fail(format!("server error: {e}"));
    }
}
