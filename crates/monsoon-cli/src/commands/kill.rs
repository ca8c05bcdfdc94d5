//! `monsoon kill`: terminate a process by pid.

use monsoon_core::{MetricsProvider, NativeProvider};

pub fn run(pid: u32) {
    match NativeProvider::new().kill_entity(pid) {
        Ok(()) => println!("Sent SIGTERM to PID {pid}"),
        Err(e) => super::fail(e),
    }
}
