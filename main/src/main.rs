//! Meridian runtime executable.
//!
//! The same binary serves two roles. Launched by the management daemon with
//! an init pipe in the environment it becomes a container bootstrap and
//! ends up as the container's init process. Launched any other way it is a
//! small diagnostic CLI; containers are never created from here.

#![deny(clippy::all)]
#![deny(missing_docs)]

use anyhow::{anyhow, Error};
use clap::Parser;
use log::info;

mod logger;

#[derive(Debug, Parser)]
#[clap(name = "meridian", about = "Meridian system container runtime", version)]
struct Opt {
    /// Print the runtime feature set as JSON and exit.
    #[clap(long)]
    features: bool,
}

fn main() -> Result<(), Error> {
    // The bootstrap must run first: before the logger, before argument
    // parsing and before any thread exists in this process. It returns in
    // the container's init process, or not at all, or immediately when no
    // init pipe is present in the environment.
    if let Some(handoff) = meridian_runtime::bootstrap::run() {
        meridian_runtime::init::run(handoff);
    }

    let opt = Opt::parse();
    logger::init();

    if opt.features {
        println!(
            "{}",
            serde_json::json!({
                "user_namespaces": true,
                "cgroup_namespaces": true,
                "shiftfs": true,
                "idmap_helpers": ["newuidmap", "newgidmap"],
            })
        );
        return Ok(());
    }

    info!("no command given");
    Err(anyhow!(
        "containers are created by the meridian management daemon, not from this CLI"
    ))
}
