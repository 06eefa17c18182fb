use std::path::PathBuf;

use anyhow::{anyhow, Context};
use aya::maps::Array;
use aya::programs::KProbe;
use aya::{include_bytes_aligned, Ebpf};
use aya_log::EbpfLogger;
use clap::Parser;
use log::{debug, info, warn};
use sockstate::{layout, probes};
use sockstate_common::SockLayout;
use tokio::io::unix::AsyncFd;
use tokio::{signal, task};

#[derive(Debug, Parser)]
struct Opt {
    /// JSON file with the struct member offsets of the running kernel
    #[clap(short, long)]
    layout: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();

    env_logger::init();

    let layout = layout::load(&opt.layout)?;

    // Bump the memlock rlimit. This is needed for older kernels that don't use the
    // new memcg based accounting, see https://lwn.net/Articles/837122/
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {}", ret);
    }

    #[cfg(debug_assertions)]
    let mut ebpf = Ebpf::load(include_bytes_aligned!(
        "../../target/bpfel-unknown-none/debug/sockstate"
    ))?;
    #[cfg(not(debug_assertions))]
    let mut ebpf = Ebpf::load(include_bytes_aligned!(
        "../../target/bpfel-unknown-none/release/sockstate"
    ))?;
    match EbpfLogger::init(&mut ebpf) {
        // This can happen if you remove all log statements from your eBPF program.
        Err(e) => warn!("failed to initialize eBPF logger: {}", e),
        Ok(logger) => {
            let mut logger = AsyncFd::new(logger)?;
            task::spawn(async move {
                loop {
                    let Ok(mut guard) = logger.readable_mut().await else {
                        break;
                    };
                    guard.get_inner_mut().flush();
                    guard.clear_ready();
                }
            });
        }
    }

    let map = ebpf
        .map_mut("LAYOUT")
        .ok_or_else(|| anyhow!("map LAYOUT not found"))?;
    let mut layout_map: Array<_, SockLayout> = Array::try_from(map)?;
    layout_map
        .set(0, layout, 0)
        .context("failed to write struct layout")?;

    for attachment in probes::plan() {
        let program: &mut KProbe = ebpf
            .program_mut(&attachment.program)
            .ok_or_else(|| anyhow!("program {} not found", attachment.program))?
            .try_into()?;
        program.load()?;
        program.attach(attachment.symbol, 0).with_context(|| {
            format!("failed to attach {} to {}", attachment.kind, attachment.symbol)
        })?;
        info!("attached {} to {}", attachment.kind, attachment.symbol);
    }

    info!("Waiting for Ctrl-C...");
    signal::ctrl_c().await?;
    info!("Exiting...");

    Ok(())
}
