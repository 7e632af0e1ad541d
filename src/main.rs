use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod attack;
mod cli;
mod conn;
mod frame;
mod liveness;
mod proto;
mod report;
mod stats;
mod stop;

use attack::runner::CrashTester;
use liveness::{TcpProbe, is_alive, measure_latency};
use proto::command::probe_frame;
use stop::StopToken;

/// 128 + SIGINT
const INTERRUPT_EXIT_CODE: i32 = 130;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(&args.log_level)?;
    match args.cmd {
        cli::Cmd::Crash(opts) => run_crash(opts),
        cli::Cmd::Probe(opts) => run_probe(opts),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("bad log filter {level:?}"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Cancel `stop` on the first Ctrl-C; workers notice at their next loop boundary. A second
/// Ctrl-C exits immediately.
fn install_interrupt(stop: StopToken) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || {
            rt.block_on(async {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if on_interrupt(&stop) {
                        warn!("second interrupt, exiting");
                        std::process::exit(INTERRUPT_EXIT_CODE);
                    }
                    warn!("interrupt received, stopping after in-flight I/O (Ctrl-C again to exit)");
                }
            })
        })
        .context("spawning interrupt listener")?;
    Ok(())
}

/// Returns true when the run was already stopping and the process should exit now.
fn on_interrupt(stop: &StopToken) -> bool {
    if stop.is_cancelled() {
        return true;
    }
    stop.cancel();
    false
}

fn run_crash(opts: cli::CrashOpts) -> Result<()> {
    let config = opts.run_config();
    info!(
        target_addr = %config.target,
        duration_s = config.duration.as_secs(),
        "crash test configured"
    );

    if !opts.yes && !cli::confirm_destructive_run(&config.target)? {
        info!("aborted by operator");
        return Ok(());
    }

    let stop = StopToken::new();
    install_interrupt(stop.clone())?;

    match measure_latency(&config.target, &probe_frame(), config.tuning.socket_timeout) {
        Some(d) => info!(latency_ms = d.as_secs_f64() * 1000.0, "baseline round trip"),
        None => warn!("no baseline round trip"),
    }

    let probe = TcpProbe::new(config.target.clone());
    let report = CrashTester::new(config, probe, stop).run()?;

    report::print_summary(&report);
    report::save_record(&report.result, &opts.output)?;
    Ok(())
}

fn run_probe(opts: cli::ProbeOpts) -> Result<()> {
    let target = opts.target.target();
    let timeout = Duration::from_millis(opts.timeout_ms);

    let alive = is_alive(&target, timeout);
    println!("{target}: {}", if alive { "responsive" } else { "NOT responding" });
    if !alive {
        bail!("device {target} not responding");
    }

    let frame = frame::build_frame(opts.addr, opts.cmd.id(), &[]);
    let mut conn = conn::connect(&target, timeout)?;
    let start = Instant::now();
    match conn.round_trip(&frame) {
        Ok(resp) => println!(
            "  addr=0x{:02X} cmd={:?}: {:.1} ms, len={} type=0x{:02X} from=0x{:02X} cmd=0x{:02X} payload={}B raw={}B",
            opts.addr,
            opts.cmd,
            start.elapsed().as_secs_f64() * 1000.0,
            resp.length,
            resp.kind,
            resp.can_addr,
            resp.cmd_id,
            resp.payload.len(),
            resp.raw.len(),
        ),
        Err(e) => println!("  addr=0x{:02X} cmd={:?}: {e}", opts.addr, opts.cmd),
    }
    Ok(())
}
