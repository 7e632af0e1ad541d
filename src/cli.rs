use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::attack::attack_config::{Tuning, default_sequence};
use crate::attack::runner::RunConfig;
use crate::conn::Target;
use crate::liveness::RecoveryPolicy;
use crate::proto::command::{CommandId, DEFAULT_PORT, is_known_address};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tcp-crash-hammer",
    about = "Crash-test harness for a TCP-controlled device (health judged by responsiveness only)"
)]
pub struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Run attack rounds until the device crashes or the duration elapses
    Crash(CrashOpts),
    /// Check that the device answers and measure one round trip
    Probe(ProbeOpts),
}

#[derive(Args, Debug, Clone)]
pub struct TargetOpts {
    /// Controller IP address or host name
    #[arg(long)]
    pub ip: String,
    /// Controller TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl TargetOpts {
    pub fn target(&self) -> Target {
        Target::new(self.ip.clone(), self.port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct CrashOpts {
    #[command(flatten)]
    pub target: TargetOpts,
    /// Test duration in seconds
    #[arg(long, default_value_t = 300)]
    pub duration: u64,
    /// How long to wait for an unresponsive device to come back, in seconds
    #[arg(long, default_value_t = 60)]
    pub recovery_timeout: u64,
    /// JSON result file
    #[arg(long, default_value = "crash_result.json")]
    pub output: PathBuf,
    /// Skip the confirmation prompt
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,
}

impl CrashOpts {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            target: self.target.target(),
            duration: Duration::from_secs(self.duration),
            recovery: RecoveryPolicy {
                budget: Duration::from_secs(self.recovery_timeout),
                ..RecoveryPolicy::default()
            },
            tuning: Tuning::default(),
            sequence: default_sequence(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProbeOpts {
    #[command(flatten)]
    pub target: TargetOpts,
    /// CAN address to query (0x3D controller, 0x00 subsystem, 0x01-0x1C peripherals)
    #[arg(long, default_value = "0x3D", value_parser = parse_address)]
    pub addr: u8,
    /// Command id (0x00, 0x01, 0x02 or 0x19)
    #[arg(long, default_value = "0x01", value_parser = parse_command)]
    pub cmd: CommandId,
    /// Socket timeout in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub timeout_ms: u64,
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("{s:?} is not a byte value: {e}"))
}

fn parse_address(s: &str) -> Result<u8, String> {
    let addr = parse_u8(s)?;
    if !is_known_address(addr) {
        return Err(format!("0x{addr:02X} is not a known CAN address"));
    }
    Ok(addr)
}

fn parse_command(s: &str) -> Result<CommandId, String> {
    let id = parse_u8(s)?;
    CommandId::try_from(id).map_err(|v| format!("0x{v:02X} is not a known command id"))
}

/// Warn the operator that the run is meant to crash the device and wait for Enter.
/// Anything other than an empty line or "y"/"yes" declines.
pub fn confirm_destructive_run(target: &Target) -> anyhow::Result<bool> {
    let stdin = io::stdin();
    confirm(&mut stdin.lock(), &mut io::stderr(), target)
}

fn confirm(input: &mut impl BufRead, out: &mut impl Write, target: &Target) -> anyhow::Result<bool> {
    let bar = "!".repeat(60);
    writeln!(out, "\n{bar}")?;
    writeln!(out, "WARNING: this test is designed to CRASH the device at {target}!")?;
    writeln!(out, "Only use on test hardware, not production systems.")?;
    writeln!(out, "{bar}")?;
    write!(out, "\nPress Enter to continue (or type 'n' to abort)... ")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("reading confirmation")?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_values_accept_hex_and_decimal() {
        assert_eq!(parse_u8("0x3D"), Ok(0x3D));
        assert_eq!(parse_u8("28"), Ok(28));
        assert!(parse_u8("0x100").is_err());
        assert!(parse_u8("abc").is_err());
    }

    #[test]
    fn address_and_command_validation() {
        assert_eq!(parse_address("0x1C"), Ok(0x1C));
        assert!(parse_address("0x40").is_err());
        assert_eq!(parse_command("0x19"), Ok(CommandId::DcdcPassthrough));
        assert!(parse_command("0x05").is_err());
    }

    #[test]
    fn crash_defaults() {
        let cli = Cli::try_parse_from(["tcp-crash-hammer", "crash", "--ip", "10.0.0.5"]).unwrap();
        let Cmd::Crash(opts) = cli.cmd else {
            panic!("wrong subcommand")
        };
        let cfg = opts.run_config();
        assert_eq!(cfg.target, Target::new("10.0.0.5", 49_999));
        assert_eq!(cfg.duration, Duration::from_secs(300));
        assert_eq!(cfg.recovery.budget, Duration::from_secs(60));
        assert_eq!(cfg.sequence.len(), 4);
        assert_eq!(opts.output, PathBuf::from("crash_result.json"));
        assert!(!opts.yes);
    }

    #[test]
    fn probe_parses_custom_frame() {
        let cli = Cli::try_parse_from([
            "tcp-crash-hammer",
            "--log-level",
            "debug",
            "probe",
            "--ip",
            "h",
            "--addr",
            "0x00",
            "--cmd",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        let Cmd::Probe(opts) = cli.cmd else {
            panic!("wrong subcommand")
        };
        assert_eq!(opts.addr, 0x00);
        assert_eq!(opts.cmd, CommandId::GetStringData);
    }

    #[test]
    fn confirmation_answers() {
        let target = Target::new("h", 1);
        let mut sink = Vec::new();
        assert!(confirm(&mut "\n".as_bytes(), &mut sink, &target).unwrap());
        assert!(confirm(&mut "Yes\n".as_bytes(), &mut sink, &target).unwrap());
        assert!(!confirm(&mut "n\n".as_bytes(), &mut sink, &target).unwrap());
        assert!(String::from_utf8(sink).unwrap().contains("CRASH the device at h:1"));
    }
}
