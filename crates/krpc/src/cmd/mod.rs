use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use krpc_agent::AgentKind;
use krpc_frame::DEFAULT_MAX_PAYLOAD;
use krpc_transport::{ByteOrder, RemoteStatus};

use crate::exit::{CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod loopback;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a wire frame given as hex.
    Decode(DecodeArgs),
    /// Build a kernel request frame and print its wire bytes.
    Encode(EncodeArgs),
    /// Run calls against a simulated co-processor.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Word order of the remote side.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OrderArg {
    Big,
    Little,
    Native,
}

impl OrderArg {
    pub fn resolve(self) -> ByteOrder {
        match self {
            OrderArg::Big => ByteOrder::Big,
            OrderArg::Little => ByteOrder::Little,
            OrderArg::Native => ByteOrder::native(),
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum StatusArg {
    Uninitialized,
    Connected,
    Disconnected,
    Disabled,
}

impl From<StatusArg> for RemoteStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Uninitialized => RemoteStatus::Uninitialized,
            StatusArg::Connected => RemoteStatus::Connected,
            StatusArg::Disconnected => RemoteStatus::Disconnected,
            StatusArg::Disabled => RemoteStatus::Disabled,
        }
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex (whitespace and a leading 0x are ignored).
    pub hex: String,
    /// Word order the frame was written in.
    #[arg(long, value_enum, default_value = "big")]
    pub remote_order: OrderArg,
    /// Largest payload accepted, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Task id (normally the sending endpoint's id).
    #[arg(long, default_value = "0", value_parser = parse_word)]
    pub task: u32,
    /// Procedure id.
    #[arg(long, value_parser = parse_word)]
    pub procedure: u32,
    /// Parameter words (comma-separated, decimal or 0x hex).
    #[arg(long = "param", value_delimiter = ',', value_parser = parse_word)]
    pub params: Vec<u32>,
    /// Encode as a reply instead of a kernel request.
    #[arg(long)]
    pub reply: bool,
    /// Word order of the receiving remote.
    #[arg(long, value_enum, default_value = "big")]
    pub remote_order: OrderArg,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Agent kind to simulate (acpu, vcpu, ve3, hifi, hifi1, kr4).
    #[arg(long, default_value = "acpu")]
    pub agent: AgentKind,
    /// Word order of the simulated remote.
    #[arg(long, value_enum, default_value = "big")]
    pub remote_order: OrderArg,
    /// Remote status reported by the link.
    #[arg(long, value_enum, default_value = "connected")]
    pub status: StatusArg,
    /// Number of synchronous calls.
    #[arg(long, default_value_t = 1)]
    pub count: u32,
    /// Procedure id for each call.
    #[arg(long, default_value = "1", value_parser = parse_word)]
    pub procedure: u32,
    /// Reply timeout per call (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Simulate a remote that never answers.
    #[arg(long)]
    pub silent: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a 32-bit word written in decimal or `0x` hex.
pub fn parse_word(input: &str) -> Result<u32, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid word '{input}': {err}"))
}

/// Parse hex bytes, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = body
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        return Err(CliError::new(DATA_INVALID, "hex input has an odd number of digits"));
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let hi = hex_value(pair[0]);
            let lo = hex_value(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err(CliError::new(
                    DATA_INVALID,
                    format!(
                        "invalid hex digits '{}{}'",
                        pair[0] as char, pair[1] as char
                    ),
                )),
            }
        })
        .collect()
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|v| v as u8)
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
