use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use krpc_agent::EndpointStats;
use krpc_frame::{program_name, RpcFrame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct HeaderOutput {
    program_id: u32,
    program: &'static str,
    version_id: u32,
    procedure_id: u32,
    task_id: u32,
    sys_tid: u32,
    sys_pid: u32,
    parameter_size: u32,
    context: u32,
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    remote_order: &'a str,
    wire_size: usize,
    header: HeaderOutput,
    payload_words: Vec<u32>,
    trailing_bytes: usize,
}

pub fn print_frame(frame: &RpcFrame, remote_order: &str, trailing_bytes: usize, format: OutputFormat) {
    let h = &frame.header;
    let words = frame.payload_words();
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                remote_order,
                wire_size: frame.wire_size(),
                header: HeaderOutput {
                    program_id: h.program_id,
                    program: program_name(h.program_id),
                    version_id: h.version_id,
                    procedure_id: h.procedure_id,
                    task_id: h.task_id,
                    sys_tid: h.sys_tid,
                    sys_pid: h.sys_pid,
                    parameter_size: h.parameter_size,
                    context: h.context,
                },
                payload_words: words,
                trailing_bytes,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            let rows = [
                ("program", format!("{} ({})", h.program_id, program_name(h.program_id))),
                ("version", h.version_id.to_string()),
                ("procedure", h.procedure_id.to_string()),
                ("task", h.task_id.to_string()),
                ("sys_tid", h.sys_tid.to_string()),
                ("sys_pid", h.sys_pid.to_string()),
                ("parameter_size", h.parameter_size.to_string()),
                ("context", format!("{:#010x}", h.context)),
                ("payload", hex_words(&words)),
            ];
            for (field, value) in rows {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "program={} ({}) version={} procedure={} task={} size={} context={:#010x} order={} payload=[{}]",
                h.program_id,
                program_name(h.program_id),
                h.version_id,
                h.procedure_id,
                h.task_id,
                h.parameter_size,
                h.context,
                remote_order,
                hex_words(&words)
            );
        }
    }
}

#[derive(Serialize)]
struct WireOutput<'a> {
    remote_order: &'a str,
    size: usize,
    wire: String,
}

pub fn print_wire(wire: &[u8], remote_order: &str, format: OutputFormat) {
    let hex = to_hex(wire);
    match format {
        OutputFormat::Json => print_json(&WireOutput {
            remote_order,
            size: wire.len(),
            wire: hex,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OFFSET", "WORD"]);
            for (i, word) in wire.chunks(4).enumerate() {
                table.add_row(vec![format!("{:#06x}", i * 4), to_hex(word)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{hex}"),
    }
}

#[derive(Serialize)]
pub struct StatsOutput {
    pub received: u64,
    pub dispatched: u64,
    pub dropped: u64,
    pub sent: u64,
    pub queued: usize,
}

impl From<EndpointStats> for StatsOutput {
    fn from(stats: EndpointStats) -> Self {
        Self {
            received: stats.received,
            dispatched: stats.dispatched,
            dropped: stats.dropped,
            sent: stats.sent,
            queued: stats.queued,
        }
    }
}

#[derive(Serialize)]
pub struct LoopbackReport {
    pub agent: &'static str,
    pub node: String,
    pub link: String,
    pub remote_order: String,
    pub endpoint: String,
    pub endpoint_id: u32,
    pub calls: u32,
    pub ok_replies: u32,
    pub ring_buffer_dumps: usize,
    pub stats: StatsOutput,
}

pub fn print_report(report: &LoopbackReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "AGENT", "ORDER", "ENDPOINT", "ID", "CALLS", "OK", "SENT", "RECEIVED", "DROPPED",
                ])
                .add_row(vec![
                    report.agent.to_string(),
                    report.remote_order.clone(),
                    report.endpoint.clone(),
                    report.endpoint_id.to_string(),
                    report.calls.to_string(),
                    report.ok_replies.to_string(),
                    report.stats.sent.to_string(),
                    report.stats.received.to_string(),
                    report.stats.dropped.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "agent={} node={} link={} order={} endpoint={} id={} calls={} ok={} sent={} received={} dropped={}",
                report.agent,
                report.node,
                report.link,
                report.remote_order,
                report.endpoint,
                report.endpoint_id,
                report.calls,
                report.ok_replies,
                report.stats.sent,
                report.stats.received,
                report.stats.dropped
            );
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_words(words: &[u32]) -> String {
    words
        .iter()
        .map(|w| format!("{w:#010x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
