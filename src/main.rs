use anyhow::{Context, Result};
use clap::Parser;
use fr_analysis::source::{
    CsvEventLoader, CsvResultWriter, CsvSrttLoader, PcapPacketSource, PcapReceiverCounter,
};
use fr_analysis::{Analyzer, Config};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "fr-analysis")]
#[command(about = "Classify Fast Retransmissions in a sender capture as genuine or spurious")]
struct Args {
    /// Sender-side capture (pcap or pcapng)
    #[arg(long)]
    source: PathBuf,

    /// Receiver-side capture (pcap or pcapng)
    #[arg(long)]
    sink: PathBuf,

    /// Congestion-state log (time_us,state)
    #[arg(long)]
    csv: PathBuf,

    /// SRTT log (time_us,srtt); adds the SRTT columns to the output
    #[arg(long)]
    srtt: Option<PathBuf>,

    /// Output CSV
    #[arg(long, default_value = "result.csv")]
    out: PathBuf,

    /// Window searched for a timeout retransmission after CA_LOSS, in milliseconds
    #[arg(long, default_value = "500")]
    rto_window_ms: u64,

    #[arg(long, default_value = fr_analysis::config::RECOVERY_STATE)]
    recovery_state: String,

    #[arg(long, default_value = fr_analysis::config::RTO_STATE)]
    rto_state: String,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = Config {
        recovery_state: args.recovery_state,
        rto_state: args.rto_state,
        rto_probe_window: Duration::from_millis(args.rto_window_ms),
        extended_output: args.srtt.is_some(),
    };

    let events = CsvEventLoader::new(&args.csv).with_recovery_state(config.recovery_state.clone());
    let packets = PcapPacketSource::open(&args.source)
        .with_context(|| format!("failed to open sender pcap {}", args.source.display()))?
        .with_window(config.rto_probe_window);
    let receiver = PcapReceiverCounter::open(&args.sink)
        .with_context(|| format!("failed to open receiver pcap {}", args.sink.display()))?;
    let results = CsvResultWriter::create(&args.out, config.extended_output)
        .with_context(|| format!("failed to create result file {}", args.out.display()))?;

    let mut analyzer = Analyzer::new(
        Box::new(events),
        Box::new(packets),
        Box::new(receiver),
        Box::new(results),
    )
    .with_rto_state(config.rto_state);
    if let Some(srtt) = &args.srtt {
        analyzer = analyzer.with_srtt(Box::new(CsvSrttLoader::new(srtt)));
    }

    info!("🚀 Starting analysis");
    info!("   Source: {}", args.source.display());
    info!("   Sink:   {}", args.sink.display());
    info!("   CSV:    {}", args.csv.display());
    if let Some(srtt) = &args.srtt {
        info!("   SRTT:   {}", srtt.display());
    }

    let summary = analyzer.run().context("analysis failed")?;
    info!("✅ Analysis complete: {} results written to {}", summary.results, args.out.display());
    Ok(())
}
